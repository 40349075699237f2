#[macro_use]
extern crate clap;
extern crate conclist;
#[macro_use]
extern crate log;
extern crate rand;
extern crate simplelog;
extern crate zipf;

use clap::{App, Arg};
use conclist::SortedList;
use rand::distributions::Distribution;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::process;
use std::sync;
use std::thread;
use std::time;

fn main() {
    let matches = App::new("Concurrent List Benchmarker")
        .version(crate_version!())
        .about("Benchmark the lock-coupled sorted list with varying read/write load")
        .arg(
            Arg::with_name("readers")
                .short("r")
                .long("readers")
                .help("Set the number of readers")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("writers")
                .short("w")
                .long("writers")
                .required(true)
                .help("Set the number of writers")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("compare")
                .short("c")
                .long("compare")
                .help("Also benchmark Arc<Mutex<Vec>>"),
        )
        .arg(
            Arg::with_name("distribution")
                .short("d")
                .long("dist")
                .possible_values(&["uniform", "skewed"])
                .default_value("uniform")
                .help("Set the distribution for reads and writes")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("span")
                .short("s")
                .long("span")
                .default_value("1000")
                .help("Set the range values are drawn from")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("duration")
                .short("t")
                .long("duration")
                .default_value("5")
                .help("Set how many seconds each benchmark runs")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Log more (repeat for more detail)"),
        )
        .get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("could not set up logging: {}", e);
    }

    let readers = value_t!(matches, "readers", usize).unwrap_or_else(|e| e.exit());
    let writers = value_t!(matches, "writers", usize).unwrap_or_else(|e| e.exit());
    let span = value_t!(matches, "span", usize).unwrap_or_else(|e| e.exit());
    let secs = value_t!(matches, "duration", u64).unwrap_or_else(|e| e.exit());
    let dist = matches.value_of("distribution").unwrap_or("uniform");
    if span == 0 {
        error!("span must be at least 1");
        process::exit(1);
    }

    let dur = time::Duration::from_secs(secs);
    let dur_in_s = dur.as_secs_f64();

    let stat = |var: &str, op, results: Vec<(_, usize)>| {
        for (i, res) in results.into_iter().enumerate() {
            println!(
                "{:2} {:2} {:10} {:22} {:8.0} ops/s {} {}",
                readers,
                writers,
                dist,
                var,
                res.1 as f64 / dur_in_s,
                op,
                i
            )
        }
    };

    let mut join = Vec::with_capacity(readers + writers);

    // first, benchmark Arc<Mutex<Vec>>
    if matches.is_present("compare") {
        let list: sync::Arc<sync::Mutex<Vec<i32>>> = Default::default();
        prefill(&mut list.clone(), span);
        info!("running Arc<Mutex<Vec>> for {}s", secs);
        let end = time::Instant::now() + dur;
        join.extend((0..readers).map(|_| {
            let list = list.clone();
            let dist = dist.to_owned();
            thread::spawn(move || drive(list, end, &dist, false, span))
        }));
        join.extend((0..writers).map(|_| {
            let list = list.clone();
            let dist = dist.to_owned();
            thread::spawn(move || drive(list, end, &dist, true, span))
        }));
        let (wres, rres): (Vec<_>, _) = join
            .drain(..)
            .map(|jh| jh.join().unwrap_or((false, 0)))
            .partition(|&(write, _)| write);
        stat("std", "write", wres);
        stat("std", "read", rres);
    }

    // benchmark conclist::SortedList
    {
        let list = sync::Arc::new(SortedList::new());
        prefill(&mut list.clone(), span);
        info!("running conclist::SortedList for {}s", secs);
        let end = time::Instant::now() + dur;
        join.extend((0..readers).map(|_| {
            let list = list.clone();
            let dist = dist.to_owned();
            thread::spawn(move || drive(list, end, &dist, false, span))
        }));
        join.extend((0..writers).map(|_| {
            let list = list.clone();
            let dist = dist.to_owned();
            thread::spawn(move || drive(list, end, &dist, true, span))
        }));
        let (wres, rres): (Vec<_>, _) = join
            .drain(..)
            .map(|jh| jh.join().unwrap_or((false, 0)))
            .partition(|&(write, _)| write);
        stat("conclist::SortedList", "write", wres);
        stat("conclist::SortedList", "read", rres);

        match list.close() {
            Ok(n) => debug!("released {} nodes", n),
            Err(e) => warn!("closing list: {}", e),
        }
    }
}

trait Backend {
    fn b_contains(&mut self, value: i32) -> bool;
    fn b_insert(&mut self, value: i32);
    fn b_remove(&mut self, value: i32);
}

/// Inserts every other value of the span, so reads and removes hit about half the time.
fn prefill<B: Backend>(backend: &mut B, span: usize) {
    for value in (0..span).step_by(2) {
        backend.b_insert(value as i32);
    }
}

fn drive<B: Backend>(
    mut backend: B,
    end: time::Instant,
    dist: &str,
    write: bool,
    span: usize,
) -> (bool, usize) {
    use rand::Rng;

    let mut ops = 0;
    let skewed = dist == "skewed";
    let mut t_rng = rand::thread_rng();
    let zipf = match zipf::ZipfDistribution::new(span, 1.03) {
        Ok(zipf) => zipf,
        Err(()) => {
            error!("cannot build a zipf distribution over {} values", span);
            return (write, 0);
        }
    };
    while time::Instant::now() < end {
        // generate both so that overhead is always the same
        let id_uniform: usize = t_rng.gen_range(0..span);
        let id_skewed: usize = zipf.sample(&mut t_rng) - 1;
        let id = (if skewed { id_skewed } else { id_uniform }) as i32;
        if write {
            // keep the list at a steady length
            backend.b_insert(id);
            backend.b_remove(id);
        } else {
            backend.b_contains(id);
        }
        ops += 1;
    }

    (write, ops)
}

impl Backend for sync::Arc<SortedList> {
    fn b_contains(&mut self, value: i32) -> bool {
        self.contains(value).unwrap_or(false)
    }

    fn b_insert(&mut self, value: i32) {
        if let Err(e) = self.insert(value) {
            warn!("insert of {} failed: {}", value, e);
        }
    }

    fn b_remove(&mut self, value: i32) {
        let _ = self.remove(value);
    }
}

impl Backend for sync::Arc<sync::Mutex<Vec<i32>>> {
    fn b_contains(&mut self, value: i32) -> bool {
        match self.lock() {
            Ok(v) => v.binary_search(&value).is_ok(),
            Err(_) => false,
        }
    }

    fn b_insert(&mut self, value: i32) {
        if let Ok(mut v) = self.lock() {
            let at = match v.binary_search(&value) {
                Ok(i) | Err(i) => i,
            };
            v.insert(at, value);
        }
    }

    fn b_remove(&mut self, value: i32) {
        if let Ok(mut v) = self.lock() {
            if let Ok(i) = v.binary_search(&value) {
                v.remove(i);
            }
        }
    }
}
