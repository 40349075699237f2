#[macro_use]
extern crate clap;
extern crate conclist;
extern crate crossbeam;
#[macro_use]
extern crate log;
extern crate simplelog;

use clap::{App, Arg, ArgMatches};
use conclist::{
    count_list, create_list, delete_list, insert_value, print_list, remove_value, ListHandle,
};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::process;

const THREADS: i32 = 32;

fn is_even(value: i32) -> bool {
    value % 2 == 0
}

fn greater_than_three(value: i32) -> bool {
    value > 3
}

fn insert_or_exit(list: &ListHandle, value: i32) {
    if let Err(e) = insert_value(list, value) {
        error!("inserting {}: {}", value, e);
        process::exit(1);
    }
}

fn app() -> App<'static, 'static> {
    App::new("Concurrent List Demo")
        .version(crate_version!())
        .about("Replay a few insert/remove/print/count scenarios on the lock-coupled list")
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Log more (repeat for more detail)"),
        )
}

fn log_level(matches: &ArgMatches) -> LevelFilter {
    match matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() {
    let matches = app().get_matches();
    if let Err(e) = TermLogger::init(
        log_level(&matches),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("could not set up logging: {}", e);
    }

    println!("Started.");
    let list = create_list();
    for &v in &[5, 3, 8, 3] {
        insert_or_exit(&list, v);
        print_list(&list);
    }
    remove_value(&list, 5);
    print_list(&list);
    count_list(&list, is_even);
    count_list(&list, greater_than_three);
    delete_list(list);

    let list = create_list();
    let res = crossbeam::scope(|s| {
        for v in 1..=THREADS {
            let list = &list;
            s.spawn(move |_| insert_or_exit(list, v));
        }
    });
    if res.is_err() {
        error!("an inserting thread panicked");
        process::exit(1);
    }
    print_list(&list);
    count_list(&list, is_even);
    delete_list(list);

    // an absent handle is ignored
    delete_list(ListHandle::absent());
    println!("Finished.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        let level = |args: &[&str]| log_level(&app().get_matches_from(args));
        assert_eq!(level(&["demo"]), LevelFilter::Warn);
        assert_eq!(level(&["demo", "-v"]), LevelFilter::Info);
        assert_eq!(level(&["demo", "-vv"]), LevelFilter::Debug);
        assert_eq!(level(&["demo", "-v", "-v", "-v"]), LevelFilter::Trace);
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(app().get_matches_from_safe(&["demo", "--bogus"]).is_err());
    }
}
