use std::alloc::{self, Layout};
use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ListError;
use thread_local::ThreadLocal;

const OSC: Ordering = Ordering::SeqCst;

/// An owning edge: the head of the list or the successor of a node.
type Link = Option<NonNull<Node>>;

pub(super) struct Node {
    value: i32,
    // Holding this guard is "standing on" the node.
    next: Mutex<Link>,
}

impl Node {
    fn new(value: i32) -> Self {
        Node {
            value,
            next: Mutex::new(None),
        }
    }

    /// Puts a fresh node on the heap, reporting allocator failure instead of aborting.
    fn alloc(value: i32) -> Result<NonNull<Node>, ListError> {
        let layout = Layout::new::<Node>();
        let raw = unsafe { alloc::alloc(layout) } as *mut Node;
        let ptr = NonNull::new(raw).ok_or(ListError::Allocation)?;
        unsafe { ptr::write(ptr.as_ptr(), Node::new(value)) };
        Ok(ptr)
    }

    /// # Safety
    ///
    /// `ptr` must come from `Node::alloc`, be unreachable from the list, and no thread may
    /// hold or wait on its guard.
    unsafe fn free(ptr: NonNull<Node>) {
        drop(Box::from_raw(ptr.as_ptr()));
    }
}

/// # Safety
///
/// The caller must hold the guard of the edge pointing at `ptr` (or the guard of `ptr`
/// itself) for as long as the returned reference is used without holding `ptr`'s guard.
unsafe fn node<'a>(ptr: NonNull<Node>) -> &'a Node {
    &*ptr.as_ptr()
}

/// Locks an edge.
///
/// A mutex is only poisoned by a caller's callback panicking while we stand on a node,
/// and no splice is ever in progress at that point, so the chain behind the guard is intact.
fn lock<T>(edge: &Mutex<T>) -> MutexGuard<'_, T> {
    edge.lock().unwrap_or_else(|poisoned| {
        warn!("recovering a list guard poisoned by a panicking callback");
        edge.clear_poison();
        poisoned.into_inner()
    })
}

fn link_mut(edge: &mut Mutex<Link>) -> &mut Link {
    edge.get_mut().unwrap_or_else(PoisonError::into_inner)
}

/// Hand-over-hand walk: while the node ahead of `edge` satisfies `advance`, lock that node's
/// own edge and only then let go of the one we were holding.
///
/// At most two adjacent guards are held at any instant, and guards are always taken in
/// chain order, so concurrent walkers can never wait on each other in a cycle.
fn walk<'a, F>(mut edge: MutexGuard<'a, Link>, mut advance: F) -> MutexGuard<'a, Link>
where
    F: FnMut(&Node) -> bool,
{
    while let Some(ahead) = *edge {
        // we hold the edge pointing at `ahead`, so nobody can unlink it under us
        let ahead = unsafe { node::<'a>(ahead) };
        if !advance(ahead) {
            break;
        }
        edge = lock(&ahead.next);
    }
    edge
}

/// Marks a list as being traversed by the current thread for as long as it lives.
struct CallbackScope<'a> {
    traversing: &'a Cell<bool>,
}

impl<'a> CallbackScope<'a> {
    fn enter(list: &'a SortedList) -> Self {
        let traversing = list.traversing.get_or(|| Cell::new(false));
        traversing.set(true);
        CallbackScope { traversing }
    }
}

impl<'a> Drop for CallbackScope<'a> {
    fn drop(&mut self) {
        self.traversing.set(false);
    }
}

/// A sorted chain of integers that many threads can insert into, remove from and read
/// at the same time.
///
/// Every node carries its own lock, and every operation walks the chain with lock
/// coupling (see `walk`), so operations working on disjoint stretches of the list run in
/// parallel. The list-wide guard only protects the head edge and is dropped as soon as an
/// operation has stepped onto the first node.
///
/// Callbacks handed to [`for_each`](SortedList::for_each) and [`count`](SortedList::count)
/// run while a node is locked and must not call back into the same list. Doing so panics
/// rather than deadlocking.
pub struct SortedList {
    head: Mutex<Link>,
    // only read or written with `head` locked
    closed: AtomicBool,
    // per thread: is one of this thread's callbacks running inside a traversal?
    traversing: ThreadLocal<Cell<bool>>,
}

// Nodes are only reached through the mutex-protected edges, and a node is only freed by
// the thread that unlinked it while holding both its predecessor's and its own guard.
unsafe impl Send for SortedList {}
unsafe impl Sync for SortedList {}

impl Default for SortedList {
    fn default() -> Self {
        SortedList {
            head: Mutex::new(None),
            closed: AtomicBool::new(false),
            traversing: ThreadLocal::new(),
        }
    }
}

impl SortedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the list guard, which every operation starts from.
    fn enter(&self) -> Result<MutexGuard<'_, Link>, ListError> {
        assert!(
            !self.traversing.get().map_or(false, Cell::get),
            "a traversal callback called back into the list it is traversing"
        );

        let head = lock(&self.head);
        if self.closed.load(OSC) {
            return Err(ListError::Closed);
        }
        Ok(head)
    }

    /// Inserts `value` in front of the first node that is not smaller than it.
    ///
    /// The node is allocated before any lock is taken. If that fails the list is left as it
    /// was and `ListError::Allocation` is returned.
    pub fn insert(&self, value: i32) -> Result<(), ListError> {
        let new = Node::alloc(value)?;

        let head = match self.enter() {
            Ok(head) => head,
            Err(e) => {
                unsafe { Node::free(new) };
                return Err(e);
            }
        };

        // Inserting at the head happens with the list guard held, the same guard a removal
        // of the head needs, so the two can never race on the head edge.
        let mut edge = walk(head, |ahead| ahead.value < value);
        *link_mut(unsafe { &mut (*new.as_ptr()).next }) = *edge;
        *edge = Some(new);
        drop(edge);

        trace!("inserted {}", value);
        Ok(())
    }

    /// Unlinks one node holding `value`.
    pub fn remove(&self, value: i32) -> Result<(), ListError> {
        let head = self.enter()?;
        if head.is_none() {
            return Err(ListError::Empty);
        }

        let mut edge = walk(head, |ahead| ahead.value < value);
        let victim = match *edge {
            Some(ptr) if unsafe { node(ptr) }.value == value => ptr,
            _ => return Err(ListError::NotFound(value)),
        };

        // Step onto the victim before splicing it out: this waits for anyone still
        // standing on it, and nobody new can reach it while we hold the edge behind it.
        let mut victim_edge = lock(&unsafe { node(victim) }.next);
        *edge = victim_edge.take();
        drop(victim_edge);
        drop(edge);
        unsafe { Node::free(victim) };

        trace!("removed {}", value);
        Ok(())
    }

    pub fn contains(&self, value: i32) -> Result<bool, ListError> {
        let edge = walk(self.enter()?, |ahead| ahead.value < value);
        Ok(match *edge {
            Some(ptr) => unsafe { node(ptr) }.value == value,
            None => false,
        })
    }

    /// Visits every value in ascending order.
    ///
    /// `f` runs while the node holding the value is locked. It must not operate on this
    /// list.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ListError>
    where
        F: FnMut(i32),
    {
        let mut edge = self.enter()?;
        let _scope = CallbackScope::enter(self);

        while let Some(ahead) = *edge {
            let ahead = unsafe { node(ahead) };
            edge = lock(&ahead.next);
            f(ahead.value);
        }
        Ok(())
    }

    /// Writes every value followed by a space, then a newline.
    ///
    /// A closed list prints as an empty one.
    pub fn print<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut written = Ok(());
        let _ = self.for_each(|value| {
            if written.is_ok() {
                written = write!(out, "{} ", value);
            }
        });
        written?;
        writeln!(out)
    }

    /// Counts the values for which `predicate` holds.
    ///
    /// Like [`for_each`](SortedList::for_each), the predicate must not touch this list.
    pub fn count<P>(&self, predicate: P) -> Result<usize, ListError>
    where
        P: Fn(i32) -> bool,
    {
        let mut count = 0;
        self.for_each(|value| {
            if predicate(value) {
                count += 1;
            }
        })?;
        Ok(count)
    }

    pub fn values(&self) -> Result<Vec<i32>, ListError> {
        let mut values = Vec::new();
        self.for_each(|value| values.push(value))?;
        Ok(values)
    }

    pub fn len(&self) -> Result<usize, ListError> {
        self.count(|_| true)
    }

    pub fn is_empty(&self) -> Result<bool, ListError> {
        Ok(self.enter()?.is_none())
    }

    /// Closes the list and releases all of its nodes, returning how many there were.
    ///
    /// Operations that start afterwards fail with `ListError::Closed`. Operations already
    /// past the head finish normally: the teardown walks the chain with the same lock
    /// coupling as everyone else, so it can follow them but never overtake them.
    pub fn close(&self) -> Result<usize, ListError> {
        let mut head = self.enter()?;
        self.closed.store(true, OSC);

        let mut current = match head.take() {
            Some(first) => first,
            None => {
                debug!("closed an empty list");
                return Ok(0);
            }
        };
        let mut edge = lock(&unsafe { node(current) }.next);
        drop(head);

        let mut released = 0;
        loop {
            let ahead = edge.take();
            let ahead_edge = ahead.map(|ptr| lock(&unsafe { node(ptr) }.next));
            drop(edge);
            unsafe { Node::free(current) };
            released += 1;

            match (ahead, ahead_edge) {
                (Some(ptr), Some(next_edge)) => {
                    current = ptr;
                    edge = next_edge;
                }
                _ => break,
            }
        }

        debug!("closed list, released {} nodes", released);
        Ok(released)
    }
}

impl Drop for SortedList {
    fn drop(&mut self) {
        let mut link = link_mut(&mut self.head).take();
        while let Some(ptr) = link {
            let mut node = unsafe { Box::from_raw(ptr.as_ptr()) };
            link = link_mut(&mut node.next).take();
        }
    }
}

impl fmt::Debug for SortedList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let values = self.values().unwrap_or_default();
        f.debug_list().entries(values).finish()
    }
}
