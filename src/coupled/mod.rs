//! Procedural interface over [`SortedList`], for drivers that think in terms of list handles.
//!
//! A handle may be absent, like a null list pointer. Every operation on an absent or
//! deleted handle is silently ignored, and so is removing a value that is not there. The
//! only failure a caller ever sees is a node allocation failure from [`insert_value`].

mod linked_list;

pub use self::linked_list::SortedList;

use crate::error::ListError;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ListHandle {
    list: Option<Arc<SortedList>>,
}

impl ListHandle {
    /// A handle that refers to no list.
    pub fn absent() -> Self {
        ListHandle { list: None }
    }

    pub fn is_absent(&self) -> bool {
        self.list.is_none()
    }

    pub fn list(&self) -> Option<&SortedList> {
        self.list.as_deref()
    }
}

impl fmt::Debug for ListHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.list {
            Some(ref list) => write!(f, "ListHandle({:?})", list),
            None => write!(f, "ListHandle(absent)"),
        }
    }
}

/// Creates an empty list.
///
/// If the allocator cannot provide the list itself the process aborts through the global
/// allocation error handler; there is nothing useful to return in that case.
pub fn create_list() -> ListHandle {
    ListHandle {
        list: Some(Arc::new(SortedList::new())),
    }
}

/// Deletes the list behind `handle`, releasing all its nodes.
///
/// Other clones of the handle stay valid, but everything they do afterwards is ignored.
pub fn delete_list(handle: ListHandle) {
    if let Some(list) = handle.list {
        match list.close() {
            Ok(n) => debug!("deleted list with {} nodes", n),
            Err(ListError::Closed) => debug!("list was already deleted"),
            Err(e) => error!("deleting list failed: {}", e),
        }
    }
}

/// Inserts `value`. Fails only if the node cannot be allocated, in which case the list is
/// unchanged.
pub fn insert_value(handle: &ListHandle, value: i32) -> Result<(), ListError> {
    match handle.list() {
        Some(list) => match list.insert(value) {
            Err(ListError::Closed) => Ok(()),
            res => res,
        },
        None => Ok(()),
    }
}

/// Removes one occurrence of `value`, if there is one.
pub fn remove_value(handle: &ListHandle, value: i32) {
    if let Some(list) = handle.list() {
        if let Err(e) = list.remove(value) {
            trace!("remove of {} ignored: {}", value, e);
        }
    }
}

/// Prints the list to stdout in ascending order.
pub fn print_list(handle: &ListHandle) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = print_list_to(handle, &mut out) {
        error!("printing list failed: {}", e);
    }
}

pub fn print_list_to<W: Write>(handle: &ListHandle, out: &mut W) -> io::Result<()> {
    match handle.list() {
        Some(list) => list.print(out),
        None => writeln!(out),
    }
}

/// Counts the values satisfying `predicate` and reports the count on stdout.
///
/// `predicate` runs while part of the list is locked and must not operate on the same list.
pub fn count_list<P>(handle: &ListHandle, predicate: P) -> usize
where
    P: Fn(i32) -> bool,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    count_list_to(handle, &mut out, predicate).unwrap_or_else(|e| {
        error!("reporting count failed: {}", e);
        0
    })
}

pub fn count_list_to<W, P>(handle: &ListHandle, out: &mut W, predicate: P) -> io::Result<usize>
where
    W: Write,
    P: Fn(i32) -> bool,
{
    let count = handle
        .list()
        .and_then(|list| list.count(predicate).ok())
        .unwrap_or(0);
    writeln!(out, "{} items were counted", count)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn printed(handle: &ListHandle) -> String {
        let mut out = Vec::new();
        print_list_to(handle, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn counted<P: Fn(i32) -> bool>(handle: &ListHandle, predicate: P) -> String {
        let mut out = Vec::new();
        count_list_to(handle, &mut out, predicate).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn handle_scenario() {
        let handle = create_list();
        for &v in &[5, 3, 8, 3] {
            insert_value(&handle, v).unwrap();
        }
        assert_eq!(printed(&handle), "3 3 5 8 \n");

        remove_value(&handle, 5);
        assert_eq!(printed(&handle), "3 3 8 \n");
        assert_eq!(counted(&handle, |v| v % 2 == 0), "1 items were counted\n");
        assert_eq!(counted(&handle, |v| v > 3), "1 items were counted\n");
        assert_eq!(counted(&handle, |v| v % 2 == 1), "2 items were counted\n");

        remove_value(&handle, 42);
        assert_eq!(printed(&handle), "3 3 8 \n");

        delete_list(handle);
    }

    #[test]
    fn absent_handle() {
        let handle = ListHandle::absent();
        assert!(handle.is_absent());
        assert_eq!(insert_value(&handle, 1), Ok(()));
        remove_value(&handle, 1);
        assert_eq!(printed(&handle), "\n");
        assert_eq!(counted(&handle, |_| true), "0 items were counted\n");
        assert_eq!(format!("{:?}", handle), "ListHandle(absent)");
        delete_list(handle);
    }

    #[test]
    fn empty_list() {
        let handle = create_list();
        assert_eq!(printed(&handle), "\n");
        remove_value(&handle, 7);
        assert_eq!(counted(&handle, |_| true), "0 items were counted\n");
        delete_list(handle);
    }

    #[test]
    fn deleted_through_other_clone() {
        let handle = create_list();
        let other = handle.clone();
        insert_value(&handle, 1).unwrap();
        insert_value(&handle, 2).unwrap();
        delete_list(handle);

        assert_eq!(insert_value(&other, 3), Ok(()));
        remove_value(&other, 1);
        assert_eq!(printed(&other), "\n");
        assert_eq!(counted(&other, |_| true), "0 items were counted\n");
        delete_list(other);
    }

    #[test]
    fn threads_share_handle() {
        let handle = create_list();
        let threads: Vec<_> = (1..=16)
            .map(|v| {
                let handle = handle.clone();
                thread::spawn(move || insert_value(&handle, v).unwrap())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let expected: String = (1..=16).map(|v| format!("{} ", v)).collect();
        assert_eq!(printed(&handle), expected + "\n");
        assert_eq!(handle.list().map(|l| l.len().unwrap()), Some(16));
        delete_list(handle);
    }
}
