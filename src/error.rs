use thiserror::Error;

/// Ways an operation on a [`SortedList`](crate::coupled::SortedList) can fail.
///
/// Only `Allocation` means the caller asked for something that could not be done;
/// the other variants describe the list's state and are routinely ignored by the
/// handle functions in [`coupled`](crate::coupled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("could not allocate a list node")]
    Allocation,

    #[error("no node holds the value {0}")]
    NotFound(i32),

    #[error("the list is empty")]
    Empty,

    #[error("the list has been deleted")]
    Closed,
}
