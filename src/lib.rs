extern crate crossbeam as cx;
#[macro_use]
extern crate log;
extern crate thiserror;
extern crate thread_local;

#[cfg(test)]
extern crate rand;

pub mod coupled;
pub mod error;

pub use coupled::{
    count_list, count_list_to, create_list, delete_list, insert_value, print_list, print_list_to,
    remove_value, ListHandle, SortedList,
};
pub use error::ListError;
