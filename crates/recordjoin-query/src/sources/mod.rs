//! Datasources that need no external system

mod empty;
mod table;

pub use empty::{EmptyFactory, EmptySource};
pub use table::{TableFactory, TableSource, KEY_SEPARATOR};
