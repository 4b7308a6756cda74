//! Command-line interface of the `srcsym` binary

pub mod args;
pub mod report;

pub use args::{parse_address, Args};
pub use report::Report;
