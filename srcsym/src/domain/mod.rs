//! Domain model for srcsym
//!
//! Core newtypes and error enums shared by the resolver, the extractor and
//! the CLI:
//! - Compile-time separation of runtime addresses and process IDs
//! - Structured error handling

pub mod errors;
pub mod types;

pub use types::{Address, AddressKind, Pid};

pub use errors::{ConfigError, SymbolizeError};
