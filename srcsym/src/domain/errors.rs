//! Structured error types for srcsym
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SymbolizeError {
    #[error("Failed to read object file {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse object file {}: {reason}", .path.display())]
    ParseFailed { path: PathBuf, reason: String },

    #[error("Failed to load DWARF debug information: {0}")]
    Dwarf(#[from] gimli::Error),

    #[error("Failed to read /proc/{0}/maps")]
    MemoryMapsUnavailable(u32),

    #[error("Address resolution is not supported on this platform")]
    UnsupportedPlatform,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("max_frames must be greater than zero")]
    ZeroMaxFrames,
}
