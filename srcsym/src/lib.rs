//! # srcsym - Source Symbols for Captured Call Stacks
//!
//! srcsym answers one debugging question: *which line of my code created
//! this object?* A framework captures the call stack when an object is
//! constructed; later, in a debugger or a log line, srcsym turns that list
//! of raw return addresses into the name of the first frame that belongs to
//! the application rather than to the framework, the standard library or a
//! third-party crate.
//!
//! ## Architecture Overview
//!
//! ```text
//!   capture_call_stack()          raw return addresses, innermost first
//!            │
//!            ▼
//! ┌──────────────────────┐   ┌───────────────────────┐
//! │   AddressResolver    │──▶│      Symbolizer       │  one per object file
//! │  /proc/<pid>/maps    │   │ DWARF → symtab → dladdr│
//! └──────────┬───────────┘   └───────────────────────┘
//!            ▼
//! ┌──────────────────────┐
//! │      Classifier      │  framework / std / third-party / user code
//! └──────────┬───────────┘
//!            ▼
//!   "my_app::signals::build (src/signals.rs:42)"
//! ```
//!
//! ## Module Structure
//!
//! - [`extractor`]: [`SourceSymbolExtractor`] and the debug-only
//!   [`extract_source_symbol`] entry point
//! - [`resolver`]: runtime address → object file → resolved frame
//! - [`symbolization`]: memory maps and per-object DWARF/symbol-table lookup
//! - [`classification`]: decides which frames count as user code
//! - [`config`]: [`ExtractorConfig`] from defaults, JSON and environment
//! - `callsite`: stack capture and [`CallSite`] (debug builds only)
//! - `ffi`: C ABI matching `include/srcsym.h` (debug builds only)
//! - [`cli`]: arguments of the `srcsym` binary
//! - [`domain`]: newtypes and error enums
//!
//! ## Debug Builds Only
//!
//! The in-process entry points ([`extract_source_symbol`], [`CallSite`], the
//! C ABI) exist only when `debug_assertions` are enabled. Release builds must
//! not reference them; callers gate their own use with
//! `#[cfg(debug_assertions)]`. The offline machinery (resolver, extractor,
//! CLI) is always available.
//!
//! ## Typical Usage
//!
//! ```
//! # #[cfg(debug_assertions)]
//! # fn main() {
//! let stack = srcsym::callsite::capture_call_stack();
//! if let Some(symbol) = srcsym::extract_source_symbol(&stack) {
//!     println!("created at {symbol}");
//! }
//! # }
//! # #[cfg(not(debug_assertions))]
//! # fn main() {}
//! ```

pub mod classification;
pub mod cli;
pub mod config;
pub mod domain;
pub mod extractor;
pub mod resolver;
pub mod symbolization;

#[cfg(debug_assertions)]
pub mod callsite;
#[cfg(debug_assertions)]
pub mod ffi;

pub use config::ExtractorConfig;
pub use extractor::{SourceSymbol, SourceSymbolExtractor};

#[cfg(debug_assertions)]
pub use callsite::CallSite;
#[cfg(debug_assertions)]
pub use extractor::extract_source_symbol;
