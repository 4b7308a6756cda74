//! # Symbol Resolution and Address Translation
//!
//! This module converts raw return addresses captured from a call stack into
//! function names, file paths and line numbers.
//!
//! ## The Problem
//!
//! A captured stack is a list of runtime addresses like `0x55f3a2b4c780`.
//! Debug information in the object file describes **link-time** addresses
//! (`0x4780`), and every loaded object (the executable and each shared
//! library) is placed at a randomized base by ASLR. Resolution therefore
//! needs two steps:
//!
//! ```text
//! 1. Find the object the address belongs to (/proc/<pid>/maps)
//!    0x55f3a2b4c780 → /usr/bin/my-app, mapped at 0x55f3a2b48000 (offset 0)
//!
//! 2. Subtract the load bias and look the result up in that object
//!    bias    = map start - map offset + segment offset - segment vaddr
//!    lookup  = 0x55f3a2b4c780 - bias = 0x4780
//!    0x4780 → my_app::handlers::build_signal at src/handlers.rs:42
//! ```
//!
//! ## Lookup Order
//!
//! 1. DWARF debug info via `addr2line` (function, file, line, inlined frames)
//! 2. The ELF symbol table (nearest preceding function symbol)
//! 3. `dladdr` for the current process (exported dynamic symbols)
//!
//! Names are demangled with `rustc-demangle`; the trailing hash is dropped.
//!
//! ## Module Structure
//!
//! - **`memory_maps`**: Parses `/proc/<pid>/maps` into file-backed regions
//! - **`symbolizer`**: Per-object DWARF and symbol-table resolution with a cache
//!
//! ## Limitations
//!
//! - **Debug info**: file and line need `debug = true` (the dev profile default)
//! - **Linux**: memory maps come from procfs; elsewhere only `dladdr` is used
//! - **Split debug info**: `.dwo`/`.dwp` files and debuglink are not followed

pub mod memory_maps;
pub mod symbolizer;

pub use memory_maps::{MappedRegion, MemoryRange, ModuleMap};
pub use symbolizer::{InlinedFrame, ResolvedFrame, SourceLocation, Symbolizer, UNKNOWN_FUNCTION};
