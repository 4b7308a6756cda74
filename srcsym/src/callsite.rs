//! Call-site capture
//!
//! Objects that want to remember where they were created keep a
//! [`CallSite`]. The stack is captured eagerly (cheap: addresses only) and
//! symbolized the first time someone looks at it, typically through the
//! `Debug` output in a debugger or a log line.
//!
//! ```
//! use srcsym::callsite::CallSite;
//!
//! #[derive(Debug)]
//! struct Signal {
//!     created_at: CallSite,
//! }
//!
//! let signal = Signal { created_at: CallSite::capture() };
//! println!("{signal:?}");
//! ```

use std::fmt;
use std::sync::OnceLock;

use crate::extractor::extract_source_symbol;

/// Deepest stack recorded by [`capture_call_stack`]
pub const MAX_CAPTURED_FRAMES: usize = 128;

/// Return addresses of the current thread, innermost frame first
#[inline(never)]
#[must_use]
pub fn capture_call_stack() -> Vec<usize> {
    let mut addresses = Vec::with_capacity(32);
    backtrace::trace(|frame| {
        addresses.push(frame.ip() as usize);
        addresses.len() < MAX_CAPTURED_FRAMES
    });
    addresses
}

/// The call stack at the point an object was created
pub struct CallSite {
    addresses: Vec<usize>,
    source: OnceLock<Option<String>>,
}

impl CallSite {
    /// Record the caller's stack
    #[inline(never)]
    #[must_use]
    pub fn capture() -> Self {
        Self { addresses: capture_call_stack(), source: OnceLock::new() }
    }

    /// Wrap an already captured stack
    #[must_use]
    pub fn from_addresses(addresses: Vec<usize>) -> Self {
        Self { addresses, source: OnceLock::new() }
    }

    #[must_use]
    pub fn addresses(&self) -> &[usize] {
        &self.addresses
    }

    /// Symbol of the frame that created this call site, resolved once
    #[must_use]
    pub fn source_symbol(&self) -> Option<&str> {
        self.source.get_or_init(|| extract_source_symbol(&self.addresses)).as_deref()
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("source", &self.source_symbol().unwrap_or("<unknown>"))
            .field("frames", &self.addresses.len())
            .finish()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_symbol().unwrap_or("<unknown call site>"))
    }
}
