//! Domain types providing compile-time safety and self-documentation

use std::fmt;

/// Process ID
///
/// Selects whose `/proc/<pid>/maps` an address resolver reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// The process this code is running in.
    #[must_use]
    pub fn current() -> Self {
        Pid(std::process::id())
    }

    /// Returns true if this is the calling process.
    #[must_use]
    pub fn is_current(self) -> bool {
        self == Self::current()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Pid(pid)
    }
}

/// Raw runtime address captured from a call stack
///
/// Zero marks the end of a stack (padding in fixed-size capture buffers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u64);

impl Address {
    /// Returns true if this address terminates a stack walk
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address used for symbol lookup.
    ///
    /// Return addresses point at the instruction after the call, which may
    /// already belong to the next function or line, so they are probed one
    /// byte earlier.
    #[must_use]
    pub fn lookup_address(self, kind: AddressKind) -> u64 {
        match kind {
            AddressKind::ReturnAddress => self.0.saturating_sub(1),
            AddressKind::Exact => self.0,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<usize> for Address {
    fn from(addr: usize) -> Self {
        Address(addr as u64)
    }
}

impl From<u64> for Address {
    fn from(addr: u64) -> Self {
        Address(addr)
    }
}

/// How a captured address relates to the code it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    /// Return address from a captured call stack
    #[default]
    ReturnAddress,
    /// Exact instruction pointer or function entry address
    Exact,
}
