//! Memory mapping utilities for process address space analysis
//!
//! This module parses `/proc/<pid>/maps` into a sorted list of file-backed
//! regions. The resolver uses it to find which object file a runtime address
//! belongs to and where that object was loaded, which is needed to translate
//! addresses from position-independent executables (PIE) and shared
//! libraries back to link-time addresses.

use anyhow::{Context, Result};
use log::debug;
use std::fs;

use crate::domain::Pid;

/// Memory range of a loaded binary in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// One file-backed line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub range: MemoryRange,
    /// File offset of the first mapped byte
    pub offset: u64,
    pub path: String,
}

impl MappedRegion {
    /// Parse a single maps line: "start-end perms offset dev inode pathname"
    ///
    /// Anonymous mappings and kernel pseudo-files (`[heap]`, `[vdso]`, ...)
    /// yield `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(6, char::is_whitespace);
        let range = fields.next()?;
        let _perms = fields.next()?;
        let offset = fields.next()?;
        let _dev = fields.next()?;
        let _inode = fields.next()?;
        let path = fields.next()?.trim_start();

        if path.is_empty() || path.starts_with('[') {
            return None;
        }
        let path = path.strip_suffix(" (deleted)").unwrap_or(path);

        let (start, end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        let offset = u64::from_str_radix(offset, 16).ok()?;

        Some(Self { range: MemoryRange { start, end }, offset, path: path.to_string() })
    }
}

/// File-backed regions of one process, sorted by start address
#[derive(Debug, Clone, Default)]
pub struct ModuleMap {
    regions: Vec<MappedRegion>,
}

impl ModuleMap {
    /// Build a map from the text of a maps file
    #[must_use]
    pub fn parse(maps: &str) -> Self {
        let mut regions: Vec<MappedRegion> = maps.lines().filter_map(MappedRegion::parse).collect();
        regions.sort_by_key(|r| r.range.start);
        Self { regions }
    }

    /// Read and parse `/proc/<pid>/maps`
    ///
    /// # Errors
    /// Returns an error if the maps file cannot be read
    pub fn for_pid(pid: Pid) -> Result<Self> {
        let maps_path = format!("/proc/{}/maps", pid.0);
        let maps = fs::read_to_string(&maps_path).context(format!("Failed to read {maps_path}"))?;
        let map = Self::parse(&maps);
        debug!("{pid}: {} file-backed regions", map.regions.len());
        Ok(map)
    }

    #[must_use]
    pub fn from_regions(mut regions: Vec<MappedRegion>) -> Self {
        regions.sort_by_key(|r| r.range.start);
        Self { regions }
    }

    /// Find the region containing an address
    #[must_use]
    pub fn find(&self, addr: u64) -> Option<&MappedRegion> {
        let idx = self.regions.partition_point(|r| r.range.start <= addr);
        let region = self.regions.get(idx.checked_sub(1)?)?;
        region.range.contains(addr).then_some(region)
    }

    /// The mapping of a binary with the lowest file offset
    ///
    /// This is normally the offset-0 mapping whose start is the load base.
    #[must_use]
    pub fn base_region(&self, binary_path: &str) -> Option<&MappedRegion> {
        self.regions.iter().filter(|r| r.path == binary_path).min_by_key(|r| (r.offset, r.range.start))
    }
}
