//! Runtime address resolution
//!
//! Turns runtime addresses of one process into resolved frames:
//! - Finds the mapped object for each address
//! - Loads (and caches) one [`Symbolizer`] per object
//! - Subtracts the object's load bias before the lookup
//! - Falls back to `dladdr` for the current process

use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::domain::{Address, AddressKind, Pid, SymbolizeError};
use crate::symbolization::{InlinedFrame, MappedRegion, ModuleMap, ResolvedFrame, Symbolizer};

/// A resolved address together with where it was found
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub address: Address,
    pub resolved: ResolvedFrame,
    /// Address lies in the process's main executable
    pub in_executable: bool,
    /// Lookup address relative to the owning object (link-time address)
    pub relative: Option<u64>,
}

/// Resolves runtime addresses of a single process
///
/// Caches are interior-mutable (`RefCell`), so a resolver stays on one
/// thread.
pub struct AddressResolver {
    pid: Pid,
    modules: RefCell<ModuleMap>,
    /// Whether `modules` can be re-read from procfs
    live: bool,
    main_executable: Option<String>,
    /// `None` marks objects that failed to load
    symbolizers: RefCell<HashMap<String, Option<Rc<Symbolizer>>>>,
}

impl AddressResolver {
    /// Resolver for the calling process
    ///
    /// Never fails: without readable memory maps only `dladdr` is used.
    #[must_use]
    pub fn for_current_process() -> Self {
        let pid = Pid::current();
        let modules = if cfg!(target_os = "linux") {
            ModuleMap::for_pid(pid).unwrap_or_else(|e| {
                warn!("{e:#}; falling back to dladdr only");
                ModuleMap::default()
            })
        } else {
            ModuleMap::default()
        };
        let main_executable =
            std::env::current_exe().ok().and_then(|p| p.to_str().map(ToOwned::to_owned));

        Self::build(pid, modules, cfg!(target_os = "linux"), main_executable)
    }

    /// Resolver for another process, reading its binaries from disk
    ///
    /// # Errors
    /// Returns an error if `/proc/<pid>/maps` cannot be read or procfs is
    /// not available on this platform
    pub fn for_pid(pid: Pid) -> Result<Self, SymbolizeError> {
        if !cfg!(target_os = "linux") {
            return Err(SymbolizeError::UnsupportedPlatform);
        }
        let modules = ModuleMap::for_pid(pid).map_err(|e| {
            debug!("{e:#}");
            SymbolizeError::MemoryMapsUnavailable(pid.0)
        })?;
        let main_executable = resolve_exe_path(pid).and_then(|p| p.to_str().map(ToOwned::to_owned));

        Ok(Self::build(pid, modules, true, main_executable))
    }

    /// Resolver over a fixed set of regions
    #[must_use]
    pub fn with_regions(
        pid: Pid,
        regions: Vec<MappedRegion>,
        main_executable: Option<String>,
    ) -> Self {
        Self::build(pid, ModuleMap::from_regions(regions), false, main_executable)
    }

    fn build(pid: Pid, modules: ModuleMap, live: bool, main_executable: Option<String>) -> Self {
        Self {
            pid,
            modules: RefCell::new(modules),
            live,
            main_executable,
            symbolizers: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve every address of a captured stack, innermost first
    ///
    /// The walk stops at the first null address or after `max_frames`.
    pub fn resolve_stack(
        &self,
        addresses: &[Address],
        kind: AddressKind,
        max_frames: usize,
    ) -> Vec<StackFrame> {
        addresses
            .iter()
            .take(max_frames)
            .take_while(|addr| !addr.is_null())
            .map(|&addr| self.resolve(addr, kind))
            .collect()
    }

    /// Resolve a single runtime address
    pub fn resolve(&self, address: Address, kind: AddressKind) -> StackFrame {
        let lookup = address.lookup_address(kind);

        let Some(region) = self.region_for(lookup) else {
            debug!("{address} is not in any file-backed mapping of {}", self.pid);
            return StackFrame {
                address,
                resolved: self.dynamic_lookup(address, lookup, None),
                in_executable: false,
                relative: None,
            };
        };

        let in_executable = self.main_executable.as_deref() == Some(region.path.as_str());
        let module = module_name(&region.path);

        let (resolved, relative) = match self.symbolizer_for(&region.path) {
            Some(symbolizer) => {
                let relative = lookup.wrapping_sub(self.load_bias(&symbolizer, &region));
                let mut resolved = symbolizer.resolve(relative);
                resolved.addr = address.0;
                if !resolved.is_resolved() {
                    resolved = self.dynamic_lookup(address, lookup, module);
                }
                (resolved, relative)
            }
            None => {
                // No object to read segments from; report the file offset
                let relative = lookup - region.range.start + region.offset;
                (self.dynamic_lookup(address, lookup, module), relative)
            }
        };

        StackFrame { address, resolved, in_executable, relative: Some(relative) }
    }

    /// Find the mapping for an address, re-reading the maps once on a miss
    ///
    /// Objects loaded after the resolver was created are picked up this way.
    fn region_for(&self, addr: u64) -> Option<MappedRegion> {
        if let Some(region) = self.modules.borrow().find(addr) {
            return Some(region.clone());
        }
        if !self.live {
            return None;
        }

        match ModuleMap::for_pid(self.pid) {
            Ok(fresh) => {
                let region = fresh.find(addr).cloned();
                *self.modules.borrow_mut() = fresh;
                region
            }
            Err(e) => {
                debug!("{e:#}");
                None
            }
        }
    }

    fn load_bias(&self, symbolizer: &Symbolizer, region: &MappedRegion) -> u64 {
        let modules = self.modules.borrow();
        let base = modules.base_region(&region.path).unwrap_or(region);
        symbolizer.load_bias(base.range.start, base.offset)
    }

    fn symbolizer_for(&self, path: &str) -> Option<Rc<Symbolizer>> {
        if let Some(cached) = self.symbolizers.borrow().get(path) {
            return cached.clone();
        }

        let loaded = match Symbolizer::new(path) {
            Ok(symbolizer) => Some(Rc::new(symbolizer)),
            Err(e) => {
                warn!("Cannot symbolize {path}: {e}");
                None
            }
        };
        self.symbolizers.borrow_mut().insert(path.to_string(), loaded.clone());
        loaded
    }

    /// Last resort: ask the dynamic loader (current process only)
    fn dynamic_lookup(&self, address: Address, lookup: u64, module: Option<String>) -> ResolvedFrame {
        if self.pid.is_current() {
            if let Some((function, object)) = dladdr_lookup(lookup) {
                debug!("{address} resolved by dladdr: {function}");
                return ResolvedFrame {
                    addr: address.0,
                    module: module.or_else(|| object.as_deref().and_then(module_name)),
                    frames: vec![InlinedFrame { function, location: None }],
                };
            }
        }
        ResolvedFrame::unknown(address.0, module)
    }
}

fn module_name(path: &str) -> Option<String> {
    std::path::Path::new(path).file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Resolve binary path from PID via `/proc/<pid>/exe`.
fn resolve_exe_path(pid: Pid) -> Option<PathBuf> {
    let exe_link = format!("/proc/{}/exe", pid.0);
    std::fs::read_link(&exe_link).map_err(|e| debug!("Cannot read {exe_link}: {e}")).ok()
}

/// Symbol name and object path reported by the dynamic loader
#[cfg(unix)]
#[allow(unsafe_code)] // dladdr is an FFI call
fn dladdr_lookup(addr: u64) -> Option<(String, Option<String>)> {
    use std::ffi::CStr;

    let addr = usize::try_from(addr).ok()?;
    // SAFETY: Dl_info is plain old data; an all-zero value is valid.
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    // SAFETY: dladdr only reads loader bookkeeping for the given address and
    // writes into `info`.
    if unsafe { libc::dladdr(addr as *const libc::c_void, &mut info) } == 0 {
        return None;
    }
    if info.dli_sname.is_null() {
        return None;
    }

    // SAFETY: non-null dli_* strings point into loader-owned, NUL-terminated
    // storage that lives as long as the object stays loaded.
    let name = unsafe { CStr::from_ptr(info.dli_sname) }.to_string_lossy();
    let object = (!info.dli_fname.is_null())
        .then(|| unsafe { CStr::from_ptr(info.dli_fname) }.to_string_lossy().into_owned());

    Some((Symbolizer::demangle_symbol(&name), object))
}

#[cfg(not(unix))]
fn dladdr_lookup(_addr: u64) -> Option<(String, Option<String>)> {
    None
}
