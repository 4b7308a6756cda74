// String formatting intentionally uses format! for clarity
#![allow(clippy::format_push_string)]

use addr2line::Context;
use gimli::{EndianRcSlice, RunTimeEndian};
use log::{debug, info};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::domain::SymbolizeError;

/// Placeholder name for frames without any symbol information
pub const UNKNOWN_FUNCTION: &str = "<unknown>";

/// Symbolizer for resolving link-time addresses of one object file
///
/// Tries DWARF debug info first and falls back to the nearest preceding
/// function symbol of the ELF symbol table. Includes a cache to avoid
/// re-resolving the same addresses repeatedly.
pub struct Symbolizer {
    path: PathBuf,
    ctx: Context<EndianRcSlice<RunTimeEndian>>,
    symtab: Vec<SymtabEntry>,
    /// `(vaddr, file offset)` of the first loadable segment
    first_segment: Option<(u64, u64)>,
    /// Cache of resolved frames by address
    cache: RefCell<HashMap<u64, ResolvedFrame>>,
}

#[derive(Debug, Clone)]
struct SymtabEntry {
    address: u64,
    /// Exclusive end; zero-sized symbols end at the next symbol or their section's end
    end: u64,
    name: String,
}

impl Symbolizer {
    /// Create a new symbolizer for the given binary
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed, or if
    /// its DWARF sections are malformed
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self, SymbolizeError> {
        let path = binary_path.as_ref().to_path_buf();
        let binary_data = fs::read(&path)
            .map_err(|source| SymbolizeError::ReadFailed { path: path.clone(), source })?;

        let obj_file = object::File::parse(&*binary_data).map_err(|e| {
            SymbolizeError::ParseFailed { path: path.clone(), reason: e.to_string() }
        })?;

        // Load DWARF debug info
        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf)?;

        let symtab = load_symtab(&obj_file);
        let first_segment = obj_file
            .segments()
            .filter(|segment| segment.file_range().1 > 0)
            .map(|segment| (segment.address(), segment.file_range().0))
            .min_by_key(|&(_, offset)| offset);

        info!(
            "Loaded {} ({} function symbols, debug info: {})",
            path.display(),
            symtab.len(),
            obj_file.section_by_name(".debug_info").is_some()
        );

        Ok(Self { path, ctx, symtab, first_segment, cache: RefCell::new(HashMap::new()) })
    }

    /// Difference between runtime and link-time addresses for this object
    ///
    /// `base` is the runtime start of the mapping with the lowest file offset
    /// and `base_offset` is that mapping's file offset.
    #[must_use]
    pub fn load_bias(&self, base: u64, base_offset: u64) -> u64 {
        let (vaddr, offset) = self.first_segment.unwrap_or((0, 0));
        base.wrapping_sub(base_offset).wrapping_add(offset).wrapping_sub(vaddr)
    }

    /// Resolve a link-time address to source location information
    ///
    /// Uses a cache to avoid re-resolving the same address multiple times.
    pub fn resolve(&self, addr: u64) -> ResolvedFrame {
        // Check cache first
        if let Some(cached) = self.cache.borrow().get(&addr) {
            return cached.clone();
        }

        // Cache miss - perform actual resolution
        let mut result = Vec::new();

        if let Ok(mut frame_iter) = self.ctx.find_frames(addr).skip_all_loads() {
            while let Ok(Some(frame)) = frame_iter.next() {
                let function = frame
                    .function
                    .and_then(|f| f.demangle().ok().map(|s| s.to_string()))
                    .unwrap_or_else(|| UNKNOWN_FUNCTION.to_string());

                let location = frame.location.map(|loc| SourceLocation {
                    file: loc.file.map(std::string::ToString::to_string),
                    line: loc.line,
                    column: loc.column,
                });

                result.push(InlinedFrame { function, location });
            }
        }

        // DWARF may know the line but not the function (or nothing at all)
        if result.iter().all(|f| f.function == UNKNOWN_FUNCTION) {
            if let Some(name) = self.symtab_lookup(addr) {
                debug!("0x{addr:x} resolved from symbol table: {name}");
                match result.first_mut() {
                    Some(frame) => frame.function = name,
                    None => result.push(InlinedFrame { function: name, location: None }),
                }
            }
        }

        let resolved = ResolvedFrame {
            addr,
            module: self.module_name(),
            frames: if result.is_empty() {
                vec![InlinedFrame { function: UNKNOWN_FUNCTION.to_string(), location: None }]
            } else {
                result
            },
        };

        // Store in cache
        self.cache.borrow_mut().insert(addr, resolved.clone());

        resolved
    }

    /// Demangle a Rust symbol name
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }

    fn module_name(&self) -> Option<String> {
        self.path.file_name().map(|name| name.to_string_lossy().into_owned())
    }

    /// Nearest preceding function symbol, demangled
    fn symtab_lookup(&self, addr: u64) -> Option<String> {
        find_symbol(&self.symtab, addr).map(|entry| Self::demangle_symbol(&entry.name))
    }
}

fn find_symbol(symtab: &[SymtabEntry], addr: u64) -> Option<&SymtabEntry> {
    let idx = symtab.partition_point(|e| e.address <= addr).checked_sub(1)?;
    let entry = &symtab[idx];
    (addr < entry.end).then_some(entry)
}

/// Collect defined function symbols, sorted by address
///
/// Falls back to the dynamic symbol table for stripped shared objects.
fn load_symtab(obj_file: &object::File<'_>) -> Vec<SymtabEntry> {
    let mut entries = collect_functions(obj_file, obj_file.symbols());
    if entries.is_empty() {
        entries = collect_functions(obj_file, obj_file.dynamic_symbols());
    }
    entries.sort_by_key(|e| e.address);
    entries.dedup_by_key(|e| e.address);
    bound_by_next_symbol(&mut entries);
    entries
}

/// `end` holds the section end for zero-sized symbols until this clamps it
fn bound_by_next_symbol(entries: &mut [SymtabEntry]) {
    for idx in 1..entries.len() {
        let next = entries[idx].address;
        let entry = &mut entries[idx - 1];
        entry.end = entry.end.min(next);
    }
}

fn collect_functions<'data, S: ObjectSymbol<'data>>(
    obj_file: &object::File<'_>,
    symbols: impl Iterator<Item = S>,
) -> Vec<SymtabEntry> {
    symbols
        .filter(|sym| sym.kind() == SymbolKind::Text && sym.is_definition() && sym.address() != 0)
        .filter_map(|sym| {
            let name = sym.name().ok().filter(|n| !n.is_empty())?;
            let address = sym.address();
            let end = if sym.size() > 0 {
                address + sym.size()
            } else {
                // Never extend into the next section (e.g. .plt after .init)
                sym.section_index()
                    .and_then(|idx| obj_file.section_by_index(idx).ok())
                    .map_or(address + 1, |section| section.address() + section.size())
            };
            Some(SymtabEntry { address, end, name: name.to_string() })
        })
        .collect()
}

/// A resolved stack frame (may contain multiple inlined frames)
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedFrame {
    pub addr: u64,
    /// File name of the object the address belongs to
    pub module: Option<String>,
    /// Innermost inlined frame first
    pub frames: Vec<InlinedFrame>,
}

/// An inlined frame within a resolved frame
#[derive(Debug, Clone, Serialize)]
pub struct InlinedFrame {
    pub function: String,
    pub location: Option<SourceLocation>,
}

impl InlinedFrame {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.function != UNKNOWN_FUNCTION
    }

    #[must_use]
    pub fn file(&self) -> Option<&str> {
        self.location.as_ref().and_then(|loc| loc.file.as_deref())
    }
}

/// Source code location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ResolvedFrame {
    /// A frame with no symbol information for `addr`
    #[must_use]
    pub fn unknown(addr: u64, module: Option<String>) -> Self {
        Self {
            addr,
            module,
            frames: vec![InlinedFrame { function: UNKNOWN_FUNCTION.to_string(), location: None }],
        }
    }

    /// Returns true if any inlined frame has a function name
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.frames.iter().any(InlinedFrame::is_resolved)
    }

    /// Format the frame for display
    #[must_use]
    pub fn format(&self, frame_num: usize) -> String {
        let mut output = String::new();

        for (idx, inlined) in self.frames.iter().enumerate() {
            let prefix = if idx == 0 { format!("#{frame_num:<2}") } else { "   ".to_string() };

            output.push_str(&format!("{} 0x{:016x} {}", prefix, self.addr, inlined.function));
            if !inlined.is_resolved() {
                if let Some(ref module) = self.module {
                    output.push_str(&format!(" ({module})"));
                }
            }

            if let Some(ref loc) = inlined.location {
                if let Some(ref file) = loc.file {
                    output.push_str(&format!("\n                      at {file}"));
                    if let Some(line) = loc.line {
                        output.push_str(&format!(":{line}"));
                        if let Some(col) = loc.column {
                            output.push_str(&format!(":{col}"));
                        }
                    }
                }
            }

            if idx < self.frames.len() - 1 {
                output.push('\n');
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str, file: Option<&str>, line: Option<u32>) -> InlinedFrame {
        InlinedFrame {
            function: function.to_string(),
            location: file.map(|f| SourceLocation { file: Some(f.to_string()), line, column: None }),
        }
    }

    #[test]
    fn test_demangle_legacy_symbol_strips_hash() {
        let name = Symbolizer::demangle_symbol("_ZN4core3ptr13drop_in_place17h0123456789abcdefE");
        assert_eq!(name, "core::ptr::drop_in_place");
    }

    #[test]
    fn test_demangle_plain_symbol_is_unchanged() {
        assert_eq!(Symbolizer::demangle_symbol("main"), "main");
    }

    #[test]
    fn test_format_with_inlined_frames() {
        let resolved = ResolvedFrame {
            addr: 0x1234,
            module: Some("app".to_string()),
            frames: vec![
                frame("app::inner", Some("src/inner.rs"), Some(7)),
                frame("app::outer", Some("src/outer.rs"), None),
            ],
        };

        let text = resolved.format(3);
        assert!(text.starts_with("#3  0x0000000000001234 app::inner"));
        assert!(text.contains("at src/inner.rs:7"));
        assert!(text.contains("app::outer"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_format_unknown_mentions_module() {
        let resolved = ResolvedFrame::unknown(0x10, Some("libfoo.so".to_string()));
        assert!(!resolved.is_resolved());
        assert_eq!(resolved.format(0), "#0  0x0000000000000010 <unknown> (libfoo.so)");
    }

    fn symbol(address: u64, end: u64, name: &str) -> SymtabEntry {
        SymtabEntry { address, end, name: name.to_string() }
    }

    #[test]
    fn test_zero_sized_symbol_stops_at_next_symbol() {
        // `_init` has no size and its section runs to 0x1100; `helper` is sized
        let mut symtab = vec![
            symbol(0x1000, 0x1100, "_init"),
            symbol(0x1040, 0x1060, "helper"),
            symbol(0x2000, 0x2000 + 0x10, "main"),
        ];
        bound_by_next_symbol(&mut symtab);

        assert_eq!(find_symbol(&symtab, 0x1000).map(|e| e.name.as_str()), Some("_init"));
        assert_eq!(find_symbol(&symtab, 0x103f).map(|e| e.name.as_str()), Some("_init"));
        assert_eq!(find_symbol(&symtab, 0x1050).map(|e| e.name.as_str()), Some("helper"));
        // Padding between `helper` and `main`
        assert!(find_symbol(&symtab, 0x1080).is_none());
        assert!(find_symbol(&symtab, 0x0fff).is_none());
        assert!(find_symbol(&symtab, 0x2010).is_none());
    }

    #[test]
    fn test_zero_sized_symbol_stops_at_section_end() {
        // A stub table follows the section of the last symbol
        let mut symtab = vec![symbol(0x1000, 0x1020, "_init"), symbol(0x3000, 0x3100, "_fini")];
        bound_by_next_symbol(&mut symtab);

        assert_eq!(find_symbol(&symtab, 0x101f).map(|e| e.name.as_str()), Some("_init"));
        assert!(find_symbol(&symtab, 0x1030).is_none());
        assert_eq!(find_symbol(&symtab, 0x30ff).map(|e| e.name.as_str()), Some("_fini"));
        assert!(find_symbol(&symtab, 0x3100).is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Symbolizer::new("/definitely/not/here").err().expect("must fail");
        assert!(matches!(err, SymbolizeError::ReadFailed { .. }));
    }

    #[test]
    fn test_garbage_file_is_a_parse_error() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), b"not an object file").expect("write");

        let err = Symbolizer::new(file.path()).err().expect("must fail");
        assert!(matches!(err, SymbolizeError::ParseFailed { .. }));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_load_bias_for_current_exe() {
        use crate::domain::Pid;
        use crate::symbolization::ModuleMap;

        let exe = std::env::current_exe().expect("current exe");
        let symbolizer = Symbolizer::new(&exe).expect("symbolizer for test binary");
        let map = ModuleMap::for_pid(Pid::current()).expect("own maps");
        let base = map.base_region(exe.to_str().expect("utf-8 path")).expect("exe mapped");

        let bias = symbolizer.load_bias(base.range.start, base.offset);
        let here = test_load_bias_for_current_exe as fn() as usize as u64;

        let resolved = symbolizer.resolve(here - bias);
        assert!(resolved.is_resolved(), "{}", resolved.format(0));
        assert!(resolved.frames.iter().any(|f| f.function.contains("test_load_bias_for_current_exe")));
    }
}
