//! Source symbol extraction
//!
//! Walks a captured stack from the innermost frame outward, classifies every
//! (inlined) frame and reports the first one that belongs to user code.

use log::debug;
use serde::Serialize;
use std::fmt;

use crate::classification::{Classifier, FrameOrigin};
use crate::config::ExtractorConfig;
use crate::domain::Address;
use crate::resolver::{AddressResolver, StackFrame};
use crate::symbolization::{InlinedFrame, SourceLocation};

/// The frame a captured stack is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSymbol {
    pub address: u64,
    /// Demangled function name, if any symbol information was found
    pub function: Option<String>,
    pub location: Option<SourceLocation>,
    pub module: Option<String>,
    /// Link-time address within `module`
    pub relative: Option<u64>,
    /// Index of the frame in the captured stack
    pub frame_index: usize,
}

impl fmt::Display for SourceSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, &self.module, self.relative) {
            (Some(function), _, _) => write!(f, "{function}")?,
            (None, Some(module), Some(relative)) => write!(f, "{module}+0x{relative:x}")?,
            (None, Some(module), None) => write!(f, "{module}@0x{:x}", self.address)?,
            (None, None, _) => write!(f, "0x{:x}", self.address)?,
        }

        if let Some(SourceLocation { file: Some(file), line, .. }) = &self.location {
            write!(f, " ({file}")?;
            if let Some(line) = line {
                write!(f, ":{line}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A resolved stack frame with one origin per inlined frame
#[derive(Debug, Clone)]
pub struct ClassifiedFrame {
    pub frame: StackFrame,
    pub origins: Vec<FrameOrigin>,
}

/// Finds the source symbol of captured stacks in one process
pub struct SourceSymbolExtractor {
    resolver: AddressResolver,
    classifier: Classifier,
    config: ExtractorConfig,
}

impl SourceSymbolExtractor {
    #[must_use]
    pub fn new(resolver: AddressResolver, config: ExtractorConfig) -> Self {
        let classifier =
            Classifier::new(config.framework_prefixes.clone(), config.framework_modules.clone());
        Self { resolver, classifier, config }
    }

    #[must_use]
    pub fn for_current_process(config: ExtractorConfig) -> Self {
        Self::new(AddressResolver::for_current_process(), config)
    }

    /// Resolve and classify every frame of a stack
    #[must_use]
    pub fn classify_stack(&self, addresses: &[Address]) -> Vec<ClassifiedFrame> {
        self.resolver
            .resolve_stack(addresses, self.config.address_kind, self.config.max_frames)
            .into_iter()
            .map(|frame| {
                let module = frame.resolved.module.as_deref();
                let origins = frame
                    .resolved
                    .frames
                    .iter()
                    .map(|inlined| {
                        self.classifier.classify(
                            &inlined.function,
                            inlined.file(),
                            module,
                            frame.in_executable,
                        )
                    })
                    .collect();
                ClassifiedFrame { frame, origins }
            })
            .collect()
    }

    /// Find the source symbol of a captured stack
    ///
    /// Returns `None` for an empty stack, or when no frame is user code and
    /// `fallback_to_first_resolved` is off.
    #[must_use]
    pub fn extract(&self, addresses: &[Address]) -> Option<SourceSymbol> {
        if addresses.is_empty() {
            return None;
        }

        let mut fallback = None;
        for (frame_index, classified) in self.classify_stack(addresses).iter().enumerate() {
            let frame = &classified.frame;
            for (inlined, origin) in frame.resolved.frames.iter().zip(&classified.origins) {
                if origin.is_user_code() {
                    debug!("Source frame #{frame_index}: {}", inlined.function);
                    return Some(self.source_symbol(frame, inlined, frame_index));
                }
                if fallback.is_none() && *origin != FrameOrigin::Framework {
                    fallback = Some(self.source_symbol(frame, inlined, frame_index));
                }
            }
        }

        if self.config.fallback_to_first_resolved {
            fallback
        } else {
            debug!("No user code among {} addresses", addresses.len());
            None
        }
    }

    fn source_symbol(
        &self,
        frame: &StackFrame,
        inlined: &InlinedFrame,
        frame_index: usize,
    ) -> SourceSymbol {
        SourceSymbol {
            address: frame.address.0,
            function: inlined.is_resolved().then(|| inlined.function.clone()),
            location: if self.config.include_location { inlined.location.clone() } else { None },
            module: frame.resolved.module.clone(),
            relative: frame.relative,
            frame_index,
        }
    }
}

/// Extract a human-readable source symbol from raw stack addresses
///
/// `addresses` are return addresses of the calling process, innermost frame
/// first (as produced by [`crate::callsite::capture_call_stack`]). Frames of
/// this crate, the standard library and known third-party crates are
/// skipped; the first remaining frame is described as
/// `function (file:line)`. Returns `None` when the stack is empty or no
/// frame can be attributed to user code.
///
/// Only available in debug builds. Each thread keeps its own resolver, so
/// object files are parsed once per thread.
#[cfg(debug_assertions)]
#[must_use]
pub fn extract_source_symbol(addresses: &[usize]) -> Option<String> {
    thread_local! {
        static EXTRACTOR: SourceSymbolExtractor =
            SourceSymbolExtractor::for_current_process(ExtractorConfig::default().with_env_overrides());
    }

    if addresses.is_empty() {
        return None;
    }
    let addresses: Vec<Address> = addresses.iter().copied().map(Address::from).collect();
    // Formatting a CallSite from another thread-local's destructor lands here
    // after EXTRACTOR is gone
    EXTRACTOR
        .try_with(|extractor| extractor.extract(&addresses))
        .unwrap_or_else(|_| {
            debug!("Source symbol requested during thread teardown");
            None
        })
        .map(|symbol| symbol.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressKind, Pid};
    use crate::symbolization::{MappedRegion, MemoryRange};

    fn offline_extractor(config: ExtractorConfig) -> SourceSymbolExtractor {
        let regions = vec![MappedRegion {
            range: MemoryRange { start: 0x1000, end: 0x2000 },
            offset: 0,
            path: "/nonexistent/libgone.so".to_string(),
        }];
        SourceSymbolExtractor::new(AddressResolver::with_regions(Pid(1), regions, None), config)
    }

    #[inline(never)]
    fn marker_function() -> u64 {
        std::hint::black_box(11)
    }

    #[test]
    fn test_empty_stack() {
        let extractor = offline_extractor(ExtractorConfig::default());
        assert_eq!(extractor.extract(&[]), None);
    }

    #[test]
    fn test_unresolvable_stack_is_none() {
        let extractor = offline_extractor(ExtractorConfig::default());
        assert_eq!(extractor.extract(&[Address(0x1800), Address(0x5000)]), None);
    }

    #[test]
    fn test_fallback_reports_module_offset() {
        let config = ExtractorConfig { fallback_to_first_resolved: true, ..Default::default() };
        let extractor = offline_extractor(config);

        let symbol = extractor.extract(&[Address(0x1800)]).expect("fallback frame");
        assert_eq!(symbol.function, None);
        assert_eq!(symbol.frame_index, 0);
        assert_eq!(symbol.to_string(), "libgone.so+0x7ff");
    }

    #[test]
    fn test_fallback_skips_framework_modules() {
        let config = ExtractorConfig {
            fallback_to_first_resolved: true,
            framework_modules: vec!["libgone.so".to_string()],
            ..Default::default()
        };
        let extractor = offline_extractor(config);

        let symbol = extractor.extract(&[Address(0x1800), Address(0x9000)]).expect("fallback frame");
        assert_eq!(symbol.frame_index, 1);
        assert_eq!(symbol.to_string(), "0x9000");
    }

    #[test]
    fn test_display_with_location() {
        let symbol = SourceSymbol {
            address: 0x10,
            function: Some("app::build_signal".to_string()),
            location: Some(SourceLocation {
                file: Some("src/signals.rs".to_string()),
                line: Some(42),
                column: Some(9),
            }),
            module: Some("app".to_string()),
            relative: Some(0x10),
            frame_index: 3,
        };
        assert_eq!(symbol.to_string(), "app::build_signal (src/signals.rs:42)");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_exact_function_address_in_process() {
        // Unit tests live inside this crate, so stop skipping its frames
        let config = ExtractorConfig {
            framework_prefixes: Vec::new(),
            address_kind: AddressKind::Exact,
            ..Default::default()
        };
        let extractor = SourceSymbolExtractor::for_current_process(config);
        let addr = Address::from(marker_function as fn() -> u64 as usize);

        let symbol = extractor.extract(&[addr]).expect("own function resolves");
        assert!(symbol.to_string().contains("marker_function"), "{symbol}");
        assert_eq!(symbol.address, addr.0);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_own_crate_is_framework_by_default() {
        let config = ExtractorConfig { address_kind: AddressKind::Exact, ..Default::default() };
        let extractor = SourceSymbolExtractor::for_current_process(config);
        let addr = Address::from(marker_function as fn() -> u64 as usize);

        let classified = extractor.classify_stack(&[addr]);
        assert_eq!(classified.len(), 1);
        assert!(classified[0].origins.contains(&FrameOrigin::Framework));
        assert_eq!(extractor.extract(&[addr]), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_entry_point_handles_empty_and_null() {
        assert_eq!(extract_source_symbol(&[]), None);
        assert_eq!(extract_source_symbol(&[0, 0, 0]), None);
    }
}
