//! Frame origin classification for finding the source frame of a stack.
//!
//! A captured stack starts inside the machinery that captured it (this
//! crate, the unwinder, the standard library) and usually passes through
//! framework code before reaching the code that actually asked for the
//! capture. The source frame is the first frame, walking outward, that is
//! classified as [`FrameOrigin::UserCode`].
//!
//! # Classification Strategy
//!
//! 1. **Framework rules** - configured function prefixes and module names
//! 2. **File path patterns** - most reliable when DWARF info is available
//!    - `registry/src/` and `.cargo/git/` → Third-party crate
//!    - `.rustup/toolchains/` and `/rustc/` → Rust standard library
//! 3. **Function name prefixes** - known std and third-party crates, whatever
//!    their source path (custom `CARGO_HOME`, vendored sources)
//! 4. **Memory range** - last resort for unresolved frames

use log::warn;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::symbolization::UNKNOWN_FUNCTION;

/// Origin of a stack frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    /// Application code (relative paths, no known library patterns)
    UserCode,
    /// Code whose frames are skipped when looking for the source frame
    Framework,
    /// Rust standard library (std, core, alloc)
    StdLib,
    /// Third-party crates from the cargo registry or system locations
    ThirdParty,
    /// Could not determine origin (no debug info, raw address)
    #[default]
    Unknown,
}

impl FrameOrigin {
    /// Returns true if this frame can be reported as a source symbol
    #[must_use]
    pub fn is_user_code(&self) -> bool {
        matches!(self, FrameOrigin::UserCode)
    }
}

/// Classify a stack frame based on its function name and file path.
///
/// # Arguments
///
/// * `function` - Fully qualified, demangled function name
/// * `file` - Source file path from DWARF debug info, if available
/// * `in_executable` - Whether the address is within the main executable
///
/// # Examples
///
/// ```
/// use srcsym::classification::{classify_frame, FrameOrigin};
///
/// assert_eq!(classify_frame("myapp::main", Some("src/main.rs"), true), FrameOrigin::UserCode);
/// assert_eq!(classify_frame("std::rt::lang_start", None, true), FrameOrigin::StdLib);
/// ```
#[must_use]
pub fn classify_frame(function: &str, file: Option<&str>, in_executable: bool) -> FrameOrigin {
    // Frames we couldn't resolve should not be classified as user code
    if function == UNKNOWN_FUNCTION || function.starts_with("0x") {
        return FrameOrigin::Unknown;
    }

    if let Some(path) = file {
        diagnostics().record_classification(function, true);

        // e.g. /home/user/.cargo/registry/src/index.crates.io-xxx/backtrace-0.3.74/src/lib.rs
        // or $CARGO_HOME/registry/src/... for a relocated cargo home
        if path.contains(".cargo/registry/")
            || path.contains(".cargo\\registry\\")
            || path.contains("/registry/src/")
            || path.contains(".cargo/git/checkouts/")
        {
            return FrameOrigin::ThirdParty;
        }

        // e.g. /home/user/.rustup/toolchains/stable-x86_64/lib/rustlib/src/rust/library/std/
        if path.contains(".rustup/toolchains/") || path.contains(".rustup\\toolchains\\") {
            return FrameOrigin::StdLib;
        }

        // e.g. /rustc/abc123.../library/std/src/rt.rs
        if path.contains("/rustc/") || path.contains("\\rustc\\") {
            return FrameOrigin::StdLib;
        }

        // C runtime and system library sources
        if path.starts_with("/usr/") || path.starts_with("/lib/") || path.starts_with("./csu/") {
            return FrameOrigin::ThirdParty;
        }

        // Vendored crates are only recognizable by name; any other path is user code
        return classify_by_function_prefix(function).unwrap_or(FrameOrigin::UserCode);
    }

    // Fallback when file paths aren't available (stripped binaries, etc.)
    diagnostics().record_classification(function, false);

    if let Some(origin) = classify_by_function_prefix(function) {
        return origin;
    }

    if in_executable {
        // Inside main executable but couldn't identify - assume user code
        return FrameOrigin::UserCode;
    }

    // Outside main executable (shared library)
    FrameOrigin::Unknown
}

/// [`classify_frame`] with framework rules applied first
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    framework_prefixes: Vec<String>,
    framework_modules: Vec<String>,
}

impl Classifier {
    #[must_use]
    pub fn new(framework_prefixes: Vec<String>, framework_modules: Vec<String>) -> Self {
        Self { framework_prefixes, framework_modules }
    }

    /// Classify one (possibly inlined) frame
    ///
    /// `module` is the file name of the object the frame belongs to.
    #[must_use]
    pub fn classify(
        &self,
        function: &str,
        file: Option<&str>,
        module: Option<&str>,
        in_executable: bool,
    ) -> FrameOrigin {
        if self.is_framework(function, module) {
            return FrameOrigin::Framework;
        }
        classify_frame(function, file, in_executable)
    }

    fn is_framework(&self, function: &str, module: Option<&str>) -> bool {
        // Trait impls demangle as "<T as Trait>::method"; match the inner path too
        let inner = function.trim_start_matches('<');
        self.framework_prefixes
            .iter()
            .any(|p| function.starts_with(p.as_str()) || inner.starts_with(p.as_str()))
            || module.is_some_and(|m| self.framework_modules.iter().any(|fm| fm == m))
    }
}

/// Standard library module prefixes
const STD_PREFIXES: &[&str] = &["std::", "core::", "alloc::", "__rust_", "rust_begin_unwind"];

/// Common third-party crate and C runtime prefixes (function names)
const THIRD_PARTY_PREFIXES: &[&str] = &[
    "backtrace::",
    "addr2line::",
    "gimli::",
    "tokio::",
    "futures::",
    "futures_util::",
    "serde::",
    "serde_json::",
    "tracing::",
    "log::",
    "crossbeam::",
    "rayon::",
    "parking_lot::",
    "_Unwind_",
    "__libc_start",
    "_start",
    "start_thread",
    "clone3",
];

/// Classify a function by its module prefix.
fn classify_by_function_prefix(function: &str) -> Option<FrameOrigin> {
    [(STD_PREFIXES, FrameOrigin::StdLib), (THIRD_PARTY_PREFIXES, FrameOrigin::ThirdParty)]
        .into_iter()
        .find(|(prefixes, _)| prefixes.iter().any(|p| function.starts_with(p)))
        .map(|(_, origin)| origin)
}

/// Tracks how often classification had to fall back to function prefix
/// heuristics because a frame had no debug info.
pub struct ClassificationDiagnostics {
    /// Functions that have already been warned about (to avoid log spam)
    warned_functions: Mutex<HashSet<String>>,
    frames_with_debug_info: AtomicU64,
    frames_without_debug_info: AtomicU64,
}

impl ClassificationDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            warned_functions: Mutex::new(HashSet::new()),
            frames_with_debug_info: AtomicU64::new(0),
            frames_without_debug_info: AtomicU64::new(0),
        }
    }

    /// Record a frame classification, warning once per function without debug info.
    pub fn record_classification(&self, function: &str, had_file_path: bool) {
        if had_file_path {
            self.frames_with_debug_info.fetch_add(1, Ordering::Relaxed);
        } else {
            self.frames_without_debug_info.fetch_add(1, Ordering::Relaxed);

            if let Ok(mut warned) = self.warned_functions.lock() {
                if warned.insert(function.to_owned()) {
                    warn!("No debug info for '{function}' - using function prefix heuristic");
                }
            }
        }
    }

    /// Percentage of classified frames that had debug info available.
    ///
    /// Returns 100.0 if no frames have been classified yet.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for percentages
    #[must_use]
    pub fn debug_info_coverage(&self) -> f64 {
        let with = self.frames_with_debug_info.load(Ordering::Relaxed);
        let without = self.frames_without_debug_info.load(Ordering::Relaxed);
        let total = with + without;

        if total > 0 {
            (with as f64 / total as f64) * 100.0
        } else {
            100.0
        }
    }

    /// Returns true if debug info coverage is below 50%.
    #[must_use]
    pub fn has_low_coverage(&self) -> bool {
        self.debug_info_coverage() < 50.0
    }
}

impl Default for ClassificationDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

static DIAGNOSTICS: OnceLock<ClassificationDiagnostics> = OnceLock::new();

/// Get the global classification diagnostics tracker.
pub fn diagnostics() -> &'static ClassificationDiagnostics {
    DIAGNOSTICS.get_or_init(ClassificationDiagnostics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_code_relative_path() {
        let origin = classify_frame("myapp::main", Some("src/main.rs"), true);
        assert_eq!(origin, FrameOrigin::UserCode);
        assert!(origin.is_user_code());
    }

    #[test]
    fn test_user_code_absolute_project_path() {
        let origin = classify_frame("myapp::signals::build", Some("/home/me/myapp/src/signals.rs"), true);
        assert_eq!(origin, FrameOrigin::UserCode);
    }

    #[test]
    fn test_std_by_rustc_path() {
        let origin = classify_frame(
            "std::rt::lang_start_internal",
            Some("/rustc/abc123def/library/std/src/rt.rs"),
            true,
        );
        assert_eq!(origin, FrameOrigin::StdLib);
    }

    #[test]
    fn test_cargo_registry_third_party() {
        let origin = classify_frame(
            "backtrace::backtrace::trace_unsynchronized",
            Some("/home/user/.cargo/registry/src/index.crates.io-xxx/backtrace-0.3.74/src/backtrace/mod.rs"),
            true,
        );
        assert_eq!(origin, FrameOrigin::ThirdParty);
    }

    #[test]
    fn test_relocated_cargo_home_is_third_party() {
        let origin = classify_frame(
            "backtrace::backtrace::libunwind::trace",
            Some("/opt/cargo/registry/src/index.crates.io-xxx/backtrace-0.3.76/src/backtrace/libunwind.rs"),
            true,
        );
        assert_eq!(origin, FrameOrigin::ThirdParty);
    }

    #[test]
    fn test_vendored_crate_by_function_name() {
        let origin = classify_frame(
            "backtrace::backtrace::libunwind::trace",
            Some("/build/myapp/vendor/backtrace/src/backtrace/libunwind.rs"),
            true,
        );
        assert_eq!(origin, FrameOrigin::ThirdParty);

        let origin = classify_frame(
            "std::backtrace_rs::backtrace::trace_unsynchronized",
            Some("/build/toolchain/library/std/src/../../backtrace/src/backtrace/mod.rs"),
            true,
        );
        assert_eq!(origin, FrameOrigin::StdLib);
    }

    #[test]
    fn test_default_config_skips_capture_machinery() {
        let config = crate::ExtractorConfig::default();
        let classifier = Classifier::new(config.framework_prefixes, config.framework_modules);

        for (function, file) in [
            ("backtrace::backtrace::libunwind::trace", Some("/tmp/cargo/vendor/backtrace/src/lib.rs")),
            ("std::backtrace::Backtrace::capture", None),
            ("_Unwind_Backtrace", None),
            ("srcsym::callsite::capture_call_stack", Some("/work/srcsym/src/callsite.rs")),
        ] {
            assert_eq!(classifier.classify(function, file, None, true), FrameOrigin::Framework, "{function}");
        }
        assert_eq!(
            classifier.classify("myapp::build_signal", Some("/tmp/cargo/myapp/src/lib.rs"), None, true),
            FrameOrigin::UserCode
        );
    }

    #[test]
    fn test_std_by_function_name() {
        assert_eq!(classify_frame("core::ops::function::FnOnce::call_once", None, true), FrameOrigin::StdLib);
    }

    #[test]
    fn test_unwinder_by_function_name() {
        assert_eq!(classify_frame("_Unwind_Backtrace", None, false), FrameOrigin::ThirdParty);
    }

    #[test]
    fn test_unknown_frames() {
        assert_eq!(classify_frame(UNKNOWN_FUNCTION, None, true), FrameOrigin::Unknown);
        assert_eq!(classify_frame("0x7fff12345678", None, false), FrameOrigin::Unknown);
        assert_eq!(classify_frame("some_c_function", None, false), FrameOrigin::Unknown);
    }

    #[test]
    fn test_fallback_to_user_code() {
        // Unknown function but inside executable - assume user code
        let origin = classify_frame("my_custom_function", None, true);
        assert_eq!(origin, FrameOrigin::UserCode);
    }

    #[test]
    fn test_framework_prefix_wins_over_path() {
        let classifier = Classifier::new(vec!["srcsym::".to_string()], Vec::new());
        let origin = classifier.classify(
            "srcsym::callsite::capture_call_stack",
            Some("/home/me/srcsym/src/callsite.rs"),
            None,
            true,
        );
        assert_eq!(origin, FrameOrigin::Framework);
    }

    #[test]
    fn test_framework_prefix_matches_trait_impl() {
        let classifier = Classifier::new(vec!["reactive::".to_string()], Vec::new());
        let origin = classifier.classify(
            "<reactive::Signal<T> as core::clone::Clone>::clone",
            Some("src/signal.rs"),
            None,
            true,
        );
        assert_eq!(origin, FrameOrigin::Framework);
    }

    #[test]
    fn test_framework_module() {
        let classifier = Classifier::new(Vec::new(), vec!["libreactive.so".to_string()]);
        assert_eq!(
            classifier.classify("subscribe", None, Some("libreactive.so"), false),
            FrameOrigin::Framework
        );
        assert_eq!(
            classifier.classify("subscribe", None, Some("libother.so"), true),
            FrameOrigin::UserCode
        );
    }

    #[test]
    fn test_diagnostics_coverage() {
        let diag = ClassificationDiagnostics::new();
        assert!((diag.debug_info_coverage() - 100.0).abs() < f64::EPSILON);

        diag.record_classification("a", true);
        diag.record_classification("b", false);
        diag.record_classification("c", false);
        diag.record_classification("c", false);

        assert!((diag.debug_info_coverage() - 25.0).abs() < f64::EPSILON);
        assert!(diag.has_low_coverage());
    }
}
