//! Extractor configuration
//!
//! Settings are plain serde data so they can come from a JSON file (CLI
//! `--config`), from code, or from the defaults. The environment can append
//! framework prefixes on top of any of these.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::{AddressKind, ConfigError};

/// Comma-separated function prefixes appended to `framework_prefixes`
pub const FRAMEWORK_PREFIXES_ENV: &str = "SRCSYM_FRAMEWORK_PREFIXES";

/// Stack capture machinery, skipped along with this crate by default
pub const CAPTURE_PREFIXES: &[&str] = &["backtrace::", "std::backtrace", "_Unwind_"];

/// Stack depth examined when looking for the source frame
pub const DEFAULT_MAX_FRAMES: usize = 64;

/// How the source frame of a stack is chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    /// Demangled function prefixes whose frames are skipped
    pub framework_prefixes: Vec<String>,
    /// Object file names (e.g. `libreactive.so`) whose frames are skipped
    pub framework_modules: Vec<String>,
    pub address_kind: AddressKind,
    pub max_frames: usize,
    /// Report the first non-framework frame when no frame is user code
    pub fallback_to_first_resolved: bool,
    /// Append ` (file:line)` to the reported symbol when known
    pub include_location: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            framework_prefixes: std::iter::once(format!("{}::", env!("CARGO_CRATE_NAME")))
                .chain(CAPTURE_PREFIXES.iter().map(ToString::to_string))
                .collect(),
            framework_modules: Vec::new(),
            address_kind: AddressKind::ReturnAddress,
            max_frames: DEFAULT_MAX_FRAMES,
            fallback_to_first_resolved: false,
            include_location: true,
        }
    }
}

impl ExtractorConfig {
    /// Load a config from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON for
    /// this schema, or fails validation
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFailed { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Invalid { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error if `max_frames` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames == 0 {
            return Err(ConfigError::ZeroMaxFrames);
        }
        Ok(())
    }

    /// Apply `SRCSYM_FRAMEWORK_PREFIXES` if it is set
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(FRAMEWORK_PREFIXES_ENV) {
            self.add_framework_prefixes(&value);
        }
        self
    }

    /// Append comma-separated prefixes, ignoring blanks and duplicates
    pub fn add_framework_prefixes(&mut self, list: &str) {
        for prefix in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if !self.framework_prefixes.iter().any(|p| p == prefix) {
                self.framework_prefixes.push(prefix.to_string());
            }
        }
    }
}
