//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::config::ExtractorConfig;
use crate::domain::{AddressKind, ConfigError};

#[derive(Parser, Debug)]
#[command(
    name = "srcsym",
    about = "Find the source symbol of a call stack captured in a running process",
    after_help = "\
EXAMPLES:
    srcsym --pid 1234 0x55f3a2b4c780 0x55f3a2b4d120      Source symbol of a captured stack
    srcsym --pid 1234 --all 0x55f3a2b4c780               Every frame, classified
    srcsym --pid 1234 --exact --json 0x55f3a2b4c000      Function entry address, JSON output

EXIT STATUS:
    0 source symbol found, 1 error, 2 usage, 3 no source symbol"
)]
pub struct Args {
    /// Addresses of the captured stack, innermost first (0x-prefixed hex or decimal)
    #[arg(value_name = "ADDR", required = true, value_parser = parse_address)]
    pub addresses: Vec<u64>,

    /// Process the addresses were captured in
    #[arg(short, long)]
    pub pid: u32,

    /// Treat addresses as exact instruction pointers, not return addresses
    #[arg(long)]
    pub exact: bool,

    /// Print every resolved frame, not only the source symbol
    #[arg(long)]
    pub all: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Extractor config file (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Additional function prefix to skip as framework code (repeatable)
    #[arg(long = "framework-prefix", value_name = "PREFIX")]
    pub framework_prefixes: Vec<String>,
}

impl Args {
    /// Build the extractor config: file (or defaults), environment, then flags
    ///
    /// # Errors
    /// Returns an error if the config file cannot be loaded
    pub fn extractor_config(&self) -> Result<ExtractorConfig, ConfigError> {
        let mut config = match self.config {
            Some(ref path) => ExtractorConfig::load(path)?,
            None => ExtractorConfig::default(),
        }
        .with_env_overrides();

        config.add_framework_prefixes(&self.framework_prefixes.join(","));
        if self.exact {
            config.address_kind = AddressKind::Exact;
        }
        Ok(config)
    }
}

/// Parse an address: `0x`-prefixed hex, plain decimal, or bare hex digits
///
/// # Errors
/// Returns a message if the text is not a valid non-zero address
pub fn parse_address(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse()
    } else {
        u64::from_str_radix(text, 16)
    };

    match parsed {
        Ok(0) => Err("address 0 cannot be resolved".to_string()),
        Ok(addr) => Ok(addr),
        Err(e) => Err(format!("invalid address '{text}': {e}")),
    }
}
