//! # srcsym - Main Entry Point
//!
//! Resolves addresses captured in another process (for example copied from
//! a log line or a debugger) into the source symbol of the stack:
//! - **Text** (default): one line with the source symbol
//! - **All frames** (`--all`): every frame, formatted with file and line
//! - **JSON** (`--json`): machine-readable report

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::io::{self, Write};

use srcsym::classification::diagnostics;
use srcsym::cli::{Args, Report};
use srcsym::domain::{Address, Pid};
use srcsym::resolver::AddressResolver;
use srcsym::SourceSymbolExtractor;

// Exit codes (clap exits with 2 on usage errors)
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOT_FOUND: i32 = 3;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(true) => EXIT_SUCCESS,
        Ok(false) => EXIT_NOT_FOUND,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

/// Returns whether a source symbol was found
fn run() -> Result<bool> {
    let args = Args::parse();
    let config = args.extractor_config().context("Failed to load extractor config")?;

    let pid = Pid(args.pid);
    let resolver = AddressResolver::for_pid(pid)
        .with_context(|| format!("Cannot inspect process {}", args.pid))?;
    let extractor = SourceSymbolExtractor::new(resolver, config);

    let addresses: Vec<Address> = args.addresses.iter().copied().map(Address).collect();
    info!("Resolving {} addresses in {pid}", addresses.len());

    let symbol = extractor.extract(&addresses);
    let frames = if args.all { extractor.classify_stack(&addresses) } else { Vec::new() };

    if diagnostics().has_low_coverage() {
        warn!(
            "Only {:.0}% of frames had debug info; origins were guessed from function names",
            diagnostics().debug_info_coverage()
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.json {
        let report = Report::new(symbol.as_ref(), &frames);
        serde_json::to_writer_pretty(&mut out, &report).context("Failed to write JSON")?;
        writeln!(out)?;
        return Ok(symbol.is_some());
    }

    for (index, classified) in frames.iter().enumerate() {
        writeln!(out, "{}", classified.frame.resolved.format(index))?;
    }

    match symbol {
        Some(ref symbol) if args.all => writeln!(out, "\nsource: #{} {symbol}", symbol.frame_index)?,
        Some(ref symbol) => writeln!(out, "{symbol}")?,
        None => eprintln!("no source symbol found"),
    }

    Ok(symbol.is_some())
}
