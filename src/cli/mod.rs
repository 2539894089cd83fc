//! CLI module - Command line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::carve::RecoveryMode;

/// FinSpy Carve - Recover hidden spyware configuration from APK files
///
/// Scans an Android APK for central directory records carrying base64
/// payload characters in their file-attribute fields and reconstructs the
/// embedded configuration blob. The input archive is never modified.
#[derive(Parser, Debug)]
#[command(name = "finspy-carve")]
#[command(version)]
#[command(about = "Recover hidden FinSpy configuration data from APK files", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose diagnostics (also reports ordinary directory records)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract hidden data and write <apk>.cfg / <apk>.b64 next to the input
    Extract(ExtractArgs),

    /// Scan and report candidates without writing any files
    Scan(ScanArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct ExtractArgs {
    /// Path to the APK/ZIP archive
    #[arg(required = true)]
    pub archive: PathBuf,

    /// Malformed-candidate recovery policy (default from config file)
    #[arg(long, short, value_enum)]
    pub recovery: Option<RecoveryModeArg>,

    /// Write a JSON run report to <apk>.report.json
    #[arg(long)]
    pub report: bool,

    /// Suppress per-candidate console output
    #[arg(long, short)]
    pub quiet: bool,

    /// Format of the end-of-run summary
    #[arg(long, value_enum, default_value = "human")]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct ScanArgs {
    /// Path to the APK/ZIP archive
    #[arg(required = true)]
    pub archive: PathBuf,

    /// Malformed-candidate recovery policy (default from config file)
    #[arg(long, short, value_enum)]
    pub recovery: Option<RecoveryModeArg>,

    /// Format of the end-of-run summary
    #[arg(long, value_enum, default_value = "human")]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RecoveryModeArg {
    /// Count decode failures, salvage printable prefixes, abort past the
    /// failure threshold
    Lenient,
    /// Stop accumulating permanently at the first broken candidate
    Strict,
}

impl From<RecoveryModeArg> for RecoveryMode {
    fn from(arg: RecoveryModeArg) -> Self {
        match arg {
            RecoveryModeArg::Lenient => RecoveryMode::Lenient,
            RecoveryModeArg::Strict => RecoveryMode::Strict,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human readable (default)
    Human,
    /// JSON output
    Json,
}
