//! FinSpy Carve - Recover hidden spyware configuration from APK files
//!
//! Scans an Android APK byte-by-byte for central directory records whose
//! attribute fields were overwritten with base64 payload characters,
//! reassembles the hidden configuration blob, and writes it next to the
//! input archive.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use finspy_carve::carve::{
    CandidateEvent, ExtractOptions, ExtractProgress, Extractor, RecoveryMode, Verdict,
};
use finspy_carve::cli::{Cli, Commands, OutputFormat};
use finspy_carve::report::{self, RunReport};
use finspy_carve::Config;

/// Resolved settings for one run, shared by `extract` and `scan`
struct RunArgs {
    archive: PathBuf,
    recovery: RecoveryMode,
    /// Scan-only: judge candidates but write no files
    dry_run: bool,
    write_report: bool,
    quiet: bool,
    output_format: OutputFormat,
}

fn main() -> Result<()> {
    let config = Config::load();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("finspy_carve={}", config.general.log_level).parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Extract(args)) => {
            let run_args = RunArgs {
                archive: args.archive,
                recovery: args
                    .recovery
                    .map(Into::into)
                    .unwrap_or(config.scan.recovery),
                dry_run: false,
                write_report: args.report || config.output.write_report,
                quiet: args.quiet || matches!(args.output_format, OutputFormat::Json),
                output_format: args.output_format,
            };
            run(&run_args, cli.verbose, &config)
        }
        Some(Commands::Scan(args)) => {
            let run_args = RunArgs {
                archive: args.archive,
                recovery: args
                    .recovery
                    .map(Into::into)
                    .unwrap_or(config.scan.recovery),
                dry_run: true,
                write_report: false,
                quiet: matches!(args.output_format, OutputFormat::Json),
                output_format: args.output_format,
            };
            run(&run_args, cli.verbose, &config)
        }
        None => {
            // Missing archive argument is not an error: show usage and leave
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn run(args: &RunArgs, verbose: bool, config: &Config) -> Result<()> {
    let archive = &args.archive;
    anyhow::ensure!(archive.exists(), "Archive not found: {}", archive.display());

    let file = std::fs::File::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let metadata = file.metadata()?;
    anyhow::ensure!(metadata.len() > 0, "Archive file is empty");

    let mmap = unsafe {
        memmap2::Mmap::map(&file)
            .with_context(|| format!("Failed to mmap archive: {}", archive.display()))?
    };

    tracing::info!(
        archive = %archive.display(),
        bytes = metadata.len(),
        recovery = %args.recovery,
        dry_run = args.dry_run,
        "processing archive"
    );

    let pb = ProgressBar::new(metadata.len());
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {bytes}/{total_bytes}")
            .context("bad progress bar template")?
            .progress_chars("=> "),
    );

    let run_report = RefCell::new(RunReport::new(archive, &mmap, args.recovery));

    let extractor = Extractor::new(ExtractOptions {
        recovery: args.recovery,
    });
    let result = extractor.extract_with_progress(&mmap, |progress| match progress {
        ExtractProgress::Scanning { bytes_scanned, .. } => {
            pb.set_position(bytes_scanned);
        }
        ExtractProgress::Candidate(event) => {
            run_report.borrow_mut().push_candidate(&event);
            if !args.quiet {
                if let Some(line) = candidate_line(&event, verbose) {
                    pb.println(line);
                }
            }
        }
        ExtractProgress::Done => pb.finish_and_clear(),
    });
    // A fatal abort never reaches Done; clear the bar either way.
    pb.finish_and_clear();
    let mut run_report = run_report.into_inner();

    let b64_path = with_suffix(archive, ".b64");
    match result {
        Ok(extraction) => {
            run_report.record_success(&extraction);

            if !args.dry_run {
                if extraction.payload.is_empty() {
                    println!(
                        "{} no hidden configuration data found",
                        "[!]".yellow().bold()
                    );
                } else {
                    let cfg_path = with_suffix(archive, ".cfg");
                    std::fs::write(&cfg_path, &extraction.payload).with_context(|| {
                        format!("Failed to write payload: {}", cfg_path.display())
                    })?;
                    println!(
                        "{} configuration written to {}",
                        "[+]".green().bold(),
                        cfg_path.display()
                    );
                }

                if config.output.write_b64 {
                    std::fs::write(&b64_path, extraction.base64_text.as_bytes())
                        .with_context(|| format!("Failed to write: {}", b64_path.display()))?;
                    println!(
                        "{} base64 text written to {}",
                        "[+]".green().bold(),
                        b64_path.display()
                    );
                }

                if args.write_report {
                    let report_path = with_suffix(archive, ".report.json");
                    run_report.write_to(&report_path)?;
                }
            } else if !extraction.base64_text.is_empty() {
                println!(
                    "{} recovered base64 text: {}",
                    "[*]".green().bold(),
                    extraction.base64_text
                );
            }

            print_summary(&run_report, args.output_format)?;
            Ok(())
        }
        Err(err) => {
            run_report.record_failure(&err);

            // Best-effort: the text recovered before the failure is still
            // worth keeping for manual inspection.
            if !args.dry_run && config.output.write_b64 && !err.base64_text().is_empty() {
                if std::fs::write(&b64_path, err.base64_text().as_bytes()).is_ok() {
                    println!(
                        "{} partial base64 text written to {}",
                        "[~]".yellow().bold(),
                        b64_path.display()
                    );
                }
            }
            if !args.dry_run && args.write_report {
                let report_path = with_suffix(archive, ".report.json");
                run_report.write_to(&report_path)?;
            }

            print_summary(&run_report, args.output_format)?;
            Err(err).context("extraction failed")
        }
    }
}

/// Append a suffix to the full file name, `sample.apk` -> `sample.apk.b64`.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Console line for a judged candidate. Quiet verdicts (ordinary records,
/// suppressed candidates) only show up in verbose mode.
fn candidate_line(event: &CandidateEvent, verbose: bool) -> Option<String> {
    let slot = event
        .slot
        .map(|s| {
            format!(
                "{} ({:?})",
                hex::encode(s),
                String::from_utf8_lossy(&s)
            )
        })
        .unwrap_or_default();

    let line = match event.verdict {
        Verdict::Appended => format!(
            "{} hidden data at {:#010x}: {}",
            "[*]".green().bold(),
            event.offset,
            slot
        ),
        Verdict::Salvaged => format!(
            "{} salvaged {} chars at {:#010x}: {}",
            "[~]".yellow().bold(),
            event.appended,
            event.offset,
            slot
        ),
        Verdict::RejectedUnprintable => format!(
            "{} unable to decode hidden data at {:#010x}: {}",
            "[!]".yellow().bold(),
            event.offset,
            slot
        ),
        Verdict::Truncated => format!(
            "{} truncated header at {:#010x}",
            "[!]".yellow(),
            event.offset
        ),
        Verdict::Suppressed => {
            if !verbose {
                return None;
            }
            format!(
                "{} ignored candidate at {:#010x} (accumulator stopped)",
                "[-]".dimmed(),
                event.offset
            )
        }
        Verdict::RejectedAttributes => {
            if !verbose {
                return None;
            }
            format!(
                "{} ordinary record at {:#010x}",
                "[-]".dimmed(),
                event.offset
            )
        }
    };
    Some(line)
}

fn print_summary(run_report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => print!("{}", report::format_summary(run_report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(run_report)?),
    }
    Ok(())
}
