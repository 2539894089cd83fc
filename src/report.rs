//! Run report module - Case-file manifest for an extraction run
//!
//! Generates a Blake3-hashed JSON record of what was scanned, every judged
//! candidate, and the recovered payload digest, suitable for attaching to
//! an analysis case file and re-checking later.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::carve::{CandidateEvent, ExtractError, Extraction, RecoveryMode, ScanStats};

/// Current report format version
pub const REPORT_VERSION: u32 = 1;

/// Tool identification string
pub const TOOL_NAME: &str = "finspy-carve";

/// A JSON manifest describing one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Format version
    pub version: u32,
    /// Tool that generated this report
    pub tool: String,
    /// Tool version
    pub tool_version: String,
    /// When the run started
    pub created_at: DateTime<Utc>,
    /// Input archive path
    pub input_path: String,
    /// Input size in bytes
    pub input_bytes: u64,
    /// Blake3 hash of the input archive
    pub input_blake3: String,
    /// Recovery policy used
    pub recovery: RecoveryMode,
    /// Reconstructed base64 text length in characters
    pub base64_chars: usize,
    /// Decoded payload size, absent when decoding failed
    pub payload_bytes: Option<u64>,
    /// Blake3 hash of the decoded payload, absent when decoding failed
    pub payload_blake3: Option<String>,
    /// Terminal error message, absent on success
    pub error: Option<String>,
    /// Scan counters
    pub stats: ScanStats,
    /// Every judged candidate, in scan order
    pub candidates: Vec<CandidateLogEntry>,
}

/// One judged candidate as logged into the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateLogEntry {
    /// Byte offset of the signature in the input
    pub offset: u64,
    pub verdict: crate::carve::Verdict,
    /// Hex dump of the raw attribute-slot bytes, absent for truncated headers
    pub slot_hex: Option<String>,
    /// Characters contributed to the accumulator
    pub appended: usize,
}

impl From<&CandidateEvent> for CandidateLogEntry {
    fn from(ev: &CandidateEvent) -> Self {
        Self {
            offset: ev.offset,
            verdict: ev.verdict,
            slot_hex: ev.slot.map(hex::encode),
            appended: ev.appended,
        }
    }
}

impl RunReport {
    /// Start a report for `input_path`, hashing the input bytes up front.
    pub fn new(input_path: &Path, data: &[u8], recovery: RecoveryMode) -> Self {
        Self {
            version: REPORT_VERSION,
            tool: TOOL_NAME.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            input_path: input_path.to_string_lossy().to_string(),
            input_bytes: data.len() as u64,
            input_blake3: blake3::hash(data).to_hex().to_string(),
            recovery,
            base64_chars: 0,
            payload_bytes: None,
            payload_blake3: None,
            error: None,
            stats: ScanStats::default(),
            candidates: Vec::new(),
        }
    }

    /// Log a judged candidate.
    pub fn push_candidate(&mut self, event: &CandidateEvent) {
        self.candidates.push(event.into());
    }

    /// Fill in the outcome of a successful extraction.
    pub fn record_success(&mut self, extraction: &Extraction) {
        self.base64_chars = extraction.base64_text.len();
        self.payload_bytes = Some(extraction.payload.len() as u64);
        self.payload_blake3 = Some(blake3::hash(&extraction.payload).to_hex().to_string());
        self.stats = extraction.stats.clone();
    }

    /// Fill in the outcome of a failed extraction. The base64 text carried
    /// by the error still counts toward the recovered characters.
    pub fn record_failure(&mut self, err: &ExtractError) {
        self.base64_chars = err.base64_text().len();
        self.error = Some(err.to_string());
    }

    /// Write the report as pretty JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        tracing::info!(path = %path.display(), "run report written");
        Ok(())
    }

    /// Load a previously written report.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report: {}", path.display()))?;
        let report: RunReport = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse report: {}", path.display()))?;
        Ok(report)
    }
}

/// Render a human-readable end-of-run summary.
pub fn format_summary(report: &RunReport) -> String {
    use humansize::{format_size, BINARY};

    let mut out = String::new();
    out.push_str(&format!(
        "Input:      {} ({})\n",
        report.input_path,
        format_size(report.input_bytes, BINARY)
    ));
    out.push_str(&format!("Recovery:   {}\n", report.recovery));
    out.push_str(&format!(
        "Candidates: {} signature hits, {} accepted, {} salvaged, {} rejected\n",
        report.stats.signature_hits,
        report.stats.accepted,
        report.stats.salvaged,
        report.stats.rejected_attributes + report.stats.rejected_unprintable
    ));
    out.push_str(&format!("Recovered:  {} base64 chars\n", report.base64_chars));
    match (&report.payload_bytes, &report.error) {
        (Some(bytes), _) => {
            out.push_str(&format!(
                "Payload:    {} (blake3 {})\n",
                format_size(*bytes, BINARY),
                report
                    .payload_blake3
                    .as_deref()
                    .map(|h| &h[..16])
                    .unwrap_or("?")
            ));
        }
        (None, Some(err)) => {
            out.push_str(&format!("Error:      {}\n", err));
        }
        (None, None) => {}
    }
    out
}
