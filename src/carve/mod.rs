//! Hidden-data carving module - Recover FinSpy configuration payloads from
//! APK central directory records.
//!
//! Scans the raw bytes of a ZIP/APK archive for central directory record
//! signatures, applies the attribute heuristic to each candidate, and
//! reassembles the base64 payload scattered across the matching records.
//!
//! # Design
//!
//! - **Brute-force scan**: every byte offset is tested for the CDS
//!   signature, single-byte stride. The real central directory location may
//!   be altered or the archive malformed, so no ZIP-aware jump is taken and
//!   no candidate can be missed.
//! - **Per-candidate verdicts**: each signature hit resolves to an explicit
//!   [`Verdict`] consumed by the scan loop; malformed slots never abort a
//!   candidate through a panic or a swallowed error.
//! - **Owned accumulator**: the growing base64 text, the decode-failure
//!   counter and the stop flag live in one mutable struct threaded by
//!   exclusive reference through the loop. Running the scan twice on the
//!   same bytes yields the same output.
//! - **Recovery policy**: malformed candidates are handled per
//!   [`RecoveryMode`], lenient (error-counted, best-effort salvage) or
//!   strict (printable-run validation with a permanent stop).

pub mod cds;

use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cds::{CdsRecord, HIDDEN_SLOT_LEN};

/// Lenient mode aborts once more than this many candidates failed to decode.
pub const MAX_DECODE_FAILURES: u32 = 10;

/// Scanning progress is reported roughly once per this many bytes.
const PROGRESS_INTERVAL: usize = 1 << 20;

/// How malformed hidden-data candidates are recovered.
///
/// The two policies match two known variants of the extraction heuristic
/// and behave differently on the same corrupted input; they are deliberately
/// kept separate rather than merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Count decode failures, salvage printable prefixes once accumulation
    /// has started, and abort the whole run after more than
    /// [`MAX_DECODE_FAILURES`] cumulative failures.
    #[default]
    Lenient,
    /// Validate the leading printable run of each slot. The first broken
    /// candidate after accumulation has started freezes the accumulator for
    /// the rest of the scan.
    Strict,
}

impl std::fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryMode::Lenient => write!(f, "lenient"),
            RecoveryMode::Strict => write!(f, "strict"),
        }
    }
}

/// Options for an extraction run
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Malformed-candidate recovery policy
    pub recovery: RecoveryMode,
}

/// Errors that terminate an extraction run.
///
/// Both variants carry the base64 text recovered up to the failure point so
/// callers can still write it out for manual inspection.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Too many candidates matched the heuristic but failed to decode;
    /// the archive is probably not carrying this format at all.
    #[error("{failures} hidden-data candidates failed to decode, probably a false positive match")]
    ExcessiveMalformed { failures: u32, base64_text: String },

    /// The reassembled text is not valid standard base64.
    #[error("recovered text is not valid base64: {source}")]
    Base64Decode {
        source: base64::DecodeError,
        base64_text: String,
    },
}

impl ExtractError {
    /// The base64 text accumulated before the failure.
    pub fn base64_text(&self) -> &str {
        match self {
            ExtractError::ExcessiveMalformed { base64_text, .. } => base64_text,
            ExtractError::Base64Decode { base64_text, .. } => base64_text,
        }
    }
}

/// Outcome of judging a single candidate offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// All six slot characters printable, appended to the accumulator
    Appended,
    /// Slot broken mid-run; its leading printable prefix was appended
    Salvaged,
    /// Ordinary record: only the text-file attribute bit set (or none)
    RejectedAttributes,
    /// Heuristic matched but the slot failed to decode; nothing appended
    RejectedUnprintable,
    /// Signature within 46 bytes of end of input, header skipped
    Truncated,
    /// Candidate arrived after the accumulator was permanently stopped
    Suppressed,
}

/// A judged candidate, emitted through the progress callback and logged
/// into the run report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CandidateEvent {
    /// Byte offset of the signature in the input
    pub offset: u64,
    pub verdict: Verdict,
    /// Raw attribute-slot bytes; absent for truncated headers
    pub slot: Option<[u8; HIDDEN_SLOT_LEN]>,
    /// Characters this candidate contributed to the accumulator
    pub appended: usize,
}

/// Progress updates emitted during extraction
#[derive(Debug, Clone)]
pub enum ExtractProgress {
    /// Scanning phase: bytes_scanned out of total
    Scanning { bytes_scanned: u64, total_bytes: u64 },
    /// A candidate offset was judged
    Candidate(CandidateEvent),
    /// Scan finished, payload reconstruction about to run
    Done,
}

/// Counters from an extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub bytes_scanned: u64,
    /// Offsets where the 4 signature bytes matched
    pub signature_hits: usize,
    pub accepted: usize,
    pub salvaged: usize,
    pub rejected_attributes: usize,
    pub rejected_unprintable: usize,
    pub truncated_headers: usize,
    /// Cumulative slot decode failures (salvaged + rejected unprintable)
    pub decode_failures: u32,
    /// Candidates ignored after the accumulator was stopped
    pub suppressed: usize,
    /// Whether strict mode froze the accumulator
    pub stopped: bool,
    pub duration_ms: u64,
}

/// Result of a successful extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The reassembled base64 text, in scan order
    pub base64_text: String,
    /// The decoded configuration payload
    pub payload: Vec<u8>,
    pub stats: ScanStats,
}

/// Mutable scan state: the growing base64 string plus the failure counter
/// and the permanent stop flag. Owned by the scan loop, never shared.
#[derive(Debug, Default)]
struct Accumulator {
    text: String,
    failures: u32,
    stopped: bool,
}

impl Accumulator {
    /// Append the first `n` slot bytes as characters. Callers only pass a
    /// printable-ASCII prefix, so the bytes map 1:1 to chars.
    fn push_prefix(&mut self, slot: &[u8; HIDDEN_SLOT_LEN], n: usize) {
        for &b in &slot[..n] {
            self.text.push(b as char);
        }
    }
}

/// The hidden-data extraction engine
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extract with a progress callback. The callback sees periodic byte
    /// counts, one event per judged candidate, and a final `Done`.
    pub fn extract_with_progress<F>(
        &self,
        data: &[u8],
        on_progress: F,
    ) -> Result<Extraction, ExtractError>
    where
        F: Fn(ExtractProgress),
    {
        let start = Instant::now();
        let total_bytes = data.len() as u64;
        let mut acc = Accumulator::default();
        let mut stats = ScanStats::default();

        tracing::debug!(
            total_bytes,
            recovery = %self.options.recovery,
            "starting hidden-data scan"
        );

        // Single-byte stride over every offset. Offsets are never skipped,
        // even after a full 46-byte match: hidden-data records may overlap
        // scan positions in corrupted samples.
        for offset in 0..data.len() {
            if offset % PROGRESS_INTERVAL == 0 {
                on_progress(ExtractProgress::Scanning {
                    bytes_scanned: offset as u64,
                    total_bytes,
                });
            }

            if !cds::signature_at(&data[offset..]) {
                continue;
            }
            stats.signature_hits += 1;

            let event = match CdsRecord::parse(&data[offset..]) {
                Some(record) => self.judge(offset as u64, &record, &mut acc, &mut stats),
                None => {
                    stats.truncated_headers += 1;
                    CandidateEvent {
                        offset: offset as u64,
                        verdict: Verdict::Truncated,
                        slot: None,
                        appended: 0,
                    }
                }
            };
            on_progress(ExtractProgress::Candidate(event));

            if self.options.recovery == RecoveryMode::Lenient && acc.failures > MAX_DECODE_FAILURES
            {
                tracing::warn!(
                    failures = acc.failures,
                    offset,
                    "too many decode failures, aborting"
                );
                return Err(ExtractError::ExcessiveMalformed {
                    failures: acc.failures,
                    base64_text: acc.text,
                });
            }
        }

        on_progress(ExtractProgress::Scanning {
            bytes_scanned: total_bytes,
            total_bytes,
        });
        on_progress(ExtractProgress::Done);

        stats.bytes_scanned = total_bytes;
        stats.decode_failures = acc.failures;
        stats.stopped = acc.stopped;
        stats.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            signature_hits = stats.signature_hits,
            accepted = stats.accepted,
            recovered_chars = acc.text.len(),
            duration_ms = stats.duration_ms,
            "scan complete"
        );

        let payload =
            BASE64_STANDARD
                .decode(acc.text.as_bytes())
                .map_err(|source| ExtractError::Base64Decode {
                    source,
                    base64_text: acc.text.clone(),
                })?;

        Ok(Extraction {
            base64_text: acc.text,
            payload,
            stats,
        })
    }

    /// Convenience wrapper without progress (for tests and library use)
    pub fn extract(&self, data: &[u8]) -> Result<Extraction, ExtractError> {
        self.extract_with_progress(data, |_| {})
    }

    /// Judge one fully-decoded candidate record and update the accumulator.
    fn judge(
        &self,
        offset: u64,
        record: &CdsRecord,
        acc: &mut Accumulator,
        stats: &mut ScanStats,
    ) -> CandidateEvent {
        let slot = record.hidden_slot;

        if !record.has_hidden_data() {
            stats.rejected_attributes += 1;
            return CandidateEvent {
                offset,
                verdict: Verdict::RejectedAttributes,
                slot: Some(slot),
                appended: 0,
            };
        }

        tracing::debug!(
            offset,
            internal_attrs = record.internal_attrs,
            external_attrs = record.external_attrs,
            "hidden data candidate"
        );

        if acc.stopped {
            stats.suppressed += 1;
            return CandidateEvent {
                offset,
                verdict: Verdict::Suppressed,
                slot: Some(slot),
                appended: 0,
            };
        }

        let prefix = printable_prefix(&slot);
        let (verdict, appended) = if prefix == HIDDEN_SLOT_LEN {
            acc.push_prefix(&slot, HIDDEN_SLOT_LEN);
            stats.accepted += 1;
            (Verdict::Appended, HIDDEN_SLOT_LEN)
        } else {
            match self.options.recovery {
                RecoveryMode::Lenient => lenient_recover(acc, &slot, prefix, stats),
                RecoveryMode::Strict => strict_recover(acc, &slot, prefix, stats),
            }
        };

        CandidateEvent {
            offset,
            verdict,
            slot: Some(slot),
            appended,
        }
    }
}

/// Lenient recovery: count the failure, salvage the printable prefix if
/// accumulation has already started, keep going. The fatal threshold is
/// enforced by the scan loop.
fn lenient_recover(
    acc: &mut Accumulator,
    slot: &[u8; HIDDEN_SLOT_LEN],
    prefix: usize,
    stats: &mut ScanStats,
) -> (Verdict, usize) {
    acc.failures += 1;
    if !acc.text.is_empty() && prefix > 0 {
        acc.push_prefix(slot, prefix);
        stats.salvaged += 1;
        (Verdict::Salvaged, prefix)
    } else {
        stats.rejected_unprintable += 1;
        (Verdict::RejectedUnprintable, 0)
    }
}

/// Strict recovery: a broken slot after accumulation has started salvages
/// its printable prefix and permanently stops the accumulator. A broken
/// slot before any data was accepted just invalidates the candidate.
fn strict_recover(
    acc: &mut Accumulator,
    slot: &[u8; HIDDEN_SLOT_LEN],
    prefix: usize,
    stats: &mut ScanStats,
) -> (Verdict, usize) {
    acc.failures += 1;
    if acc.text.is_empty() {
        stats.rejected_unprintable += 1;
        return (Verdict::RejectedUnprintable, 0);
    }

    acc.stopped = true;
    if prefix > 0 {
        acc.push_prefix(slot, prefix);
        stats.salvaged += 1;
        (Verdict::Salvaged, prefix)
    } else {
        stats.rejected_unprintable += 1;
        (Verdict::RejectedUnprintable, 0)
    }
}

/// Length of the leading run of printable ASCII bytes (0x20..=0x7E).
fn printable_prefix(slot: &[u8; HIDDEN_SLOT_LEN]) -> usize {
    slot.iter()
        .take_while(|&&b| matches!(b, 0x20..=0x7E))
        .count()
}
