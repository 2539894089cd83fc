//! FinSpy Carve Library
//!
//! Recovers steganographically hidden FinSpy configuration data from
//! Android APK files. The spyware scatters a base64-encoded configuration
//! blob across the internal/external file-attribute fields of the archive's
//! ZIP central directory records; this crate scans the raw bytes for those
//! records, reassembles the base64 text, and decodes the payload.
//!
//! # Features
//!
//! - **Brute-force signature scan**: Every byte offset is tested, so hidden
//!   records survive malformed or deliberately altered directories
//! - **Attribute heuristic**: Flags records whose internal attributes carry
//!   more than the legitimate text-file bit
//! - **Two recovery policies**: Lenient (error-counted salvage) and strict
//!   (printable-run validation with a permanent stop)
//! - **Run reports**: Blake3-hashed JSON case-file manifests per run
//!
//! # Example
//!
//! ```no_run
//! use finspy_carve::{ExtractOptions, Extractor};
//!
//! fn main() -> anyhow::Result<()> {
//!     let data = std::fs::read("suspicious.apk")?;
//!     let extraction = Extractor::new(ExtractOptions::default()).extract(&data)?;
//!
//!     println!(
//!         "recovered {} bytes of configuration",
//!         extraction.payload.len()
//!     );
//!     Ok(())
//! }
//! ```

pub mod carve;
pub mod cli;
pub mod config;
pub mod report;

// Re-export commonly used types
pub use carve::{
    CandidateEvent, ExtractError, ExtractOptions, ExtractProgress, Extraction, Extractor,
    RecoveryMode, ScanStats, Verdict,
};
pub use config::Config;
pub use report::RunReport;
