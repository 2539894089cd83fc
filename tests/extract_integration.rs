//! Integration tests for finspy-carve
//!
//! Exercises the public library surface end-to-end against synthetic
//! archives that look like real APKs: local file headers, stored entry
//! data, ordinary central directory records, and hidden-data records
//! interleaved.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use finspy_carve::carve::cds::{CDS_RECORD_LEN, MAGIC};
use finspy_carve::{Config, ExtractOptions, Extractor, RecoveryMode, RunReport};

/// A 46-byte central directory record with the given attribute slot.
fn cds_record(slot: &[u8; 6]) -> Vec<u8> {
    let mut rec = vec![0u8; CDS_RECORD_LEN];
    rec[..4].copy_from_slice(&MAGIC);
    rec[4] = 20;
    rec[6] = 20;
    rec[10] = 8;
    rec[36..42].copy_from_slice(slot);
    rec
}

/// An ordinary record describing a real archive entry.
fn plain_cds_record(name_len: u16) -> Vec<u8> {
    let mut rec = cds_record(&[0; 6]);
    rec[28..30].copy_from_slice(&name_len.to_le_bytes());
    rec[36..38].copy_from_slice(&0x0001u16.to_le_bytes());
    rec
}

/// Build an archive that resembles a real APK: a couple of local file
/// entries with stored data, a central directory mixing ordinary records
/// with hidden-data records carrying `payload` base64-encoded, and an
/// end-of-central-directory marker.
fn apk_like_archive(payload: &[u8]) -> Vec<u8> {
    let b64 = STANDARD.encode(payload);
    assert_eq!(
        b64.len() % 6,
        0,
        "test payload must fill whole attribute slots"
    );

    let mut data = Vec::new();

    // Local file entries: PK\x03\x04 + header filler + stored content
    for content in [&b"<manifest/>"[..], &b"classes-dex-bytes"[..]] {
        data.extend_from_slice(b"PK\x03\x04");
        data.extend_from_slice(&[0u8; 26]);
        data.extend_from_slice(b"res/entry");
        data.extend_from_slice(content);
    }

    // Central directory: ordinary records interleaved with hidden ones
    for chunk in b64.as_bytes().chunks(6) {
        data.extend_from_slice(&plain_cds_record(9));
        data.extend_from_slice(b"res/entry");
        let mut slot = [0u8; 6];
        slot.copy_from_slice(chunk);
        data.extend_from_slice(&cds_record(&slot));
    }
    data.extend_from_slice(&plain_cds_record(9));
    data.extend_from_slice(b"res/entry");

    // End of central directory: PK\x05\x06 + filler
    data.extend_from_slice(b"PK\x05\x06");
    data.extend_from_slice(&[0u8; 18]);

    data
}

#[test]
fn full_apk_like_archive_recovers_payload() {
    // 27 bytes: base64 encodes to 36 chars, exactly six slots.
    let payload = b"tcp://10.11.12.13:443/cfg01";
    let data = apk_like_archive(payload);

    let result = Extractor::new(ExtractOptions::default())
        .extract(&data)
        .unwrap();

    assert_eq!(result.payload, payload);
    assert_eq!(result.stats.accepted, 6);
    // The seven ordinary records are all seen and rejected by attributes.
    assert_eq!(result.stats.rejected_attributes, 7);
    assert_eq!(result.stats.decode_failures, 0);
}

#[test]
fn archive_written_to_disk_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let apk_path = dir.path().join("sample.apk");

    let payload = b"c2.example.net:4430|active";
    // 26 bytes -> 36 b64 chars? No: pad to 27 with a trailing byte.
    let mut padded = payload.to_vec();
    padded.push(b'!');
    let data = apk_like_archive(&padded);
    std::fs::write(&apk_path, &data).unwrap();

    let bytes = std::fs::read(&apk_path).unwrap();
    let result = Extractor::new(ExtractOptions::default())
        .extract(&bytes)
        .unwrap();
    assert_eq!(result.payload, padded);

    // Write outputs the way the CLI does and verify them
    let cfg_path = dir.path().join("sample.apk.cfg");
    let b64_path = dir.path().join("sample.apk.b64");
    std::fs::write(&cfg_path, &result.payload).unwrap();
    std::fs::write(&b64_path, result.base64_text.as_bytes()).unwrap();

    assert_eq!(std::fs::read(&cfg_path).unwrap(), padded);
    let b64_on_disk = std::fs::read_to_string(&b64_path).unwrap();
    assert_eq!(STANDARD.decode(b64_on_disk.as_bytes()).unwrap(), padded);
}

#[test]
fn recovery_modes_diverge_on_corrupted_archive() {
    // A valid run, a fully unprintable record, then another valid run.
    let mut data = vec![0u8; 16];
    for slot in [b"QUJDRE", b"VGR0hJ"] {
        data.extend_from_slice(&cds_record(slot));
    }
    data.extend_from_slice(&cds_record(&[0x00; 6]));
    for slot in [b"SktMTU", b"5PUFFS"] {
        data.extend_from_slice(&cds_record(slot));
    }

    let lenient = Extractor::new(ExtractOptions {
        recovery: RecoveryMode::Lenient,
    })
    .extract(&data)
    .unwrap();
    let strict = Extractor::new(ExtractOptions {
        recovery: RecoveryMode::Strict,
    })
    .extract(&data)
    .unwrap();

    // Lenient keeps going past the break, strict freezes at it.
    assert_eq!(lenient.base64_text, "QUJDREVGR0hJSktMTU5PUFFS");
    assert_eq!(lenient.payload, b"ABCDEFGHIJKLMNOPQR");
    assert_eq!(strict.base64_text, "QUJDREVGR0hJ");
    assert_eq!(strict.payload, b"ABCDEFGHI");
    assert!(strict.stats.stopped);
    assert!(!lenient.stats.stopped);
}

#[test]
fn run_report_matches_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let apk_path = dir.path().join("case-042.apk");

    let data = apk_like_archive(b"configcfgconfigcfg"); // 18 bytes, 24 chars
    std::fs::write(&apk_path, &data).unwrap();

    let bytes = std::fs::read(&apk_path).unwrap();
    let extraction = Extractor::new(ExtractOptions::default())
        .extract(&bytes)
        .unwrap();

    let mut report = RunReport::new(&apk_path, &bytes, RecoveryMode::Lenient);
    report.record_success(&extraction);

    let report_path = dir.path().join("case-042.apk.report.json");
    report.write_to(&report_path).unwrap();

    let loaded = RunReport::load(&report_path).unwrap();
    assert_eq!(loaded.input_blake3, blake3::hash(&bytes).to_hex().to_string());
    assert_eq!(loaded.input_bytes, bytes.len() as u64);
    assert_eq!(loaded.payload_bytes, Some(18));
    assert!(loaded.error.is_none());
}

#[test]
fn garbage_archive_yields_nothing() {
    let data: Vec<u8> = (0u32..65536).map(|i| (i % 163) as u8).collect();
    let result = Extractor::new(ExtractOptions::default())
        .extract(&data)
        .unwrap();
    assert!(result.base64_text.is_empty());
    assert!(result.payload.is_empty());
}

#[test]
fn config_default_recovery_is_lenient() {
    let config = Config::default();
    assert_eq!(config.scan.recovery, RecoveryMode::Lenient);

    // The configured mode drives the extractor directly
    let extractor = Extractor::new(ExtractOptions {
        recovery: config.scan.recovery,
    });
    let result = extractor.extract(&[]).unwrap();
    assert!(result.payload.is_empty());
}

#[test]
fn config_roundtrip_through_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.scan.recovery = RecoveryMode::Strict;
    config.output.write_report = true;
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(Path::new(&path)).unwrap();
    assert_eq!(loaded.scan.recovery, RecoveryMode::Strict);
    assert!(loaded.output.write_report);
}
