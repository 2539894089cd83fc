//! ZIP Central Directory Structure record decoding.
//!
//! A CDS record is the 46-byte fixed header that describes one stored file
//! in a ZIP archive's central directory. FinSpy APKs repurpose the internal
//! and external file-attribute fields (6 contiguous bytes) of these records
//! to carry base64 payload characters, so the decoder here exposes that slot
//! directly alongside the ordinary fields.

/// Central directory signature as a little-endian u32.
pub const SIGNATURE: u32 = 0x02014B50;

/// Central directory signature bytes as they appear on disk.
pub const MAGIC: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];

/// Fixed size of a CDS record, excluding the variable-length
/// filename/extra/comment data that follows it.
pub const CDS_RECORD_LEN: usize = 46;

/// Width of the repurposed internal+external attribute slot.
pub const HIDDEN_SLOT_LEN: usize = 6;

/// Byte offset of the hidden-data slot within a record.
const HIDDEN_SLOT_OFFSET: usize = 36;

/// A decoded 46-byte central directory record.
///
/// Decoding is unconditional field-width slicing: declared
/// filename/extra/comment lengths are never validated against what follows,
/// because the scanner only ever needs this one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdsRecord {
    /// Version made by (low byte) and host OS (high byte)
    pub version_made_by: u16,
    /// Version needed to extract
    pub version_needed: u16,
    /// General purpose bit flags
    pub flags: u16,
    /// Compression method
    pub compression_method: u16,
    /// Last modification time and date (DOS format)
    pub last_modified: u32,
    /// CRC-32 of the uncompressed data
    pub crc32: u32,
    /// Compressed size
    pub compressed_size: u32,
    /// Uncompressed size
    pub uncompressed_size: u32,
    /// File name length
    pub file_name_length: u16,
    /// Extra field length
    pub extra_field_length: u16,
    /// File comment length
    pub file_comment_length: u16,
    /// Disk number where the file starts
    pub disk_number_start: u16,
    /// Internal file attributes (first 2 bytes of the hidden slot)
    pub internal_attrs: u16,
    /// External file attributes (last 4 bytes of the hidden slot)
    pub external_attrs: u32,
    /// Relative offset of the local file header
    pub local_header_offset: u32,
    /// The raw internal+external attribute bytes, as stored
    pub hidden_slot: [u8; HIDDEN_SLOT_LEN],
}

impl CdsRecord {
    /// Decode the record starting at the beginning of `window`.
    ///
    /// Returns `None` when fewer than 46 bytes are available (a truncated
    /// header near end of file) or when the signature bytes don't match.
    pub fn parse(window: &[u8]) -> Option<Self> {
        if window.len() < CDS_RECORD_LEN {
            return None;
        }
        if window[..4] != MAGIC {
            return None;
        }

        let mut hidden_slot = [0u8; HIDDEN_SLOT_LEN];
        hidden_slot.copy_from_slice(&window[HIDDEN_SLOT_OFFSET..HIDDEN_SLOT_OFFSET + HIDDEN_SLOT_LEN]);

        Some(Self {
            version_made_by: read_u16(window, 4),
            version_needed: read_u16(window, 6),
            flags: read_u16(window, 8),
            compression_method: read_u16(window, 10),
            last_modified: read_u32(window, 12),
            crc32: read_u32(window, 16),
            compressed_size: read_u32(window, 20),
            uncompressed_size: read_u32(window, 24),
            file_name_length: read_u16(window, 28),
            extra_field_length: read_u16(window, 30),
            file_comment_length: read_u16(window, 32),
            disk_number_start: read_u16(window, 34),
            internal_attrs: read_u16(window, 36),
            external_attrs: read_u32(window, 38),
            local_header_offset: read_u32(window, 42),
            hidden_slot,
        })
    }

    /// Heuristic: does this record's attribute slot carry payload bytes?
    ///
    /// Legitimate ZIP internal attributes only ever set the low bit (the
    /// text-file flag). Any other bit set means the field was overwritten
    /// with something that isn't an attribute value. This is a detector,
    /// not a proof: printable garbage in an ordinary archive can match.
    pub fn has_hidden_data(&self) -> bool {
        self.internal_attrs & 0xFFFA != 0
    }

    /// Total variable-length data declared to follow this header.
    pub fn variable_data_len(&self) -> usize {
        self.file_name_length as usize
            + self.extra_field_length as usize
            + self.file_comment_length as usize
    }
}

/// Test whether the 4 bytes at the start of `window` are the CDS signature,
/// interpreted as a little-endian u32. Short windows never match.
pub fn signature_at(window: &[u8]) -> bool {
    match window.get(..4) {
        Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == SIGNATURE,
        None => false,
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a 46-byte record with the given attribute slot bytes.
    fn record_with_slot(slot: [u8; 6]) -> [u8; CDS_RECORD_LEN] {
        let mut rec = [0u8; CDS_RECORD_LEN];
        rec[..4].copy_from_slice(&MAGIC);
        rec[4] = 20; // version made by
        rec[6] = 20; // version needed
        rec[10] = 8; // deflate
        rec[36..42].copy_from_slice(&slot);
        rec
    }

    #[test]
    fn signature_matches_magic_bytes() {
        assert!(signature_at(&MAGIC));
        assert!(signature_at(b"PK\x01\x02trailing"));
        assert!(!signature_at(b"PK\x03\x04"));
        assert!(!signature_at(b"PK\x01"));
        assert!(!signature_at(&[]));
    }

    #[test]
    fn parse_decodes_all_fields() {
        let mut rec = record_with_slot(*b"QUJDRE");
        rec[8..10].copy_from_slice(&0x0806u16.to_le_bytes()); // flags
        rec[16..20].copy_from_slice(&0xDEADBEEFu32.to_le_bytes()); // crc
        rec[20..24].copy_from_slice(&1234u32.to_le_bytes());
        rec[24..28].copy_from_slice(&5678u32.to_le_bytes());
        rec[28..30].copy_from_slice(&11u16.to_le_bytes());
        rec[42..46].copy_from_slice(&0x1000u32.to_le_bytes());

        let hdr = CdsRecord::parse(&rec).unwrap();
        assert_eq!(hdr.flags, 0x0806);
        assert_eq!(hdr.crc32, 0xDEADBEEF);
        assert_eq!(hdr.compressed_size, 1234);
        assert_eq!(hdr.uncompressed_size, 5678);
        assert_eq!(hdr.file_name_length, 11);
        assert_eq!(hdr.local_header_offset, 0x1000);
        assert_eq!(&hdr.hidden_slot, b"QUJDRE");
        // slot bytes reinterpreted little-endian
        assert_eq!(hdr.internal_attrs, u16::from_le_bytes([b'Q', b'U']));
        assert_eq!(
            hdr.external_attrs,
            u32::from_le_bytes([b'J', b'D', b'R', b'E'])
        );
    }

    #[test]
    fn parse_rejects_truncated_window() {
        let rec = record_with_slot(*b"ABCDEF");
        assert!(CdsRecord::parse(&rec[..45]).is_none());
        assert!(CdsRecord::parse(&[]).is_none());
    }

    #[test]
    fn parse_rejects_wrong_signature() {
        let mut rec = record_with_slot(*b"ABCDEF");
        rec[3] = 0x04; // local file header, not CDS
        assert!(CdsRecord::parse(&rec).is_none());
    }

    #[test]
    fn heuristic_accepts_overwritten_attributes() {
        let mut rec = record_with_slot(*b"ABCDEF");
        rec[36..38].copy_from_slice(&0xFFFFu16.to_le_bytes());
        let hdr = CdsRecord::parse(&rec).unwrap();
        assert!(hdr.has_hidden_data());
    }

    #[test]
    fn heuristic_rejects_text_flag_only() {
        let mut rec = record_with_slot([0; 6]);
        rec[36..38].copy_from_slice(&0x0001u16.to_le_bytes());
        let hdr = CdsRecord::parse(&rec).unwrap();
        assert_eq!(hdr.internal_attrs, 0x0001);
        assert!(!hdr.has_hidden_data(), "text-file flag alone is legitimate");
    }

    #[test]
    fn heuristic_rejects_zero_attributes() {
        let hdr = CdsRecord::parse(&record_with_slot([0; 6])).unwrap();
        assert!(!hdr.has_hidden_data());
    }

    #[test]
    fn variable_data_len_sums_declared_lengths() {
        let mut rec = record_with_slot([0; 6]);
        rec[28..30].copy_from_slice(&10u16.to_le_bytes());
        rec[30..32].copy_from_slice(&4u16.to_le_bytes());
        rec[32..34].copy_from_slice(&7u16.to_le_bytes());
        let hdr = CdsRecord::parse(&rec).unwrap();
        assert_eq!(hdr.variable_data_len(), 21);
    }
}
