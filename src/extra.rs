//! Extra-field registry: parses the variable-length extra blob trailing a Local File Header
//! into typed records. Only ZIP64 and the Info-ZIP Unicode Path/Comment fields are interpreted;
//! everything else is kept as an opaque `Unknown` record.

use crate::primitives::{
    read_u16_le, read_u32_le, read_u64_le, UNICODE_COMMENT_EXTRA_ID, UNICODE_PATH_EXTRA_ID,
    ZIP64_EXTRA_ID,
};

/// A single decoded extra-field record.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraField {
    Zip64 {
        uncompressed_size: Option<u64>,
        compressed_size: Option<u64>,
        local_header_offset: Option<u64>,
        disk_start: Option<u32>,
    },
    UnicodePath {
        version: u8,
        crc32: u32,
        name: String,
    },
    UnicodeComment {
        version: u8,
        crc32: u32,
        comment: String,
    },
    Unknown {
        id: u16,
        data: Vec<u8>,
    },
}

/// Which LFH/CFH 32-bit fields were sentineled (`0xFFFFFFFF`), and therefore which fields the
/// ZIP64 extra record is expected to carry, in APPNOTE's fixed order: uncompressed size,
/// compressed size, local header offset, disk start.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip64FieldsNeeded {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub local_header_offset: bool,
    pub disk_start: bool,
}

/// Parses the raw extra-field bytes of a Local File Header into typed records.
///
/// `zip64_needed` tells the ZIP64 branch which of its four optional 8-/4-byte fields are
/// actually present in this record (only sentineled LFH fields carry a ZIP64 payload).
pub fn parse_extra_fields(data: &[u8], zip64_needed: Zip64FieldsNeeded) -> Vec<ExtraField> {
    let mut fields = Vec::new();
    let mut i = 0usize;

    while i + 4 <= data.len() {
        let id = read_u16_le(&data[i..i + 2]);
        let len = read_u16_le(&data[i + 2..i + 4]) as usize;
        i += 4;
        if i + len > data.len() {
            // Truncated record: keep what's left as Unknown and stop, rather than aborting
            // the whole parse and losing any records already decoded.
            fields.push(ExtraField::Unknown {
                id,
                data: data[i..].to_vec(),
            });
            break;
        }
        let payload = &data[i..i + len];
        i += len;

        let field = match id {
            ZIP64_EXTRA_ID => parse_zip64(payload, zip64_needed)
                .unwrap_or_else(|| ExtraField::Unknown {
                    id,
                    data: payload.to_vec(),
                }),
            UNICODE_PATH_EXTRA_ID => parse_unicode(payload, true)
                .unwrap_or_else(|| ExtraField::Unknown {
                    id,
                    data: payload.to_vec(),
                }),
            UNICODE_COMMENT_EXTRA_ID => parse_unicode(payload, false)
                .unwrap_or_else(|| ExtraField::Unknown {
                    id,
                    data: payload.to_vec(),
                }),
            other => ExtraField::Unknown {
                id: other,
                data: payload.to_vec(),
            },
        };
        fields.push(field);
    }

    fields
}

fn parse_zip64(payload: &[u8], needed: Zip64FieldsNeeded) -> Option<ExtraField> {
    let mut cursor = 0usize;
    let mut take_u64 = |want: bool| -> Option<Option<u64>> {
        if !want {
            return Some(None);
        }
        if cursor + 8 > payload.len() {
            return None;
        }
        let v = read_u64_le(&payload[cursor..cursor + 8]);
        cursor += 8;
        Some(Some(v))
    };

    let uncompressed_size = take_u64(needed.uncompressed_size)?;
    let compressed_size = take_u64(needed.compressed_size)?;
    let local_header_offset = take_u64(needed.local_header_offset)?;
    let disk_start = if needed.disk_start {
        if cursor + 4 > payload.len() {
            return None;
        }
        Some(read_u32_le(&payload[cursor..cursor + 4]))
    } else {
        None
    };

    Some(ExtraField::Zip64 {
        uncompressed_size,
        compressed_size,
        local_header_offset,
        disk_start,
    })
}

fn parse_unicode(payload: &[u8], is_path: bool) -> Option<ExtraField> {
    if payload.len() < 5 {
        return None;
    }
    let version = payload[0];
    let crc32 = read_u32_le(&payload[1..5]);
    let text = String::from_utf8_lossy(&payload[5..]).into_owned();
    Some(if is_path {
        ExtraField::UnicodePath {
            version,
            crc32,
            name: text,
        }
    } else {
        ExtraField::UnicodeComment {
            version,
            crc32,
            comment: text,
        }
    })
}

/// Finds the Unicode Path override, if present, honoring the recorded CRC of the original
/// name bytes — callers should only trust the override when `expected_name_crc` matches.
pub fn find_unicode_path<'a>(
    fields: &'a [ExtraField],
    expected_name_crc: u32,
) -> Option<&'a str> {
    fields.iter().find_map(|f| match f {
        ExtraField::UnicodePath { crc32, name, .. } if *crc32 == expected_name_crc => {
            Some(name.as_str())
        }
        _ => None,
    })
}

/// Finds the ZIP64 record, if present.
pub fn find_zip64(fields: &[ExtraField]) -> Option<&ExtraField> {
    fields
        .iter()
        .find(|f| matches!(f, ExtraField::Zip64 { .. }))
}
