//! Reads the optional trailing data descriptor, with or without its signature, in 32-bit or
//! ZIP64 form.

use std::io::Read;

use crate::error::{Error, Result};
use crate::primitives::{read_u32_le, read_u64_le, DATA_DESCRIPTOR_SIGNATURE};

/// The three values a data descriptor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// Reads a data descriptor from `source`. `uses_zip64` selects 8-byte vs. 4-byte size fields.
///
/// Returns the descriptor plus the total number of raw bytes consumed from `source` (useful
/// for callers tracking how many bytes they've pulled past the entry body).
pub fn read_data_descriptor<R: Read>(
    source: &mut R,
    uses_zip64: bool,
) -> Result<(DataDescriptor, u64)> {
    let mut first_word = [0u8; 4];
    read_exact_or_truncated(source, &mut first_word, "data descriptor signature/crc")?;
    let mut consumed = 4u64;

    let crc32 = if read_u32_le(&first_word) == DATA_DESCRIPTOR_SIGNATURE {
        let mut crc_bytes = [0u8; 4];
        read_exact_or_truncated(source, &mut crc_bytes, "data descriptor crc")?;
        consumed += 4;
        read_u32_le(&crc_bytes)
    } else {
        read_u32_le(&first_word)
    };

    let (compressed_size, uncompressed_size) = if uses_zip64 {
        let mut sizes = [0u8; 16];
        read_exact_or_truncated(source, &mut sizes, "zip64 data descriptor sizes")?;
        consumed += 16;
        (read_u64_le(&sizes[0..8]), read_u64_le(&sizes[8..16]))
    } else {
        let mut sizes = [0u8; 8];
        read_exact_or_truncated(source, &mut sizes, "data descriptor sizes")?;
        consumed += 8;
        (
            read_u32_le(&sizes[0..4]) as u64,
            read_u32_le(&sizes[4..8]) as u64,
        )
    };

    Ok((
        DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
        },
        consumed,
    ))
}

fn read_exact_or_truncated<R: Read>(
    source: &mut R,
    buf: &mut [u8],
    context: &'static str,
) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated(context)
        } else {
            Error::Io(e)
        }
    })
}
