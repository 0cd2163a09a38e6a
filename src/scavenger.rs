//! Stored-entry scavenger: recovers the end of a STORED entry whose size was deferred to a
//! trailing data descriptor, by scanning forward for the next plausible header signature.
//!
//! A forward-only reader has no central directory to consult, so when a STORED entry defers
//! its size to a trailing descriptor, the only way to find where it ends is to look for it.
//!
//! Two cases are distinguished while scanning:
//! - The data descriptor carries its optional 4-byte signature: that signature is itself the
//!   first thing found, and marks where the descriptor (and so the payload's end) begins.
//! - The descriptor has no signature: the only thing to find is the *next* entry's LFH/CFH
//!   signature, and the descriptor is inferred to occupy the `dd_len` bytes immediately
//!   preceding it.

use std::io::Read;

use crate::descriptor::{read_data_descriptor, DataDescriptor};
use crate::error::{Error, Result};
use crate::primitives::{CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, LFH_SIGNATURE};
use crate::pushback::PushbackReader;

/// Scans `source` for the next header signature, treating everything before the inferred
/// descriptor start as the payload of a STORED entry whose size was deferred.
///
/// Returns the collected payload bytes and the parsed descriptor. On return, `source` is
/// positioned exactly after the descriptor; any bytes belonging to the entry that triggered
/// the scan's termination have been pushed back for the caller's next read.
pub fn scavenge<R: Read>(
    source: &mut PushbackReader<R>,
    buf: &mut [u8],
    uses_zip64: bool,
) -> Result<(Vec<u8>, DataDescriptor)> {
    let dd_len = if uses_zip64 { 20usize } else { 12usize };
    let keep = dd_len + 3;
    assert!(
        buf.len() > keep,
        "scavenger working buffer must exceed data-descriptor length plus lookahead margin"
    );

    let lfh_bytes = LFH_SIGNATURE.to_le_bytes();
    let cfh_bytes = CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes();
    let dd_bytes = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();

    let mut collected = Vec::new();
    let mut off = 0usize;

    loop {
        let n = source.read(&mut buf[off..])?;
        if n == 0 {
            return Err(Error::Truncated(
                "stored entry scavenger: unexpected EOF before next header signature",
            ));
        }
        let total = off + n;

        if total < 4 {
            off = total;
            continue;
        }

        let mut hit: Option<(usize, bool)> = None;
        for i in 0..=(total - 4) {
            let word = &buf[i..i + 4];
            if word == dd_bytes {
                hit = Some((i, false));
                break;
            }
            if word == lfh_bytes || word == cfh_bytes {
                hit = Some((i, true));
                break;
            }
        }

        if let Some((i, is_header_signature)) = hit {
            // For a DD hit, the signature itself is where the descriptor starts. For a
            // header hit, the descriptor has no signature and must occupy the `dd_len`
            // bytes immediately preceding the header we just found.
            let descriptor_start = if is_header_signature {
                i.checked_sub(dd_len).ok_or_else(|| {
                    Error::Malformed(
                        "stored entry scavenger: header signature found before a full \
                         data descriptor could precede it"
                            .to_string(),
                    )
                })?
            } else {
                i
            };

            collected.extend_from_slice(&buf[0..descriptor_start]);
            source.unread(&buf[descriptor_start..total]);
            let (dd, _consumed) = read_data_descriptor(source, uses_zip64)?;
            return Ok((collected, dd));
        }

        if total <= keep {
            off = total;
            if off >= buf.len() {
                return Err(Error::Truncated(
                    "stored entry scavenger: working buffer exhausted without a header signature",
                ));
            }
            continue;
        }

        let flush_len = total - keep;
        collected.extend_from_slice(&buf[0..flush_len]);
        buf.copy_within(flush_len..total, 0);
        off = keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_scavenge(bytes: &[u8], uses_zip64: bool) -> (Vec<u8>, DataDescriptor, Vec<u8>) {
        let mut source = PushbackReader::new(bytes);
        let mut buf = vec![0u8; 64];
        let (payload, dd) = scavenge(&mut source, &mut buf, uses_zip64).unwrap();
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        (payload, dd, rest)
    }

    #[test]
    fn finds_data_descriptor_directly() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"xyz123");
        bytes.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(b"xyz123").to_le_bytes());
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(b"TRAILING");

        let (payload, dd, rest) = run_scavenge(&bytes, false);
        assert_eq!(payload, b"xyz123");
        assert_eq!(dd.compressed_size, 6);
        assert_eq!(dd.uncompressed_size, 6);
        assert_eq!(dd.crc32, crc32fast::hash(b"xyz123"));
        assert_eq!(rest, b"TRAILING");
    }

    #[test]
    fn finds_next_local_file_header_without_dd_signature() {
        // Payload followed by a signature-less descriptor (crc, csize, usize), followed
        // immediately by the next entry's LFH signature.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"hello!");
        bytes.extend_from_slice(&crc32fast::hash(b"hello!").to_le_bytes());
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&LFH_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(b"NEXT-ENTRY-HEADER-BYTES");

        let (payload, dd, rest) = run_scavenge(&bytes, false);
        assert_eq!(payload, b"hello!");
        assert_eq!(dd.uncompressed_size, 6);
        // The LFH signature bytes must still be available for the caller's next_entry() call.
        assert!(rest.starts_with(&LFH_SIGNATURE.to_le_bytes()));
        assert!(rest.ends_with(b"NEXT-ENTRY-HEADER-BYTES"));
    }

    #[test]
    fn spurious_partial_match_does_not_terminate_early() {
        // A byte pair that looks like the start of an LFH signature (0x50, 0x4b) but whose
        // third/fourth bytes don't match must not be treated as a hit.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&[0x50, 0x4b, 0x00, 0x00]); // looks like it, isn't
        bytes.extend_from_slice(b"more");
        bytes.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        let payload_so_far = b"data\x50\x4b\x00\x00more";
        bytes.extend_from_slice(&crc32fast::hash(payload_so_far).to_le_bytes());
        bytes.extend_from_slice(&(payload_so_far.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(payload_so_far.len() as u32).to_le_bytes());

        let (payload, dd, _rest) = run_scavenge(&bytes, false);
        assert_eq!(payload, payload_so_far);
        assert_eq!(dd.compressed_size, payload_so_far.len() as u64);
    }

    #[test]
    fn truncated_stream_without_any_signature_errors() {
        let bytes = b"short and sad, no signature here at all".to_vec();
        let mut source = PushbackReader::new(&bytes[..]);
        let mut buf = vec![0u8; 64];
        let err = scavenge(&mut source, &mut buf, false).unwrap_err();
        assert!(matches!(err, Error::Truncated(_)));
    }

    #[test]
    fn handles_payload_larger_than_working_buffer() {
        // Forces at least one "no signature found yet, slide the window" iteration.
        let payload = vec![b'A'; 200];
        let mut bytes = payload.clone();
        bytes.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());

        let mut source = PushbackReader::new(&bytes[..]);
        let mut buf = vec![0u8; 64]; // smaller than the payload, forces sliding
        let (collected, dd) = scavenge(&mut source, &mut buf, false).unwrap();
        assert_eq!(collected, payload);
        assert_eq!(dd.uncompressed_size, payload.len() as u64);
    }

    #[test]
    fn zip64_descriptor_sizes_are_read() {
        let payload = b"zip64-stored-payload";
        let mut bytes = payload.to_vec();
        bytes.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());

        let (collected, dd, _rest) = run_scavenge(&bytes, true);
        assert_eq!(collected, payload);
        assert_eq!(dd.compressed_size, payload.len() as u64);
    }

    #[test]
    fn next_central_directory_header_without_dd_signature_is_detected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"payload-before-cd");
        bytes.extend_from_slice(&crc32fast::hash(b"payload-before-cd").to_le_bytes());
        bytes.extend_from_slice(&17u32.to_le_bytes());
        bytes.extend_from_slice(&17u32.to_le_bytes());
        bytes.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(b"REST-OF-CENTRAL-DIRECTORY");

        let (payload, dd, rest) = run_scavenge(&bytes, false);
        assert_eq!(payload, b"payload-before-cd");
        assert_eq!(dd.uncompressed_size, 17);
        assert!(rest.starts_with(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes()));
    }
}
