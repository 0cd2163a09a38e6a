//! Crafts minimal ZIP64 archives by hand (no writer exists in this crate) and drives them
//! through `ZipStreamReader`, exercising the 64-bit-size path a streaming reader must take
//! since it never gets to see the central directory.

use std::io::Read;

use s_zip::primitives::{LFH_SIGNATURE, ZIP64_SIZE_SENTINEL};
use s_zip::{CompressionMethod, ZipStreamReader};

fn lfh_zip64_stored(name: &[u8], data: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&LFH_SIGNATURE.to_le_bytes());
    v.extend_from_slice(&45u16.to_le_bytes()); // version needed: zip64 in play
    v.extend_from_slice(&0u16.to_le_bytes()); // flags: no data descriptor
    v.extend_from_slice(&0u16.to_le_bytes()); // method: stored
    v.extend_from_slice(&0u16.to_le_bytes()); // mod time
    v.extend_from_slice(&0x21u16.to_le_bytes()); // mod date: 1980-01-01
    v.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    v.extend_from_slice(&ZIP64_SIZE_SENTINEL.to_le_bytes()); // compressed size sentinel
    v.extend_from_slice(&ZIP64_SIZE_SENTINEL.to_le_bytes()); // uncompressed size sentinel
    v.extend_from_slice(&(name.len() as u16).to_le_bytes());

    let mut extra = Vec::new();
    extra.extend_from_slice(&0x0001u16.to_le_bytes()); // ZIP64_EXTRA_ID
    extra.extend_from_slice(&16u16.to_le_bytes()); // two 8-byte fields follow
    extra.extend_from_slice(&(data.len() as u64).to_le_bytes()); // uncompressed size
    extra.extend_from_slice(&(data.len() as u64).to_le_bytes()); // compressed size

    v.extend_from_slice(&(extra.len() as u16).to_le_bytes());
    v.extend_from_slice(name);
    v.extend_from_slice(&extra);
    v.extend_from_slice(data);
    v
}

#[test]
fn reads_zip64_stored_entry_with_known_sizes() {
    let data = b"hello";
    let mut bytes = lfh_zip64_stored(b"a.txt", data);
    bytes.extend_from_slice(&0x0605_4b50u32.to_le_bytes()); // EOCD
    bytes.extend_from_slice(&[0u8; 18]);

    let mut reader = ZipStreamReader::new(&bytes[..]);
    let entry = reader.next_entry().unwrap().expect("should parse one entry");
    assert_eq!(entry.name, "a.txt");
    assert_eq!(entry.method, CompressionMethod::Stored);
    assert_eq!(entry.uncompressed_size, Some(data.len() as u64));
    assert_eq!(entry.compressed_size, Some(data.len() as u64));

    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    reader.close().unwrap();

    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn reads_zip64_sizes_beyond_32_bit_range() {
    // A real 5GB payload would make the test glacial; what matters is that the sentinel/extra
    // plumbing carries a value the 32-bit LFH fields could never hold on their own.
    let huge = 5_000_000_000u64;
    let data = b"small-actual-payload-standing-in-for-a-huge-declared-size";

    let mut lfh = lfh_zip64_stored(b"big.bin", data);
    // Overwrite the extra field's declared sizes with the oversized value; the actual bytes
    // written after the header are still small; we only read up to the entry's declared end
    // relative to the body, so truncate the assertions to the decoder's bookkeeping instead of
    // requiring a multi-gigabyte fixture.
    let extra_start = lfh.len() - data.len() - 16;
    lfh[extra_start..extra_start + 8].copy_from_slice(&huge.to_le_bytes());

    let mut reader = ZipStreamReader::new(&lfh[..]);
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.uncompressed_size, Some(huge));
}

#[test]
fn missing_zip64_extra_with_sentinel_sizes_is_malformed() {
    let mut v = Vec::new();
    v.extend_from_slice(&LFH_SIGNATURE.to_le_bytes());
    v.extend_from_slice(&45u16.to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&ZIP64_SIZE_SENTINEL.to_le_bytes());
    v.extend_from_slice(&ZIP64_SIZE_SENTINEL.to_le_bytes());
    v.extend_from_slice(&(5u16).to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes()); // no extra field at all
    v.extend_from_slice(b"a.txt");

    let mut reader = ZipStreamReader::new(&v[..]);
    let err = reader.next_entry().unwrap_err();
    assert!(matches!(err, s_zip::Error::Malformed(_)));
}
