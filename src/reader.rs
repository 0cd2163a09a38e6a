//! The entry state machine: owns the "current entry" lifecycle (header, body, close, next)
//! and the byte-producing read path for whichever entry is current.

use std::io::Read;

use flate2::{Decompress, FlushDecompress, Status};

use crate::descriptor::read_data_descriptor;
use crate::encoding::{Cp437Decoder, NameDecoder};
use crate::entry::{CompressionMethod, DosTimestamp, Entry, GeneralPurposeFlags};
use crate::error::{Error, Result};
use crate::extra::{find_unicode_path, find_zip64, parse_extra_fields, ExtraField, Zip64FieldsNeeded};
use crate::primitives::{
    read_u16_le, read_u32_le, CENTRAL_DIRECTORY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIGNATURE,
    LFH_FIXED_SIZE, LFH_SIGNATURE, ZIP64_MIN_VERSION, ZIP64_SIZE_SENTINEL,
};
use crate::pushback::PushbackReader;
use crate::scavenger::scavenge;

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Knobs affecting how entries are decoded and which features are permitted.
pub struct ReaderOptions {
    name_decoder: Box<dyn NameDecoder>,
    use_unicode_extra_fields: bool,
    allow_stored_entries_with_data_descriptor: bool,
    buffer_size: usize,
}

impl ReaderOptions {
    pub fn new() -> Self {
        ReaderOptions::default()
    }

    pub fn name_decoder(mut self, decoder: Box<dyn NameDecoder>) -> Self {
        self.name_decoder = decoder;
        self
    }

    pub fn use_unicode_extra_fields(mut self, enabled: bool) -> Self {
        self.use_unicode_extra_fields = enabled;
        self
    }

    pub fn allow_stored_with_data_descriptor(mut self, allowed: bool) -> Self {
        self.allow_stored_entries_with_data_descriptor = allowed;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            name_decoder: Box::new(Cp437Decoder),
            use_unicode_extra_fields: true,
            allow_stored_entries_with_data_descriptor: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// What mode of reading is active for the current entry's body.
enum BodyMode {
    /// STORED (or an unsupported method, for skip-only purposes): raw bytes, no transform.
    Raw,
    /// DEFLATE, decoded through the low-level `flate2::Decompress` state machine.
    Deflated,
    /// STORED with a deferred size, served from an in-memory buffer the scavenger filled.
    StoredCache { data: Vec<u8>, cursor: usize },
}

struct CurrentEntry {
    entry: Entry,
    body_mode: BodyMode,
    has_data_descriptor: bool,
    uses_zip64: bool,
    bytes_read_from_stream: u64,
    entry_bytes_produced: u64,
    buffered_off: usize,
    buffered_len: usize,
}

/// A forward-only reader over a ZIP archive byte stream.
///
/// Yields entries via [`next_entry`](ZipStreamReader::next_entry) and serves their bodies via
/// [`read`](ZipStreamReader::read). Never seeks; the input only needs to implement
/// [`std::io::Read`].
pub struct ZipStreamReader<R: Read> {
    source: PushbackReader<R>,
    decompressor: Decompress,
    crc: crc32fast::Hasher,
    read_buf: Box<[u8]>,
    current: Option<CurrentEntry>,
    hit_central_directory: bool,
    closed: bool,
    options: ReaderOptions,
}

impl<R: Read> ZipStreamReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_options(source, ReaderOptions::default())
    }

    pub fn with_options(source: R, options: ReaderOptions) -> Self {
        let buffer_size = options.buffer_size.max(LFH_FIXED_SIZE);
        ZipStreamReader {
            source: PushbackReader::new(source),
            decompressor: Decompress::new(false),
            crc: crc32fast::Hasher::new(),
            read_buf: vec![0u8; buffer_size].into_boxed_slice(),
            current: None,
            hit_central_directory: false,
            closed: false,
            options,
        }
    }

    /// Live view of the entry under iteration, with sizes/CRC filled in as they become known.
    pub fn current_entry(&self) -> Option<&Entry> {
        self.current.as_ref().map(|c| &c.entry)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Advances to the next entry, implicitly closing whatever entry is currently open.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.hit_central_directory {
            return Ok(None);
        }
        if self.current.is_some() {
            self.close_current_entry()?;
        }

        // A trailing End of Central Directory record with no comment is only 22 bytes — shorter
        // than a Local File Header — so an empty (or fully-consumed) archive's last readable
        // record may come up short. Only a genuine LFH signature obligates the rest of the
        // fixed 30 bytes; anything else is resolved from however many bytes actually showed up.
        let mut header = [0u8; LFH_FIXED_SIZE];
        let total = self.read_header_bytes(&mut header)?;
        if total < 4 {
            return Ok(None);
        }

        let signature = read_u32_le(&header[0..4]);
        if signature == CENTRAL_DIRECTORY_SIGNATURE {
            self.hit_central_directory = true;
            return Ok(None);
        }
        if signature != LFH_SIGNATURE {
            return Ok(None);
        }
        if total < LFH_FIXED_SIZE {
            return Err(Error::Truncated("local file header"));
        }

        let version_needed = header[4];
        let uses_zip64 = version_needed >= ZIP64_MIN_VERSION as u8;
        let flags = GeneralPurposeFlags(read_u16_le(&header[6..8]));
        let method = CompressionMethod::from_u16(read_u16_le(&header[8..10]));
        let mod_time = read_u16_le(&header[10..12]);
        let mod_date = read_u16_le(&header[12..14]);
        let mut crc32 = read_u32_le(&header[14..18]);
        let mut compressed_size_raw = read_u32_le(&header[18..22]);
        let mut uncompressed_size_raw = read_u32_le(&header[22..26]);
        let name_len = read_u16_le(&header[26..28]) as usize;
        let extra_len = read_u16_le(&header[28..30]) as usize;

        if flags.has_data_descriptor() {
            crc32 = 0;
            compressed_size_raw = 0;
            uncompressed_size_raw = 0;
        }

        let mut raw_name = vec![0u8; name_len];
        self.read_exact_or_truncated(&mut raw_name, "local file header name")?;
        let mut extra_bytes = vec![0u8; extra_len];
        self.read_exact_or_truncated(&mut extra_bytes, "local file header extra field")?;

        let zip64_needed = Zip64FieldsNeeded {
            uncompressed_size: uncompressed_size_raw == ZIP64_SIZE_SENTINEL,
            compressed_size: compressed_size_raw == ZIP64_SIZE_SENTINEL,
            local_header_offset: false,
            disk_start: false,
        };
        let extra_fields = parse_extra_fields(&extra_bytes, zip64_needed);

        let mut compressed_size = if flags.has_data_descriptor() {
            None
        } else {
            Some(compressed_size_raw as u64)
        };
        let mut uncompressed_size = if flags.has_data_descriptor() {
            None
        } else {
            Some(uncompressed_size_raw as u64)
        };

        if !flags.has_data_descriptor()
            && uses_zip64
            && (compressed_size_raw == ZIP64_SIZE_SENTINEL
                || uncompressed_size_raw == ZIP64_SIZE_SENTINEL)
        {
            match find_zip64(&extra_fields) {
                Some(ExtraField::Zip64 {
                    uncompressed_size: z_usize,
                    compressed_size: z_csize,
                    ..
                }) => {
                    if uncompressed_size_raw == ZIP64_SIZE_SENTINEL {
                        uncompressed_size = *z_usize;
                    }
                    if compressed_size_raw == ZIP64_SIZE_SENTINEL {
                        compressed_size = *z_csize;
                    }
                }
                _ => {
                    return Err(Error::Malformed(
                        "local file header declares a zip64 sentinel size with no zip64 extra record"
                            .to_string(),
                    ))
                }
            }
        }

        let mut name = if flags.uses_utf8() {
            String::from_utf8_lossy(&raw_name).into_owned()
        } else {
            self.options.name_decoder.decode(&raw_name)
        };
        if !flags.uses_utf8() && self.options.use_unicode_extra_fields {
            let expected_crc = crc32fast::hash(&raw_name);
            if let Some(override_name) = find_unicode_path(&extra_fields, expected_crc) {
                name = override_name.to_string();
            }
        }

        let entry = Entry {
            name,
            raw_name,
            method,
            crc32,
            compressed_size,
            uncompressed_size,
            modified: DosTimestamp::new(mod_date, mod_time),
            platform: None,
            flags,
            extra_fields,
        };

        let body_mode = match method {
            CompressionMethod::Deflated => BodyMode::Deflated,
            _ => BodyMode::Raw,
        };

        self.decompressor = Decompress::new(false);
        self.crc = crc32fast::Hasher::new();
        self.current = Some(CurrentEntry {
            entry: entry.clone(),
            body_mode,
            has_data_descriptor: flags.has_data_descriptor(),
            uses_zip64,
            bytes_read_from_stream: 0,
            entry_bytes_produced: 0,
            buffered_off: 0,
            buffered_len: 0,
        });

        Ok(Some(entry))
    }

    /// True iff this reader can decode the body of `entry` given current options.
    pub fn can_read_entry_data(&self, entry: &Entry) -> bool {
        if entry.flags.encrypted() {
            return false;
        }
        match entry.method {
            CompressionMethod::Stored => {
                !entry.flags.has_data_descriptor()
                    || self.options.allow_stored_entries_with_data_descriptor
            }
            CompressionMethod::Deflated => true,
            CompressionMethod::Other(_) => false,
        }
    }

    /// If the current entry is STORED with a deferred size, scavenges it into memory. This
    /// runs regardless of `allow_stored_with_data_descriptor`: closing (skipping) an entry must
    /// still find where it ends even when the reader is configured to refuse to hand out its
    /// bytes.
    fn ensure_stored_cache_populated(&mut self) -> Result<()> {
        let needs = {
            let current = self.current.as_ref().unwrap();
            current.entry.method == CompressionMethod::Stored
                && current.entry.flags.has_data_descriptor()
                && !matches!(current.body_mode, BodyMode::StoredCache { .. })
        };
        if !needs {
            return Ok(());
        }
        let uses_zip64 = self.current.as_ref().unwrap().uses_zip64;
        let (data, dd) = scavenge(&mut self.source, &mut self.read_buf, uses_zip64)?;
        let current = self.current.as_mut().unwrap();
        current.entry.crc32 = dd.crc32;
        current.entry.compressed_size = Some(dd.compressed_size);
        current.entry.uncompressed_size = Some(dd.uncompressed_size);
        current.has_data_descriptor = false;
        current.body_mode = BodyMode::StoredCache { data, cursor: 0 };
        Ok(())
    }

    /// Reads decompressed body bytes for the current entry. `Ok(0)` marks end-of-entry.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.current.is_none() {
            return Err(Error::InvalidArgument("no entry is currently open"));
        }

        // Checked against the header-derived snapshot, before the scavenger ever runs: a
        // STORED+DD entry the caller isn't allowed to read must be rejected without first
        // scanning and buffering its (attacker-controlled, unbounded) body into memory.
        let entry_snapshot = self.current.as_ref().unwrap().entry.clone();
        if !self.can_read_entry_data(&entry_snapshot) {
            return Err(Error::UnsupportedFeature(
                "entry cannot be read with current reader configuration",
            ));
        }
        self.ensure_stored_cache_populated()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let current = self.current.as_mut().unwrap();
        let n = match &mut current.body_mode {
            BodyMode::StoredCache { data, cursor } => {
                let remaining = data.len() - *cursor;
                let n = remaining.min(buf.len());
                buf[..n].copy_from_slice(&data[*cursor..*cursor + n]);
                *cursor += n;
                current.entry_bytes_produced = *cursor as u64;
                n
            }
            BodyMode::Raw => {
                let target = current.entry.compressed_size.unwrap_or(0);
                let remaining_entry = target - current.entry_bytes_produced;
                if remaining_entry == 0 {
                    0
                } else {
                    if current.buffered_off >= current.buffered_len {
                        let n = self.source.read(&mut self.read_buf)?;
                        current.buffered_off = 0;
                        current.buffered_len = n;
                        current.bytes_read_from_stream += n as u64;
                        if n == 0 {
                            return Err(Error::Truncated("entry body"));
                        }
                    }
                    let available = current.buffered_len - current.buffered_off;
                    let n = (remaining_entry as usize).min(available).min(buf.len());
                    buf[..n].copy_from_slice(
                        &self.read_buf[current.buffered_off..current.buffered_off + n],
                    );
                    current.buffered_off += n;
                    current.entry_bytes_produced += n as u64;
                    n
                }
            }
            BodyMode::Deflated => loop {
                if current.buffered_off >= current.buffered_len {
                    let n = self.source.read(&mut self.read_buf)?;
                    current.buffered_off = 0;
                    current.buffered_len = n;
                    current.bytes_read_from_stream += n as u64;
                }
                let input_available = current.buffered_len > current.buffered_off;
                let input = if input_available {
                    &self.read_buf[current.buffered_off..current.buffered_len]
                } else {
                    &[][..]
                };
                let before_in = self.decompressor.total_in();
                let before_out = self.decompressor.total_out();
                let status = self
                    .decompressor
                    .decompress(input, buf, FlushDecompress::None)
                    .map_err(|e| Error::Malformed(format!("corrupt deflate stream: {e}")))?;
                let consumed = (self.decompressor.total_in() - before_in) as usize;
                let produced = (self.decompressor.total_out() - before_out) as usize;
                current.buffered_off += consumed;

                if produced > 0 {
                    current.entry_bytes_produced += produced as u64;
                    break produced;
                }
                if status == Status::StreamEnd {
                    break 0;
                }
                if !input_available {
                    return Err(Error::Truncated("deflate stream ended before StreamEnd"));
                }
                // Needs more input, or this round's input produced nothing: loop and refill.
            },
        };

        self.crc.update(&buf[..n]);
        Ok(n)
    }

    /// Discards up to `n` bytes of body data, returning how many were actually skipped.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        let mut remaining = n;
        let mut scratch = [0u8; 4096];
        let mut total = 0u64;
        while remaining > 0 {
            let want = remaining.min(scratch.len() as u64) as usize;
            let read = self.read(&mut scratch[..want])?;
            if read == 0 {
                break;
            }
            remaining -= read as u64;
            total += read as u64;
        }
        Ok(total)
    }

    /// Closes the current entry (if any), positioning the source at the next header.
    fn close_current_entry(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Ok(());
        }
        self.ensure_stored_cache_populated()?;

        let mut current = self.current.take().unwrap();
        let fully_delivered = match &current.body_mode {
            BodyMode::StoredCache { data, cursor } => *cursor == data.len(),
            BodyMode::Raw => {
                let started = current.bytes_read_from_stream > 0;
                if !started {
                    let target = current.entry.compressed_size.ok_or_else(|| {
                        Error::UnsupportedFeature(
                            "cannot determine end of an entry with both an unsupported \
                             compression method and a deferred data descriptor",
                        )
                    })?;
                    self.skip_source_bytes(target)?;
                    false
                } else {
                    current = self.drain_to_completion(current)?;
                    self.push_back_unconsumed(&mut current);
                    true
                }
            }
            BodyMode::Deflated => {
                let started = current.bytes_read_from_stream > 0;
                match (started, current.entry.compressed_size) {
                    (false, Some(csize)) => {
                        self.skip_source_bytes(csize)?;
                        false
                    }
                    _ => {
                        current = self.drain_to_completion(current)?;
                        self.push_back_unconsumed(&mut current);
                        true
                    }
                }
            }
        };

        if current.has_data_descriptor {
            let (dd, _consumed) = read_data_descriptor(&mut self.source, current.uses_zip64)?;
            current.entry.crc32 = dd.crc32;
            current.entry.compressed_size = Some(dd.compressed_size);
            current.entry.uncompressed_size = Some(dd.uncompressed_size);
        }

        if fully_delivered {
            let computed = self.crc.clone().finalize();
            if computed != current.entry.crc32 {
                return Err(Error::Malformed(format!(
                    "crc mismatch for {}: expected {:08x}, computed {:08x}",
                    current.entry.name, current.entry.crc32, computed
                )));
            }
        }

        Ok(())
    }

    /// Drains an entry's body via the ordinary read path until end-of-entry, returning the
    /// (possibly mutated) `CurrentEntry` afterward.
    fn drain_to_completion(&mut self, current: CurrentEntry) -> Result<CurrentEntry> {
        self.current = Some(current);
        let mut scratch = [0u8; 4096];
        loop {
            let n = self.read(&mut scratch)?;
            if n == 0 {
                break;
            }
        }
        Ok(self.current.take().unwrap())
    }

    /// Returns any bytes already fetched into `read_buf` past the entry's true end to the
    /// source, so the next `next_entry()` call sees them as the start of the following header
    /// instead of silently dropping them.
    fn push_back_unconsumed(&mut self, current: &mut CurrentEntry) {
        if current.buffered_off < current.buffered_len {
            self.source
                .unread(&self.read_buf[current.buffered_off..current.buffered_len]);
            current.buffered_off = current.buffered_len;
        }
    }

    /// Pulls `n` raw bytes from the source (through any pending pushback) and discards them.
    fn skip_source_bytes(&mut self, mut n: u64) -> Result<()> {
        while n > 0 {
            let want = n.min(self.read_buf.len() as u64) as usize;
            let read = self.source.read(&mut self.read_buf[..want])?;
            if read == 0 {
                return Err(Error::Truncated("skipping to next entry header"));
            }
            n -= read as u64;
        }
        Ok(())
    }

    /// Reads up to the fixed LFH size, returning how many bytes actually showed up before EOF.
    /// A short count isn't an error here: the record at this position might be a trailing EOCD
    /// (22 bytes with no comment, shorter than a Local File Header) rather than a real LFH.
    fn read_header_bytes(&mut self, header: &mut [u8; LFH_FIXED_SIZE]) -> Result<usize> {
        let mut total = 0usize;
        while total < header.len() {
            let n = self.source.read(&mut header[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8], context: &'static str) -> Result<()> {
        let mut total = 0usize;
        while total < buf.len() {
            let n = self.source.read(&mut buf[total..])?;
            if n == 0 {
                return Err(Error::Truncated(context));
            }
            total += n;
        }
        Ok(())
    }

    /// Finalizes the reader: closes any open entry and latches the terminal state.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.current.is_some() {
            self.close_current_entry()?;
        }
        self.closed = true;
        Ok(())
    }
}

impl<R: Read> Read for ZipStreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        ZipStreamReader::read(self, buf).map_err(std::io::Error::from)
    }
}

/// True iff the leading 4 bytes of `bytes` equal the Local File Header signature or the End of
/// Central Directory signature (an empty archive's only "entry" header slot is the EOCD).
pub fn matches_entry_signature(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }
    let signature = read_u32_le(&bytes[0..4]);
    signature == LFH_SIGNATURE || signature == END_OF_CENTRAL_DIRECTORY_SIGNATURE
}
