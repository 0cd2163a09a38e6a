//! The entry data model: [`Entry`], compression method, general-purpose flags, and the
//! MS-DOS date/time representation ZIP stores modification times in.

use std::time::{Duration, SystemTime};

use crate::extra::ExtraField;

/// Compression method recorded in the Local File Header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    /// Recognized numeric code but not decodable by this reader (e.g. bzip2, LZMA, Zstd).
    Other(u16),
}

impl CompressionMethod {
    pub fn from_u16(method: u16) -> Self {
        match method {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            other => CompressionMethod::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Other(code) => code,
        }
    }
}

/// The 16-bit general-purpose bit flag word from the Local File Header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneralPurposeFlags(pub u16);

impl GeneralPurposeFlags {
    const ENCRYPTED_BIT: u16 = 1 << 0;
    const DATA_DESCRIPTOR_BIT: u16 = 1 << 3;
    const UTF8_BIT: u16 = 1 << 11;

    pub fn encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED_BIT != 0
    }

    pub fn has_data_descriptor(self) -> bool {
        self.0 & Self::DATA_DESCRIPTOR_BIT != 0
    }

    pub fn uses_utf8(self) -> bool {
        self.0 & Self::UTF8_BIT != 0
    }
}

/// Host platform recorded in the upper nibble of "version made by".
///
/// Only populated when a central directory record was consulted; streaming reads never see
/// "version made by" (it is not part of the Local File Header) so this stays `None` there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Dos,
    Unix,
    Other(u8),
}

impl Platform {
    pub fn from_upper_nibble(code: u8) -> Self {
        match code {
            0 => Platform::Dos,
            3 => Platform::Unix,
            other => Platform::Other(other),
        }
    }
}

/// MS-DOS date/time as stored in the Local File Header: two raw 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosTimestamp {
    pub time: u16,
    pub date: u16,
}

impl DosTimestamp {
    pub fn new(date: u16, time: u16) -> Self {
        DosTimestamp { time, date }
    }

    /// Converts to a platform-neutral timestamp. Returns `None` for the all-zero sentinel
    /// DOS often uses for "no timestamp" (which would otherwise decode to a date before the
    /// epoch DOS itself can represent, 1980-01-01).
    pub fn to_system_time(self) -> Option<SystemTime> {
        let seconds = (self.time & 0x1F) as u64 * 2;
        let minutes = ((self.time >> 5) & 0x3F) as u64;
        let hours = ((self.time >> 11) & 0x1F) as u64;

        let day = (self.date & 0x1F) as u64;
        let month = ((self.date >> 5) & 0x0F) as u64;
        let year = ((self.date >> 9) & 0x7F) as u64 + 1980;

        if day == 0 || month == 0 || month > 12 {
            return None;
        }

        let days_since_epoch = days_from_civil(year as i64, month as i64, day as i64)?;
        let secs = days_since_epoch * 86_400 + hours * 3600 + minutes * 60 + seconds;
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }
}

/// Days since 1970-01-01 for a given proleptic Gregorian civil date. Howard Hinnant's
/// well-known constant-time algorithm; avoids pulling in a full calendar/date crate for a
/// single conversion.
fn days_from_civil(y: i64, m: i64, d: i64) -> Option<u64> {
    if y < 1970 {
        return None;
    }
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146_097 + doe - 719_468;
    if days < 0 {
        None
    } else {
        Some(days as u64)
    }
}

/// A single archive entry: metadata plus the means to read its decompressed body.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub raw_name: Vec<u8>,
    pub method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
    pub modified: DosTimestamp,
    pub platform: Option<Platform>,
    pub flags: GeneralPurposeFlags,
    pub extra_fields: Vec<ExtraField>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_timestamp_epoch() {
        // 1980-01-01 00:00:00, the minimum representable DOS date.
        let ts = DosTimestamp::new(0b0000_0000_0010_0001, 0);
        let st = ts.to_system_time().unwrap();
        let secs = st.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        // 1980-01-01 is 3652 days after 1970-01-01 (ten years, two of them leap).
        assert_eq!(secs, 3652 * 86_400);
    }

    #[test]
    fn flags_decode_bits() {
        let flags = GeneralPurposeFlags(0b0000_1000_0000_1001);
        assert!(flags.encrypted());
        assert!(flags.has_data_descriptor());
        assert!(!flags.uses_utf8());
    }

    #[test]
    fn compression_method_round_trips_known_codes() {
        assert_eq!(CompressionMethod::from_u16(0), CompressionMethod::Stored);
        assert_eq!(CompressionMethod::from_u16(8), CompressionMethod::Deflated);
        assert_eq!(
            CompressionMethod::from_u16(12),
            CompressionMethod::Other(12)
        );
    }
}
