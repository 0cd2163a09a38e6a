//! # s-zip: a forward-only streaming reader for the ZIP archive format
//!
//! `s-zip` reads ZIP archives from anything implementing [`std::io::Read`] — a file, a
//! network body, a pipe — without seeking and without buffering the whole archive in memory.
//! It walks local file headers forward instead of consulting the trailing central directory,
//! which is what makes it work on sources that can't seek.
//!
//! Two ZIP conventions are handled transparently:
//! - entries that defer their sizes to a trailing data descriptor (common when the producer
//!   couldn't seek back to fill in the Local File Header after compressing), and
//! - ZIP64, for archives with entries larger than 4 GiB.
//!
//! ## Quick start
//!
//! ```no_run
//! use s_zip::ZipStreamReader;
//! use std::fs::File;
//! use std::io::Read;
//!
//! # fn main() -> s_zip::Result<()> {
//! let file = File::open("archive.zip")?;
//! let mut zip = ZipStreamReader::new(file);
//!
//! while let Some(entry) = zip.next_entry()? {
//!     println!("{}: {:?} bytes", entry.name, entry.uncompressed_size);
//!     let mut contents = Vec::new();
//!     zip.read_to_end(&mut contents)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! This crate reads STORED and DEFLATED entries. It does not write archives, does not support
//! encryption, and does not offer random access — see [`ZipStreamReader`] for the full
//! contract and [`error::Error`] for how failures are reported.

pub mod descriptor;
pub mod encoding;
pub mod entry;
pub mod error;
pub mod extra;
pub mod primitives;
pub mod pushback;
pub mod reader;
pub mod scavenger;

pub use encoding::{Cp437Decoder, NameDecoder, Utf8LossyDecoder};
pub use entry::{CompressionMethod, DosTimestamp, Entry, GeneralPurposeFlags, Platform};
pub use error::{Error, Result};
pub use extra::ExtraField;
pub use reader::{matches_entry_signature, ReaderOptions, ZipStreamReader};
