//! On-disk structures of the NKS container.
//!
//! Every structure an entry offset can point at starts with a 4-byte magic
//! that selects its layout:
//!
//! | Structure      | Magic        | Size on disk          |
//! |----------------|--------------|-----------------------|
//! | Directory      | `0x5E70AC54` | 22 B + entry headers  |
//! | Plain file     | `0x4916E63C` | 27 B + payload        |
//! | Encrypted file | `0x16CCF80A` | 31 B + payload        |
//!
//! All multi-byte integers are little-endian.  Opaque fields are carried
//! through verbatim and never interpreted.

pub mod directory;
pub mod entry;
pub mod file;

use std::fmt;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{NksError, Result};

pub use directory::DirectoryHeader;
pub use entry::{EntryHeader, EntryReserved, TypeHint};
pub use file::{EncryptedFileHeader, FileHeader};

pub const DIRECTORY_MAGIC:      u32 = 0x5E70_AC54;
pub const FILE_MAGIC:           u32 = 0x4916_E63C;
pub const ENCRYPTED_FILE_MAGIC: u32 = 0x16CC_F80A;

/// XOR mask applied to the stored offset of encrypted-file entries.
pub const OFFSET_KEY: u32 = 0x1F4E_0C8D;

// ── FormatVersion ─────────────────────────────────────────────────────────────

/// The two layout revisions.  A directory's version selects the entry header
/// encoding for every entry directly beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    V0100,
    V0110,
}

impl FormatVersion {
    pub fn as_u16(self) -> u16 {
        match self {
            FormatVersion::V0100 => 0x0100,
            FormatVersion::V0110 => 0x0110,
        }
    }
}

impl TryFrom<u16> for FormatVersion {
    type Error = NksError;

    fn try_from(v: u16) -> Result<Self> {
        match v {
            0x0100 => Ok(FormatVersion::V0100),
            0x0110 => Ok(FormatVersion::V0110),
            other  => Err(NksError::UnsupportedVersion(other)),
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.as_u16())
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// Whatever structure lives at an entry offset, selected by its magic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Directory(DirectoryHeader),
    File(FileHeader),
    EncryptedFile(EncryptedFileHeader),
}

impl Record {
    /// Read the magic and decode the matching header.  The reader is left
    /// positioned at the first byte after the header (the payload for files,
    /// the first entry header for directories).
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let magic = read_magic(&mut reader, "record magic")?;
        Self::read_body(magic, reader)
    }

    /// Decode the header selected by an already consumed `magic`.
    pub fn read_body<R: Read>(magic: u32, reader: R) -> Result<Self> {
        match magic {
            DIRECTORY_MAGIC      => Ok(Record::Directory(DirectoryHeader::read_body(reader)?)),
            FILE_MAGIC           => Ok(Record::File(FileHeader::read_body(reader)?)),
            ENCRYPTED_FILE_MAGIC => Ok(Record::EncryptedFile(EncryptedFileHeader::read_body(reader)?)),
            other                => Err(NksError::UnknownMagic(other)),
        }
    }

    pub fn magic(&self) -> u32 {
        match self {
            Record::Directory(_)     => DIRECTORY_MAGIC,
            Record::File(_)          => FILE_MAGIC,
            Record::EncryptedFile(_) => ENCRYPTED_FILE_MAGIC,
        }
    }

    /// Encoded header length, excluding directory entries and file payload.
    pub fn header_len(&self) -> u64 {
        match self {
            Record::Directory(_)     => DirectoryHeader::SIZE,
            Record::File(_)          => FileHeader::SIZE,
            Record::EncryptedFile(_) => EncryptedFileHeader::SIZE,
        }
    }

    /// Payload byte count for file records, `None` for directories.
    pub fn payload_size(&self) -> Option<u64> {
        match self {
            Record::Directory(_)     => None,
            Record::File(h)          => Some(h.size as u64),
            Record::EncryptedFile(h) => Some(h.size as u64),
        }
    }
}

// ── shared decode helpers ─────────────────────────────────────────────────────

pub fn read_magic<R: Read>(reader: &mut R, what: &'static str) -> Result<u32> {
    reader
        .read_u32::<LittleEndian>()
        .map_err(|e| NksError::from_decode(e, what))
}

pub(crate) fn expect_magic(found: u32, expected: u32) -> Result<()> {
    if found != expected {
        return Err(NksError::BadMagic { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn version_parsing() {
        assert_eq!(FormatVersion::try_from(0x0100).unwrap(), FormatVersion::V0100);
        assert_eq!(FormatVersion::try_from(0x0110).unwrap(), FormatVersion::V0110);
        assert!(matches!(
            FormatVersion::try_from(0x0120),
            Err(NksError::UnsupportedVersion(0x0120))
        ));
    }

    #[test]
    fn record_dispatches_on_magic() {
        let hdr = FileHeader {
            version:    FormatVersion::V0110,
            reserved_0: [7u8; 13],
            size:       1234,
            reserved_1: [9u8; 4],
        };
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        let rec = Record::read(Cursor::new(&buf)).unwrap();
        assert_eq!(rec.magic(), FILE_MAGIC);
        assert_eq!(rec.payload_size(), Some(1234));
        assert_eq!(rec, Record::File(hdr));
    }

    #[test]
    fn record_rejects_unknown_magic() {
        let buf = 0xDEAD_BEEFu32.to_le_bytes();
        assert!(matches!(
            Record::read(Cursor::new(&buf)),
            Err(NksError::UnknownMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn record_reports_truncated_magic() {
        let buf = [0x54u8, 0xAC];
        assert!(matches!(Record::read(Cursor::new(&buf)), Err(NksError::Truncated(_))));
    }
}
