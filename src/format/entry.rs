//! Entry headers: the per-child records following a directory header.
//!
//! Version 0x0100 layout (135 bytes):
//! `name[128] | opaque[1] | offset u32 | type u16`
//!
//! Version 0x0110 layout (8 bytes + name):
//! `opaque[2] | offset u32 | type u16 | name UTF-16LE, NUL-terminated`

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use super::{FormatVersion, OFFSET_KEY};
use crate::error::{NksError, Result};

/// Length of the fixed name buffer in 0x0100 entry headers.
pub const NAME_LEN_0100: usize = 128;

/// Raw type field of an entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeHint {
    Directory,
    EncryptedFile,
    File,
    Other(u16),
}

impl From<u16> for TypeHint {
    fn from(v: u16) -> Self {
        match v {
            1 => TypeHint::Directory,
            2 => TypeHint::EncryptedFile,
            3 => TypeHint::File,
            n => TypeHint::Other(n),
        }
    }
}

impl From<TypeHint> for u16 {
    fn from(t: TypeHint) -> u16 {
        match t {
            TypeHint::Directory     => 1,
            TypeHint::EncryptedFile => 2,
            TypeHint::File          => 3,
            TypeHint::Other(n)      => n,
        }
    }
}

/// The opaque bytes of an entry header.  The variant records which layout
/// the header was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryReserved {
    V0100([u8; 1]),
    V0110([u8; 2]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub name:      String,
    pub reserved:  EntryReserved,
    /// Real container offset, already de-obfuscated.
    pub offset:    u32,
    pub type_hint: TypeHint,
}

impl EntryHeader {
    pub fn read<R: Read>(reader: R, version: FormatVersion) -> Result<Self> {
        match version {
            FormatVersion::V0100 => Self::read_0100(reader),
            FormatVersion::V0110 => Self::read_0110(reader),
        }
    }

    fn read_0100<R: Read>(mut reader: R) -> Result<Self> {
        let decode = |e: io::Error| NksError::from_decode(e, "0x0100 entry header");

        let mut name_buf = [0u8; NAME_LEN_0100];
        reader.read_exact(&mut name_buf).map_err(decode)?;
        let mut reserved = [0u8; 1];
        reader.read_exact(&mut reserved).map_err(decode)?;
        let stored = reader.read_u32::<LittleEndian>().map_err(decode)?;
        let type_hint = TypeHint::from(reader.read_u16::<LittleEndian>().map_err(decode)?);

        // The buffer is NUL-terminated even when the name fills all 128 bytes.
        let end = name_buf.iter().position(|&b| b == 0).unwrap_or(NAME_LEN_0100);
        let name = decode_name_0100(&name_buf[..end]);

        Ok(Self {
            name,
            reserved: EntryReserved::V0100(reserved),
            offset: decode_offset(stored, type_hint),
            type_hint,
        })
    }

    fn read_0110<R: Read>(mut reader: R) -> Result<Self> {
        let decode = |e: io::Error| NksError::from_decode(e, "0x0110 entry header");

        let mut reserved = [0u8; 2];
        reader.read_exact(&mut reserved).map_err(decode)?;
        let stored = reader.read_u32::<LittleEndian>().map_err(decode)?;
        let type_hint = TypeHint::from(reader.read_u16::<LittleEndian>().map_err(decode)?);

        let mut units = Vec::new();
        loop {
            let unit = reader.read_u16::<LittleEndian>().map_err(decode)?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        let name = String::from_utf16(&units).map_err(|_| NksError::InvalidName)?;

        Ok(Self {
            name,
            reserved: EntryReserved::V0110(reserved),
            offset: decode_offset(stored, type_hint),
            type_hint,
        })
    }

    /// The offset as it appears on disk.
    pub fn stored_offset(&self) -> u32 {
        decode_offset(self.offset, self.type_hint)
    }

    pub fn version(&self) -> FormatVersion {
        match self.reserved {
            EntryReserved::V0100(_) => FormatVersion::V0100,
            EntryReserved::V0110(_) => FormatVersion::V0110,
        }
    }

    /// Encoded length of this header.
    pub fn encoded_len(&self) -> u64 {
        match self.reserved {
            EntryReserved::V0100(_) => NAME_LEN_0100 as u64 + 7,
            EntryReserved::V0110(_) => 8 + 2 * (self.name.encode_utf16().count() as u64 + 1),
        }
    }

    /// Encode in the layout named by `reserved`.  Names longer than the
    /// 0x0100 buffer are cut at 128 bytes.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        match self.reserved {
            EntryReserved::V0100(reserved) => {
                let mut name_buf = [0u8; NAME_LEN_0100];
                let bytes = self.name.as_bytes();
                let n = bytes.len().min(NAME_LEN_0100);
                name_buf[..n].copy_from_slice(&bytes[..n]);
                writer.write_all(&name_buf)?;
                writer.write_all(&reserved)?;
                writer.write_u32::<LittleEndian>(self.stored_offset())?;
                writer.write_u16::<LittleEndian>(self.type_hint.into())?;
            }
            EntryReserved::V0110(reserved) => {
                writer.write_all(&reserved)?;
                writer.write_u32::<LittleEndian>(self.stored_offset())?;
                writer.write_u16::<LittleEndian>(self.type_hint.into())?;
                for unit in self.name.encode_utf16() {
                    writer.write_u16::<LittleEndian>(unit)?;
                }
                writer.write_u16::<LittleEndian>(0)?;
            }
        }
        Ok(())
    }
}

/// Names in 0x0100 headers are UTF-8 when they validate and Latin-1
/// otherwise.  Both decodings are injective, so distinct names on disk never
/// collapse into the same `String`.
fn decode_name_0100(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s)  => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Encrypted-file offsets are XOR-masked; every other type is stored as is.
/// The mask is an involution, so this also re-encodes.
#[inline]
pub fn decode_offset(stored: u32, type_hint: TypeHint) -> u32 {
    match type_hint {
        TypeHint::EncryptedFile => stored ^ OFFSET_KEY,
        _                       => stored,
    }
}
