use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use super::{expect_magic, read_magic, FormatVersion, DIRECTORY_MAGIC};
use crate::error::{NksError, Result};

/// Header that precedes a directory's `entry_count` entry headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHeader {
    pub version:     FormatVersion,
    pub set_id:      u32,
    pub reserved_0:  [u8; 4],
    pub entry_count: u32,
    pub reserved_1:  [u8; 4],
}

impl DirectoryHeader {
    /// Encoded size including the magic.
    pub const SIZE: u64 = 22;

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let magic = read_magic(&mut reader, "directory header")?;
        expect_magic(magic, DIRECTORY_MAGIC)?;
        Self::read_body(reader)
    }

    /// Decode the fields following an already consumed magic.
    pub(crate) fn read_body<R: Read>(mut reader: R) -> Result<Self> {
        let (version, set_id, reserved_0, entry_count, reserved_1) = read_fields(&mut reader)
            .map_err(|e| NksError::from_decode(e, "directory header"))?;
        Ok(Self {
            version: FormatVersion::try_from(version)?,
            set_id,
            reserved_0,
            entry_count,
            reserved_1,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(DIRECTORY_MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version.as_u16())?;
        writer.write_u32::<LittleEndian>(self.set_id)?;
        writer.write_all(&self.reserved_0)?;
        writer.write_u32::<LittleEndian>(self.entry_count)?;
        writer.write_all(&self.reserved_1)?;
        Ok(())
    }
}

fn read_fields<R: Read>(reader: &mut R) -> io::Result<(u16, u32, [u8; 4], u32, [u8; 4])> {
    let version = reader.read_u16::<LittleEndian>()?;
    let set_id = reader.read_u32::<LittleEndian>()?;
    let mut reserved_0 = [0u8; 4];
    reader.read_exact(&mut reserved_0)?;
    let entry_count = reader.read_u32::<LittleEndian>()?;
    let mut reserved_1 = [0u8; 4];
    reader.read_exact(&mut reserved_1)?;
    Ok((version, set_id, reserved_0, entry_count, reserved_1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> DirectoryHeader {
        DirectoryHeader {
            version:     FormatVersion::V0110,
            set_id:      0x6A,
            reserved_0:  [1, 2, 3, 4],
            entry_count: 3,
            reserved_1:  [5, 6, 7, 8],
        }
    }

    #[test]
    fn opaque_fields_survive_decoding() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, DirectoryHeader::SIZE);
        assert_eq!(DirectoryHeader::read(Cursor::new(&buf)).unwrap(), sample());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        assert!(matches!(
            DirectoryHeader::read(Cursor::new(&buf)),
            Err(NksError::BadMagic { expected: DIRECTORY_MAGIC, .. })
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf[4..6].copy_from_slice(&0x0200u16.to_le_bytes());
        assert!(matches!(
            DirectoryHeader::read(Cursor::new(&buf)),
            Err(NksError::UnsupportedVersion(0x0200))
        ));
    }

    #[test]
    fn short_header_is_truncated() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf.truncate(15);
        assert!(matches!(
            DirectoryHeader::read(Cursor::new(&buf)),
            Err(NksError::Truncated(_))
        ));
    }
}
