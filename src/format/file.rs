use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use super::{expect_magic, read_magic, FormatVersion, ENCRYPTED_FILE_MAGIC, FILE_MAGIC};
use crate::error::{NksError, Result};

/// Key index selecting the library-set derivation scheme.
pub const KEY_INDEX_LIBRARY: u32 = 0x100;

// ── FileHeader ────────────────────────────────────────────────────────────────

/// Header of a plain (unencrypted) file.  Payload bytes follow directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version:    FormatVersion,
    pub reserved_0: [u8; 13],
    pub size:       u32,
    pub reserved_1: [u8; 4],
}

impl FileHeader {
    pub const SIZE: u64 = 27;

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let magic = read_magic(&mut reader, "file header")?;
        expect_magic(magic, FILE_MAGIC)?;
        Self::read_body(reader)
    }

    pub(crate) fn read_body<R: Read>(mut reader: R) -> Result<Self> {
        let decode = |e: io::Error| NksError::from_decode(e, "file header");

        let version = reader.read_u16::<LittleEndian>().map_err(decode)?;
        let mut reserved_0 = [0u8; 13];
        reader.read_exact(&mut reserved_0).map_err(decode)?;
        let size = reader.read_u32::<LittleEndian>().map_err(decode)?;
        let mut reserved_1 = [0u8; 4];
        reader.read_exact(&mut reserved_1).map_err(decode)?;

        Ok(Self {
            version: FormatVersion::try_from(version)?,
            reserved_0,
            size,
            reserved_1,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(FILE_MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version.as_u16())?;
        writer.write_all(&self.reserved_0)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_all(&self.reserved_1)?;
        Ok(())
    }
}

// ── EncryptedFileHeader ───────────────────────────────────────────────────────

/// Header of an encrypted file.  `key_index` selects the keystream:
/// `0..32` picks a row of the static index table, [`KEY_INDEX_LIBRARY`]
/// derives one from the library registered for `set_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFileHeader {
    pub version:    FormatVersion,
    pub set_id:     u32,
    pub key_index:  u32,
    pub reserved_0: [u8; 5],
    pub size:       u32,
    pub reserved_1: [u8; 8],
}

impl EncryptedFileHeader {
    pub const SIZE: u64 = 31;

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let magic = read_magic(&mut reader, "encrypted file header")?;
        expect_magic(magic, ENCRYPTED_FILE_MAGIC)?;
        Self::read_body(reader)
    }

    pub(crate) fn read_body<R: Read>(mut reader: R) -> Result<Self> {
        let decode = |e: io::Error| NksError::from_decode(e, "encrypted file header");

        let version = reader.read_u16::<LittleEndian>().map_err(decode)?;
        let set_id = reader.read_u32::<LittleEndian>().map_err(decode)?;
        let key_index = reader.read_u32::<LittleEndian>().map_err(decode)?;
        let mut reserved_0 = [0u8; 5];
        reader.read_exact(&mut reserved_0).map_err(decode)?;
        let size = reader.read_u32::<LittleEndian>().map_err(decode)?;
        let mut reserved_1 = [0u8; 8];
        reader.read_exact(&mut reserved_1).map_err(decode)?;

        Ok(Self {
            version: FormatVersion::try_from(version)?,
            set_id,
            key_index,
            reserved_0,
            size,
            reserved_1,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(ENCRYPTED_FILE_MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version.as_u16())?;
        writer.write_u32::<LittleEndian>(self.set_id)?;
        writer.write_u32::<LittleEndian>(self.key_index)?;
        writer.write_all(&self.reserved_0)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_all(&self.reserved_1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encrypted_header_layout() {
        let hdr = EncryptedFileHeader {
            version:    FormatVersion::V0100,
            set_id:     0x65,
            key_index:  KEY_INDEX_LIBRARY,
            reserved_0: [1, 2, 3, 4, 5],
            size:       0x0102_0304,
            reserved_1: [0xEE; 8],
        };
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, EncryptedFileHeader::SIZE);
        assert_eq!(&buf[10..14], &0x100u32.to_le_bytes());
        assert_eq!(&buf[19..23], &0x0102_0304u32.to_le_bytes());
        assert_eq!(EncryptedFileHeader::read(Cursor::new(&buf)).unwrap(), hdr);
    }

    #[test]
    fn plain_header_rejects_encrypted_magic() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ENCRYPTED_FILE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&[0u8; 23]);
        assert!(matches!(
            FileHeader::read(Cursor::new(&buf)),
            Err(NksError::BadMagic { expected: FILE_MAGIC, found: ENCRYPTED_FILE_MAGIC })
        ));
    }

    #[test]
    fn plain_header_version_is_checked() {
        let hdr = FileHeader {
            version:    FormatVersion::V0110,
            reserved_0: [0; 13],
            size:       10,
            reserved_1: [0; 4],
        };
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, FileHeader::SIZE);
        buf[4..6].copy_from_slice(&0x0111u16.to_le_bytes());
        assert!(matches!(
            FileHeader::read(Cursor::new(&buf)),
            Err(NksError::UnsupportedVersion(0x0111))
        ));
    }
}
