use std::io;
use thiserror::Error;

/// Every failure the container reader can report.
///
/// Structural errors (`BadMagic`, `UnsupportedVersion`, `Truncated`) are
/// fatal to the structure being decoded only; the handle stays usable and
/// sibling entries can still be read.
#[derive(Error, Debug)]
pub enum NksError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Truncated {0}")]
    Truncated(&'static str),
    #[error("Bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },
    #[error("Unrecognised magic {0:#010x}")]
    UnknownMagic(u32),
    #[error("Unsupported version: {0:#06x}")]
    UnsupportedVersion(u16),
    #[error("Entry name is not valid UTF-16")]
    InvalidName,
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),
    #[error("No such entry: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Is a directory: {0}")]
    IsADirectory(String),
    #[error("Directory already visited: {0}")]
    DirectoryCycle(String),
    #[error("No key material for set {set_id:#010x}, key index {key_index}")]
    UnknownKey { set_id: u32, key_index: u32 },
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
    #[error("Library key file: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NksError>;

impl NksError {
    /// Converts an I/O error raised while decoding a header. Running out of
    /// bytes mid-structure is reported as truncation, anything else as I/O.
    pub(crate) fn from_decode(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            NksError::Truncated(what)
        } else {
            NksError::Io(err)
        }
    }
}
