pub mod error;
pub mod prbg;
pub mod format;
pub mod tree;
pub mod crypto;
pub mod library;
pub mod io_stream;
pub mod archive;

pub use error::{NksError, Result};
pub use archive::{Archive, ArchiveOptions, ExtractReport};
pub use crypto::{GeneratingKey, KeyCache, Keystream};
pub use format::{FormatVersion, Record};
pub use io_stream::NksReader;
pub use library::{LibraryDescriptor, LibraryLookup, LibraryTable};
pub use tree::{Entry, EntryKind};
