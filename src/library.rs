//! Library descriptors and the key lookup seam.
//!
//! Encrypted files using the library-set scheme name a `set_id`; the reader
//! asks a [`LibraryLookup`] for the matching [`LibraryDescriptor`].  Where the
//! descriptors come from (a system preference store, a registry, a file) is
//! up to the caller.  [`LibraryTable`] is an in-memory implementation that can
//! also be loaded from a JSON key file:
//!
//! ```json
//! { "libraries": [
//!     { "id": 13, "name": "Keyboard Collection", "key": "60a2192b", "iv": "60dab1cb" }
//! ] }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::GeneratingKey;
use crate::error::{NksError, Result};

/// One library's identity and key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDescriptor {
    pub id:   u32,
    pub name: String,
    pub key:  GeneratingKey,
}

impl LibraryDescriptor {
    pub fn new(id: u32, name: impl Into<String>, key: GeneratingKey) -> Self {
        Self { id, name: name.into(), key }
    }
}

/// `0000000d <key hex> <iv hex> Keyboard Collection`
impl fmt::Display for LibraryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x} {} {} {}",
            self.id,
            hex::encode(self.key.key()),
            hex::encode(self.key.iv()),
            self.name
        )
    }
}

// ── LibraryLookup ─────────────────────────────────────────────────────────────

/// Synchronous `set_id → descriptor` resolution.
pub trait LibraryLookup {
    fn lookup(&self, id: u32) -> Option<LibraryDescriptor>;
}

impl<F> LibraryLookup for F
where
    F: Fn(u32) -> Option<LibraryDescriptor>,
{
    fn lookup(&self, id: u32) -> Option<LibraryDescriptor> {
        self(id)
    }
}

// ── LibraryTable ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LibraryTable {
    libraries: BTreeMap<u32, LibraryDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    libraries: Vec<KeyFileRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFileRecord {
    id:   u32,
    name: String,
    key:  String,
    iv:   String,
}

impl LibraryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the descriptor for `desc.id`.
    pub fn insert(&mut self, desc: LibraryDescriptor) -> Option<LibraryDescriptor> {
        self.libraries.insert(desc.id, desc)
    }

    pub fn get(&self, id: u32) -> Option<&LibraryDescriptor> {
        self.libraries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Descriptors in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &LibraryDescriptor> {
        self.libraries.values()
    }

    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let file: KeyFile = serde_json::from_reader(reader)
            .map_err(|e| NksError::Config(e.to_string()))?;
        let mut table = Self::new();
        for rec in file.libraries {
            let key = GeneratingKey::from_hex(&rec.key, &rec.iv).map_err(|e| {
                NksError::Config(format!("library {:#010x} ({}): {e}", rec.id, rec.name))
            })?;
            table.insert(LibraryDescriptor::new(rec.id, rec.name, key));
        }
        Ok(table)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(BufReader::new(File::open(path)?))
    }

    pub fn to_json(&self) -> Result<String> {
        let file = KeyFile {
            libraries: self
                .iter()
                .map(|d| KeyFileRecord {
                    id:   d.id,
                    name: d.name.clone(),
                    key:  hex::encode(d.key.key()),
                    iv:   hex::encode(d.key.iv()),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file).map_err(|e| NksError::Config(e.to_string()))
    }
}

impl LibraryLookup for LibraryTable {
    fn lookup(&self, id: u32) -> Option<LibraryDescriptor> {
        self.libraries.get(&id).cloned()
    }
}

impl FromIterator<LibraryDescriptor> for LibraryTable {
    fn from_iter<I: IntoIterator<Item = LibraryDescriptor>>(iter: I) -> Self {
        let mut table = Self::new();
        for desc in iter {
            table.insert(desc);
        }
        table
    }
}
