//! Container engine: directory enumeration, path resolution and payload
//! extraction over any seekable byte source.
//!
//! # Positioning
//! Every decode starts with an explicit seek to an absolute offset.  Directory
//! enumeration remembers where the next entry header begins and seeks back
//! there before decoding it, so a visitor may read anywhere else in the
//! container (for example, list a nested directory) without disturbing the
//! outer enumeration.
//!
//! # Threading
//! A reader owns one cursor and is not meant to be shared.  Use one reader per
//! worker; the process-wide key tables are safe to share.

pub mod xor;

use std::collections::{HashSet, VecDeque};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::crypto::KeyCache;
use crate::error::{NksError, Result};
use crate::format::{
    read_magic, DirectoryHeader, EncryptedFileHeader, EntryHeader, Record, DIRECTORY_MAGIC,
};
use crate::library::LibraryLookup;
use crate::tree::{join_path, split_path, Entry, EntryKind};

pub use xor::{copy_payload, XorStream, DEFAULT_CHUNK_SIZE};

pub struct NksReader<R: Read + Seek> {
    reader:     R,
    keys:       KeyCache,
    chunk_size: usize,
}

impl<R: Read + Seek> NksReader<R> {
    pub fn new(reader: R, libraries: Arc<dyn LibraryLookup + Send + Sync>) -> Self {
        Self {
            reader,
            keys:       KeyCache::new(libraries),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> Entry {
        Entry::root()
    }

    /// The per-reader keystream cache.
    pub fn keys(&self) -> &KeyCache {
        &self.keys
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Decode the file header of `entry`.  A directory is refused on its
    /// magic alone, before any of its fields are checked.
    fn file_record(&mut self, entry: &Entry) -> Result<Record> {
        self.seek_to(entry.offset)?;
        let magic = read_magic(&mut self.reader, "record magic")?;
        if magic == DIRECTORY_MAGIC {
            return Err(NksError::IsADirectory(entry.name.clone()));
        }
        Record::read_body(magic, &mut self.reader)
    }

    /// Decode whatever structure starts at `offset`.  The cursor is left just
    /// past its header.
    pub fn read_record(&mut self, offset: u64) -> Result<Record> {
        self.seek_to(offset)?;
        Record::read(&mut self.reader)
    }

    // ── Directory enumeration ────────────────────────────────────────────────

    /// Call `visit` for each entry of `dir`, in on-disk order, until it
    /// returns `false`.  The visitor receives the reader and may use it freely.
    pub fn list_dir<F>(&mut self, dir: &Entry, mut visit: F) -> Result<()>
    where
        F: FnMut(&mut Self, &Entry) -> bool,
    {
        if !dir.is_dir() {
            return Err(NksError::NotADirectory(dir.name.clone()));
        }

        self.seek_to(dir.offset)?;
        let header = DirectoryHeader::read(&mut self.reader)?;
        let mut next = dir.offset + DirectoryHeader::SIZE;

        for _ in 0..header.entry_count {
            self.seek_to(next)?;
            let raw = EntryHeader::read(&mut self.reader, header.version)?;
            next = self.reader.stream_position()?;

            trace!(name = %raw.name, offset = raw.offset, hint = ?raw.type_hint, "entry");
            let entry = Entry {
                kind:   EntryKind::from(raw.type_hint),
                offset: raw.offset as u64,
                name:   raw.name,
            };
            if !visit(self, &entry) {
                break;
            }
        }
        Ok(())
    }

    /// All entries of `dir`.
    pub fn entries(&mut self, dir: &Entry) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        self.list_dir(dir, |_, e| {
            out.push(e.clone());
            true
        })?;
        Ok(out)
    }

    /// Immediate child of `dir` whose name matches case-insensitively.
    pub fn get(&mut self, dir: &Entry, name: &str) -> Result<Entry> {
        let mut found = None;
        self.list_dir(dir, |_, e| {
            if e.name_matches(name) {
                found = Some(e.clone());
                false
            } else {
                true
            }
        })?;
        found.ok_or_else(|| NksError::NotFound(name.to_owned()))
    }

    /// Resolve a `/`-separated, archive-relative path.  An empty path names
    /// the root; a trailing separator demands a directory.
    pub fn find(&mut self, path: &str) -> Result<Entry> {
        let mut entry = Entry::root();
        let mut walked = String::new();

        for seg in split_path(path)? {
            if !entry.is_dir() {
                return Err(NksError::NotADirectory(walked));
            }
            entry = self.get(&entry, seg).map_err(|e| match e {
                NksError::NotFound(_) => NksError::NotFound(join_path(&walked, seg)),
                other => other,
            })?;
            walked = join_path(&walked, &entry.name);
        }

        if path.ends_with('/') && !entry.is_dir() {
            return Err(NksError::NotADirectory(walked));
        }
        Ok(entry)
    }

    /// Breadth-first traversal below `dir`.  `visit` receives each entry with
    /// its path relative to `dir` and stops the walk by returning `false`.
    ///
    /// A directory is descended into once per offset; entries pointing back at
    /// a directory already queued are visited but not expanded again.
    pub fn walk<F>(&mut self, dir: &Entry, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &Entry) -> bool,
    {
        let mut queued = HashSet::from([dir.offset]);
        let mut pending = VecDeque::from([(String::new(), dir.clone())]);
        while let Some((prefix, current)) = pending.pop_front() {
            for child in self.entries(&current)? {
                let path = join_path(&prefix, &child.name);
                if !visit(&path, &child) {
                    return Ok(());
                }
                if child.is_dir() {
                    if queued.insert(child.offset) {
                        pending.push_back((path, child));
                    } else {
                        debug!(path = %path, offset = child.offset, "directory already visited");
                    }
                }
            }
        }
        Ok(())
    }

    // ── Files ────────────────────────────────────────────────────────────────

    /// Payload size of a file entry.
    pub fn file_size(&mut self, entry: &Entry) -> Result<u64> {
        let rec = self.file_record(entry)?;
        Ok(rec.payload_size().unwrap_or(0))
    }

    /// Write the decrypted payload of `entry` to `sink`.  Returns the number
    /// of bytes written.
    pub fn extract<W: Write + ?Sized>(&mut self, entry: &Entry, sink: &mut W) -> Result<u64> {
        match self.file_record(entry)? {
            Record::Directory(_) => Err(NksError::IsADirectory(entry.name.clone())),
            Record::File(h) => {
                copy_payload(&mut self.reader, sink, h.size as u64, None, self.chunk_size)
            }
            Record::EncryptedFile(h) => {
                let keystream = self.keys.resolve(h.set_id, h.key_index)?;
                let payload_offset = entry.offset + EncryptedFileHeader::SIZE;
                self.seek_to(payload_offset)?;
                let phase = keystream.starting_phase(payload_offset);
                let xor = XorStream::new(keystream.as_bytes(), phase);
                copy_payload(&mut self.reader, sink, h.size as u64, Some(xor), self.chunk_size)
            }
        }
    }

    /// Decrypted payload of `entry` as a byte vector.
    pub fn read_file(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.extract(entry, &mut out)?;
        Ok(out)
    }

    /// Payload offset of a file entry, for callers that want raw access.
    pub fn payload_offset(&mut self, entry: &Entry) -> Result<u64> {
        let rec = self.file_record(entry)?;
        Ok(entry.offset + rec.header_len())
    }
}
