//! High-level [`Archive`] API over a container file on disk.
//!
//! ```no_run
//! use nks::archive::Archive;
//!
//! let mut ar = Archive::open("Samples.nkx")?;
//! let entry = ar.find("Samples/Kick 01.wav")?;
//! ar.extract_to_path(&entry, "Kick 01.wav")?;
//! ar.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::crypto::KeyCache;
use crate::error::{NksError, Result};
use crate::io_stream::{NksReader, DEFAULT_CHUNK_SIZE};
use crate::library::{LibraryLookup, LibraryTable};
use crate::tree::{is_safe_component, join_path, Entry, EntryKind};

/// The reader type behind an [`Archive`].  List visitors receive it so they
/// can descend into nested directories while a listing is in progress.
pub type ArchiveReader = NksReader<BufReader<File>>;

// ── ArchiveOptions ────────────────────────────────────────────────────────────

/// Configuration for [`Archive::open_with_options`].
#[derive(Clone)]
pub struct ArchiveOptions {
    pub chunk_size: usize,
    /// Source of library descriptors for library-set encrypted files.
    pub libraries:  Arc<dyn LibraryLookup + Send + Sync>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            libraries:  Arc::new(LibraryTable::new()),
        }
    }
}

impl ArchiveOptions {
    pub fn with_libraries<L>(libraries: L) -> Self
    where
        L: LibraryLookup + Send + Sync + 'static,
    {
        Self { libraries: Arc::new(libraries), ..Self::default() }
    }
}

impl fmt::Debug for ArchiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

// ── ExtractReport ─────────────────────────────────────────────────────────────

/// Outcome of [`Archive::extract_tree`].
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Files written successfully.
    pub extracted: usize,
    /// Archive-relative paths that failed, with the reason.
    pub failures:  Vec<(String, NksError)>,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Archive ───────────────────────────────────────────────────────────────────

pub struct Archive {
    path:   PathBuf,
    reader: ArchiveReader,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ArchiveOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, opts: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        let reader = NksReader::new(BufReader::new(file), opts.libraries)
            .with_chunk_size(opts.chunk_size);
        debug!(path = %path.display(), "opened container");
        Ok(Self { path, reader })
    }

    /// Release the container and every cached keystream.
    pub fn close(self) -> Result<()> {
        debug!(
            path = %self.path.display(),
            derivations = self.reader.keys().derivations(),
            "closing container"
        );
        drop(self.reader);
        Ok(())
    }

    // ── Navigation ───────────────────────────────────────────────────────────

    pub fn root(&self) -> Entry {
        self.reader.root()
    }

    /// Resolve an archive-relative path, case-insensitively.
    pub fn find(&mut self, path: &str) -> Result<Entry> {
        self.reader.find(path)
    }

    pub fn get(&mut self, dir: &Entry, name: &str) -> Result<Entry> {
        self.reader.get(dir, name)
    }

    /// Visit the entries of `dir` in on-disk order until `visit` returns
    /// `false`.
    pub fn list<F>(&mut self, dir: &Entry, visit: F) -> Result<()>
    where
        F: FnMut(&mut ArchiveReader, &Entry) -> bool,
    {
        self.reader.list_dir(dir, visit)
    }

    /// All entries of the directory at `path`.
    pub fn entries(&mut self, path: &str) -> Result<Vec<Entry>> {
        let dir = self.reader.find(path)?;
        self.reader.entries(&dir)
    }

    pub fn walk<F>(&mut self, dir: &Entry, visit: F) -> Result<()>
    where
        F: FnMut(&str, &Entry) -> bool,
    {
        self.reader.walk(dir, visit)
    }

    // ── Files ────────────────────────────────────────────────────────────────

    pub fn file_size(&mut self, entry: &Entry) -> Result<u64> {
        self.reader.file_size(entry)
    }

    /// Stream the decrypted payload of `entry` into `sink`.
    pub fn extract<W: Write + ?Sized>(&mut self, entry: &Entry, sink: &mut W) -> Result<u64> {
        self.reader.extract(entry, sink)
    }

    pub fn read_file(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        self.reader.read_file(entry)
    }

    /// Extract `entry` to a new file at `dest`.  On failure the partially
    /// written file is removed.
    pub fn extract_to_path<P: AsRef<Path>>(&mut self, entry: &Entry, dest: P) -> Result<u64> {
        let dest = dest.as_ref();
        if entry.is_dir() {
            return Err(NksError::IsADirectory(entry.name.clone()));
        }

        let result = File::create(dest).map_err(NksError::from).and_then(|file| {
            let mut out = BufWriter::new(file);
            let n = self.reader.extract(entry, &mut out)?;
            out.flush()?;
            Ok(n)
        });

        if let Err(ref e) = result {
            warn!(dest = %dest.display(), error = %e, "extraction failed; removing output");
            let _ = fs::remove_file(dest);
        }
        result
    }

    /// Extract everything below the directory at `path` into `dest`.
    ///
    /// Per-entry failures are recorded and skipped.  Names that are unsafe on
    /// the host file system are never written, and a directory offset is
    /// extracted at most once.
    pub fn extract_tree<P: AsRef<Path>>(&mut self, path: &str, dest: P) -> Result<ExtractReport> {
        let top = self.reader.find(path)?;
        if !top.is_dir() {
            return Err(NksError::NotADirectory(path.to_owned()));
        }
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;

        let mut report = ExtractReport::default();
        let mut queued = HashSet::from([top.offset]);
        let mut pending = VecDeque::from([(String::new(), top, dest.to_path_buf())]);

        while let Some((prefix, dir, out_dir)) = pending.pop_front() {
            let children = match self.reader.entries(&dir) {
                Ok(c) => c,
                Err(e) => {
                    warn!(dir = %prefix, error = %e, "cannot list directory");
                    report.failures.push((prefix, e));
                    continue;
                }
            };

            for child in children {
                let rel = join_path(&prefix, &child.name);
                if !is_safe_component(&child.name) {
                    warn!(path = %rel, "skipping unsafe name");
                    report.failures.push((rel, NksError::InvalidPath(child.name.clone())));
                    continue;
                }
                let target = out_dir.join(&child.name);

                match child.kind {
                    EntryKind::Directory if !queued.insert(child.offset) => {
                        warn!(path = %rel, offset = child.offset, "skipping directory cycle");
                        report.failures.push((rel.clone(), NksError::DirectoryCycle(rel)));
                    }
                    EntryKind::Directory => match fs::create_dir_all(&target) {
                        Ok(()) => pending.push_back((rel, child, target)),
                        Err(e) => report.failures.push((rel, e.into())),
                    },
                    EntryKind::File => match self.extract_to_path(&child, &target) {
                        Ok(_) => report.extracted += 1,
                        Err(e) => report.failures.push((rel, e)),
                    },
                    EntryKind::Unknown => debug!(path = %rel, "skipping entry of unknown type"),
                }
            }
        }

        info!(
            extracted = report.extracted,
            failed = report.failures.len(),
            "tree extraction finished"
        );
        Ok(report)
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path { &self.path }

    /// Keystream cache of this handle, for inspecting derivation counts.
    pub fn key_cache(&self) -> &KeyCache { self.reader.keys() }

    pub fn derivations(&self) -> usize { self.reader.keys().derivations() }
}
