//! Chunked payload copy with an optional repeating XOR keystream.

use std::io::{Read, Write};

use crate::error::Result;

/// Default copy chunk: 16 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// A keystream cursor: byte `i` of the payload is XORed with
/// `key[(phase + i) % key.len()]`.
#[derive(Debug, Clone)]
pub struct XorStream<'a> {
    key: &'a [u8],
    pos: usize,
}

impl<'a> XorStream<'a> {
    pub fn new(key: &'a [u8], phase: usize) -> Self {
        let pos = if key.is_empty() { 0 } else { phase % key.len() };
        Self { key, pos }
    }

    /// Current keystream position.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn apply(&mut self, buf: &mut [u8]) {
        if self.key.is_empty() {
            return;
        }
        for b in buf.iter_mut() {
            *b ^= self.key[self.pos];
            self.pos += 1;
            if self.pos == self.key.len() {
                self.pos = 0;
            }
        }
    }
}

/// Copy exactly `size` bytes from `src` to `dst` in chunks of at most
/// `chunk_size`, XORing through `key` when one is given.
///
/// A short read or short write aborts the copy with an I/O error; whatever
/// reached `dst` before that is left for the caller to discard.
pub fn copy_payload<R, W>(
    src:        &mut R,
    dst:        &mut W,
    size:       u64,
    mut key:    Option<XorStream<'_>>,
    chunk_size: usize,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let chunk_size = chunk_size.max(1);
    let mut buf = vec![0u8; chunk_size.min(size as usize)];
    let mut remaining = size;

    while remaining > 0 {
        let n = (remaining as usize).min(chunk_size);
        let chunk = &mut buf[..n];
        src.read_exact(chunk)?;
        if let Some(ref mut ks) = key {
            ks.apply(chunk);
        }
        dst.write_all(chunk)?;
        remaining -= n as u64;
    }

    Ok(size)
}
