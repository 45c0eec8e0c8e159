use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use tracing::debug;

use super::key::GeneratingKey;
use super::tables::{base_table, index_key, INDEX_KEY_COUNT, INDEX_KEY_LEN};
use crate::error::{NksError, Result};
use crate::format::file::KEY_INDEX_LIBRARY;
use crate::library::LibraryLookup;

/// Length of a derived library-set keystream (4096 AES blocks).
pub const SET_KEYSTREAM_LEN: usize = 0x10000;

const BLOCK_LEN: usize = 16;

// ── Keystream ─────────────────────────────────────────────────────────────────

/// A resolved keystream for one encrypted file.
#[derive(Clone)]
pub enum Keystream {
    /// Row of the static index table.
    Table(&'static [u8; INDEX_KEY_LEN]),
    /// Derived library-set keystream, shared with the handle's cache.
    Set(Arc<[u8]>),
}

impl Keystream {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Keystream::Table(row) => &row[..],
            Keystream::Set(bytes) => bytes,
        }
    }

    /// Keystream position for the first payload byte.  Index-table streams
    /// are aligned to the absolute container offset of the payload; library-set
    /// streams always start at zero.
    pub fn starting_phase(&self, payload_offset: u64) -> usize {
        match self {
            Keystream::Table(_) => (payload_offset % INDEX_KEY_LEN as u64) as usize,
            Keystream::Set(_)   => 0,
        }
    }
}

impl fmt::Debug for Keystream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keystream::Table(row) => write!(f, "Keystream::Table({})", hex::encode(row)),
            Keystream::Set(bytes) => write!(f, "Keystream::Set({} bytes)", bytes.len()),
        }
    }
}

// ── library-set derivation ────────────────────────────────────────────────────

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(key: &[u8]) -> Result<Self> {
        let unsupported = |_| NksError::Unsupported(format!("AES key of {} bytes", key.len()));
        match key.len() {
            16 => Aes128::new_from_slice(key).map(BlockCipher::Aes128).map_err(unsupported),
            24 => Aes192::new_from_slice(key).map(BlockCipher::Aes192).map_err(unsupported),
            32 => Aes256::new_from_slice(key).map(BlockCipher::Aes256).map_err(unsupported),
            n  => Err(NksError::Unsupported(format!("AES key of {n} bytes"))),
        }
    }

    fn encrypt(&self, block: &mut Block) {
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(block),
            BlockCipher::Aes192(c) => c.encrypt_block(block),
            BlockCipher::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// Big-endian increment that carries from byte 15 upward but never touches
/// byte 0.  Legacy keystreams depend on this exact behaviour.
pub(crate) fn increment_counter(ctr: &mut [u8; BLOCK_LEN]) {
    for n in (1..BLOCK_LEN).rev() {
        ctr[n] = ctr[n].wrapping_add(1);
        if ctr[n] != 0 {
            break;
        }
    }
}

/// Derive the 65 536-byte keystream for a library's generating key.
/// Short-form keys are expanded first.
pub fn derive_set_keystream(gen_key: &GeneratingKey) -> Result<Vec<u8>> {
    let gk = gen_key.expanded();
    let iv: [u8; BLOCK_LEN] = gk
        .iv()
        .try_into()
        .map_err(|_| NksError::InvalidKey(format!("IV of {} bytes", gk.iv().len())))?;
    let cipher = BlockCipher::new(gk.key())?;

    let mut out = vec![0u8; SET_KEYSTREAM_LEN];
    let mut ctr = iv;
    for (chunk, mask) in out.chunks_exact_mut(BLOCK_LEN).zip(base_table().chunks_exact(BLOCK_LEN)) {
        let mut block = Block::clone_from_slice(&ctr);
        cipher.encrypt(&mut block);
        for ((o, b), m) in chunk.iter_mut().zip(block.iter()).zip(mask) {
            *o = b ^ m;
        }
        increment_counter(&mut ctr);
    }
    Ok(out)
}

// ── KeyCache ──────────────────────────────────────────────────────────────────

/// Per-handle keystream resolver.  Library-set keystreams are derived at most
/// once per `set_id` and shared until the cache is dropped.
pub struct KeyCache {
    libraries:   Arc<dyn LibraryLookup + Send + Sync>,
    sets:        HashMap<u32, Arc<[u8]>>,
    derivations: usize,
}

impl KeyCache {
    pub fn new(libraries: Arc<dyn LibraryLookup + Send + Sync>) -> Self {
        Self { libraries, sets: HashMap::new(), derivations: 0 }
    }

    /// Resolve the keystream for an encrypted file's `(set_id, key_index)`.
    pub fn resolve(&mut self, set_id: u32, key_index: u32) -> Result<Keystream> {
        if key_index < INDEX_KEY_COUNT {
            return index_key(key_index)
                .map(Keystream::Table)
                .ok_or(NksError::UnknownKey { set_id, key_index });
        }
        if key_index != KEY_INDEX_LIBRARY {
            return Err(NksError::UnknownKey { set_id, key_index });
        }

        if let Some(cached) = self.sets.get(&set_id) {
            return Ok(Keystream::Set(Arc::clone(cached)));
        }

        let library = self
            .libraries
            .lookup(set_id)
            .ok_or(NksError::UnknownKey { set_id, key_index })?;
        debug!(set_id, library = %library.name, "deriving library-set keystream");

        let stream: Arc<[u8]> = derive_set_keystream(&library.key)?.into();
        self.derivations += 1;
        self.sets.insert(set_id, Arc::clone(&stream));
        Ok(Keystream::Set(stream))
    }

    /// Number of library-set derivations performed so far.
    pub fn derivations(&self) -> usize {
        self.derivations
    }

    /// Number of cached set keystreams.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }
}

impl fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCache")
            .field("sets", &self.sets.keys().collect::<Vec<_>>())
            .field("derivations", &self.derivations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{LibraryDescriptor, LibraryTable};

    fn table_with(id: u32, key: GeneratingKey) -> Arc<LibraryTable> {
        Arc::new([LibraryDescriptor::new(id, "test", key)].into_iter().collect())
    }

    #[test]
    fn counter_never_touches_the_top_byte() {
        let mut ctr = [0xFFu8; 16];
        increment_counter(&mut ctr);
        let mut expected = [0u8; 16];
        expected[0] = 0xFF;
        assert_eq!(ctr, expected);
    }

    #[test]
    fn counter_carries_upward() {
        let mut ctr = [0u8; 16];
        ctr[15] = 0xFF;
        ctr[14] = 0x01;
        increment_counter(&mut ctr);
        assert_eq!(ctr[15], 0x00);
        assert_eq!(ctr[14], 0x02);
    }

    #[test]
    fn first_block_is_aes_of_iv_masked_by_base_table() {
        let key = [0x42u8; 16];
        let iv = [0x07u8; 16];
        let stream = derive_set_keystream(&GeneratingKey::new(&key, &iv).unwrap()).unwrap();
        assert_eq!(stream.len(), SET_KEYSTREAM_LEN);

        let aes = Aes128::new_from_slice(&key).unwrap();
        let mut block = Block::clone_from_slice(&iv);
        aes.encrypt_block(&mut block);
        let expected: Vec<u8> = block.iter().zip(&base_table()[..16]).map(|(a, b)| a ^ b).collect();
        assert_eq!(&stream[..16], &expected[..]);

        let mut ctr = iv;
        increment_counter(&mut ctr);
        let mut block = Block::clone_from_slice(&ctr);
        aes.encrypt_block(&mut block);
        let expected: Vec<u8> = block.iter().zip(&base_table()[16..32]).map(|(a, b)| a ^ b).collect();
        assert_eq!(&stream[16..32], &expected[..]);
    }

    #[test]
    fn every_aes_variant_derives() {
        for len in [16usize, 24, 32] {
            let gk = GeneratingKey::new(&vec![0x5Au8; len], &[0u8; 16]).unwrap();
            assert_eq!(derive_set_keystream(&gk).unwrap().len(), SET_KEYSTREAM_LEN);
        }
    }

    #[test]
    fn index_scheme_bounds() {
        let mut cache = KeyCache::new(Arc::new(LibraryTable::new()));
        assert!(matches!(cache.resolve(0, 0), Ok(Keystream::Table(_))));
        assert!(matches!(cache.resolve(0, 31), Ok(Keystream::Table(_))));
        for bad in [32u32, 255, 257, u32::MAX] {
            assert!(matches!(
                cache.resolve(9, bad),
                Err(NksError::UnknownKey { set_id: 9, key_index }) if key_index == bad
            ));
        }
        assert!(matches!(cache.resolve(9, 256), Err(NksError::UnknownKey { .. })));
        assert_eq!(cache.derivations(), 0);
    }

    #[test]
    fn set_keystreams_are_derived_once() {
        let mut cache = KeyCache::new(table_with(0x65, GeneratingKey::short([1, 2, 3, 4], [5, 6, 7, 8])));
        let a = cache.resolve(0x65, KEY_INDEX_LIBRARY).unwrap();
        let b = cache.resolve(0x65, KEY_INDEX_LIBRARY).unwrap();
        match (&a, &b) {
            (Keystream::Set(x), Keystream::Set(y)) => assert!(Arc::ptr_eq(x, y)),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(cache.derivations(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(a.starting_phase(12345), 0);
    }

    #[test]
    fn table_phase_follows_file_position() {
        let ks = Keystream::Table(index_key(3).unwrap());
        assert_eq!(ks.starting_phase(31), 15);
        assert_eq!(ks.starting_phase(32), 0);
    }
}
