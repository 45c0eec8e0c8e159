use std::fmt;

use crate::error::{NksError, Result};
use crate::prbg::Prbg;

pub const MAX_KEY_LEN: usize = 32;
pub const IV_LEN:      usize = 16;
/// Length of the seed carried by short-form keys and IVs.
pub const SEED_LEN:    usize = 4;

/// Key and IV material for the library-set scheme.
///
/// A *short* form carries a 4-byte seed in either slot; [`expand`](Self::expand)
/// replaces it with PRBG output seeded from the big-endian value (32 key
/// bytes, 16 IV bytes).  A *full* form carries a 16, 24 or 32-byte AES key and
/// a 16-byte IV.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratingKey {
    key:     [u8; MAX_KEY_LEN],
    key_len: u8,
    iv:      [u8; IV_LEN],
    iv_len:  u8,
}

impl GeneratingKey {
    /// Short form: both slots hold 4-byte seeds.
    pub fn short(key_seed: [u8; SEED_LEN], iv_seed: [u8; SEED_LEN]) -> Self {
        let mut key = [0u8; MAX_KEY_LEN];
        key[..SEED_LEN].copy_from_slice(&key_seed);
        let mut iv = [0u8; IV_LEN];
        iv[..SEED_LEN].copy_from_slice(&iv_seed);
        Self { key, key_len: SEED_LEN as u8, iv, iv_len: SEED_LEN as u8 }
    }

    /// Accepts a key of 4 (seed), 16, 24 or 32 bytes and an IV of 4 (seed)
    /// or 16 bytes.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if !matches!(key.len(), SEED_LEN | 16 | 24 | 32) {
            return Err(NksError::InvalidKey(format!(
                "key must be 4, 16, 24 or 32 bytes, got {}",
                key.len()
            )));
        }
        if !matches!(iv.len(), SEED_LEN | IV_LEN) {
            return Err(NksError::InvalidKey(format!(
                "IV must be 4 or 16 bytes, got {}",
                iv.len()
            )));
        }
        let mut gk = Self {
            key:     [0u8; MAX_KEY_LEN],
            key_len: key.len() as u8,
            iv:      [0u8; IV_LEN],
            iv_len:  iv.len() as u8,
        };
        gk.key[..key.len()].copy_from_slice(key);
        gk.iv[..iv.len()].copy_from_slice(iv);
        Ok(gk)
    }

    /// Parse hex-encoded key and IV, e.g. as stored in a library key file.
    pub fn from_hex(key_hex: &str, iv_hex: &str) -> Result<Self> {
        let key = hex::decode(key_hex.trim())
            .map_err(|e| NksError::InvalidKey(format!("key hex: {e}")))?;
        let iv = hex::decode(iv_hex.trim())
            .map_err(|e| NksError::InvalidKey(format!("IV hex: {e}")))?;
        Self::new(&key, &iv)
    }

    pub fn key(&self) -> &[u8] {
        &self.key[..self.key_len as usize]
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv[..self.iv_len as usize]
    }

    pub fn is_short(&self) -> bool {
        self.key_len as usize == SEED_LEN || self.iv_len as usize == SEED_LEN
    }

    /// Replace seed-form slots with their PRBG expansion.  Full-form slots
    /// are left alone, so expanding twice is a no-op.
    pub fn expand(&mut self) {
        if self.key_len as usize == SEED_LEN {
            let seed = u32::from_be_bytes([self.key[0], self.key[1], self.key[2], self.key[3]]);
            Prbg::new(seed).fill(&mut self.key);
            self.key_len = MAX_KEY_LEN as u8;
        }
        if self.iv_len as usize == SEED_LEN {
            let seed = u32::from_be_bytes([self.iv[0], self.iv[1], self.iv[2], self.iv[3]]);
            Prbg::new(seed).fill(&mut self.iv);
            self.iv_len = IV_LEN as u8;
        }
    }

    pub fn expanded(&self) -> Self {
        let mut gk = self.clone();
        gk.expand();
        gk
    }
}

impl fmt::Debug for GeneratingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratingKey")
            .field("key", &hex::encode(self.key()))
            .field("iv", &hex::encode(self.iv()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_key_expands_from_big_endian_seed() {
        let gk = GeneratingKey::short([0x60, 0xA2, 0x19, 0x2B], [0x60, 0xDA, 0xB1, 0xCB]).expanded();
        assert_eq!(gk.key(), &Prbg::bytes(0x60A2_192B, 32)[..]);
        assert_eq!(gk.iv(), &Prbg::bytes(0x60DA_B1CB, 16)[..]);
        assert!(!gk.is_short());
    }

    #[test]
    fn expansion_is_reproducible() {
        let a = GeneratingKey::short([1, 2, 3, 4], [5, 6, 7, 8]).expanded();
        let b = GeneratingKey::short([1, 2, 3, 4], [5, 6, 7, 8]).expanded();
        assert_eq!(a, b);
        assert_eq!(a.expanded(), a);
    }

    #[test]
    fn full_keys_are_untouched() {
        let key = [0x11u8; 24];
        let iv = [0x22u8; 16];
        let gk = GeneratingKey::new(&key, &iv).unwrap();
        assert_eq!(gk.expanded().key(), &key[..]);
        assert_eq!(gk.expanded().iv(), &iv[..]);
    }

    #[test]
    fn mixed_forms_expand_only_the_seed() {
        let gk = GeneratingKey::new(&[0x33u8; 16], &[0, 0, 0, 1]).unwrap().expanded();
        assert_eq!(gk.key(), &[0x33u8; 16][..]);
        assert_eq!(gk.iv(), &Prbg::bytes(1, 16)[..]);
    }

    #[test]
    fn hex_lengths_are_validated() {
        assert!(GeneratingKey::from_hex("60a2192b", "60dab1cb").unwrap().is_short());
        assert!(GeneratingKey::from_hex(&"ab".repeat(32), &"cd".repeat(16)).is_ok());
        assert!(matches!(
            GeneratingKey::from_hex(&"ab".repeat(20), &"cd".repeat(16)),
            Err(NksError::InvalidKey(_))
        ));
        assert!(matches!(
            GeneratingKey::from_hex(&"ab".repeat(16), &"cd".repeat(8)),
            Err(NksError::InvalidKey(_))
        ));
        assert!(matches!(GeneratingKey::from_hex("xyz1", "00"), Err(NksError::InvalidKey(_))));
    }
}
