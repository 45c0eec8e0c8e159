//! Process-wide lookup tables, generated once on first use.

use std::sync::OnceLock;

use crate::prbg::Prbg;

pub const INDEX_KEY_COUNT: u32   = 32;
pub const INDEX_KEY_LEN:   usize = 16;
pub const BASE_TABLE_LEN:  usize = 0x10000;

const INDEX_TABLE_SEED: u32 = 0x6EE3_8FE0;
const BASE_TABLE_SEED:  u32 = 0x608D_A0A2;

static INDEX_KEYS: OnceLock<[[u8; INDEX_KEY_LEN]; INDEX_KEY_COUNT as usize]> = OnceLock::new();
static BASE_TABLE: OnceLock<Box<[u8]>> = OnceLock::new();

/// Row `index` of the static key table, or `None` outside `0..32`.
pub fn index_key(index: u32) -> Option<&'static [u8; INDEX_KEY_LEN]> {
    let table = INDEX_KEYS.get_or_init(|| {
        let mut rng = Prbg::new(INDEX_TABLE_SEED);
        let mut rows = [[0u8; INDEX_KEY_LEN]; INDEX_KEY_COUNT as usize];
        for row in rows.iter_mut() {
            rng.fill(row);
        }
        rows
    });
    table.get(index as usize)
}

/// The 64 KiB mask XORed into every library-set keystream.
pub fn base_table() -> &'static [u8] {
    BASE_TABLE.get_or_init(|| Prbg::bytes(BASE_TABLE_SEED, BASE_TABLE_LEN).into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_rows_are_consecutive_prbg_output() {
        let stream = Prbg::bytes(INDEX_TABLE_SEED, INDEX_KEY_LEN * INDEX_KEY_COUNT as usize);
        assert_eq!(&index_key(0).unwrap()[..], &stream[..16]);
        assert_eq!(&index_key(31).unwrap()[..], &stream[31 * 16..]);
        assert!(index_key(32).is_none());
    }

    #[test]
    fn base_table_is_stable() {
        let a = base_table();
        let b = base_table();
        assert_eq!(a.len(), BASE_TABLE_LEN);
        assert!(std::ptr::eq(a, b));
        assert_eq!(&a[..32], &Prbg::bytes(BASE_TABLE_SEED, 32)[..]);
    }

    #[test]
    fn concurrent_first_use_agrees() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (base_table().as_ptr() as usize, index_key(7).copied())))
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}
