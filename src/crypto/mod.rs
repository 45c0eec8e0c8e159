//! Keystream derivation for encrypted file payloads.
//!
//! Two schemes, selected by an encrypted file's `key_index`:
//!
//! * **Index table** (`key_index < 32`): a row of a static 32 × 16-byte table
//!   generated from a fixed PRBG seed.  The row is the keystream.
//! * **Library set** (`key_index == 0x100`): the library registered for the
//!   file's `set_id` supplies a [`GeneratingKey`].  AES in raw-block mode
//!   encrypts a 16-byte counter starting at the key's IV; each output block is
//!   XORed with the matching slice of a 64 KiB base table.  4096 blocks give a
//!   65 536-byte keystream, cached per set for the lifetime of the handle.
//!
//! Payload bytes are XORed with `keystream[(phase + i) % len]`; see
//! [`Keystream::starting_phase`].

pub mod key;
pub mod keystream;
pub mod tables;

pub use key::GeneratingKey;
pub use keystream::{derive_set_keystream, KeyCache, Keystream, SET_KEYSTREAM_LEN};
pub use tables::{base_table, index_key, INDEX_KEY_COUNT, INDEX_KEY_LEN};
