//! Chunk-encrypted bundle streams.
//!
//! Encrypted bundles are split into fixed-size chunks (a multiple of 512
//! bytes), each AES-128-CBC encrypted on its own with a key derived from a
//! password and the bundle name. [`EncryptedChunkReader`] exposes the
//! plaintext as a seekable `Read`, decrypting one chunk at a time.

#![forbid(unsafe_code)]

mod error;
mod key;
mod reader;

pub use error::{CryptError, Result};
pub use key::{
    BLOCK_SIZE, ChunkKey, MIN_CHUNK_SIZE, encrypt_chunks, encrypted_len, normalize_chunk_size,
};
pub use reader::{EncryptedChunkReader, decrypt_all};
