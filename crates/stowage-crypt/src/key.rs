use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};
use sha2::{Digest, Sha256};

use crate::{CryptError, Result};

pub const BLOCK_SIZE: usize = 16;
pub const MIN_CHUNK_SIZE: usize = 512;

/// AES-128 key and IV for one bundle.
#[derive(Clone, PartialEq, Eq)]
pub struct ChunkKey {
    key: [u8; 16],
    iv:  [u8; 16],
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkKey").finish_non_exhaustive()
    }
}

impl ChunkKey {
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> Self { Self { key, iv } }

    /// Derive the key for `name` from a shared password.
    ///
    /// `SHA-256(password || 0x00 || name)`: the first half is the key, the
    /// second half the IV.
    pub fn derive(password: &[u8], name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();

        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        iv.copy_from_slice(&digest[16..]);
        Self { key, iv }
    }

    /// Decrypt one chunk in place.
    pub(crate) fn decrypt_chunk(&self, index: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() % BLOCK_SIZE != 0 {
            return Err(CryptError::Misaligned {
                index,
                len: buf.len(),
            });
        }
        Decryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| CryptError::Decrypt { index })?;
        Ok(())
    }

    fn encrypt_chunk(&self, index: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        if len % BLOCK_SIZE != 0 {
            return Err(CryptError::Misaligned { index, len });
        }
        Encryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map_err(|_| CryptError::Misaligned { index, len })?;
        Ok(())
    }
}

/// Round a requested chunk size down to a multiple of 512, never below 512.
pub fn normalize_chunk_size(requested: usize) -> usize {
    (requested / MIN_CHUNK_SIZE * MIN_CHUNK_SIZE).max(MIN_CHUNK_SIZE)
}

/// Length of the encrypted form of `rsize` plaintext bytes.
pub fn encrypted_len(rsize: u64) -> u64 { rsize.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64 }

/// Encrypt `plain` chunk by chunk.
///
/// Each chunk is encrypted on its own with the same key and IV, so any chunk
/// can be decrypted without its neighbours. The tail is zero-padded to the
/// block size; readers clamp it back using the plaintext length.
pub fn encrypt_chunks(plain: &[u8], key: &ChunkKey, chunk_size: usize) -> Result<Vec<u8>> {
    let chunk_size = normalize_chunk_size(chunk_size);
    let mut out = plain.to_vec();
    out.resize(encrypted_len(plain.len() as u64) as usize, 0);

    for (index, chunk) in out.chunks_mut(chunk_size).enumerate() {
        key.encrypt_chunk(index as u64, chunk)?;
    }
    Ok(out)
}
