use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use crate::key::{ChunkKey, encrypted_len, normalize_chunk_size};
use crate::{CryptError, Result};

struct CachedChunk {
    index: u64,
    plain: Vec<u8>,
}

/// Seekable reader over a chunk-encrypted bundle.
///
/// Presents the `rsize` plaintext bytes. Chunks are decrypted on demand and
/// the most recent one is cached, so sequential reads decrypt each chunk once
/// and seeking is plain arithmetic.
pub struct EncryptedChunkReader<R> {
    inner:      R,
    key:        ChunkKey,
    rsize:      u64,
    chunk_size: usize,
    pos:        u64,
    cached:     Option<CachedChunk>,
}

impl<R: Read + Seek> EncryptedChunkReader<R> {
    pub fn new(inner: R, key: ChunkKey, rsize: u64, chunk_size: usize) -> Self {
        Self {
            inner,
            key,
            rsize,
            chunk_size: normalize_chunk_size(chunk_size),
            pos: 0,
            cached: None,
        }
    }

    pub fn plain_len(&self) -> u64 { self.rsize }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    pub fn into_inner(self) -> R { self.inner }

    fn load_chunk(&mut self, index: u64) -> Result<()> {
        if self.cached.as_ref().is_some_and(|c| c.index == index) {
            return Ok(());
        }

        let chunk = self.chunk_size as u64;
        let start = index * chunk;
        let enc_total = encrypted_len(self.rsize);
        let enc_len = chunk.min(enc_total - start) as usize;

        self.inner.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; enc_len];
        let mut filled = 0;
        while filled < enc_len {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(CryptError::Truncated {
                        expected: enc_total,
                        actual:   start + filled as u64,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.key.decrypt_chunk(index, &mut buf)?;
        buf.truncate(chunk.min(self.rsize - start) as usize);
        trace!(index, len = buf.len(), "decrypted chunk");

        self.cached = Some(CachedChunk { index, plain: buf });
        Ok(())
    }
}

impl<R: Read + Seek> Read for EncryptedChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.rsize {
            return Ok(0);
        }

        let chunk = self.chunk_size as u64;
        let index = self.pos / chunk;
        self.load_chunk(index)?;

        let Some(cached) = self.cached.as_ref() else {
            return Ok(0);
        };
        let offset = (self.pos - index * chunk) as usize;
        let available = &cached.plain[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for EncryptedChunkReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.rsize.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.pos = target;
        Ok(target)
    }
}

/// Decrypt a whole in-memory buffer.
pub fn decrypt_all(data: &[u8], key: ChunkKey, rsize: u64, chunk_size: usize) -> Result<Vec<u8>> {
    let mut reader = EncryptedChunkReader::new(io::Cursor::new(data), key, rsize, chunk_size);
    let mut out = Vec::with_capacity(rsize as usize);
    reader.read_to_end(&mut out).map_err(|e| {
        let kind = e.kind();
        match e.into_inner().map(|inner| inner.downcast::<CryptError>()) {
            Some(Ok(crypt)) => *crypt,
            Some(Err(other)) => CryptError::Io(io::Error::new(kind, other)),
            None => CryptError::Io(io::Error::from(kind)),
        }
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt_chunks;
    use std::io::Cursor;

    fn sample(len: usize) -> Vec<u8> { (0..len).map(|i| (i * 7 % 253) as u8).collect() }

    fn reader_for(plain: &[u8], chunk: usize) -> EncryptedChunkReader<Cursor<Vec<u8>>> {
        let key = ChunkKey::derive(b"password", "bundle.pkg");
        let enc = encrypt_chunks(plain, &key, chunk).unwrap();
        EncryptedChunkReader::new(Cursor::new(enc), key, plain.len() as u64, chunk)
    }

    #[test]
    fn test_sequential_read_clamps_tail() {
        let plain = sample(1300);
        let mut reader = reader_for(&plain, 512);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_small_reads_cross_chunk_boundaries() {
        let plain = sample(2000);
        let mut reader = reader_for(&plain, 512);

        let mut out = Vec::new();
        let mut buf = [0u8; 37];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, plain);
    }

    #[test]
    fn test_seek_then_read() {
        let plain = sample(3000);
        let mut reader = reader_for(&plain, 1024);

        assert_eq!(reader.seek(SeekFrom::Start(1500)).unwrap(), 1500);
        let mut buf = [0u8; 100];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf[..], plain[1500..1600]);

        assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), 2990);
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, plain[2990..]);

        reader.seek(SeekFrom::Current(-2000)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf[..], plain[1000..1100]);
    }

    #[test]
    fn test_seek_before_start_fails() {
        let mut reader = reader_for(&sample(10), 512);
        let err = reader.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_past_end_is_empty() {
        let mut reader = reader_for(&sample(10), 512);
        reader.seek(SeekFrom::Start(50)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_truncated_source() {
        let plain = sample(1000);
        let key = ChunkKey::derive(b"password", "bundle.pkg");
        let mut enc = encrypt_chunks(&plain, &key, 512).unwrap();
        enc.truncate(700);

        let mut reader = EncryptedChunkReader::new(Cursor::new(enc), key, 1000, 512);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_wrong_key_yields_garbage() {
        let plain = sample(600);
        let key = ChunkKey::derive(b"password", "bundle.pkg");
        let enc = encrypt_chunks(&plain, &key, 512).unwrap();

        let wrong = ChunkKey::derive(b"password", "other.pkg");
        let out = decrypt_all(&enc, wrong, 600, 512).unwrap();
        assert_ne!(out, plain);
    }

    #[test]
    fn test_decrypt_all() {
        let plain = sample(777);
        let key = ChunkKey::derive(b"k", "manifest.pkg");
        let enc = encrypt_chunks(&plain, &key, 4096).unwrap();
        assert_eq!(decrypt_all(&enc, key, 777, 4096).unwrap(), plain);
    }
}
