use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::{Crc16, Result, VerificationError, checksum_eq};

/// Reader that checksums data as it passes through.
pub struct ChecksumReader<R> {
    reader: R,
    hasher: Crc16,
}

impl<R> ChecksumReader<R> {
    pub fn new(reader: R, hasher: Crc16) -> Self { Self { reader, hasher } }

    pub fn hasher(&self) -> &Crc16 { &self.hasher }

    pub fn into_parts(self) -> (R, Crc16) { (self.reader, self.hasher) }

    /// Compare the running checksum against `expected`.
    pub fn finish(self, expected: &str) -> Result<()> {
        let actual = self.hasher.hex();
        if checksum_eq(&actual, expected) {
            Ok(())
        } else {
            Err(VerificationError::Mismatch {
                expected: expected.to_string(),
                actual,
            })
        }
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Checksum a whole file. Returns the hex checksum and the byte length.
pub fn checksum_file(path: impl AsRef<Path>) -> io::Result<(String, u64)> {
    let file = File::open(path)?;
    let mut hasher = Crc16::new();
    let len = hasher.update_reader(BufReader::new(file))?;
    Ok((hasher.hex(), len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reader_passthrough_and_verify() {
        let mut reader = ChecksumReader::new(Cursor::new(b"123456789".to_vec()), Crc16::new());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out, b"123456789");
        reader.finish("BB3D").unwrap();
    }

    #[test]
    fn test_reader_mismatch() {
        let mut reader = ChecksumReader::new(Cursor::new(b"test data".to_vec()), Crc16::new());
        io::copy(&mut reader, &mut io::sink()).unwrap();

        match reader.finish("0000") {
            Err(VerificationError::Mismatch { expected, actual }) => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, Crc16::hex_of(b"test data"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_checksum_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b1.pkg");
        std::fs::write(&path, b"123456789").unwrap();

        let (hex, len) = checksum_file(&path).unwrap();
        assert_eq!(hex, "bb3d");
        assert_eq!(len, 9);
    }
}
