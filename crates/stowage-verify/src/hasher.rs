use std::fmt;
use std::io::{self, Read};

use crc::{CRC_16_ARC, Crc, Digest};

static CRC16_ARC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

const READ_BUFFER: usize = 16 * 1024;

pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

/// Rolling CRC-16/ARC checksum.
///
/// This is the checksum written into manifests and `.meta` sidecars, so it
/// must stay bit-compatible with the packaging side.
#[derive(Clone)]
pub struct Crc16 {
    digest: Digest<'static, u16>,
    len:    u64,
}

impl Default for Crc16 {
    fn default() -> Self { Self::new() }
}

impl Crc16 {
    pub fn new() -> Self {
        Self {
            digest: CRC16_ARC.digest(),
            len:    0,
        }
    }

    /// One-shot checksum of `data` as four hex digits.
    pub fn hex_of(data: &[u8]) -> String { format!("{:04x}", CRC16_ARC.checksum(data)) }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.len += data.len() as u64;
    }

    /// Feed everything `reader` yields. Returns the number of bytes consumed.
    pub fn update_reader<R: Read>(&mut self, mut reader: R) -> io::Result<u64> {
        let mut buf = vec![0u8; READ_BUFFER];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.update(&buf[..n]);
            total += n as u64;
        }
        Ok(total)
    }

    pub fn value(&self) -> u16 { self.digest.clone().finalize() }

    pub fn hex(&self) -> String { format!("{:04x}", self.value()) }

    /// Bytes fed since creation or the last [`Crc16::reset`].
    pub fn len(&self) -> u64 { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn reset(&mut self) {
        self.digest = CRC16_ARC.digest();
        self.len = 0;
    }
}

impl Hasher for Crc16 {
    fn update(&mut self, data: &[u8]) { Crc16::update(self, data); }

    fn finalize(self) -> Vec<u8> { self.digest.finalize().to_be_bytes().to_vec() }
}

impl fmt::Debug for Crc16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc16")
            .field("hex", &self.hex())
            .field("len", &self.len)
            .finish()
    }
}

/// Compare two hex checksums, ignoring case and surrounding whitespace.
pub fn checksum_eq(a: &str, b: &str) -> bool { a.trim().eq_ignore_ascii_case(b.trim()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // CRC-16/ARC check value from the catalogue of parametrised CRCs.
        assert_eq!(Crc16::hex_of(b"123456789"), "bb3d");
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();

        let mut hasher = Crc16::new();
        for piece in data.chunks(777) {
            hasher.update(piece);
        }

        assert_eq!(hasher.hex(), Crc16::hex_of(&data));
        assert_eq!(hasher.len(), data.len() as u64);
    }

    #[test]
    fn test_hex_does_not_consume_state() {
        let mut hasher = Crc16::new();
        hasher.update(b"1234");
        let _ = hasher.hex();
        hasher.update(b"56789");
        assert_eq!(hasher.hex(), "bb3d");
    }

    #[test]
    fn test_reset() {
        let mut hasher = Crc16::new();
        hasher.update(b"garbage");
        hasher.reset();
        assert!(hasher.is_empty());
        assert_eq!(hasher.hex(), "0000");
        hasher.update(b"123456789");
        assert_eq!(hasher.hex(), "bb3d");
    }

    #[test]
    fn test_update_reader() {
        let mut hasher = Crc16::new();
        let n = hasher.update_reader(&b"123456789"[..]).unwrap();
        assert_eq!(n, 9);
        assert_eq!(hasher.hex(), "bb3d");
    }

    #[test]
    fn test_finalize_big_endian() {
        let mut hasher = Crc16::new();
        Hasher::update(&mut hasher, b"123456789");
        assert_eq!(Hasher::finalize(hasher), vec![0xbb, 0x3d]);
    }

    #[test]
    fn test_checksum_eq() {
        assert!(checksum_eq("BB3D", "bb3d"));
        assert!(checksum_eq(" bb3d\n", "bb3d"));
        assert!(!checksum_eq("bb3d", "bb3e"));
    }
}
