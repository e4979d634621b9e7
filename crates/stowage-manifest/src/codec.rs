use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use stowage_crypt::{ChunkKey, decrypt_all, encrypt_chunks};
use stowage_verify::Crc16;

use crate::{ChecksumInfo, Manifest, ManifestError, Result};

pub const MANIFEST_FILE: &str = "manifest.pkg";
pub const CHECKSUM_FILE: &str = "checksum.txt";

/// Key material for an encrypted `manifest.pkg`.
#[derive(Clone, Debug)]
pub struct ManifestCipher {
    pub key:        ChunkKey,
    pub chunk_size: usize,
}

impl ManifestCipher {
    pub fn from_password(password: &[u8], chunk_size: usize) -> Self {
        Self {
            key: ChunkKey::derive(password, MANIFEST_FILE),
            chunk_size,
        }
    }
}

/// Bytes of a `manifest.pkg` together with the `checksum.txt` describing them.
#[derive(Clone, Debug)]
pub struct EncodedManifest {
    pub bytes:    Vec<u8>,
    pub checksum: ChecksumInfo,
}

/// Serialize, gzip and optionally chunk-encrypt a manifest.
pub fn encode_manifest(manifest: &Manifest, cipher: Option<&ManifestCipher>) -> Result<EncodedManifest> {
    let json = serde_json::to_vec(manifest)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(ManifestError::Decompress)?;
    let compressed = encoder.finish().map_err(ManifestError::Decompress)?;
    let rsize = compressed.len() as u64;

    let (bytes, chunk_size) = match cipher {
        Some(c) => (
            encrypt_chunks(&compressed, &c.key, c.chunk_size)?,
            stowage_crypt::normalize_chunk_size(c.chunk_size),
        ),
        None => (compressed, 0),
    };

    let checksum = ChecksumInfo {
        name: MANIFEST_FILE.to_string(),
        size: bytes.len() as u64,
        rsize,
        checksum: Crc16::hex_of(&bytes),
        chunk_size,
    };
    Ok(EncodedManifest { bytes, checksum })
}

/// Decode a `manifest.pkg` described by `info`.
///
/// `cipher` is consulted only when `info` reports a nonzero chunk size; its
/// own chunk size is ignored in favour of the one in `info`.
pub fn decode_manifest(
    data: &[u8],
    info: &ChecksumInfo,
    cipher: Option<&ManifestCipher>,
) -> Result<Manifest> {
    let compressed;
    let gz: &[u8] = match cipher {
        Some(c) if info.is_encrypted() => {
            compressed = decrypt_all(data, c.key.clone(), info.rsize, info.chunk_size)?;
            &compressed
        }
        _ => data,
    };

    let mut json = Vec::new();
    GzDecoder::new(gz)
        .read_to_end(&mut json)
        .map_err(ManifestError::Decompress)?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BundleInfo, BundleKind};

    fn sample() -> Manifest {
        Manifest {
            build:      42,
            chunk_size: 0,
            tag:        "release".into(),
            bundles:    vec![BundleInfo::new("b1.pkg", BundleKind::ZipArchive).asset("a.txt")],
        }
    }

    #[test]
    fn test_plain() {
        let encoded = encode_manifest(&sample(), None).unwrap();
        assert!(!encoded.checksum.is_encrypted());
        assert_eq!(encoded.checksum.rsize, encoded.checksum.size);
        assert_eq!(decode_manifest(&encoded.bytes, &encoded.checksum, None).unwrap(), sample());
    }

    #[test]
    fn test_encrypted() {
        let cipher = ManifestCipher::from_password(b"hunter2", 1000);
        let encoded = encode_manifest(&sample(), Some(&cipher)).unwrap();

        assert_eq!(encoded.checksum.chunk_size, 512);
        assert_eq!(encoded.checksum.size % 16, 0);
        assert_eq!(Crc16::hex_of(&encoded.bytes), encoded.checksum.checksum);

        let decoded = decode_manifest(&encoded.bytes, &encoded.checksum, Some(&cipher)).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_encrypted_without_key_fails() {
        let cipher = ManifestCipher::from_password(b"hunter2", 512);
        let encoded = encode_manifest(&sample(), Some(&cipher)).unwrap();
        let err = decode_manifest(&encoded.bytes, &encoded.checksum, None).unwrap_err();
        assert!(matches!(err, ManifestError::Decompress(_)));
    }
}
