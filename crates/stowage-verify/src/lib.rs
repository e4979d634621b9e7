//! Incremental checksum primitives for downloaded bundles.
//!
//! Bundles and their `.meta` sidecars carry a short CRC-16 checksum rendered
//! as four lowercase hex digits. The checksum is computed while bytes move
//! (download writes, decryption, local validation) so a file never has to be
//! buffered whole.
//!
//! # Example
//!
//! ```
//! use stowage_verify::{ChecksumReader, Crc16};
//!
//! let data = b"123456789";
//! let mut reader = ChecksumReader::new(&data[..], Crc16::new());
//! std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
//!
//! reader.finish("bb3d").unwrap();
//! ```

pub use self::error::{Result, VerificationError};
pub use self::hasher::{Crc16, Hasher, checksum_eq};
pub use self::reader::{ChecksumReader, checksum_file};

mod error;
mod hasher;
mod reader;
