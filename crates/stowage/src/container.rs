use std::any::Any;
use std::io::{Read, Seek};
use std::rc::Rc;

use bytes::Bytes;
use stowage_archive::ArchiveReader;

use crate::{ProviderError, Result};

/// Anything a bundle payload can be read from.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

pub type BundleSource = Box<dyn ReadSeek>;

/// An opened engine-native bundle.
pub trait Container {
    fn contains(&self, path: &str) -> bool;

    fn read_bytes(&mut self, path: &str) -> Result<Bytes>;

    /// Instantiate the object stored at `path`. Defaults to its raw bytes.
    fn load_object(&mut self, path: &str) -> Result<Rc<dyn Any>> {
        Ok(Rc::new(self.read_bytes(path)?))
    }
}

/// Opens `AssetBundle` payloads.
pub trait ContainerLoader {
    fn open(&self, bundle: &str, source: BundleSource) -> Result<Box<dyn Container>>;
}

/// Default loader: the container is a zip whose members are the objects.
#[derive(Debug, Default)]
pub struct PackedContainerLoader;

struct PackedContainer {
    bundle: String,
    reader: ArchiveReader<BundleSource>,
}

impl ContainerLoader for PackedContainerLoader {
    fn open(&self, bundle: &str, source: BundleSource) -> Result<Box<dyn Container>> {
        let reader =
            ArchiveReader::new(source).map_err(|e| ProviderError::unavailable(bundle, e))?;
        Ok(Box::new(PackedContainer {
            bundle: bundle.to_string(),
            reader,
        }))
    }
}

impl Container for PackedContainer {
    fn contains(&self, path: &str) -> bool { self.reader.contains(path) }

    fn read_bytes(&mut self, path: &str) -> Result<Bytes> {
        self.reader
            .read(path)
            .map(Bytes::from)
            .map_err(|e| ProviderError::unavailable(&self.bundle, e))
    }
}
