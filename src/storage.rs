//! Byte-addressable persistent storage
//!
//! Models an emulated EEPROM: `begin(size)` maps the backing image into a
//! working buffer, `write` only touches that buffer, and `commit` flushes it
//! back. Erased cells read as `0xFF`.

use crate::error::StorageError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Value of a cell that was never written
pub const ERASED_BYTE: u8 = 0xFF;

/// Persistent storage collaborator
pub trait PersistentStorage {
    /// Map `size` bytes of storage into the working buffer
    fn begin(&mut self, size: usize) -> Result<(), StorageError>;

    /// Read one byte from the working buffer
    fn read(&self, offset: usize) -> Result<u8, StorageError>;

    /// Write one byte into the working buffer
    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError>;

    /// Flush the working buffer to the backing store
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Release the working buffer without flushing
    fn end(&mut self) -> Result<(), StorageError>;
}

/// Working buffer shared by the storage implementations
#[derive(Debug, Default)]
struct WorkingBuffer {
    bytes: Option<Vec<u8>>,
}

impl WorkingBuffer {
    fn load(&mut self, image: &[u8], size: usize) {
        let mut bytes = vec![ERASED_BYTE; size];
        let len = image.len().min(size);
        bytes[..len].copy_from_slice(&image[..len]);
        self.bytes = Some(bytes);
    }

    fn read(&self, offset: usize) -> Result<u8, StorageError> {
        let bytes = self.bytes.as_ref().ok_or(StorageError::NotStarted)?;
        bytes
            .get(offset)
            .copied()
            .ok_or(StorageError::OutOfBounds {
                offset,
                size: bytes.len(),
            })
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
        let bytes = self.bytes.as_mut().ok_or(StorageError::NotStarted)?;
        let size = bytes.len();
        let cell = bytes
            .get_mut(offset)
            .ok_or(StorageError::OutOfBounds { offset, size })?;
        *cell = value;
        Ok(())
    }

    fn contents(&self) -> Result<&[u8], StorageError> {
        self.bytes.as_deref().ok_or(StorageError::NotStarted)
    }
}

/// In-memory storage; the image survives as long as the value does, which is
/// what a simulated restart needs
#[derive(Debug, Default)]
pub struct MemoryStorage {
    image: Vec<u8>,
    buffer: WorkingBuffer,
    commits: usize,
}

impl MemoryStorage {
    /// Blank (erased) storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-loaded with a raw image
    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            image,
            ..Default::default()
        }
    }

    /// Committed contents
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl PersistentStorage for MemoryStorage {
    fn begin(&mut self, size: usize) -> Result<(), StorageError> {
        self.buffer.load(&self.image, size);
        Ok(())
    }

    fn read(&self, offset: usize) -> Result<u8, StorageError> {
        self.buffer.read(offset)
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
        self.buffer.write(offset, value)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let contents = self.buffer.contents()?;
        if self.image.len() < contents.len() {
            self.image.resize(contents.len(), ERASED_BYTE);
        }
        self.image[..contents.len()].copy_from_slice(contents);
        self.commits += 1;
        Ok(())
    }

    fn end(&mut self) -> Result<(), StorageError> {
        self.buffer.bytes = None;
        Ok(())
    }
}

/// File-backed storage image for host builds
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    buffer: WorkingBuffer,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer: WorkingBuffer::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentStorage for FileStorage {
    fn begin(&mut self, size: usize) -> Result<(), StorageError> {
        let image = match std::fs::read(&self.path) {
            Ok(image) => image,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No storage image at {}, starting erased", self.path.display());
                Vec::new()
            }
            Err(e) => {
                return Err(StorageError::Unavailable(format!(
                    "{}: {e}",
                    self.path.display()
                )))
            }
        };
        self.buffer.load(&image, size);
        Ok(())
    }

    fn read(&self, offset: usize) -> Result<u8, StorageError> {
        self.buffer.read(offset)
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
        self.buffer.write(offset, value)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let contents = self.buffer.contents()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Replace the image atomically
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Committed {} bytes to {}", contents.len(), self.path.display());
        Ok(())
    }

    fn end(&mut self) -> Result<(), StorageError> {
        self.buffer.bytes = None;
        Ok(())
    }
}
