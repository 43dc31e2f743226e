use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::trace;

use crate::config::SECTOR_SIZE;
use crate::error::Result;

pub trait SectorDevice: Send + Sync {
    /// Reads `buf.len()` bytes starting at sector `offset` (in units of `SECTOR_SIZE`).
    /// The read may span several consecutive sectors.
    fn read_sector(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf` starting at sector `offset`.
    fn write_sector(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Current length of the backing store in bytes.
    fn len(&self) -> Result<u64>;

    /// Grows or shrinks the backing store to exactly `bytes`.
    fn set_len(&self, bytes: u64) -> Result<()>;
}

/// A regular file treated as a sector-addressed disk.
/// The file is opened and closed around every single operation, no handle is kept.
#[derive(Debug, Clone)]
pub struct ImageFile {
    path: PathBuf,
}

impl ImageFile {
    /// Creates the backing file if missing. Existing contents are kept.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        Ok(Self { path: path.as_ref().to_path_buf() })
    }

    /// Wraps an existing image; fails if it cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        File::open(path.as_ref())?;
        Ok(Self { path: path.as_ref().to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&self, write: bool) -> Result<File> {
        Ok(OpenOptions::new().read(true).write(write).open(&self.path)?)
    }
}

impl SectorDevice for ImageFile {
    fn read_sector(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let pos = offset * SECTOR_SIZE as u64;
        trace!("read {} bytes at sector {} (byte {})", buf.len(), offset, pos);
        let mut file = self.handle(false)?;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_sector(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let pos = offset * SECTOR_SIZE as u64;
        trace!("write {} bytes at sector {} (byte {})", buf.len(), offset, pos);
        let mut file = self.handle(true)?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn set_len(&self, bytes: u64) -> Result<()> {
        self.handle(true)?.set_len(bytes)?;
        Ok(())
    }
}
