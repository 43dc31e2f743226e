//! Common utilities for tests

#![allow(unused)]

use std::io;
use std::sync::{Arc, Mutex};

use blobfs::{Error, FileSystem, SECTOR_SIZE, SectorDevice};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

pub const IMAGE_SIZE: u64 = 1024 * 1024;
pub const INODES: u64 = 8;

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Image kept in memory, grown by `set_len` like a sparse file.
#[derive(Debug, Default)]
pub struct RamDisk {
    inner: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the raw image bytes.
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().unwrap().clone()
    }
}

impl SectorDevice for RamDisk {
    fn read_sector(&self, offset: u64, buf: &mut [u8]) -> blobfs::Result<()> {
        let start = offset as usize * SECTOR_SIZE;
        let data = self.inner.lock().unwrap();
        let src = data
            .get(start..start + buf.len())
            .ok_or_else(|| Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof)))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_sector(&self, offset: u64, buf: &[u8]) -> blobfs::Result<()> {
        let start = offset as usize * SECTOR_SIZE;
        let mut data = self.inner.lock().unwrap();
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> blobfs::Result<u64> {
        Ok(self.inner.lock().unwrap().len() as u64)
    }

    fn set_len(&self, bytes: u64) -> blobfs::Result<()> {
        self.inner.lock().unwrap().resize(bytes as usize, 0);
        Ok(())
    }
}

/// A 1 MiB image with 8 inodes, mounted at the root.
pub fn fresh_fs() -> FileSystem<RamDisk> {
    init_logger();
    FileSystem::format(Arc::new(RamDisk::new()), INODES, IMAGE_SIZE).unwrap()
}
