//! Open file table and whole-file data access.

use crate::block_dev::SectorDevice;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{read_blocks, write_blocks};
use crate::layout::Layout;
use crate::structs::Inode;

pub const DEFAULT_MODE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub mode: u8,
    pub inode_id: u64,
    pub ref_count: u64,
}

/// Session-scoped descriptor list. Indices are positional: closing one shifts later entries down.
#[derive(Debug, Clone, Default)]
pub struct OpenFileTable {
    entries: Vec<FileDescriptor>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a descriptor for `inode_id` and returns its index.
    pub fn open(&mut self, inode_id: u64) -> usize {
        self.entries.push(FileDescriptor { mode: DEFAULT_MODE, inode_id, ref_count: 1 });
        self.entries.len() - 1
    }

    pub fn close(&mut self, index: usize) -> Result<FileDescriptor> {
        if index >= self.entries.len() {
            return Err(FsError::BadDescriptor(index));
        }
        Ok(self.entries.remove(index))
    }

    pub fn get(&self, index: usize) -> Result<&FileDescriptor> {
        self.entries.get(index).ok_or(FsError::BadDescriptor(index))
    }

    pub fn is_open(&self, inode_id: u64) -> bool {
        self.entries.iter().any(|fd| fd.inode_id == inode_id)
    }

    pub fn entries(&self) -> &[FileDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads the whole file: every allocated block, concatenated and trimmed to the inode size.
pub fn fread(device: &impl SectorDevice, layout: &Layout, inode: &Inode, inode_id: u64) -> Result<Vec<u8>> {
    let mut data = read_blocks(device, layout, &inode.block_ids(inode_id))?;
    if inode.size > data.len() as u64 {
        return Err(FsError::CorruptRecord(format!(
            "inode {} claims {} bytes over {} allocated",
            inode_id,
            inode.size,
            data.len()
        )));
    }
    data.truncate(inode.size as usize);
    Ok(data)
}

/// Replaces the file content with `data`, spread over the blocks the inode already owns.
/// The inode's size is updated in memory; the caller persists it.
/// Growing beyond the allocated blocks is the job of truncate.
pub fn fwrite(device: &impl SectorDevice, layout: &Layout, inode: &mut Inode, inode_id: u64, data: &[u8]) -> Result<usize> {
    let block_ids = inode.block_ids(inode_id);
    let needed = data.len().div_ceil(BLOCK_SIZE);
    if needed > block_ids.len() {
        return Err(FsError::FileTooLarge { requested: needed, capacity: block_ids.len() });
    }
    write_blocks(device, layout, &block_ids, data)?;
    inode.size = data.len() as u64;
    Ok(data.len())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_close_shifts() {
        let mut table = OpenFileTable::new();
        assert_eq!(table.open(4), 0);
        assert_eq!(table.open(5), 1);
        assert_eq!(table.open(6), 2);
        let closed = table.close(0).unwrap();
        assert_eq!(closed.inode_id, 4);
        assert_eq!(table.get(0).unwrap().inode_id, 5);
        assert_eq!(table.get(1).unwrap().inode_id, 6);
        assert!(matches!(table.get(2), Err(FsError::BadDescriptor(2))));
        assert!(matches!(table.close(7), Err(FsError::BadDescriptor(7))));
    }

    #[test]
    fn test_descriptor_defaults() {
        let mut table = OpenFileTable::new();
        let fd = table.open(9);
        let desc = table.get(fd).unwrap();
        assert_eq!(desc.mode, DEFAULT_MODE);
        assert_eq!(desc.ref_count, 1);
        assert!(table.is_open(9));
        assert!(!table.is_open(8));
    }
}
