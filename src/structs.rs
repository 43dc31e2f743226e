use core::fmt;

use crate::config::*;
use crate::error::{FsError, Result};

/// Filesystem-wide metadata, stored at the very start of the image.
/// Counts and cursors are signed 64-bit values on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuperBlock {
    pub fs_size: u64,         // Size of the image in bytes, as requested at format time
    pub block_count: u64,     // Number of blocks in the block area
    pub free_blocks: u64,     // Number of free blocks
    pub next_free_block: u64, // Allocation cursor over the block area
    pub inode_count: u64,     // Number of slots in the inode table
    pub free_inodes: u64,     // Number of free inodes
    pub next_free_inode: u64, // Allocation cursor over the inode table
    pub modified: bool,       // Set whenever an in-memory count or cursor changed
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    #[default]
    Regular = 0,
    Directory = 1,
    Symlink = 2,
}

impl TryFrom<u8> for FileType {
    type Error = FsError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(FileType::Regular),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Symlink),
            other => Err(FsError::CorruptRecord(format!("unknown inode type tag {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inode {
    pub ftype: FileType,
    pub size: u64,
    direct_ptrs: [u64; NUM_DIRECT_PTRS],
    pub indirect_ptr: u64, // Reserved, always 0
}

impl Inode {
    pub const FREE: Self = Self {
        ftype: FileType::Regular,
        size: 0,
        direct_ptrs: [0; NUM_DIRECT_PTRS],
        indirect_ptr: 0,
    };

    pub fn new(ftype: FileType) -> Self {
        Self { ftype, ..Self::FREE }
    }

    pub(crate) fn from_raw(ftype: FileType, size: u64, direct_ptrs: [u64; NUM_DIRECT_PTRS], indirect_ptr: u64) -> Self {
        Self { ftype, size, direct_ptrs, indirect_ptr }
    }

    /// An inode slot is free iff its first direct pointer is unused.
    /// The root inode points at block 0 and is always allocated.
    pub fn is_free(&self, id: u64) -> bool {
        id != ROOT_INODE_ID && self.direct_ptrs[0] == 0
    }

    pub fn direct_ptrs(&self) -> &[u64; NUM_DIRECT_PTRS] {
        &self.direct_ptrs
    }

    pub fn direct_ptr(&self, slot: usize) -> Option<u64> {
        self.direct_ptrs.get(slot).copied()
    }

    pub fn set_direct_ptr(&mut self, slot: usize, block_id: u64) -> Result<()> {
        let ptr = self.direct_ptrs.get_mut(slot).ok_or(FsError::FileTooLarge {
            requested: slot + 1,
            capacity: NUM_DIRECT_PTRS,
        })?;
        *ptr = block_id;
        Ok(())
    }

    /// Block ids owned by inode `id`, in file order.
    /// Pointers are kept as a dense prefix; slot 0 of the root legitimately holds block 0.
    pub fn block_ids(&self, id: u64) -> Vec<u64> {
        if self.is_free(id) {
            return Vec::new();
        }
        let mut ids = vec![self.direct_ptrs[0]];
        ids.extend(self.direct_ptrs[1..].iter().copied().take_while(|&ptr| ptr != 0));
        ids
    }
}

/// One fixed-width name slot; an empty first byte marks the slot free.
pub type NameSlot = [u8; NAME_LEN];

/// Fixed-capacity (name, inode id) table stored as the content of a directory inode.
#[derive(Clone, PartialEq, Eq)]
pub struct Directory {
    pub(crate) names: [NameSlot; DIR_CAPACITY],
    pub(crate) inode_ids: [u64; DIR_CAPACITY],
}

impl Default for Directory {
    fn default() -> Self {
        Self { names: [[0; NAME_LEN]; DIR_CAPACITY], inode_ids: [0; DIR_CAPACITY] }
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

/// A live directory entry, as handed out by listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode_id: u64,
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.inode_id)
    }
}

/// Raw storage unit.
pub type Block = [u8; BLOCK_SIZE];

/// Metadata report for one inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub inode_id: u64,
    pub ftype: FileType,
    pub size: u64,
    pub direct_ptrs: [u64; NUM_DIRECT_PTRS],
    pub indirect_ptr: u64,
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode : {}", self.ftype as u8)?;
        writeln!(f, "Size : {}", self.size)?;
        writeln!(f, "DirectPointers : {:?}", self.direct_ptrs)?;
        write!(f, "IndirectPointer : {}", self.indirect_ptr)
    }
}
