use log::debug;

use crate::codec::Record;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::layout::Layout;
use crate::block_dev::SectorDevice;
use crate::structs::SuperBlock;

impl SuperBlock {
    /// Geometry of a fresh image with `inode_count` inodes in `fs_size` bytes.
    /// The block area receives every whole block left after the superblock and inode table.
    pub fn new(inode_count: u64, fs_size: u64) -> Result<Self> {
        if inode_count == 0 {
            return Err(FsError::InvalidGeometry("at least one inode is required".into()));
        }
        let overhead = (SUPERBLOCK_SIZE as u64)
            .checked_add(inode_count.checked_mul(INODE_SIZE as u64).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX);
        let min_size = overhead.saturating_add(BLOCK_SIZE as u64);
        if fs_size <= min_size || fs_size > i64::MAX as u64 {
            return Err(FsError::InvalidGeometry(format!(
                "{} bytes cannot hold a superblock, {} inodes and one block (need more than {})",
                fs_size, inode_count, min_size
            )));
        }
        let block_count = (fs_size - overhead) / BLOCK_SIZE as u64;
        Layout::new(inode_count, block_count).span_bytes()?;
        debug!("geometry: {} bytes, {} inodes, {} blocks", fs_size, inode_count, block_count);

        Ok(Self {
            fs_size,
            block_count,
            free_blocks: block_count,
            next_free_block: 0,
            inode_count,
            free_inodes: inode_count,
            next_free_inode: 0,
            modified: false,
        })
    }

    /// Checks that counts and cursors are mutually plausible.
    pub fn validate(&self) -> Result<()> {
        let bad = |what: &str| -> Result<()> { Err(FsError::CorruptRecord(format!("superblock: {}", what))) };
        if self.inode_count == 0 || self.block_count == 0 {
            return bad("empty inode table or block area");
        }
        if self.free_inodes >= self.inode_count {
            return bad("free inode count leaves no room for the root");
        }
        if self.free_blocks >= self.block_count {
            return bad("free block count leaves no room for the root");
        }
        if self.next_free_inode >= self.inode_count || self.next_free_block >= self.block_count {
            return bad("allocation cursor out of range");
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::of(self)
    }
}

pub fn read_superblock<D: SectorDevice>(device: &D) -> Result<SuperBlock> {
    let mut buf = vec![0u8; SUPERBLOCK_SIZE];
    device.read_sector(Layout::superblock_offset(), &mut buf)?;
    let superblock = SuperBlock::decode(&buf)?;
    superblock.validate()?;
    Ok(superblock)
}

/// Persists `superblock` with its dirty flag cleared.
pub fn write_superblock<D: SectorDevice>(device: &D, superblock: &mut SuperBlock) -> Result<()> {
    superblock.modified = false;
    device.write_sector(Layout::superblock_offset(), &superblock.encode())?;
    debug!(
        "superblock saved: {}/{} inodes free, {}/{} blocks free",
        superblock.free_inodes, superblock.inode_count, superblock.free_blocks, superblock.block_count
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_boundary() {
        let overhead = SUPERBLOCK_SIZE as u64 + 8 * INODE_SIZE as u64;
        let limit = overhead + BLOCK_SIZE as u64;
        assert!(matches!(SuperBlock::new(8, limit), Err(FsError::InvalidGeometry(_))));
        assert!(matches!(SuperBlock::new(8, 100), Err(FsError::InvalidGeometry(_))));
        let sb = SuperBlock::new(8, limit + 1).unwrap();
        assert_eq!(sb.block_count, 1);
    }

    #[test]
    fn test_block_capacity() {
        let sb = SuperBlock::new(8, 1024 * 1024).unwrap();
        let overhead = SUPERBLOCK_SIZE as u64 + 8 * INODE_SIZE as u64;
        assert_eq!(sb.block_count, (1024 * 1024 - overhead) / BLOCK_SIZE as u64);
        assert_eq!(sb.block_count, 255);
        assert_eq!(sb.free_inodes, 8);
        assert_eq!(sb.free_blocks, 255);
    }

    #[test]
    fn test_unaddressable_geometry() {
        let result = SuperBlock::new(1 << 55, i64::MAX as u64);
        assert!(matches!(result, Err(FsError::InvalidGeometry(_))));
    }

    #[test]
    fn test_zero_inodes() {
        assert!(SuperBlock::new(0, 1024 * 1024).is_err());
    }
}
