//! Offset arithmetic from logical record ids to physical sector offsets.
//!
//! ```text
//! [0, SUPERBLOCK_SIZE)                 Superblock
//! [sector after superblock, ...)       Inode table, one sector-aligned slot per inode
//! [end of inode table, ...)            Block area, one sector-aligned slot per block
//! ```

use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::SuperBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub inode_count: u64,
    pub block_count: u64,
}

impl Layout {
    pub fn new(inode_count: u64, block_count: u64) -> Self {
        Self { inode_count, block_count }
    }

    pub fn of(superblock: &SuperBlock) -> Self {
        Self::new(superblock.inode_count, superblock.block_count)
    }

    pub const fn superblock_offset() -> u64 {
        0
    }

    /// Sector offset of inode `id`.
    pub fn inode_offset(&self, id: u64) -> Result<u64> {
        if id >= self.inode_count {
            return Err(FsError::NotFound(format!("inode {} (table holds {})", id, self.inode_count)));
        }
        Ok(SUPERBLOCK_SECTORS + id * INODE_SECTORS)
    }

    /// First sector of the block area.
    pub fn block_area_offset(&self) -> u64 {
        SUPERBLOCK_SECTORS + self.inode_count * INODE_SECTORS
    }

    /// Sector offset of block `id`.
    pub fn block_offset(&self, id: u64) -> Result<u64> {
        if id >= self.block_count {
            return Err(FsError::NotFound(format!("block {} (area holds {})", id, self.block_count)));
        }
        Ok(self.block_area_offset() + id * BLOCK_SECTORS)
    }

    /// Bytes spanned by the sector-aligned layout, which may exceed the requested image size.
    pub fn span_bytes(&self) -> Result<u64> {
        let sectors = || {
            SUPERBLOCK_SECTORS
                .checked_add(self.inode_count.checked_mul(INODE_SECTORS)?)?
                .checked_add(self.block_count.checked_mul(BLOCK_SECTORS)?)
        };
        sectors()
            .and_then(|sectors| sectors.checked_mul(SECTOR_SIZE as u64))
            .ok_or_else(|| {
                FsError::InvalidGeometry(format!(
                    "{} inodes and {} blocks overflow the addressable image",
                    self.inode_count, self.block_count
                ))
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offsets() {
        let layout = Layout::new(8, 255);
        assert_eq!(layout.inode_offset(0).unwrap(), 1);
        assert_eq!(layout.inode_offset(7).unwrap(), 8);
        assert_eq!(layout.block_area_offset(), 9);
        assert_eq!(layout.block_offset(0).unwrap(), 9);
        assert_eq!(layout.block_offset(2).unwrap(), 17);
        assert_eq!(layout.span_bytes().unwrap(), (9 + 255 * 4) * 1024);
    }

    #[test]
    fn test_span_overflow() {
        let layout = Layout::new(1 << 55, 1 << 50);
        assert!(matches!(layout.span_bytes(), Err(FsError::InvalidGeometry(_))));
    }

    #[test]
    fn test_out_of_range() {
        let layout = Layout::new(8, 255);
        assert!(matches!(layout.inode_offset(8), Err(FsError::NotFound(_))));
        assert!(matches!(layout.block_offset(255), Err(FsError::NotFound(_))));
    }
}
