//! Free-space tracking for the inode table and the block area.
//! Both allocators hand out the superblock's cursor, then scan forward (wrapping at the end)
//! for the next free slot. Count and cursor always move together.
//! Inode freeness is read from the inode table itself; block freeness comes from an in-memory
//! bitmap that is rebuilt from the live inodes at mount.

use log::{debug, warn};

use crate::block_dev::SectorDevice;
use crate::config::*;
use crate::error::{FsError, Resource, Result};
use crate::inode::{get_inode, write_block, write_inode};
use crate::structs::{Inode, SuperBlock};

/// Usage bits for the block area, one bit per block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap {
    words: Vec<u64>,
    len: u64,
}

impl BlockMap {
    pub fn new(len: u64) -> Self {
        Self { words: vec![0; len.div_ceil(64) as usize], len }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_used(&self, block_id: u64) -> bool {
        block_id < self.len && self.words[(block_id / 64) as usize] & (1 << (block_id % 64)) != 0
    }

    /// Sets the bit for `block_id` and returns its previous value.
    pub fn set(&mut self, block_id: u64, used: bool) -> Result<bool> {
        if block_id >= self.len {
            return Err(FsError::NotFound(format!("block {} (area holds {})", block_id, self.len)));
        }
        let word = &mut self.words[(block_id / 64) as usize];
        let mask = 1 << (block_id % 64);
        let prev = *word & mask != 0;
        if used {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        Ok(prev)
    }

    pub fn used_count(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }
}

/// Probes every slot once, starting at `start` and wrapping at `len`.
fn scan_from(start: u64, len: u64, mut is_free: impl FnMut(u64) -> Result<bool>) -> Result<Option<u64>> {
    for step in 0..len {
        let id = (start + step) % len;
        if is_free(id)? {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Claims the cursor slot and advances the cursor past it.
/// Nothing is mutated unless the claim succeeds.
fn take_slot(
    free: &mut u64,
    next: &mut u64,
    len: u64,
    resource: Resource,
    mut is_free: impl FnMut(u64) -> Result<bool>,
) -> Result<u64> {
    if *free == 0 {
        return Err(FsError::OutOfSpace(resource));
    }
    let claimed = *next;
    if !is_free(claimed)? {
        warn!("{} cursor {} points at a slot in use", resource, claimed);
        return Err(FsError::OutOfSpace(resource));
    }

    let remaining = *free - 1;
    let advanced = if remaining > 0 {
        scan_from(claimed + 1, len, |id| Ok(id != claimed && is_free(id)?))?
    } else {
        None
    };
    match advanced {
        Some(id) => {
            *next = id;
            *free = remaining;
        }
        None => {
            if remaining > 0 {
                warn!("{} count says {} free but the scan found none", resource, remaining);
            }
            *free = 0;
        }
    }
    debug!("{} {} claimed, cursor now {}, {} free", resource, claimed, *next, *free);
    Ok(claimed)
}

/// Returns `id` to the free pool. A cursor left stale by exhaustion is pulled to `id`.
fn return_slot(free: &mut u64, next: &mut u64, resource: Resource, id: u64) {
    if *free == 0 {
        *next = id;
    }
    *free += 1;
    debug!("{} {} released, cursor now {}, {} free", resource, id, *next, *free);
}

/// Allocates an inode slot. The caller owns writing the inode; until its first direct pointer
/// is set the slot still reads as free on disk.
pub fn alloc_inode(device: &impl SectorDevice, superblock: &mut SuperBlock) -> Result<u64> {
    let layout = superblock.layout();
    let id = take_slot(
        &mut superblock.free_inodes,
        &mut superblock.next_free_inode,
        superblock.inode_count,
        Resource::Inodes,
        |id| Ok(get_inode(device, &layout, id)?.is_free(id)),
    )?;
    superblock.modified = true;
    Ok(id)
}

/// Takes inode 0 for the root directory on a freshly formatted table.
/// The root never reads as free, so it cannot go through the cursor probe.
pub fn claim_root(superblock: &mut SuperBlock) {
    superblock.free_inodes -= 1;
    superblock.next_free_inode = if superblock.free_inodes > 0 { ROOT_INODE_ID + 1 } else { ROOT_INODE_ID };
    superblock.modified = true;
}

/// Clears inode `id` back to the free pattern on disk.
pub fn free_inode(device: &impl SectorDevice, superblock: &mut SuperBlock, id: u64) -> Result<()> {
    if id == ROOT_INODE_ID {
        return Err(FsError::MalformedInput("the root inode is never freed".into()));
    }
    write_inode(device, &superblock.layout(), id, &Inode::FREE)?;
    return_slot(&mut superblock.free_inodes, &mut superblock.next_free_inode, Resource::Inodes, id);
    superblock.modified = true;
    Ok(())
}

/// Allocates a block, zeroing its content on disk.
pub fn alloc_block(device: &impl SectorDevice, superblock: &mut SuperBlock, map: &mut BlockMap) -> Result<u64> {
    let id = take_slot(
        &mut superblock.free_blocks,
        &mut superblock.next_free_block,
        superblock.block_count,
        Resource::Blocks,
        |id| Ok(!map.is_used(id)),
    )?;
    map.set(id, true)?;
    superblock.modified = true;
    write_block(device, &superblock.layout(), id, &[0u8; BLOCK_SIZE])?;
    Ok(id)
}

pub fn free_block(superblock: &mut SuperBlock, map: &mut BlockMap, id: u64) -> Result<()> {
    if id == ROOT_BLOCK_ID {
        return Err(FsError::MalformedInput("block 0 belongs to the root directory".into()));
    }
    if !map.set(id, false)? {
        warn!("block {} released twice", id);
        return Ok(());
    }
    return_slot(&mut superblock.free_blocks, &mut superblock.next_free_block, Resource::Blocks, id);
    superblock.modified = true;
    Ok(())
}

/// Checks that `inodes` inodes and `blocks` blocks can be allocated right now.
pub fn ensure_free(superblock: &SuperBlock, inodes: u64, blocks: u64) -> Result<()> {
    if superblock.free_inodes < inodes {
        return Err(FsError::OutOfSpace(Resource::Inodes));
    }
    if superblock.free_blocks < blocks {
        return Err(FsError::OutOfSpace(Resource::Blocks));
    }
    Ok(())
}

/// Rebuilds the block bitmap from the inode table and reconciles the superblock's free counts
/// and cursors with what is actually on disk.
pub fn rebuild(device: &impl SectorDevice, superblock: &mut SuperBlock) -> Result<BlockMap> {
    let layout = superblock.layout();
    let mut map = BlockMap::new(superblock.block_count);
    let mut free_inodes = 0;

    for id in 0..superblock.inode_count {
        let inode = get_inode(device, &layout, id)?;
        if inode.is_free(id) {
            free_inodes += 1;
            continue;
        }
        for block_id in inode.block_ids(id) {
            if block_id >= superblock.block_count {
                return Err(FsError::CorruptRecord(format!(
                    "inode {} points at block {} beyond the block area",
                    id, block_id
                )));
            }
            if map.set(block_id, true)? {
                return Err(FsError::CorruptRecord(format!("block {} is owned twice (inode {})", block_id, id)));
            }
        }
    }
    let free_blocks = map.len() - map.used_count();

    if free_inodes != superblock.free_inodes || free_blocks != superblock.free_blocks {
        warn!(
            "superblock counts disagree with the image: inodes {} vs {}, blocks {} vs {}",
            superblock.free_inodes, free_inodes, superblock.free_blocks, free_blocks
        );
        superblock.free_inodes = free_inodes;
        superblock.free_blocks = free_blocks;
        superblock.modified = true;
    }

    if free_inodes > 0 {
        let cursor = superblock.next_free_inode;
        let found = scan_from(cursor, superblock.inode_count, |id| {
            Ok(get_inode(device, &layout, id)?.is_free(id))
        })?;
        if let Some(id) = found.filter(|&id| id != cursor) {
            warn!("inode cursor {} was not free, moved to {}", cursor, id);
            superblock.next_free_inode = id;
            superblock.modified = true;
        }
    }
    if free_blocks > 0 {
        let cursor = superblock.next_free_block;
        let found = scan_from(cursor, superblock.block_count, |id| Ok(!map.is_used(id)))?;
        if let Some(id) = found.filter(|&id| id != cursor) {
            warn!("block cursor {} was not free, moved to {}", cursor, id);
            superblock.next_free_block = id;
            superblock.modified = true;
        }
    }

    Ok(map)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_block_map() {
        let mut map = BlockMap::new(130);
        assert!(!map.is_used(129));
        assert_eq!(map.set(129, true).unwrap(), false);
        assert_eq!(map.set(129, true).unwrap(), true);
        assert!(map.is_used(129));
        assert_eq!(map.used_count(), 1);
        assert!(map.set(130, true).is_err());
        assert!(!map.is_used(1000));
    }

    #[test]
    fn test_take_slot_wraps() {
        // Slots 0 and 3 are free, cursor at 3.
        let used = [false, true, true, false];
        let (mut free, mut next) = (2, 3);
        let id = take_slot(&mut free, &mut next, 4, Resource::Blocks, |id| Ok(!used[id as usize])).unwrap();
        assert_eq!(id, 3);
        assert_eq!(next, 0);
        assert_eq!(free, 1);
    }

    #[test]
    fn test_take_slot_exhausted() {
        let (mut free, mut next) = (0, 2);
        let err = take_slot(&mut free, &mut next, 4, Resource::Inodes, |_| Ok(true)).unwrap_err();
        assert!(matches!(err, FsError::OutOfSpace(Resource::Inodes)));
        assert_eq!((free, next), (0, 2));
    }

    #[test]
    fn test_take_slot_stale_cursor() {
        let (mut free, mut next) = (1, 2);
        let err = take_slot(&mut free, &mut next, 4, Resource::Blocks, |id| Ok(id != 2)).unwrap_err();
        assert!(matches!(err, FsError::OutOfSpace(Resource::Blocks)));
        assert_eq!((free, next), (1, 2));
    }

    #[test]
    fn test_return_slot() {
        let (mut free, mut next) = (0, 5);
        return_slot(&mut free, &mut next, Resource::Blocks, 2);
        assert_eq!((free, next), (1, 2));
        return_slot(&mut free, &mut next, Resource::Blocks, 3);
        assert_eq!((free, next), (2, 2));
    }
}
