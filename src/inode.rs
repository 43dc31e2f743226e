//! Reading and writing of individual inodes and blocks at their computed sector offsets.

use log::trace;

use crate::block_dev::SectorDevice;
use crate::codec::{Record, to_block};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::layout::Layout;
use crate::structs::{Block, Inode};

pub fn get_inode(device: &impl SectorDevice, layout: &Layout, inode_id: u64) -> Result<Inode> {
    let offset = layout.inode_offset(inode_id)?;
    let mut buf = [0u8; INODE_SIZE];
    device.read_sector(offset, &mut buf)?;
    Inode::decode(&buf)
}

pub fn write_inode(device: &impl SectorDevice, layout: &Layout, inode_id: u64, inode: &Inode) -> Result<()> {
    let offset = layout.inode_offset(inode_id)?;
    trace!("write inode {} at sector {}: {:?}", inode_id, offset, inode);
    device.write_sector(offset, &inode.encode())
}

pub fn read_block(device: &impl SectorDevice, layout: &Layout, block_id: u64) -> Result<Box<Block>> {
    let offset = layout.block_offset(block_id)?;
    let mut block = Box::new([0u8; BLOCK_SIZE]);
    device.read_sector(offset, block.as_mut_slice())?;
    Ok(block)
}

pub fn write_block(device: &impl SectorDevice, layout: &Layout, block_id: u64, block: &Block) -> Result<()> {
    let offset = layout.block_offset(block_id)?;
    trace!("write block {} at sector {}", block_id, offset);
    device.write_sector(offset, block.as_slice())
}

/// Writes `data` into one block, zero-filling the remainder.
pub fn write_block_data(device: &impl SectorDevice, layout: &Layout, block_id: u64, data: &[u8]) -> Result<()> {
    write_block(device, layout, block_id, &*to_block(data)?)
}

/// Concatenates the content of `block_ids` in order.
pub fn read_blocks(device: &impl SectorDevice, layout: &Layout, block_ids: &[u64]) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(block_ids.len() * BLOCK_SIZE);
    for &block_id in block_ids {
        data.extend_from_slice(read_block(device, layout, block_id)?.as_slice());
    }
    Ok(data)
}

/// Splits `data` into block-sized chunks written one per id. Unused trailing ids are untouched.
/// Returns the number of blocks written.
pub fn write_blocks(device: &impl SectorDevice, layout: &Layout, block_ids: &[u64], data: &[u8]) -> Result<usize> {
    let needed = data.len().div_ceil(BLOCK_SIZE);
    if needed > block_ids.len() {
        return Err(FsError::FileTooLarge { requested: needed, capacity: block_ids.len() });
    }
    for (chunk, &block_id) in data.chunks(BLOCK_SIZE).zip(block_ids) {
        write_block_data(device, layout, block_id, chunk)?;
    }
    Ok(needed)
}
