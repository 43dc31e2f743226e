pub const SECTOR_SIZE: usize = 1024; // Smallest addressable unit of the backing image
pub const BLOCK_SIZE: usize = 4 * 1024;

pub const ROOT_INODE_ID: u64 = 0; // Inode ID for the root directory
pub const ROOT_BLOCK_ID: u64 = 0; // First block of the root directory, never handed out again

pub const NUM_DIRECT_PTRS: usize = 12; // Number of direct pointers in an inode
pub const MAX_FILE_BLOCKS: usize = NUM_DIRECT_PTRS;
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

pub const DIR_CAPACITY: usize = 128; // Number of (name, inode id) slots per directory
pub const NAME_LEN: usize = 10; // Fixed width of a name slot, zero padded
pub const DOT_NAME: &str = ".";
pub const DOTDOT_NAME: &str = "..";

// Encoded sizes of the fixed-layout records, big-endian and packed.
pub const SUPERBLOCK_SIZE: usize = 7 * 8 + 1;
pub const INODE_SIZE: usize = 1 + 8 + NUM_DIRECT_PTRS * 8 + 8;
pub const DIRECTORY_SIZE: usize = DIR_CAPACITY * NAME_LEN + DIR_CAPACITY * 8;

/// Number of whole sectors a record of `bytes` occupies.
pub const fn sectors_for(bytes: usize) -> u64 {
    bytes.div_ceil(SECTOR_SIZE) as u64
}

pub const SUPERBLOCK_SECTORS: u64 = sectors_for(SUPERBLOCK_SIZE);
pub const INODE_SECTORS: u64 = sectors_for(INODE_SIZE);
pub const BLOCK_SECTORS: u64 = sectors_for(BLOCK_SIZE);

/// Blocks needed to hold one serialized directory table.
pub const DIRECTORY_BLOCKS: usize = DIRECTORY_SIZE.div_ceil(BLOCK_SIZE);
