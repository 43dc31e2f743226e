//! Blobfs is a small inode filesystem stored inside a single image file.
//! No permissions, timestamps or journaling: a flat record layout, fixed-size directories
//! and whole-file reads and writes.
//!
//! Blobfs's linear layout (big-endian records, sector aligned):
//! - Superblock
//! - Inode Table (one sector per inode)
//! - Data Blocks (four sectors per block)
//!
//! Blobfs's layers (from bottom to top):
//! 1. Sector Device: Byte access to the image at sector offsets.   | `ImageFile`, or user implemented
//! 2. Codec/Layout: Record encoding and where each record lives.   | Fs implemented
//! 3. Inode/Bitmap: Inode records, block I/O and free-space cursors.| Fs implemented
//! 4. Directory/Path: Directory tables and path resolution.        | Fs implemented
//! 5. File: Open file table and whole-file data access.            | Fs implemented
//! 6. FileSystem: The mounted session users operate on.            | Fs implemented

mod config;
mod block_dev;
mod structs;
mod codec;
mod layout;
mod bitmap;
mod superblock;
mod inode;
mod directory;
mod path;
mod file;
mod fs;
mod error;

pub use block_dev::{ImageFile, SectorDevice};
pub use config::*;
pub use codec::{Record, to_block};
pub use layout::Layout;
pub use bitmap::BlockMap;
pub use superblock::*;
pub use structs::*;
pub use inode::*;
pub use path::{components, normalize, resolve};
pub use directory::{decode_dir, encode_dir, trim_zero, validate_name};
pub use file::{DEFAULT_MODE, FileDescriptor, OpenFileTable, fread, fwrite};
pub use fs::FileSystem;
pub use error::FsError as Error;
pub use error::{Resource, Result};
