//! Fixed-layout serialization of the on-disk records.
//! Every integer is written big-endian, records are packed with no padding.
//!
//! - Superblock: 7 x i64 + 1 byte boolean
//! - Inode: 1 byte type tag + i64 size + 12 x i64 direct pointers + i64 indirect pointer
//! - Directory: 128 x 10 byte names, then 128 x i64 inode ids

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::*;

pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    fn encode(&self) -> Vec<u8>;

    /// Fails with `CorruptRecord` on a short buffer or out-of-range field.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn corrupt(what: &str) -> impl FnOnce(std::io::Error) -> FsError + '_ {
    move |e| FsError::CorruptRecord(format!("{}: {}", what, e))
}

fn write_u64(buf: &mut Vec<u8>, value: u64) {
    // Every field is bounded by the image size, far below i64::MAX.
    let mut raw = [0u8; 8];
    BigEndian::write_i64(&mut raw, i64::try_from(value).unwrap_or(i64::MAX));
    buf.extend_from_slice(&raw);
}

fn read_u64(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u64> {
    let value = cursor.read_i64::<BigEndian>().map_err(corrupt(what))?;
    u64::try_from(value).map_err(|_| FsError::CorruptRecord(format!("{}: negative value {}", what, value)))
}

fn check_len(bytes: &[u8], size: usize, what: &str) -> Result<()> {
    if bytes.len() < size {
        return Err(FsError::CorruptRecord(format!(
            "{}: need {} bytes, got {}",
            what,
            size,
            bytes.len()
        )));
    }
    Ok(())
}

impl Record for SuperBlock {
    const SIZE: usize = SUPERBLOCK_SIZE;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        for field in [
            self.fs_size,
            self.block_count,
            self.free_blocks,
            self.next_free_block,
            self.inode_count,
            self.free_inodes,
            self.next_free_inode,
        ] {
            write_u64(&mut buf, field);
        }
        buf.push(self.modified as u8);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(bytes, Self::SIZE, "superblock")?;
        let mut cursor = Cursor::new(bytes);
        let fs_size = read_u64(&mut cursor, "superblock size")?;
        let block_count = read_u64(&mut cursor, "superblock block count")?;
        let free_blocks = read_u64(&mut cursor, "superblock free blocks")?;
        let next_free_block = read_u64(&mut cursor, "superblock block cursor")?;
        let inode_count = read_u64(&mut cursor, "superblock inode count")?;
        let free_inodes = read_u64(&mut cursor, "superblock free inodes")?;
        let next_free_inode = read_u64(&mut cursor, "superblock inode cursor")?;
        let modified = match cursor.read_u8().map_err(corrupt("superblock flag"))? {
            0 => false,
            1 => true,
            other => return Err(FsError::CorruptRecord(format!("superblock flag {}", other))),
        };
        Ok(SuperBlock {
            fs_size,
            block_count,
            free_blocks,
            next_free_block,
            inode_count,
            free_inodes,
            next_free_inode,
            modified,
        })
    }
}

impl Record for Inode {
    const SIZE: usize = INODE_SIZE;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.ftype as u8);
        write_u64(&mut buf, self.size);
        for &ptr in self.direct_ptrs() {
            write_u64(&mut buf, ptr);
        }
        write_u64(&mut buf, self.indirect_ptr);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(bytes, Self::SIZE, "inode")?;
        let mut cursor = Cursor::new(bytes);
        let ftype = FileType::try_from(cursor.read_u8().map_err(corrupt("inode type"))?)?;
        let size = read_u64(&mut cursor, "inode size")?;
        let mut direct_ptrs = [0; NUM_DIRECT_PTRS];
        for ptr in direct_ptrs.iter_mut() {
            *ptr = read_u64(&mut cursor, "inode direct pointer")?;
        }
        let indirect_ptr = read_u64(&mut cursor, "inode indirect pointer")?;
        Ok(Inode::from_raw(ftype, size, direct_ptrs, indirect_ptr))
    }
}

impl Record for Directory {
    const SIZE: usize = DIRECTORY_SIZE;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        for name in self.names.iter() {
            buf.extend_from_slice(name);
        }
        for &id in self.inode_ids.iter() {
            write_u64(&mut buf, id);
        }
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(bytes, Self::SIZE, "directory")?;
        let mut cursor = Cursor::new(bytes);
        let mut dir = Directory::default();
        for name in dir.names.iter_mut() {
            cursor.read_exact(name).map_err(corrupt("directory name"))?;
        }
        for id in dir.inode_ids.iter_mut() {
            *id = read_u64(&mut cursor, "directory inode id")?;
        }
        Ok(dir)
    }
}

/// Copies `data` into a zero-filled block. Longer input is rejected.
pub fn to_block(data: &[u8]) -> Result<Box<Block>> {
    let mut block = Box::new([0u8; BLOCK_SIZE]);
    let mut cursor = Cursor::new(block.as_mut_slice());
    cursor.write_all(data).map_err(|_| FsError::FileTooLarge {
        requested: data.len().div_ceil(BLOCK_SIZE),
        capacity: 1,
    })?;
    Ok(block)
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn arb_ftype() -> impl Strategy<Value = FileType> {
        prop_oneof![
            Just(FileType::Regular),
            Just(FileType::Directory),
            Just(FileType::Symlink),
        ]
    }

    proptest! {
        #[test]
        fn superblock_round_trip(fields in proptest::array::uniform7(0..i64::MAX as u64), modified: bool) {
            let sb = SuperBlock {
                fs_size: fields[0],
                block_count: fields[1],
                free_blocks: fields[2],
                next_free_block: fields[3],
                inode_count: fields[4],
                free_inodes: fields[5],
                next_free_inode: fields[6],
                modified,
            };
            let bytes = sb.encode();
            prop_assert_eq!(bytes.len(), SuperBlock::SIZE);
            prop_assert_eq!(SuperBlock::decode(&bytes).unwrap(), sb);
        }

        #[test]
        fn inode_round_trip(
            ftype in arb_ftype(),
            size in 0..i64::MAX as u64,
            ptrs in proptest::array::uniform12(0..i64::MAX as u64),
        ) {
            let inode = Inode::from_raw(ftype, size, ptrs, 0);
            let bytes = inode.encode();
            prop_assert_eq!(bytes.len(), Inode::SIZE);
            prop_assert_eq!(Inode::decode(&bytes).unwrap(), inode);
        }

        #[test]
        fn directory_round_trip(
            slots in proptest::collection::vec((proptest::array::uniform10(any::<u8>()), 0..i64::MAX as u64), DIR_CAPACITY),
        ) {
            let mut dir = Directory::default();
            for (i, (name, id)) in slots.into_iter().enumerate() {
                dir.names[i] = name;
                dir.inode_ids[i] = id;
            }
            let bytes = dir.encode();
            prop_assert_eq!(bytes.len(), Directory::SIZE);
            prop_assert_eq!(Directory::decode(&bytes).unwrap(), dir);
        }
    }

    #[test]
    fn test_byte_order() {
        let sb = SuperBlock { fs_size: 0x0102, ..Default::default() };
        let bytes = sb.encode();
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_short_buffer() {
        let bytes = Inode::new(FileType::Directory).encode();
        let err = Inode::decode(&bytes[..Inode::SIZE - 1]).unwrap_err();
        assert!(matches!(err, FsError::CorruptRecord(_)));
    }

    #[test]
    fn test_bad_tags() {
        let mut bytes = Inode::FREE.encode();
        bytes[0] = 7;
        assert!(matches!(Inode::decode(&bytes), Err(FsError::CorruptRecord(_))));

        let mut bytes = SuperBlock::default().encode();
        bytes[SuperBlock::SIZE - 1] = 2;
        assert!(matches!(SuperBlock::decode(&bytes), Err(FsError::CorruptRecord(_))));

        let mut bytes = SuperBlock::default().encode();
        bytes[0] = 0x80; // Negative size
        assert!(matches!(SuperBlock::decode(&bytes), Err(FsError::CorruptRecord(_))));
    }

    #[test]
    fn test_sizes() {
        assert_eq!(SuperBlock::SIZE, 57);
        assert_eq!(Inode::SIZE, 113);
        assert_eq!(Directory::SIZE, 2304);
    }
}
