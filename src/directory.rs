//! Directory tables: a fixed array of (name, inode id) slots serialized across the directory
//! inode's blocks. An empty first name byte marks a free slot.

use crate::block_dev::SectorDevice;
use crate::codec::Record;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{read_blocks, write_blocks};
use crate::layout::Layout;
use crate::structs::*;

/// Bytes of a name slot up to its own zero terminator.
pub fn trim_zero(name: &[u8]) -> &[u8] {
    let end = name.iter().position(|&c| c == 0).unwrap_or(name.len());
    &name[..end]
}

/// Exact comparison: the slot must hold precisely `name`, not just share a prefix with it.
fn name_cmp(slot: &NameSlot, name: &[u8]) -> bool {
    trim_zero(slot) == name
}

/// Rejects names that cannot be stored in a slot or would be ambiguous in a path.
pub fn validate_name(name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NAME_LEN {
        return Err(FsError::MalformedInput(format!(
            "name {:?} must be 1 to {} bytes",
            name, NAME_LEN
        )));
    }
    if bytes.contains(&b'/') || bytes.contains(&0) {
        return Err(FsError::MalformedInput(format!("name {:?} contains '/' or NUL", name)));
    }
    if name == DOT_NAME || name == DOTDOT_NAME {
        return Err(FsError::MalformedInput(format!("name {:?} is reserved", name)));
    }
    Ok(())
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh table for a child of `parent_id`.
    pub fn with_parent(parent_id: u64) -> Self {
        let mut dir = Self::new();
        dir.names[0][..DOTDOT_NAME.len()].copy_from_slice(DOTDOT_NAME.as_bytes());
        dir.inode_ids[0] = parent_id;
        dir
    }

    pub fn slot_is_empty(&self, slot: usize) -> bool {
        self.names.get(slot).is_none_or(|name| name[0] == 0)
    }

    /// Live entry at `slot`, if any.
    pub fn entry(&self, slot: usize) -> Option<DirEntry> {
        if self.slot_is_empty(slot) {
            return None;
        }
        Some(DirEntry {
            name: String::from_utf8_lossy(trim_zero(&self.names[slot])).into_owned(),
            inode_id: self.inode_ids[slot],
        })
    }

    /// All live entries in slot order, `..` included.
    pub fn entries(&self) -> Vec<DirEntry> {
        (0..DIR_CAPACITY).filter_map(|slot| self.entry(slot)).collect()
    }

    pub fn len(&self) -> usize {
        (0..DIR_CAPACITY).filter(|&slot| !self.slot_is_empty(slot)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == DIR_CAPACITY
    }

    /// Slot holding exactly `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        (0..DIR_CAPACITY).find(|&slot| !self.slot_is_empty(slot) && name_cmp(&self.names[slot], name.as_bytes()))
    }

    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.find(name).map(|slot| self.inode_ids[slot])
    }

    /// Parent directory id, absent for the root.
    pub fn parent(&self) -> Option<u64> {
        self.lookup(DOTDOT_NAME)
    }

    /// Whether the table holds anything besides the `..` entry.
    pub fn has_children(&self) -> bool {
        self.entries().iter().any(|entry| entry.name != DOTDOT_NAME)
    }

    /// Fills the first empty slot. A full table is reported, never silently dropped.
    pub fn append_entry(&mut self, name: &str, inode_id: u64) -> Result<usize> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > NAME_LEN {
            return Err(FsError::MalformedInput(format!("name {:?} does not fit a slot", name)));
        }
        let slot = (0..DIR_CAPACITY)
            .find(|&slot| self.slot_is_empty(slot))
            .ok_or(FsError::DirectoryFull)?;
        self.names[slot] = [0; NAME_LEN];
        self.names[slot][..bytes.len()].copy_from_slice(bytes);
        self.inode_ids[slot] = inode_id;
        Ok(slot)
    }

    /// Clears the first slot named `name` whose target satisfies `matches_type`.
    /// `..` is never removed. Returns the freed slot and the inode id it pointed at.
    pub fn remove_entry(
        &mut self,
        name: &str,
        mut matches_type: impl FnMut(u64) -> Result<bool>,
    ) -> Result<Option<(usize, u64)>> {
        if name == DOTDOT_NAME {
            return Ok(None);
        }
        for slot in 0..DIR_CAPACITY {
            if self.slot_is_empty(slot) || !name_cmp(&self.names[slot], name.as_bytes()) {
                continue;
            }
            let inode_id = self.inode_ids[slot];
            if matches_type(inode_id)? {
                self.names[slot] = [0; NAME_LEN];
                self.inode_ids[slot] = 0;
                return Ok(Some((slot, inode_id)));
            }
        }
        Ok(None)
    }

    /// Number of live entries, `..` excluded, that point at `inode_id`.
    pub fn count_refs(&self, inode_id: u64) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.name != DOTDOT_NAME && entry.inode_id == inode_id)
            .count()
    }
}

/// Concatenates the blocks and reinterprets the leading `DIRECTORY_SIZE` bytes.
pub fn decode_dir(device: &impl SectorDevice, layout: &Layout, block_ids: &[u64]) -> Result<Directory> {
    let data = read_blocks(device, layout, block_ids)?;
    Directory::decode(&data)
}

/// Serializes the table one block-sized chunk per supplied id.
pub fn encode_dir(device: &impl SectorDevice, layout: &Layout, block_ids: &[u64], dir: &Directory) -> Result<()> {
    write_blocks(device, layout, block_ids, &dir.encode()).map_err(|e| match e {
        FsError::FileTooLarge { requested, capacity } => FsError::CorruptRecord(format!(
            "directory spans {} blocks but only {} were supplied",
            requested, capacity
        )),
        other => other,
    })?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_name_cmp() {
        let mut slot = [0u8; NAME_LEN];
        slot[..2].copy_from_slice(b"bx");
        assert!(name_cmp(&slot, b"bx"));
        assert!(!name_cmp(&slot, b"b"));
        assert!(!name_cmp(&slot, b"bxy"));

        let full = *b"abcdefghij";
        assert!(name_cmp(&full, b"abcdefghij"));
        assert!(!name_cmp(&full, b"abcdefghi"));
    }

    #[test]
    fn test_append_and_find() {
        let mut dir = Directory::with_parent(3);
        assert_eq!(dir.parent(), Some(3));
        assert!(!dir.has_children());
        let slot = dir.append_entry("a.txt", 5).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(dir.lookup("a.txt"), Some(5));
        assert_eq!(dir.lookup("a"), None);
        assert!(dir.has_children());
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_capacity() {
        let mut dir = Directory::new();
        for i in 0..DIR_CAPACITY {
            dir.append_entry(&format!("f{}", i), i as u64).unwrap();
        }
        assert!(dir.is_full());
        assert!(matches!(dir.append_entry("extra", 1), Err(FsError::DirectoryFull)));
        assert_eq!(dir.lookup("extra"), None);
    }

    #[test]
    fn test_remove_reuses_slot() {
        let mut dir = Directory::with_parent(0);
        dir.append_entry("x", 1).unwrap();
        dir.append_entry("y", 2).unwrap();
        assert_eq!(dir.remove_entry("x", |_| Ok(true)).unwrap(), Some((1, 1)));
        assert_eq!(dir.lookup("x"), None);
        assert_eq!(dir.append_entry("z", 3).unwrap(), 1);
    }

    #[test]
    fn test_remove_checks_type() {
        let mut dir = Directory::with_parent(0);
        dir.append_entry("x", 1).unwrap();
        assert_eq!(dir.remove_entry("x", |_| Ok(false)).unwrap(), None);
        assert_eq!(dir.lookup("x"), Some(1));
        assert_eq!(dir.remove_entry(DOTDOT_NAME, |_| Ok(true)).unwrap(), None);
        assert_eq!(dir.parent(), Some(0));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a.txt").is_ok());
        assert!(validate_name("abcdefghij").is_ok());
        assert!(validate_name("abcdefghijk").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
    }
}
