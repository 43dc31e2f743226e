use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::bitmap::{BlockMap, alloc_block, alloc_inode, claim_root, ensure_free, free_block, free_inode, rebuild};
use crate::block_dev::SectorDevice;
use crate::config::*;
use crate::directory::{decode_dir, encode_dir, validate_name};
use crate::error::{FsError, Result};
use crate::file::{FileDescriptor, OpenFileTable, fread, fwrite};
use crate::inode::{get_inode, write_inode};
use crate::layout::Layout;
use crate::path::{normalize, resolve};
use crate::superblock::{read_superblock, write_superblock};
use crate::structs::*;

/// One mounted session over an image: the in-memory superblock, block usage map,
/// current directory and open file table.
/// Methods take `&mut self`; callers sharing a session across threads wrap it in a lock.
#[derive(Debug)]
pub struct FileSystem<D: SectorDevice> {
    device: Arc<D>,
    superblock: SuperBlock,
    block_map: BlockMap,
    cwd_id: u64,
    cwd_path: String,
    open_files: OpenFileTable,
    orphans: HashSet<u64>, // Unlinked while still open, reclaimed on last close
}

impl<D: SectorDevice> FileSystem<D> {
    /// Lays out a fresh filesystem of `inode_quantity` inodes in `image_size` bytes and
    /// returns it mounted, with the root directory as current directory.
    pub fn format(device: Arc<D>, inode_quantity: u64, image_size: u64) -> Result<Self> {
        let mut superblock = SuperBlock::new(inode_quantity, image_size)?;
        let layout = superblock.layout();
        device.set_len(image_size.max(layout.span_bytes()?))?;

        for id in 0..inode_quantity {
            write_inode(&*device, &layout, id, &Inode::FREE)?;
        }

        let block_map = BlockMap::new(superblock.block_count);
        claim_root(&mut superblock);
        let mut fs = Self {
            device,
            superblock,
            block_map,
            cwd_id: ROOT_INODE_ID,
            cwd_path: "/".into(),
            open_files: OpenFileTable::new(),
            orphans: HashSet::new(),
        };
        fs.make_dir_inode(ROOT_INODE_ID, None)?;
        write_superblock(&*fs.device, &mut fs.superblock)?;

        info!(
            "formatted {} bytes: {} inodes, {} blocks of {} bytes",
            image_size, inode_quantity, fs.superblock.block_count, BLOCK_SIZE
        );
        Ok(fs)
    }

    /// Loads the superblock and resets the session to the root directory.
    /// A corrupted superblock is the one unrecoverable condition.
    pub fn mount(device: Arc<D>) -> Result<Self> {
        let mut superblock = read_superblock(&*device)?;
        let root = get_inode(&*device, &superblock.layout(), ROOT_INODE_ID)?;
        if root.ftype != FileType::Directory {
            return Err(FsError::CorruptRecord(format!("root inode is a {:?}", root.ftype)));
        }
        let block_map = rebuild(&*device, &mut superblock)?;
        if superblock.modified {
            write_superblock(&*device, &mut superblock)?;
        }
        info!(
            "mounted: {} inodes ({} free), {} blocks ({} free)",
            superblock.inode_count, superblock.free_inodes, superblock.block_count, superblock.free_blocks
        );
        Ok(Self {
            device,
            superblock,
            block_map,
            cwd_id: ROOT_INODE_ID,
            cwd_path: "/".into(),
            open_files: OpenFileTable::new(),
            orphans: HashSet::new(),
        })
    }

    /// Flushes the superblock unconditionally and hands the device back.
    /// Open descriptors are dropped; inodes unlinked while open are reclaimed first.
    pub fn unmount(mut self) -> Result<Arc<D>> {
        if !self.open_files.is_empty() {
            warn!("unmounting with {} open descriptors", self.open_files.len());
        }
        self.open_files = OpenFileTable::new();
        let orphans: Vec<u64> = self.orphans.drain().collect();
        for id in orphans {
            self.reclaim(id)?;
        }
        write_superblock(&*self.device, &mut self.superblock)?;
        info!("unmounted");
        Ok(self.device)
    }

    /// Writes the superblock now, dirty or not.
    pub fn save(&mut self) -> Result<()> {
        write_superblock(&*self.device, &mut self.superblock)
    }

    /// Flushes the superblock if an allocation changed it.
    fn commit(&mut self) -> Result<()> {
        if self.superblock.modified {
            write_superblock(&*self.device, &mut self.superblock)?;
        }
        Ok(())
    }

    fn layout(&self) -> Layout {
        self.superblock.layout()
    }

    pub fn get_inode(&self, inode_id: u64) -> Result<Inode> {
        get_inode(&*self.device, &self.layout(), inode_id)
    }

    fn put_inode(&self, inode_id: u64, inode: &Inode) -> Result<()> {
        write_inode(&*self.device, &self.layout(), inode_id, inode)
    }

    fn read_directory(&self, inode_id: u64) -> Result<(Vec<u64>, Directory)> {
        let inode = self.get_inode(inode_id)?;
        if inode.ftype != FileType::Directory {
            return Err(FsError::WrongType { expected: FileType::Directory, found: inode.ftype });
        }
        let block_ids = inode.block_ids(inode_id);
        let dir = decode_dir(&*self.device, &self.layout(), &block_ids)?;
        Ok((block_ids, dir))
    }

    fn write_directory(&self, block_ids: &[u64], dir: &Directory) -> Result<()> {
        encode_dir(&*self.device, &self.layout(), block_ids, dir)
    }

    /// Current directory table, checked to have room for one more `name`.
    fn cwd_for_insert(&self, name: &str) -> Result<(Vec<u64>, Directory)> {
        validate_name(name)?;
        let (block_ids, dir) = self.read_directory(self.cwd_id)?;
        if dir.lookup(name).is_some() {
            return Err(FsError::AlreadyExists(name.into()));
        }
        if dir.is_full() {
            return Err(FsError::DirectoryFull);
        }
        Ok((block_ids, dir))
    }

    /// Allocates the blocks of a new directory inode `inode_id` and writes its empty table.
    /// Every directory but the root starts with a `..` entry to its parent.
    fn make_dir_inode(&mut self, inode_id: u64, parent: Option<u64>) -> Result<()> {
        ensure_free(&self.superblock, 0, DIRECTORY_BLOCKS as u64)?;
        let mut inode = Inode::new(FileType::Directory);
        inode.size = DIRECTORY_SIZE as u64;
        let mut block_ids = Vec::with_capacity(DIRECTORY_BLOCKS);
        for slot in 0..DIRECTORY_BLOCKS {
            let block_id = alloc_block(&*self.device, &mut self.superblock, &mut self.block_map)?;
            inode.set_direct_ptr(slot, block_id)?;
            block_ids.push(block_id);
        }
        debug!("directory inode {} on blocks {:?}", inode_id, block_ids);
        self.put_inode(inode_id, &inode)?;
        let dir = match parent {
            Some(parent_id) => Directory::with_parent(parent_id),
            None => Directory::new(),
        };
        self.write_directory(&block_ids, &dir)
    }

    pub fn stat(&self, inode_id: u64) -> Result<Stat> {
        let inode = self.get_inode(inode_id)?;
        Ok(Stat {
            inode_id,
            ftype: inode.ftype,
            size: inode.size,
            direct_ptrs: *inode.direct_ptrs(),
            indirect_ptr: inode.indirect_ptr,
        })
    }

    /// Resolves `path`, absolute or relative to the current directory.
    pub fn lookup(&self, path: &str) -> Result<(Inode, u64)> {
        resolve(&*self.device, &self.layout(), self.cwd_id, path)
    }

    /// Entries of the current directory, `..` included.
    pub fn list(&self) -> Result<Vec<DirEntry>> {
        Ok(self.read_directory(self.cwd_id)?.1.entries())
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let (_, inode_id) = self.lookup(path)?;
        Ok(self.read_directory(inode_id)?.1.entries())
    }

    /// Creates an empty regular file `name` in the current directory.
    pub fn create(&mut self, name: &str) -> Result<u64> {
        let (block_ids, mut dir) = self.cwd_for_insert(name)?;
        ensure_free(&self.superblock, 1, 1)?;

        let inode_id = alloc_inode(&*self.device, &mut self.superblock)?;
        let block_id = alloc_block(&*self.device, &mut self.superblock, &mut self.block_map)?;
        let mut inode = Inode::new(FileType::Regular);
        inode.set_direct_ptr(0, block_id)?;
        self.put_inode(inode_id, &inode)?;

        dir.append_entry(name, inode_id)?;
        self.write_directory(&block_ids, &dir)?;
        self.commit()?;
        debug!("created {:?} as inode {} in {}", name, inode_id, self.cwd_path);
        Ok(inode_id)
    }

    /// Creates directory `name` in the current directory.
    pub fn mkdir(&mut self, name: &str) -> Result<u64> {
        let (block_ids, mut dir) = self.cwd_for_insert(name)?;
        ensure_free(&self.superblock, 1, DIRECTORY_BLOCKS as u64)?;

        let inode_id = alloc_inode(&*self.device, &mut self.superblock)?;
        self.make_dir_inode(inode_id, Some(self.cwd_id))?;

        dir.append_entry(name, inode_id)?;
        self.write_directory(&block_ids, &dir)?;
        self.commit()?;
        debug!("created directory {:?} as inode {} in {}", name, inode_id, self.cwd_path);
        Ok(inode_id)
    }

    /// Hard link: adds `new_name` in the current directory for the inode at `existing`.
    pub fn link(&mut self, existing: &str, new_name: &str) -> Result<u64> {
        let (target, inode_id) = self.lookup(existing)?;
        if target.ftype == FileType::Directory {
            return Err(FsError::WrongType { expected: FileType::Regular, found: target.ftype });
        }
        let (block_ids, mut dir) = self.cwd_for_insert(new_name)?;
        dir.append_entry(new_name, inode_id)?;
        self.write_directory(&block_ids, &dir)?;
        debug!("linked {:?} -> inode {}", new_name, inode_id);
        Ok(inode_id)
    }

    /// Removes file entry `name` from the current directory. The inode and its blocks are
    /// reclaimed once no entry and no descriptor refers to it.
    pub fn unlink(&mut self, name: &str) -> Result<()> {
        self.remove(name, false)
    }

    /// Removes empty directory `name` from the current directory and reclaims it.
    pub fn rmdir(&mut self, name: &str) -> Result<()> {
        if name == DOTDOT_NAME || name == DOT_NAME {
            return Err(FsError::MalformedInput(format!("cannot remove {:?}", name)));
        }
        self.remove(name, true)
    }

    fn remove(&mut self, name: &str, directory: bool) -> Result<()> {
        let (block_ids, mut dir) = self.read_directory(self.cwd_id)?;
        let wanted = |ftype: FileType| (ftype == FileType::Directory) == directory;

        let first = dir.lookup(name).ok_or_else(|| FsError::NotFound(name.into()))?;
        let found = self.get_inode(first)?.ftype;
        if !wanted(found) {
            let expected = if directory { FileType::Directory } else { FileType::Regular };
            return Err(FsError::WrongType { expected, found });
        }

        let removed = dir.remove_entry(name, |id| Ok(wanted(self.get_inode(id)?.ftype)))?;
        let Some((_, inode_id)) = removed else {
            return Err(FsError::NotFound(name.into()));
        };
        if directory {
            let (_, target) = self.read_directory(inode_id)?;
            if target.has_children() {
                return Err(FsError::DirectoryNotEmpty(name.into()));
            }
        }

        self.write_directory(&block_ids, &dir)?;
        debug!("removed {:?} (inode {}) from {}", name, inode_id, self.cwd_path);
        self.release(inode_id)?;
        self.commit()
    }

    /// Reclaims `inode_id` if nothing refers to it anymore.
    fn release(&mut self, inode_id: u64) -> Result<()> {
        if self.count_links(inode_id)? > 0 {
            return Ok(());
        }
        if self.open_files.is_open(inode_id) {
            debug!("inode {} unlinked while open, deferring reclaim", inode_id);
            self.orphans.insert(inode_id);
            return Ok(());
        }
        self.reclaim(inode_id)
    }

    fn reclaim(&mut self, inode_id: u64) -> Result<()> {
        let inode = self.get_inode(inode_id)?;
        for block_id in inode.block_ids(inode_id) {
            free_block(&mut self.superblock, &mut self.block_map, block_id)?;
        }
        free_inode(&*self.device, &mut self.superblock, inode_id)?;
        debug!("reclaimed inode {}", inode_id);
        Ok(())
    }

    /// Number of directory entries across the whole tree that name `inode_id`.
    fn count_links(&self, inode_id: u64) -> Result<usize> {
        let mut links = 0;
        let mut pending = vec![ROOT_INODE_ID];
        let mut seen = HashSet::new();
        while let Some(dir_id) = pending.pop() {
            if !seen.insert(dir_id) {
                continue;
            }
            let (_, dir) = self.read_directory(dir_id)?;
            links += dir.count_refs(inode_id);
            for entry in dir.entries() {
                if entry.name != DOTDOT_NAME && self.get_inode(entry.inode_id)?.ftype == FileType::Directory {
                    pending.push(entry.inode_id);
                }
            }
        }
        Ok(links)
    }

    /// Resizes the file at `path` to `block_count` blocks, allocating new blocks into unused
    /// direct pointers or releasing trailing ones.
    pub fn truncate(&mut self, path: &str, block_count: usize) -> Result<()> {
        if block_count == 0 {
            return Err(FsError::MalformedInput("a file keeps at least one block".into()));
        }
        if block_count > MAX_FILE_BLOCKS {
            return Err(FsError::FileTooLarge { requested: block_count, capacity: MAX_FILE_BLOCKS });
        }
        let (mut inode, inode_id) = self.lookup(path)?;
        if inode.ftype == FileType::Directory {
            return Err(FsError::WrongType { expected: FileType::Regular, found: inode.ftype });
        }

        let current = inode.block_ids(inode_id).len();
        if block_count > current {
            ensure_free(&self.superblock, 0, (block_count - current) as u64)?;
            for slot in current..block_count {
                let block_id = alloc_block(&*self.device, &mut self.superblock, &mut self.block_map)?;
                inode.set_direct_ptr(slot, block_id)?;
            }
        } else {
            for slot in block_count..current {
                if let Some(block_id) = inode.direct_ptr(slot) {
                    free_block(&mut self.superblock, &mut self.block_map, block_id)?;
                }
                inode.set_direct_ptr(slot, 0)?;
            }
            inode.size = inode.size.min((block_count * BLOCK_SIZE) as u64);
        }
        self.put_inode(inode_id, &inode)?;
        self.commit()?;
        debug!("truncated inode {} from {} to {} blocks", inode_id, current, block_count);
        Ok(())
    }

    /// Changes the current directory. Relative paths are taken against the current directory.
    /// A rejected change leaves the session where it was.
    pub fn cd(&mut self, path: &str) -> Result<()> {
        let target = normalize(&self.cwd_path, path).inspect_err(|e| warn!("cd {:?}: {}", path, e))?;
        // Every component must exist on disk, `..` included; the text form only names the result.
        let (inode, inode_id) = resolve(&*self.device, &self.layout(), self.cwd_id, path)
            .inspect_err(|e| warn!("cd {:?}: {}", path, e))?;
        if inode.ftype != FileType::Directory {
            warn!("cd {:?}: not a directory", path);
            return Err(FsError::WrongType { expected: FileType::Directory, found: inode.ftype });
        }
        self.cwd_id = inode_id;
        self.cwd_path = target;
        Ok(())
    }

    pub fn pwd(&self) -> &str {
        &self.cwd_path
    }

    pub fn cwd_inode_id(&self) -> u64 {
        self.cwd_id
    }

    /// Opens the file at `path` and returns its descriptor index.
    pub fn open(&mut self, path: &str) -> Result<usize> {
        let (inode, inode_id) = self.lookup(path)?;
        if inode.ftype == FileType::Directory {
            return Err(FsError::WrongType { expected: FileType::Regular, found: inode.ftype });
        }
        let fd = self.open_files.open(inode_id);
        debug!("opened {:?} (inode {}) as fd {}", path, inode_id, fd);
        Ok(fd)
    }

    /// Closes descriptor `fd`; later descriptors shift down by one.
    pub fn close(&mut self, fd: usize) -> Result<()> {
        let desc = self.open_files.close(fd)?;
        if !self.open_files.is_open(desc.inode_id) && self.orphans.remove(&desc.inode_id) {
            self.reclaim(desc.inode_id)?;
            self.commit()?;
        }
        Ok(())
    }

    /// Whole content of the file behind `fd`, exactly `size` bytes.
    pub fn read(&self, fd: usize) -> Result<Vec<u8>> {
        let inode_id = self.open_files.get(fd)?.inode_id;
        let inode = self.get_inode(inode_id)?;
        fread(&*self.device, &self.layout(), &inode, inode_id)
    }

    /// Replaces the content of the file behind `fd`. The file must already own enough blocks.
    pub fn write(&mut self, fd: usize, data: &[u8]) -> Result<usize> {
        let inode_id = self.open_files.get(fd)?.inode_id;
        let mut inode = self.get_inode(inode_id)?;
        let written = fwrite(&*self.device, &self.layout(), &mut inode, inode_id, data)?;
        self.put_inode(inode_id, &inode)?;
        Ok(written)
    }

    pub fn open_files(&self) -> &[FileDescriptor] {
        self.open_files.entries()
    }

    pub fn root_inode_id(&self) -> u64 {
        ROOT_INODE_ID
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }

    /// One-line summary of geometry and free space.
    pub fn dump(&self) -> String {
        let sb = &self.superblock;
        format!(
            "size {} bytes, inodes {}/{} free (next {}), blocks {}/{} free (next {}), cwd {}, {} open",
            sb.fs_size,
            sb.free_inodes,
            sb.inode_count,
            sb.next_free_inode,
            sb.free_blocks,
            sb.block_count,
            sb.next_free_block,
            self.cwd_path,
            self.open_files.len()
        )
    }
}
