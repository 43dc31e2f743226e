//! Path resolution and manipulation utilities.

use log::trace;

use crate::block_dev::SectorDevice;
use crate::config::*;
use crate::directory::decode_dir;
use crate::error::{FsError, Result};
use crate::inode::get_inode;
use crate::layout::Layout;
use crate::structs::{FileType, Inode};

/// Splits `path` into components. Returns whether it is absolute.
/// `"/"` alone is the root; any other empty component (`//`, trailing `/`) is malformed.
pub fn components(path: &str) -> Result<(bool, Vec<&str>)> {
    if path.is_empty() {
        return Err(FsError::MalformedInput("empty path".into()));
    }
    if path == "/" {
        return Ok((true, Vec::new()));
    }
    let absolute = path.starts_with('/');
    let rest = if absolute { &path[1..] } else { path };
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(FsError::MalformedInput(format!("path {:?} has an empty component", path)));
    }
    Ok((absolute, parts))
}

/// Resolves `path` to an inode and its id.
/// Absolute paths start at the root, anything else at `cwd`.
pub fn resolve(device: &impl SectorDevice, layout: &Layout, cwd: u64, path: &str) -> Result<(Inode, u64)> {
    let (absolute, parts) = components(path)?;
    let mut current_id = if absolute { ROOT_INODE_ID } else { cwd };
    let mut current = get_inode(device, layout, current_id)?;

    for part in parts {
        if part == DOT_NAME {
            continue;
        }
        if current.ftype != FileType::Directory {
            return Err(FsError::WrongType { expected: FileType::Directory, found: current.ftype });
        }
        let dir = decode_dir(device, layout, &current.block_ids(current_id))?;
        let next_id = if part == DOTDOT_NAME {
            // The root has no `..` entry and is its own parent.
            dir.parent().unwrap_or(ROOT_INODE_ID)
        } else {
            dir.lookup(part)
                .ok_or_else(|| FsError::NotFound(format!("{:?} in {:?}", part, path)))?
        };
        trace!("resolve {:?}: {:?} -> inode {}", path, part, next_id);
        current = get_inode(device, layout, next_id)?;
        if current.is_free(next_id) {
            return Err(FsError::CorruptRecord(format!("entry {:?} points at free inode {}", part, next_id)));
        }
        current_id = next_id;
    }

    Ok((current, current_id))
}

/// Canonical absolute form of `path` taken relative to the absolute `cwd`.
/// A leading `.` must introduce `.`, `..`, `./...` or `../...`.
pub fn normalize(cwd: &str, path: &str) -> Result<String> {
    if path.starts_with('.') && !(path == "." || path == ".." || path.starts_with("./") || path.starts_with("../")) {
        return Err(FsError::MalformedInput(format!("bad relative marker in {:?}", path)));
    }
    let (absolute, parts) = components(path)?;
    let mut stack: Vec<&str> = Vec::new();
    if !absolute {
        stack.extend(components(cwd)?.1);
    }
    for part in parts {
        match part {
            "." => {}
            ".." => {
                stack.pop();
            }
            name => stack.push(name),
        }
    }
    Ok(format!("/{}", stack.join("/")))
}
