use thiserror::Error;

use crate::structs::FileType;

/// Allocation resource that ran dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inodes,
    Blocks,
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Resource::Inodes => write!(f, "inodes"),
            Resource::Blocks => write!(f, "blocks"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("out of space: no free {0} left")]
    OutOfSpace(Resource),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("wrong type: expected {expected:?}, found {found:?}")]
    WrongType { expected: FileType, found: FileType },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("directory is full")]
    DirectoryFull,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("file too large: {requested} blocks requested, {capacity} available")]
    FileTooLarge { requested: usize, capacity: usize },

    #[error("bad file descriptor: {0}")]
    BadDescriptor(usize),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Whether the error leaves the session usable. Only a corrupted record read from the image
    /// or a failing backing store is treated as fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FsError::CorruptRecord(_) | FsError::Io(_))
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
