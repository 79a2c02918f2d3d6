use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct Stat {
    /// Inode number
    pub inode: u64,
    pub mode: DirEntryType,
    /// Optimal I/O block size
    pub block_size: u64,
    /// Occupying data blocks, index blocks excluded
    pub blocks: u64,
    /// File size
    pub size: u64,
}
