//! # 内存区数据结构层
//!
//! ramfs 的内存区布局：
//! 超级块 | inode 区域 | 数据块位图 | 数据块区域

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{Cursor, DiskInode, InodeKind, InodeStatus};
pub use inode::{MAX_FILE_BLOCKS, MAX_FILE_SIZE};

/// 目录项，也属于内存区数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, ENTRIES_PER_BLOCK, NAME_MAX_LEN};

pub use crate::region::BlockId;

#[cfg(test)]
mod tests {
    use core::mem;

    use super::inode::INDIRECT_COUNT;
    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn layout() {
        assert!(mem::size_of::<SuperBlock>() <= BLOCK_SIZE);
        assert_eq!(60, mem::size_of::<DiskInode>());
        assert_eq!(16, mem::size_of::<DirEntry>());
        assert_eq!(BLOCK_SIZE, INDIRECT_COUNT * mem::size_of::<BlockId>());
        assert_eq!(4168, MAX_FILE_BLOCKS);
    }
}
