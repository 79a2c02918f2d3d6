#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* ramfs 的整体架构，自上而下 */

// 控制通道层：把外部请求解码为引擎调用
mod control;

// 引擎门面层：create/open/read/write 等操作，全部串行化在一把锁之后
mod ramdisk;

// 文件描述符层：按进程划分的描述符表
mod fd_table;

// 路径解析层
mod path;

// 目录层：把目录的数据块视为定长目录项数组
mod dir;

// 块与 inode 管理器层
mod rfs;

// 内存区数据结构层：超级块、inode、位图、目录项的布局
mod layout;

// 内存区层：一整块连续内存，按块寻址
mod region;

pub use self::{
    control::{Request, Response},
    fd_table::{FdTable, FileDescriptor},
    layout::{BlockId, Cursor, DirEntry, DiskInode, InodeKind, InodeStatus},
    layout::{ENTRIES_PER_BLOCK, MAX_FILE_BLOCKS, MAX_FILE_SIZE, NAME_MAX_LEN},
    path::Path,
    ramdisk::{OpenFlag, Pid, RamDisk},
    region::Region,
    rfs::{RamFileSystem, Usage},
};

pub type Result<T> = core::result::Result<T, vfs::Error>;

pub const MAGIC: u32 = 0x7261_6d31;
pub const BLOCK_SIZE: usize = 256;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 默认内存区大小：2 MiB
pub const RAMDISK_SIZE: usize = 2 * 1024 * 1024;
pub const DEFAULT_TOTAL_BLOCKS: u32 = (RAMDISK_SIZE / BLOCK_SIZE) as u32;
/// 默认 inode 区占用的块数
pub const DEFAULT_INODE_AREA_BLOCKS: u32 = 256;

/// 根目录的 inode 编号，同时是目录项的结束标记
pub const ROOT_INODE: u32 = 0;

/// 路径最长字节数
pub const PATH_MAX: usize = 256;
/// 每个进程最多同时打开的文件数
pub const MAX_OPEN_FILES: usize = 1024;

type DataBlock = [u8; BLOCK_SIZE];
