use crate::MAGIC;
use crate::region::BlockId;

/// 超级块：
/// - 提供内存区合法性校验；
/// - 定位其它连续区域；
/// - 记录空闲块与空闲 inode 的计数
#[derive(Debug)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验内存区是否已经格式化
    magic: u32,
    /// 内存区占据块数
    pub total_blocks: u32,
    pub inode_area_start: BlockId,
    pub inode_area_blocks: u32,
    pub inode_count: u32,
    pub bitmap_start: BlockId,
    pub bitmap_blocks: u32,
    pub data_area_start: BlockId,
    pub data_blocks: u32,
    pub free_blocks: u32,
    /// 不含根目录
    pub free_inodes: u32,
}

impl SuperBlock {
    #[inline]
    pub fn init(
        &mut self,
        total_blocks: u32,
        inode_area_blocks: u32,
        inode_count: u32,
        bitmap_blocks: u32,
        data_blocks: u32,
    ) {
        let inode_area_start = BlockId::new(1);
        let bitmap_start = inode_area_start + inode_area_blocks;

        *self = Self {
            magic: MAGIC,
            total_blocks,
            inode_area_start,
            inode_area_blocks,
            inode_count,
            bitmap_start,
            bitmap_blocks,
            data_area_start: bitmap_start + bitmap_blocks,
            data_blocks,
            free_blocks: data_blocks,
            // 根目录不计入
            free_inodes: inode_count - 1,
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}
