//! # 块与 inode 管理器层
//!
//! 构建出内存区的布局并使用。

use core::mem;

use alloc::vec::Vec;
use vfs::Error;

use crate::layout::*;
use crate::region::Region;
use crate::{BLOCK_BITS, BLOCK_SIZE, ROOT_INODE, Result};

const INODE_SIZE: usize = mem::size_of::<DiskInode>();
const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

#[derive(Debug)]
pub struct RamFileSystem {
    region: Region,
    data_bitmap: Bitmap,
    inode_area_start: BlockId,
    data_area_start: BlockId,
    inode_count: u32,
}

/// 空间占用情况，两组计数分别来自超级块与对位图、inode 表的重新统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total_blocks: u32,
    pub data_blocks: u32,
    pub free_blocks: u32,
    /// 位图中已置位的数据块数
    pub allocated_blocks: u32,
    pub inode_count: u32,
    pub free_inodes: u32,
    /// inode 表中已分配的 inode 数，含根目录
    pub allocated_inodes: u32,
}

impl RamFileSystem {
    pub fn new(total_blocks: u32, inode_area_blocks: u32) -> Self {
        assert!(inode_area_blocks > 0, "no room for the root inode");
        assert!(
            total_blocks > 1 + inode_area_blocks + 1,
            "no room for the data area"
        );

        let inode_count = inode_area_blocks * INODES_PER_BLOCK as u32;
        // 目录项只留了 16 位给 inode 编号
        assert!(inode_count <= u16::MAX as u32 + 1, "too many inodes");

        let data_total_blocks = total_blocks - 1 - inode_area_blocks;
        let bitmap_blocks = (data_total_blocks + BLOCK_BITS as u32) / (BLOCK_BITS as u32 + 1);
        let data_blocks = data_total_blocks - bitmap_blocks;

        let mut region = Region::new(total_blocks as usize);
        let super_block = region.map_mut(BlockId::NULL, 0, |super_block: &mut SuperBlock| {
            super_block.init(
                total_blocks,
                inode_area_blocks,
                inode_count,
                bitmap_blocks,
                data_blocks,
            );
            (super_block.inode_area_start, super_block.bitmap_start, super_block.data_area_start)
        });
        let (inode_area_start, bitmap_start, data_area_start) = super_block;

        let mut rfs = Self {
            region,
            data_bitmap: Bitmap::new(bitmap_start, bitmap_blocks as usize, data_blocks as usize),
            inode_area_start,
            data_area_start,
            inode_count,
        };

        for id in 0..inode_count {
            rfs.update_inode(id, |disk_inode, _| disk_inode.id = id);
        }
        rfs.update_inode(ROOT_INODE, |root_inode, _| {
            root_inode.init(ROOT_INODE, InodeKind::Directory)
        });

        // 根目录从一开始就持有一个数据块
        if rfs.grow_inode(ROOT_INODE).is_err() {
            panic!("no room for the root directory");
        }

        log::debug!(
            "ramfs formatted: {total_blocks} blocks, {inode_count} inodes, {data_blocks} data blocks"
        );
        rfs
    }

    #[inline]
    pub fn region(&self) -> &Region {
        &self.region
    }

    #[inline]
    pub fn region_mut(&mut self) -> &mut Region {
        &mut self.region
    }

    #[inline]
    fn super_block(&self) -> &SuperBlock {
        self.region.get(BlockId::NULL, 0)
    }

    #[inline]
    fn super_block_mut(&mut self) -> &mut SuperBlock {
        self.region.get_mut(BlockId::NULL, 0)
    }

    #[inline]
    pub fn inode_count(&self) -> u32 {
        self.inode_count
    }

    /// 在内存区上分配新的数据块并返回其块号，块内容已清零
    pub fn alloc_data(&mut self) -> Result<BlockId> {
        let bit = self
            .data_bitmap
            .alloc(&mut self.region)
            .ok_or(Error::Exhausted)?;
        self.super_block_mut().free_blocks -= 1;

        let block_id = self.data_area_start + bit;
        self.region.zeroize(block_id);
        Ok(block_id)
    }

    pub fn dealloc_data(&mut self, block_id: BlockId) {
        assert!(block_id >= self.data_area_start, "{block_id:?} is not a data block");
        self.region.zeroize(block_id);
        self.data_bitmap.dealloc(
            &mut self.region,
            u32::from(block_id) - u32::from(self.data_area_start),
        );
        self.super_block_mut().free_blocks += 1;
    }

    /// 自 1 号起找到第一个空闲的 inode，初始化后返回其编号
    pub fn alloc_inode(&mut self, kind: InodeKind) -> Result<u32> {
        let id = (ROOT_INODE + 1..self.inode_count)
            .find(|&id| !self.disk_inode(id).is_allocated())
            .ok_or(Error::Exhausted)?;

        self.update_inode(id, |disk_inode, _| disk_inode.init(id, kind));
        self.super_block_mut().free_inodes -= 1;
        Ok(id)
    }

    /// 归还 inode，调用者须已释放它的全部数据块
    pub fn dealloc_inode(&mut self, id: u32) {
        assert_ne!(id, ROOT_INODE, "root inode is permanent");
        assert!(self.disk_inode(id).is_allocated(), "inode {id} is already free");

        self.update_inode(id, |disk_inode, _| disk_inode.release());
        self.super_block_mut().free_inodes += 1;
    }

    /// 通过ID获取 inode 在内存区上的位置：**块号**以及**块内偏移**
    pub fn disk_inode_pos(&self, inode_id: u32) -> (BlockId, usize) {
        let block_id = self.inode_area_start + inode_id / INODES_PER_BLOCK as u32;
        let block_inoffset = inode_id as usize % INODES_PER_BLOCK * INODE_SIZE;

        (block_id, block_inoffset)
    }

    /// 复制出 inode
    pub fn disk_inode(&self, inode_id: u32) -> DiskInode {
        assert!(inode_id < self.inode_count, "inode {inode_id} is outbound");
        let (block_id, offset) = self.disk_inode_pos(inode_id);
        *self.region.get(block_id, offset)
    }

    /// 复制出 inode 交给 `f` 修改，再写回原处
    pub fn update_inode<V>(
        &mut self,
        inode_id: u32,
        f: impl FnOnce(&mut DiskInode, &mut Region) -> V,
    ) -> V {
        let mut disk_inode = self.disk_inode(inode_id);
        let ret = f(&mut disk_inode, &mut self.region);

        let (block_id, offset) = self.disk_inode_pos(inode_id);
        *self.region.get_mut(block_id, offset) = disk_inode;
        ret
    }

    /// 在 inode 末尾挂载一个新数据块并返回它。
    ///
    /// 这一步需要的块（含索引块）要么全部到手，要么一个都不留。
    pub fn grow_inode(&mut self, inode_id: u32) -> Result<BlockId> {
        let cost = self
            .disk_inode(inode_id)
            .growth_cost()
            .ok_or(Error::Exhausted)?;

        let data = self.alloc_data()?;
        let mut index_blocks = Vec::with_capacity(cost - 1);
        for _ in 1..cost {
            match self.alloc_data() {
                Ok(block_id) => index_blocks.push(block_id),
                Err(err) => {
                    for block_id in index_blocks.into_iter().chain([data]) {
                        self.dealloc_data(block_id);
                    }
                    return Err(err);
                }
            }
        }

        self.update_inode(inode_id, |disk_inode, region| {
            disk_inode.expand(data, &index_blocks, region)
        });
        Ok(data)
    }

    /// 弹出 inode 的最后一个数据块，连同变空的索引块一并释放。
    /// 返回是否真的弹出了块。
    pub fn shrink_inode(&mut self, inode_id: u32) -> bool {
        let released = self.update_inode(inode_id, |disk_inode, region| disk_inode.shrink(region));
        let shrunk = !released.is_empty();
        for block_id in released {
            self.dealloc_data(block_id);
        }
        shrunk
    }

    /// 释放 inode 的全部数据块与索引块
    pub fn clear_inode(&mut self, inode_id: u32) {
        let blocks = self.disk_inode(inode_id).blocks as usize;
        let released = self.update_inode(inode_id, |disk_inode, region| disk_inode.clear(region));
        assert_eq!(released.len(), DiskInode::count_total_block(blocks));

        for block_id in released {
            self.dealloc_data(block_id);
        }
    }

    /// 把文件截断为空，保留第一个数据块
    pub fn truncate(&mut self, inode_id: u32) {
        while self.disk_inode(inode_id).blocks > 1 {
            self.shrink_inode(inode_id);
        }

        let first = self.update_inode(inode_id, |disk_inode, region| {
            disk_inode.size = 0;
            disk_inode.block_id(0, region)
        });
        if let Some(first) = first.get() {
            self.region.zeroize(first);
        }
    }

    /// 从 `position` 起读入 `buf`，读到文件末尾为止
    pub fn read_at(&self, inode_id: u32, position: usize, buf: &mut [u8]) -> Result<usize> {
        let disk_inode = self.disk_inode(inode_id);
        let end = (disk_inode.size as usize).min(position + buf.len());
        if position >= end {
            return Ok(0);
        }

        let mut position = position;
        let mut read = 0;
        while position < end {
            let cursor = disk_inode.translate(position, &self.region)?;
            let len = cursor.remaining.min(end - position);

            let src = &self.region.data(cursor.block)[cursor.offset..cursor.offset + len];
            buf[read..read + len].copy_from_slice(src);

            read += len;
            position += len;
        }

        Ok(read)
    }

    /// 从 `*position` 起写入 `buf`，写满已挂载的块就扩容。
    ///
    /// `*position` 随写入推进；扩容失败时已写入的字节保留，返回 [`Error::NoSpace`]。
    pub fn write_at(&mut self, inode_id: u32, position: &mut usize, buf: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if *position == self.disk_inode(inode_id).capacity() {
                if let Err(err) = self.grow_inode(inode_id) {
                    log::warn!("inode {inode_id} cannot grow past {position} bytes: {err:?}");
                    return Err(Error::NoSpace);
                }
            }

            let cursor = self.disk_inode(inode_id).translate(*position, &self.region)?;
            let len = cursor.remaining.min(buf.len() - written);

            let dst = &mut self.region.data_mut(cursor.block)[cursor.offset..cursor.offset + len];
            dst.copy_from_slice(&buf[written..written + len]);

            written += len;
            *position += len;
            let end = *position as u32;
            self.update_inode(inode_id, |disk_inode, _| {
                disk_inode.size = disk_inode.size.max(end)
            });
        }

        Ok(written)
    }

    pub fn usage(&self) -> Usage {
        let super_block = self.super_block();
        debug_assert!(super_block.is_valid(), "super block magic is damaged");
        Usage {
            total_blocks: super_block.total_blocks,
            data_blocks: super_block.data_blocks,
            free_blocks: super_block.free_blocks,
            allocated_blocks: self.data_bitmap.count_allocated(&self.region) as u32,
            inode_count: super_block.inode_count,
            free_inodes: super_block.free_inodes,
            allocated_inodes: (0..self.inode_count)
                .filter(|&id| self.disk_inode(id).is_allocated())
                .count() as u32,
        }
    }
}

impl Usage {
    /// 两组计数是否吻合
    pub fn is_consistent(&self) -> bool {
        self.allocated_blocks == self.data_blocks - self.free_blocks
            && self.allocated_inodes == self.inode_count - self.free_inodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECT_BLOCKS: u32 = 8;

    #[test]
    fn default_geometry() {
        let rfs = RamFileSystem::new(crate::DEFAULT_TOTAL_BLOCKS, crate::DEFAULT_INODE_AREA_BLOCKS);
        assert!(rfs.super_block().is_valid());
        let usage = rfs.usage();

        assert_eq!(8192, usage.total_blocks);
        assert_eq!(1024, usage.inode_count);
        assert_eq!(8192 - 1 - 256 - 4, usage.data_blocks);
        assert_eq!(usage.data_blocks - 1, usage.free_blocks);
        assert_eq!(1023, usage.free_inodes);
        assert!(usage.is_consistent());

        let root = rfs.disk_inode(ROOT_INODE);
        assert!(root.is_dir());
        assert_eq!(1, root.blocks);
        assert_eq!(0, root.size);
    }

    #[test]
    fn allocator_is_first_fit() {
        let mut rfs = RamFileSystem::new(64, 2);
        let a = rfs.alloc_data().unwrap();
        let b = rfs.alloc_data().unwrap();
        assert_eq!(a + 1, b);

        rfs.dealloc_data(a);
        assert_eq!(a, rfs.alloc_data().unwrap());
        assert!(rfs.usage().is_consistent());
    }

    #[test]
    #[should_panic]
    fn double_free_is_caught() {
        let mut rfs = RamFileSystem::new(64, 2);
        let block_id = rfs.alloc_data().unwrap();
        rfs.dealloc_data(block_id);
        rfs.dealloc_data(block_id);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "magic")]
    fn damaged_magic_is_caught() {
        let mut rfs = RamFileSystem::new(64, 2);
        // 魔数位于超级块开头
        *rfs.region_mut().get_mut::<u32>(BlockId::NULL, 0) = 0;
        rfs.usage();
    }

    #[test]
    fn failed_growth_returns_its_blocks() {
        let mut rfs = RamFileSystem::new(64, 2);
        let id = rfs.alloc_inode(InodeKind::Regular).unwrap();
        // 填满 8 个直接块
        for _ in 0..DIRECT_BLOCKS {
            rfs.grow_inode(id).unwrap();
        }

        // 只剩一块，而下一步需要一级索引块和数据块
        while rfs.usage().free_blocks > 1 {
            rfs.alloc_data().unwrap();
        }
        assert_eq!(Err(Error::Exhausted), rfs.grow_inode(id));
        assert_eq!(1, rfs.usage().free_blocks);
        assert_eq!(DIRECT_BLOCKS, rfs.disk_inode(id).blocks);
        assert!(rfs.usage().is_consistent());
    }

    #[test]
    fn inodes_are_recycled() {
        let mut rfs = RamFileSystem::new(64, 1);
        let ids: Vec<_> = (1..INODES_PER_BLOCK)
            .map(|_| rfs.alloc_inode(InodeKind::Regular).unwrap())
            .collect();
        assert_eq!(Err(Error::Exhausted), rfs.alloc_inode(InodeKind::Directory));

        rfs.dealloc_inode(ids[1]);
        assert_eq!(Ok(ids[1]), rfs.alloc_inode(InodeKind::Directory));
        assert!(rfs.usage().is_consistent());
    }

    #[test]
    fn write_read_and_truncate() {
        let mut rfs = RamFileSystem::new(256, 2);
        let id = rfs.alloc_inode(InodeKind::Regular).unwrap();
        rfs.grow_inode(id).unwrap();

        let data: Vec<u8> = (0..BLOCK_SIZE * 10).map(|i| (i % 251) as u8).collect();
        let mut position = 0;
        assert_eq!(Ok(data.len()), rfs.write_at(id, &mut position, &data));
        assert_eq!(data.len(), position);
        assert_eq!(10, rfs.disk_inode(id).blocks);

        let mut buf = vec![0; data.len() + 7];
        assert_eq!(Ok(data.len()), rfs.read_at(id, 0, &mut buf));
        assert_eq!(data[..], buf[..data.len()]);
        assert_eq!(Ok(0), rfs.read_at(id, data.len(), &mut buf));

        rfs.truncate(id);
        let disk_inode = rfs.disk_inode(id);
        assert_eq!((0, 1), (disk_inode.size, disk_inode.blocks));
        assert_eq!(rfs.usage().data_blocks - 2, rfs.usage().free_blocks);
    }
}
