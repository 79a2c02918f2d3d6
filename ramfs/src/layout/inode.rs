//! 间接索引块
//! - 一级：整个块连续存储**块编号**，每个编号都指向一个**数据块**
//! - 二级：整个块连续存储**块编号**，每个编号都指向一个一级索引块
//!
//! 目录的空间用于存放子项的目录项；
//! 文件的空间用于存放它的数据。
//!
//! 数据块总是占据 inode 逻辑块号的一段前缀：扩容只在末尾追加一块，收缩只从末尾弹出一块。
//!
//! ## 块索引编码
//!
//! - 二级块索引模一级块的**可编号数量**，可得一级块的内部索引
//! - 二级块索引除以一级块的**可编号数量**，可得一级块在二级块中的位置

use alloc::vec::Vec;
use core::mem;

use vfs::{DirEntryType, Error};

use crate::region::{BlockId, Region};
use crate::{BLOCK_SIZE, Result};

/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / mem::size_of::<BlockId>();
/// 间接索引块
type IndirectBlock = [BlockId; INDIRECT_COUNT];

/// 直接索引块可编号数量
pub const DIRECT_COUNT: usize = 8;
/// 一级索引块可编号数量
const INDIRECT1_COUNT: usize = INDIRECT_COUNT;
/// 二级索引块可编号数量
const INDIRECT2_COUNT: usize = INDIRECT_COUNT.pow(2);
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT1_COUNT;
/// 用上二级索引时的编号容量
const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT2_COUNT;

/// 单个 inode 最多挂载的数据块数
pub const MAX_FILE_BLOCKS: usize = INDIRECT2_CAP;
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

/// 一级索引块所在的槽位
const INDIRECT1_SLOT: usize = DIRECT_COUNT;
/// 二级索引块所在的槽位
const INDIRECT2_SLOT: usize = DIRECT_COUNT + 1;

#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct DiskInode {
    /// ID
    pub id: u32,
    pub status: InodeStatus,
    /// 类型
    pub kind: InodeKind,
    _pad: u16,
    // 不用usize是为了严控布局
    pub size: u32,
    /// 挂载的数据块数，不含索引块
    pub blocks: u32,
    /// `0..8` 为直接索引，`8` 指向一级索引块，`9` 指向二级索引块
    locations: [BlockId; DIRECT_COUNT + 2],
    /// 已占用的槽位数
    location_count: u32,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum InodeStatus {
    #[default]
    Free,
    Allocated,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum InodeKind {
    /// 空闲 inode 的类型
    #[default]
    Nil,
    Regular,
    Directory,
}

/// 字节位置翻译的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub block: BlockId,
    /// 块内偏移
    pub offset: usize,
    /// 到块末尾为止的连续字节数
    pub remaining: usize,
}

impl DiskInode {
    #[inline]
    pub fn init(&mut self, id: u32, kind: InodeKind) {
        *self = Self {
            id,
            status: InodeStatus::Allocated,
            kind,
            ..Default::default()
        }
    }

    /// 归还 inode，调用者须已释放它的全部数据块
    #[inline]
    pub fn release(&mut self) {
        debug_assert_eq!(self.blocks, 0);
        *self = Self {
            id: self.id,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.status == InodeStatus::Allocated
    }

    #[inline]
    pub fn location_count(&self) -> usize {
        self.location_count as usize
    }

    /// 已挂载数据块能容纳的字节数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks as usize * BLOCK_SIZE
    }

    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 然后返回内存区内的块编号；尚未挂载时返回 [`BlockId::NULL`]
    pub fn block_id(&self, block_index: usize, region: &Region) -> BlockId {
        if block_index >= self.blocks as usize {
            return BlockId::NULL;
        }

        if block_index < DIRECT_CAP {
            self.locations[block_index]
        } else if block_index < INDIRECT1_CAP {
            region.map(
                self.locations[INDIRECT1_SLOT],
                0,
                |indirect1: &IndirectBlock| {
                    // 剔去直接索引的部分
                    indirect1[block_index - DIRECT_CAP]
                },
            )
        } else {
            // 剔去使用了一级索引的部分
            let index = block_index - INDIRECT1_CAP;

            let indirect1 = region.map(
                self.locations[INDIRECT2_SLOT],
                0,
                |indirect2: &IndirectBlock| indirect2[index / INDIRECT1_COUNT],
            );
            region.map(indirect1, 0, |indirect1: &IndirectBlock| {
                indirect1[index % INDIRECT1_COUNT]
            })
        }
    }

    /// 把文件内的字节位置翻译为数据块及块内偏移，不分配任何块
    pub fn translate(&self, position: usize, region: &Region) -> Result<Cursor> {
        if position >= MAX_FILE_SIZE {
            return Err(Error::OutOfRange);
        }

        let block = self
            .block_id(position / BLOCK_SIZE, region)
            .get()
            .ok_or(Error::OutOfRange)?;
        let offset = position % BLOCK_SIZE;

        Ok(Cursor {
            block,
            offset,
            remaining: BLOCK_SIZE - offset,
        })
    }

    /// 再挂载一个数据块需要的新块数（含索引块），达到容量上限时为空
    pub fn growth_cost(&self) -> Option<usize> {
        let blocks = self.blocks as usize;
        if blocks >= MAX_FILE_BLOCKS {
            return None;
        }

        let cost = if blocks == DIRECT_CAP {
            // 一级索引块 + 数据块
            2
        } else if blocks == INDIRECT1_CAP {
            // 二级索引块 + 第一个一级索引块 + 数据块
            3
        } else if blocks > INDIRECT1_CAP && (blocks - INDIRECT1_CAP) % INDIRECT1_COUNT == 0 {
            // 二级索引下的新一级索引块 + 数据块
            2
        } else {
            1
        };
        Some(cost)
    }

    /// 在末尾挂载数据块 `data`；`index_blocks` 是这一步需要的新索引块，
    /// 数量为 [`Self::growth_cost`] 减一，均已清零
    pub fn expand(&mut self, data: BlockId, index_blocks: &[BlockId], region: &mut Region) {
        let block_index = self.blocks as usize;
        debug_assert_eq!(Some(index_blocks.len() + 1), self.growth_cost());

        if block_index < DIRECT_CAP {
            self.locations[block_index] = data;
        } else if block_index < INDIRECT1_CAP {
            // 这次扩容经过了DIRECT_CAP，创建一级索引
            if block_index == DIRECT_CAP {
                self.locations[INDIRECT1_SLOT] = index_blocks[0];
            }
            region.map_mut(
                self.locations[INDIRECT1_SLOT],
                0,
                |indirect1: &mut IndirectBlock| indirect1[block_index - DIRECT_CAP] = data,
            );
        } else {
            let index = block_index - INDIRECT1_CAP;
            let index2 = index / INDIRECT1_COUNT;
            let index1 = index % INDIRECT1_COUNT;

            // 这次扩容经过了INDIRECT1_CAP，创建二级索引
            let mut index_blocks = index_blocks.iter().copied();
            if index == 0 {
                self.locations[INDIRECT2_SLOT] = index_blocks.next().unwrap_or_default();
            }

            // 子块索引为0表示进入新的一级索引块
            if index1 == 0 {
                let indirect1 = index_blocks.next().unwrap_or_default();
                region.map_mut(
                    self.locations[INDIRECT2_SLOT],
                    0,
                    |indirect2: &mut IndirectBlock| indirect2[index2] = indirect1,
                );
            }

            let indirect1 = region.map(
                self.locations[INDIRECT2_SLOT],
                0,
                |indirect2: &IndirectBlock| indirect2[index2],
            );
            debug_assert!(!indirect1.is_null());
            region.map_mut(indirect1, 0, |indirect1: &mut IndirectBlock| {
                indirect1[index1] = data
            });
        }

        self.blocks += 1;
        self.location_count = Self::count_location(self.blocks as usize) as u32;
    }

    /// 弹出最后一个数据块，连同因此变空的索引块一并返回，数据块在前
    pub fn shrink(&mut self, region: &mut Region) -> Vec<BlockId> {
        let mut released = Vec::with_capacity(3);
        let Some(block_index) = (self.blocks as usize).checked_sub(1) else {
            return released;
        };

        if block_index < DIRECT_CAP {
            released.push(mem::take(&mut self.locations[block_index]));
        } else if block_index < INDIRECT1_CAP {
            released.push(region.map_mut(
                self.locations[INDIRECT1_SLOT],
                0,
                |indirect1: &mut IndirectBlock| mem::take(&mut indirect1[block_index - DIRECT_CAP]),
            ));
            if block_index == DIRECT_CAP {
                released.push(mem::take(&mut self.locations[INDIRECT1_SLOT]));
            }
        } else {
            let index = block_index - INDIRECT1_CAP;
            let index2 = index / INDIRECT1_COUNT;
            let index1 = index % INDIRECT1_COUNT;
            let indirect2 = self.locations[INDIRECT2_SLOT];

            let indirect1 = region.map(indirect2, 0, |indirect2: &IndirectBlock| indirect2[index2]);
            released.push(region.map_mut(indirect1, 0, |indirect1: &mut IndirectBlock| {
                mem::take(&mut indirect1[index1])
            }));

            // 一级索引块的首项被弹出，它已经空了
            if index1 == 0 {
                region.map_mut(indirect2, 0, |indirect2: &mut IndirectBlock| {
                    indirect2[index2] = BlockId::NULL
                });
                released.push(indirect1);

                if index2 == 0 {
                    released.push(mem::take(&mut self.locations[INDIRECT2_SLOT]));
                }
            }
        }

        self.blocks -= 1;
        self.location_count = Self::count_location(self.blocks as usize) as u32;
        released
    }

    /// 卸下全部数据块与索引块并返回它们：直接索引、一级索引、二级索引依次排列
    pub fn clear(&mut self, region: &Region) -> Vec<BlockId> {
        let blocks = self.blocks as usize;
        let mut released: Vec<BlockId> = Vec::with_capacity(Self::count_total_block(blocks));

        /******************** 直接索引 ********************/
        released.extend_from_slice(&self.locations[..blocks.min(DIRECT_CAP)]);
        /******************** END ********************/

        /******************** 一级索引 ********************/
        if blocks > DIRECT_CAP {
            let count = (blocks - DIRECT_CAP).min(INDIRECT1_COUNT);
            let indirect1 = self.locations[INDIRECT1_SLOT];
            region.map(indirect1, 0, |data_blocks: &IndirectBlock| {
                released.extend_from_slice(&data_blocks[..count])
            });
            released.push(indirect1);
        }
        /******************** END ********************/

        /******************** 二级索引 ********************/
        if blocks > INDIRECT1_CAP {
            let mut rest = blocks - INDIRECT1_CAP;
            let indirect2 = self.locations[INDIRECT2_SLOT];
            let children: IndirectBlock = *region.get(indirect2, 0);

            for &indirect1 in children.iter().take(rest.div_ceil(INDIRECT1_COUNT)) {
                let count = rest.min(INDIRECT1_COUNT);
                region.map(indirect1, 0, |data_blocks: &IndirectBlock| {
                    released.extend_from_slice(&data_blocks[..count])
                });
                released.push(indirect1);
                rest -= count;
            }
            released.push(indirect2);
        }
        /******************** END ********************/

        *self = Self {
            id: self.id,
            status: self.status,
            kind: self.kind,
            ..Default::default()
        };
        released
    }

    /// 挂载 `blocks` 个数据块时占用的槽位数
    #[inline]
    pub fn count_location(blocks: usize) -> usize {
        blocks.min(DIRECT_COUNT)
            + usize::from(blocks > DIRECT_CAP)
            + usize::from(blocks > INDIRECT1_CAP)
    }

    /// 挂载 `blocks` 个数据块时共占用多少个 **数据块** 和 **索引块**(`IndirectBlock`)
    pub fn count_total_block(blocks: usize) -> usize {
        let mut total = blocks;

        // 超出直接索引，使用一级索引块
        if blocks > DIRECT_CAP {
            total += 1;
        }

        // 超出一级索引，使用二级索引块
        if blocks > INDIRECT1_CAP {
            total += 1 + (blocks - INDIRECT1_CAP).div_ceil(INDIRECT1_COUNT);
        }

        total
    }
}

impl From<InodeKind> for DirEntryType {
    #[inline]
    fn from(kind: InodeKind) -> Self {
        match kind {
            InodeKind::Directory => Self::Directory,
            InodeKind::Regular | InodeKind::Nil => Self::Regular,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 按顺序发放块号，从 1 开始
    fn grow(inode: &mut DiskInode, region: &mut Region, next: &mut u32) -> BlockId {
        let cost = inode.growth_cost().expect("inode is full");
        let mut take = || {
            let id = BlockId::new(*next);
            *next += 1;
            id
        };
        let index_blocks: Vec<_> = (1..cost).map(|_| take()).collect();
        let data = take();
        inode.expand(data, &index_blocks, region);
        data
    }

    fn inode() -> DiskInode {
        let mut inode = DiskInode::default();
        inode.init(1, InodeKind::Regular);
        inode
    }

    #[test]
    fn growth_materializes_index_blocks() {
        let mut region = Region::new(512);
        let mut inode = inode();
        let mut next = 1;

        for _ in 0..DIRECT_CAP {
            assert_eq!(Some(1), inode.growth_cost());
            grow(&mut inode, &mut region, &mut next);
        }
        assert_eq!(DIRECT_COUNT, inode.location_count());

        assert_eq!(Some(2), inode.growth_cost());
        grow(&mut inode, &mut region, &mut next);
        assert_eq!(DIRECT_COUNT + 1, inode.location_count());

        while (inode.blocks as usize) < INDIRECT1_CAP {
            assert_eq!(Some(1), inode.growth_cost());
            grow(&mut inode, &mut region, &mut next);
        }

        assert_eq!(Some(3), inode.growth_cost());
        grow(&mut inode, &mut region, &mut next);
        assert_eq!(DIRECT_COUNT + 2, inode.location_count());

        while (inode.blocks as usize) < INDIRECT1_CAP + INDIRECT1_COUNT {
            grow(&mut inode, &mut region, &mut next);
        }
        assert_eq!(Some(2), inode.growth_cost());
        grow(&mut inode, &mut region, &mut next);

        let blocks = inode.blocks as usize;
        assert_eq!(
            DiskInode::count_total_block(blocks),
            (next - 1) as usize,
            "every handed out block is accounted for"
        );
    }

    #[test]
    fn translate_walks_every_tier() {
        let mut region = Region::new(512);
        let mut inode = inode();
        let mut next = 1;
        let mut data = Vec::new();
        for _ in 0..INDIRECT1_CAP + 2 {
            data.push(grow(&mut inode, &mut region, &mut next));
        }

        let cursor = inode.translate(3 * BLOCK_SIZE + 10, &region).unwrap();
        assert_eq!(data[3], cursor.block);
        assert_eq!(10, cursor.offset);
        assert_eq!(BLOCK_SIZE - 10, cursor.remaining);

        let cursor = inode.translate(DIRECT_CAP * BLOCK_SIZE, &region).unwrap();
        assert_eq!(data[DIRECT_CAP], cursor.block);

        let cursor = inode.translate((INDIRECT1_CAP + 1) * BLOCK_SIZE + 255, &region).unwrap();
        assert_eq!(data[INDIRECT1_CAP + 1], cursor.block);
        assert_eq!(1, cursor.remaining);

        assert_eq!(
            Err(Error::OutOfRange),
            inode.translate((INDIRECT1_CAP + 2) * BLOCK_SIZE, &region)
        );
        assert_eq!(Err(Error::OutOfRange), inode.translate(MAX_FILE_SIZE, &region));
    }

    #[test]
    fn shrink_undoes_growth() {
        let mut region = Region::new(512);
        let mut inode = inode();
        let mut next = 1;
        for _ in 0..INDIRECT1_CAP + INDIRECT1_COUNT + 1 {
            grow(&mut inode, &mut region, &mut next);
        }

        let mut released = Vec::new();
        while inode.blocks > 0 {
            released.extend(inode.shrink(&mut region));
        }
        released.sort();

        let expected: Vec<_> = (1..next).map(BlockId::new).collect();
        assert_eq!(expected, released);
        assert_eq!(0, inode.location_count());
        assert!(inode.shrink(&mut region).is_empty());
    }

    #[test]
    fn clear_releases_everything() {
        let mut region = Region::new(512);
        let mut inode = inode();
        let mut next = 1;
        for _ in 0..INDIRECT1_CAP + 70 {
            grow(&mut inode, &mut region, &mut next);
        }
        inode.size = inode.capacity() as u32;

        let mut released = inode.clear(&region);
        released.sort();

        let expected: Vec<_> = (1..next).map(BlockId::new).collect();
        assert_eq!(expected, released);
        assert_eq!(0, inode.size);
        assert_eq!(0, inode.blocks);
        assert_eq!(InodeKind::Regular, inode.kind);
    }

    #[test]
    fn ceiling_stops_growth() {
        let mut inode = inode();
        inode.blocks = MAX_FILE_BLOCKS as u32 - 1;
        assert_eq!(Some(1), inode.growth_cost());
        inode.blocks = MAX_FILE_BLOCKS as u32;
        assert_eq!(None, inode.growth_cost());
    }
}
