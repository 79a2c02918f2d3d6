use crate::BLOCK_BITS;
use crate::region::{BlockId, Region};

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录数据块区域的分配情况
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: BlockId,
    /// 位图占用块数
    blocks: usize,
    /// 位图所指示的项数，最后一块末尾多出的位永不分配
    items: usize,
}

/// 位编号
struct BitPos(u32);

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: BlockId, blocks: usize, items: usize) -> Self {
        assert!(items <= blocks * BLOCK_BITS);
        Self {
            start_block_id,
            blocks,
            items,
        }
    }

    /// 自低向高找到第一个空闲位，置位后返回其编号。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&self, region: &mut Region) -> Option<u32> {
        for block_index in 0..self.blocks {
            let bitmap_block: &mut BitmapBlock =
                region.get_mut(self.start_block_id + block_index as u32, 0);

            let Some((group_index, ingroup_index)) =
                bitmap_block
                    .iter()
                    .enumerate()
                    .find_map(|(group_index, &bits)| {
                        (bits != u64::MAX).then_some((group_index, bits.trailing_ones()))
                    })
            else {
                continue;
            };

            let id = BitPos::encode(block_index, group_index, ingroup_index as usize);
            // 更低的位都已占用，尾部的填充位不可分配
            if id as usize >= self.items {
                return None;
            }

            bitmap_block[group_index] |= 1 << ingroup_index;
            return Some(id);
        }

        None
    }

    pub fn dealloc(&self, region: &mut Region, id: u32) {
        assert!((id as usize) < self.items, "bit {id} is outbound");
        let (block_index, group_index, ingroup_index) = BitPos(id).decode();
        let bitmap_block: &mut BitmapBlock =
            region.get_mut(self.start_block_id + block_index as u32, 0);

        // 编号一定得有对应的位
        assert_ne!(bitmap_block[group_index] & (1 << ingroup_index), 0);

        bitmap_block[group_index] &= !(1 << ingroup_index);
    }

    /// 已置位的项数
    pub fn count_allocated(&self, region: &Region) -> usize {
        (0..self.blocks)
            .map(|block_index| {
                region.map(
                    self.start_block_id + block_index as u32,
                    0,
                    |bitmap_block: &BitmapBlock| {
                        bitmap_block
                            .iter()
                            .map(|bits| bits.count_ones() as usize)
                            .sum::<usize>()
                    },
                )
            })
            .sum()
    }
}

impl BitPos {
    /// 线性映射编码得到位编号
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> u32 {
        (block_index * BLOCK_BITS + group_index * 64 + ingroup_index) as u32
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut id = self.0 as usize;

        let block_index = id / BLOCK_BITS;
        id %= BLOCK_BITS;
        (block_index, id / 64, id % 64)
    }
}
