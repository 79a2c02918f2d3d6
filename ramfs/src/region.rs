//! # 内存区层
//!
//! 引擎独占的一整块连续内存，按 [`BLOCK_SIZE`] 切分，块号即 [`BlockId`]。
//! 上层通过 `map`/`map_mut` 以某种布局解释块内的字节。
//!
//! 与外存文件系统的块缓存不同，这里没有同步与写回，修改立即生效；
//! 内存区在引擎存活期间从不扩缩。

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;
use core::mem;
use core::ops::Add;

use derive_more::{From, Into};

use crate::{BLOCK_SIZE, DataBlock};

/// 块的存储单元，按 u64 存放以保证块首 8 字节对齐
type RawBlock = [u64; BLOCK_SIZE / 8];

/// 内存区内的块编号
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// 空引用。0 号块是超级块，不会被任何索引指向
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// 非空时返回自身
    #[inline]
    pub fn get(self) -> Option<Self> {
        (!self.is_null()).then_some(self)
    }
}

impl From<BlockId> for usize {
    fn from(id: BlockId) -> Self {
        id.0 as usize
    }
}

impl Add<u32> for BlockId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

pub struct Region {
    blocks: Box<[RawBlock]>,
}

impl Region {
    pub fn new(total_blocks: usize) -> Self {
        Self {
            blocks: vec![[0; BLOCK_SIZE / 8]; total_blocks].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn total_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn get<T: Sized>(&self, block_id: BlockId, offset: usize) -> &T {
        Self::check::<T>(offset);
        let block = &self.blocks[usize::from(block_id)];
        unsafe { &*block.as_ptr().cast::<u8>().add(offset).cast() }
    }

    pub fn get_mut<T: Sized>(&mut self, block_id: BlockId, offset: usize) -> &mut T {
        Self::check::<T>(offset);
        let block = &mut self.blocks[usize::from(block_id)];
        unsafe { &mut *block.as_mut_ptr().cast::<u8>().add(offset).cast() }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, block_id: BlockId, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(block_id, offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(
        &mut self,
        block_id: BlockId,
        offset: usize,
        f: impl FnOnce(&mut T) -> V,
    ) -> V {
        f(self.get_mut(block_id, offset))
    }

    /// 整块的字节视图
    #[inline]
    pub fn data(&self, block_id: BlockId) -> &DataBlock {
        self.get(block_id, 0)
    }

    #[inline]
    pub fn data_mut(&mut self, block_id: BlockId) -> &mut DataBlock {
        self.get_mut(block_id, 0)
    }

    #[inline]
    pub fn zeroize(&mut self, block_id: BlockId) {
        self.blocks[usize::from(block_id)].fill(0);
    }
}

impl Region {
    /// 布局必须完整落在块内，且块内偏移满足类型的对齐
    fn check<T>(offset: usize) {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        assert!(mem::align_of::<T>() <= mem::align_of::<RawBlock>());
        assert_eq!(offset % mem::align_of::<T>(), 0, "misaligned layout");
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("total_blocks", &self.total_blocks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_views_share_memory() {
        let mut region = Region::new(4);
        let id = BlockId::new(2);

        region.map_mut(id, 8, |word: &mut u32| *word = 0xdead_beef);
        assert_eq!(region.data(id)[8..12], 0xdead_beef_u32.to_ne_bytes());

        region.zeroize(id);
        assert!(region.data(id).iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic]
    fn layout_must_fit_in_block() {
        let region = Region::new(1);
        let _: &u64 = region.get(BlockId::NULL, BLOCK_SIZE - 4);
    }
}
