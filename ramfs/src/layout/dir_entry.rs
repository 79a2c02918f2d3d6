use crate::{BLOCK_SIZE, ROOT_INODE};

/// 文件名最大长度，最后一字节留给 \0
pub const NAME_MAX_LEN: usize = 13;
/// 每个数据块容纳的目录项数
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DirEntry::SIZE;

/// 目录项：文件名与 inode 编号
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    name: [u8; NAME_MAX_LEN + 1],
    inode_id: u16,
}

impl DirEntry {
    /// 目录项大小恒为16字节
    pub const SIZE: usize = 16;

    /// `name` 须已通过长度检查
    #[inline]
    pub fn new(name: &str, inode_id: u32) -> Self {
        let bytes = name.as_bytes();
        debug_assert!(bytes.len() <= NAME_MAX_LEN);
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self {
            name,
            inode_id: inode_id as u16,
        }
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id as u32
    }

    /// 结束标记：inode 编号为根目录却不叫 `/` 的项。
    /// 根目录永远不会作为子项出现，所以置零的槽位天然就是结束标记。
    #[inline]
    pub fn is_end(&self) -> bool {
        self.inode_id() == ROOT_INODE && self.name() != "/"
    }
}
