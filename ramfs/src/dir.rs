//! # 目录层
//!
//! 目录的数据块被视为一串定长目录项，活跃项紧密排在前 `size / 16` 个槽位，中间没有空洞。
//! 删除时用最后一项填补被删除项，从而维持紧密。

use vfs::Error;

use crate::layout::{DirEntry, DiskInode, ENTRIES_PER_BLOCK, InodeKind};
use crate::rfs::RamFileSystem;
use crate::Result;

impl RamFileSystem {
    /// 在目录下通过名字查找子项的 inode 编号。
    /// `filter` 为空时不区分子项的类型。
    pub fn find(&self, dir_id: u32, name: &str, filter: Option<InodeKind>) -> Result<u32> {
        self.find_slot(dir_id, name, filter)
            .map(|(_, inode_id)| inode_id)
    }

    /// 插入新的目录项
    pub fn insert(&mut self, dir_id: u32, name: &str, inode_id: u32) -> Result<()> {
        let slot = self.free_slot(dir_id)?;
        self.set_entry(dir_id, slot, &DirEntry::new(name, inode_id));
        self.update_inode(dir_id, |dir, _| dir.size += DirEntry::SIZE as u32);
        Ok(())
    }

    /// 删除目录项并返回其 inode 编号。
    ///
    /// 最后一项被搬到空出的槽位上，末尾已空的数据块在此之前先行回收。
    pub fn remove(&mut self, dir_id: u32, name: &str, filter: Option<InodeKind>) -> Result<u32> {
        let (target, inode_id) = self.find_slot(dir_id, name, filter)?;
        let last = self.last_entry(dir_id)?;

        if last != target {
            let moved = self.entry(&self.disk_inode(dir_id), last).ok_or(Error::Corrupt)?;
            self.set_entry(dir_id, target, &moved);
        }
        self.set_entry(dir_id, last, &DirEntry::default());
        self.update_inode(dir_id, |dir, _| dir.size -= DirEntry::SIZE as u32);

        Ok(inode_id)
    }

    /// 读出第 `slot` 个目录项
    pub fn dir_entry(&self, dir_id: u32, slot: usize) -> Option<DirEntry> {
        self.entry(&self.disk_inode(dir_id), slot)
    }

    #[inline]
    pub fn is_empty_dir(&self, dir_id: u32) -> bool {
        self.disk_inode(dir_id).size == 0
    }
}

impl RamFileSystem {
    fn entry(&self, dir: &DiskInode, slot: usize) -> Option<DirEntry> {
        let block_id = dir.block_id(slot / ENTRIES_PER_BLOCK, self.region()).get()?;
        let offset = slot % ENTRIES_PER_BLOCK * DirEntry::SIZE;
        Some(self.region().map(block_id, offset, |entry: &DirEntry| entry.clone()))
    }

    fn set_entry(&mut self, dir_id: u32, slot: usize, entry: &DirEntry) {
        let block_id = self
            .disk_inode(dir_id)
            .block_id(slot / ENTRIES_PER_BLOCK, self.region());
        debug_assert!(!block_id.is_null());
        let offset = slot % ENTRIES_PER_BLOCK * DirEntry::SIZE;
        self.region_mut()
            .map_mut(block_id, offset, |slot: &mut DirEntry| *slot = entry.clone());
    }

    /// 按块顺序扫描前 `size / 16` 个槽位，返回目标的槽位与 inode 编号
    fn find_slot(
        &self,
        dir_id: u32,
        name: &str,
        filter: Option<InodeKind>,
    ) -> Result<(usize, u32)> {
        let dir = self.disk_inode(dir_id);
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }

        for slot in 0..dir.size as usize / DirEntry::SIZE {
            let entry = self.entry(&dir, slot).ok_or(Error::Corrupt)?;
            if entry.is_end() {
                log::error!("directory {dir_id} has a hole at slot {slot}");
                return Err(Error::Corrupt);
            }

            if entry.name() == name {
                let kind = self.disk_inode(entry.inode_id()).kind;
                if filter.is_none_or(|filter| filter == kind) {
                    return Ok((slot, entry.inode_id()));
                }
            }
        }

        Err(Error::NotFound)
    }

    /// 在当前目录的数据当中，寻找空槽位；找不到就分配新的数据块
    fn free_slot(&mut self, dir_id: u32) -> Result<usize> {
        let dir = self.disk_inode(dir_id);
        let end = dir.size as usize / DirEntry::SIZE;

        let first_empty = (0..dir.blocks as usize * ENTRIES_PER_BLOCK).find(|&slot| {
            self.entry(&dir, slot)
                .is_some_and(|entry| entry.is_end())
        });

        match first_empty {
            Some(slot) if slot == end => Ok(slot),
            Some(slot) => {
                log::error!("directory {dir_id} ends at slot {end} but slot {slot} is empty");
                Err(Error::Corrupt)
            }
            None => {
                self.grow_inode(dir_id)?;
                Ok(end)
            }
        }
    }

    /// 自后向前找到最后一个活跃项的槽位。
    ///
    /// 首个槽位已空的末尾数据块不再有活跃项，顺带回收；首个直接块永远保留。
    fn last_entry(&mut self, dir_id: u32) -> Result<usize> {
        loop {
            let dir = self.disk_inode(dir_id);
            let last_block = dir.blocks as usize - 1;
            if last_block == 0 {
                break;
            }

            let first = self.entry(&dir, last_block * ENTRIES_PER_BLOCK);
            if !first.is_some_and(|entry| entry.is_end()) {
                break;
            }
            log::debug!("directory {dir_id} gives back block {last_block}");
            self.shrink_inode(dir_id);
        }

        let dir = self.disk_inode(dir_id);
        let base = (dir.blocks as usize - 1) * ENTRIES_PER_BLOCK;
        let last = (base..base + ENTRIES_PER_BLOCK)
            .rev()
            .find(|&slot| self.entry(&dir, slot).is_some_and(|entry| !entry.is_end()))
            .ok_or(Error::Corrupt)?;

        if last + 1 != dir.size as usize / DirEntry::SIZE {
            log::error!("directory {dir_id} has its last entry at slot {last}");
            return Err(Error::Corrupt);
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ROOT_INODE;

    fn rfs() -> RamFileSystem {
        RamFileSystem::new(512, 16)
    }

    fn names(rfs: &RamFileSystem, dir_id: u32) -> Vec<String> {
        let count = rfs.disk_inode(dir_id).size as usize / DirEntry::SIZE;
        (0..count)
            .map(|slot| rfs.dir_entry(dir_id, slot).unwrap().name().into())
            .collect()
    }

    fn add(rfs: &mut RamFileSystem, name: &str, kind: InodeKind) -> u32 {
        let id = rfs.alloc_inode(kind).unwrap();
        rfs.grow_inode(id).unwrap();
        rfs.insert(ROOT_INODE, name, id).unwrap();
        id
    }

    #[test]
    fn removal_keeps_entries_dense() {
        let mut rfs = rfs();
        for name in ["a", "b", "c", "d"] {
            add(&mut rfs, name, InodeKind::Regular);
        }

        let b = rfs.find(ROOT_INODE, "b", None).unwrap();
        assert_eq!(Ok(b), rfs.remove(ROOT_INODE, "b", None));
        assert_eq!(vec!["a", "d", "c"], names(&rfs, ROOT_INODE));
        assert_eq!(Err(Error::NotFound), rfs.find(ROOT_INODE, "b", None));

        // 删除最后一项不需要搬移
        rfs.remove(ROOT_INODE, "c", None).unwrap();
        assert_eq!(vec!["a", "d"], names(&rfs, ROOT_INODE));
    }

    #[test]
    fn kind_filter() {
        let mut rfs = rfs();
        let file = add(&mut rfs, "x", InodeKind::Regular);
        let dir = add(&mut rfs, "x", InodeKind::Directory);

        assert_eq!(Ok(dir), rfs.find(ROOT_INODE, "x", Some(InodeKind::Directory)));
        assert_eq!(Ok(file), rfs.find(ROOT_INODE, "x", Some(InodeKind::Regular)));
        assert_eq!(Ok(file), rfs.find(ROOT_INODE, "x", None));
        assert_eq!(Err(Error::NotADirectory), rfs.find(file, "y", None));
    }

    #[test]
    fn trailing_blocks_are_reclaimed() {
        let mut rfs = rfs();
        for i in 0..ENTRIES_PER_BLOCK + 1 {
            add(&mut rfs, &format!("f{i}"), InodeKind::Regular);
        }
        assert_eq!(2, rfs.disk_inode(ROOT_INODE).blocks);

        // 第二块的唯一一项被搬走，第二块变空但暂不回收
        rfs.remove(ROOT_INODE, "f0", None).unwrap();
        assert_eq!(2, rfs.disk_inode(ROOT_INODE).blocks);

        rfs.remove(ROOT_INODE, "f1", None).unwrap();
        assert_eq!(1, rfs.disk_inode(ROOT_INODE).blocks);

        for i in 2..ENTRIES_PER_BLOCK + 1 {
            rfs.remove(ROOT_INODE, &format!("f{i}"), None).unwrap();
        }
        assert!(rfs.is_empty_dir(ROOT_INODE));
        assert_eq!(1, rfs.disk_inode(ROOT_INODE).blocks);
    }

    #[test]
    fn hole_is_reported_as_corruption() {
        let mut rfs = rfs();
        add(&mut rfs, "a", InodeKind::Regular);
        add(&mut rfs, "b", InodeKind::Regular);
        rfs.set_entry(ROOT_INODE, 0, &DirEntry::default());

        assert_eq!(Err(Error::Corrupt), rfs.find(ROOT_INODE, "b", None));
    }
}
