//! # 文件描述符层

use alloc::vec::Vec;
use vfs::Error;

use crate::{MAX_OPEN_FILES, Result};

/// 进程打开的文件或目录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub inode: u32,
    /// 文件内的偏移量；对目录而言是已读过的目录项字节数
    pub position: usize,
}

/// 单个进程的描述符表，空槽位即已关闭
#[derive(Debug, Default)]
pub struct FdTable(Vec<Option<FileDescriptor>>);

impl FdTable {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// 插入新描述符至空槽位，并返回槽位的索引
    pub fn insert(&mut self, inode: u32) -> Result<usize> {
        let fd = match self.0.iter().position(Option::is_none) {
            Some(fd) => fd,
            None if self.0.len() < MAX_OPEN_FILES => {
                self.0.push(None);
                self.0.len() - 1
            }
            None => return Err(Error::Exhausted),
        };

        self.0[fd] = Some(FileDescriptor { inode, position: 0 });
        Ok(fd)
    }

    pub fn remove(&mut self, fd: usize) -> Result<FileDescriptor> {
        let descriptor = self
            .0
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(Error::InvalidHandle)?;

        // 末尾的空槽位没有保留的必要
        while self.0.last().is_some_and(Option::is_none) {
            self.0.pop();
        }
        Ok(descriptor)
    }

    pub fn get(&self, fd: usize) -> Result<&FileDescriptor> {
        self.0
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidHandle)
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut FileDescriptor> {
        self.0
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle)
    }

    /// 是否有描述符指向该 inode
    pub fn holds(&self, inode: u32) -> bool {
        self.iter().any(|descriptor| descriptor.inode == inode)
    }

    /// 打开中的描述符
    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.0.iter().flatten()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_free_slot_is_reused() {
        let mut table = FdTable::new();
        assert_eq!(Ok(0), table.insert(5));
        assert_eq!(Ok(1), table.insert(6));
        assert_eq!(Ok(2), table.insert(5));

        assert_eq!(Ok(FileDescriptor { inode: 6, position: 0 }), table.remove(1));
        assert_eq!(Err(Error::InvalidHandle), table.remove(1));
        assert_eq!(Err(Error::InvalidHandle), table.get(1).copied());
        assert_eq!(Ok(1), table.insert(7));

        assert!(table.holds(5));
        assert!(!table.holds(6));
    }

    #[test]
    fn table_has_a_ceiling() {
        let mut table = FdTable::new();
        for fd in 0..MAX_OPEN_FILES {
            assert_eq!(Ok(fd), table.insert(1));
        }
        assert_eq!(Err(Error::Exhausted), table.insert(1));

        table.remove(10).unwrap();
        assert_eq!(Ok(10), table.insert(2));
    }

    #[test]
    fn emptied_table() {
        let mut table = FdTable::new();
        let fd = table.insert(3).unwrap();
        table.get_mut(fd).unwrap().position = 42;
        assert_eq!(42, table.get(fd).unwrap().position);

        table.remove(fd).unwrap();
        assert!(table.is_empty());
        assert_eq!(Err(Error::InvalidHandle), table.get(usize::MAX).copied());
    }
}
