//! # 路径解析层
//!
//! 路径一律为以 `/` 开头的绝对路径，不支持 `.` 与 `..`。

use vfs::Error;

use crate::layout::{InodeKind, NAME_MAX_LEN};
use crate::rfs::RamFileSystem;
use crate::{PATH_MAX, ROOT_INODE, Result};

pub trait Path {
    fn is_absolute(&self) -> bool;

    /// 返回路径的`(父目录, 文件名)`，根目录没有父目录
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    /// 根目录之下逐级的路径分量，根目录自身没有分量
    fn components(&self) -> impl Iterator<Item = &Self>;

    /// 校验路径后拆成`(父目录, 文件名)`
    fn split_leaf(&self) -> Result<(&Self, &Self)>;
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        if self == "/" {
            return None;
        }

        self.rsplit_once('/')
            .map(|(p, f)| if p.is_empty() { ("/", f) } else { (p, f) })
    }

    fn components(&self) -> impl Iterator<Item = &Self> {
        self.strip_prefix('/')
            .filter(|rest| !rest.is_empty())
            .into_iter()
            .flat_map(|rest| rest.split('/'))
    }

    fn split_leaf(&self) -> Result<(&Self, &Self)> {
        if self.len() > PATH_MAX {
            return Err(Error::NameTooLong);
        }
        if !self.is_absolute() {
            return Err(Error::InvalidPath);
        }

        let (parent, leaf) = self.parent_file().ok_or(Error::IsRoot)?;
        if self.components().any(str::is_empty) || leaf.contains('\0') {
            return Err(Error::InvalidPath);
        }
        if leaf.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }

        Ok((parent, leaf))
    }
}

impl RamFileSystem {
    /// 自根目录逐级解析目录路径，每一级都必须是目录
    pub fn resolve_dir(&self, path: &str) -> Result<u32> {
        if !path.is_absolute() {
            return Err(Error::InvalidPath);
        }

        path.components().try_fold(ROOT_INODE, |dir_id, name| {
            if name.is_empty() {
                return Err(Error::InvalidPath);
            }
            self.find(dir_id, name, Some(InodeKind::Directory))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_file() {
        assert_eq!(None, "/".parent_file());
        assert_eq!(Some(("/", "a")), "/a".parent_file());
        assert_eq!(Some(("/a/b", "c")), "/a/b/c".parent_file());
    }

    #[test]
    fn components() {
        assert_eq!(0, "/".components().count());
        assert_eq!(vec!["a", "b"], "/a/b".components().collect::<Vec<_>>());
        assert_eq!(vec!["a", "", "b"], "/a//b".components().collect::<Vec<_>>());
    }

    #[test]
    fn split_leaf_validates() {
        assert_eq!(Ok(("/dir", "file")), "/dir/file".split_leaf());
        assert_eq!(Err(Error::IsRoot), "/".split_leaf());
        assert_eq!(Err(Error::InvalidPath), "dir/file".split_leaf());
        assert_eq!(Err(Error::InvalidPath), "/dir/".split_leaf());
        assert_eq!(Err(Error::InvalidPath), "/a//b".split_leaf());
        assert_eq!(Err(Error::NameTooLong), "/abcdefghijklmn".split_leaf());
        assert_eq!(Ok(("/", "abcdefghijklm")), "/abcdefghijklm".split_leaf());

        let long = format!("/{}", "a/".repeat(PATH_MAX / 2));
        assert_eq!(Err(Error::NameTooLong), long.split_leaf());
    }

    #[test]
    fn resolve_walks_directories() {
        let mut rfs = RamFileSystem::new(256, 4);
        let a = rfs.alloc_inode(InodeKind::Directory).unwrap();
        rfs.grow_inode(a).unwrap();
        rfs.insert(ROOT_INODE, "a", a).unwrap();
        let f = rfs.alloc_inode(InodeKind::Regular).unwrap();
        rfs.grow_inode(f).unwrap();
        rfs.insert(a, "f", f).unwrap();

        assert_eq!(Ok(ROOT_INODE), rfs.resolve_dir("/"));
        assert_eq!(Ok(a), rfs.resolve_dir("/a"));
        assert_eq!(Err(Error::NotFound), rfs.resolve_dir("/a/f"));
        assert_eq!(Err(Error::NotFound), rfs.resolve_dir("/b"));
        assert_eq!(Err(Error::InvalidPath), rfs.resolve_dir("a"));
    }
}
