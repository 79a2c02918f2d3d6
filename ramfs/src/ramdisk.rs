//! # 引擎门面层
//!
//! 对外提供 create/mkdir/open/read/write 等操作。
//! 所有操作都在同一把锁之后完成，进程的描述符表也由这把锁保护。

use alloc::collections::BTreeMap;

use enumflags2::{BitFlags, bitflags};
use spin::Mutex;
use vfs::{DirEntry, Error, Stat};

use crate::fd_table::{FdTable, FileDescriptor};
use crate::layout::{DirEntry as RawDirEntry, InodeKind};
use crate::path::Path;
use crate::rfs::{RamFileSystem, Usage};
use crate::{BLOCK_SIZE, DEFAULT_INODE_AREA_BLOCKS, DEFAULT_TOTAL_BLOCKS, ROOT_INODE, Result};

/// 进程号
pub type Pid = usize;

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 文件不存在时创建普通文件
    CREATE = 0b0010_0000_0000,
    /// 先清空文件，再交给用户
    TRUNC  = 0b0100_0000_0000,
}

pub struct RamDisk {
    inner: Mutex<Inner>,
}

struct Inner {
    fs: RamFileSystem,
    /// 描述符表首次打开文件时建立，进程退出时销毁
    processes: BTreeMap<Pid, FdTable>,
}

impl RamDisk {
    /// 默认的 2 MiB 内存区
    pub fn new() -> Self {
        Self::with_geometry(DEFAULT_TOTAL_BLOCKS, DEFAULT_INODE_AREA_BLOCKS)
    }

    pub fn with_geometry(total_blocks: u32, inode_area_blocks: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                fs: RamFileSystem::new(total_blocks, inode_area_blocks),
                processes: BTreeMap::new(),
            }),
        }
    }

    /// 创建普通文件，返回其 inode 编号
    pub fn create(&self, path: &str) -> Result<u32> {
        self.inner.lock().create(path, InodeKind::Regular)
    }

    /// 创建目录，返回其 inode 编号
    pub fn mkdir(&self, path: &str) -> Result<u32> {
        self.inner.lock().create(path, InodeKind::Directory)
    }

    #[inline]
    pub fn open(&self, pid: Pid, path: &str) -> Result<usize> {
        self.open_with(pid, path, BitFlags::empty())
    }

    pub fn open_with(&self, pid: Pid, path: &str, flags: BitFlags<OpenFlag>) -> Result<usize> {
        self.inner.lock().open(pid, path, flags)
    }

    pub fn close(&self, pid: Pid, fd: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let descriptor = inner
            .processes
            .get_mut(&pid)
            .ok_or(Error::InvalidHandle)
            .and_then(|table| table.remove(fd))
            .inspect_err(|_| log::warn!("pid {pid} closes unknown fd {fd}"))?;

        log::debug!("pid {pid} closes fd {fd} (inode {})", descriptor.inode);
        Ok(())
    }

    /// 从描述符当前位置读入 `buf`，返回读到的字节数，文件末尾时为 0
    pub fn read(&self, pid: Pid, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let Inner { fs, processes } = &mut *inner;

        let descriptor = descriptor_mut(processes, pid, fd)?;
        if fs.disk_inode(descriptor.inode).is_dir() {
            return Err(Error::NotAFile);
        }

        let read = fs.read_at(descriptor.inode, descriptor.position, buf)?;
        descriptor.position += read;
        Ok(read)
    }

    /// 从描述符当前位置写入 `buf`，返回写入的字节数。
    ///
    /// 空间不足时返回 [`Error::NoSpace`]，已写入的部分保留，描述符位置也随之推进。
    pub fn write(&self, pid: Pid, fd: usize, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let Inner { fs, processes } = &mut *inner;

        let descriptor = descriptor_mut(processes, pid, fd)?;
        let disk_inode = fs.disk_inode(descriptor.inode);
        if disk_inode.is_dir() {
            return Err(Error::NotAFile);
        }

        // 文件可能已被别的描述符截断
        let mut position = descriptor.position.min(disk_inode.size as usize);
        let written = fs.write_at(descriptor.inode, &mut position, buf);
        descriptor.position = position;
        written
    }

    /// 把描述符移到 `offset`，限定在 `[0, size]` 之内，返回新位置
    pub fn lseek(&self, pid: Pid, fd: usize, offset: i64) -> Result<usize> {
        let mut inner = self.inner.lock();
        let Inner { fs, processes } = &mut *inner;

        let descriptor = descriptor_mut(processes, pid, fd)?;
        let disk_inode = fs.disk_inode(descriptor.inode);
        if disk_inode.is_dir() {
            return Err(Error::NotAFile);
        }

        descriptor.position = offset.clamp(0, disk_inode.size as i64) as usize;
        Ok(descriptor.position)
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        self.inner.lock().unlink(path)
    }

    /// 读出目录的下一项，读完时为空
    pub fn readdir(&self, pid: Pid, fd: usize) -> Result<Option<DirEntry>> {
        let mut inner = self.inner.lock();
        let Inner { fs, processes } = &mut *inner;

        let descriptor = descriptor_mut(processes, pid, fd)?;
        let dir = fs.disk_inode(descriptor.inode);
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        if descriptor.position >= dir.size as usize {
            return Ok(None);
        }

        let slot = descriptor.position / RawDirEntry::SIZE;
        let entry = fs
            .dir_entry(descriptor.inode, slot)
            .filter(|entry| !entry.is_end())
            .ok_or(Error::Corrupt)?;
        descriptor.position += RawDirEntry::SIZE;

        Ok(Some(DirEntry {
            inode: entry.inode_id() as u64,
            ty: fs.disk_inode(entry.inode_id()).kind.into(),
            name: entry.name().into(),
        }))
    }

    pub fn fstat(&self, pid: Pid, fd: usize) -> Result<Stat> {
        let mut inner = self.inner.lock();
        let Inner { fs, processes } = &mut *inner;

        let descriptor = descriptor_mut(processes, pid, fd)?;
        let disk_inode = fs.disk_inode(descriptor.inode);
        Ok(Stat {
            inode: disk_inode.id as u64,
            mode: disk_inode.kind.into(),
            block_size: BLOCK_SIZE as u64,
            blocks: disk_inode.blocks as u64,
            size: disk_inode.size as u64,
        })
    }

    pub fn usage(&self) -> Usage {
        self.inner.lock().fs.usage()
    }

    /// 进程退出，丢弃它的整张描述符表
    pub fn exit(&self, pid: Pid) {
        if let Some(table) = self.inner.lock().processes.remove(&pid) {
            log::debug!("pid {pid} exits with {} open files", table.iter().count());
        }
    }
}

impl Default for RamDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn create(&mut self, path: &str, kind: InodeKind) -> Result<u32> {
        let (parent, leaf) = match path.split_leaf() {
            Err(Error::IsRoot) => return Err(Error::AlreadyExists),
            split => split?,
        };
        let dir_id = self.fs.resolve_dir(parent)?;

        // 只有同类的同名项才算冲突
        match self.fs.find(dir_id, leaf, Some(kind)) {
            Ok(_) => {
                log::warn!("{path} already exists");
                return Err(Error::AlreadyExists);
            }
            Err(Error::NotFound) => (),
            Err(err) => return Err(err),
        }

        let inode_id = self.fs.alloc_inode(kind).map_err(|_| Error::NoSpace)?;
        if self.fs.grow_inode(inode_id).is_err() {
            self.fs.dealloc_inode(inode_id);
            return Err(Error::NoSpace);
        }
        if let Err(err) = self.fs.insert(dir_id, leaf, inode_id) {
            self.fs.clear_inode(inode_id);
            self.fs.dealloc_inode(inode_id);
            return Err(match err {
                Error::Exhausted => Error::NoSpace,
                err => err,
            });
        }

        log::debug!("created {kind:?} {path} as inode {inode_id}");
        Ok(inode_id)
    }

    fn open(&mut self, pid: Pid, path: &str, flags: BitFlags<OpenFlag>) -> Result<usize> {
        let inode_id = if path == "/" {
            ROOT_INODE
        } else {
            let (parent, leaf) = path.split_leaf()?;
            let dir_id = self.fs.resolve_dir(parent)?;

            match self.fs.find(dir_id, leaf, None) {
                Ok(inode_id) => inode_id,
                Err(Error::NotFound) if flags.contains(OpenFlag::CREATE) => {
                    self.create(path, InodeKind::Regular)?
                }
                Err(err) => {
                    log::warn!("cannot open {path}: {err:?}");
                    return Err(err);
                }
            }
        };

        if flags.contains(OpenFlag::TRUNC) {
            if self.fs.disk_inode(inode_id).is_dir() {
                return Err(Error::NotAFile);
            }
            self.fs.truncate(inode_id);
        }

        let fd = self.processes.entry(pid).or_default().insert(inode_id)?;
        log::debug!("pid {pid} opens {path} (inode {inode_id}) as fd {fd}");
        Ok(fd)
    }

    fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, leaf) = path.split_leaf()?;
        let dir_id = self.fs.resolve_dir(parent)?;
        let inode_id = self.fs.find(dir_id, leaf, None)?;

        let disk_inode = self.fs.disk_inode(inode_id);
        if disk_inode.is_dir() && !self.fs.is_empty_dir(inode_id) {
            return Err(Error::DirectoryNotEmpty);
        }
        if self.processes.values().any(|table| table.holds(inode_id)) {
            log::warn!("{path} is still open");
            return Err(Error::Busy);
        }

        self.fs.remove(dir_id, leaf, Some(disk_inode.kind))?;
        self.fs.clear_inode(inode_id);
        self.fs.dealloc_inode(inode_id);

        log::debug!("unlinked {path} (inode {inode_id})");
        Ok(())
    }
}

fn descriptor_mut(
    processes: &mut BTreeMap<Pid, FdTable>,
    pid: Pid,
    fd: usize,
) -> Result<&mut FileDescriptor> {
    processes
        .get_mut(&pid)
        .ok_or(Error::InvalidHandle)?
        .get_mut(fd)
}
