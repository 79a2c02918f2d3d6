//! # 控制通道层
//!
//! 外部宿主把请求编码为 [`Request`]，交给 [`RamDisk::dispatch`] 执行后取回 [`Response`]。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use enumflags2::BitFlags;
use vfs::{DirEntry, Stat};

use crate::ramdisk::{OpenFlag, Pid, RamDisk};
use crate::MAX_FILE_SIZE;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create { path: String },
    Mkdir { path: String },
    Open { path: String, flags: BitFlags<OpenFlag> },
    Close { fd: usize },
    Read { fd: usize, count: usize },
    Write { fd: usize, data: Vec<u8> },
    Lseek { fd: usize, offset: i64 },
    Unlink { path: String },
    Readdir { fd: usize },
    Fstat { fd: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// 新建项的 inode 编号
    Created(u32),
    Done,
    Opened(usize),
    Read(Vec<u8>),
    Written(usize),
    Seeked(usize),
    /// 目录已读完时为空
    Entry(Option<DirEntry>),
    Stat(Stat),
}

impl RamDisk {
    pub fn dispatch(&self, pid: Pid, request: Request) -> Result<Response> {
        let response = match request {
            Request::Create { path } => Response::Created(self.create(&path)?),
            Request::Mkdir { path } => Response::Created(self.mkdir(&path)?),
            Request::Open { path, flags } => Response::Opened(self.open_with(pid, &path, flags)?),
            Request::Close { fd } => {
                self.close(pid, fd)?;
                Response::Done
            }
            Request::Read { fd, count } => {
                // 文件不会超过 MAX_FILE_SIZE，更大的请求只读到文件末尾
                let mut buf = vec![0; count.min(MAX_FILE_SIZE)];
                let read = self.read(pid, fd, &mut buf)?;
                buf.truncate(read);
                Response::Read(buf)
            }
            Request::Write { fd, data } => Response::Written(self.write(pid, fd, &data)?),
            Request::Lseek { fd, offset } => Response::Seeked(self.lseek(pid, fd, offset)?),
            Request::Unlink { path } => {
                self.unlink(&path)?;
                Response::Done
            }
            Request::Readdir { fd } => Response::Entry(self.readdir(pid, fd)?),
            Request::Fstat { fd } => Response::Stat(self.fstat(pid, fd)?),
        };

        Ok(response)
    }
}
