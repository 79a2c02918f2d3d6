
use std::fmt;

use enumflags2::BitFlags;
use ramfs::{OpenFlag, Pid, RamDisk, Request, Response, Usage};

/// 脚本中的一行
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// 交给控制通道的请求
    Request(Request),
    /// 之后的请求以该进程的身份发出
    Switch(Pid),
    /// 当前进程退出
    Exit,
    Usage,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidNumber(String),
    UnknownFlag(String),
}

/// 解析一行脚本，空行与 `#` 开头的注释行为空
pub fn parse_line(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim_start();
    let mut args = rest.split_whitespace();

    let command = match name {
        "create" => Command::Request(Request::Create {
            path: path(&mut args)?,
        }),
        "mkdir" => Command::Request(Request::Mkdir {
            path: path(&mut args)?,
        }),
        "open" => {
            let path = path(&mut args)?;
            let flags = args.try_fold(BitFlags::empty(), |flags: BitFlags<OpenFlag>, flag| {
                let flag = match flag {
                    "create" => OpenFlag::CREATE,
                    "trunc" => OpenFlag::TRUNC,
                    flag => return Err(ParseError::UnknownFlag(flag.into())),
                };
                Ok(flags | flag)
            })?;
            Command::Request(Request::Open { path, flags })
        }
        "close" => Command::Request(Request::Close {
            fd: number(&mut args, "fd")?,
        }),
        "read" => Command::Request(Request::Read {
            fd: number(&mut args, "fd")?,
            count: number(&mut args, "count")?,
        }),
        "write" => {
            let fd = number(&mut args, "fd")?;
            // fd 之后整行都是数据
            let data = rest
                .split_once(char::is_whitespace)
                .map(|(_, data)| data.trim_start())
                .ok_or(ParseError::MissingArgument("data"))?;
            Command::Request(Request::Write {
                fd,
                data: data.as_bytes().to_vec(),
            })
        }
        "lseek" => Command::Request(Request::Lseek {
            fd: number(&mut args, "fd")?,
            offset: number(&mut args, "offset")?,
        }),
        "unlink" => Command::Request(Request::Unlink {
            path: path(&mut args)?,
        }),
        "readdir" => Command::Request(Request::Readdir {
            fd: number(&mut args, "fd")?,
        }),
        "fstat" => Command::Request(Request::Fstat {
            fd: number(&mut args, "fd")?,
        }),
        "pid" => Command::Switch(number(&mut args, "pid")?),
        "exit" => Command::Exit,
        "usage" => Command::Usage,
        name => return Err(ParseError::UnknownCommand(name.into())),
    };

    Ok(Some(command))
}

fn path<'a>(args: &mut impl Iterator<Item = &'a str>) -> Result<String, ParseError> {
    args.next()
        .map(String::from)
        .ok_or(ParseError::MissingArgument("path"))
}

fn number<'a, T: std::str::FromStr>(
    args: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<T, ParseError> {
    let arg = args.next().ok_or(ParseError::MissingArgument(name))?;
    arg.parse()
        .map_err(|_| ParseError::InvalidNumber(arg.into()))
}

/// 按脚本驱动一个内存盘
pub struct Shell {
    disk: RamDisk,
    pid: Pid,
}

impl Shell {
    pub fn new(disk: RamDisk, pid: Pid) -> Self {
        Self { disk, pid }
    }

    /// 执行一行脚本，返回要输出的内容
    pub fn run_line(&mut self, line: &str) -> Option<String> {
        let command = match parse_line(line) {
            Ok(command) => command?,
            Err(err) => return Some(format!("parse error: {err}")),
        };

        let output = match command {
            Command::Request(request) => {
                log::debug!("pid {} dispatches {request:?}", self.pid);
                match self.disk.dispatch(self.pid, request) {
                    Ok(response) => render(&response),
                    Err(err) => format!("error: {err:?}"),
                }
            }
            Command::Switch(pid) => {
                self.pid = pid;
                format!("pid {pid}")
            }
            Command::Exit => {
                self.disk.exit(self.pid);
                format!("pid {} exited", self.pid)
            }
            Command::Usage => render_usage(&self.disk.usage()),
        };

        Some(output)
    }
}

pub fn render(response: &Response) -> String {
    match response {
        Response::Created(inode) => format!("inode {inode}"),
        Response::Done => "ok".into(),
        Response::Opened(fd) => format!("fd {fd}"),
        Response::Read(data) => String::from_utf8_lossy(data).into_owned(),
        Response::Written(n) => format!("wrote {n} bytes"),
        Response::Seeked(position) => format!("position {position}"),
        Response::Entry(Some(entry)) => format!("{:?} {} {}", entry.ty, entry.inode, entry.name),
        Response::Entry(None) => "end of directory".into(),
        Response::Stat(stat) => format!(
            "{:?} inode={} size={} blocks={}",
            stat.mode, stat.inode, stat.size, stat.blocks
        ),
    }
}

fn render_usage(usage: &Usage) -> String {
    format!(
        "blocks {}/{} free, inodes {}/{} free{}",
        usage.free_blocks,
        usage.data_blocks,
        usage.free_inodes,
        usage.inode_count,
        if usage.is_consistent() { "" } else { " (inconsistent)" }
    )
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand(name) => write!(f, "unknown command `{name}`"),
            Self::MissingArgument(name) => write!(f, "missing argument <{name}>"),
            Self::InvalidNumber(arg) => write!(f, "`{arg}` is not a number"),
            Self::UnknownFlag(flag) => write!(f, "unknown open flag `{flag}`"),
        }
    }
}
