/// 文件系统操作的失败原因，宿主层原样转交给调用者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 没有空闲的 inode 或数据块
    NoSpace,
    NotFound,
    AlreadyExists,
    NotADirectory,
    NotAFile,
    /// 不允许对根目录执行的操作
    IsRoot,
    DirectoryNotEmpty,
    /// 文件描述符越界或已关闭
    InvalidHandle,
    /// 字节位置超出 inode 可寻址的范围
    OutOfRange,
    /// 分配器、inode 表或描述符表已满
    Exhausted,
    /// 内部不变式被破坏，例如目录项的结束标记错位
    Corrupt,
    /// 非绝对路径，或含有空的路径分量
    InvalidPath,
    NameTooLong,
    /// 仍有进程持有指向该 inode 的描述符。
    ///
    /// 有意新增的错误：`unlink` 在描述符全部关闭之前拒绝删除。
    Busy,
}
