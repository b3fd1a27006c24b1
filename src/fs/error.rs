use thiserror::Error;

/// 文件系统错误类型
#[derive(Debug, Error)]
pub enum FsError {
    /// 底层 I/O 错误
    #[error("Disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 磁盘上的结构无法解码
    #[error("On-disk record could not be decoded: {0}")]
    Codec(#[from] bincode::Error),

    /// 块位图或 inode 位图已满
    #[error("No free {0} available")]
    NoSpace(&'static str),

    #[error("File or directory not found: {0}")]
    NotFound(String),

    #[error("File or directory already exists: {0}")]
    AlreadyExists(String),

    #[error("Expected a directory, found a file: {0}")]
    NotADirectory(String),

    #[error("Expected a file, found a directory: {0}")]
    IsADirectory(String),

    #[error("Directory is not empty: {0}")]
    DirectoryNotEmpty(String),

    /// 目录的 12 个直接块和 128 个间接块都已用完
    #[error("Directory is full")]
    DirectoryFull,

    #[error("File would exceed the maximum size of {max} bytes")]
    FileTooLarge { max: u32 },

    /// 文件已被其他人以写方式打开
    #[error("File is already open for writing: inode {0}")]
    WriteConflict(u32),

    #[error("File is in use and cannot be deleted: {0}")]
    InUse(String),

    #[error("Failed to allocate a transient buffer")]
    AllocationFailure,

    #[error("File name is longer than {max} bytes: {name}")]
    NameTooLong { name: String, max: usize },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid inode: {0}")]
    InvalidInode(u32),

    /// 读位置已到文件末尾
    #[error("End of file")]
    EndOfFile,

    #[error("Bad file descriptor: {0}")]
    BadDescriptor(usize),

    #[error("Too many open files")]
    TooManyOpenFiles,

    #[error("Seek position {0} is outside the file")]
    InvalidSeek(i64),

    #[error("Partition of {0} sectors is too small to format")]
    PartitionTooSmall(u32),

    #[error("File system corrupted: {0}")]
    Corrupted(String),
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FsError>;
