use block_dev::BlockError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no free data block left")]
    OutOfSpace,

    #[error("no free inode left")]
    OutOfInodes,

    #[error("no such file or directory")]
    NotFound,

    #[error("file exists")]
    AlreadyExists,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("directory not empty")]
    NotEmpty,

    #[error("file name too long")]
    NameTooLong,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("too many levels of symbolic links")]
    TooManySymlinks,

    /// 单个目录块已无空闲槽位，目录管理器会为目录追加新块
    #[error("directory block is full")]
    DirBlockFull,

    #[error(transparent)]
    Device(#[from] BlockError),

    #[error("malformed on-disk record: {0}")]
    Codec(#[from] binrw::Error),

    /// 磁盘上的结构违背了文件系统的不变式
    #[error("filesystem inconsistency: {0}")]
    Inconsistent(String),
}

impl Error {
    /// 桥接层返回给内核的 errno
    pub fn errno(&self) -> i32 {
        match self {
            Self::OutOfSpace | Self::DirBlockFull => 28, // ENOSPC
            Self::OutOfInodes => 122,                    // EDQUOT
            Self::NotFound => 2,                         // ENOENT
            Self::AlreadyExists => 17,                   // EEXIST
            Self::NotADirectory => 20,                   // ENOTDIR
            Self::IsADirectory => 21,                    // EISDIR
            Self::NotEmpty => 39,                        // ENOTEMPTY
            Self::NameTooLong => 36,                     // ENAMETOOLONG
            Self::InvalidArgument(_) => 22,              // EINVAL
            Self::TooManySymlinks => 40,                 // ELOOP
            Self::Device(_) | Self::Codec(_) | Self::Inconsistent(_) => 5, // EIO
        }
    }

    /// 是否意味着磁盘已损坏，而非普通的操作失败
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Inconsistent(_) | Self::Codec(_))
    }

    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("{msg}");
        Self::Inconsistent(msg)
    }
}
