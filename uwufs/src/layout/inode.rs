//! 磁盘上的 inode
//!
//! 块编号均为物理块号，0 表示不存在。
//!
//! - 直接索引：`direct_blocks` 中每个编号都指向一个**数据块**
//! - 一级：整个块连续存储**块编号**，每个编号都指向一个数据块
//! - 二级：整个块连续存储**块编号**，每个编号都指向一个一级索引块
//! - 三级：整个块连续存储**块编号**，每个编号都指向一个二级索引块
//!
//! 目录的空间用于存放子项的元信息；
//! 文件的空间用于存放它的数据；
//! 符号链接的第一个数据块存放目标路径。

use binrw::{BinRead, BinWrite};
use enumflags2::{bitflags, BitFlags};

use crate::{Error, Result};
use crate::{BLOCK_SIZE, DIRECT_BLOCKS};

/// `file_mode` 中表示类型的位
pub const TYPE_BITS: u32 = 0o170000;
/// `file_mode` 中表示权限的位
pub const PERM_BITS: u32 = 0o7777;

/// 文件类型，类型位全为 0 的 inode 是空闲的
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular = 0o010000,
    Directory = 0o020000,
    Symlink = 0o040000,
}

impl FileKind {
    /// 对应的 POSIX `S_IFMT` 取值
    pub fn posix_bits(self) -> u32 {
        match self {
            Self::Regular => 0o100000,
            Self::Directory => 0o040000,
            Self::Symlink => 0o120000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct DiskInode {
    /// 类型位 + 权限位
    pub file_mode: u32,
    /// 硬链接个数
    pub link_count: u32,
    pub uid: u32,
    pub gid: u32,
    /// 文件字节数
    pub file_size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub direct_blocks: [u64; DIRECT_BLOCKS],
    /// 指向一个一级索引块
    pub single_indirect: u64,
    /// 指向一个二级索引块
    pub double_indirect: u64,
    /// 指向一个三级索引块
    pub triple_indirect: u64,
}

impl DiskInode {
    pub fn new(kind: FileKind, perm: u32, uid: u32, gid: u32, now: u64) -> Self {
        Self {
            file_mode: kind as u32 | (perm & PERM_BITS),
            link_count: 1,
            uid,
            gid,
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.file_mode & TYPE_BITS == 0
    }

    pub fn kind(&self) -> Result<FileKind> {
        BitFlags::<FileKind>::from_bits(self.file_mode & TYPE_BITS)
            .ok()
            .and_then(|kind| kind.exactly_one())
            .ok_or(Error::InvalidArgument("unrecognized file mode"))
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_mode & TYPE_BITS == FileKind::Directory as u32
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.file_mode & TYPE_BITS == FileKind::Symlink as u32
    }

    #[inline]
    pub fn permissions(&self) -> u32 {
        self.file_mode & PERM_BITS
    }

    #[inline]
    pub fn set_permissions(&mut self, perm: u32) {
        self.file_mode = (self.file_mode & TYPE_BITS) | (perm & PERM_BITS);
    }

    /// 已分配的数据块个数
    #[inline]
    pub fn data_blocks(&self) -> u64 {
        self.file_size.div_ceil(BLOCK_SIZE as u64)
    }

    #[inline]
    pub fn touch(&mut self, now: u64) {
        self.atime = now;
        self.mtime = now;
        self.ctime = now;
    }

    pub fn clear_pointers(&mut self) {
        self.direct_blocks = [0; DIRECT_BLOCKS];
        self.single_indirect = 0;
        self.double_indirect = 0;
        self.triple_indirect = 0;
    }
}
