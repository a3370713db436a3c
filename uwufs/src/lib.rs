//! # uwufs
//!
//! 类 Unix 的磁盘文件系统核心，直接建立在块设备之上。

/* uwufs 的整体架构，自上而下 */

// 操作集：供用户态文件系统桥接层调用
mod vfs;

// 一致性检查与容量统计
mod check;

// 文件读写、截断与释放
mod file;

// 路径解析
mod namei;

// 目录项管理
mod dir;

// 多级间接索引：逻辑块号到物理块号的映射
mod addressing;

// 磁盘块管理器层：超级块、空闲链表与索引节点表
mod fs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 块缓冲：一次读写一整块
mod block;

mod config;
mod error;

pub use block_dev::{BlockDevice, BlockError, MemoryDisk, BLOCK_SIZE};

pub use self::{
    addressing::DataBlocks,
    check::{CheckReport, StatFs},
    config::FsConfig,
    error::{Error, Result},
    fs::UwuFileSystem,
    layout::{DirEntry, DiskInode, FileKind, SuperBlock},
    vfs::Stat,
};

/// 超级块魔数，"uwuf"
pub const MAGIC: u32 = 0x7577_7566;

/// 保留块数，位于超级块之后
pub const RESERVED_SPACE: u64 = 1;
/// 根目录的 inode 编号，0 与 1 号从不分配
pub const ROOT_DIR_INODE: u64 = 2;

/// 直接索引个数
pub const DIRECT_BLOCKS: usize = 10;
/// 一个间接索引块可容纳的块编号数
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 8;
/// 单个文件最多可编号的块数
pub const MAX_FILE_BLOCKS: u64 = DIRECT_BLOCKS as u64
    + PTRS_PER_BLOCK as u64
    + (PTRS_PER_BLOCK as u64).pow(2)
    + (PTRS_PER_BLOCK as u64).pow(3);

pub const INODE_SIZE: usize = 256;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// 目录项中文件名字段的宽度
pub const FILE_NAME_SIZE: usize = 56;
/// 最后一字节留给 \0
pub const NAME_MAX: usize = FILE_NAME_SIZE - 1;
pub const DIR_ENTRY_SIZE: usize = 64;
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

type DataBlock = [u8; BLOCK_SIZE];

/// 当前时间，单位为秒
fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
