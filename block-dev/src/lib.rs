//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统只通过块设备驱动读写块设备，每次读写都是同步、整块的。

use core::any::Any;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use thiserror::Error;

/// 块大小，文件系统的基本分配单位
pub const BLOCK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block {block_id} is out of range (device has {total} blocks)")]
    OutOfRange { block_id: u64, total: u64 },

    #[error("buffer of {0} bytes is not a whole block")]
    BufferSize(usize),

    #[error("device i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> Result<(), BlockError>;
    fn write_block(&self, block_id: u64, buf: &[u8]) -> Result<(), BlockError>;
    /// 设备的总块数
    fn total_blocks(&self) -> u64;
}

/// 检查块号与缓冲区，供驱动实现复用
pub fn check_access(block_id: u64, buf_len: usize, total: u64) -> Result<(), BlockError> {
    if buf_len != BLOCK_SIZE {
        return Err(BlockError::BufferSize(buf_len));
    }
    if block_id >= total {
        return Err(BlockError::OutOfRange { block_id, total });
    }
    Ok(())
}

/// 内存中的块设备，测试与调试用
#[derive(Debug)]
pub struct MemoryDisk {
    data: Mutex<Vec<u8>>,
    total_blocks: u64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryDisk {
    pub fn new(total_blocks: u64) -> Self {
        Self {
            data: Mutex::new(vec![0; total_blocks as usize * BLOCK_SIZE]),
            total_blocks,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// 已完成的读块次数
    #[inline]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 已完成的写块次数
    #[inline]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn reset_stats(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }
}

impl BlockDevice for MemoryDisk {
    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        check_access(block_id, buf.len(), self.total_blocks)?;
        let start = block_id as usize * BLOCK_SIZE;
        buf.copy_from_slice(&self.data.lock()[start..start + BLOCK_SIZE]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &[u8]) -> Result<(), BlockError> {
        check_access(block_id, buf.len(), self.total_blocks)?;
        let start = block_id as usize * BLOCK_SIZE;
        self.data.lock()[start..start + BLOCK_SIZE].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }
}
