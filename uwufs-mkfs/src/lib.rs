//! 把宿主机上的镜像文件当作块设备

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use block_dev::{check_access, BlockDevice, BlockError, BLOCK_SIZE};
use spin::Mutex;

#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    total_blocks: u64,
}

impl BlockFile {
    /// 按文件长度推算块数，不足一块的尾部被忽略
    pub fn new(file: File) -> Result<Self, BlockError> {
        let total_blocks = file.metadata()?.len() / BLOCK_SIZE as u64;
        Ok(Self {
            file: Mutex::new(file),
            total_blocks,
        })
    }

    /// 新建（或清空）镜像文件并定长为 `total_blocks` 块
    pub fn create(path: impl AsRef<Path>, total_blocks: u64) -> Result<Self, BlockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total_blocks * BLOCK_SIZE as u64)?;
        Self::new(file)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(file)
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        check_access(block_id, buf.len(), self.total_blocks)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &[u8]) -> Result<(), BlockError> {
        check_access(block_id, buf.len(), self.total_blocks)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    #[inline]
    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }
}
