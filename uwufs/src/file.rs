//! # 文件读写
//!
//! 数据块总是稠密的：文件的块数恒为 `ceil(file_size / BLOCK_SIZE)`，
//! 扩展时中间的块全部分配并清零。

use log::debug;

use crate::block::BlockBuf;
use crate::layout::{DiskInode, FileKind};
use crate::{addressing, now, Error, Result, UwuFileSystem};
use crate::{BLOCK_SIZE, MAX_FILE_BLOCKS};

const BS: u64 = BLOCK_SIZE as u64;

impl UwuFileSystem {
    fn read_regular(&self, inode_number: u64) -> Result<DiskInode> {
        let inode = self.read_inode(inode_number)?;
        match inode.kind()? {
            FileKind::Regular => Ok(inode),
            FileKind::Directory => Err(Error::IsADirectory),
            FileKind::Symlink => Err(Error::InvalidArgument("not a regular file")),
        }
    }

    /// 读出 `[offset, offset+len)`，越过文件末尾的部分被截掉
    pub fn read(&self, inode_number: u64, offset: u64, len: usize) -> Result<Vec<u8>> {
        let inode = self.read_inode(inode_number)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let end = offset.saturating_add(len as u64).min(inode.file_size);
        if offset >= end {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity((end - offset) as usize);
        let mut pos = offset;
        for block_id in self.data_blocks(&inode, offset / BS) {
            if pos >= end {
                break;
            }
            let block_start = pos / BS * BS;
            let lo = (pos - block_start) as usize;
            let hi = ((end - block_start).min(BS)) as usize;

            let buf = BlockBuf::load(block_id?, &self.block_device)?;
            buf.map(|data| out.extend_from_slice(&data[lo..hi]));
            pos = block_start + hi as u64;
        }

        if pos < end {
            return Err(Error::inconsistent(format!(
                "inode {inode_number} has fewer blocks than its size"
            )));
        }
        Ok(out)
    }

    /// 在 `offset` 处写入，返回写入的字节数
    pub fn write(&mut self, inode_number: u64, offset: u64, data: &[u8]) -> Result<usize> {
        let mut inode = self.read_regular(inode_number)?;
        if data.is_empty() {
            return Ok(0);
        }

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(Error::InvalidArgument("write past the end of the address space"))?;
        if end.div_ceil(BS) > inode.data_blocks() {
            self.grow_to_blocks(&mut inode, end.div_ceil(BS))?;
            // 新块都已清零，先落盘以免块号丢失
            inode.file_size = end;
            self.write_inode(inode_number, &inode)?;
        }

        let mut pos = offset;
        for block_id in self.data_blocks(&inode, offset / BS) {
            if pos >= end {
                break;
            }
            let block_start = pos / BS * BS;
            let lo = (pos - block_start) as usize;
            let hi = ((end - block_start).min(BS)) as usize;
            let src = &data[(pos - offset) as usize..(block_start + hi as u64 - offset) as usize];

            let block_id = block_id?;
            // 整块覆盖时不必先读
            let mut buf = if lo == 0 && hi == BLOCK_SIZE {
                BlockBuf::zeroed(block_id, &self.block_device)
            } else {
                BlockBuf::load(block_id, &self.block_device)?
            };
            buf.map_mut(|block| block[lo..hi].copy_from_slice(src));
            buf.sync()?;
            pos = block_start + hi as u64;
        }

        inode.file_size = inode.file_size.max(end);
        inode.touch(now());
        self.write_inode(inode_number, &inode)?;
        Ok(data.len())
    }

    /// 追加清零的数据块直到共有 `target` 块，空间不足时不做任何改动
    pub(crate) fn grow_to_blocks(&mut self, inode: &mut DiskInode, target: u64) -> Result<()> {
        let current = inode.data_blocks();
        if target <= current {
            return Ok(());
        }
        if target > MAX_FILE_BLOCKS {
            return Err(Error::InvalidArgument("file exceeds the addressable size"));
        }
        // 数据块数是下界，先用它快速拒绝
        self.ensure_free_blocks(target - current)?;
        self.ensure_free_blocks(addressing::blocks_for_growth(current, target))?;

        for index in current..target {
            let block_id = self.allocate_zeroed_block()?;
            if let Err(e) = self.append_block(inode, index, block_id) {
                self.release_after_failure(block_id);
                return Err(e);
            }
        }
        debug!("grew file from {current} to {target} blocks");
        Ok(())
    }

    /// 释放全部数据块与间接索引块，文件长度归零
    pub fn truncate(&mut self, inode_number: u64) -> Result<()> {
        let mut inode = self.read_regular(inode_number)?;
        let count = inode.data_blocks();

        // 先释放数据块，索引块还要用来找到它们
        let blocks = self.data_blocks(&inode, 0).collect::<Result<Vec<_>>>()?;
        for block_id in blocks {
            self.free_block(block_id)?;
        }
        self.remove_block_range(&mut inode, 0, count)?;

        inode.clear_pointers();
        inode.file_size = 0;
        inode.touch(now());
        self.write_inode(inode_number, &inode)?;

        debug!("truncated inode {inode_number} ({count} blocks)");
        Ok(())
    }

    /// 把普通文件调整为 `len` 字节，增长的部分读出为 0
    pub fn set_len(&mut self, inode_number: u64, len: u64) -> Result<()> {
        if len == 0 {
            return self.truncate(inode_number);
        }
        let mut inode = self.read_regular(inode_number)?;
        let current = inode.data_blocks();
        let target = len.div_ceil(BS);

        if target < current {
            let blocks = self
                .data_blocks(&inode, target)
                .collect::<Result<Vec<_>>>()?;
            for block_id in blocks {
                self.free_block(block_id)?;
            }
            self.remove_block_range(&mut inode, target, current)?;
        } else {
            self.grow_to_blocks(&mut inode, target)?;
        }

        // 缩短后，新末块中越过文件末尾的字节要清零
        if len < inode.file_size && len % BS != 0 {
            let last = self.get_block(&inode, target - 1)?;
            let mut buf = BlockBuf::load(last, &self.block_device)?;
            buf.map_mut(|data| data[(len % BS) as usize..].fill(0));
            buf.sync()?;
        }

        inode.file_size = len;
        inode.touch(now());
        self.write_inode(inode_number, &inode)
    }

    /// 释放 inode 拥有的全部块，并把 inode 标记为空闲
    pub fn remove_file(&mut self, inode_number: u64) -> Result<()> {
        let inode = self.read_inode(inode_number)?;

        self.free_tree(3, inode.triple_indirect)?;
        self.free_tree(2, inode.double_indirect)?;
        self.free_tree(1, inode.single_indirect)?;
        for block_id in inode.direct_blocks {
            self.free_tree(0, block_id)?;
        }

        self.release_inode(inode_number)?;
        debug!("removed inode {inode_number}");
        Ok(())
    }

    /// 为符号链接写入目标路径
    pub(crate) fn write_symlink_target(&mut self, inode: &mut DiskInode, target: &str) -> Result<()> {
        let block_id = self.allocate_block()?;
        let mut buf = BlockBuf::zeroed(block_id, &self.block_device);
        buf.map_mut(|data| data[..target.len()].copy_from_slice(target.as_bytes()));
        if let Err(e) = buf.sync() {
            self.release_after_failure(block_id);
            return Err(e);
        }

        inode.direct_blocks[0] = block_id;
        inode.file_size = target.len() as u64;
        Ok(())
    }
}
