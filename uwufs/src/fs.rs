//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：
//! - 块分配器：以空闲链表管理数据区，表头缓存在超级块中；
//! - 索引节点表：i-list 上定长 inode 的读写与空闲 inode 查找。
//!
//! 所有状态都在磁盘上，这里只缓存格式化后不再变化的区域几何信息。

use std::sync::Arc;

use block_dev::BlockDevice;
use log::{debug, info, warn};
use spin::Mutex;

use crate::block::{self, BlockBuf};
use crate::layout::{DirBlock, DirEntry, DiskInode, FileKind, FreeNode, SuperBlock};
use crate::{now, Error, FsConfig, Result};
use crate::{BLOCK_SIZE, INODES_PER_BLOCK, INODE_SIZE, RESERVED_SPACE, ROOT_DIR_INODE};

pub struct UwuFileSystem {
    pub(crate) block_device: Arc<dyn BlockDevice>,
    pub(crate) config: FsConfig,
    total_blocks: u64,
    ilist_start: u64,
    ilist_total_size: u64,
    freelist_start: u64,
}

impl UwuFileSystem {
    /// 在块设备上建立全新的文件系统
    pub fn format(block_device: Arc<dyn BlockDevice>, config: FsConfig) -> Result<Arc<Mutex<Self>>> {
        config.validate()?;
        let total_blocks = block_device.total_blocks();
        let super_block = SuperBlock::layout(total_blocks, config.ilist_percentage)?;
        info!(
            "formatting {total_blocks} blocks: {} i-list blocks, {} data blocks",
            super_block.ilist_total_size, super_block.freelist_total_size
        );

        // 保留块与 i-list 清零，所有 inode 均为空闲
        for block_id in 1..super_block.freelist_start {
            block::zero(block_id, &block_device)?;
        }

        // 数据区依次串成空闲链表
        for block_id in super_block.freelist_start..total_blocks {
            let next_free_block = if block_id + 1 < total_blocks {
                block_id + 1
            } else {
                0
            };
            let mut buf = BlockBuf::zeroed(block_id, &block_device);
            buf.put(0, &FreeNode { next_free_block })?;
            buf.sync()?;
        }

        let mut buf = BlockBuf::zeroed(0, &block_device);
        buf.put(0, &super_block)?;
        buf.sync()?;

        let mut fs = Self::with_geometry(block_device, config, &super_block);
        fs.create_root()?;

        Ok(Arc::new(Mutex::new(fs)))
    }

    /// 挂载已格式化的块设备
    pub fn open(block_device: Arc<dyn BlockDevice>, config: FsConfig) -> Result<Arc<Mutex<Self>>> {
        let super_block: SuperBlock = BlockBuf::load(0, &block_device)?.get(0)?;
        if !super_block.is_valid() {
            return Err(Error::InvalidArgument("not a uwufs image (bad magic)"));
        }
        super_block.check_regions(block_device.total_blocks())?;
        info!(
            "opened uwufs: {} blocks, {} free blocks, {} free inodes",
            super_block.total_blocks, super_block.free_blocks_left, super_block.free_inodes_left
        );

        Ok(Arc::new(Mutex::new(Self::with_geometry(
            block_device,
            config,
            &super_block,
        ))))
    }

    fn with_geometry(
        block_device: Arc<dyn BlockDevice>,
        config: FsConfig,
        super_block: &SuperBlock,
    ) -> Self {
        Self {
            block_device,
            config,
            total_blocks: super_block.total_blocks,
            ilist_start: super_block.ilist_start,
            ilist_total_size: super_block.ilist_total_size,
            freelist_start: super_block.freelist_start,
        }
    }

    /// 根目录只含 `.` 与 `..`，两者都指向自己
    fn create_root(&mut self) -> Result<()> {
        let block_id = self.allocate_block()?;
        let mut entries = DirBlock::default();
        entries.put_entry(DirEntry::new(".", ROOT_DIR_INODE)?)?;
        entries.put_entry(DirEntry::new("..", ROOT_DIR_INODE)?)?;
        self.write_dir_block(block_id, &entries)?;

        let mut root = DiskInode::new(FileKind::Directory, 0o755, 0, 0, now());
        root.link_count = 2;
        root.file_size = BLOCK_SIZE as u64;
        root.direct_blocks[0] = block_id;

        let inode_number = self.alloc_inode(&root)?;
        if inode_number != ROOT_DIR_INODE {
            return Err(Error::inconsistent(format!(
                "root directory landed on inode {inode_number}"
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        &self.block_device
    }

    #[inline]
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    #[inline]
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    #[inline]
    pub fn total_inodes(&self) -> u64 {
        self.ilist_total_size * INODES_PER_BLOCK as u64
    }

    /// 超级块、保留块与 i-list 所占的块数
    #[inline]
    pub fn metadata_blocks(&self) -> u64 {
        self.freelist_start
    }

    #[inline]
    pub(crate) fn is_data_block(&self, block_id: u64) -> bool {
        (self.freelist_start..self.total_blocks).contains(&block_id)
    }

    pub fn super_block(&self) -> Result<SuperBlock> {
        BlockBuf::load(0, &self.block_device)?.get(0)
    }

    fn write_super_block(&self, super_block: &SuperBlock) -> Result<()> {
        let mut buf = BlockBuf::load(0, &self.block_device)?;
        buf.put(0, super_block)?;
        buf.sync()
    }
}

/* 块分配器 */
impl UwuFileSystem {
    /// 弹出空闲链表表头
    pub fn allocate_block(&mut self) -> Result<u64> {
        let mut super_block = self.super_block()?;
        let block_id = super_block.freelist_head;
        if block_id == 0 {
            return Err(Error::OutOfSpace);
        }
        if !self.is_data_block(block_id) {
            return Err(Error::inconsistent(format!(
                "free list head {block_id} lies outside the data region"
            )));
        }

        let node: FreeNode = BlockBuf::load(block_id, &self.block_device)?.get(0)?;
        super_block.freelist_head = node.next_free_block;
        super_block.free_blocks_left = super_block
            .free_blocks_left
            .checked_sub(1)
            .ok_or_else(|| Error::inconsistent("free block counter underflow"))?;
        self.write_super_block(&super_block)?;

        debug!("allocated block {block_id}");
        Ok(block_id)
    }

    /// 分配一个块并清零
    pub fn allocate_zeroed_block(&mut self) -> Result<u64> {
        let block_id = self.allocate_block()?;
        if let Err(e) = block::zero(block_id, &self.block_device) {
            self.release_after_failure(block_id);
            return Err(e);
        }
        Ok(block_id)
    }

    /// 把块压回空闲链表表头。
    /// 只校验块号位于数据区，不校验它此前是否已被分配。
    pub fn free_block(&mut self, block_id: u64) -> Result<()> {
        if !self.is_data_block(block_id) {
            return Err(Error::inconsistent(format!(
                "refusing to free block {block_id} outside the data region"
            )));
        }

        let mut super_block = self.super_block()?;
        let mut buf = BlockBuf::zeroed(block_id, &self.block_device);
        buf.put(
            0,
            &FreeNode {
                next_free_block: super_block.freelist_head,
            },
        )?;
        buf.sync()?;

        super_block.freelist_head = block_id;
        super_block.free_blocks_left += 1;
        self.write_super_block(&super_block)?;

        debug!("freed block {block_id}");
        Ok(())
    }

    /// 尽力归还已分配的块，用于出错后的回滚
    pub(crate) fn release_after_failure(&mut self, block_id: u64) {
        warn!("rolling back allocation of block {block_id}");
        if let Err(e) = self.free_block(block_id) {
            warn!("block {block_id} leaked during rollback: {e}");
        }
    }

    #[inline]
    pub fn free_blocks_left(&self) -> Result<u64> {
        Ok(self.super_block()?.free_blocks_left)
    }

    /// 多块变更之前预先确认空间足够，避免做到一半才失败
    pub(crate) fn ensure_free_blocks(&self, needed: u64) -> Result<()> {
        if self.free_blocks_left()? < needed {
            return Err(Error::OutOfSpace);
        }
        Ok(())
    }
}

/* 索引节点表 */
impl UwuFileSystem {
    /// inode 在磁盘上的位置：**块ID**以及**块内偏移**
    pub fn inode_pos(&self, inode_number: u64) -> Result<(u64, usize)> {
        if inode_number >= self.total_inodes() {
            return Err(Error::InvalidArgument("inode number out of range"));
        }
        let byte_offset = inode_number * INODE_SIZE as u64;
        let block_id = self.ilist_start + byte_offset / BLOCK_SIZE as u64;
        let block_offset = (byte_offset % BLOCK_SIZE as u64) as usize;

        Ok((block_id, block_offset))
    }

    pub fn read_inode(&self, inode_number: u64) -> Result<DiskInode> {
        let (block_id, block_offset) = self.inode_pos(inode_number)?;
        BlockBuf::load(block_id, &self.block_device)?.get(block_offset)
    }

    pub fn write_inode(&self, inode_number: u64, inode: &DiskInode) -> Result<()> {
        let (block_id, block_offset) = self.inode_pos(inode_number)?;
        let mut buf = BlockBuf::load(block_id, &self.block_device)?;
        // 先清空整个槽位，记录之后的填充字节恒为 0
        buf.map_mut(|data| data[block_offset..block_offset + INODE_SIZE].fill(0));
        buf.put(block_offset, inode)?;
        buf.sync()
    }

    /// 线性扫描 i-list，返回第一个空闲的 inode 编号
    pub fn find_free_inode(&self) -> Result<u64> {
        let first_block = ROOT_DIR_INODE / INODES_PER_BLOCK as u64;
        for block_index in first_block..self.ilist_total_size {
            let buf = BlockBuf::load(self.ilist_start + block_index, &self.block_device)?;
            for slot in 0..INODES_PER_BLOCK {
                let inode_number = block_index * INODES_PER_BLOCK as u64 + slot as u64;
                if inode_number < ROOT_DIR_INODE {
                    continue;
                }
                let inode: DiskInode = buf.get(slot * INODE_SIZE)?;
                if inode.is_free() {
                    return Ok(inode_number);
                }
            }
        }

        Err(Error::OutOfInodes)
    }

    /// 找到空闲 inode，写入 `inode` 并返回其编号
    pub fn alloc_inode(&mut self, inode: &DiskInode) -> Result<u64> {
        let inode_number = self.find_free_inode()?;
        self.write_inode(inode_number, inode)?;

        let mut super_block = self.super_block()?;
        super_block.free_inodes_left = super_block.free_inodes_left.saturating_sub(1);
        self.write_super_block(&super_block)?;

        debug!("allocated inode {inode_number}");
        Ok(inode_number)
    }

    /// inode 重新标记为空闲
    pub fn release_inode(&mut self, inode_number: u64) -> Result<()> {
        self.write_inode(inode_number, &DiskInode::default())?;

        let mut super_block = self.super_block()?;
        super_block.free_inodes_left += 1;
        self.write_super_block(&super_block)?;

        debug!("released inode {inode_number}");
        Ok(())
    }
}

impl core::fmt::Debug for UwuFileSystem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UwuFileSystem")
            .field("total_blocks", &self.total_blocks)
            .field("ilist_start", &self.ilist_start)
            .field("ilist_total_size", &self.ilist_total_size)
            .field("freelist_start", &self.freelist_start)
            .field("reserved", &RESERVED_SPACE)
            .finish()
    }
}
