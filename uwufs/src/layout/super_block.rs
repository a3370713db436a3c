use binrw::{BinRead, BinWrite};

use crate::{Error, Result};
use crate::{INODES_PER_BLOCK, MAGIC, RESERVED_SPACE};

/// 超级块，位于 0 号块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域；
/// - 缓存空闲链表的表头与空闲计数
#[derive(Debug, Clone, Default, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据块数
    pub total_blocks: u64,
    pub ilist_start: u64,
    pub ilist_total_size: u64,
    pub freelist_start: u64,
    pub freelist_total_size: u64,
    /// 空闲链表表头，0 表示链表已空
    pub freelist_head: u64,
    pub free_blocks_left: u64,
    pub free_inodes_left: u64,
}

impl SuperBlock {
    /// 按比例划分 i-list，其余块全部归入空闲链表
    pub fn layout(total_blocks: u64, ilist_percentage: f64) -> Result<Self> {
        let ilist_start = 1 + RESERVED_SPACE;
        let ilist_total_size = (ilist_percentage * total_blocks as f64).floor() as u64;
        let freelist_start = ilist_start + ilist_total_size;

        // 至少得放下根目录的一个数据块
        if ilist_total_size == 0 || freelist_start >= total_blocks {
            return Err(Error::InvalidArgument("device too small for this layout"));
        }
        let freelist_total_size = total_blocks - freelist_start;

        Ok(Self {
            magic: MAGIC,
            total_blocks,
            ilist_start,
            ilist_total_size,
            freelist_start,
            freelist_total_size,
            freelist_head: freelist_start,
            free_blocks_left: freelist_total_size,
            free_inodes_left: ilist_total_size * INODES_PER_BLOCK as u64 - 2,
        })
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn total_inodes(&self) -> u64 {
        self.ilist_total_size * INODES_PER_BLOCK as u64
    }

    /// 块是否位于数据区
    #[inline]
    pub fn is_data_block(&self, block_id: u64) -> bool {
        (self.freelist_start..self.total_blocks).contains(&block_id)
    }

    /// 检查各区域首尾相接、互不重叠，且不超出设备
    pub fn check_regions(&self, device_blocks: u64) -> Result<()> {
        let ilist_end = self.ilist_start.checked_add(self.ilist_total_size);
        let freelist_end = self.freelist_start.checked_add(self.freelist_total_size);

        let ok = self.ilist_start == 1 + RESERVED_SPACE
            && self.ilist_total_size > 0
            && ilist_end == Some(self.freelist_start)
            && freelist_end == Some(self.total_blocks)
            && self.total_blocks <= device_blocks
            && self.free_blocks_left <= self.freelist_total_size
            && self.free_inodes_left <= self.total_inodes()
            && (self.freelist_head == 0 || self.is_data_block(self.freelist_head));
        if !ok {
            return Err(Error::inconsistent(format!(
                "superblock regions are inconsistent: {self:?}"
            )));
        }
        Ok(())
    }
}
