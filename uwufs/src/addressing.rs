//! # 多级间接索引
//!
//! 逻辑上 inode 指向一系列数据块，这里把数据块的逻辑索引翻译成物理块号。
//! 记 K 为一个间接索引块可容纳的块编号数：
//!
//! | 层级 | 逻辑索引范围 |
//! | --- | --- |
//! | 直接 | `[0, 10)` |
//! | 一级 | `[10, 10+K)` |
//! | 二级 | `[10+K, 10+K+K²)` |
//! | 三级 | `[10+K+K², 10+K+K²+K³)` |
//!
//! ## 块索引编码
//!
//! x 级索引块下每一项覆盖 K^(x-1) 个数据块：
//! - 层内偏移除以 K^(x-1)，可得本块中的槽位
//! - 层内偏移模 K^(x-1)，可得下一级块内的偏移
//!
//! 翻译器只改动 inode 的块编号字段与间接索引块，
//! 调用者负责写回 inode。

use std::sync::Arc;

use block_dev::BlockDevice;
use log::trace;

use crate::block::{read_indirect, write_indirect};
use crate::layout::{DiskInode, IndirectBlock};
use crate::{Error, Result, UwuFileSystem};
use crate::{DIRECT_BLOCKS, PTRS_PER_BLOCK, RESERVED_SPACE};

const K: u64 = PTRS_PER_BLOCK as u64;
const DIRECT: u64 = DIRECT_BLOCKS as u64;

/// `level` 级子树覆盖的数据块数
#[inline]
const fn span(level: u32) -> u64 {
    K.pow(level)
}

/// `level` 级层在逻辑索引上的起点
const fn tier_start(level: u32) -> u64 {
    let mut start = DIRECT;
    let mut l = 1;
    while l < level {
        start += span(l);
        l += 1;
    }
    start
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Direct(usize),
    /// `offset` 为层内偏移
    Indirect { level: u32, offset: u64 },
}

fn locate(index: u64) -> Option<Tier> {
    if index < DIRECT {
        return Some(Tier::Direct(index as usize));
    }
    (1..=3).find_map(|level| {
        let start = tier_start(level);
        (index >= start && index - start < span(level)).then(|| Tier::Indirect {
            level,
            offset: index - start,
        })
    })
}

fn tier_root(inode: &DiskInode, level: u32) -> u64 {
    match level {
        1 => inode.single_indirect,
        2 => inode.double_indirect,
        _ => inode.triple_indirect,
    }
}

fn tier_root_mut(inode: &mut DiskInode, level: u32) -> &mut u64 {
    match level {
        1 => &mut inode.single_indirect,
        2 => &mut inode.double_indirect,
        _ => &mut inode.triple_indirect,
    }
}

/// 追加第 `index` 块时需要新建的间接索引块数
pub(crate) fn metadata_blocks_for_append(index: u64) -> u64 {
    match locate(index) {
        Some(Tier::Indirect { level, offset }) => {
            (1..=level).filter(|&l| offset % span(l) == 0).count() as u64
        }
        _ => 0,
    }
}

/// `[from, to)` 中 `step` 的倍数个数
#[inline]
fn multiples_in(from: u64, to: u64, step: u64) -> u64 {
    to.div_ceil(step) - from.div_ceil(step)
}

/// 把文件从 `from` 块增长到 `to` 块所需的总块数（数据块 + 间接索引块）。
///
/// l 级块覆盖 K^l 个数据块，层内偏移每逢 K^l 的倍数就要新建一个，按层直接计数。
pub(crate) fn blocks_for_growth(from: u64, to: u64) -> u64 {
    if from >= to {
        return 0;
    }
    let metadata: u64 = (1..=3)
        .map(|level| {
            let lo = tier_start(level);
            let (a, b) = (from.max(lo), to.min(lo + span(level)));
            if a >= b {
                return 0;
            }
            (1..=level)
                .map(|l| multiples_in(a - lo, b - lo, span(l)))
                .sum::<u64>()
        })
        .sum();
    (to - from) + metadata
}

impl UwuFileSystem {
    /// 第 `index` 个数据块的物理块号，路径上任一编号缺失都返回 0
    pub fn get_block(&self, inode: &DiskInode, index: u64) -> Result<u64> {
        match locate(index) {
            None => Ok(0),
            Some(Tier::Direct(i)) => Ok(inode.direct_blocks[i]),
            Some(Tier::Indirect { level, offset }) => {
                self.lookup_at(level, tier_root(inode, level), offset)
            }
        }
    }

    fn lookup_at(&self, mut level: u32, mut block_id: u64, mut offset: u64) -> Result<u64> {
        loop {
            if block_id == 0 {
                return Ok(0);
            }
            let indirect = read_indirect(block_id, &self.block_device)?;
            let child_span = span(level - 1);
            let next = indirect[(offset / child_span) as usize];
            if level == 1 {
                return Ok(next);
            }
            block_id = next;
            offset %= child_span;
            level -= 1;
        }
    }

    /// 把 `leaf` 挂到第 `index` 块上，`index` 必须等于当前块数。
    /// 所需的间接索引块在这里分配，空间不足时不做任何改动。
    pub fn append_block(&mut self, inode: &mut DiskInode, index: u64, leaf: u64) -> Result<()> {
        match locate(index) {
            None => Err(Error::InvalidArgument("file exceeds the addressable size")),
            Some(Tier::Direct(i)) => {
                inode.direct_blocks[i] = leaf;
                Ok(())
            }
            Some(Tier::Indirect { level, offset }) => {
                self.ensure_free_blocks(metadata_blocks_for_append(index))?;
                let root = tier_root(inode, level);
                *tier_root_mut(inode, level) = self.append_at(level, root, offset, leaf)?;
                Ok(())
            }
        }
    }

    /// 返回（可能新建的）本级块号
    fn append_at(&mut self, level: u32, block_id: u64, offset: u64, leaf: u64) -> Result<u64> {
        // 编号为 0 说明进入了新块
        let (block_id, mut indirect) = if block_id == 0 {
            (self.allocate_block()?, IndirectBlock::zeroed())
        } else {
            (block_id, read_indirect(block_id, &self.block_device)?)
        };

        let child_span = span(level - 1);
        let slot = (offset / child_span) as usize;
        indirect[slot] = if level == 1 {
            leaf
        } else {
            self.append_at(level - 1, indirect[slot], offset % child_span, leaf)?
        };
        write_indirect(block_id, &indirect, &self.block_device)?;

        trace!("level {level} block {block_id}: slot {slot} -> {}", indirect[slot]);
        Ok(block_id)
    }

    /// 摘下最后一块（第 `index` 块）并返回其物理块号，数据块本身不释放。
    /// 变空的间接索引块随之释放。
    pub fn remove_block(&mut self, inode: &mut DiskInode, index: u64) -> Result<u64> {
        match locate(index) {
            None => Err(Error::InvalidArgument("file exceeds the addressable size")),
            Some(Tier::Direct(i)) => Ok(core::mem::take(&mut inode.direct_blocks[i])),
            Some(Tier::Indirect { level, offset }) => {
                let root = tier_root(inode, level);
                if root == 0 {
                    return Err(Error::inconsistent(format!(
                        "level {level} index block missing while removing block {index}"
                    )));
                }
                let (removed, emptied) = self.remove_at(level, root, offset)?;
                if emptied {
                    self.free_block(root)?;
                    *tier_root_mut(inode, level) = 0;
                }
                Ok(removed)
            }
        }
    }

    /// 返回 (摘下的块号, 本级块是否已空)
    fn remove_at(&mut self, level: u32, block_id: u64, offset: u64) -> Result<(u64, bool)> {
        let mut indirect = read_indirect(block_id, &self.block_device)?;
        let child_span = span(level - 1);
        let slot = (offset / child_span) as usize;
        let child = indirect[slot];

        let (removed, child_emptied) = if level == 1 {
            (child, true)
        } else {
            if child == 0 {
                return Err(Error::inconsistent(format!(
                    "hole in level {level} index block {block_id} at slot {slot}"
                )));
            }
            let (removed, emptied) = self.remove_at(level - 1, child, offset % child_span)?;
            if emptied {
                self.free_block(child)?;
            }
            (removed, emptied)
        };

        // 被摘的是本块第一项，说明本块已空
        let emptied = child_emptied && slot == 0;
        if child_emptied && !emptied {
            indirect[slot] = 0;
            write_indirect(block_id, &indirect, &self.block_device)?;
        }

        trace!("level {level} block {block_id}: removed slot {slot}, emptied={emptied}");
        Ok((removed, emptied))
    }

    /// 从文件尾部批量摘除 `[start, end)` 的块，`end` 必须是当前块数。
    ///
    /// 每棵子树只走一遍：左边界不小于 `start` 的子树整棵释放，
    /// 其余与范围相交的子树只清掉范围内的编号。数据块本身不释放，
    /// 调用者须先释放数据块，再摘除索引。
    pub fn remove_block_range(&mut self, inode: &mut DiskInode, start: u64, end: u64) -> Result<()> {
        for i in start.min(DIRECT)..end.min(DIRECT) {
            inode.direct_blocks[i as usize] = 0;
        }

        for level in 1..=3 {
            let lo = tier_start(level);
            let hi = lo + span(level);
            let root = tier_root(inode, level);
            if root == 0 || start >= hi || end <= lo {
                continue;
            }
            let freed = self.remove_range_at(
                level,
                root,
                0,
                start.saturating_sub(lo),
                end.min(hi) - lo,
            )?;
            if freed {
                *tier_root_mut(inode, level) = 0;
            }
        }
        Ok(())
    }

    /// `base` 为本块覆盖范围的左边界，返回本块是否已被释放
    fn remove_range_at(
        &mut self,
        level: u32,
        block_id: u64,
        base: u64,
        start: u64,
        end: u64,
    ) -> Result<bool> {
        let mut indirect = read_indirect(block_id, &self.block_device)?;
        let child_span = span(level - 1);
        let mut changed = false;

        for slot in 0..PTRS_PER_BLOCK {
            let lo = base + slot as u64 * child_span;
            if lo >= end {
                break;
            }
            if lo + child_span <= start || indirect[slot] == 0 {
                continue;
            }
            let child_freed = if level == 1 {
                true
            } else {
                self.remove_range_at(level - 1, indirect[slot], lo, start, end)?
            };
            if child_freed {
                indirect[slot] = 0;
                changed = true;
            }
        }

        if start <= base {
            self.free_block(block_id)?;
            trace!("level {level} block {block_id} freed by range removal");
            return Ok(true);
        }
        if changed {
            write_indirect(block_id, &indirect, &self.block_device)?;
        }
        Ok(false)
    }

    /// 释放以 `block_id` 为根的整棵树，0 级即数据块本身。
    /// 小于 `1 + RESERVED_SPACE` 的编号不是数据块，直接跳过。
    pub(crate) fn free_tree(&mut self, level: u32, block_id: u64) -> Result<()> {
        if block_id < 1 + RESERVED_SPACE {
            return Ok(());
        }
        if level > 0 {
            let indirect = read_indirect(block_id, &self.block_device)?;
            for child in indirect.iter().filter(|&child| child != 0) {
                self.free_tree(level - 1, child)?;
            }
        }
        self.free_block(block_id)
    }

    /// 从第 `start` 块开始惰性遍历 inode 的数据块
    pub fn data_blocks(&self, inode: &DiskInode, start: u64) -> DataBlocks {
        DataBlocks::new(Arc::clone(&self.block_device), inode, start, inode.data_blocks())
    }
}

/// 数据块的惰性迭代器。
///
/// 每一级只保留最近读到的那个间接索引块，
/// 顺序遍历时每个间接索引块至多读取一次。
/// 遍历范围由文件大小决定，范围内出现编号 0 视为磁盘不一致。
pub struct DataBlocks {
    block_device: Arc<dyn BlockDevice>,
    direct: [u64; DIRECT_BLOCKS],
    roots: [u64; 3],
    index: u64,
    end: u64,
    cached: [Option<(u64, IndirectBlock)>; 3],
}

impl DataBlocks {
    pub fn new(block_device: Arc<dyn BlockDevice>, inode: &DiskInode, start: u64, end: u64) -> Self {
        Self {
            block_device,
            direct: inode.direct_blocks,
            roots: [
                inode.single_indirect,
                inode.double_indirect,
                inode.triple_indirect,
            ],
            index: start,
            end,
            cached: [None, None, None],
        }
    }

    /// 下一次将要产出的逻辑索引
    #[inline]
    pub fn position(&self) -> u64 {
        self.index
    }

    fn indirect(&mut self, level: u32, block_id: u64) -> Result<&IndirectBlock> {
        let cache = &mut self.cached[level as usize - 1];
        if !matches!(cache, Some((id, _)) if *id == block_id) {
            *cache = Some((block_id, read_indirect(block_id, &self.block_device)?));
        }
        match cache {
            Some((_, indirect)) => Ok(indirect),
            None => Err(Error::inconsistent("index block cache is empty")),
        }
    }

    fn resolve(&mut self, index: u64) -> Result<u64> {
        let block_id = match locate(index) {
            None => return Err(Error::InvalidArgument("file exceeds the addressable size")),
            Some(Tier::Direct(i)) => self.direct[i],
            Some(Tier::Indirect { level, mut offset }) => {
                let mut block_id = self.roots[level as usize - 1];
                for l in (1..=level).rev() {
                    if block_id == 0 {
                        break;
                    }
                    let child_span = span(l - 1);
                    block_id = self.indirect(l, block_id)?[(offset / child_span) as usize];
                    offset %= child_span;
                }
                block_id
            }
        };

        if block_id == 0 {
            return Err(Error::inconsistent(format!(
                "data block {index} is missing inside the file"
            )));
        }
        Ok(block_id)
    }
}

impl Iterator for DataBlocks {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }
        let result = self.resolve(self.index);
        // 出错后不再继续
        self.index = if result.is_ok() { self.index + 1 } else { self.end };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.end.saturating_sub(self.index) as usize;
        (0, Some(left))
    }
}
