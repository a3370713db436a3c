//! # 一致性检查
//!
//! 走一遍空闲链表与每个有效 inode 的索引树，确认每个块要么空闲、
//! 要么恰好被一个文件引用，并且各部分加起来正好是设备总块数。

use log::{info, warn};

use crate::block::{read_indirect, BlockBuf};
use crate::layout::{DiskInode, FreeNode};
use crate::{Result, UwuFileSystem};
use crate::{BLOCK_SIZE, NAME_MAX, ROOT_DIR_INODE};

/// 容量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u64,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
    pub name_max: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub total_blocks: u64,
    /// 超级块、保留块与 i-list
    pub metadata_blocks: u64,
    /// 沿空闲链表数到的块数
    pub free_blocks: u64,
    /// 被有效 inode 引用的块数（含间接索引块）
    pub used_blocks: u64,
    pub live_inodes: u64,
    pub problems: Vec<String>,
}

impl CheckReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Owner {
    Unseen,
    Free,
    Inode(u64),
}

struct Walker {
    owners: Vec<Owner>,
    report: CheckReport,
}

impl Walker {
    fn claim(&mut self, block_id: u64, owner: Owner, fs: &UwuFileSystem) -> bool {
        if !fs.is_data_block(block_id) {
            self.report
                .problems
                .push(format!("block {block_id} lies outside the data region"));
            return false;
        }
        match self.owners[block_id as usize] {
            Owner::Unseen => {
                self.owners[block_id as usize] = owner;
                true
            }
            Owner::Free => {
                self.report
                    .problems
                    .push(format!("block {block_id} is both free and in use"));
                false
            }
            Owner::Inode(other) => {
                self.report
                    .problems
                    .push(format!("block {block_id} already belongs to inode {other}"));
                false
            }
        }
    }
}

impl UwuFileSystem {
    pub fn statfs(&self) -> Result<StatFs> {
        let super_block = self.super_block()?;
        Ok(StatFs {
            block_size: BLOCK_SIZE as u64,
            total_blocks: super_block.total_blocks,
            free_blocks: super_block.free_blocks_left,
            total_inodes: super_block.total_inodes(),
            free_inodes: super_block.free_inodes_left,
            name_max: NAME_MAX as u64,
        })
    }

    /// 只读检查，发现的问题记录在报告里，不做修复
    pub fn check(&self) -> Result<CheckReport> {
        let super_block = self.super_block()?;
        let mut walker = Walker {
            owners: vec![Owner::Unseen; self.total_blocks() as usize],
            report: CheckReport {
                total_blocks: self.total_blocks(),
                metadata_blocks: self.metadata_blocks(),
                ..Default::default()
            },
        };

        let mut next = super_block.freelist_head;
        while next != 0 {
            if !walker.claim(next, Owner::Free, self) {
                walker
                    .report
                    .problems
                    .push(format!("free list broken at block {next}"));
                break;
            }
            walker.report.free_blocks += 1;
            let node: FreeNode = BlockBuf::load(next, &self.block_device)?.get(0)?;
            next = node.next_free_block;
        }
        if walker.report.free_blocks != super_block.free_blocks_left {
            walker.report.problems.push(format!(
                "free list holds {} blocks, superblock says {}",
                walker.report.free_blocks, super_block.free_blocks_left
            ));
        }

        for inode_number in ROOT_DIR_INODE..self.total_inodes() {
            let inode = self.read_inode(inode_number)?;
            if inode.is_free() {
                continue;
            }
            walker.report.live_inodes += 1;
            if inode.link_count == 0 {
                walker
                    .report
                    .problems
                    .push(format!("inode {inode_number} is live with no links"));
            }
            self.walk_inode(inode_number, &inode, &mut walker)?;
        }

        let free_inodes = self.total_inodes() - ROOT_DIR_INODE - walker.report.live_inodes;
        if free_inodes != super_block.free_inodes_left {
            walker.report.problems.push(format!(
                "{free_inodes} inodes are free, superblock says {}",
                super_block.free_inodes_left
            ));
        }

        let report = &mut walker.report;
        let accounted = report.metadata_blocks + report.free_blocks + report.used_blocks;
        if accounted != report.total_blocks {
            report.problems.push(format!(
                "{} blocks are neither free nor in use",
                report.total_blocks.saturating_sub(accounted)
            ));
        }

        if walker.report.is_clean() {
            info!("check passed: {:?}", walker.report);
        } else {
            for problem in &walker.report.problems {
                warn!("check: {problem}");
            }
        }
        Ok(walker.report)
    }

    fn walk_inode(&self, inode_number: u64, inode: &DiskInode, walker: &mut Walker) -> Result<()> {
        let owner = Owner::Inode(inode_number);
        let roots = inode
            .direct_blocks
            .iter()
            .map(|&block_id| (0, block_id))
            .chain([
                (1, inode.single_indirect),
                (2, inode.double_indirect),
                (3, inode.triple_indirect),
            ]);
        for (level, block_id) in roots {
            self.walk_tree(level, block_id, owner, walker)?;
        }
        Ok(())
    }

    fn walk_tree(&self, level: u32, block_id: u64, owner: Owner, walker: &mut Walker) -> Result<()> {
        if block_id == 0 || !walker.claim(block_id, owner, self) {
            return Ok(());
        }
        walker.report.used_blocks += 1;
        if level > 0 {
            let indirect = read_indirect(block_id, &self.block_device)?;
            for child in indirect.iter().filter(|&child| child != 0) {
                self.walk_tree(level - 1, child, owner, walker)?;
            }
        }
        Ok(())
    }
}
