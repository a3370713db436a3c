//! # 目录项管理
//!
//! 目录的数据块里是定长的目录项数组。目录是**半紧凑**的：
//! 目录项按块依次填充，只有最后一块可能有空槽位。
//! - 新目录项总是放进最后一块，放不下就追加新块；
//! - 删除时用最后一块的最后一项填补空位，最后一块变空就释放它。

use log::debug;

use crate::block::BlockBuf;
use crate::layout::{DirBlock, DirEntry, DiskInode};
use crate::{addressing, now, Error, Result, UwuFileSystem, BLOCK_SIZE};

/// 按增量调整硬链接数
pub(crate) fn apply_link_delta(link_count: &mut u32, delta: i32) -> Result<()> {
    let current = *link_count;
    *link_count = current
        .checked_add_signed(delta)
        .ok_or_else(|| Error::inconsistent(format!("link count {current} {delta:+} overflows")))?;
    Ok(())
}

impl UwuFileSystem {
    pub(crate) fn read_dir_block(&self, block_id: u64) -> Result<DirBlock> {
        BlockBuf::load(block_id, &self.block_device)?.map(|data| DirBlock::decode(data))
    }

    pub(crate) fn write_dir_block(&self, block_id: u64, entries: &DirBlock) -> Result<()> {
        let mut buf = BlockBuf::zeroed(block_id, &self.block_device);
        buf.map_mut(|data| entries.encode(data))?;
        buf.sync()
    }

    fn read_dir(&self, dir_inode_number: u64) -> Result<DiskInode> {
        let dir = self.read_inode(dir_inode_number)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(dir)
    }

    /// 在目录中加入 `name` → `target`，并把目录的硬链接数调整 `link_delta`
    pub fn add_directory_entry(
        &mut self,
        dir_inode_number: u64,
        name: &str,
        target: u64,
        link_delta: i32,
    ) -> Result<()> {
        let entry = DirEntry::new(name, target)?;
        let mut dir = self.read_dir(dir_inode_number)?;
        let count = dir.data_blocks();

        let placed = if count > 0 {
            let last = self.get_block(&dir, count - 1)?;
            if last == 0 {
                return Err(Error::inconsistent(format!(
                    "directory {dir_inode_number} lost its last block"
                )));
            }
            let mut entries = self.read_dir_block(last)?;
            match entries.put_entry(entry.clone()) {
                Ok(_) => {
                    self.write_dir_block(last, &entries)?;
                    true
                }
                Err(Error::DirBlockFull) => false,
                Err(e) => return Err(e),
            }
        } else {
            false
        };

        if !placed {
            self.grow_directory(&mut dir, count, entry)?;
        }

        apply_link_delta(&mut dir.link_count, link_delta)?;
        dir.touch(now());
        self.write_inode(dir_inode_number, &dir)?;

        debug!("dir {dir_inode_number}: added {name:?} -> {target}");
        Ok(())
    }

    /// 为目录追加一个只含 `entry` 的新块
    fn grow_directory(&mut self, dir: &mut DiskInode, count: u64, entry: DirEntry) -> Result<()> {
        self.ensure_free_blocks(addressing::blocks_for_growth(count, count + 1))?;
        let block_id = self.allocate_block()?;

        let mut entries = DirBlock::default();
        let result = entries
            .put_entry(entry)
            .and_then(|_| self.write_dir_block(block_id, &entries))
            .and_then(|_| self.append_block(dir, count, block_id));
        if let Err(e) = result {
            self.release_after_failure(block_id);
            return Err(e);
        }

        dir.file_size += BLOCK_SIZE as u64;
        Ok(())
    }

    /// 删除目录中 `name` → `target` 这一项，并把目录的硬链接数调整 `link_delta`
    pub fn remove_directory_entry(
        &mut self,
        dir_inode_number: u64,
        name: &str,
        target: u64,
        link_delta: i32,
    ) -> Result<()> {
        let mut dir = self.read_dir(dir_inode_number)?;
        let count = dir.data_blocks();
        if count == 0 {
            return Err(Error::NotFound);
        }

        // 最后一块的最后一项用来填补空位
        let last_block = self.get_block(&dir, count - 1)?;
        if last_block == 0 {
            return Err(Error::inconsistent(format!(
                "directory {dir_inode_number} lost its last block"
            )));
        }
        let mut last = self.read_dir_block(last_block)?;
        let donor = last.last_occupied().ok_or_else(|| {
            Error::inconsistent(format!(
                "last block {last_block} of directory {dir_inode_number} has no entries"
            ))
        })?;

        let mut found = None;
        for block_id in self.data_blocks(&dir, 0) {
            let block_id = block_id?;
            if block_id == last_block {
                if let Some(slot) = last.find_entry(name, target) {
                    found = Some((block_id, slot));
                    break;
                }
                continue;
            }
            if let Some(slot) = self.read_dir_block(block_id)?.find_entry(name, target) {
                found = Some((block_id, slot));
                break;
            }
        }
        let (block_id, slot) = found.ok_or(Error::NotFound)?;

        let donor_entry = last.clear(donor);
        if block_id == last_block {
            if slot != donor {
                last.set(slot, donor_entry);
            }
        } else {
            let mut entries = self.read_dir_block(block_id)?;
            entries.set(slot, donor_entry);
            self.write_dir_block(block_id, &entries)?;
        }

        if last.is_empty() {
            let detached = self.remove_block(&mut dir, count - 1)?;
            if detached != last_block {
                return Err(Error::inconsistent(format!(
                    "directory {dir_inode_number}: detached block {detached}, expected {last_block}"
                )));
            }
            self.free_block(last_block)?;
            dir.file_size -= BLOCK_SIZE as u64;
        } else {
            self.write_dir_block(last_block, &last)?;
        }

        apply_link_delta(&mut dir.link_count, link_delta)?;
        dir.touch(now());
        self.write_inode(dir_inode_number, &dir)?;

        debug!("dir {dir_inode_number}: removed {name:?} -> {target}");
        Ok(())
    }

    /// 扫描目录的全部数据块查找 `name`
    pub fn find_entry(&self, dir: &DiskInode, name: &str) -> Result<Option<u64>> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        for block_id in self.data_blocks(dir, 0) {
            let entries = self.read_dir_block(block_id?)?;
            if let Some(slot) = entries.find(name) {
                return Ok(Some(entries.entry(slot).inode_number()));
            }
        }
        Ok(None)
    }

    /// 除 `.` 与 `..` 之外没有其它目录项。
    /// 扫描所有块，不依赖半紧凑的约定。
    pub fn is_directory_empty(&self, dir: &DiskInode) -> Result<bool> {
        for block_id in self.data_blocks(dir, 0) {
            let entries = self.read_dir_block(block_id?)?;
            if entries.live().any(|entry| !entry.is_dot_or_dotdot()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 目录中所有有效的目录项，按存放顺序
    pub fn dir_entries(&self, dir: &DiskInode) -> Result<Vec<DirEntry>> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        let mut all = Vec::new();
        for block_id in self.data_blocks(dir, 0) {
            let entries = self.read_dir_block(block_id?)?;
            all.extend(entries.live().cloned());
        }
        Ok(all)
    }
}
