use std::borrow::Cow;

use binrw::{BinRead, BinWrite};

use super::{decode, encode};
use crate::{Error, Result};
use crate::{DIR_ENTRIES_PER_BLOCK, DIR_ENTRY_SIZE, FILE_NAME_SIZE, NAME_MAX};

/// 目录项：文件名 → inode 编号。
/// inode 编号为 0 的目录项是空槽位。
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; FILE_NAME_SIZE],
    inode_number: u64,
}

impl Default for DirEntry {
    fn default() -> Self {
        Self {
            name: [0; FILE_NAME_SIZE],
            inode_number: 0,
        }
    }
}

impl DirEntry {
    /// 目录项大小恒为64字节
    pub const SIZE: usize = DIR_ENTRY_SIZE;

    pub fn new(name: &str, inode_number: u64) -> Result<Self> {
        check_name(name)?;
        let bytes = name.as_bytes();
        let mut raw = [0; FILE_NAME_SIZE];
        raw[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            name: raw,
            inode_number,
        })
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(FILE_NAME_SIZE);
        &self.name[..len]
    }

    #[inline]
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    #[inline]
    pub fn inode_number(&self) -> u64 {
        self.inode_number
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.inode_number == 0
    }

    #[inline]
    pub fn is_dot_or_dotdot(&self) -> bool {
        matches!(self.name_bytes(), b"." | b"..")
    }

    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        !self.is_free() && self.name_bytes() == name.as_bytes()
    }
}

/// 检查单个路径分量能否作为目录项名
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("empty file name"));
    }
    if name.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }
    if name.bytes().any(|c| c == b'/' || c == 0) {
        return Err(Error::InvalidArgument("file name contains '/' or NUL"));
    }
    Ok(())
}

/// 一个目录数据块在内存中的副本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirBlock {
    entries: Vec<DirEntry>,
}

impl Default for DirBlock {
    fn default() -> Self {
        Self {
            entries: vec![DirEntry::default(); DIR_ENTRIES_PER_BLOCK],
        }
    }
}

impl DirBlock {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let entries = bytes
            .chunks_exact(DirEntry::SIZE)
            .take(DIR_ENTRIES_PER_BLOCK)
            .map(decode::<DirEntry>)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn encode(&self, bytes: &mut [u8]) -> Result<()> {
        for (entry, chunk) in self.entries.iter().zip(bytes.chunks_exact_mut(DirEntry::SIZE)) {
            encode(entry, chunk)?;
        }
        Ok(())
    }

    /// 放入第一个空槽位，返回槽位号
    pub fn put_entry(&mut self, entry: DirEntry) -> Result<usize> {
        let slot = self
            .entries
            .iter()
            .position(DirEntry::is_free)
            .ok_or(Error::DirBlockFull)?;
        self.entries[slot] = entry;
        Ok(slot)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.matches(name))
    }

    pub fn find_entry(&self, name: &str, inode_number: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.matches(name) && entry.inode_number == inode_number)
    }

    /// 倒序扫描，找到最后一个被占用的槽位
    pub fn last_occupied(&self) -> Option<usize> {
        self.entries.iter().rposition(|entry| !entry.is_free())
    }

    #[inline]
    pub fn entry(&self, slot: usize) -> &DirEntry {
        &self.entries[slot]
    }

    #[inline]
    pub fn set(&mut self, slot: usize, entry: DirEntry) {
        self.entries[slot] = entry;
    }

    #[inline]
    pub fn clear(&mut self, slot: usize) -> DirEntry {
        core::mem::take(&mut self.entries[slot])
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(DirEntry::is_free)
    }

    pub fn live(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|entry| !entry.is_free())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn name_limits() {
        assert!(DirEntry::new(&"a".repeat(NAME_MAX), 3).is_ok());
        assert!(matches!(
            DirEntry::new(&"a".repeat(NAME_MAX + 1), 3),
            Err(Error::NameTooLong)
        ));
        assert!(matches!(DirEntry::new("", 3), Err(Error::InvalidArgument(_))));
        assert!(matches!(DirEntry::new("a/b", 3), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn fill_block_until_full() {
        let mut block = DirBlock::default();
        for i in 0..DIR_ENTRIES_PER_BLOCK {
            let slot = block
                .put_entry(DirEntry::new(&format!("f{i}"), i as u64 + 3).unwrap())
                .unwrap();
            assert_eq!(slot, i);
        }
        assert!(matches!(
            block.put_entry(DirEntry::new("overflow", 99).unwrap()),
            Err(Error::DirBlockFull)
        ));
        assert_eq!(block.last_occupied(), Some(DIR_ENTRIES_PER_BLOCK - 1));
    }

    #[test]
    fn holes_are_reused() {
        let mut block = DirBlock::default();
        block.put_entry(DirEntry::new(".", 2).unwrap()).unwrap();
        block.put_entry(DirEntry::new("..", 2).unwrap()).unwrap();
        block.put_entry(DirEntry::new("x", 5).unwrap()).unwrap();
        block.clear(1);

        assert_eq!(block.put_entry(DirEntry::new("y", 6).unwrap()).unwrap(), 1);
        assert_eq!(block.find("y"), Some(1));
        assert_eq!(block.find_entry("x", 6), None);
        assert_eq!(block.live().filter(|e| !e.is_dot_or_dotdot()).count(), 2);
    }

    #[test]
    fn block_bytes() {
        let mut block = DirBlock::default();
        block.put_entry(DirEntry::new("hello", 42).unwrap()).unwrap();

        let mut bytes = vec![0; BLOCK_SIZE];
        block.encode(&mut bytes).unwrap();
        assert_eq!(&bytes[..5], b"hello");
        assert_eq!(bytes[FILE_NAME_SIZE], 42);
        assert_eq!(DirBlock::decode(&bytes).unwrap(), block);
    }
}
