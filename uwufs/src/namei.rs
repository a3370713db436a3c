//! # 路径解析
//!
//! 从根目录（或给定的起点）出发，逐个路径分量查找目录项：
//! - 普通文件：若还有剩余分量则失败，否则解析结束；
//! - 目录：在目录的全部数据块中查找下一个分量；
//! - 符号链接：读出目标路径，从链接所在目录递归解析，
//!   递归层数受 [`FsConfig::max_symlink_depth`](crate::FsConfig) 限制。

use log::trace;

use crate::block::BlockBuf;
use crate::layout::{check_name, DiskInode, FileKind};
use crate::{Error, Result, UwuFileSystem, ROOT_DIR_INODE};

impl UwuFileSystem {
    /// 解析路径，跟随所有符号链接
    #[inline]
    pub fn namei(&self, path: &str) -> Result<u64> {
        self.resolve(path, true)
    }

    /// `follow_last` 为假时，最后一个分量若是符号链接则返回链接本身
    #[inline]
    pub fn resolve(&self, path: &str, follow_last: bool) -> Result<u64> {
        self.resolve_from(ROOT_DIR_INODE, path, follow_last, 0)
    }

    /// 相对路径从 `start` 开始解析，绝对路径总是从根目录开始
    pub fn resolve_from(
        &self,
        start: u64,
        path: &str,
        follow_last: bool,
        depth: usize,
    ) -> Result<u64> {
        let mut current = if path.starts_with('/') {
            ROOT_DIR_INODE
        } else {
            start
        };
        let mut inode = self.read_inode(current)?;

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for (i, &segment) in segments.iter().enumerate() {
            if segment.len() > crate::NAME_MAX {
                return Err(Error::NameTooLong);
            }
            match inode.kind()? {
                FileKind::Regular | FileKind::Symlink => return Err(Error::NotADirectory),
                FileKind::Directory => {}
            }

            let next = self.find_entry(&inode, segment)?.ok_or(Error::NotFound)?;
            let next_inode = self.read_inode(next)?;
            trace!("namei: {segment:?} in {current} -> {next}");

            let is_last = i + 1 == segments.len();
            if next_inode.is_symlink() && (!is_last || follow_last) {
                if depth >= self.config.max_symlink_depth {
                    return Err(Error::TooManySymlinks);
                }
                let target = self.read_symlink(&next_inode)?;
                current = self.resolve_from(current, &target, true, depth + 1)?;
                inode = self.read_inode(current)?;
            } else {
                current = next;
                inode = next_inode;
            }
        }

        Ok(current)
    }

    /// 拆出父目录与最后一个分量，父目录必须存在且是目录
    pub fn resolve_parent<'p>(&self, path: &'p str) -> Result<(u64, &'p str)> {
        let trimmed = path.trim_end_matches('/');
        let (dir, name) = match trimmed.rsplit_once('/') {
            Some((dir, name)) => (if dir.is_empty() { "/" } else { dir }, name),
            None => ("/", trimmed),
        };
        if name.is_empty() {
            return Err(Error::InvalidArgument("path has no final component"));
        }
        check_name(name)?;

        let parent = self.namei(dir)?;
        if !self.read_inode(parent)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok((parent, name))
    }

    /// 符号链接的目标存放在它的第一个数据块中
    pub(crate) fn read_symlink(&self, inode: &DiskInode) -> Result<String> {
        if !inode.is_symlink() {
            return Err(Error::InvalidArgument("not a symbolic link"));
        }
        let len = inode.file_size as usize;
        if inode.direct_blocks[0] == 0 || len > crate::BLOCK_SIZE {
            return Err(Error::inconsistent("symbolic link without a valid target block"));
        }
        let buf = BlockBuf::load(inode.direct_blocks[0], &self.block_device)?;
        buf.map(|data| String::from_utf8(data[..len].to_vec()))
            .map_err(|_| Error::InvalidArgument("symbolic link target is not UTF-8"))
    }
}
