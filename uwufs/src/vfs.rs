//! # 操作集
//!
//! 面向用户态文件系统桥接层的操作，以路径或 inode 编号为参数。
//! 权限检查由桥接层交给操作系统完成，这里不做。

use log::{info, warn};

use crate::layout::{DiskInode, FileKind, PERM_BITS};
use crate::{now, Error, Result, UwuFileSystem};
use crate::{BLOCK_SIZE, ROOT_DIR_INODE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub inode: u64,
    pub kind: FileKind,
    /// 权限位
    pub perm: u32,
    pub links: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// 已分配的数据块数
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl Stat {
    fn new(inode_number: u64, inode: &DiskInode) -> Result<Self> {
        Ok(Self {
            inode: inode_number,
            kind: inode.kind()?,
            perm: inode.permissions(),
            links: inode.link_count,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.file_size,
            blocks: inode.data_blocks(),
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        })
    }

    /// POSIX 风格的 `st_mode`
    #[inline]
    pub fn mode(&self) -> u32 {
        self.kind.posix_bits() | self.perm
    }
}

impl UwuFileSystem {
    #[inline]
    pub fn lookup(&self, path: &str) -> Result<u64> {
        self.namei(path)
    }

    pub fn get_attributes(&self, inode_number: u64) -> Result<Stat> {
        let inode = self.read_inode(inode_number)?;
        if inode.is_free() {
            return Err(Error::NotFound);
        }
        Stat::new(inode_number, &inode)
    }

    /// 父目录中名字已被占用时失败
    fn prepare_create<'p>(&self, path: &'p str) -> Result<(u64, &'p str)> {
        let (parent, name) = self.resolve_parent(path)?;
        let parent_inode = self.read_inode(parent)?;
        if self.find_entry(&parent_inode, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }
        Ok((parent, name))
    }

    /// 新建失败时尽力回收已分配的 inode 及其数据块
    fn discard_new_inode(&mut self, inode_number: u64, cause: &Error) {
        warn!("rolling back inode {inode_number} after: {cause}");
        if let Err(e) = self.remove_file(inode_number) {
            warn!("inode {inode_number} leaked during rollback: {e}");
        }
    }

    /// 新目录的硬链接数为 2（父目录中的名字与自己的 `.`），
    /// 父目录因新目录的 `..` 多一个硬链接
    pub fn make_directory(&mut self, path: &str, mode: u32, uid: u32, gid: u32) -> Result<u64> {
        let (parent, name) = self.prepare_create(path)?;
        let inode = DiskInode::new(FileKind::Directory, mode, uid, gid, now());
        let inode_number = self.alloc_inode(&inode)?;

        let result = self
            .add_directory_entry(inode_number, ".", inode_number, 1)
            .and_then(|_| self.add_directory_entry(inode_number, "..", parent, 0))
            .and_then(|_| self.add_directory_entry(parent, name, inode_number, 1));
        if let Err(e) = result {
            self.discard_new_inode(inode_number, &e);
            return Err(e);
        }

        info!("mkdir {path} -> inode {inode_number}");
        Ok(inode_number)
    }

    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        if name == "." || name == ".." {
            return Err(Error::InvalidArgument("cannot remove '.' or '..'"));
        }
        let parent_inode = self.read_inode(parent)?;
        let inode_number = self.find_entry(&parent_inode, name)?.ok_or(Error::NotFound)?;
        let inode = self.read_inode(inode_number)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        if !self.is_directory_empty(&inode)? {
            return Err(Error::NotEmpty);
        }

        self.remove_directory_entry(parent, name, inode_number, -1)?;
        self.remove_file(inode_number)?;

        info!("rmdir {path}");
        Ok(())
    }

    /// 删除名字；硬链接数归零时释放文件
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let parent_inode = self.read_inode(parent)?;
        let inode_number = self.find_entry(&parent_inode, name)?.ok_or(Error::NotFound)?;
        let mut inode = self.read_inode(inode_number)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        self.remove_directory_entry(parent, name, inode_number, 0)?;
        inode.link_count = inode.link_count.saturating_sub(1);
        if inode.link_count == 0 {
            self.remove_file(inode_number)?;
        } else {
            inode.ctime = now();
            self.write_inode(inode_number, &inode)?;
        }

        info!("unlink {path}");
        Ok(())
    }

    pub fn create_file(&mut self, path: &str, mode: u32, uid: u32, gid: u32) -> Result<u64> {
        let (parent, name) = self.prepare_create(path)?;
        let inode = DiskInode::new(FileKind::Regular, mode, uid, gid, now());
        let inode_number = self.alloc_inode(&inode)?;

        if let Err(e) = self.add_directory_entry(parent, name, inode_number, 0) {
            self.discard_new_inode(inode_number, &e);
            return Err(e);
        }

        info!("create {path} -> inode {inode_number}");
        Ok(inode_number)
    }

    /// 在 `path` 处新建指向 `target` 的符号链接
    pub fn symlink(&mut self, target: &str, path: &str, uid: u32, gid: u32) -> Result<u64> {
        if target.is_empty() {
            return Err(Error::InvalidArgument("empty symbolic link target"));
        }
        if target.len() > BLOCK_SIZE {
            return Err(Error::NameTooLong);
        }
        let (parent, name) = self.prepare_create(path)?;
        // 目标路径占一个块
        self.ensure_free_blocks(1)?;

        let mut inode = DiskInode::new(FileKind::Symlink, 0o777, uid, gid, now());
        let inode_number = self.alloc_inode(&inode)?;
        let result = self
            .write_symlink_target(&mut inode, target)
            .and_then(|_| self.write_inode(inode_number, &inode))
            .and_then(|_| self.add_directory_entry(parent, name, inode_number, 0));
        if let Err(e) = result {
            self.discard_new_inode(inode_number, &e);
            return Err(e);
        }

        info!("symlink {path} -> {target:?}");
        Ok(inode_number)
    }

    /// 读出符号链接本身的目标，不跟随
    pub fn read_link(&self, path: &str) -> Result<String> {
        let inode_number = self.resolve(path, false)?;
        self.read_symlink(&self.read_inode(inode_number)?)
    }

    pub fn list_directory(&self, inode_number: u64) -> Result<Vec<(String, u64)>> {
        let dir = self.read_inode(inode_number)?;
        Ok(self
            .dir_entries(&dir)?
            .into_iter()
            .map(|entry| (entry.name().into_owned(), entry.inode_number()))
            .collect())
    }

    /// 硬链接，不能链接目录
    #[inline]
    pub fn link(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        self.link_file(old_path, new_path, false, 1)
    }

    /// `force_dir_link` 允许链接目录，并且不改动源 inode 的硬链接数，
    /// 供内部维护 `.`、`..` 时使用
    pub fn link_file(
        &mut self,
        old_path: &str,
        new_path: &str,
        force_dir_link: bool,
        link_delta: i32,
    ) -> Result<()> {
        let inode_number = self.resolve(old_path, false)?;
        let mut inode = self.read_inode(inode_number)?;
        if inode.is_dir() && !force_dir_link {
            return Err(Error::IsADirectory);
        }

        let (parent, name) = self.prepare_create(new_path)?;
        self.add_directory_entry(parent, name, inode_number, 0)?;

        if !force_dir_link {
            crate::dir::apply_link_delta(&mut inode.link_count, link_delta)?;
            inode.ctime = now();
            self.write_inode(inode_number, &inode)?;
        }

        info!("link {new_path} -> {old_path}");
        Ok(())
    }

    pub fn set_times(&mut self, inode_number: u64, atime: u64, mtime: u64) -> Result<()> {
        self.update_live_inode(inode_number, |inode| {
            inode.atime = atime;
            inode.mtime = mtime;
        })
    }

    /// 只改权限位，类型位保持不变
    pub fn set_mode(&mut self, inode_number: u64, perm: u32) -> Result<()> {
        self.update_live_inode(inode_number, |inode| inode.set_permissions(perm & PERM_BITS))
    }

    pub fn set_owner(&mut self, inode_number: u64, uid: u32, gid: u32) -> Result<()> {
        self.update_live_inode(inode_number, |inode| {
            inode.uid = uid;
            inode.gid = gid;
        })
    }

    fn update_live_inode(
        &mut self,
        inode_number: u64,
        f: impl FnOnce(&mut DiskInode),
    ) -> Result<()> {
        let mut inode = self.read_inode(inode_number)?;
        if inode.is_free() {
            return Err(Error::NotFound);
        }
        f(&mut inode);
        inode.ctime = now();
        self.write_inode(inode_number, &inode)
    }

    #[inline]
    pub fn root_inode(&self) -> u64 {
        ROOT_DIR_INODE
    }
}
