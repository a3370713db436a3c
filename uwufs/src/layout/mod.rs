//! # 磁盘数据结构层
//!
//! uwufs 的磁盘布局：
//! 超级块 | 保留块 | i-list | 数据块区域（初始时全部串在空闲链表上）
//!
//! 所有记录均以小端序显式编解码，不做内存布局上的重解释。

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::Result;

mod super_block;
pub use super_block::SuperBlock;

mod free_list;
pub use free_list::FreeNode;

mod inode;
pub use inode::{DiskInode, FileKind, PERM_BITS, TYPE_BITS};

mod indirect;
pub use indirect::IndirectBlock;

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{check_name, DirBlock, DirEntry};

/// 从字节切片的开头解码一条记录
pub fn decode<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    Ok(T::read_le(&mut Cursor::new(bytes))?)
}

/// 把记录编码到字节切片的开头，其余字节保持不变
pub fn encode<T>(value: &T, bytes: &mut [u8]) -> Result<()>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    value.write_le(&mut Cursor::new(bytes))?;
    Ok(())
}

/// 记录编码后的字节数
pub fn encoded_len<T>(value: &T) -> Result<usize>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    value.write_le(&mut cursor)?;
    Ok(cursor.into_inner().len())
}
