//! # 块缓冲
//!
//! 把即将操作的块整块复制到内存中，改完再整块写回。
//!
//! 不做任何跨操作的缓存：每次使用都从块设备重新读取，
//! 每次修改都由调用者显式 [`BlockBuf::sync`] 写回。

use std::sync::Arc;

use block_dev::BlockDevice;
use binrw::{BinRead, BinWrite};

use crate::layout::{self, IndirectBlock};
use crate::{DataBlock, Result, BLOCK_SIZE};

/// 内存中的一个块
pub struct BlockBuf {
    /// 缓冲的数据
    data: Box<DataBlock>,
    /// 对应的块ID
    block_id: u64,
    /// 底层块设备的引用
    block_device: Arc<dyn BlockDevice>,
    /// 是否为脏块
    modified: bool,
}

impl BlockBuf {
    pub fn load(block_id: u64, block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let mut data = Box::new([0; BLOCK_SIZE]);
        block_device.read_block(block_id, data.as_mut_slice())?;

        Ok(Self {
            data,
            block_id,
            block_device: Arc::clone(block_device),
            modified: false,
        })
    }

    /// 不读设备，直接得到一个全零的脏块
    pub fn zeroed(block_id: u64, block_device: &Arc<dyn BlockDevice>) -> Self {
        Self {
            data: Box::new([0; BLOCK_SIZE]),
            block_id,
            block_device: Arc::clone(block_device),
            modified: true,
        }
    }

    pub fn sync(&mut self) -> Result<()> {
        if self.modified {
            self.block_device
                .write_block(self.block_id, self.data.as_slice())?;
            self.modified = false;
        }
        Ok(())
    }

    /// 解码块内偏移 `offset` 处的记录
    pub fn get<T>(&self, offset: usize) -> Result<T>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        layout::decode(&self.data[offset..])
    }

    /// 在块内偏移 `offset` 处编码记录
    pub fn put<T>(&mut self, offset: usize, value: &T) -> Result<()>
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        self.modified = true;
        layout::encode(value, &mut self.data[offset..])
    }

    #[inline]
    pub fn map<V>(&self, f: impl FnOnce(&DataBlock) -> V) -> V {
        f(&self.data)
    }

    #[inline]
    pub fn map_mut<V>(&mut self, f: impl FnOnce(&mut DataBlock) -> V) -> V {
        self.modified = true;
        f(&mut self.data)
    }

    #[inline]
    pub fn as_indirect(&self) -> IndirectBlock {
        IndirectBlock::from_bytes(self.data.as_slice())
    }
}

impl Drop for BlockBuf {
    fn drop(&mut self) {
        if self.modified {
            log::warn!("block {} dropped with unwritten changes", self.block_id);
        }
    }
}

/// 把一整块写成 0
pub fn zero(block_id: u64, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
    BlockBuf::zeroed(block_id, block_device).sync()
}

pub fn read_indirect(block_id: u64, block_device: &Arc<dyn BlockDevice>) -> Result<IndirectBlock> {
    Ok(BlockBuf::load(block_id, block_device)?.as_indirect())
}

pub fn write_indirect(
    block_id: u64,
    indirect: &IndirectBlock,
    block_device: &Arc<dyn BlockDevice>,
) -> Result<()> {
    let mut buf = BlockBuf::zeroed(block_id, block_device);
    buf.map_mut(|data| indirect.write_to(data));
    buf.sync()
}
