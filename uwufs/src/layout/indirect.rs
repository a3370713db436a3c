use core::ops::{Index, IndexMut};

use crate::{BLOCK_SIZE, PTRS_PER_BLOCK};

/// 间接索引块：整块连续存放小端序的块编号，0 表示未使用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlock(Box<[u64; PTRS_PER_BLOCK]>);

impl IndirectBlock {
    #[inline]
    pub fn zeroed() -> Self {
        Self(Box::new([0; PTRS_PER_BLOCK]))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut block = Self::zeroed();
        for (ptr, chunk) in block.0.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0; 8];
            raw.copy_from_slice(chunk);
            *ptr = u64::from_le_bytes(raw);
        }
        block
    }

    pub fn write_to(&self, bytes: &mut [u8]) {
        debug_assert!(bytes.len() >= BLOCK_SIZE);
        for (ptr, chunk) in self.0.iter().zip(bytes.chunks_exact_mut(8)) {
            chunk.copy_from_slice(&ptr.to_le_bytes());
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&ptr| ptr == 0)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }
}

impl Index<usize> for IndirectBlock {
    type Output = u64;

    #[inline]
    fn index(&self, slot: usize) -> &u64 {
        &self.0[slot]
    }
}

impl IndexMut<usize> for IndirectBlock {
    #[inline]
    fn index_mut(&mut self, slot: usize) -> &mut u64 {
        &mut self.0[slot]
    }
}
