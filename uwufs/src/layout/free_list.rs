use binrw::{BinRead, BinWrite};

/// 空闲链表节点，就地存放在未被使用的数据块开头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct FreeNode {
    /// 下一个空闲块，0 表示链表结束
    pub next_free_block: u64,
}
