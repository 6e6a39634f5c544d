//! 内存块存储：稀疏保存非零块，全零块不占空间。
//!
//! 读未写过的块返回全零；写入全零数据或被批量清零的块会从表中移除，
//! 因此 [`MemoryStore::materialized_blocks`] 可以直接观察清零是否生效。

use core::num::NonZeroU32;
use std::collections::HashMap;

use parking_lot::RwLock;

use super::{BlockStore, ZeroBlock, check_part};
use crate::BlockIndex;
use crate::error::StoreError;

/// RAM 后端。
#[derive(Debug)]
pub struct MemoryStore {
    block_size: NonZeroU32,
    total_blocks: u64,
    read_only: bool,
    zero: ZeroBlock,
    blocks: RwLock<HashMap<BlockIndex, Box<[u8]>>>,
}

impl MemoryStore {
    /// 创建容量为 `total_blocks` 个块的存储。
    pub fn new(block_size: NonZeroU32, total_blocks: u64) -> Self {
        Self {
            block_size,
            total_blocks,
            read_only: false,
            zero: ZeroBlock::new(block_size),
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// 只读模式下所有写入与清零返回 `EROFS`。
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// 当前实际持有数据的块数量。
    pub fn materialized_blocks(&self) -> usize {
        self.blocks.read().len()
    }

    fn check_block(&self, block: BlockIndex) -> Result<(), StoreError> {
        if block >= self.total_blocks {
            return Err(StoreError::invalid());
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::read_only());
        }
        Ok(())
    }
}

impl BlockStore for MemoryStore {
    fn block_size(&self) -> NonZeroU32 {
        self.block_size
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.total_blocks * u64::from(self.block_size.get()))
    }

    fn read_block(&self, block: BlockIndex, dst: &mut [u8]) -> Result<(), StoreError> {
        self.read_block_part(block, 0, dst)
    }

    fn write_block(&self, block: BlockIndex, src: &[u8]) -> Result<(), StoreError> {
        if src.len() != self.block_size.get() as usize {
            return Err(StoreError::invalid());
        }
        self.check_writable()?;
        self.check_block(block)?;
        let mut blocks = self.blocks.write();
        if ZeroBlock::is_zero(src) {
            blocks.remove(&block);
        } else {
            blocks.insert(block, src.into());
        }
        Ok(())
    }

    fn read_block_part(
        &self,
        block: BlockIndex,
        offset: u32,
        dst: &mut [u8],
    ) -> Result<(), StoreError> {
        self.check_block(block)?;
        check_part(self.block_size, offset, dst.len())?;
        let start = offset as usize;
        match self.blocks.read().get(&block) {
            Some(data) => dst.copy_from_slice(&data[start..start + dst.len()]),
            None => dst.fill(0),
        }
        Ok(())
    }

    fn write_block_part(
        &self,
        block: BlockIndex,
        offset: u32,
        src: &[u8],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.check_block(block)?;
        check_part(self.block_size, offset, src.len())?;
        let start = offset as usize;
        let mut blocks = self.blocks.write();
        let data = blocks
            .entry(block)
            .or_insert_with(|| self.zero.as_slice().into());
        data[start..start + src.len()].copy_from_slice(src);
        if ZeroBlock::is_zero(data) {
            blocks.remove(&block);
        }
        Ok(())
    }

    fn bulk_zero(&self, blocks: &[BlockIndex]) -> Result<(), StoreError> {
        self.check_writable()?;
        for &block in blocks {
            self.check_block(block)?;
        }
        let mut map = self.blocks.write();
        for block in blocks {
            map.remove(block);
        }
        Ok(())
    }

    fn zero_block(&self) -> &[u8] {
        self.zero.as_slice()
    }
}
