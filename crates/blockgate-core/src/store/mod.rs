//! # store：后端块存储原语接口
//!
//! ## 定位（Why）
//! - 上层只通过 [`BlockStore`] 访问存储引擎，缓存、冗余、远端 I/O 等策略都藏在实现后面；
//! - 同一接口下提供两个参考实现：[`memory::MemoryStore`]（测试与演示）和
//!   [`file::FileStore`]（本地文件直写）。
//!
//! ## 契约（What）
//! - 所有方法以 `&self` 调用，实现必须 `Send + Sync`，内部自行处理并发；
//! - `read_block`/`write_block` 的缓冲区长度恰为一个块；
//! - `*_block_part` 的 `offset + buf.len()` 不超过块大小；
//! - [`BlockStore::zero_block`] 返回一个全零、恰好一个块长的只读缓冲，可作为清零写入的数据源；
//! - 销毁即释放最后一个句柄（`Drop`），销毁前应先调用 [`BlockStore::shutdown`]。

use core::num::NonZeroU32;

use crate::BlockIndex;
use crate::error::StoreError;

#[cfg(unix)]
pub mod file;
pub mod memory;

/// 后端块存储原语。
///
/// # 教案式说明
/// - **意图 (Why)**：以显式 trait 代替函数指针表，让真实后端与测试替身走同一条编译期检查路径；
/// - **契约 (What)**：失败返回 [`StoreError`]（errno 语义），本层原样透传给协议服务器；
/// - **风险 (Trade-offs)**：接口不提供事务；跨块操作的原子性不在保证范围内。
pub trait BlockStore: Send + Sync {
    /// 块大小（字节）。
    fn block_size(&self) -> NonZeroU32;

    /// 后端已知的设备容量（字节）；未知时返回 `None`，由配置决定。
    fn size_hint(&self) -> Option<u64> {
        None
    }

    fn read_block(&self, block: BlockIndex, dst: &mut [u8]) -> Result<(), StoreError>;

    fn write_block(&self, block: BlockIndex, src: &[u8]) -> Result<(), StoreError>;

    /// 读取块内 `[offset, offset + dst.len())`。
    fn read_block_part(
        &self,
        block: BlockIndex,
        offset: u32,
        dst: &mut [u8],
    ) -> Result<(), StoreError>;

    /// 写入块内 `[offset, offset + src.len())`，块内其余字节保持不变。
    fn write_block_part(&self, block: BlockIndex, offset: u32, src: &[u8])
    -> Result<(), StoreError>;

    /// 一次调用清零一组整块，比逐块写零更快。
    fn bulk_zero(&self, blocks: &[BlockIndex]) -> Result<(), StoreError>;

    /// 全零块缓冲。
    fn zero_block(&self) -> &[u8];

    /// 停止后台活动、刷出未决数据。默认无事可做。
    fn shutdown(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// 固定大小的全零块，供实现 [`BlockStore::zero_block`] 时复用。
#[derive(Clone, Debug)]
pub struct ZeroBlock(Box<[u8]>);

impl ZeroBlock {
    pub fn new(block_size: NonZeroU32) -> Self {
        Self(vec![0u8; block_size.get() as usize].into_boxed_slice())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// 判断一段数据是否全零。
    pub fn is_zero(data: &[u8]) -> bool {
        data.iter().all(|&b| b == 0)
    }
}

/// 校验块内区间是否越过块尾。
pub(crate) fn check_part(
    block_size: NonZeroU32,
    offset: u32,
    len: usize,
) -> Result<(), StoreError> {
    let end = u64::from(offset) + len as u64;
    if end > u64::from(block_size.get()) {
        return Err(StoreError::invalid());
    }
    Ok(())
}
