//! # IoDispatcher：按段调用后端原语
//!
//! ## 核心意图（Why）
//! - 把一次字节区间请求落实为一串后端原语调用：首部残块 → 整块区段（严格升序）→ 尾部残块；
//! - 后端可能在每个块上产生可观测的副作用（缓存统计、版本号），顺序必须可复现。
//!
//! ## 行为契约（What）
//! - `read`/`write`：首尾残块走 `*_block_part`，中间逐块走 `read_block`/`write_block`；
//! - `trim`/`zero`：首尾残块以全零块为数据源走 `write_block_part`；中间区段构造恰好
//!   `count` 个块号，只发一次 `bulk_zero`；
//! - 任一原语失败立即中止，返回携带失败块号的单个错误；已完成的段不回滚；
//! - 分发器不持有任何可变状态，划分结果只存活于单次调用的栈上，可被多个连接并发调用。
//!
//! ## 风险提示（Trade-offs）
//! - 多段写入中途失败时，设备可能处于“部分段已落盘”的状态，这是直写语义下允许的结果。

use core::num::NonZeroU32;
use std::sync::Arc;

use tracing::{error, trace};

use crate::BlockIndex;
use crate::boundary::{BlockRun, Boundary};
use crate::error::{DispatchError, HexBlock, IoOp, StoreError};
use crate::store::BlockStore;

/// 请求分发器。
///
/// # 教案式说明
/// - **意图 (Why)**：读、写、裁剪共享同一套边界算术，差异只在“调用哪个原语、数据从哪来”；
/// - **契约 (What)**：持有后端共享句柄与块大小；所有方法以 `&self` 调用；
/// - **执行 (How)**：先调用 [`Boundary::compute`]，再按段依次调用原语并把失败映射为
///   [`DispatchError`]，同时以 `error` 级别记录十六进制块号。
#[derive(Debug)]
pub struct IoDispatcher<S: ?Sized> {
    store: Arc<S>,
    block_size: NonZeroU32,
}

impl<S: ?Sized> Clone for IoDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            block_size: self.block_size,
        }
    }
}

impl<S: BlockStore + ?Sized> IoDispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        let block_size = store.block_size();
        Self { store, block_size }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn block_size(&self) -> NonZeroU32 {
        self.block_size
    }

    /// 计算请求划分；拒绝会越过 `u64` 地址空间的请求。
    pub fn plan(&self, offset: u64, length: u64) -> Result<Boundary, DispatchError> {
        if offset.checked_add(length).is_none() {
            return Err(DispatchError::OutOfRange {
                offset,
                len: length,
            });
        }
        Ok(Boundary::compute(self.block_size, offset, length))
    }

    /// 把 `[offset, offset + buf.len())` 读入 `buf`。
    pub fn read(&self, buf: &mut [u8], offset: u64) -> Result<(), DispatchError> {
        let boundary = self.plan(offset, buf.len() as u64)?;
        trace!(offset, len = buf.len(), "dispatching read");

        if let Some(head) = boundary.head() {
            self.store
                .read_block_part(head.block, head.offset, &mut buf[head.buf_range()])
                .map_err(|source| self.fail(IoOp::Read, head.block, source))?;
        }

        let body = boundary.body();
        let chunks = buf[body.buf_range(self.block_size)].chunks_exact_mut(self.block_len());
        for (block, chunk) in body.blocks().zip(chunks) {
            self.store
                .read_block(block, chunk)
                .map_err(|source| self.fail(IoOp::Read, block, source))?;
        }

        if let Some(tail) = boundary.tail() {
            self.store
                .read_block_part(tail.block, 0, &mut buf[tail.buf_range()])
                .map_err(|source| self.fail(IoOp::Read, tail.block, source))?;
        }
        Ok(())
    }

    /// 把 `buf` 写到 `[offset, offset + buf.len())`。
    pub fn write(&self, buf: &[u8], offset: u64) -> Result<(), DispatchError> {
        let boundary = self.plan(offset, buf.len() as u64)?;
        trace!(offset, len = buf.len(), "dispatching write");

        if let Some(head) = boundary.head() {
            self.store
                .write_block_part(head.block, head.offset, &buf[head.buf_range()])
                .map_err(|source| self.fail(IoOp::Write, head.block, source))?;
        }

        let body = boundary.body();
        let chunks = buf[body.buf_range(self.block_size)].chunks_exact(self.block_len());
        for (block, chunk) in body.blocks().zip(chunks) {
            self.store
                .write_block(block, chunk)
                .map_err(|source| self.fail(IoOp::Write, block, source))?;
        }

        if let Some(tail) = boundary.tail() {
            self.store
                .write_block_part(tail.block, 0, &buf[tail.buf_range()])
                .map_err(|source| self.fail(IoOp::Write, tail.block, source))?;
        }
        Ok(())
    }

    /// 把 `[offset, offset + length)` 清零。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：批量清零只作用于整块，所以首尾残块仍以全零数据做部分写；
    ///   中间区段恰好发出一次 `bulk_zero`，块号列表长度等于区段块数；
    /// - **错误 (What)**：块号列表无法分配时返回 [`DispatchError::Allocation`]，不会触达后端。
    pub fn trim(&self, offset: u64, length: u64) -> Result<(), DispatchError> {
        let boundary = self.plan(offset, length)?;
        trace!(offset, length, "dispatching trim");
        let zero = self.store.zero_block();

        if let Some(head) = boundary.head() {
            self.store
                .write_block_part(head.block, head.offset, &zero[..head.length as usize])
                .map_err(|source| self.fail(IoOp::Write, head.block, source))?;
        }

        let body = boundary.body();
        if !body.is_empty() {
            let blocks = block_list(body)?;
            self.store.bulk_zero(&blocks).map_err(|source| {
                error!(
                    start = %HexBlock(body.start),
                    count = body.count,
                    errno = source.code(),
                    "error zeroing {} block(s) starting at {}: {}",
                    body.count,
                    HexBlock(body.start),
                    source
                );
                DispatchError::BulkZero {
                    start: body.start,
                    count: body.count,
                    source,
                }
            })?;
        }

        if let Some(tail) = boundary.tail() {
            self.store
                .write_block_part(tail.block, 0, &zero[..tail.length as usize])
                .map_err(|source| self.fail(IoOp::Write, tail.block, source))?;
        }
        Ok(())
    }

    /// 写零与裁剪在本层语义相同。
    pub fn zero(&self, offset: u64, length: u64) -> Result<(), DispatchError> {
        self.trim(offset, length)
    }

    fn block_len(&self) -> usize {
        self.block_size.get() as usize
    }

    fn fail(&self, op: IoOp, block: BlockIndex, source: StoreError) -> DispatchError {
        error!(
            block = %HexBlock(block),
            errno = source.code(),
            "error {} block {}: {}",
            op,
            HexBlock(block),
            source
        );
        DispatchError::Io { op, block, source }
    }
}

/// 为批量清零构造块号列表；容量不足时返回分配错误而不是中止进程。
fn block_list(run: &BlockRun) -> Result<Vec<BlockIndex>, DispatchError> {
    let alloc_failed = || {
        error!(count = run.count, "cannot allocate bulk zero block list");
        DispatchError::Allocation { count: run.count }
    };
    let len = usize::try_from(run.count).map_err(|_| alloc_failed())?;
    let mut blocks = Vec::new();
    blocks.try_reserve_exact(len).map_err(|_| alloc_failed())?;
    blocks.extend(run.blocks());
    Ok(blocks)
}
