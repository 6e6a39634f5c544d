//! # Boundary：字节区间到块区间的划分
//!
//! ## 核心意图（Why）
//! - 后端只支持“整块”与“单块内部字节区间”两类原语，而协议请求可以从任意偏移开始、
//!   覆盖任意长度；必须先把请求拆成首部残块、整块区段、尾部残块三段；
//! - 划分结果以显式的 `Option` 表达“该段不存在”，而不是依赖长度为零的隐式约定。
//!
//! ## 行为契约（What）
//! 记 `bs` 为块大小：
//! - `first_block = offset / bs`，`beg_offset = offset % bs`；
//! - `beg_offset != 0` 时首部长度为 `min(length, bs - beg_offset)`，否则为 0；
//! - 剩余长度 `remaining` 中整块数为 `remaining / bs`，尾部长度为 `remaining % bs`；
//! - 整块区段从 `first_block + (首部存在 ? 1 : 0)` 开始，尾块紧随其后；
//! - 缓冲区偏移：首部在 0，整块区段在首部长度处，尾部在首部加整块总长处。
//!
//! ## 不变式
//! - `beg_length + count * bs + end_length == length`；
//! - 首部与尾部长度都严格小于 `bs`，存在即非零；
//! - `length == 0` 时首尾皆不存在且整块数为 0。

use core::num::NonZeroU32;
use core::ops::Range;

use crate::BlockIndex;

/// 单块内部的一段字节区间。
///
/// - `block`：所在块号；
/// - `offset`：在块内的起始字节；
/// - `length`：字节数，`0 < length < block_size`；
/// - `buf_offset`：在调用方缓冲区中的起始位置。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PartialSegment {
    pub block: BlockIndex,
    pub offset: u32,
    pub length: u32,
    pub buf_offset: u64,
}

impl PartialSegment {
    /// 该段在调用方缓冲区中的字节范围。
    pub fn buf_range(&self) -> Range<usize> {
        let start = self.buf_offset as usize;
        start..start + self.length as usize
    }
}

/// 连续的整块区段。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockRun {
    pub start: BlockIndex,
    pub count: u64,
    pub buf_offset: u64,
}

impl BlockRun {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 区段内的块号，严格升序。
    pub fn blocks(&self) -> Range<BlockIndex> {
        self.start..self.start.saturating_add(self.count)
    }

    /// 区段在调用方缓冲区中的字节范围。
    pub fn buf_range(&self, block_size: NonZeroU32) -> Range<usize> {
        let start = self.buf_offset as usize;
        start..start + (self.count * u64::from(block_size.get())) as usize
    }
}

/// 一次请求的三段划分结果。
///
/// # 教案式说明
/// - **意图 (Why)**：把边界运算集中在一个纯函数里，分发器只负责“按段调用原语”，
///   读、写、裁剪三条路径共享同一套算术；
/// - **契约 (What)**：由 [`Boundary::compute`] 构造，字段只读；同样的输入总是得到同样的结果；
/// - **执行 (How)**：全部使用 `u64` 运算，结果只含整数与偏移，不引用任何缓冲区，
///   因此可以在没有数据缓冲的裁剪请求中复用。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Boundary {
    block_size: NonZeroU32,
    first_block: BlockIndex,
    beg_offset: u32,
    head: Option<PartialSegment>,
    body: BlockRun,
    tail: Option<PartialSegment>,
}

impl Boundary {
    /// 计算 `[offset, offset + length)` 的划分。
    pub fn compute(block_size: NonZeroU32, offset: u64, length: u64) -> Self {
        let bs = u64::from(block_size.get());
        let first_block = offset / bs;
        let beg_offset = offset % bs;

        let beg_length = if beg_offset != 0 {
            length.min(bs - beg_offset)
        } else {
            0
        };
        let head = (beg_length > 0).then(|| PartialSegment {
            block: first_block,
            offset: beg_offset as u32,
            length: beg_length as u32,
            buf_offset: 0,
        });

        let remaining = length - beg_length;
        let body = BlockRun {
            start: first_block + u64::from(head.is_some()),
            count: remaining / bs,
            buf_offset: beg_length,
        };

        let end_length = remaining % bs;
        let tail = (end_length > 0).then(|| PartialSegment {
            block: body.start.saturating_add(body.count),
            offset: 0,
            length: end_length as u32,
            buf_offset: beg_length + body.count * bs,
        });

        Self {
            block_size,
            first_block,
            beg_offset: beg_offset as u32,
            head,
            body,
            tail,
        }
    }

    pub fn block_size(&self) -> NonZeroU32 {
        self.block_size
    }

    /// 请求起点所在的块，即使首部残块不存在也有定义。
    pub fn first_block(&self) -> BlockIndex {
        self.first_block
    }

    /// 请求起点在所在块内的偏移。
    pub fn beg_offset(&self) -> u32 {
        self.beg_offset
    }

    pub fn head(&self) -> Option<&PartialSegment> {
        self.head.as_ref()
    }

    pub fn body(&self) -> &BlockRun {
        &self.body
    }

    pub fn tail(&self) -> Option<&PartialSegment> {
        self.tail.as_ref()
    }

    pub fn beg_length(&self) -> u32 {
        self.head.map_or(0, |seg| seg.length)
    }

    pub fn end_length(&self) -> u32 {
        self.tail.map_or(0, |seg| seg.length)
    }

    /// 整块区段之后的那个块；尾部残块存在时即为尾块。
    pub fn end_block(&self) -> BlockIndex {
        self.body.start.saturating_add(self.body.count)
    }

    /// 三段长度之和，恒等于请求长度。
    pub fn len(&self) -> u64 {
        u64::from(self.beg_length())
            + self.body.count * u64::from(self.block_size.get())
            + u64::from(self.end_length())
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none() && self.body.is_empty() && self.tail.is_none()
    }
}
