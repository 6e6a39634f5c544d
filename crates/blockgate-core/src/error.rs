//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 区分“后端原语失败”与“本层资源耗尽”两类请求期错误，二者对运维的含义不同：
//!   前者需要去后端日志里按块号排查，后者意味着进程内存吃紧；
//! - 所有诊断中的块号统一以定宽十六进制渲染，便于与后端日志逐字对齐。
//!
//! ## 设计要求（What）
//! - 错误类型均实现 `thiserror::Error`，可以直接 `?` 传播到插件层；
//! - 本层不做重试，也不报告“部分成功”：一次请求只产出一个失败。

use core::fmt;
use std::io;

use thiserror::Error;

use crate::BlockIndex;

/// 诊断输出中块号的十六进制位数。
pub const BLOCK_NUM_DIGITS: usize = 16;

/// 常用 OS 错误码；只保留本层与参考后端实际会产出的几个。
pub mod errno {
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const EROFS: i32 = 30;
}

/// 以定宽十六进制渲染块号的展示包装。
///
/// 例如块号 `42` 渲染为 `000000000000002a`。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HexBlock(pub BlockIndex);

impl fmt::Display for HexBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$x}", self.0, width = BLOCK_NUM_DIGITS)
    }
}

/// 后端原语返回的失败，携带 OS 风格错误码。
///
/// # 教案式说明
/// - **意图 (Why)**：后端可能是 HTTP、磁盘或内存实现，统一折叠成 errno 才能原样交给协议服务器；
/// - **契约 (What)**：`code` 为正数 errno；`Display` 复用标准库对 errno 的文字描述；
/// - **风险 (Trade-offs)**：未知错误码也能构造，渲染时会退化为 `os error N`。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreError {
    code: i32,
}

impl StoreError {
    pub const fn from_code(code: i32) -> Self {
        Self { code }
    }

    pub const fn io() -> Self {
        Self::from_code(errno::EIO)
    }

    pub const fn invalid() -> Self {
        Self::from_code(errno::EINVAL)
    }

    pub const fn read_only() -> Self {
        Self::from_code(errno::EROFS)
    }

    pub const fn no_space() -> Self {
        Self::from_code(errno::ENOSPC)
    }

    /// errno 数值。
    pub const fn code(&self) -> i32 {
        self.code
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&io::Error::from_raw_os_error(self.code), f)
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Self::from_code(code),
            None if err.kind() == io::ErrorKind::UnexpectedEof => Self::io(),
            None if err.kind() == io::ErrorKind::InvalidInput => Self::invalid(),
            None => Self::io(),
        }
    }
}

/// 失败发生在哪一类原语调用上；裁剪的首尾残块以写入计。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoOp {
    Read,
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoOp::Read => "reading",
            IoOp::Write => "writing",
        })
    }
}

/// 一次读/写/裁剪请求的失败结果。
///
/// # 教案式说明
/// - **意图 (Why)**：协议层只关心“这次请求失败了”与“该报哪个 errno”，运维则需要块号；
///   一个枚举同时满足两边；
/// - **契约 (What)**：
///   - `Io`：某个原语对某个块失败，`block` 为失败块；
///   - `BulkZero`：批量清零调用失败，`start` 为区段首块，`count` 为区段块数；
///   - `Allocation`：构造批量清零块号列表时内存不足，与后端失败区分开；
///   - `OutOfRange`：请求末端越过 `u64` 地址空间，在触达后端之前即被拒绝；
/// - **风险 (Trade-offs)**：失败前已完成的段保持已写入状态，错误本身不携带“进度”信息。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DispatchError {
    #[error("error {op} block {}: {source}", hex_block(.block))]
    Io {
        op: IoOp,
        block: BlockIndex,
        source: StoreError,
    },

    #[error("error zeroing {count} block(s) starting at {}: {source}", hex_block(.start))]
    BulkZero {
        start: BlockIndex,
        count: u64,
        source: StoreError,
    },

    #[error("cannot allocate block list for {count} block(s)")]
    Allocation { count: u64 },

    #[error("request of {len} byte(s) at offset {offset} overflows the device address space")]
    OutOfRange { offset: u64, len: u64 },
}

impl DispatchError {
    /// 与失败关联的块号；内存不足与越界时没有块号。
    pub fn block(&self) -> Option<BlockIndex> {
        match self {
            DispatchError::Io { block, .. } => Some(*block),
            DispatchError::BulkZero { start, .. } => Some(*start),
            DispatchError::Allocation { .. } | DispatchError::OutOfRange { .. } => None,
        }
    }

    /// 交给协议服务器的 errno。
    pub fn errno(&self) -> i32 {
        match self {
            DispatchError::Io { source, .. } | DispatchError::BulkZero { source, .. } => {
                source.code()
            }
            DispatchError::Allocation { .. } => errno::ENOMEM,
            DispatchError::OutOfRange { .. } => errno::EINVAL,
        }
    }
}

fn hex_block(block: &BlockIndex) -> HexBlock {
    HexBlock(*block)
}
