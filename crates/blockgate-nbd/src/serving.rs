//! # serving：协议服务器可见的请求面
//!
//! ## 核心意图（Why）
//! - 进入 Serving 之后，协议服务器只和 [`ServingContext`] 打交道；它把每个请求转交
//!   [`IoDispatcher`]，并把失败折叠为 [`PluginError`]；
//! - 插件不保存连接级状态：[`ServingContext::open`] 只返回一个哨兵句柄，所有连接共享
//!   同一个上下文。
//!
//! ## 行为契约（What）
//! - 请求是否越过设备末尾由协议服务器在调用前检查，本层不重复；
//! - `flush` 恒成功，所有写入都是直写；
//! - 请求标志（FUA、MAY_TRIM 等）被接受但不改变行为。

use std::sync::Arc;

use blockgate_core::{BlockStore, IoDispatcher};
use tracing::trace;

use crate::error::PluginError;

/// 连接句柄。插件不区分连接，所有连接得到同一个哨兵值。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Handle(u32);

impl Handle {
    pub const NOT_NEEDED: Handle = Handle(0xfeed_f00d);
}

/// 协议服务器随请求传入的标志位。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RequestFlags(u32);

impl RequestFlags {
    pub const NONE: RequestFlags = RequestFlags(0);
    pub const MAY_TRIM: RequestFlags = RequestFlags(1 << 0);
    pub const FUA: RequestFlags = RequestFlags(1 << 1);
    pub const FAST_ZERO: RequestFlags = RequestFlags(1 << 3);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: RequestFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for RequestFlags {
    type Output = RequestFlags;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 缓存提示的能力。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheMode {
    /// 不支持缓存提示。
    None,
    /// 由协议服务器以读取模拟缓存提示。
    Emulate,
}

impl CacheMode {
    /// 后端开启块缓存时才值得让服务器模拟预读。
    pub fn for_block_cache(block_cache_size: u64) -> Self {
        if block_cache_size > 0 {
            CacheMode::Emulate
        } else {
            CacheMode::None
        }
    }
}

/// Serving 状态下的请求处理上下文。
///
/// # 教案式说明
/// - **意图 (Why)**：把设备容量、缓存能力等在初始化时固定下来的事实与分发器放在一起，
///   请求路径上不再查询后端；
/// - **契约 (What)**：`Send + Sync`，所有方法以 `&self` 调用，可被任意多个连接并发使用；
/// - **风险 (Trade-offs)**：只读判断交给协议服务器（依据 [`can_write`](Self::can_write)），
///   后端仍会以 `EROFS` 拒绝写入作为最后一道防线。
pub struct ServingContext {
    dispatcher: IoDispatcher<dyn BlockStore>,
    device_size: u64,
    cache: CacheMode,
    read_only: bool,
}

impl core::fmt::Debug for ServingContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServingContext")
            .field("block_size", &self.dispatcher.block_size())
            .field("device_size", &self.device_size)
            .field("cache", &self.cache)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl ServingContext {
    pub(crate) fn new(
        store: Arc<dyn BlockStore>,
        device_size: u64,
        cache: CacheMode,
        read_only: bool,
    ) -> Self {
        Self {
            dispatcher: IoDispatcher::new(store),
            device_size,
            cache,
            read_only,
        }
    }

    pub fn open(&self, readonly: bool) -> Handle {
        trace!(readonly, "connection opened");
        Handle::NOT_NEEDED
    }

    /// 设备容量（字节），在初始化时固定。
    pub fn get_size(&self, _handle: Handle) -> u64 {
        self.device_size
    }

    pub fn read(
        &self,
        _handle: Handle,
        buf: &mut [u8],
        offset: u64,
        _flags: RequestFlags,
    ) -> Result<(), PluginError> {
        Ok(self.dispatcher.read(buf, offset)?)
    }

    pub fn write(
        &self,
        _handle: Handle,
        buf: &[u8],
        offset: u64,
        _flags: RequestFlags,
    ) -> Result<(), PluginError> {
        Ok(self.dispatcher.write(buf, offset)?)
    }

    pub fn trim(
        &self,
        _handle: Handle,
        count: u32,
        offset: u64,
        _flags: RequestFlags,
    ) -> Result<(), PluginError> {
        Ok(self.dispatcher.trim(offset, u64::from(count))?)
    }

    /// 写零与裁剪共用同一路径：被裁剪的区间读回全零。
    pub fn zero(
        &self,
        _handle: Handle,
        count: u32,
        offset: u64,
        _flags: RequestFlags,
    ) -> Result<(), PluginError> {
        Ok(self.dispatcher.zero(offset, u64::from(count))?)
    }

    pub fn flush(&self, _handle: Handle, _flags: RequestFlags) -> Result<(), PluginError> {
        Ok(())
    }

    pub fn can_multi_connection(&self, _handle: Handle) -> bool {
        true
    }

    pub fn can_cache(&self, _handle: Handle) -> CacheMode {
        self.cache
    }

    pub fn can_write(&self, _handle: Handle) -> bool {
        !self.read_only
    }

    pub fn block_size(&self) -> u32 {
        self.dispatcher.block_size().get()
    }
}
