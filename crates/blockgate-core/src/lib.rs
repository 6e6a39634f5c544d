#![doc = r#"
# blockgate-core

## 设计动机（Why）
- **定位**：把字节寻址的块设备请求（任意偏移、任意长度的读/写/裁剪）翻译为
  块存储引擎只认识的两类原语：整块读写与“单块内部的字节区间”读写。
- **架构角色**：本 crate 不包含任何协议或进程生命周期逻辑，只承载纯算法
  [`Boundary`] 与请求分发器 [`IoDispatcher`]，供上层插件 crate 组合使用。

## 核心契约（What）
- [`Boundary::compute`]：给定块大小、偏移与长度，返回“首部残块 / 整块区段 /
  尾部残块”三段划分，纯函数、无分配、可重入；
- [`IoDispatcher`]：依据划分结果按严格升序调用 [`BlockStore`] 原语，任一原语
  失败立即中止并返回带块号的 [`DispatchError`]；
- [`BlockStore`]：后端原语接口，附带内存与文件两个参考实现。

## 风险与考量（Trade-offs）
- 多段请求中途失败时，已写入的段不会回滚；每个块都是直写语义，不存在跨块事务。
"#]

pub mod boundary;
pub mod dispatch;
pub mod error;
pub mod store;

pub use boundary::{BlockRun, Boundary, PartialSegment};
pub use dispatch::IoDispatcher;
pub use error::{DispatchError, HexBlock, IoOp, StoreError};
pub use store::{BlockStore, ZeroBlock};

/// 块号类型，后端以此寻址整块。
pub type BlockIndex = u64;
