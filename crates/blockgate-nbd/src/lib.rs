#![doc = r#"
# blockgate-nbd

## 设计动机（Why）
- **定位**：把块存储后端挂到 NBD 协议服务器上的插件层。协议服务器负责连接、协商与
  越界检查；本 crate 负责参数翻译、后端构造、生命周期与请求转发。
- **架构角色**：请求路径上的边界算术与原语分发全部委托给 `blockgate-core`，
  本 crate 只把宿主的回调顺序映射为一台显式状态机。

## 核心契约（What）
- [`config`]：`name=value` 参数事件 → 有序参数表 → [`StoreConfig`]；
- [`PluginHost`]：`configure` → `config_complete` → `get_ready` → `after_fork` → `unload`，
  乱序调用返回 [`PluginError::InvalidTransition`]；
- [`ServingContext`]：进入服务后的读、写、裁剪、写零与能力查询；
- [`logging`]：`tracing` 订阅器安装与 fork 后一次性的日志出口切换；
- [`info`]：插件名、版本、帮助文本等元数据。

## 风险与考量（Trade-offs）
- 插件不保存连接级状态，所有连接共享一个 [`ServingContext`]；
- 系统日志经 Unix 数据报套接字投递，文件存储依赖 `FileExt`；两者只在类 Unix 平台可用，
  其它平台上日志留在 stderr，文件目标在构造阶段失败。
"#]

pub mod config;
pub mod error;
pub mod info;
pub mod lifecycle;
pub mod logging;
pub mod operations;
pub mod serving;

pub use config::{ArgumentParser, ConfigTranslator, StoreArgParser, StoreConfig};
pub use error::{ConfigError, ConstructionError, PluginError};
pub use lifecycle::{ForkStatus, PluginHost, PluginState};
pub use logging::{LogControl, LogDestination};
pub use operations::{DefaultStoreFactory, OperationSet, StoreFactory};
pub use serving::{CacheMode, Handle, RequestFlags, ServingContext};
