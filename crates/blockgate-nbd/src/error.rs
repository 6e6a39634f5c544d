//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 启动期错误（参数、后端构造）一律致命，服务不会进入 Serving；
//! - 请求期错误只影响当次请求，折叠为一个 errno 交还协议服务器。
//!
//! ## 设计要求（What）
//! - 所有错误均派生 `thiserror::Error`；
//! - [`PluginError::errno`] 是协议层唯一需要的出口。

use blockgate_core::DispatchError;
use blockgate_core::error::errno;
use thiserror::Error;

use crate::lifecycle::PluginState;

/// 参数阶段的失败。
///
/// # 教案式说明
/// - **意图 (Why)**：参数来自宿主命令行，出错时应给出能直接对照命令行修改的提示；
/// - **契约 (What)**：每个变体都携带出错的参数名或取值原文；
/// - **风险 (Trade-offs)**：未带前缀的未知参数不会走到这里，它们被接受并忽略。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("duplicate \"{name}\" parameter")]
    DuplicateTarget { name: String },

    #[error("invalid value \"{value}\" for boolean flag \"--{flag}\"")]
    InvalidBoolean { flag: String, value: String },

    #[error("unknown blockgate parameter \"{name}\"")]
    UnknownParameter { name: String },

    #[error("invalid value \"{value}\" for flag \"--{flag}\": {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },

    #[error("invalid extraneous parameter \"{token}\"")]
    ExtraneousParameter { token: String },

    #[error("no storage target specified")]
    MissingTarget,
}

/// 后端构造失败发生的阶段。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConstructionStage {
    Store,
    Operations,
}

impl core::fmt::Display for ConstructionStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ConstructionStage::Store => "store",
            ConstructionStage::Operations => "operation set",
        })
    }
}

/// 后端存储或操作集构造失败。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("error creating {stage}: {detail}")]
pub struct ConstructionError {
    pub stage: ConstructionStage,
    pub detail: String,
}

impl ConstructionError {
    pub fn store(detail: impl Into<String>) -> Self {
        Self {
            stage: ConstructionStage::Store,
            detail: detail.into(),
        }
    }

    pub fn operations(detail: impl Into<String>) -> Self {
        Self {
            stage: ConstructionStage::Operations,
            detail: detail.into(),
        }
    }
}

/// 插件对宿主暴露的统一错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum PluginError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{operation} is not permitted in state {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: PluginState,
    },
}

impl PluginError {
    /// 交给协议服务器的 errno。
    ///
    /// - I/O 失败透传后端错误码；
    /// - 块号列表分配失败为 `ENOMEM`；
    /// - 其余均为 `EINVAL`。
    pub fn errno(&self) -> i32 {
        match self {
            PluginError::Dispatch(err) => err.errno(),
            PluginError::Config(_)
            | PluginError::Construction(_)
            | PluginError::InvalidTransition { .. } => errno::EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockgate_core::{IoOp, StoreError};

    #[test]
    fn dispatch_errors_keep_backend_errno() {
        let err = PluginError::from(DispatchError::Io {
            op: IoOp::Read,
            block: 1,
            source: StoreError::from_code(errno::ENOSPC),
        });
        assert_eq!(err.errno(), errno::ENOSPC);
    }

    #[test]
    fn allocation_failure_is_distinct_from_io() {
        let err = PluginError::from(DispatchError::Allocation { count: 1 << 40 });
        assert_eq!(err.errno(), errno::ENOMEM);
    }

    #[test]
    fn construction_error_names_stage() {
        let err = ConstructionError::operations("block size mismatch");
        assert_eq!(
            err.to_string(),
            "error creating operation set: block size mismatch"
        );
    }
}
