//! # config：宿主参数流到后端命令行的翻译
//!
//! ## 定位（Why）
//! - 协议服务器以一串无序的 `name=value` 事件传入参数，而后端解析器只认识有序的
//!   命令行风格参数表；本模块负责两者之间的翻译；
//! - 后端自身的 flag 语法对翻译层不透明，只通过 [`ArgumentParser`] 询问分类并交付参数表。
//!
//! ## 结构（How）
//! - [`translator`]：累积参数事件，产出一次性交付的参数表；
//! - [`parser`]：后端解析器接口、无人认领 token 的处理规则与内置解析器；
//! - [`size`]：容量后缀解析。

pub mod parser;
pub mod size;
pub mod translator;

pub use parser::{
    ArgumentParser, DEBUG_TOKEN, FlagKind, StoreArgParser, StoreConfig, Unclaimed,
    UnclaimedResolver,
};
pub use translator::{ConfigParam, ConfigTranslator, ParamKind};

/// 指定存储目标的保留参数名。
pub const TARGET_PARAM: &str = "target";

/// 可选的消歧前缀，用于避免与宿主自身参数撞名。
pub const PARAM_PREFIX: &str = "bg_";
