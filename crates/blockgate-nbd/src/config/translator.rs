//! # ConfigTranslator：参数事件累积器
//!
//! ## 核心意图（Why）
//! - 宿主逐个传入 `name=value`，到达顺序不保证与后端期望的顺序一致；
//! - 存储目标必须排在参数表最后，因此先暂存，等参数流结束再追加。
//!
//! ## 行为契约（What）
//! - 参数名若以 [`PARAM_PREFIX`] 开头（且长于前缀本身），先剥离前缀再分类；
//! - [`TARGET_PARAM`] 只能出现一次，重复出现即报错；
//! - 布尔 flag 接受大小写不敏感的 `true`/`false`：`true` 产出 `--name`，`false` 不产出任何条目；
//! - 取值 flag 产出 `--name=value`；
//! - 带前缀的未知参数一律报错；不带前缀的未知参数接受并忽略，留给宿主自身的参数机制；
//! - [`ConfigTranslator::finish`] 消费累积器，参数表只交付一次。

use tracing::debug;

use super::parser::{ArgumentParser, FlagKind};
use super::{PARAM_PREFIX, TARGET_PARAM};
use crate::error::ConfigError;
use crate::info::PLUGIN_NAME;

/// 参数分类结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamKind {
    Boolean,
    Value,
    Target,
    Unknown,
}

/// 单个参数事件的分类视图。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigParam {
    /// 剥离前缀后的名字。
    pub name: String,
    pub value: String,
    pub prefixed: bool,
    pub kind: ParamKind,
}

impl ConfigParam {
    pub fn classify(parser: &dyn ArgumentParser, name: &str, value: &str) -> Self {
        let (name, prefixed) = match name.strip_prefix(PARAM_PREFIX) {
            Some(stripped) if !stripped.is_empty() => (stripped, true),
            _ => (name, false),
        };

        let kind = if name == TARGET_PARAM {
            ParamKind::Target
        } else {
            match parser.classify(name) {
                FlagKind::Boolean => ParamKind::Boolean,
                FlagKind::Value => ParamKind::Value,
                FlagKind::Unknown => ParamKind::Unknown,
            }
        };

        Self {
            name: name.to_owned(),
            value: value.to_owned(),
            prefixed,
            kind,
        }
    }
}

/// 参数累积器。
///
/// # 教案式说明
/// - **意图 (Why)**：把无序事件收敛为后端可直接解析的有序参数表；
/// - **契约 (What)**：`args[0]` 恒为程序名；目标参数在 [`finish`](Self::finish) 时追加到末尾；
/// - **执行 (How)**：每个事件先经 [`ConfigParam::classify`] 分类，再按类别决定产出或报错。
#[derive(Clone, Debug)]
pub struct ConfigTranslator {
    args: Vec<String>,
    target: Option<String>,
}

impl Default for ConfigTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTranslator {
    pub fn new() -> Self {
        Self {
            args: vec![PLUGIN_NAME.to_owned()],
            target: None,
        }
    }

    /// 处理一个 `name=value` 事件。
    pub fn configure(
        &mut self,
        parser: &dyn ArgumentParser,
        name: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let param = ConfigParam::classify(parser, name, value);

        match param.kind {
            ParamKind::Target => {
                if self.target.is_some() {
                    return Err(ConfigError::DuplicateTarget {
                        name: TARGET_PARAM.to_owned(),
                    });
                }
                self.target = Some(param.value);
            }
            ParamKind::Boolean => {
                if param.value.eq_ignore_ascii_case("true") {
                    self.args.push(format!("--{}", param.name));
                } else if !param.value.eq_ignore_ascii_case("false") {
                    return Err(ConfigError::InvalidBoolean {
                        flag: param.name,
                        value: param.value,
                    });
                }
            }
            ParamKind::Value => {
                self.args.push(format!("--{}={}", param.name, param.value));
            }
            ParamKind::Unknown if param.prefixed => {
                return Err(ConfigError::UnknownParameter { name: param.name });
            }
            ParamKind::Unknown => {
                debug!(param = %param.name, "ignoring unrecognized parameter");
            }
        }
        Ok(())
    }

    /// 至今累积的参数表（不含暂存的目标）。
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// 结束参数流，交付完整参数表。
    pub fn finish(mut self) -> Vec<String> {
        if let Some(target) = self.target.take() {
            self.args.push(target);
        }
        self.args
    }
}
