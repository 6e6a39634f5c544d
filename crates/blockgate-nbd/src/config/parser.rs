//! # parser：后端参数解析器
//!
//! ## 核心意图（Why）
//! - 翻译层只需要知道两件事：某个 flag 是布尔型还是取值型，以及如何把整张参数表交给后端；
//!   这两件事由 [`ArgumentParser`] 表达，其余语法细节留在实现内部；
//! - 后端无法安放的 token（未知选项、位置参数）交回翻译层，由 [`UnclaimedResolver`]
//!   按固定顺序裁决。
//!
//! ## 裁决规则（What）
//! 1. 调试 token（[`DEBUG_TOKEN`]）打开调试开关；
//! 2. 第一个无人认领的位置参数在目标尚未设置时成为存储目标；
//! 3. 此后至多再容忍一个位置参数，视为可忽略的历史挂载点；
//! 4. 其余任何无人认领的 token 都是致命的配置错误。

use core::num::NonZeroU32;

use tracing::debug;

use super::size::parse_size;
use crate::error::ConfigError;

/// 打开调试开关的 token。
pub const DEBUG_TOKEN: &str = "-d";

/// 默认块大小。
pub const DEFAULT_BLOCK_SIZE: NonZeroU32 = match NonZeroU32::new(4096) {
    Some(size) => size,
    None => unreachable!(),
};

/// 后端对某个 flag 名的分类。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlagKind {
    /// 无值 flag，形如 `--name`。
    Boolean,
    /// 取值 flag，形如 `--name=value`。
    Value,
    Unknown,
}

/// 后端解析器交回的无人认领 token。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Unclaimed<'a> {
    /// 以 `-` 开头但后端不认识的选项。
    Option(&'a str),
    /// 位置参数。
    Positional(&'a str),
}

impl Unclaimed<'_> {
    pub fn as_str(&self) -> &str {
        match self {
            Unclaimed::Option(token) | Unclaimed::Positional(token) => token,
        }
    }
}

/// 后端解析结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreConfig {
    pub block_size: NonZeroU32,
    /// 设备容量（字节）；缺省时由后端推断。
    pub size: Option<u64>,
    /// 块缓存容量（块数），0 表示关闭。
    pub block_cache_size: u64,
    pub read_only: bool,
    pub debug: bool,
    pub target: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            size: None,
            block_cache_size: 0,
            read_only: false,
            debug: false,
            target: None,
        }
    }
}

impl StoreConfig {
    /// 已解析的存储目标；解析器保证 `Configured` 之后一定存在。
    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or_default()
    }
}

/// 不透明的后端解析器。
///
/// # 教案式说明
/// - **意图 (Why)**：翻译层与后端 flag 语法解耦，替换后端时只需提供新的实现；
/// - **契约 (What)**：
///   - `classify`：只根据名字分类，不做取值校验；
///   - `parse`：`args[0]` 为程序名；遇到无法安放的 token 必须交给 `unclaimed`，
///     并传播其返回的错误；
/// - **风险 (Trade-offs)**：分类与解析必须一致，否则翻译层产出的参数会被解析器当作无人认领。
pub trait ArgumentParser {
    fn classify(&self, flag: &str) -> FlagKind;

    fn parse(
        &self,
        args: &[String],
        unclaimed: &mut UnclaimedResolver,
    ) -> Result<StoreConfig, ConfigError>;
}

/// 无人认领 token 的裁决器，见模块文档中的四条规则。
#[derive(Debug, Default)]
pub struct UnclaimedResolver {
    saw_legacy_positional: bool,
}

impl UnclaimedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        config: &mut StoreConfig,
        token: Unclaimed<'_>,
    ) -> Result<(), ConfigError> {
        match token {
            Unclaimed::Option(DEBUG_TOKEN) => {
                config.debug = true;
                Ok(())
            }
            Unclaimed::Positional(arg) if config.target.is_none() => {
                debug!(target_param = arg, "recording storage target");
                config.target = Some(arg.to_owned());
                Ok(())
            }
            Unclaimed::Positional(arg) if !self.saw_legacy_positional => {
                debug!(param = arg, "ignoring mount point parameter");
                self.saw_legacy_positional = true;
                Ok(())
            }
            other => Err(ConfigError::ExtraneousParameter {
                token: other.as_str().to_owned(),
            }),
        }
    }
}

/// 内置后端的 flag 表。
const FLAGS: &[(&str, FlagKind)] = &[
    ("blockSize", FlagKind::Value),
    ("size", FlagKind::Value),
    ("blockCacheSize", FlagKind::Value),
    ("readOnly", FlagKind::Boolean),
    ("debug", FlagKind::Boolean),
];

/// 内置后端（内存与文件存储）的参数解析器。
///
/// 语法：`--name` 为布尔 flag，`--name=value` 为取值 flag，其余 `-` 开头的 token 为未知选项，
/// 不以 `-` 开头的 token 为位置参数。
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreArgParser;

impl StoreArgParser {
    fn apply(
        config: &mut StoreConfig,
        name: &str,
        value: Option<&str>,
    ) -> Result<bool, ConfigError> {
        let invalid = |value: &str, reason: String| ConfigError::InvalidValue {
            flag: name.to_owned(),
            value: value.to_owned(),
            reason,
        };

        match (name, value) {
            ("readOnly", None) => config.read_only = true,
            ("debug", None) => config.debug = true,
            ("blockSize", Some(value)) => {
                let size = parse_size(value).map_err(|reason| invalid(value, reason))?;
                config.block_size = u32::try_from(size)
                    .ok()
                    .filter(|size| size.is_power_of_two())
                    .and_then(NonZeroU32::new)
                    .ok_or_else(|| {
                        invalid(value, "block size must be a power of two below 4g".to_owned())
                    })?;
            }
            ("size", Some(value)) => {
                let size = parse_size(value).map_err(|reason| invalid(value, reason))?;
                if size == 0 {
                    return Err(invalid(value, "size must be positive".to_owned()));
                }
                config.size = Some(size);
            }
            ("blockCacheSize", Some(value)) => {
                config.block_cache_size = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(value, "expected a block count".to_owned()))?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl ArgumentParser for StoreArgParser {
    fn classify(&self, flag: &str) -> FlagKind {
        FLAGS
            .iter()
            .find(|(name, _)| *name == flag)
            .map_or(FlagKind::Unknown, |(_, kind)| *kind)
    }

    fn parse(
        &self,
        args: &[String],
        unclaimed: &mut UnclaimedResolver,
    ) -> Result<StoreConfig, ConfigError> {
        let mut config = StoreConfig::default();

        for arg in args.iter().skip(1) {
            let token = arg.as_str();
            if let Some(flag) = token.strip_prefix("--") {
                let (name, value) = match flag.split_once('=') {
                    Some((name, value)) => (name, Some(value)),
                    None => (flag, None),
                };
                if !Self::apply(&mut config, name, value)? {
                    unclaimed.resolve(&mut config, Unclaimed::Option(token))?;
                }
            } else if token.len() > 1 && token.starts_with('-') {
                unclaimed.resolve(&mut config, Unclaimed::Option(token))?;
            } else {
                unclaimed.resolve(&mut config, Unclaimed::Positional(token))?;
            }
        }

        if config.target.is_none() {
            return Err(ConfigError::MissingTarget);
        }
        Ok(config)
    }
}
