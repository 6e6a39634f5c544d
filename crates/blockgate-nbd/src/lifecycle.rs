//! # lifecycle：插件生命周期控制器
//!
//! ## 核心意图（Why）
//! - 宿主按固定顺序驱动插件：逐个传参 → 参数结束 → 就绪 → （可能 fork 后）开始服务 → 卸载；
//! - 每一步都可能失败，失败时必须保证已构造的资源被关闭并释放，不留半成品。
//!
//! ## 状态图（What）
//! ```text
//! Unconfigured --config_complete--> Configured --get_ready--> Ready --after_fork--> Serving
//!       \__________________________________\__________________\____________\--unload--> Unloaded
//! ```
//! - `configure` 只在 Unconfigured 下接受；
//! - 任何非终止状态都可以直接卸载；
//! - 乱序调用返回 [`PluginError::InvalidTransition`]，状态不变；
//! - `config_complete` 解析失败时保持 Unconfigured，已累积的参数事件原样保留，
//!   补齐缺失的参数后可以再次提交。
//!
//! ## 风险提示（Trade-offs）
//! - 日志出口的切换在整个进程内只发生一次；若宿主在同一进程内重复加载插件，
//!   后续实例沿用第一次的选择。

use std::sync::Arc;

use blockgate_core::BlockStore;
use tracing::{debug, info, warn};

use crate::config::{ConfigTranslator, StoreConfig, UnclaimedResolver};
use crate::error::PluginError;
use crate::logging::{LogControl, LogDestination};
use crate::operations::{OperationSet, StoreFactory};
use crate::serving::ServingContext;

/// 插件所处的生命周期阶段。
///
/// # 教案式说明
/// - **意图 (Why)**：把宿主回调的合法顺序显式化，便于在入口处统一校验；
/// - **契约 (What)**：跃迁受 [`PluginState::can_transition_to`] 约束；
/// - **风险 (Trade-offs)**：Unloaded 为终止态，之后的任何调用都会被拒绝。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PluginState {
    /// 正在接收参数。
    Unconfigured,
    /// 参数已解析，存储尚未打开。
    Configured,
    /// 存储与操作集已构造。
    Ready,
    /// 操作集已初始化，可以处理请求。
    Serving,
    Unloaded,
}

impl PluginState {
    /// 判断状态是否允许跃迁至 `target`。
    pub fn can_transition_to(self, target: PluginState) -> bool {
        matches!(
            (self, target),
            (PluginState::Unconfigured, PluginState::Configured)
                | (PluginState::Configured, PluginState::Ready)
                | (PluginState::Ready, PluginState::Serving)
                | (PluginState::Unconfigured, PluginState::Unloaded)
                | (PluginState::Configured, PluginState::Unloaded)
                | (PluginState::Ready, PluginState::Unloaded)
                | (PluginState::Serving, PluginState::Unloaded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PluginState::Unloaded)
    }
}

/// 宿主在进入服务前是否 fork 过。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ForkStatus {
    SameProcess,
    /// 宿主已转入后台，stderr 不再可见。
    Forked,
}

impl ForkStatus {
    fn log_destination(self) -> LogDestination {
        match self {
            ForkStatus::SameProcess => LogDestination::Stderr,
            ForkStatus::Forked => LogDestination::Syslog,
        }
    }
}

/// 生命周期控制器。
///
/// # 教案式说明
/// - **意图 (Why)**：把参数翻译、后端构造、服务上下文这几份状态收拢到一处，由状态机保证顺序；
/// - **契约 (What)**：
///   - 配置阶段的方法以 `&mut self` 调用，单线程使用；
///   - [`after_fork`](Self::after_fork) 返回的 [`ServingContext`] 可跨线程共享；
///   - 任何一步失败都不会留下已打开但未关闭的存储；
/// - **执行 (How)**：每个入口先校验跃迁，成功完成全部动作后才更新状态。
pub struct PluginHost<F: StoreFactory> {
    factory: F,
    state: PluginState,
    translator: Option<ConfigTranslator>,
    params: Vec<String>,
    config: Option<StoreConfig>,
    store: Option<Arc<dyn BlockStore>>,
    operations: Option<OperationSet>,
    serving: Option<Arc<ServingContext>>,
    log: LogControl,
}

impl<F: StoreFactory> PluginHost<F> {
    /// 使用独立的日志控制句柄创建控制器；该句柄未接入全局订阅器。
    pub fn new(factory: F) -> Self {
        Self::with_log(factory, LogControl::new())
    }

    /// 使用 [`crate::logging::install`] 返回的句柄创建控制器。
    pub fn with_log(factory: F, log: LogControl) -> Self {
        Self {
            factory,
            state: PluginState::Unconfigured,
            translator: None,
            params: Vec::new(),
            config: None,
            store: None,
            operations: None,
            serving: None,
            log,
        }
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn log(&self) -> &LogControl {
        &self.log
    }

    /// 交给后端解析器的完整参数表；参数结束前为空。
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn config(&self) -> Option<&StoreConfig> {
        self.config.as_ref()
    }

    pub fn serving(&self) -> Option<&Arc<ServingContext>> {
        self.serving.as_ref()
    }

    /// 接收一个 `name=value` 参数。
    pub fn configure(&mut self, name: &str, value: &str) -> Result<(), PluginError> {
        if self.state != PluginState::Unconfigured {
            return Err(self.rejected("configure"));
        }
        self.translator
            .get_or_insert_with(ConfigTranslator::new)
            .configure(self.factory.parser(), name, value)?;
        Ok(())
    }

    /// 参数流结束：交付参数表并解析。
    ///
    /// 解析失败时累积器不被消费，之前接受的参数事件全部保留。
    pub fn config_complete(&mut self) -> Result<(), PluginError> {
        self.ensure("config_complete", PluginState::Configured)?;

        let params = self.translator.clone().unwrap_or_default().finish();
        debug!(?params, "parsing backend parameters");

        let mut resolver = UnclaimedResolver::new();
        let config = self.factory.parser().parse(&params, &mut resolver)?;
        self.log.set_debug(config.debug);
        debug!(target_param = config.target(), "configuration complete");

        self.translator = None;
        self.params = params;
        self.config = Some(config);
        self.state = PluginState::Configured;
        Ok(())
    }

    /// 打开存储并构造操作集。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：操作集构造失败时，先关闭存储、再释放最后一个句柄，然后返回错误，
    ///   状态保持 Configured；
    /// - **风险 (Trade-offs)**：关闭失败只记录告警，返回的仍是构造错误。
    pub fn get_ready(&mut self) -> Result<(), PluginError> {
        self.ensure("get_ready", PluginState::Ready)?;
        let Some(config) = self.config.as_ref() else {
            return Err(self.rejected("get_ready"));
        };

        let store = self.factory.create_store(config)?;
        let operations = match self.factory.create_operations(config, Arc::clone(&store)) {
            Ok(operations) => operations,
            Err(err) => {
                warn!(error = %err, "operation set construction failed; shutting store down");
                if let Err(shutdown) = store.shutdown() {
                    warn!(error = %shutdown, "store shutdown failed");
                }
                drop(store);
                return Err(err.into());
            }
        };

        self.store = Some(store);
        self.operations = Some(operations);
        self.state = PluginState::Ready;
        Ok(())
    }

    /// 宿主完成（或跳过）fork 后调用：选定日志出口并初始化操作集。
    pub fn after_fork(&mut self, fork: ForkStatus) -> Result<Arc<ServingContext>, PluginError> {
        self.ensure("after_fork", PluginState::Serving)?;
        let Some(operations) = self.operations.as_ref() else {
            return Err(self.rejected("after_fork"));
        };

        let destination = fork.log_destination();
        match self.log.switch_to(destination) {
            Ok(true) => debug!(?destination, "log destination selected"),
            Ok(false) => {}
            Err(err) => warn!(?destination, error = %err, "cannot switch log destination"),
        }

        let serving = Arc::new(operations.init());
        self.serving = Some(Arc::clone(&serving));
        self.state = PluginState::Serving;
        Ok(serving)
    }

    /// 卸载：销毁操作集、关闭存储、释放参数表。
    pub fn unload(&mut self) -> Result<(), PluginError> {
        self.ensure("unload", PluginState::Unloaded)?;

        self.serving = None;
        let store = self.store.take();
        match (self.operations.take(), store.as_ref()) {
            (Some(operations), _) => {
                if let Err(err) = operations.destroy() {
                    warn!(error = %err, "store shutdown failed during unload");
                }
            }
            (None, Some(store)) => {
                if let Err(err) = store.shutdown() {
                    warn!(error = %err, "store shutdown failed during unload");
                }
            }
            (None, None) => {}
        }
        drop(store);

        self.translator = None;
        self.params.clear();
        self.config = None;
        self.state = PluginState::Unloaded;
        info!("plugin unloaded");
        Ok(())
    }

    fn ensure(&self, operation: &'static str, next: PluginState) -> Result<(), PluginError> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(self.rejected(operation))
        }
    }

    fn rejected(&self, operation: &'static str) -> PluginError {
        PluginError::InvalidTransition {
            operation,
            state: self.state,
        }
    }
}
