//! # logging：可在 fork 边界切换一次的日志出口
//!
//! ## 核心意图（Why）
//! - 宿主在前台阶段把日志直接写到 stderr；若宿主随后 fork 成守护进程，stderr 不再可见，
//!   日志必须改投系统日志；
//! - 切换点只有一个：进入 Serving 时由生命周期控制器根据宿主是否 fork 选定出口，
//!   之后不再改变。
//!
//! ## 结构（How）
//! - [`install`]：组装 `tracing-subscriber` 注册表，`EnvFilter` 负责粗过滤，
//!   调试闸门负责按配置中的 `debug` 开关放行 DEBUG/TRACE；
//! - [`LogControl`]：同时充当 `fmt` 层的 `MakeWriter` 与控制句柄，出口保存在
//!   `arc-swap` 单元里，热路径上只做一次原子加载；
//! - 系统日志以 RFC 3164 报文经 Unix 数据报套接字投递，facility 固定为 daemon；
//!   非 Unix 平台上切换到系统日志返回 `Unsupported`，出口保持 stderr。

use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

use crate::info::PLUGIN_NAME;

/// 系统日志套接字的默认路径。
pub const SYSLOG_SOCKET: &str = "/dev/log";

#[cfg(unix)]
const LOG_DAEMON: u8 = 3 << 3;

/// 日志出口。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogDestination {
    Stderr,
    Syslog,
}

enum Sink {
    Stderr,
    #[cfg(unix)]
    Syslog(UnixDatagram),
}

struct Shared {
    sink: ArcSwap<Sink>,
    debug: AtomicBool,
    switched: AtomicBool,
    syslog_path: PathBuf,
}

/// 日志安装失败。
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("global tracing subscriber already set: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 日志出口与调试闸门的共享句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：订阅器一经安装便无法替换，因此把“写到哪”“是否放行调试日志”
///   做成可在运行期调整的共享状态；
/// - **契约 (What)**：
///   - [`switch_to`](Self::switch_to) 在整个进程生命周期内只生效一次，后续调用返回 `Ok(false)`；
///   - [`set_debug`](Self::set_debug) 可多次调用，立即影响后续事件；
/// - **风险 (Trade-offs)**：系统日志套接字连接失败时出口保持 stderr，切换机会同样被消耗。
#[derive(Clone)]
pub struct LogControl {
    shared: Arc<Shared>,
}

impl Default for LogControl {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LogControl")
            .field("destination", &self.destination())
            .field("debug", &self.debug_enabled())
            .finish()
    }
}

impl LogControl {
    pub fn new() -> Self {
        Self::with_syslog_path(SYSLOG_SOCKET)
    }

    /// 指定系统日志套接字路径，主要用于测试。
    pub fn with_syslog_path(path: impl AsRef<Path>) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink: ArcSwap::from_pointee(Sink::Stderr),
                debug: AtomicBool::new(false),
                switched: AtomicBool::new(false),
                syslog_path: path.as_ref().to_path_buf(),
            }),
        }
    }

    pub fn destination(&self) -> LogDestination {
        match **self.shared.sink.load() {
            Sink::Stderr => LogDestination::Stderr,
            #[cfg(unix)]
            Sink::Syslog(_) => LogDestination::Syslog,
        }
    }

    pub fn set_debug(&self, enabled: bool) {
        self.shared.debug.store(enabled, Ordering::Release);
    }

    pub fn debug_enabled(&self) -> bool {
        self.shared.debug.load(Ordering::Acquire)
    }

    /// 调试闸门：INFO 及以上总是放行，DEBUG/TRACE 取决于调试开关。
    pub fn enabled(&self, level: &Level) -> bool {
        *level <= Level::INFO || self.debug_enabled()
    }

    /// 选定最终出口；仅第一次调用生效。
    pub fn switch_to(&self, destination: LogDestination) -> io::Result<bool> {
        if self.shared.switched.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        if destination == LogDestination::Syslog {
            let sink = connect_syslog(&self.shared.syslog_path)?;
            self.shared.sink.store(Arc::new(sink));
        }
        Ok(true)
    }

    /// 写向本句柄出口、受调试闸门约束的 `fmt` 层。
    pub fn layer<S>(&self) -> impl Layer<S> + Send + Sync + 'static
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let gate = self.clone();
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(self.clone())
            .with_filter(filter_fn(move |meta| gate.enabled(meta.level())))
    }

    /// 为给定级别的一条事件创建写入器。
    pub fn writer(&self, level: Level) -> LogWriter {
        LogWriter {
            sink: self.shared.sink.load_full(),
            level,
            buf: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogControl {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer(Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.writer(*meta.level())
    }
}

/// 单条事件的写入器，析构时整条投递。
pub struct LogWriter {
    sink: Arc<Sink>,
    #[cfg_attr(not(unix), allow(dead_code))]
    level: Level,
    buf: Vec<u8>,
}

#[cfg(unix)]
impl LogWriter {
    fn severity(&self) -> u8 {
        match self.level {
            Level::ERROR => 3,
            Level::WARN => 4,
            Level::INFO => 6,
            _ => 7,
        }
    }

    fn syslog_packet(&self) -> String {
        let message = String::from_utf8_lossy(&self.buf);
        format!(
            "<{}>{}[{}]: {}",
            LOG_DAEMON | self.severity(),
            PLUGIN_NAME,
            std::process::id(),
            message.trim_end()
        )
    }
}

#[cfg(unix)]
fn connect_syslog(path: &Path) -> io::Result<Sink> {
    let socket = UnixDatagram::unbound()?;
    socket.connect(path)?;
    Ok(Sink::Syslog(socket))
}

#[cfg(not(unix))]
fn connect_syslog(path: &Path) -> io::Result<Sink> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("syslog socket {} needs a unix platform", path.display()),
    ))
}

impl Write for LogWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        match &*self.sink {
            Sink::Stderr => {
                let _ = io::stderr().write_all(&self.buf);
            }
            #[cfg(unix)]
            Sink::Syslog(socket) => {
                if socket.send(self.syslog_packet().as_bytes()).is_err() {
                    let _ = io::stderr().write_all(&self.buf);
                }
            }
        }
    }
}

/// 安装全局订阅器并返回控制句柄。
///
/// 默认放行到 DEBUG，由调试闸门决定 DEBUG/TRACE 是否真正输出；设置 `RUST_LOG` 可覆盖。
pub fn install() -> Result<LogControl, LoggingError> {
    let control = LogControl::new();
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(control.layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(control)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
}
