//! 插件元数据，供宿主在注册与 `--help` 输出时使用。

use crate::config::TARGET_PARAM;

pub const PLUGIN_NAME: &str = "blockgate";

pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DESCRIPTION: &str = "Block-based backing store served over NBD";

/// 宿主把裸位置参数映射到的参数名。
pub const MAGIC_CONFIG_KEY: &str = TARGET_PARAM;

pub const CONFIG_HELP: &str = concat!(
    "    foo=bar                Equivalent to backend command line flag \"--foo=bar\"\n",
    "    foo=true               Equivalent to boolean backend command line flag \"--foo\"\n",
    "    bg_foo=bar             Alternate form of the above parameters (ensures uniqueness)\n",
    "    target=path|mem:name   Storage target: a file path, or an in-memory store\n",
    "    path|mem:name          Equivalent to \"target=path|mem:name\"",
);

/// 宿主调度请求的并发模型。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadModel {
    SerializeConnections,
    SerializeAllRequests,
    SerializeRequests,
    Parallel,
}

/// 本插件不持有连接级状态，所有请求可并行。
pub const THREAD_MODEL: ThreadModel = ThreadModel::Parallel;
