//! # operations：后端操作集与存储工厂
//!
//! ## 核心意图（Why）
//! - 把“由配置构造后端存储”与“在存储之上建立可服务的操作集”拆成两步，生命周期控制器
//!   才能在第二步失败时准确地回收第一步的产物；
//! - [`StoreFactory`] 是替换后端的接缝：测试替身与真实后端都经由它接入。
//!
//! ## 行为契约（What）
//! - [`OperationSet::create`] 校验几何参数：块大小须与存储一致，设备容量须为块大小的整数倍，
//!   且不超过存储已知的容量；
//! - [`OperationSet::init`] 固定设备容量，产出 [`ServingContext`]；
//! - [`OperationSet::destroy`] 关闭存储；存储本身随最后一个句柄释放。

use std::sync::Arc;

use blockgate_core::BlockStore;
use blockgate_core::store::memory::MemoryStore;
use tracing::{debug, info};

use crate::config::{ArgumentParser, StoreArgParser, StoreConfig};
use crate::error::ConstructionError;
use crate::serving::{CacheMode, ServingContext};

/// 内存存储目标的前缀。
pub const MEMORY_TARGET_PREFIX: &str = "mem:";

/// 建立在单个存储之上的操作集。
///
/// # 教案式说明
/// - **意图 (Why)**：把对存储的几何校验集中在构造阶段，Serving 阶段不再失败于配置问题；
/// - **契约 (What)**：持有存储的共享句柄；`init` 可多次调用，每次得到共享同一存储的上下文；
/// - **风险 (Trade-offs)**：`destroy` 只负责关闭，不等待其它句柄释放。
pub struct OperationSet {
    store: Arc<dyn BlockStore>,
    device_size: u64,
    cache: CacheMode,
    read_only: bool,
}

impl core::fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OperationSet")
            .field("block_size", &self.store.block_size())
            .field("device_size", &self.device_size)
            .field("cache", &self.cache)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl OperationSet {
    pub fn create(
        config: &StoreConfig,
        store: Arc<dyn BlockStore>,
    ) -> Result<Self, ConstructionError> {
        let block_size = store.block_size();
        if block_size != config.block_size {
            return Err(ConstructionError::operations(format!(
                "store block size {} does not match configured block size {}",
                block_size, config.block_size
            )));
        }

        let hint = store.size_hint();
        let device_size = match (config.size, hint) {
            (Some(size), Some(limit)) if size > limit => {
                return Err(ConstructionError::operations(format!(
                    "configured size {size} exceeds store capacity {limit}"
                )));
            }
            (Some(size), _) | (None, Some(size)) => size,
            (None, None) => {
                return Err(ConstructionError::operations(
                    "device size is unknown; specify --size",
                ));
            }
        };
        if device_size == 0 || device_size % u64::from(block_size.get()) != 0 {
            return Err(ConstructionError::operations(format!(
                "device size {device_size} is not a positive multiple of block size {block_size}"
            )));
        }

        debug!(device_size, block_size = block_size.get(), "operation set created");
        Ok(Self {
            store,
            device_size,
            cache: CacheMode::for_block_cache(config.block_cache_size),
            read_only: config.read_only,
        })
    }

    pub fn device_size(&self) -> u64 {
        self.device_size
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    pub fn init(&self) -> ServingContext {
        info!(
            device_size = self.device_size,
            read_only = self.read_only,
            "block device ready"
        );
        ServingContext::new(
            Arc::clone(&self.store),
            self.device_size,
            self.cache,
            self.read_only,
        )
    }

    /// 关闭存储并释放本操作集持有的句柄。
    pub fn destroy(self) -> Result<(), blockgate_core::StoreError> {
        self.store.shutdown()
    }
}

/// 后端构造接缝。
///
/// # 教案式说明
/// - **意图 (Why)**：生命周期控制器只依赖这三个动作，不关心后端种类；
/// - **契约 (What)**：
///   - `parser`：参数翻译与解析所用的解析器；
///   - `create_store`：依据解析后的配置打开存储；
///   - `create_operations`：在存储之上建立操作集，默认走 [`OperationSet::create`]；
/// - **风险 (Trade-offs)**：`create_operations` 失败时，存储由调用方关闭并释放，实现不得自行保留句柄。
pub trait StoreFactory {
    fn parser(&self) -> &dyn ArgumentParser;

    fn create_store(&self, config: &StoreConfig)
    -> Result<Arc<dyn BlockStore>, ConstructionError>;

    fn create_operations(
        &self,
        config: &StoreConfig,
        store: Arc<dyn BlockStore>,
    ) -> Result<OperationSet, ConstructionError> {
        OperationSet::create(config, store)
    }
}

/// 内置工厂：`mem:` 目标使用内存存储，其余目标视为文件路径。
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultStoreFactory {
    parser: StoreArgParser,
}

impl DefaultStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreFactory for DefaultStoreFactory {
    fn parser(&self) -> &dyn ArgumentParser {
        &self.parser
    }

    fn create_store(
        &self,
        config: &StoreConfig,
    ) -> Result<Arc<dyn BlockStore>, ConstructionError> {
        let target = config.target();
        let bs = u64::from(config.block_size.get());

        if let Some(name) = target.strip_prefix(MEMORY_TARGET_PREFIX) {
            let size = config.size.ok_or_else(|| {
                ConstructionError::store(format!("memory target \"{name}\" requires --size"))
            })?;
            if size % bs != 0 {
                return Err(ConstructionError::store(format!(
                    "size {size} is not a positive multiple of block size {bs}"
                )));
            }
            debug!(name, size, "creating memory store");
            let store = MemoryStore::new(config.block_size, size / bs)
                .with_read_only(config.read_only);
            return Ok(Arc::new(store));
        }

        open_file_store(target, config)
    }
}

#[cfg(unix)]
fn open_file_store(
    path: &str,
    config: &StoreConfig,
) -> Result<Arc<dyn BlockStore>, ConstructionError> {
    use blockgate_core::store::file::FileStore;

    let store = FileStore::open(path, config.block_size, config.size, config.read_only)
        .map_err(|err| ConstructionError::store(format!("{path}: {err}")))?;
    Ok(Arc::new(store))
}

#[cfg(not(unix))]
fn open_file_store(
    path: &str,
    _config: &StoreConfig,
) -> Result<Arc<dyn BlockStore>, ConstructionError> {
    Err(ConstructionError::store(format!(
        "{path}: file targets are only supported on unix"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConstructionStage;
    use core::num::NonZeroU32;

    fn config(target: &str, size: Option<u64>) -> StoreConfig {
        StoreConfig {
            block_size: NonZeroU32::new(1024).unwrap(),
            size,
            target: Some(target.to_owned()),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn memory_target_requires_size() {
        let err = DefaultStoreFactory::new()
            .create_store(&config("mem:a", None))
            .err().unwrap();
        assert_eq!(err.stage, ConstructionStage::Store);
    }

    #[test]
    fn memory_target_rejects_unaligned_size() {
        let err = DefaultStoreFactory::new()
            .create_store(&config("mem:a", Some(1000)))
            .err().unwrap();
        assert_eq!(err.stage, ConstructionStage::Store);
        assert_eq!(
            err.detail,
            "size 1000 is not a positive multiple of block size 1024"
        );
    }

    #[test]
    fn size_defaults_to_store_capacity() {
        let factory = DefaultStoreFactory::new();
        let mut cfg = config("mem:a", Some(1 << 20));
        let store = factory.create_store(&cfg).unwrap();
        cfg.size = None;
        let ops = factory.create_operations(&cfg, store).unwrap();
        assert_eq!(ops.device_size(), 1 << 20);
    }

    #[test]
    fn mismatched_block_size_is_rejected() {
        let store: Arc<dyn BlockStore> =
            Arc::new(MemoryStore::new(NonZeroU32::new(512).unwrap(), 16));
        let err = OperationSet::create(&config("mem:a", Some(8192)), store).unwrap_err();
        assert_eq!(err.stage, ConstructionStage::Operations);
    }

    #[test]
    fn oversized_device_is_rejected() {
        let store: Arc<dyn BlockStore> =
            Arc::new(MemoryStore::new(NonZeroU32::new(1024).unwrap(), 4));
        let err = OperationSet::create(&config("mem:a", Some(8192)), store).unwrap_err();
        assert!(err.detail.contains("exceeds store capacity"));
    }

    #[test]
    fn unaligned_device_size_is_rejected() {
        let store: Arc<dyn BlockStore> =
            Arc::new(MemoryStore::new(NonZeroU32::new(1024).unwrap(), 4));
        let err = OperationSet::create(&config("mem:a", Some(1500)), store).unwrap_err();
        assert!(err.detail.contains("not a positive multiple"));
    }

    #[test]
    fn cache_mode_follows_block_cache_size() {
        let store: Arc<dyn BlockStore> =
            Arc::new(MemoryStore::new(NonZeroU32::new(1024).unwrap(), 4));
        let mut cfg = config("mem:a", Some(4096));
        cfg.block_cache_size = 10;
        let ctx = OperationSet::create(&cfg, store).unwrap().init();
        let h = ctx.open(false);
        assert_eq!(ctx.can_cache(h), CacheMode::Emulate);
    }

    #[test]
    fn file_target_opens_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let cfg = config(path.to_str().unwrap(), Some(8192));
        let store = DefaultStoreFactory::new().create_store(&cfg).unwrap();
        assert_eq!(store.size_hint(), Some(8192));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
    }
}
