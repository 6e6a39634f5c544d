//! 生命周期集成测试：从参数事件一路走到服务与卸载。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use blockgate_core::error::errno;
use blockgate_core::store::memory::MemoryStore;
use blockgate_core::{BlockIndex, BlockStore, StoreError};
use blockgate_nbd::config::{ArgumentParser, StoreArgParser};
use blockgate_nbd::{
    CacheMode, ConfigError, ConstructionError, DefaultStoreFactory, ForkStatus, LogDestination,
    OperationSet, PluginError, PluginHost, PluginState, RequestFlags, StoreConfig, StoreFactory,
};
use core::num::NonZeroU32;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    shutdown: AtomicUsize,
    dropped: AtomicUsize,
}

/// 记录构造、关闭与释放次数的存储替身。
struct CountingStore {
    inner: MemoryStore,
    counters: Arc<Counters>,
}

impl Drop for CountingStore {
    fn drop(&mut self) {
        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl BlockStore for CountingStore {
    fn block_size(&self) -> NonZeroU32 {
        self.inner.block_size()
    }

    fn size_hint(&self) -> Option<u64> {
        self.inner.size_hint()
    }

    fn read_block(&self, block: BlockIndex, dst: &mut [u8]) -> Result<(), StoreError> {
        self.inner.read_block(block, dst)
    }

    fn write_block(&self, block: BlockIndex, src: &[u8]) -> Result<(), StoreError> {
        self.inner.write_block(block, src)
    }

    fn read_block_part(
        &self,
        block: BlockIndex,
        offset: u32,
        dst: &mut [u8],
    ) -> Result<(), StoreError> {
        self.inner.read_block_part(block, offset, dst)
    }

    fn write_block_part(
        &self,
        block: BlockIndex,
        offset: u32,
        src: &[u8],
    ) -> Result<(), StoreError> {
        self.inner.write_block_part(block, offset, src)
    }

    fn bulk_zero(&self, blocks: &[BlockIndex]) -> Result<(), StoreError> {
        self.inner.bulk_zero(blocks)
    }

    fn zero_block(&self) -> &[u8] {
        self.inner.zero_block()
    }

    fn shutdown(&self) -> Result<(), StoreError> {
        self.counters.shutdown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingFactory {
    parser: StoreArgParser,
    counters: Arc<Counters>,
    fail_operations: bool,
    seen_targets: Mutex<Vec<String>>,
}

impl CountingFactory {
    fn new(fail_operations: bool) -> Self {
        Self {
            parser: StoreArgParser,
            counters: Arc::default(),
            fail_operations,
            seen_targets: Mutex::new(Vec::new()),
        }
    }
}

impl StoreFactory for CountingFactory {
    fn parser(&self) -> &dyn ArgumentParser {
        &self.parser
    }

    fn create_store(&self, config: &StoreConfig) -> Result<Arc<dyn BlockStore>, ConstructionError> {
        self.seen_targets.lock().push(config.target().to_owned());
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        let size = config.size.unwrap_or(1 << 20);
        let inner = MemoryStore::new(config.block_size, size / u64::from(config.block_size.get()));
        Ok(Arc::new(CountingStore {
            inner,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn create_operations(
        &self,
        config: &StoreConfig,
        store: Arc<dyn BlockStore>,
    ) -> Result<OperationSet, ConstructionError> {
        if self.fail_operations {
            return Err(ConstructionError::operations("injected failure"));
        }
        OperationSet::create(config, store)
    }
}

fn configured<F: StoreFactory>(factory: F, params: &[(&str, &str)]) -> PluginHost<F> {
    let mut host = PluginHost::new(factory);
    for (name, value) in params {
        host.configure(name, value).unwrap();
    }
    host
}

#[test]
fn memory_target_serves_round_trip() {
    let mut host = configured(
        DefaultStoreFactory::new(),
        &[("target", "mem:disk"), ("blockSize", "512"), ("bg_size", "64k")],
    );
    host.config_complete().unwrap();
    assert_eq!(
        host.params(),
        ["blockgate", "--blockSize=512", "--size=64k", "mem:disk"]
    );
    host.get_ready().unwrap();
    let serving = host.after_fork(ForkStatus::SameProcess).unwrap();
    assert_eq!(host.state(), PluginState::Serving);

    let h = serving.open(false);
    assert_eq!(serving.get_size(h), 64 * 1024);
    assert_eq!(serving.can_cache(h), CacheMode::None);
    assert!(serving.can_write(h));

    let data: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();
    serving.write(h, &data, 1000, RequestFlags::NONE).unwrap();
    let mut back = vec![0u8; data.len()];
    serving.read(h, &mut back, 1000, RequestFlags::NONE).unwrap();
    assert_eq!(back, data);

    serving.trim(h, 3000, 1000, RequestFlags::NONE).unwrap();
    serving.read(h, &mut back, 1000, RequestFlags::NONE).unwrap();
    assert!(back.iter().all(|&b| b == 0));

    host.unload().unwrap();
    assert_eq!(host.state(), PluginState::Unloaded);
    assert!(host.params().is_empty());
    assert!(host.serving().is_none());
}

#[test]
fn block_cache_enables_cache_emulation() {
    let mut host = configured(
        DefaultStoreFactory::new(),
        &[("size", "1m"), ("blockCacheSize", "100"), ("target", "mem:c")],
    );
    host.config_complete().unwrap();
    host.get_ready().unwrap();
    let serving = host.after_fork(ForkStatus::SameProcess).unwrap();
    assert_eq!(serving.can_cache(serving.open(false)), CacheMode::Emulate);
}

#[test]
fn read_only_flag_disables_writes() {
    let mut host = configured(
        DefaultStoreFactory::new(),
        &[("size", "1m"), ("readOnly", "true"), ("target", "mem:ro")],
    );
    host.config_complete().unwrap();
    host.get_ready().unwrap();
    let serving = host.after_fork(ForkStatus::SameProcess).unwrap();
    let h = serving.open(true);
    assert!(!serving.can_write(h));
    let err = serving.write(h, &[1u8; 4096], 0, RequestFlags::NONE).unwrap_err();
    assert_eq!(err.errno(), errno::EROFS);
}

#[test]
fn debug_flag_opens_debug_gate() {
    let mut host = configured(
        CountingFactory::new(false),
        &[("size", "1m"), ("debug", "true"), ("target", "mem:x")],
    );
    host.config_complete().unwrap();
    assert!(host.config().unwrap().debug);
    assert!(host.log().debug_enabled());
    host.get_ready().unwrap();
    assert_eq!(*host.factory().seen_targets.lock(), ["mem:x"]);
}

#[test]
fn failed_operation_set_releases_store() {
    let mut host = configured(CountingFactory::new(true), &[("target", "mem:x")]);
    host.config_complete().unwrap();

    let err = host.get_ready().unwrap_err();
    assert!(matches!(err, PluginError::Construction(_)));
    assert_eq!(err.errno(), errno::EINVAL);
    assert_eq!(host.state(), PluginState::Configured);

    let counters = &host.factory().counters;
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.shutdown.load(Ordering::SeqCst), 1);
    assert_eq!(counters.dropped.load(Ordering::SeqCst), 1);
}

#[test]
fn unload_shuts_down_and_drops_store() {
    let mut host = configured(CountingFactory::new(false), &[("target", "mem:x")]);
    host.config_complete().unwrap();
    host.get_ready().unwrap();
    let serving = host.after_fork(ForkStatus::SameProcess).unwrap();
    drop(serving);
    host.unload().unwrap();

    let counters = &host.factory().counters;
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.shutdown.load(Ordering::SeqCst), 1);
    assert_eq!(counters.dropped.load(Ordering::SeqCst), 1);
}

#[test]
fn duplicate_target_is_rejected() {
    let mut host = PluginHost::new(DefaultStoreFactory::new());
    host.configure("target", "mem:a").unwrap();
    let err = host.configure("bg_target", "mem:b").unwrap_err();
    assert_eq!(
        err,
        PluginError::Config(ConfigError::DuplicateTarget {
            name: "target".to_owned()
        })
    );
}

#[test]
fn invalid_boolean_is_rejected() {
    let mut host = PluginHost::new(DefaultStoreFactory::new());
    let err = host.configure("readOnly", "maybe").unwrap_err();
    assert!(matches!(
        err,
        PluginError::Config(ConfigError::InvalidBoolean { .. })
    ));
}

#[test]
fn unknown_parameters_follow_prefix_rule() {
    let mut host = PluginHost::new(DefaultStoreFactory::new());
    host.configure("verbosity", "3").unwrap();
    let err = host.configure("bg_verbosity", "3").unwrap_err();
    assert_eq!(
        err,
        PluginError::Config(ConfigError::UnknownParameter {
            name: "verbosity".to_owned()
        })
    );
}

#[test]
fn failed_completion_keeps_accumulated_parameters() {
    let mut host = configured(
        DefaultStoreFactory::new(),
        &[("size", "1m"), ("blockSize", "512")],
    );
    let err = host.config_complete().unwrap_err();
    assert_eq!(err, PluginError::Config(ConfigError::MissingTarget));
    assert_eq!(host.state(), PluginState::Unconfigured);
    assert!(host.params().is_empty());
    assert!(host.config().is_none());

    host.configure("target", "mem:a").unwrap();
    host.config_complete().unwrap();
    assert_eq!(
        host.params(),
        ["blockgate", "--size=1m", "--blockSize=512", "mem:a"]
    );
    let config = host.config().unwrap();
    assert_eq!(config.block_size.get(), 512);
    assert_eq!(config.size, Some(1 << 20));

    host.get_ready().unwrap();
    let serving = host.after_fork(ForkStatus::SameProcess).unwrap();
    assert_eq!(serving.get_size(serving.open(false)), 1 << 20);
}

#[test]
fn out_of_order_calls_are_rejected() {
    let mut host = PluginHost::new(DefaultStoreFactory::new());
    assert!(matches!(
        host.get_ready(),
        Err(PluginError::InvalidTransition {
            operation: "get_ready",
            state: PluginState::Unconfigured
        })
    ));
    assert!(host.after_fork(ForkStatus::SameProcess).is_err());

    host.configure("target", "mem:a").unwrap();
    host.configure("size", "1m").unwrap();
    host.config_complete().unwrap();
    assert!(matches!(
        host.configure("size", "2m"),
        Err(PluginError::InvalidTransition {
            operation: "configure",
            ..
        })
    ));
    assert!(host.config_complete().is_err());

    host.unload().unwrap();
    assert!(host.unload().is_err());
    assert!(host.get_ready().is_err());
}

#[test]
fn same_process_keeps_stderr() {
    let mut host = configured(
        DefaultStoreFactory::new(),
        &[("target", "mem:a"), ("size", "1m")],
    );
    host.config_complete().unwrap();
    host.get_ready().unwrap();
    host.after_fork(ForkStatus::SameProcess).unwrap();
    assert_eq!(host.log().destination(), LogDestination::Stderr);
}

#[test]
fn file_target_uses_file_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");
    std::fs::write(&path, vec![0xabu8; 16 * 1024]).unwrap();

    let mut host = PluginHost::new(DefaultStoreFactory::new());
    host.configure("target", path.to_str().unwrap()).unwrap();
    host.configure("blockSize", "4k").unwrap();
    host.config_complete().unwrap();
    host.get_ready().unwrap();
    let serving = host.after_fork(ForkStatus::SameProcess).unwrap();

    let h = serving.open(false);
    assert_eq!(serving.get_size(h), 16 * 1024);
    serving.zero(h, 4096, 2048, RequestFlags::NONE).unwrap();

    let mut back = vec![0u8; 8192];
    serving.read(h, &mut back, 0, RequestFlags::NONE).unwrap();
    assert!(back[..2048].iter().all(|&b| b == 0xab));
    assert!(back[2048..6144].iter().all(|&b| b == 0));
    assert!(back[6144..].iter().all(|&b| b == 0xab));
    host.unload().unwrap();
}
