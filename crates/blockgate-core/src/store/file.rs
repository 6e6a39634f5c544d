//! # FileStore：本地文件直写后端
//!
//! ## 核心意图（Why）
//! - 提供一个不依赖远端服务、可直接挂到协议服务器上的真实后端，块 `n` 映射到文件偏移
//!   `n * block_size`；
//! - 使用定位读写（`pread`/`pwrite` 语义），并发请求之间无需共享文件游标。
//!
//! ## 行为契约（What）
//! - 文件短于设备容量时，越过文件末尾的读取返回零；
//! - 打开时给定容量且文件不足该长度，会先扩展文件（只读模式除外）；
//! - 批量清零逐块写入全零块，不做打洞。

use core::num::NonZeroU32;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{BlockStore, ZeroBlock, check_part};
use crate::BlockIndex;
use crate::error::StoreError;

/// 基于单个文件的块存储。
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
    block_size: NonZeroU32,
    total_blocks: u64,
    read_only: bool,
    zero: ZeroBlock,
}

impl FileStore {
    /// 打开（必要时创建）后端文件。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - `size`：设备容量；为 `None` 时取文件当前长度；
    ///   - 容量会向下取整到块大小的整数倍，取整后为 0 视为无效；
    ///   - 只读模式不会创建或扩展文件。
    pub fn open(
        path: impl AsRef<Path>,
        block_size: NonZeroU32,
        size: Option<u64>,
        read_only: bool,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .truncate(false)
            .open(&path)?;

        let current = file.metadata()?.len();
        let size = size.unwrap_or(current);
        let bs = u64::from(block_size.get());
        let total_blocks = size / bs;
        if total_blocks == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is smaller than one {bs}-byte block", path.display()),
            ));
        }
        if !read_only && current < total_blocks * bs {
            file.set_len(total_blocks * bs)?;
        }
        debug!(
            path = %path.display(),
            total_blocks,
            block_size = bs,
            "opened file store"
        );

        Ok(Self {
            path,
            file,
            block_size,
            total_blocks,
            read_only,
            zero: ZeroBlock::new(block_size),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn position(&self, block: BlockIndex, offset: u32) -> Result<u64, StoreError> {
        if block >= self.total_blocks {
            return Err(StoreError::invalid());
        }
        Ok(block * u64::from(self.block_size.get()) + u64::from(offset))
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::read_only());
        }
        Ok(())
    }

    fn read_at(&self, mut pos: u64, mut dst: &mut [u8]) -> Result<(), StoreError> {
        while !dst.is_empty() {
            match self.file.read_at(dst, pos) {
                Ok(0) => {
                    dst.fill(0);
                    break;
                }
                Ok(n) => {
                    pos += n as u64;
                    dst = &mut std::mem::take(&mut dst)[n..];
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

impl BlockStore for FileStore {
    fn block_size(&self) -> NonZeroU32 {
        self.block_size
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.total_blocks * u64::from(self.block_size.get()))
    }

    fn read_block(&self, block: BlockIndex, dst: &mut [u8]) -> Result<(), StoreError> {
        if dst.len() != self.block_size.get() as usize {
            return Err(StoreError::invalid());
        }
        let pos = self.position(block, 0)?;
        self.read_at(pos, dst)
    }

    fn write_block(&self, block: BlockIndex, src: &[u8]) -> Result<(), StoreError> {
        if src.len() != self.block_size.get() as usize {
            return Err(StoreError::invalid());
        }
        self.check_writable()?;
        let pos = self.position(block, 0)?;
        self.file.write_all_at(src, pos).map_err(StoreError::from)
    }

    fn read_block_part(
        &self,
        block: BlockIndex,
        offset: u32,
        dst: &mut [u8],
    ) -> Result<(), StoreError> {
        check_part(self.block_size, offset, dst.len())?;
        let pos = self.position(block, offset)?;
        self.read_at(pos, dst)
    }

    fn write_block_part(
        &self,
        block: BlockIndex,
        offset: u32,
        src: &[u8],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        check_part(self.block_size, offset, src.len())?;
        let pos = self.position(block, offset)?;
        self.file.write_all_at(src, pos).map_err(StoreError::from)
    }

    fn bulk_zero(&self, blocks: &[BlockIndex]) -> Result<(), StoreError> {
        self.check_writable()?;
        for &block in blocks {
            self.write_block(block, self.zero.as_slice())?;
        }
        Ok(())
    }

    fn zero_block(&self) -> &[u8] {
        self.zero.as_slice()
    }

    fn shutdown(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Ok(());
        }
        self.file.sync_all().map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bs() -> NonZeroU32 {
        NonZeroU32::new(512).unwrap()
    }

    #[test]
    fn open_extends_file_to_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let store = FileStore::open(&path, bs(), Some(4096), false).unwrap();
        assert_eq!(store.total_blocks(), 8);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn open_rejects_file_smaller_than_a_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.img");
        std::fs::write(&path, [0u8; 100]).unwrap();
        let err = FileStore::open(&path, bs(), None, false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn block_and_partial_io_hit_expected_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let store = FileStore::open(&path, bs(), Some(2048), false).unwrap();

        store.write_block(1, &[3u8; 512]).unwrap();
        store.write_block_part(2, 10, b"hello").unwrap();
        store.shutdown().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert!(raw[512..1024].iter().all(|&b| b == 3));
        assert_eq!(&raw[1034..1039], b"hello");

        let mut part = [0u8; 5];
        store.read_block_part(2, 10, &mut part).unwrap();
        assert_eq!(&part, b"hello");
    }

    #[test]
    fn read_only_file_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.img");
        std::fs::write(&path, [1u8; 1024]).unwrap();
        let store = FileStore::open(&path, bs(), None, true).unwrap();
        assert_eq!(
            store.write_block(0, &[0u8; 512]).unwrap_err(),
            StoreError::read_only()
        );
        let mut buf = [0u8; 512];
        store.read_block(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 1));
    }
}
