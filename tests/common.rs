//! Common utilities for tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tinyfat::BlockDevice;
use tinyfat::Error;
use tinyfat::FileSystem;
use tinyfat::BLOCK_SIZE;

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// A disk kept in memory. Clones share the same bytes, so a test can drop a
/// file system and mount the very same disk again.
#[derive(Clone)]
pub struct RamDisk {
    inner: Arc<Mutex<Vec<u8>>>,
    num_blocks: usize,
    fail_writes: Arc<AtomicBool>,
}

impl RamDisk {
    /// Creates a new RamDisk with the specified number of blocks.
    /// Each block is BLOCK_SIZE bytes.
    pub fn new(num_blocks: usize) -> Self {
        let size = num_blocks * BLOCK_SIZE;
        let inner = Arc::new(Mutex::new(vec![0u8; size]));
        RamDisk {
            inner,
            num_blocks,
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// While set, every block write fails with `WriteError`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw copy of one block.
    pub fn block(&self, block_id: usize) -> Vec<u8> {
        let data = self.inner.lock().unwrap();
        data[block_id * BLOCK_SIZE..(block_id + 1) * BLOCK_SIZE].to_vec()
    }

    /// Overwrites raw bytes, bypassing the file system.
    pub fn poke(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.inner.lock().unwrap();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        if block_id >= self.num_blocks {
            return Err(Error::InvalidBlockId);
        }
        if buf.len() != BLOCK_SIZE {
            return Err(Error::ReadError);
        }
        let start = block_id * BLOCK_SIZE;
        let end = start + BLOCK_SIZE;
        let data = self.inner.lock().unwrap();
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        if block_id >= self.num_blocks {
            return Err(Error::InvalidBlockId);
        }
        if buf.len() != BLOCK_SIZE || self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::WriteError);
        }
        let start = block_id * BLOCK_SIZE;
        let end = start + BLOCK_SIZE;
        let mut data = self.inner.lock().unwrap();
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// A freshly formatted file system on a RamDisk of `blocks` blocks.
pub fn fresh_fs(blocks: usize) -> FileSystem<RamDisk> {
    tinyfat::logging::init(log::LevelFilter::Debug);
    FileSystem::format(Arc::new(RamDisk::new(blocks))).unwrap()
}
