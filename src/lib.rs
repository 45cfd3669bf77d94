//! tinyfat is a small FAT-style file system living on a fixed-size block device.
//! Single user, single threaded, no caching: every change is written through.
//!
//! tinyfat's on-disk layout:
//! - Block 0: first block of the root directory
//! - Block 1: the allocation table, one 16-bit entry per block
//! - Blocks 2..: file data and directory records, chained through the table
//!
//! tinyfat's layers (from bottom to top):
//! 1. Block Device: whole-block reads and writes.                   | User implemented
//! 2. Allocation Table: reserve, extend and free block chains.      | Fs implemented
//! 3. Directory: fixed-size records packed densely into chains.     | Fs implemented
//! 4. Path: parsing, resolution and the working path.               | Fs implemented
//! 5. FileSystem: create, cat, ls, cp, mv, rm, append, mkdir, cd, pwd, chmod.
//! 6. Shell: command lines in, status codes out.                    | Optional

extern crate alloc;

mod config;
mod block_dev;
mod structs;
mod fat;
mod directory;
mod path;
mod file;
mod fs;
mod error;
pub mod logging;
pub mod shell;

pub use block_dev::BlockDevice;
pub use config::*;
pub use structs::*;
pub use fat::*;
pub use directory::*;
pub use path::*;
pub use file::*;
pub use fs::*;
pub use error::{status_of, FsError as Error, Result};
