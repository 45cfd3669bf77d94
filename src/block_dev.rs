use crate::error::Result;

/// Backing store of equally sized, numbered blocks.
/// Only whole blocks are ever transferred. tinyfat owns block 0 (root directory)
/// and block 1 (allocation table) of every device it formats.
pub trait BlockDevice: Send + Sync {
    /// Returns the number of blocks in the block device.
    fn num_blocks(&self) -> usize;

    /// Reads block `block_id` into `buf`.
    /// buf.len() must be equal to block_size().
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()>;

    /// Persists `buf` as block `block_id`.
    /// buf.len() must be equal to block_size().
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()>;

    /// Pushes anything the device buffers down to its backing store.
    fn flush(&self) -> Result<()>;

    fn block_size(&self) -> usize {
        crate::config::BLOCK_SIZE
    }
}
