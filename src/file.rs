//! Moving bytes in and out of block chains.

use alloc::boxed::Box;

use crate::config::*;
use crate::error::Result;
use crate::fat::AllocationTable;
use crate::BlockDevice;

/// Reads `buffer.len()` bytes of the chain at `head`, starting `offset` bytes in.
/// Returns the number of bytes read.
pub fn fread(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    head: u16,
    offset: usize,
    buffer: &mut [u8],
) -> Result<usize> {
    let chain = fat.chain(head);
    let mut bytes_read = 0;
    let mut current_offset = offset;
    let mut block_buf = Box::new([0u8; BLOCK_SIZE]);

    while bytes_read < buffer.len() {
        let relative_block = current_offset / BLOCK_SIZE;
        let Some(&block_id) = chain.get(relative_block) else {
            panic!("read past the end of chain {} at offset {}", head, current_offset);
        };
        let start_offset = current_offset % BLOCK_SIZE;
        let bytes_to_read = (BLOCK_SIZE - start_offset).min(buffer.len() - bytes_read);

        device.read_block(block_id as usize, block_buf.as_mut())?;
        buffer[bytes_read..bytes_read + bytes_to_read]
            .copy_from_slice(&block_buf[start_offset..start_offset + bytes_to_read]);

        bytes_read += bytes_to_read;
        current_offset += bytes_to_read;
    }

    Ok(bytes_read)
}

/// Writes `data` into the chain at `head`, starting `offset` bytes in.
/// The chain must already be long enough. Bytes after the data in its last block
/// are zeroed; bytes before `offset` in the first block are kept.
pub fn fwrite(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    head: u16,
    offset: usize,
    data: &[u8],
) -> Result<usize> {
    let chain = fat.chain(head);
    let mut bytes_written = 0;
    let mut current_offset = offset;
    let mut block_buf = Box::new([0u8; BLOCK_SIZE]);

    while bytes_written < data.len() {
        let relative_block = current_offset / BLOCK_SIZE;
        let Some(&block_id) = chain.get(relative_block) else {
            panic!("write past the end of chain {} at offset {}", head, current_offset);
        };
        let start_offset = current_offset % BLOCK_SIZE;
        let bytes_to_write = (BLOCK_SIZE - start_offset).min(data.len() - bytes_written);

        if start_offset == 0 {
            block_buf.fill(0);
        } else {
            device.read_block(block_id as usize, block_buf.as_mut())?;
            block_buf[start_offset..].fill(0);
        }
        block_buf[start_offset..start_offset + bytes_to_write]
            .copy_from_slice(&data[bytes_written..bytes_written + bytes_to_write]);
        device.write_block(block_id as usize, block_buf.as_ref())?;

        bytes_written += bytes_to_write;
        current_offset += bytes_to_write;
    }

    Ok(bytes_written)
}

/// Copies the first `size` bytes of chain `src` into chain `dst` block by block.
/// `dst` must be at least as long as `src` needs.
pub fn fcopy(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    src: u16,
    dst: u16,
    size: usize,
) -> Result<()> {
    let blocks = size.div_ceil(BLOCK_SIZE);
    let src_chain = fat.chain(src);
    let dst_chain = fat.chain(dst);
    assert!(src_chain.len() >= blocks && dst_chain.len() >= blocks);

    let mut block_buf = Box::new([0u8; BLOCK_SIZE]);
    for i in 0..blocks {
        device.read_block(src_chain[i] as usize, block_buf.as_mut())?;
        if i == blocks - 1 && size % BLOCK_SIZE != 0 {
            block_buf[size % BLOCK_SIZE..].fill(0);
        }
        device.write_block(dst_chain[i] as usize, block_buf.as_ref())?;
    }
    Ok(())
}
