//! The file allocation table.
//! One entry per device block, kept in memory and written through to `FAT_BLOCK`
//! after every change. Entries chain the blocks of one file or directory together.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, trace};

use crate::config::*;
use crate::error::{FsError, Result};
use crate::BlockDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    EndOfChain,
    Next(u16),
}

impl FatEntry {
    pub fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            FAT_FREE => Some(FatEntry::Free),
            FAT_EOF => Some(FatEntry::EndOfChain),
            n if n > 0 => Some(FatEntry::Next(n as u16)),
            _ => None,
        }
    }

    pub fn to_raw(self) -> i16 {
        match self {
            FatEntry::Free => FAT_FREE,
            FatEntry::EndOfChain => FAT_EOF,
            FatEntry::Next(n) => n as i16,
        }
    }

    pub fn is_free(&self) -> bool {
        *self == FatEntry::Free
    }
}

/// Number of blocks needed to hold `bytes`.
pub fn blocks_for(bytes: usize) -> usize {
    bytes.div_ceil(BLOCK_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationTable {
    entries: Vec<FatEntry>,
}

impl AllocationTable {
    /// Builds an empty table for `device` and writes it out.
    /// Blocks 0 and 1 are permanently taken by the root directory and the table itself.
    pub fn format(device: &impl BlockDevice) -> Result<Self> {
        let len = device.num_blocks().min(FAT_ENTRIES);
        if len <= FIRST_DATA_BLOCK as usize {
            return Err(FsError::NoSpace);
        }
        let mut entries = vec![FatEntry::Free; len];
        entries[ROOT_BLOCK as usize] = FatEntry::EndOfChain;
        entries[FAT_BLOCK as usize] = FatEntry::EndOfChain;
        let table = Self { entries };
        table.flush(device)?;
        debug!("[fat] formatted table with {} entries", len);
        Ok(table)
    }

    /// Reads the table back from `FAT_BLOCK`, rejecting anything that is not a valid table.
    pub fn load(device: &impl BlockDevice) -> Result<Self> {
        let len = device.num_blocks().min(FAT_ENTRIES);
        if len <= FIRST_DATA_BLOCK as usize {
            return Err(FsError::Unformatted);
        }
        let mut buf = Box::new([0u8; BLOCK_SIZE]);
        device.read_block(FAT_BLOCK as usize, buf.as_mut())?;

        let mut entries = Vec::with_capacity(len);
        for i in 0..len {
            let raw = i16::from_le_bytes([buf[i * FAT_ENTRY_SIZE], buf[i * FAT_ENTRY_SIZE + 1]]);
            match FatEntry::from_raw(raw) {
                Some(FatEntry::Next(n)) if n as usize >= len || n < FIRST_DATA_BLOCK => {
                    return Err(FsError::Unformatted);
                }
                Some(entry) => entries.push(entry),
                None => return Err(FsError::Unformatted),
            }
        }
        if entries[ROOT_BLOCK as usize] == FatEntry::Free || entries[FAT_BLOCK as usize] != FatEntry::EndOfChain {
            return Err(FsError::Unformatted);
        }
        Ok(Self { entries })
    }

    /// Writes the table through to its block.
    pub fn flush(&self, device: &impl BlockDevice) -> Result<()> {
        let mut buf = Box::new([0u8; BLOCK_SIZE]);
        for (i, entry) in self.entries.iter().enumerate() {
            let bytes = entry.to_raw().to_le_bytes();
            buf[i * FAT_ENTRY_SIZE] = bytes[0];
            buf[i * FAT_ENTRY_SIZE + 1] = bytes[1];
        }
        device.write_block(FAT_BLOCK as usize, buf.as_ref())
    }

    /// Writes the table out after a change. When the write fails the in-memory
    /// table goes back to `before`, so memory and disk keep agreeing.
    fn commit(&mut self, device: &impl BlockDevice, before: Vec<FatEntry>) -> Result<()> {
        if let Err(e) = self.flush(device) {
            debug!("[fat] write failed, table restored: {}", e);
            self.entries = before;
            return Err(e);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[FatEntry] {
        &self.entries
    }

    pub fn get(&self, block: u16) -> FatEntry {
        self.entries[block as usize]
    }

    pub fn free_blocks(&self) -> usize {
        self.entries.iter().filter(|e| e.is_free()).count()
    }

    pub fn next(&self, block: u16) -> Option<u16> {
        match self.entries[block as usize] {
            FatEntry::Next(n) => Some(n),
            _ => None,
        }
    }

    /// All blocks of the chain starting at `head`, in order.
    /// Panics when the chain loops or runs into a free block.
    pub fn chain(&self, head: u16) -> Vec<u16> {
        let mut blocks = vec![head];
        let mut cur = head;
        loop {
            match self.entries[cur as usize] {
                FatEntry::EndOfChain => return blocks,
                FatEntry::Next(n) => {
                    if blocks.len() >= self.entries.len() {
                        panic!("allocation table chain from block {} does not terminate", head);
                    }
                    blocks.push(n);
                    cur = n;
                }
                FatEntry::Free => panic!("allocation table chain from block {} reaches free block {}", head, cur),
            }
        }
    }

    pub fn tail(&self, head: u16) -> u16 {
        let chain = self.chain(head);
        chain[chain.len() - 1]
    }

    /// Claims `count` free blocks as one chain, or none at all.
    fn claim(&mut self, count: usize) -> Result<u16> {
        assert!(count > 0);
        let mut claimed: Vec<u16> = Vec::with_capacity(count);
        let mut candidate = FIRST_DATA_BLOCK as usize;
        while claimed.len() < count {
            while candidate < self.entries.len() && !self.entries[candidate].is_free() {
                candidate += 1;
            }
            if candidate == self.entries.len() {
                for &block in &claimed {
                    self.entries[block as usize] = FatEntry::Free;
                }
                debug!("[fat] out of space, rolled back {} of {} blocks", claimed.len(), count);
                return Err(FsError::NoSpace);
            }
            let block = candidate as u16;
            self.entries[block as usize] = FatEntry::EndOfChain;
            if let Some(&prev) = claimed.last() {
                self.entries[prev as usize] = FatEntry::Next(block);
            }
            claimed.push(block);
        }
        trace!("[fat] claimed {:?}", claimed);
        Ok(claimed[0])
    }

    /// Reserves a chain able to hold `byte_size` bytes; at least one block.
    /// Returns the chain head.
    pub fn reserve(&mut self, device: &impl BlockDevice, byte_size: usize) -> Result<u16> {
        let needed = blocks_for(byte_size).max(1);
        let before = self.entries.clone();
        let head = self.claim(needed)?;
        self.commit(device, before)?;
        debug!("[fat] reserved {} block(s) at {} for {} bytes", needed, head, byte_size);
        Ok(head)
    }

    /// Grows the chain at `head` by enough blocks for `extra_bytes` more bytes.
    pub fn extend(&mut self, device: &impl BlockDevice, head: u16, extra_bytes: usize) -> Result<()> {
        let needed = blocks_for(extra_bytes);
        if needed == 0 {
            return Ok(());
        }
        let tail = self.tail(head);
        let before = self.entries.clone();
        let first_new = self.claim(needed)?;
        self.entries[tail as usize] = FatEntry::Next(first_new);
        self.commit(device, before)?;
        debug!("[fat] extended chain {} by {} block(s) from {}", head, needed, first_new);
        Ok(())
    }

    /// Returns every block of the chain at `head` to the free pool.
    /// A head that is already free is left alone.
    pub fn free(&mut self, device: &impl BlockDevice, head: u16) -> Result<()> {
        if head < FIRST_DATA_BLOCK {
            panic!("attempt to free reserved block {}", head);
        }
        if self.entries[head as usize].is_free() {
            return Ok(());
        }
        let chain = self.chain(head);
        let before = self.entries.clone();
        for &block in &chain {
            self.entries[block as usize] = FatEntry::Free;
        }
        self.commit(device, before)?;
        debug!("[fat] freed {} block(s) from {}", chain.len(), head);
        Ok(())
    }

    /// Cuts the chain at `head` down to its first `keep` blocks, freeing the rest.
    pub fn truncate(&mut self, device: &impl BlockDevice, head: u16, keep: usize) -> Result<()> {
        assert!(keep > 0);
        let chain = self.chain(head);
        if chain.len() <= keep {
            return Ok(());
        }
        let before = self.entries.clone();
        self.entries[chain[keep - 1] as usize] = FatEntry::EndOfChain;
        for &block in &chain[keep..] {
            self.entries[block as usize] = FatEntry::Free;
        }
        self.commit(device, before)?;
        debug!("[fat] truncated chain {} to {} block(s)", head, keep);
        Ok(())
    }
}
