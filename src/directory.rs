use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, trace};

use crate::config::*;
use crate::error::{FsError, Result};
use crate::fat::AllocationTable;
use crate::structs::*;
use crate::BlockDevice;

/// A record together with the slot it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub entry: DirEntry,
    pub block: u16,
    pub slot: usize,
}

fn name_cmp(n1: &[u8], n2: &[u8]) -> bool {
    let len1 = n1.iter().position(|&c| c == 0).unwrap_or(n1.len());
    let len2 = n2.iter().position(|&c| c == 0).unwrap_or(n2.len());
    n1[..len1] == n2[..len2]
}

impl DirEntry {
    pub fn name_eq(&self, name: &[u8]) -> bool {
        name_cmp(&self.name, name)
    }

    pub fn name_eq_str(&self, name: &str) -> bool {
        name_cmp(&self.name, name.as_bytes())
    }
}

fn slot_bytes(buf: &[u8; BLOCK_SIZE], slot: usize) -> &[u8] {
    &buf[slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE]
}

fn slot_bytes_mut(buf: &mut [u8; BLOCK_SIZE], slot: usize) -> &mut [u8] {
    &mut buf[slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE]
}

fn slot_is_free(buf: &[u8; BLOCK_SIZE], slot: usize) -> bool {
    buf[slot * DIR_ENTRY_SIZE] == 0
}

fn read_dir_block(device: &impl BlockDevice, block: u16) -> Result<Box<[u8; BLOCK_SIZE]>> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    device.read_block(block as usize, buf.as_mut())?;
    Ok(buf)
}

fn decode_slot(buf: &[u8; BLOCK_SIZE], slot: usize) -> Option<DirEntry> {
    DirEntry::decode(slot_bytes(buf, slot))
}

/// Overwrites the record in one slot.
pub fn write_entry(device: &impl BlockDevice, block: u16, slot: usize, entry: &DirEntry) -> Result<()> {
    let mut buf = read_dir_block(device, block)?;
    entry.encode(slot_bytes_mut(&mut buf, slot));
    device.write_block(block as usize, buf.as_ref())
}

/// Rewrites a located record in place, e.g. after a rights or size change.
pub fn dir_update_entry(device: &impl BlockDevice, located: &Located, entry: &DirEntry) -> Result<()> {
    trace!(
        "[dir_update_entry] block {} slot {}: {}",
        located.block, located.slot, entry.name_str()
    );
    write_entry(device, located.block, located.slot, entry)
}

/// The `.` record of the directory whose chain starts at `dir`.
pub fn dir_self_entry(device: &impl BlockDevice, dir: u16) -> Result<DirEntry> {
    let buf = read_dir_block(device, dir)?;
    match decode_slot(&buf, 0) {
        Some(entry) if entry.is_dir() && entry.name_eq(DOT_NAME) => Ok(entry),
        _ => panic!("directory at block {} has no '.' record", dir),
    }
}

/// First block of the parent of `dir`, read from its `..` record.
pub fn dir_parent_block(device: &impl BlockDevice, dir: u16) -> Result<u16> {
    let buf = read_dir_block(device, dir)?;
    match decode_slot(&buf, 1) {
        Some(entry) if entry.is_dir() && entry.name_eq(DOTDOT_NAME) => Ok(entry.first_block),
        _ => panic!("directory at block {} has no '..' record", dir),
    }
}

/// Snapshot of the root directory, named `/`.
pub fn root_entry(device: &impl BlockDevice) -> Result<DirEntry> {
    Ok(dir_self_entry(device, ROOT_BLOCK)?.renamed_raw(ROOT_NAME))
}

/// Query an entry by name in the directory whose chain starts at `dir`.
/// Scanning stops at the first free slot, since used slots are packed at the front.
pub fn dir_lookup(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    dir: u16,
    name: &[u8],
) -> Result<Located> {
    if name_cmp(name, ROOT_NAME) {
        return Ok(Located {
            entry: root_entry(device)?,
            block: ROOT_BLOCK,
            slot: 0,
        });
    }
    if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
        return Err(FsError::Malformed);
    }

    for block in fat.chain(dir) {
        let buf = read_dir_block(device, block)?;
        for slot in 0..NUM_ENTRY_PER_BLOCK {
            let Some(entry) = decode_slot(&buf, slot) else {
                return Err(FsError::NotFound);
            };
            if entry.name_eq(name) {
                trace!("[dir_lookup] found {} at block {} slot {}", entry.name_str(), block, slot);
                return Ok(Located { entry, block, slot });
            }
        }
    }

    Err(FsError::NotFound)
}

/// Finds the record a directory holds for its subdirectory starting at `child`.
pub fn dir_find_by_block(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    dir: u16,
    child: u16,
) -> Result<Located> {
    for block in fat.chain(dir) {
        let buf = read_dir_block(device, block)?;
        for slot in 0..NUM_ENTRY_PER_BLOCK {
            let Some(entry) = decode_slot(&buf, slot) else {
                return Err(FsError::NotFound);
            };
            if entry.is_dir() && entry.first_block == child && !entry.is_dot_or_dotdot() {
                return Ok(Located { entry, block, slot });
            }
        }
    }
    Err(FsError::NotFound)
}

/// The last used slot of a directory. It always lives in the chain's tail block,
/// because trailing blocks are released as soon as they empty.
fn dir_last_used(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    dir: u16,
) -> Result<(usize, Located)> {
    let chain = fat.chain(dir);
    let tail = chain[chain.len() - 1];
    let buf = read_dir_block(device, tail)?;
    let used = (0..NUM_ENTRY_PER_BLOCK)
        .take_while(|&slot| !slot_is_free(&buf, slot))
        .count();
    if used == 0 {
        panic!("directory at block {} has an empty trailing block {}", dir, tail);
    }
    let slot = used - 1;
    let Some(entry) = decode_slot(&buf, slot) else {
        unreachable!("slot {} of block {} was just seen in use", slot, tail);
    };
    let index = (chain.len() - 1) * NUM_ENTRY_PER_BLOCK + slot;
    Ok((index, Located { entry, block: tail, slot }))
}

/// Records the byte size of a directory's records in its `.` record and in the
/// record its parent holds for it.
fn dir_set_size(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    dir: u16,
    size: u32,
) -> Result<()> {
    let mut buf = read_dir_block(device, dir)?;
    let Some(mut dot) = decode_slot(&buf, 0) else {
        panic!("directory at block {} has no '.' record", dir);
    };
    dot.size = size;
    dot.encode(slot_bytes_mut(&mut buf, 0));
    device.write_block(dir as usize, buf.as_ref())?;

    if dir != ROOT_BLOCK {
        let parent = dir_parent_block(device, dir)?;
        let mut located = match dir_find_by_block(device, fat, parent, dir) {
            Ok(located) => located,
            Err(FsError::NotFound) => panic!("directory at block {} is missing from its parent {}", dir, parent),
            Err(e) => return Err(e),
        };
        located.entry.size = size;
        dir_update_entry(device, &located, &located.entry)?;
    }
    Ok(())
}

/// Add a new record to the directory whose chain starts at `dir`.
/// Uses the first free slot, growing the directory by one block when it is full.
/// The child's own chain must already be reserved.
pub fn dir_add_entry(
    device: &impl BlockDevice,
    fat: &mut AllocationTable,
    dir: u16,
    child_entry: &DirEntry,
) -> Result<Located> {
    match dir_lookup(device, fat, dir, child_entry.name_bytes()) {
        Ok(_) => return Err(FsError::NameCollision),
        Err(FsError::NotFound) => {}
        Err(e) => return Err(e),
    }

    let chain = fat.chain(dir);
    let mut target = None;
    for (i, &block) in chain.iter().enumerate() {
        let buf = read_dir_block(device, block)?;
        if let Some(slot) = (0..NUM_ENTRY_PER_BLOCK).find(|&slot| slot_is_free(&buf, slot)) {
            target = Some((i * NUM_ENTRY_PER_BLOCK + slot, block, slot, buf));
            break;
        }
    }

    let (index, block, slot, mut buf) = match target {
        Some(found) => found,
        None => {
            // Chain is packed full; table goes out before the new block is used.
            fat.extend(device, dir, BLOCK_SIZE)?;
            let block = fat.tail(dir);
            debug!("[dir_add_entry] directory {} grew into block {}", dir, block);
            (chain.len() * NUM_ENTRY_PER_BLOCK, block, 0, Box::new([0u8; BLOCK_SIZE]))
        }
    };

    child_entry.encode(slot_bytes_mut(&mut buf, slot));
    device.write_block(block as usize, buf.as_ref())?;
    dir_set_size(device, fat, dir, ((index + 1) * DIR_ENTRY_SIZE) as u32)?;

    debug!(
        "[dir_add_entry] {} -> directory {} block {} slot {}",
        child_entry.name_str(), dir, block, slot
    );
    let located = Located { entry: *child_entry, block, slot };
    match dir_lookup(device, fat, dir, child_entry.name_bytes()) {
        Ok(found) if found.block == block && found.slot == slot => Ok(located),
        Ok(_) | Err(FsError::NotFound) => {
            panic!("entry {} vanished right after insertion", child_entry.name_str())
        }
        Err(e) => Err(e),
    }
}

/// Remove a record from the directory whose chain starts at `dir`.
/// The directory's last record is moved into the hole, and a trailing block left
/// empty is handed back to the allocation table.
/// The removed entry's own chain is not freed, caller responsible for that.
pub fn dir_rm_entry(
    device: &impl BlockDevice,
    fat: &mut AllocationTable,
    dir: u16,
    name: &[u8],
) -> Result<DirEntry> {
    if name_cmp(name, DOT_NAME) || name_cmp(name, DOTDOT_NAME) || name_cmp(name, ROOT_NAME) {
        return Err(FsError::Malformed);
    }
    let target = dir_lookup(device, fat, dir, name)?;
    let (last_index, last) = dir_last_used(device, fat, dir)?;

    if (target.block, target.slot) != (last.block, last.slot) {
        write_entry(device, target.block, target.slot, &last.entry)?;
        trace!(
            "[dir_rm_entry] moved {} from block {} slot {} to block {} slot {}",
            last.entry.name_str(), last.block, last.slot, target.block, target.slot
        );
    }
    let mut buf = read_dir_block(device, last.block)?;
    slot_bytes_mut(&mut buf, last.slot).fill(0);
    device.write_block(last.block as usize, buf.as_ref())?;

    if last.slot == 0 && last.block != dir {
        let keep = last_index / NUM_ENTRY_PER_BLOCK;
        fat.truncate(device, dir, keep)?;
        debug!("[dir_rm_entry] released block {} of directory {}", last.block, dir);
    }
    dir_set_size(device, fat, dir, (last_index * DIR_ENTRY_SIZE) as u32)?;

    debug!("[dir_rm_entry] {} removed from directory {}", target.entry.name_str(), dir);
    Ok(target.entry)
}

/// All records of a directory in slot order, `.` and `..` included.
pub fn read_dir(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    dir: u16,
) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    'chain: for block in fat.chain(dir) {
        let buf = read_dir_block(device, block)?;
        for slot in 0..NUM_ENTRY_PER_BLOCK {
            match decode_slot(&buf, slot) {
                Some(entry) => entries.push(entry),
                None => break 'chain,
            }
        }
    }
    Ok(entries)
}

/// True when a directory holds nothing but `.` and `..`.
pub fn dir_is_empty(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    dir: u16,
) -> Result<bool> {
    let entries = read_dir(device, fat, dir)?;
    if entries.len() < 2 && dir != ROOT_BLOCK {
        panic!("directory at block {} lacks '.' and '..'", dir);
    }
    Ok(entries.iter().all(|e| e.is_dot_or_dotdot()))
}

/// Writes the first block of a directory: `.` pointing at itself, `..` at `parent`.
pub fn dir_init(
    device: &impl BlockDevice,
    dir: u16,
    parent: u16,
    rights: AccessRights,
) -> Result<()> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    let dot = DirEntry::with_raw_name(DOT_NAME, EntryKind::Directory, dir, 2 * DIR_ENTRY_SIZE as u32, rights);
    // '..' only carries the parent link.
    let dotdot = DirEntry::with_raw_name(DOTDOT_NAME, EntryKind::Directory, parent, 0, AccessRights::empty());
    dot.encode(slot_bytes_mut(&mut buf, 0));
    dotdot.encode(slot_bytes_mut(&mut buf, 1));
    device.write_block(dir as usize, buf.as_ref())
}

/// Create a new directory named `dir_name` inside `parent`.
/// Returns the parent's record for the new directory.
pub fn mkdir(
    device: &impl BlockDevice,
    fat: &mut AllocationTable,
    parent: u16,
    dir_name: &[u8],
    rights: AccessRights,
) -> Result<Located> {
    validate_name(dir_name)?;
    if name_cmp(dir_name, DOT_NAME) || name_cmp(dir_name, DOTDOT_NAME) {
        return Err(FsError::Malformed);
    }
    match dir_lookup(device, fat, parent, dir_name) {
        Ok(_) => return Err(FsError::NameCollision),
        Err(FsError::NotFound) => {}
        Err(e) => return Err(e),
    }

    let head = fat.reserve(device, 2 * DIR_ENTRY_SIZE)?;
    let record = DirEntry::new(dir_name, EntryKind::Directory, head, 2 * DIR_ENTRY_SIZE as u32, rights)?;
    let result = dir_init(device, head, parent, rights)
        .and_then(|_| dir_add_entry(device, fat, parent, &record));
    match result {
        Ok(located) => Ok(located),
        Err(e) => {
            fat.free(device, head)?;
            Err(e)
        }
    }
}
