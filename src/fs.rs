use std::io::Write;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::config::*;
use crate::directory::{self, dir_add_entry, dir_init, dir_is_empty, dir_lookup, dir_rm_entry, dir_self_entry, dir_update_entry, read_dir, root_entry, write_entry};
use crate::error::{FsError, Result};
use crate::fat::{blocks_for, AllocationTable};
use crate::file::{fcopy, fread, fwrite};
use crate::path::{change_directory, parse_path, resolve, resolve_parent, step, walk, Component, Resolved, WorkingPath};
use crate::structs::*;
use crate::BlockDevice;

/// The file system engine: allocation table and working path over one device.
/// Single-threaded; every mutation is written through before a call returns.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    device: Arc<D>,
    fat: AllocationTable,
    cwd: WorkingPath,
}

/// Creates `name` as an empty directory under the top of `stack` and enters it.
/// The new directory's parent block and name are appended to `created`.
fn mkdir_in<D: BlockDevice>(
    device: &D,
    fat: &mut AllocationTable,
    stack: &mut WorkingPath,
    name: &str,
    created: &mut Vec<(u16, String)>,
) -> Result<()> {
    let parent = *stack.current();
    if !parent.can_write() {
        return Err(FsError::AccessDenied);
    }
    let located = directory::mkdir(device, fat, parent.first_block, name.as_bytes(), AccessRights::RW)?;
    debug!("[mkdir] created {} at block {}", name, located.entry.first_block);
    created.push((parent.first_block, name.into()));
    stack.push(located.entry);
    Ok(())
}

/// Removes the directories one `mkdir` call created, innermost first, and frees their blocks.
fn mkdir_undo<D: BlockDevice>(device: &D, fat: &mut AllocationTable, created: &[(u16, String)]) {
    for (parent, name) in created.iter().rev() {
        let undone = match dir_rm_entry(device, fat, *parent, name.as_bytes()) {
            Ok(removed) => fat.free(device, removed.first_block),
            Err(e) => Err(e),
        };
        match undone {
            Ok(()) => debug!("[mkdir] rolled back {}", name),
            Err(e) => warn!("[mkdir] could not roll back {}: {}", name, e),
        }
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// Writes an empty file system to `device`: a fresh allocation table and a root
    /// directory holding only `.` and `..`, both pointing at itself.
    pub fn format(device: Arc<D>) -> Result<Self> {
        let (fat, cwd) = Self::write_empty(&*device)?;
        Ok(Self { device, fat, cwd })
    }

    fn write_empty(device: &D) -> Result<(AllocationTable, WorkingPath)> {
        let fat = AllocationTable::format(device)?;
        dir_init(device, ROOT_BLOCK, ROOT_BLOCK, AccessRights::RW)?;
        let cwd = WorkingPath::new(root_entry(device)?);
        device.flush()?;
        info!("formatted device: {} blocks of {} bytes, {} allocatable", fat.len(), BLOCK_SIZE, fat.free_blocks());
        Ok((fat, cwd))
    }

    /// Opens an already formatted device.
    pub fn mount(device: Arc<D>) -> Result<Self> {
        if device.block_size() != BLOCK_SIZE {
            return Err(FsError::Unformatted);
        }
        let fat = AllocationTable::load(&*device)?;
        let cwd = WorkingPath::new(root_entry(&*device)?);
        info!("mounted device: {} free blocks", fat.free_blocks());
        Ok(Self { device, fat, cwd })
    }

    /// Wipes the file system and starts over at the root.
    pub fn reformat(&mut self) -> Result<()> {
        let (fat, cwd) = Self::write_empty(&*self.device)?;
        self.fat = fat;
        self.cwd = cwd;
        Ok(())
    }

    /// Creates a file holding `data` at `path`.
    pub fn create(&mut self, path: &str, data: &[u8]) -> Result<()> {
        debug!("[create] {} ({} bytes)", path, data.len());
        let device = &*self.device;
        if data.len() > MAX_FILE_SIZE {
            return Err(FsError::NoSpace);
        }
        let (stack, name) = resolve_parent(device, &self.fat, &self.cwd, path)?;
        let parent = *stack.current();
        if !parent.can_write() {
            return Err(FsError::AccessDenied);
        }
        let mut record = DirEntry::new(name.as_bytes(), EntryKind::File, 0, data.len() as u32, AccessRights::RW)?;
        match dir_lookup(device, &self.fat, parent.first_block, name.as_bytes()) {
            Ok(_) => return Err(FsError::NameCollision),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        record.first_block = self.fat.reserve(device, data.len())?;
        let result = fwrite(device, &self.fat, record.first_block, 0, data)
            .and_then(|_| dir_add_entry(device, &mut self.fat, parent.first_block, &record));
        if let Err(e) = result {
            self.fat.free(device, record.first_block)?;
            return Err(e);
        }
        Ok(())
    }

    fn resolve_file(&self, path: &str) -> Result<Resolved> {
        let resolved = resolve(&*self.device, &self.fat, &self.cwd, path)?;
        if !resolved.entry.is_file() {
            return Err(FsError::NotAFile);
        }
        Ok(resolved)
    }

    /// Writes the contents of the file at `path` to `out`.
    /// Returns the number of bytes written, which is the file's size.
    pub fn cat(&self, path: &str, out: &mut impl Write) -> Result<usize> {
        debug!("[cat] {}", path);
        let file = self.resolve_file(path)?.entry;
        if !file.can_read() {
            return Err(FsError::AccessDenied);
        }
        let size = file.size as usize;
        let mut chunk = vec![0u8; BLOCK_SIZE];
        let mut offset = 0;
        while offset < size {
            let len = (size - offset).min(BLOCK_SIZE);
            fread(&*self.device, &self.fat, file.first_block, offset, &mut chunk[..len])?;
            out.write_all(&chunk[..len])?;
            offset += len;
        }
        Ok(size)
    }

    /// The bytes `cat` would print.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.cat(path, &mut data)?;
        Ok(data)
    }

    /// Visible entries of the working directory, in slot order.
    pub fn list(&self) -> Result<Vec<DirEntry>> {
        let dir = self.cwd.current();
        if !dir.can_read() {
            return Err(FsError::AccessDenied);
        }
        let entries = read_dir(&*self.device, &self.fat, dir.first_block)?;
        Ok(entries.into_iter().filter(|e| !e.is_hidden()).collect())
    }

    /// Prints the working directory as a table of name, type, rights and size.
    pub fn ls(&self, out: &mut impl Write) -> Result<()> {
        let entries = self.list()?;
        writeln!(out, "name\ttype\taccessrights\tsize")?;
        for entry in entries {
            writeln!(out, "{}\t{}\t{}\t{}", entry.name_str(), entry.kind, entry.rights, entry.size)?;
        }
        Ok(())
    }

    /// Works out where an entry named `src_name` lands when copied or moved to `path`.
    /// An existing directory at `path` receives it under its own name; otherwise the
    /// last component is the new name. Returns the target directory's stack and the name.
    fn destination(&self, path: &str, src_name: &[u8]) -> Result<(WorkingPath, String)> {
        let device = &*self.device;
        let src_name = String::from_utf8_lossy(src_name).into_owned();
        let components = parse_path(path)?;
        let Some((last, prefix)) = components.split_last() else {
            return Err(FsError::Malformed);
        };
        let mut stack = self.cwd.clone();
        walk(device, &self.fat, &mut stack, prefix)?;

        match last {
            Component::Name(name) => {
                let top = *stack.current();
                if !top.can_read() {
                    return Err(FsError::AccessDenied);
                }
                match dir_lookup(device, &self.fat, top.first_block, name.as_bytes()) {
                    Ok(located) if located.entry.is_dir() => {
                        step(device, &self.fat, &mut stack, last)?;
                        Ok((stack, src_name))
                    }
                    Ok(_) => Err(FsError::NameCollision),
                    Err(FsError::NotFound) => Ok((stack, name.clone())),
                    Err(e) => Err(e),
                }
            }
            other => {
                step(device, &self.fat, &mut stack, other)?;
                Ok((stack, src_name))
            }
        }
    }

    /// Copies the file `src` to `dst`, or into `dst` when that is a directory.
    pub fn cp(&mut self, src: &str, dst: &str) -> Result<()> {
        debug!("[cp] {} -> {}", src, dst);
        let source = self.resolve_file(src)?.entry;
        if !source.can_read() {
            return Err(FsError::AccessDenied);
        }
        let (stack, name) = self.destination(dst, source.name_bytes())?;
        let target = *stack.current();
        if !target.can_write() {
            return Err(FsError::AccessDenied);
        }

        let device = &*self.device;
        let mut record = source.renamed(name.as_bytes())?;
        match dir_lookup(device, &self.fat, target.first_block, name.as_bytes()) {
            Ok(_) => return Err(FsError::NameCollision),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        record.first_block = self.fat.reserve(device, source.size as usize)?;
        let result = fcopy(device, &self.fat, source.first_block, record.first_block, source.size as usize)
            .and_then(|_| dir_add_entry(device, &mut self.fat, target.first_block, &record));
        if let Err(e) = result {
            self.fat.free(device, record.first_block)?;
            return Err(e);
        }
        Ok(())
    }

    /// Renames `src`, or moves it into `dst` when that is a directory.
    /// The entry keeps its data chain.
    pub fn mv(&mut self, src: &str, dst: &str) -> Result<()> {
        debug!("[mv] {} -> {}", src, dst);
        let (src_stack, src_name) = resolve_parent(&*self.device, &self.fat, &self.cwd, src)?;
        let src_parent = *src_stack.current();
        if !src_parent.can_read() || !src_parent.can_write() {
            return Err(FsError::AccessDenied);
        }
        let source = dir_lookup(&*self.device, &self.fat, src_parent.first_block, src_name.as_bytes())?;
        let entry = source.entry;

        // Moving an entry onto itself changes nothing.
        if let Ok(target) = resolve(&*self.device, &self.fat, &self.cwd, dst) {
            let same_slot = target
                .location
                .is_some_and(|l| (l.block, l.slot) == (source.block, source.slot));
            if same_slot || (entry.is_dir() && target.entry.is_dir() && target.entry.first_block == entry.first_block) {
                return Ok(());
            }
        }

        let (dst_stack, new_name) = self.destination(dst, entry.name_bytes())?;
        let new_parent = *dst_stack.current();
        if !new_parent.can_write() {
            return Err(FsError::AccessDenied);
        }
        if entry.is_dir() && dst_stack.contains_block(entry.first_block) {
            return Err(FsError::Loop);
        }
        if new_parent.first_block == src_parent.first_block && entry.name_eq_str(&new_name) {
            return Ok(());
        }

        let device = &*self.device;
        let moved = entry.renamed(new_name.as_bytes())?;
        dir_add_entry(device, &mut self.fat, new_parent.first_block, &moved)?;
        if let Err(e) = dir_rm_entry(device, &mut self.fat, src_parent.first_block, entry.name_bytes()) {
            if let Err(undo) = dir_rm_entry(device, &mut self.fat, new_parent.first_block, moved.name_bytes()) {
                warn!("[mv] could not drop {} again after a failed move: {}", moved.name_str(), undo);
            }
            return Err(e);
        }

        if entry.is_dir() && new_parent.first_block != src_parent.first_block {
            let dotdot = DirEntry::with_raw_name(DOTDOT_NAME, EntryKind::Directory, new_parent.first_block, 0, AccessRights::empty());
            write_entry(device, entry.first_block, 1, &dotdot)?;
        }
        if entry.is_dir() {
            self.refresh_cwd()?;
        }
        Ok(())
    }

    /// Deletes a file, or a directory holding nothing but `.` and `..`.
    pub fn rm(&mut self, path: &str) -> Result<()> {
        debug!("[rm] {}", path);
        let device = &*self.device;
        let (stack, name) = resolve_parent(device, &self.fat, &self.cwd, path)?;
        let parent = *stack.current();
        if !parent.can_read() || !parent.can_write() {
            return Err(FsError::AccessDenied);
        }
        let entry = dir_lookup(device, &self.fat, parent.first_block, name.as_bytes())?.entry;
        if entry.is_dir() {
            if self.cwd.contains_block(entry.first_block) {
                return Err(FsError::Busy);
            }
            if !dir_is_empty(device, &self.fat, entry.first_block)? {
                return Err(FsError::NotEmpty);
            }
        }

        // Record goes first so nothing ever points at a freed chain.
        dir_rm_entry(device, &mut self.fat, parent.first_block, entry.name_bytes())?;
        self.fat.free(device, entry.first_block)?;
        Ok(())
    }

    /// Appends the contents of file `src` to the end of file `dst`.
    pub fn append(&mut self, src: &str, dst: &str) -> Result<()> {
        debug!("[append] {} >> {}", src, dst);
        let source = self.resolve_file(src)?.entry;
        if !source.can_read() {
            return Err(FsError::AccessDenied);
        }
        let target = self.resolve_file(dst)?;
        let Some(location) = target.location else {
            unreachable!("a file always has a parent directory");
        };
        let mut record = target.entry;
        if !record.can_write() {
            return Err(FsError::AccessDenied);
        }
        let old_size = record.size as usize;
        let total = old_size + source.size as usize;
        if total > MAX_FILE_SIZE {
            return Err(FsError::NoSpace);
        }
        if source.size == 0 {
            return Ok(());
        }

        // Read first: source and target may be the same file.
        let mut data = vec![0u8; source.size as usize];
        let device = &*self.device;
        fread(device, &self.fat, source.first_block, 0, &mut data)?;

        let old_blocks = blocks_for(old_size).max(1);
        let slack = old_blocks * BLOCK_SIZE - old_size;
        if data.len() > slack {
            self.fat.extend(device, record.first_block, data.len() - slack)?;
        }
        if let Err(e) = fwrite(device, &self.fat, record.first_block, old_size, &data) {
            self.fat.truncate(device, record.first_block, old_blocks)?;
            return Err(e);
        }

        record.size = total as u32;
        dir_update_entry(device, &location, &record)
    }

    /// Creates the directory at `path` along with any missing parents.
    /// On failure every directory this call created is removed again.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        debug!("[mkdir] {}", path);
        let components = parse_path(path)?;
        let mut created = Vec::new();
        if let Err(e) = self.mkdir_walk(&components, &mut created) {
            mkdir_undo(&*self.device, &mut self.fat, &created);
            return Err(e);
        }
        if created.is_empty() {
            return Err(FsError::NameCollision);
        }
        Ok(())
    }

    fn mkdir_walk(&mut self, components: &[Component], created: &mut Vec<(u16, String)>) -> Result<()> {
        let device = &*self.device;
        let mut stack = self.cwd.clone();

        for component in components {
            match component {
                Component::Name(name) if created.is_empty() => {
                    let top = *stack.current();
                    if !top.can_read() {
                        return Err(FsError::AccessDenied);
                    }
                    match dir_lookup(device, &self.fat, top.first_block, name.as_bytes()) {
                        Ok(located) if !located.entry.is_dir() => return Err(FsError::NotADirectory),
                        Ok(located) if !located.entry.can_read() => return Err(FsError::AccessDenied),
                        Ok(located) => stack.push(located.entry),
                        Err(FsError::NotFound) => mkdir_in(device, &mut self.fat, &mut stack, name, created)?,
                        Err(e) => return Err(e),
                    }
                }
                Component::Name(name) => mkdir_in(device, &mut self.fat, &mut stack, name, created)?,
                other => step(device, &self.fat, &mut stack, other)?,
            }
        }
        Ok(())
    }

    pub fn cd(&mut self, path: &str) -> Result<()> {
        debug!("[cd] {}", path);
        change_directory(&*self.device, &self.fat, &mut self.cwd, path)
    }

    pub fn pwd(&self) -> String {
        self.cwd.render()
    }

    /// Sets the access rights of `path` from an octal digit or an `rwx` triple.
    pub fn chmod(&mut self, rights: &str, path: &str) -> Result<()> {
        debug!("[chmod] {} {}", rights, path);
        let rights = AccessRights::parse(rights)?;
        let device = &*self.device;
        let resolved = resolve(device, &self.fat, &self.cwd, path)?;
        let mut entry = resolved.entry;
        entry.rights = rights;

        if let Some(location) = resolved.location {
            dir_update_entry(device, &location, &entry)?;
        }
        if entry.is_dir() {
            let mut dot = dir_self_entry(device, entry.first_block)?;
            dot.rights = rights;
            write_entry(device, entry.first_block, 0, &dot)?;
            if self.cwd.contains_block(entry.first_block) {
                self.refresh_cwd()?;
            }
        }
        Ok(())
    }

    /// Fresh copy of the record at `path`.
    pub fn stat(&self, path: &str) -> Result<DirEntry> {
        Ok(resolve(&*self.device, &self.fat, &self.cwd, path)?.entry)
    }

    /// Re-reads the working path from disk.
    fn refresh_cwd(&mut self) -> Result<()> {
        self.cwd = WorkingPath::rebuild(&*self.device, &self.fat, self.cwd.current().first_block)?;
        Ok(())
    }

    /// Writes the allocation table and flushes the device.
    pub fn flush(&self) -> Result<()> {
        self.fat.flush(&*self.device)?;
        self.device.flush()
    }

    pub fn free_blocks(&self) -> usize {
        self.fat.free_blocks()
    }

    pub fn fat(&self) -> &AllocationTable {
        &self.fat
    }

    pub fn cwd(&self) -> &WorkingPath {
        &self.cwd
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }
}

impl<D: BlockDevice> Drop for FileSystem<D> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("final flush failed: {}", e);
        }
    }
}
