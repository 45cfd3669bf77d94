//! Path parsing, resolution and the working path.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::trace;

use crate::config::*;
use crate::directory::{dir_find_by_block, dir_lookup, dir_parent_block, root_entry, Located};
use crate::error::{FsError, Result};
use crate::fat::AllocationTable;
use crate::structs::DirEntry;
use crate::BlockDevice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// Leading `/` of an absolute path.
    Root,
    Current,
    Parent,
    Name(String),
}

/// Splits a path into components.
/// Parsing stops at the first newline; whatever follows is payload, not path.
/// One trailing `/` is accepted (`dir/`), any other empty component is malformed.
pub fn parse_path(text: &str) -> Result<Vec<Component>> {
    let text = match text.find('\n') {
        Some(end) => text[..end].trim_end_matches('\r'),
        None => text,
    };
    if text.is_empty() {
        return Err(FsError::Malformed);
    }

    let mut components = Vec::new();
    let mut rest = text;
    if let Some(stripped) = rest.strip_prefix('/') {
        components.push(Component::Root);
        if stripped.is_empty() {
            return Ok(components);
        }
        rest = stripped;
    }
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    for part in rest.split('/') {
        let component = match part {
            "" => return Err(FsError::Malformed),
            "." => Component::Current,
            ".." => Component::Parent,
            name if name.starts_with('\0') || name.len() > MAX_FILE_NAME_LEN => {
                return Err(FsError::Malformed);
            }
            name => Component::Name(name.to_string()),
        };
        components.push(component);
    }
    Ok(components)
}

/// Directories from the root down to the current one.
/// Every node is an owned snapshot of the directory's record; the root is named `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingPath {
    nodes: Vec<DirEntry>,
}

impl WorkingPath {
    pub fn new(root: DirEntry) -> Self {
        Self { nodes: alloc::vec![root] }
    }

    pub fn current(&self) -> &DirEntry {
        &self.nodes[self.nodes.len() - 1]
    }

    /// Directory holding the current one, `None` at the root.
    pub fn parent(&self) -> Option<&DirEntry> {
        if self.nodes.len() > 1 {
            Some(&self.nodes[self.nodes.len() - 2])
        } else {
            None
        }
    }

    pub fn nodes(&self) -> &[DirEntry] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_root(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn push(&mut self, dir: DirEntry) {
        self.nodes.push(dir);
    }

    /// Steps up one level; the root is its own parent.
    pub fn pop(&mut self) {
        if self.nodes.len() > 1 {
            self.nodes.pop();
        }
    }

    pub fn reset_to_root(&mut self) {
        self.nodes.truncate(1);
    }

    pub fn contains_block(&self, block: u16) -> bool {
        self.nodes.iter().any(|n| n.first_block == block)
    }

    /// `/`-joined names from the root; the root alone renders as `/`.
    pub fn render(&self) -> String {
        if self.is_root() {
            return "/".to_string();
        }
        let mut out = String::new();
        for node in &self.nodes[1..] {
            out.push('/');
            out.push_str(&node.name_str());
        }
        out
    }

    /// Rebuilds the path to the directory starting at `dir` from disk,
    /// following `..` links up to the root.
    pub fn rebuild(device: &impl BlockDevice, fat: &AllocationTable, dir: u16) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut cur = dir;
        while cur != ROOT_BLOCK {
            let parent = dir_parent_block(device, cur)?;
            let located = match dir_find_by_block(device, fat, parent, cur) {
                Ok(located) => located,
                Err(FsError::NotFound) => panic!("directory at block {} is missing from its parent {}", cur, parent),
                Err(e) => return Err(e),
            };
            nodes.push(located.entry);
            if nodes.len() > fat.len() {
                panic!("'..' links starting at block {} never reach the root", dir);
            }
            cur = parent;
        }
        nodes.push(root_entry(device)?);
        nodes.reverse();
        Ok(Self { nodes })
    }
}

/// The outcome of resolving a path: a fresh copy of the record and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub entry: DirEntry,
    /// Slot holding the record, `None` for the root.
    pub location: Option<Located>,
    /// Directory holding the record, `None` for the root.
    pub parent: Option<DirEntry>,
}

/// Applies one component to `stack`.
/// Named components must be readable directories below a readable directory.
pub fn step(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    stack: &mut WorkingPath,
    component: &Component,
) -> Result<()> {
    match component {
        Component::Root => stack.reset_to_root(),
        Component::Current => {}
        Component::Parent => stack.pop(),
        Component::Name(name) => {
            let top = stack.current();
            if !top.can_read() {
                return Err(FsError::AccessDenied);
            }
            let located = dir_lookup(device, fat, top.first_block, name.as_bytes())?;
            if !located.entry.is_dir() {
                return Err(FsError::NotADirectory);
            }
            if !located.entry.can_read() {
                return Err(FsError::AccessDenied);
            }
            trace!("[step] entering {} at block {}", name, located.entry.first_block);
            stack.push(located.entry);
        }
    }
    Ok(())
}

/// Applies every component in turn.
pub fn walk(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    stack: &mut WorkingPath,
    components: &[Component],
) -> Result<()> {
    for component in components {
        step(device, fat, stack, component)?;
    }
    Ok(())
}

/// Resolves a path to a fresh copy of its record, starting from `cwd`.
/// Only the directories walked through need to be readable.
pub fn resolve(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    cwd: &WorkingPath,
    path: &str,
) -> Result<Resolved> {
    let components = parse_path(path)?;
    let (last, prefix) = match components.split_last() {
        Some(split) => split,
        None => return Err(FsError::Malformed),
    };
    let mut stack = cwd.clone();
    walk(device, fat, &mut stack, prefix)?;

    match last {
        Component::Name(name) => {
            let parent = stack.current();
            if !parent.can_read() {
                return Err(FsError::AccessDenied);
            }
            let located = dir_lookup(device, fat, parent.first_block, name.as_bytes())?;
            Ok(Resolved {
                entry: located.entry,
                location: Some(located),
                parent: Some(*parent),
            })
        }
        other => {
            step(device, fat, &mut stack, other)?;
            resolve_top(device, fat, &stack)
        }
    }
}

/// Resolution of the directory on top of `stack`.
pub fn resolve_top(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    stack: &WorkingPath,
) -> Result<Resolved> {
    let top = *stack.current();
    match stack.parent() {
        None => Ok(Resolved {
            entry: root_entry(device)?,
            location: None,
            parent: None,
        }),
        Some(parent) => {
            let located = dir_find_by_block(device, fat, parent.first_block, top.first_block)?;
            Ok(Resolved {
                entry: located.entry,
                location: Some(located),
                parent: Some(*parent),
            })
        }
    }
}

/// Resolves everything but the last component, which must be a plain name.
/// Returns the walked stack, whose top is the parent directory, and that name.
pub fn resolve_parent(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    cwd: &WorkingPath,
    path: &str,
) -> Result<(WorkingPath, String)> {
    let components = parse_path(path)?;
    let (last, prefix) = match components.split_last() {
        Some(split) => split,
        None => return Err(FsError::Malformed),
    };
    let Component::Name(name) = last else {
        return Err(FsError::Malformed);
    };
    let mut stack = cwd.clone();
    walk(device, fat, &mut stack, prefix)?;
    Ok((stack, name.clone()))
}

/// Moves `cwd` along `path`. Either every component applies or `cwd` is unchanged.
pub fn change_directory(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    cwd: &mut WorkingPath,
    path: &str,
) -> Result<()> {
    let components = parse_path(path)?;
    let mut candidate = cwd.clone();
    walk(device, fat, &mut candidate, &components)?;
    *cwd = candidate;
    Ok(())
}
