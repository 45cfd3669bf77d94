//! On-disk directory records.
//!
//! A record is 64 bytes, encoded field by field at fixed offsets (little endian):
//!
//! | bytes    | field                         |
//! |----------|-------------------------------|
//! | 0..56    | name, NUL terminated          |
//! | 56..60   | size (u32)                    |
//! | 60..62   | first block (i16)             |
//! | 62       | kind (0 = file, 1 = directory)|
//! | 63       | access rights                 |
//!
//! A slot whose first name byte is NUL is free.

use core::fmt;

use alloc::string::String;
use bitflags::bitflags;

use crate::config::*;
use crate::error::{FsError, Result};

const NAME_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 56;
const FIRST_BLOCK_OFFSET: usize = 60;
const KIND_OFFSET: usize = 62;
const RIGHTS_OFFSET: usize = 63;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessRights: u8 {
        const EXECUTE = 0x01;
        const WRITE = 0x02;
        const READ = 0x04;
        const RW = Self::READ.bits() | Self::WRITE.bits();
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

impl AccessRights {
    /// Parses either an octal digit (`"6"`) or a symbolic triple (`"rw-"`).
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let bytes = text.as_bytes();
        match bytes {
            [d @ b'0'..=b'7'] => Ok(Self::from_bits_truncate(d - b'0')),
            [r, w, x] => {
                let mut rights = Self::empty();
                for (c, on, flag) in [(*r, b'r', Self::READ), (*w, b'w', Self::WRITE), (*x, b'x', Self::EXECUTE)] {
                    if c == on {
                        rights |= flag;
                    } else if c != b'-' {
                        return Err(FsError::Malformed);
                    }
                }
                Ok(rights)
            }
            _ => Err(FsError::Malformed),
        }
    }
}

impl fmt::Display for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Self::READ) { 'r' } else { '-' };
        let w = if self.contains(Self::WRITE) { 'w' } else { '-' };
        let x = if self.contains(Self::EXECUTE) { 'x' } else { '-' };
        write!(f, "{}{}{}", r, w, x)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File = 0,
    Directory = 1,
}

impl EntryKind {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "dir"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; NAME_CAPACITY],
    pub size: u32,
    pub first_block: u16,
    pub kind: EntryKind,
    pub rights: AccessRights,
}

/// Checks a single path component for use as a record name.
pub fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
        return Err(FsError::Malformed);
    }
    if name[0] == 0 || name.contains(&b'/') || name.contains(&0) {
        return Err(FsError::Malformed);
    }
    Ok(())
}

impl DirEntry {
    pub fn new(
        name: &[u8],
        kind: EntryKind,
        first_block: u16,
        size: u32,
        rights: AccessRights,
    ) -> Result<Self> {
        validate_name(name)?;
        Ok(Self::with_raw_name(name, kind, first_block, size, rights))
    }

    /// Builds a record without validating the name, for `.`, `..` and the root snapshot.
    pub(crate) fn with_raw_name(
        name: &[u8],
        kind: EntryKind,
        first_block: u16,
        size: u32,
        rights: AccessRights,
    ) -> Self {
        let mut buf = [0u8; NAME_CAPACITY];
        let len = name.len().min(MAX_FILE_NAME_LEN);
        buf[..len].copy_from_slice(&name[..len]);
        Self {
            name: buf,
            size,
            first_block,
            kind,
            rights,
        }
    }

    pub fn renamed(&self, name: &[u8]) -> Result<Self> {
        validate_name(name)?;
        Ok(self.renamed_raw(name))
    }

    pub(crate) fn renamed_raw(&self, name: &[u8]) -> Self {
        Self::with_raw_name(name, self.kind, self.first_block, self.size, self.rights)
    }

    /// Name bytes up to the NUL terminator.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&c| c == 0).unwrap_or(NAME_CAPACITY);
        &self.name[..end]
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_hidden(&self) -> bool {
        self.name[0] == b'.'
    }

    pub fn is_dot_or_dotdot(&self) -> bool {
        let name = self.name_bytes();
        name == DOT_NAME || name == DOTDOT_NAME
    }

    pub fn can_read(&self) -> bool {
        self.rights.contains(AccessRights::READ)
    }

    pub fn can_write(&self) -> bool {
        self.rights.contains(AccessRights::WRITE)
    }

    pub fn encode(&self, out: &mut [u8]) {
        assert_eq!(out.len(), DIR_ENTRY_SIZE);
        out[NAME_OFFSET..NAME_OFFSET + NAME_CAPACITY].copy_from_slice(&self.name);
        // The terminator is part of the format even for a 55-byte name.
        out[NAME_OFFSET + MAX_FILE_NAME_LEN] = 0;
        out[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&self.size.to_le_bytes());
        out[FIRST_BLOCK_OFFSET..FIRST_BLOCK_OFFSET + 2]
            .copy_from_slice(&(self.first_block as i16).to_le_bytes());
        out[KIND_OFFSET] = self.kind as u8;
        out[RIGHTS_OFFSET] = self.rights.bits();
    }

    /// Decodes one slot. Returns `None` for a free slot.
    /// Panics on an unknown kind byte, which only a corrupted directory block can hold.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        assert_eq!(raw.len(), DIR_ENTRY_SIZE);
        if raw[NAME_OFFSET] == 0 {
            return None;
        }
        let mut name = [0u8; NAME_CAPACITY];
        name.copy_from_slice(&raw[NAME_OFFSET..NAME_OFFSET + NAME_CAPACITY]);
        name[MAX_FILE_NAME_LEN] = 0;
        let size = u32::from_le_bytes([
            raw[SIZE_OFFSET],
            raw[SIZE_OFFSET + 1],
            raw[SIZE_OFFSET + 2],
            raw[SIZE_OFFSET + 3],
        ]);
        let first_block = i16::from_le_bytes([raw[FIRST_BLOCK_OFFSET], raw[FIRST_BLOCK_OFFSET + 1]]);
        let kind = match EntryKind::from_u8(raw[KIND_OFFSET]) {
            Some(kind) => kind,
            None => panic!(
                "corrupted directory record {:?}: unknown kind {}",
                String::from_utf8_lossy(&name),
                raw[KIND_OFFSET]
            ),
        };
        if first_block < 0 {
            panic!(
                "corrupted directory record {:?}: negative first block {}",
                String::from_utf8_lossy(&name),
                first_block
            );
        }
        Some(Self {
            name,
            size,
            first_block: first_block as u16,
            kind,
            rights: AccessRights::from_bits_truncate(raw[RIGHTS_OFFSET]),
        })
    }
}
