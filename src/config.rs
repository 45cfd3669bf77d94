pub const BLOCK_SIZE: usize = 4096;
pub const ROOT_BLOCK: u16 = 0; // First block of the root directory
pub const FAT_BLOCK: u16 = 1; // Block holding the allocation table
pub const FIRST_DATA_BLOCK: u16 = 2; // First block handed out by the allocation table

pub const FAT_ENTRY_SIZE: usize = 2; // i16 per entry
pub const FAT_ENTRIES: usize = BLOCK_SIZE / FAT_ENTRY_SIZE; // Entries that fit in the FAT block
pub const FAT_FREE: i16 = 0;
pub const FAT_EOF: i16 = -1;

pub const DIR_ENTRY_SIZE: usize = 64; // name + size + first block + kind + rights
pub const NAME_CAPACITY: usize = 56; // Name bytes including the NUL terminator
pub const MAX_FILE_NAME_LEN: usize = NAME_CAPACITY - 1;
pub const NUM_ENTRY_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;
pub const DOT_NAME: &[u8; 1] = b".";
pub const DOTDOT_NAME: &[u8; 2] = b"..";
pub const ROOT_NAME: &[u8; 1] = b"/";

pub const MAX_FILE_SIZE: usize = u32::MAX as usize;
