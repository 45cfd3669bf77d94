mod common;

use std::sync::Arc;

use common::{fresh_fs, RamDisk};
use tinyfat::dir_self_entry;
use tinyfat::AccessRights;
use tinyfat::EntryKind;
use tinyfat::Error;
use tinyfat::FileSystem;
use tinyfat::BLOCK_SIZE;
use tinyfat::DIR_ENTRY_SIZE;
use tinyfat::NUM_ENTRY_PER_BLOCK;

fn names(fs: &FileSystem<RamDisk>) -> Vec<String> {
    fs.list().unwrap().iter().map(|e| e.name_str()).collect()
}

#[test]
fn test_format_and_mount() {
    let rd = Arc::new(RamDisk::new(64));
    assert!(matches!(FileSystem::mount(Arc::clone(&rd)), Err(Error::Unformatted)));

    let mut fs = FileSystem::format(Arc::clone(&rd)).unwrap();
    assert_eq!(fs.pwd(), "/");
    assert_eq!(fs.free_blocks(), 62);
    fs.create("keep.txt", b"persisted").unwrap();
    fs.mkdir("d").unwrap();
    drop(fs);

    let fs = FileSystem::mount(rd).unwrap();
    log!("remounted with {} free blocks", fs.free_blocks());
    assert_eq!(fs.read_file("keep.txt").unwrap(), b"persisted");
    assert_eq!(names(&fs), vec!["keep.txt", "d"]);
    assert_eq!(fs.free_blocks(), 60);
}

#[test]
fn test_create_and_cat() {
    let mut fs = fresh_fs(64);
    fs.create("hello.txt", b"hello").unwrap();
    let mut out = Vec::new();
    assert_eq!(fs.cat("hello.txt", &mut out).unwrap(), 5);
    assert_eq!(out, b"hello");

    let entry = fs.stat("hello.txt").unwrap();
    assert_eq!(entry.kind, EntryKind::File);
    assert_eq!(entry.size, 5);
    assert_eq!(entry.rights, AccessRights::RW);

    assert_eq!(fs.create("hello.txt", b"again"), Err(Error::NameCollision));
    assert_eq!(fs.cat("missing.txt", &mut out), Err(Error::NotFound));
    assert_eq!(fs.create("nodir/x", b""), Err(Error::NotFound));
    assert_eq!(fs.create("/", b""), Err(Error::Malformed));
}

#[test]
fn test_create_multi_block() {
    let mut fs = fresh_fs(64);
    let data: Vec<u8> = (0..3 * BLOCK_SIZE + 17).map(|i| (i % 251) as u8).collect();
    let free = fs.free_blocks();
    fs.create("big.bin", &data).unwrap();
    assert_eq!(fs.free_blocks(), free - 4);
    assert_eq!(fs.read_file("big.bin").unwrap(), data);
}

#[test]
fn test_create_out_of_space_leaks_nothing() {
    let mut fs = fresh_fs(6);
    let free = fs.free_blocks();
    let data = vec![7u8; 5 * BLOCK_SIZE];
    assert_eq!(fs.create("huge", &data), Err(Error::NoSpace));
    assert_eq!(fs.free_blocks(), free);
    assert!(names(&fs).is_empty());
}

#[test]
fn test_mkdir_rolls_back_every_new_directory() {
    let mut fs = fresh_fs(5);
    fs.create("pad", b"").unwrap();
    let free = fs.free_blocks();
    assert_eq!(free, 2);

    assert_eq!(fs.mkdir("a/b/c"), Err(Error::NoSpace));
    assert_eq!(fs.free_blocks(), free);
    assert_eq!(fs.stat("a"), Err(Error::NotFound));
    assert_eq!(names(&fs), vec!["pad"]);

    fs.mkdir("a/b").unwrap();
    assert_eq!(fs.free_blocks(), 0);
}

/// A root holding exactly one block of records, with one data block left over.
fn full_root() -> FileSystem<RamDisk> {
    let files = NUM_ENTRY_PER_BLOCK - 2;
    let mut fs = fresh_fs(2 + files + 1);
    for i in 0..files {
        fs.create(&format!("f{}", i), b"").unwrap();
    }
    assert_eq!(fs.free_blocks(), 1);
    fs
}

#[test]
fn test_create_frees_chain_when_directory_cannot_grow() {
    let mut fs = full_root();
    assert_eq!(fs.create("extra", b"data"), Err(Error::NoSpace));
    assert_eq!(fs.free_blocks(), 1);
    assert_eq!(fs.stat("extra"), Err(Error::NotFound));
    assert_eq!(names(&fs).len(), NUM_ENTRY_PER_BLOCK - 2);
}

#[test]
fn test_cp_frees_chain_when_directory_cannot_grow() {
    let mut fs = full_root();
    assert_eq!(fs.cp("f0", "copy"), Err(Error::NoSpace));
    assert_eq!(fs.free_blocks(), 1);
    assert_eq!(fs.stat("copy"), Err(Error::NotFound));
    assert_eq!(fs.fat().chain(0).len(), 1);
}

#[test]
fn test_mkdir_cd_pwd() {
    let mut fs = fresh_fs(64);
    fs.mkdir("/a/b/c").unwrap();
    fs.cd("/a/b/c").unwrap();
    assert_eq!(fs.pwd(), "/a/b/c");
    fs.cd("..").unwrap();
    assert_eq!(fs.pwd(), "/a/b");
    fs.cd("../../..").unwrap();
    assert_eq!(fs.pwd(), "/");

    fs.cd("a").unwrap();
    assert_eq!(fs.cd("b/nope"), Err(Error::NotFound));
    assert_eq!(fs.pwd(), "/a");

    fs.create("f", b"x").unwrap();
    assert_eq!(fs.cd("f"), Err(Error::NotADirectory));
    assert_eq!(fs.mkdir("b"), Err(Error::NameCollision));
    assert_eq!(fs.mkdir("f/g"), Err(Error::NotADirectory));
    fs.mkdir("b/d").unwrap();
    fs.cd("b/d/").unwrap();
    assert_eq!(fs.pwd(), "/a/b/d");
}

#[test]
fn test_ls_lists_visible_entries() {
    let mut fs = fresh_fs(64);
    fs.create("one", b"1").unwrap();
    fs.mkdir("two").unwrap();
    let mut out = Vec::new();
    fs.ls(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    log!("ls output:\n{}", text);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "name\ttype\taccessrights\tsize");
    assert_eq!(lines[1], "one\tfile\trw-\t1");
    assert_eq!(lines[2], format!("two\tdir\trw-\t{}", 2 * DIR_ENTRY_SIZE));
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_rm() {
    let mut fs = fresh_fs(64);
    let free = fs.free_blocks();
    fs.mkdir("d").unwrap();
    fs.create("d/f", b"data").unwrap();
    assert_eq!(fs.rm("d"), Err(Error::NotEmpty));
    fs.rm("d/f").unwrap();
    fs.rm("d").unwrap();
    assert_eq!(fs.free_blocks(), free);
    assert_eq!(fs.rm("d"), Err(Error::NotFound));
    assert_eq!(fs.rm(".."), Err(Error::Malformed));
}

#[test]
fn test_rm_working_directory_is_busy() {
    let mut fs = fresh_fs(64);
    fs.mkdir("a/b").unwrap();
    fs.cd("a/b").unwrap();
    assert_eq!(fs.rm("/a/b"), Err(Error::Busy));
    fs.cd("/").unwrap();
    fs.rm("a/b").unwrap();
}

#[test]
fn test_cp() {
    let mut fs = fresh_fs(64);
    fs.create("src.txt", b"copy me").unwrap();
    fs.mkdir("dir").unwrap();
    fs.cp("src.txt", "dup.txt").unwrap();
    fs.cp("src.txt", "dir").unwrap();
    assert_eq!(fs.read_file("dup.txt").unwrap(), b"copy me");
    assert_eq!(fs.read_file("dir/src.txt").unwrap(), b"copy me");
    assert_ne!(fs.stat("dup.txt").unwrap().first_block, fs.stat("src.txt").unwrap().first_block);

    assert_eq!(fs.cp("src.txt", "dup.txt"), Err(Error::NameCollision));
    assert_eq!(fs.cp("dir", "other"), Err(Error::NotAFile));
}

#[test]
fn test_mv_rename_and_move() {
    let mut fs = fresh_fs(64);
    fs.mkdir("/a").unwrap();
    fs.mkdir("/b").unwrap();
    fs.create("/a/x.txt", b"payload").unwrap();
    let head = fs.stat("/a/x.txt").unwrap().first_block;
    let free = fs.free_blocks();

    fs.mv("/a/x.txt", "/b/").unwrap();
    assert_eq!(fs.stat("/a/x.txt"), Err(Error::NotFound));
    assert_eq!(fs.stat("/b/x.txt").unwrap().first_block, head);
    assert_eq!(fs.free_blocks(), free);

    fs.mv("/b/x.txt", "/b/y.txt").unwrap();
    assert_eq!(fs.read_file("/b/y.txt").unwrap(), b"payload");
    fs.mv("/b/y.txt", "/b/y.txt").unwrap();
    assert_eq!(fs.read_file("/b/y.txt").unwrap(), b"payload");
}

#[test]
fn test_mv_onto_itself() {
    let mut fs = fresh_fs(64);
    fs.create("f", b"x").unwrap();
    fs.mkdir("d").unwrap();
    let free = fs.free_blocks();

    fs.mv("f", "f").unwrap();
    fs.mv("d", "d").unwrap();
    fs.mv("d", "./d/").unwrap();
    assert_eq!(names(&fs), vec!["f", "d"]);
    assert_eq!(fs.read_file("f").unwrap(), b"x");
    assert_eq!(fs.free_blocks(), free);
    assert_eq!(fs.mv("d", "d/inner"), Err(Error::Loop));
}

#[test]
fn test_mv_directory_updates_links() {
    let mut fs = fresh_fs(64);
    fs.mkdir("/a/inner").unwrap();
    fs.mkdir("/b").unwrap();
    fs.cd("/a/inner").unwrap();
    fs.mv("/a", "/b").unwrap();
    assert_eq!(fs.pwd(), "/b/a/inner");
    fs.cd("../..").unwrap();
    assert_eq!(fs.pwd(), "/b");

    assert_eq!(fs.mv("/b", "/b/a/inner"), Err(Error::Loop));
    fs.mv("/b/a", "/").unwrap();
    fs.cd("/a/inner/..").unwrap();
    assert_eq!(fs.pwd(), "/a");
}

#[test]
fn test_append() {
    let mut fs = fresh_fs(64);
    let head: Vec<u8> = vec![b'h'; BLOCK_SIZE - 3];
    fs.create("dst", &head).unwrap();
    fs.create("src", b"tail-bytes").unwrap();
    fs.append("src", "dst").unwrap();

    let mut expected = head.clone();
    expected.extend_from_slice(b"tail-bytes");
    assert_eq!(fs.read_file("dst").unwrap(), expected);
    assert_eq!(fs.stat("dst").unwrap().size as usize, expected.len());

    fs.append("src", "src").unwrap();
    assert_eq!(fs.read_file("src").unwrap(), b"tail-bytestail-bytes");
    assert_eq!(fs.append("src", "missing"), Err(Error::NotFound));
}

#[test]
fn test_append_out_of_space_rolls_back() {
    let mut fs = fresh_fs(6);
    fs.create("a", &vec![1u8; 2 * BLOCK_SIZE]).unwrap();
    fs.create("b", &vec![2u8; BLOCK_SIZE]).unwrap();
    let free = fs.free_blocks();
    assert_eq!(fs.append("a", "b"), Err(Error::NoSpace));
    assert_eq!(fs.free_blocks(), free);
    assert_eq!(fs.read_file("b").unwrap(), vec![2u8; BLOCK_SIZE]);
}

#[test]
fn test_chmod_and_access() {
    let mut fs = fresh_fs(64);
    fs.create("secret", b"shh").unwrap();
    fs.chmod("0", "secret").unwrap();
    assert_eq!(fs.stat("secret").unwrap().rights, AccessRights::empty());
    assert_eq!(fs.read_file("secret"), Err(Error::AccessDenied));
    fs.chmod("r--", "secret").unwrap();
    assert_eq!(fs.read_file("secret").unwrap(), b"shh");
    fs.create("more", b"!").unwrap();
    assert_eq!(fs.append("more", "secret"), Err(Error::AccessDenied));

    fs.mkdir("locked").unwrap();
    fs.chmod("2", "locked").unwrap();
    let locked = fs.stat("locked").unwrap();
    let dot = dir_self_entry(&*fs.device(), locked.first_block).unwrap();
    assert_eq!(dot.rights, AccessRights::WRITE);
    assert_eq!(locked.rights, AccessRights::WRITE);
    assert_eq!(fs.cd("locked"), Err(Error::AccessDenied));
    fs.chmod("6", "locked").unwrap();
    fs.cd("locked").unwrap();
    fs.chmod("4", ".").unwrap();
    assert!(!fs.cwd().current().can_write());
    assert_eq!(fs.create("f", b""), Err(Error::AccessDenied));
    assert_eq!(fs.chmod("9", "."), Err(Error::Malformed));
}

#[test]
fn test_reformat() {
    let mut fs = fresh_fs(32);
    fs.mkdir("x/y").unwrap();
    fs.cd("x/y").unwrap();
    fs.reformat().unwrap();
    assert_eq!(fs.pwd(), "/");
    assert!(names(&fs).is_empty());
    assert_eq!(fs.free_blocks(), 30);
}
