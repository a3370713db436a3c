use std::sync::Arc;
use std::time::{Duration, Instant};

use spin::Mutex;
use uwufs::{Error, FsConfig, MemoryDisk, UwuFileSystem, BLOCK_SIZE};

fn fresh(blocks: u64) -> Arc<Mutex<UwuFileSystem>> {
    UwuFileSystem::format(Arc::new(MemoryDisk::new(blocks)), FsConfig::default()).unwrap()
}

#[test]
fn unaligned_writes_and_reads() {
    let fs = fresh(512);
    let mut fs = fs.lock();
    let ino = fs.create_file("/f", 0o644, 0, 0).unwrap();

    let chunk = vec![0xAB; BLOCK_SIZE + 10];
    fs.write(ino, BLOCK_SIZE as u64 - 5, &chunk).unwrap();
    let size = 2 * BLOCK_SIZE as u64 + 5;
    assert_eq!(fs.get_attributes(ino).unwrap().size, size);
    assert_eq!(fs.get_attributes(ino).unwrap().blocks, 3);

    // 写入点之前的空洞读出为 0
    let head = fs.read(ino, 0, BLOCK_SIZE).unwrap();
    assert!(head[..BLOCK_SIZE - 5].iter().all(|&b| b == 0));
    assert!(head[BLOCK_SIZE - 5..].iter().all(|&b| b == 0xAB));

    // 越过末尾的部分被截掉
    let tail = fs.read(ino, size - 3, 100).unwrap();
    assert_eq!(tail, vec![0xAB; 3]);
    assert!(fs.read(ino, size, 10).unwrap().is_empty());
    assert!(fs.read(ino, size + 4096, 10).unwrap().is_empty());

    // 覆盖写不改变长度
    fs.write(ino, 1, b"xy").unwrap();
    assert_eq!(fs.get_attributes(ino).unwrap().size, size);
    assert_eq!(fs.read(ino, 0, 4).unwrap(), b"\0xy\0");
}

#[test]
fn directories_are_not_files() {
    let fs = fresh(256);
    let mut fs = fs.lock();
    let d = fs.make_directory("/d", 0o755, 0, 0).unwrap();
    assert!(matches!(fs.read(d, 0, 1), Err(Error::IsADirectory)));
    assert!(matches!(fs.write(d, 0, b"x"), Err(Error::IsADirectory)));
    assert!(matches!(fs.truncate(d), Err(Error::IsADirectory)));
    assert!(matches!(fs.list_directory(fs.lookup("/").unwrap()), Ok(v) if v.len() == 3));

    let f = fs.create_file("/f", 0o644, 0, 0).unwrap();
    assert!(matches!(fs.list_directory(f), Err(Error::NotADirectory)));
}

#[test]
fn set_len_shrinks_and_grows() {
    let fs = fresh(512);
    let mut fs = fs.lock();
    let ino = fs.create_file("/f", 0o644, 0, 0).unwrap();
    let start_free = fs.free_blocks_left().unwrap();

    fs.write(ino, 0, &vec![7; 20 * BLOCK_SIZE]).unwrap();
    fs.set_len(ino, 3 * BLOCK_SIZE as u64 + 1).unwrap();
    assert_eq!(fs.get_attributes(ino).unwrap().blocks, 4);
    assert_eq!(fs.free_blocks_left().unwrap(), start_free - 4);

    // 再增长时，旧数据之后全是 0
    fs.set_len(ino, 5 * BLOCK_SIZE as u64).unwrap();
    let data = fs.read(ino, 0, 5 * BLOCK_SIZE).unwrap();
    assert!(data[..3 * BLOCK_SIZE + 1].iter().all(|&b| b == 7));
    assert!(data[3 * BLOCK_SIZE + 1..].iter().all(|&b| b == 0));

    fs.set_len(ino, 0).unwrap();
    assert_eq!(fs.free_blocks_left().unwrap(), start_free);
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn write_without_space_changes_nothing() {
    let fs = fresh(64);
    let mut fs = fs.lock();
    let ino = fs.create_file("/f", 0o644, 0, 0).unwrap();
    let free = fs.free_blocks_left().unwrap();

    let too_big = vec![1; (free as usize + 1) * BLOCK_SIZE];
    assert!(matches!(fs.write(ino, 0, &too_big), Err(Error::OutOfSpace)));
    assert_eq!(fs.free_blocks_left().unwrap(), free);
    assert_eq!(fs.get_attributes(ino).unwrap().size, 0);
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn far_offset_is_rejected_promptly() {
    let fs = fresh(256);
    let mut fs = fs.lock();
    let ino = fs.create_file("/far", 0o644, 0, 0).unwrap();
    let free = fs.free_blocks_left().unwrap();

    // 512 GiB 处仍可寻址，但远超设备容量
    let started = Instant::now();
    assert!(matches!(fs.write(ino, 1 << 39, b"x"), Err(Error::OutOfSpace)));
    assert!(matches!(fs.set_len(ino, 1 << 39), Err(Error::OutOfSpace)));
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(fs.free_blocks_left().unwrap(), free);
    assert_eq!(fs.get_attributes(ino).unwrap().size, 0);
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn unlink_releases_everything() {
    let fs = fresh(1024);
    let mut fs = fs.lock();
    let free = fs.free_blocks_left().unwrap();
    let inodes = fs.statfs().unwrap().free_inodes;

    let ino = fs.create_file("/f", 0o644, 0, 0).unwrap();
    fs.write(ino, 0, &vec![3; 600 * BLOCK_SIZE]).unwrap();
    fs.unlink("/f").unwrap();

    assert_eq!(fs.free_blocks_left().unwrap(), free);
    assert_eq!(fs.statfs().unwrap().free_inodes, inodes);
    assert!(fs.read_inode(ino).unwrap().is_free());
}

#[test]
fn attribute_updates() {
    let fs = fresh(256);
    let mut fs = fs.lock();
    let ino = fs.create_file("/f", 0o644, 1, 1).unwrap();

    fs.set_times(ino, 11, 22).unwrap();
    fs.set_mode(ino, 0o600).unwrap();
    fs.set_owner(ino, 1000, 100).unwrap();

    let st = fs.get_attributes(ino).unwrap();
    assert_eq!((st.atime, st.mtime), (11, 22));
    assert_eq!(st.mode(), 0o100600);
    assert_eq!((st.uid, st.gid), (1000, 100));

    fs.unlink("/f").unwrap();
    assert!(matches!(fs.set_mode(ino, 0o644), Err(Error::NotFound)));
}
