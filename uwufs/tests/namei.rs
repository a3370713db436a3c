use std::sync::Arc;

use spin::Mutex;
use uwufs::{Error, FileKind, FsConfig, MemoryDisk, UwuFileSystem};
use uwufs::{NAME_MAX, ROOT_DIR_INODE};

fn fresh() -> Arc<Mutex<UwuFileSystem>> {
    UwuFileSystem::format(Arc::new(MemoryDisk::new(512)), FsConfig::default()).unwrap()
}

#[test]
fn nested_resolution() {
    let fs = fresh();
    let mut fs = fs.lock();
    let a = fs.make_directory("/a", 0o755, 0, 0).unwrap();
    let b = fs.make_directory("/a/b", 0o755, 0, 0).unwrap();
    let c = fs.create_file("/a/b/c", 0o644, 0, 0).unwrap();

    assert_eq!(fs.namei("/").unwrap(), ROOT_DIR_INODE);
    assert_eq!(fs.namei("/a").unwrap(), a);
    assert_eq!(fs.namei("/a/b/c").unwrap(), c);
    assert_eq!(fs.namei("a//b/./c").unwrap(), c);
    assert_eq!(fs.namei("/a/b/..").unwrap(), a);
    assert_eq!(fs.namei("/a/b/").unwrap(), b);

    assert!(matches!(fs.namei("/a/b/missing"), Err(Error::NotFound)));
    assert!(matches!(fs.namei("/a/b/c/d"), Err(Error::NotADirectory)));
}

#[test]
fn overlong_segment() {
    let fs = fresh();
    let mut fs = fs.lock();
    let long = "n".repeat(NAME_MAX + 1);
    assert!(matches!(
        fs.namei(&format!("/{long}")),
        Err(Error::NameTooLong)
    ));
    assert!(matches!(
        fs.create_file(&format!("/{long}"), 0o644, 0, 0),
        Err(Error::NameTooLong)
    ));
    fs.create_file(&format!("/{}", &long[1..]), 0o644, 0, 0)
        .unwrap();
}

#[test]
fn follow_symlinks() {
    let fs = fresh();
    let mut fs = fs.lock();
    fs.make_directory("/usr", 0o755, 0, 0).unwrap();
    fs.make_directory("/usr/lib", 0o755, 0, 0).unwrap();
    let so = fs.create_file("/usr/lib/libuwu.so", 0o644, 0, 0).unwrap();

    // 绝对目标与相对目标
    fs.symlink("/usr/lib", "/lib", 0, 0).unwrap();
    fs.symlink("libuwu.so", "/usr/lib/current", 0, 0).unwrap();

    assert_eq!(fs.namei("/lib/libuwu.so").unwrap(), so);
    assert_eq!(fs.namei("/lib/current").unwrap(), so);
    assert_eq!(fs.read_link("/lib/current").unwrap(), "libuwu.so");

    let link = fs.resolve("/usr/lib/current", false).unwrap();
    assert_ne!(link, so);
    assert_eq!(fs.get_attributes(link).unwrap().kind, FileKind::Symlink);
    assert!(matches!(
        fs.read_link("/usr/lib/libuwu.so"),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn symlink_cycle_is_bounded() {
    let fs = fresh();
    let mut fs = fs.lock();
    fs.symlink("/pong", "/ping", 0, 0).unwrap();
    fs.symlink("/ping", "/pong", 0, 0).unwrap();

    let err = fs.namei("/ping").unwrap_err();
    assert!(matches!(err, Error::TooManySymlinks));
    assert_eq!(err.errno(), 40);
    // 不跟随最后一个分量时不会进入循环
    assert!(fs.resolve("/ping", false).is_ok());
}

#[test]
fn depth_limit_comes_from_config() {
    let disk = Arc::new(MemoryDisk::new(512));
    let config = FsConfig {
        max_symlink_depth: 1,
        ..Default::default()
    };
    let fs = UwuFileSystem::format(disk, config).unwrap();
    let mut fs = fs.lock();
    let target = fs.create_file("/t", 0o644, 0, 0).unwrap();
    fs.symlink("/t", "/one", 0, 0).unwrap();
    fs.symlink("/one", "/two", 0, 0).unwrap();

    assert_eq!(fs.namei("/one").unwrap(), target);
    assert!(matches!(fs.namei("/two"), Err(Error::TooManySymlinks)));
}

#[test]
fn unlink_removes_link_not_target() {
    let fs = fresh();
    let mut fs = fs.lock();
    let file = fs.create_file("/file", 0o644, 0, 0).unwrap();
    fs.symlink("/file", "/alias", 0, 0).unwrap();
    let free = fs.free_blocks_left().unwrap();

    fs.unlink("/alias").unwrap();
    assert!(matches!(fs.namei("/alias"), Err(Error::NotFound)));
    assert_eq!(fs.namei("/file").unwrap(), file);
    // 链接目标所在的块已归还
    assert_eq!(fs.free_blocks_left().unwrap(), free + 1);
}
