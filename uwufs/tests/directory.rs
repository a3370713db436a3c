use std::sync::Arc;

use proptest::prelude::*;
use spin::Mutex;
use uwufs::{DiskInode, Error, FileKind, FsConfig, MemoryDisk, UwuFileSystem};
use uwufs::{DIR_ENTRIES_PER_BLOCK, ROOT_DIR_INODE};

fn fresh() -> Arc<Mutex<UwuFileSystem>> {
    UwuFileSystem::format(Arc::new(MemoryDisk::new(1024)), FsConfig::default()).unwrap()
}

#[test]
fn mkdir_link_counts() {
    let fs = fresh();
    let mut fs = fs.lock();
    let a = fs.make_directory("/a", 0o750, 7, 8).unwrap();

    let st = fs.get_attributes(a).unwrap();
    assert_eq!(st.kind, FileKind::Directory);
    assert_eq!(st.links, 2);
    assert_eq!(st.mode(), 0o040750);
    assert_eq!((st.uid, st.gid), (7, 8));
    assert_eq!(fs.get_attributes(ROOT_DIR_INODE).unwrap().links, 3);

    let mut entries = fs.list_directory(a).unwrap();
    entries.sort();
    assert_eq!(
        entries,
        vec![(".".to_owned(), a), ("..".to_owned(), ROOT_DIR_INODE)]
    );

    fs.make_directory("/a/b", 0o755, 0, 0).unwrap();
    assert_eq!(fs.get_attributes(a).unwrap().links, 3);
    assert!(matches!(
        fs.make_directory("/a/b", 0o755, 0, 0),
        Err(Error::AlreadyExists)
    ));
    assert!(matches!(
        fs.make_directory("/nope/b", 0o755, 0, 0),
        Err(Error::NotFound)
    ));
}

#[test]
fn rmdir_rules() {
    let fs = fresh();
    let mut fs = fs.lock();
    let free = fs.free_blocks_left().unwrap();
    let inodes = fs.statfs().unwrap().free_inodes;

    fs.make_directory("/a", 0o755, 0, 0).unwrap();
    fs.create_file("/a/f", 0o644, 0, 0).unwrap();
    fs.create_file("/plain", 0o644, 0, 0).unwrap();

    assert!(matches!(fs.remove_directory("/a"), Err(Error::NotEmpty)));
    assert!(matches!(fs.remove_directory("/plain"), Err(Error::NotADirectory)));
    assert!(matches!(fs.remove_directory("/a/.."), Err(Error::InvalidArgument(_))));
    assert!(matches!(fs.remove_directory("/"), Err(Error::InvalidArgument(_))));
    assert!(matches!(fs.unlink("/a"), Err(Error::IsADirectory)));

    fs.unlink("/a/f").unwrap();
    fs.remove_directory("/a").unwrap();
    fs.unlink("/plain").unwrap();

    assert_eq!(fs.get_attributes(ROOT_DIR_INODE).unwrap().links, 2);
    assert_eq!(fs.free_blocks_left().unwrap(), free);
    assert_eq!(fs.statfs().unwrap().free_inodes, inodes);
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn hard_links() {
    let fs = fresh();
    let mut fs = fs.lock();
    let ino = fs.create_file("/orig", 0o644, 0, 0).unwrap();
    fs.write(ino, 0, b"shared").unwrap();
    fs.make_directory("/d", 0o755, 0, 0).unwrap();

    fs.link("/orig", "/d/copy").unwrap();
    assert_eq!(fs.lookup("/d/copy").unwrap(), ino);
    assert_eq!(fs.get_attributes(ino).unwrap().links, 2);
    assert!(matches!(fs.link("/orig", "/d/copy"), Err(Error::AlreadyExists)));
    assert!(matches!(fs.link("/d", "/d2"), Err(Error::IsADirectory)));

    fs.unlink("/orig").unwrap();
    assert_eq!(fs.get_attributes(ino).unwrap().links, 1);
    assert_eq!(fs.read(ino, 0, 6).unwrap(), b"shared");

    fs.unlink("/d/copy").unwrap();
    assert!(matches!(fs.get_attributes(ino), Err(Error::NotFound)));
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn forced_directory_link_leaves_counts_alone() {
    let fs = fresh();
    let mut fs = fs.lock();
    let d = fs.make_directory("/d", 0o755, 0, 0).unwrap();
    fs.link_file("/d", "/alias", true, 1).unwrap();
    assert_eq!(fs.lookup("/alias").unwrap(), d);
    assert_eq!(fs.get_attributes(d).unwrap().links, 2);
}

#[test]
fn empty_check_scans_every_block() {
    let fs = fresh();
    let mut fs = fs.lock();
    let d = fs.make_directory("/d", 0o755, 0, 0).unwrap();
    for i in 0..DIR_ENTRIES_PER_BLOCK - 2 {
        fs.add_directory_entry(d, &format!("e{i}"), 100, 0).unwrap();
    }
    fs.add_directory_entry(d, "tail", 101, 0).unwrap();
    assert_eq!(fs.read_inode(d).unwrap().data_blocks(), 2);

    for i in 0..DIR_ENTRIES_PER_BLOCK - 2 {
        fs.remove_directory_entry(d, &format!("e{i}"), 100, 0).unwrap();
    }
    // "tail" 被挪回了第一块，第二块随之释放
    let dir = fs.read_inode(d).unwrap();
    assert_eq!(dir.data_blocks(), 1);
    assert!(!fs.is_directory_empty(&dir).unwrap());

    fs.remove_directory_entry(d, "tail", 101, 0).unwrap();
    assert!(fs.is_directory_empty(&fs.read_inode(d).unwrap()).unwrap());
}

#[test]
fn missing_entry() {
    let fs = fresh();
    let mut fs = fs.lock();
    assert!(matches!(fs.unlink("/ghost"), Err(Error::NotFound)));
    assert!(matches!(
        fs.remove_directory_entry(ROOT_DIR_INODE, "ghost", 9, 0),
        Err(Error::NotFound)
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// 任意顺序删光目录项后，目录不再占用任何数据块
    #[test]
    fn entries_drain_in_any_order(
        order in Just((0..150usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let fs = fresh();
        let mut fs = fs.lock();
        let free = fs.free_blocks_left().unwrap();
        let dir = DiskInode::new(FileKind::Directory, 0o755, 0, 0, 0);
        let d = fs.alloc_inode(&dir).unwrap();

        for i in 0..order.len() {
            fs.add_directory_entry(d, &format!("n{i}"), 10 + i as u64, 0).unwrap();
        }
        prop_assert_eq!(fs.read_inode(d).unwrap().data_blocks(), 3);

        for (removed, &i) in order.iter().enumerate() {
            fs.remove_directory_entry(d, &format!("n{i}"), 10 + i as u64, 0).unwrap();
            let left = order.len() - removed - 1;
            let inode = fs.read_inode(d).unwrap();
            prop_assert_eq!(
                inode.data_blocks() as usize,
                left.div_ceil(DIR_ENTRIES_PER_BLOCK)
            );
        }

        let inode = fs.read_inode(d).unwrap();
        prop_assert_eq!(inode.file_size, 0);
        prop_assert!(fs.list_directory(d).unwrap().is_empty());
        prop_assert_eq!(fs.free_blocks_left().unwrap(), free);
    }
}
