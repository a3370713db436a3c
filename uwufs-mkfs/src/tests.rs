use std::path::PathBuf;
use std::sync::Arc;

use block_dev::{BlockDevice, BlockError, BLOCK_SIZE};
use uwufs::{FsConfig, UwuFileSystem};

use crate::BlockFile;

/// 测试结束时删掉镜像
struct TempImage(PathBuf);

impl TempImage {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("uwufs-{}-{name}.img", std::process::id()));
        Self(path)
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn block_file_io() {
    let image = TempImage::new("io");
    let dev = BlockFile::create(&image.0, 8).unwrap();
    assert_eq!(dev.total_blocks(), 8);
    assert_eq!(
        std::fs::metadata(&image.0).unwrap().len(),
        8 * BLOCK_SIZE as u64
    );

    let block = [0x5A; BLOCK_SIZE];
    dev.write_block(7, &block).unwrap();
    let mut buf = [0; BLOCK_SIZE];
    dev.read_block(7, &mut buf).unwrap();
    assert_eq!(buf, block);

    assert!(matches!(
        dev.read_block(8, &mut buf),
        Err(BlockError::OutOfRange { block_id: 8, total: 8 })
    ));
    assert!(matches!(
        dev.write_block(0, &block[..100]),
        Err(BlockError::BufferSize(100))
    ));
}

#[test]
fn format_then_reopen_image() {
    let image = TempImage::new("reopen");
    {
        let dev = Arc::new(BlockFile::create(&image.0, 256).unwrap());
        let fs = UwuFileSystem::format(dev, FsConfig::default()).unwrap();
        let mut fs = fs.lock();
        let ino = fs.create_file("/greeting", 0o644, 0, 0).unwrap();
        fs.write(ino, 0, b"owo what's this").unwrap();
    }

    let dev = Arc::new(BlockFile::open(&image.0).unwrap());
    let fs = UwuFileSystem::open(dev, FsConfig::default()).unwrap();
    let fs = fs.lock();
    let ino = fs.lookup("/greeting").unwrap();
    assert_eq!(fs.read(ino, 0, 100).unwrap(), b"owo what's this");
    assert!(fs.check().unwrap().is_clean());
}
