mod cli;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::Cli;
use log::{info, warn};
use uwufs::{FsConfig, UwuFileSystem};
use uwufs_mkfs::BlockFile;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("image={:?}\nblocks={}", cli.image, cli.blocks);

    let config = FsConfig {
        ilist_percentage: cli.ilist_percentage,
        ..Default::default()
    };
    config.validate()?;

    let block_file = BlockFile::create(&cli.image, cli.blocks)
        .with_context(|| format!("cannot create {:?}", cli.image))?;
    let fs = UwuFileSystem::format(Arc::new(block_file), config)?;
    let mut fs = fs.lock();

    if let Some(source) = &cli.source {
        if !source.is_dir() {
            bail!("{source:?} is not a directory");
        }
        pack(&mut fs, source, "")?;
    }

    let statfs = fs.statfs()?;
    println!(
        "free blocks={}/{}\nfree inodes={}/{}",
        statfs.free_blocks, statfs.total_blocks, statfs.free_inodes, statfs.total_inodes
    );

    Ok(())
}

/// 把宿主目录 `dir` 的内容拷进镜像中的 `prefix` 目录
fn pack(fs: &mut UwuFileSystem, dir: &Path, prefix: &str) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("skipping non-UTF-8 name {:?}", entry.file_name());
            continue;
        };
        let path = format!("{prefix}/{name}");
        let meta = fs::symlink_metadata(entry.path())?;
        let perm = meta.permissions().mode() & 0o7777;

        if meta.is_dir() {
            info!("dir={path:?}");
            fs.make_directory(&path, perm, 0, 0)?;
            pack(fs, &entry.path(), &path)?;
        } else if meta.is_symlink() {
            let target = fs::read_link(entry.path())?;
            let Some(target) = target.to_str() else {
                warn!("skipping symlink {path:?} with non-UTF-8 target");
                continue;
            };
            info!("symlink={path:?} -> {target:?}");
            fs.symlink(target, &path, 0, 0)?;
        } else if meta.is_file() {
            info!("file={path:?}");
            let data = fs::read(entry.path())?;
            let ino = fs.create_file(&path, perm, 0, 0)?;
            fs.write(ino, 0, &data)
                .with_context(|| format!("writing {path:?}"))?;
        } else {
            warn!("skipping special file {path:?}");
        }
    }

    Ok(())
}
