use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Image file to create (overwritten if it exists)
    #[arg(long, short)]
    pub image: PathBuf,

    /// Image size in 4 KiB blocks
    #[arg(long, short, default_value_t = 16 * 1024)]
    pub blocks: u64,

    /// Share of the image reserved for the inode table
    #[arg(long, default_value_t = 0.1)]
    pub ilist_percentage: f64,

    /// Host directory whose contents are copied into `/`
    #[arg(long, short)]
    pub source: Option<PathBuf>,
}
