use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Formats an image file for the extent-based user-space filesystem.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of inode slots to reserve
    #[arg(short = 'i', long, default_value_t = 128)]
    inodes: u32,

    /// Reformat even if the image already carries a valid superblock
    #[arg(short, long)]
    force: bool,

    /// Zero the entire image, including the eventual data region, before
    /// formatting (slower; otherwise only metadata blocks are zeroed)
    #[arg(short, long)]
    zero: bool,

    /// Path to the image file to format
    image: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match fscore::format::format(&args.image, args.inodes, args.force, args.zero) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("mkfs: {e}");
            ExitCode::FAILURE
        }
    }
}
