mod fuse_ops;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fuser::MountOption;

/// Mounts an extent-based user-space filesystem image at a directory.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Keep the driver in the foreground and log at debug level
    #[arg(short, long)]
    debug: bool,

    /// Extra mount options, passed through to the kernel (e.g. `ro`, `allow_other`)
    #[arg(short = 'o', long = "option", value_name = "OPTION")]
    mount_options: Vec<String>,

    /// Path to a previously formatted image file
    image: PathBuf,

    /// Directory to mount the filesystem at
    mountpoint: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let fs = match fuse_ops::FsDriver::open(&args.image) {
        Ok(fs) => fs,
        Err(e) => {
            log::error!("fsdriver: failed to open {}: {e}", args.image.display());
            return ExitCode::FAILURE;
        }
    };

    let mut options = vec![MountOption::FSName("fscore".to_string())];
    for opt in &args.mount_options {
        options.push(parse_mount_option(opt));
    }

    log::info!("mounting {} at {}", args.image.display(), args.mountpoint.display());
    match fuser::mount2(fs, &args.mountpoint, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fsdriver: mount failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn parse_mount_option(opt: &str) -> MountOption {
    match opt {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        other => MountOption::CUSTOM(other.to_string()),
    }
}
