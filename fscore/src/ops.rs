//! The thin set of entry points a filesystem bridge invokes: attribute
//! query, directory listing, make/remove directory, create/unlink file, set
//! times, truncate, read, write, and statistics. Each function resolves its
//! path (where applicable) and delegates to the owning component; none of
//! them know anything about FUSE request/reply types.

use crate::clock::{Clock, Timestamp};
use crate::dir;
use crate::error::{Error, Result};
use crate::image::FsImage;
use crate::io;
use crate::layout::{Inode, BLOCK_SIZE, NAME_MAX, S_IFDIR, S_IFREG};
use crate::path::resolve;

#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub mode: u32,
    pub nlink: u16,
    pub size: u64,
    pub blocks_512: u64,
    pub mtime: Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub name_max: u32,
}

/// Mirrors the three ways a caller can ask to set a timestamp: leave it
/// alone (the bridge never calls `utimens` for that half at all), stamp the
/// current time, or set an explicit value.
#[derive(Debug, Clone, Copy)]
pub enum TimeSpec {
    Now,
    Specific(Timestamp),
}

pub fn statfs(image: &FsImage) -> StatFs {
    let sb = image.superblock();
    StatFs {
        block_size: BLOCK_SIZE as u32,
        total_blocks: (sb.image_size / BLOCK_SIZE as u64) as u32,
        free_blocks: sb.free_data_blocks,
        total_inodes: sb.inode_count,
        free_inodes: sb.free_inodes,
        name_max: (NAME_MAX - 1) as u32,
    }
}

pub fn getattr(image: &FsImage, path: &str) -> Result<Attr> {
    let inum = resolve(image, path)?;
    Ok(attr_of(&image.inode(inum)))
}

fn attr_of(inode: &Inode) -> Attr {
    Attr {
        mode: inode.mode,
        nlink: inode.links,
        size: inode.size,
        blocks_512: inode.size.div_ceil(512),
        mtime: inode.mtime,
    }
}

/// Emits `.`, `..`, then every occupied entry of `path`. `emit` returning
/// `false` signals the bridge's reply buffer is full.
pub fn readdir<F>(image: &FsImage, path: &str, mut emit: F) -> Result<()>
where
    F: FnMut(&str, u32) -> bool,
{
    let inum = resolve(image, path)?;
    if !image.inode(inum).is_dir() {
        return Err(Error::NotDir);
    }
    if !emit(".", inum) || !emit("..", inum) {
        return Err(Error::NoMemory);
    }
    let mut overflowed = false;
    dir::list_entries(image, inum, |name, child| {
        if !emit(name, child) {
            overflowed = true;
            false
        } else {
            true
        }
    });
    if overflowed {
        return Err(Error::NoMemory);
    }
    Ok(())
}

pub fn mkdir(image: &mut FsImage, path: &str, mode: u32, clock: &dyn Clock) -> Result<u32> {
    dir::add_entry(image, path, (mode & !crate::layout::S_IFMT) | S_IFDIR, 2, clock)
}

pub fn rmdir(image: &mut FsImage, path: &str) -> Result<()> {
    let inum = resolve(image, path)?;
    let inode = image.inode(inum);
    if !inode.is_dir() {
        return Err(Error::NotDir);
    }
    if !dir::is_empty(image, inum) {
        return Err(Error::NotEmpty);
    }
    dir::remove_entry(image, path)
}

pub fn create(image: &mut FsImage, path: &str, mode: u32, clock: &dyn Clock) -> Result<u32> {
    dir::add_entry(image, path, (mode & !crate::layout::S_IFMT) | S_IFREG, 1, clock)
}

pub fn unlink(image: &mut FsImage, path: &str) -> Result<()> {
    let inum = resolve(image, path)?;
    if image.inode(inum).is_dir() {
        return Err(Error::NotDir);
    }
    dir::remove_entry(image, path)
}

pub fn utimens(
    image: &mut FsImage,
    path: &str,
    times: Option<TimeSpec>,
    clock: &dyn Clock,
) -> Result<()> {
    let inum = resolve(image, path)?;
    let mut inode = image.inode(inum);
    inode.mtime = match times {
        None => clock.now()?,
        Some(TimeSpec::Now) => clock.now()?,
        Some(TimeSpec::Specific(t)) => t,
    };
    image.set_inode(inum, &inode);
    Ok(())
}

pub fn truncate(image: &mut FsImage, path: &str, size: u64, clock: &dyn Clock) -> Result<()> {
    let inum = resolve(image, path)?;
    let mut inode = image.inode(inum);
    if inode.is_dir() {
        return Err(Error::NotDir);
    }
    io::truncate(image, &mut inode, size, clock)?;
    image.set_inode(inum, &inode);
    Ok(())
}

pub fn read(image: &FsImage, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let inum = resolve(image, path)?;
    let inode = image.inode(inum);
    if inode.is_dir() {
        return Err(Error::NotDir);
    }
    io::read(image, &inode, offset, buf)
}

pub fn write(
    image: &mut FsImage,
    path: &str,
    offset: u64,
    buf: &[u8],
    clock: &dyn Clock,
) -> Result<usize> {
    let inum = resolve(image, path)?;
    let mut inode = image.inode(inum);
    if inode.is_dir() {
        return Err(Error::NotDir);
    }
    let n = io::write(image, &mut inode, offset, buf, clock)?;
    image.set_inode(inum, &inode);
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::format;
    use tempfile::NamedTempFile;

    fn fresh_image(inodes: u32, blocks: u64) -> FsImage {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file()
            .set_len(blocks * BLOCK_SIZE as u64)
            .unwrap();
        format::format(tmp.path(), inodes, false, false).unwrap();
        FsImage::open(tmp.path()).unwrap()
    }

    #[test]
    fn mkdir_readdir_roundtrip() {
        let mut image = fresh_image(32, 256);
        let clock = FakeClock::new(Timestamp { sec: 0, nsec: 0 });
        mkdir(&mut image, "/a", 0o755, &clock).unwrap();

        let mut seen = Vec::new();
        readdir(&image, "/", |name, _inum| {
            seen.push(name.to_string());
            true
        })
        .unwrap();
        assert!(seen.contains(&".".to_string()));
        assert!(seen.contains(&"..".to_string()));
        assert!(seen.contains(&"a".to_string()));

        let attr = getattr(&image, "/a").unwrap();
        assert_eq!(attr.mode & S_IFDIR, S_IFDIR);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.size, 0);
    }

    #[test]
    fn create_write_read_roundtrip() {
        let mut image = fresh_image(32, 256);
        let clock = FakeClock::new(Timestamp { sec: 0, nsec: 0 });
        create(&mut image, "/f", 0o644, &clock).unwrap();
        let n = write(&mut image, "/f", 0, b"hello", &clock).unwrap();
        assert_eq!(n, 5);

        let mut buf = [0u8; 5];
        let got = read(&image, "/f", 0, &mut buf).unwrap();
        assert_eq!(got, 5);
        assert_eq!(&buf, b"hello");

        let attr = getattr(&image, "/f").unwrap();
        assert_eq!(attr.size, 5);
        assert_eq!(attr.nlink, 1);
    }

    #[test]
    fn hole_write_zero_fills_and_reports_full_size() {
        let mut image = fresh_image(32, 256);
        let clock = FakeClock::new(Timestamp { sec: 0, nsec: 0 });
        create(&mut image, "/h", 0o644, &clock).unwrap();
        write(&mut image, "/h", 8192, b"X", &clock).unwrap();

        let attr = getattr(&image, "/h").unwrap();
        assert_eq!(attr.size, 8193);

        let mut buf = [0xFFu8; 1];
        read(&image, "/h", 0, &mut buf).unwrap();
        assert_eq!(buf[0], 0);
        read(&image, "/h", 8192, &mut buf).unwrap();
        assert_eq!(buf[0], b'X');
    }

    #[test]
    fn truncate_shrink_reclaims_blocks() {
        let mut image = fresh_image(32, 256);
        let clock = FakeClock::new(Timestamp { sec: 0, nsec: 0 });
        create(&mut image, "/g", 0o644, &clock).unwrap();
        let before = image.superblock().free_data_blocks;
        write(&mut image, "/g", 0, &vec![0u8; 12288], &clock).unwrap();
        assert_eq!(image.superblock().free_data_blocks, before - 3);

        truncate(&mut image, "/g", 100, &clock).unwrap();
        assert_eq!(image.superblock().free_data_blocks, before);
        assert_eq!(getattr(&image, "/g").unwrap().size, 100);
    }

    #[test]
    fn rmdir_rejects_non_empty_then_succeeds_after_unlink() {
        let mut image = fresh_image(32, 256);
        let clock = FakeClock::new(Timestamp { sec: 0, nsec: 0 });
        mkdir(&mut image, "/d", 0o755, &clock).unwrap();
        create(&mut image, "/d/x", 0o644, &clock).unwrap();

        assert!(matches!(rmdir(&mut image, "/d"), Err(Error::NotEmpty)));
        unlink(&mut image, "/d/x").unwrap();
        rmdir(&mut image, "/d").unwrap();
        assert!(resolve(&image, "/d").is_err());
    }
}
