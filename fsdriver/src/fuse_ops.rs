//! Adapts `fscore::ops` (path-based, `fuser`-agnostic) to `fuser::Filesystem`
//! (inode-number-based). `fuser` hands us inode numbers and names one path
//! component at a time via `lookup`; we keep a small table mapping each
//! inode number the kernel currently holds a reference to back to its
//! absolute path, so the rest of the driver can keep calling into `fscore`
//! with plain path strings.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;

use fscore::clock::SystemClock;
use fscore::error::Error;
use fscore::layout::S_IFDIR;
use fscore::ops::{self, Attr, TimeSpec};
use fscore::path;
use fscore::{FsImage, Timestamp};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

pub struct FsDriver {
    image: FsImage,
    clock: SystemClock,
    paths: HashMap<u64, String>,
}

impl FsDriver {
    pub fn open(image_path: &Path) -> fscore::Result<FsDriver> {
        let image = FsImage::open(image_path)?;
        let mut paths = HashMap::new();
        paths.insert(ROOT_INO, "/".to_string());
        Ok(FsDriver {
            image,
            clock: SystemClock,
            paths,
        })
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.paths.get(&ino).map(|s| s.as_str())
    }

    fn fuse_ino(inum: u32) -> u64 {
        inum as u64 + 1
    }

    fn child_path(parent_path: &str, name: &OsStr) -> Option<String> {
        let name = name.to_str()?;
        Some(if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        })
    }

    fn remember(&mut self, path: &str) {
        if let Ok(inum) = path::resolve(&self.image, path) {
            self.paths.insert(Self::fuse_ino(inum), path.to_string());
        }
    }

    fn forget_path(&mut self, parent_path: &str, name: &OsStr) {
        if let Some(child) = Self::child_path(parent_path, name) {
            self.paths.retain(|_, p| p != &child);
        }
    }
}

fn to_file_attr(ino: u64, attr: Attr) -> FileAttr {
    let kind = if attr.mode & fscore::layout::S_IFMT == S_IFDIR {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let mtime = to_system_time(attr.mtime);
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.blocks_512,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm: (attr.mode & 0o7777) as u16,
        nlink: attr.nlink as u32,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: fscore::layout::BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn to_system_time(ts: Timestamp) -> SystemTime {
    UNIX_EPOCH + Duration::new(ts.sec.max(0) as u64, ts.nsec)
}

fn to_timestamp(t: SystemTime) -> Timestamp {
    let dur = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    Timestamp {
        sec: dur.as_secs() as i64,
        nsec: dur.subsec_nanos(),
    }
}

fn errno(e: Error) -> c_int {
    i32::from(e)
}

impl Filesystem for FsDriver {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(child_path) = Self::child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match ops::getattr(&self.image, &child_path) {
            Ok(attr) => {
                self.remember(&child_path);
                let ino = path::resolve(&self.image, &child_path)
                    .map(Self::fuse_ino)
                    .unwrap_or(0);
                reply.entry(&TTL, &to_file_attr(ino, attr), 0);
            }
            Err(e) => reply.error(errno(e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        match ops::getattr(&self.image, &path) {
            Ok(attr) => reply.attr(&TTL, &to_file_attr(ino, attr)),
            Err(e) => reply.error(errno(e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Some(size) = size {
            if let Err(e) = ops::truncate(&mut self.image, &path, size, &self.clock) {
                reply.error(errno(e));
                return;
            }
        }

        // atime has no backing field on-disk, so an atime-only call is a
        // harmless no-op; a real utimens touches mtime (or both).
        if let Some(t) = mtime.or(atime) {
            let spec = match t {
                TimeOrNow::Now => TimeSpec::Now,
                TimeOrNow::SpecificTime(t) => TimeSpec::Specific(to_timestamp(t)),
            };
            if let Err(e) = ops::utimens(&mut self.image, &path, Some(spec), &self.clock) {
                reply.error(errno(e));
                return;
            }
        }

        match ops::getattr(&self.image, &path) {
            Ok(attr) => reply.attr(&TTL, &to_file_attr(ino, attr)),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut index: i64 = 0;
        let result = ops::readdir(&self.image, &path, |name, child_inum| {
            let child_ino = Self::fuse_ino(child_inum);
            index += 1;
            if index <= offset {
                return true;
            }
            let kind = if self.image.inode(child_inum).is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            !reply.add(child_ino, index, kind, name)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(child_path) = Self::child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match ops::mkdir(&mut self.image, &child_path, mode, &self.clock) {
            Ok(inum) => {
                let ino = Self::fuse_ino(inum);
                self.paths.insert(ino, child_path.clone());
                let attr = ops::getattr(&self.image, &child_path).expect("just created");
                reply.entry(&TTL, &to_file_attr(ino, attr), 0);
            }
            Err(e) => reply.error(errno(e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(child_path) = Self::child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match ops::rmdir(&mut self.image, &child_path) {
            Ok(()) => {
                self.forget_path(&parent_path, name);
                reply.ok();
            }
            Err(e) => reply.error(errno(e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(child_path) = Self::child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match ops::create(&mut self.image, &child_path, mode, &self.clock) {
            Ok(inum) => {
                let ino = Self::fuse_ino(inum);
                self.paths.insert(ino, child_path.clone());
                let attr = ops::getattr(&self.image, &child_path).expect("just created");
                reply.created(&TTL, &to_file_attr(ino, attr), 0, ino, 0);
            }
            Err(e) => reply.error(errno(e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(child_path) = Self::child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match ops::unlink(&mut self.image, &child_path) {
            Ok(()) => {
                self.forget_path(&parent_path, name);
                reply.ok();
            }
            Err(e) => reply.error(errno(e)),
        }
    }

    /// Stateless pass-through: the core never needs a file handle, so the
    /// handle returned here is simply the inode number, never consulted
    /// again except to satisfy callers that thread it through.
    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(ino, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match ops::read(&self.image, &path, offset as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(errno(e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino).map(|s| s.to_string()) else {
            reply.error(libc::ENOENT);
            return;
        };
        match ops::write(&mut self.image, &path, offset as u64, data, &self.clock) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let s = ops::statfs(&self.image);
        reply.statfs(
            s.total_blocks as u64,
            s.free_blocks as u64,
            s.free_blocks as u64,
            s.total_inodes as u64,
            s.free_inodes as u64,
            s.block_size,
            s.name_max,
            s.block_size,
        );
    }

    fn destroy(&mut self) {
        self.image.flush();
    }
}
