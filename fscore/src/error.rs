//! Error model for the core. Variants map 1:1 onto the POSIX codes this
//! filesystem surfaces to its bridge (see `From<Error> for i32`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotDir,
    #[error("path or component name too long")]
    NameTooLong,
    #[error("no space left on device")]
    NoSpace,
    #[error("cannot allocate memory")]
    NoMemory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("bad address")]
    Fault,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("already exists")]
    Exists,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<&Error> for i32 {
    fn from(e: &Error) -> i32 {
        match e {
            Error::NotFound => libc::ENOENT,
            Error::NotDir => libc::ENOTDIR,
            Error::NameTooLong => libc::ENAMETOOLONG,
            Error::NoSpace => libc::ENOSPC,
            Error::NoMemory => libc::ENOMEM,
            Error::NotEmpty => libc::ENOTEMPTY,
            Error::Fault => libc::EFAULT,
            Error::InvalidArgument => libc::EINVAL,
            Error::Exists => libc::EEXIST,
            Error::Io(_) => libc::EIO,
        }
    }
}

impl From<Error> for i32 {
    fn from(e: Error) -> i32 {
        i32::from(&e)
    }
}
