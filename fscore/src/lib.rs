//! Core on-disk layout and operations for a single-image, extent-based
//! user-space filesystem. `fscore` owns every byte format and allocation
//! rule; binaries built on top of it (a formatter, a FUSE driver) never
//! touch the mapped image directly.

pub mod alloc;
pub mod bitmap;
pub mod block_iter;
pub mod clock;
pub mod dir;
pub mod error;
pub mod format;
pub mod image;
pub mod inode_alloc;
pub mod io;
pub mod layout;
pub mod ops;
pub mod path;

pub use clock::{Clock, SystemClock, Timestamp};
pub use error::{Error, Result};
pub use image::FsImage;
