//! Reading, writing, and truncating file data through an inode's extents.

use crate::alloc::{grow_inode, shrink_inode};
use crate::block_iter::BlockIter;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::image::FsImage;
use crate::layout::{Inode, BLOCK_SIZE};

/// Reads up to `buf.len()` bytes starting at `offset` into `buf`, returning
/// the number of bytes actually copied. Reading past end-of-file returns 0
/// rather than an error.
pub fn read(image: &FsImage, inode: &Inode, offset: u64, buf: &mut [u8]) -> Result<usize> {
    if offset >= inode.size {
        return Ok(0);
    }
    let want = buf.len() as u64;
    let avail = inode.size - offset;
    let to_read = want.min(avail) as usize;

    let first_block = (offset / BLOCK_SIZE as u64) as u32;
    let mut skip_in_first = (offset % BLOCK_SIZE as u64) as usize;
    let mut copied = 0usize;

    for block in BlockIter::new(image, *inode).skip(first_block as usize) {
        if copied >= to_read {
            break;
        }
        let src = image.data_block(block);
        let chunk = (BLOCK_SIZE - skip_in_first).min(to_read - copied);
        buf[copied..copied + chunk].copy_from_slice(&src[skip_in_first..skip_in_first + chunk]);
        copied += chunk;
        skip_in_first = 0;
    }
    Ok(copied)
}

/// Writes `buf` at `offset`, growing the inode (and zero-filling any gap
/// before `offset`) as needed. Returns the number of bytes written, which is
/// always `buf.len()` on success since growth either fully succeeds or the
/// call fails with `Error::NoSpace` and no partial write is visible.
pub fn write(
    image: &mut FsImage,
    inode: &mut Inode,
    offset: u64,
    buf: &[u8],
    clock: &dyn Clock,
) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let end = offset
        .checked_add(buf.len() as u64)
        .ok_or(Error::InvalidArgument)?;

    // Stamp mtime first so a clock failure never leaves a partial grow/copy
    // behind (§7: clock failure is the only non-allocation error write can
    // surface, and it must not coexist with a mutated inode).
    inode.mtime = clock.now()?;

    if end > inode.size {
        grow_inode(image, inode, end - inode.size)?;
        inode.size = end;
    }

    let first_block = (offset / BLOCK_SIZE as u64) as usize;
    let mut skip_in_first = (offset % BLOCK_SIZE as u64) as usize;
    let mut written = 0usize;

    let blocks: Vec<u32> = BlockIter::new(image, *inode).skip(first_block).collect();
    for block in blocks {
        if written >= buf.len() {
            break;
        }
        let dst = image.data_block_mut(block);
        let chunk = (BLOCK_SIZE - skip_in_first).min(buf.len() - written);
        dst[skip_in_first..skip_in_first + chunk].copy_from_slice(&buf[written..written + chunk]);
        written += chunk;
        skip_in_first = 0;
    }

    Ok(written)
}

/// Grows or shrinks `inode` to exactly `new_size` bytes.
pub fn truncate(
    image: &mut FsImage,
    inode: &mut Inode,
    new_size: u64,
    clock: &dyn Clock,
) -> Result<()> {
    inode.mtime = clock.now()?;

    if new_size > inode.size {
        grow_inode(image, inode, new_size - inode.size)?;
        inode.size = new_size;
    } else if new_size < inode.size {
        shrink_inode(image, inode, new_size);
    }
    Ok(())
}
