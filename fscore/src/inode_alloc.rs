//! Inode slot allocation: finding a free slot and initializing it.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::image::FsImage;
use crate::layout::Inode;

/// Linear scan for the first inode slot with a zero link count. Inode 0 is
/// never returned — it is the permanent root.
pub fn find_free_inode(image: &FsImage) -> Option<u32> {
    let count = image.layout().inode_count;
    (1..count).find(|&i| image.inode(i).is_free())
}

/// Zeroes the slot, sets `mode`/`links`/`mtime`, and decrements
/// `superblock.free_inodes`. Extent count and indirect block stay at zero.
pub fn init_inode(
    image: &mut FsImage,
    index: u32,
    mode: u32,
    initial_links: u16,
    clock: &dyn Clock,
) -> Result<()> {
    let mut inode = Inode::free();
    inode.mode = mode;
    inode.links = initial_links;
    inode.mtime = clock.now().map_err(|_| Error::Fault)?;
    image.set_inode(index, &inode);

    let mut sb = image.superblock();
    sb.free_inodes -= 1;
    image.set_superblock(&sb);
    Ok(())
}
