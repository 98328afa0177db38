//! Builds a fresh image: computes the region layout from the image size and
//! requested inode count, zeroes the relevant regions, writes the
//! superblock, and allocates the root directory at inode 0.

use std::fs::OpenOptions;
use std::path::Path;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::image::FsImage;
use crate::layout::{
    block_count_for_bitmap, block_count_for_inodes, Inode, Layout, Superblock, BLOCK_SIZE, MAGIC,
    S_IFDIR,
};

/// Lays out and initializes a filesystem image at `path`.
///
/// `inode_count` is the number of inode slots to reserve; `force` skips the
/// "does this already look like a valid image" check that would otherwise
/// refuse to reformat; `zero` overwrites every byte of the image (including
/// the eventual data region) before laying down metadata, rather than only
/// the metadata regions.
pub fn format(path: impl AsRef<Path>, inode_count: u32, force: bool, zero: bool) -> Result<()> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    if len == 0 || len as usize % BLOCK_SIZE != 0 {
        return Err(Error::InvalidArgument);
    }
    if inode_count == 0 {
        return Err(Error::InvalidArgument);
    }

    let total_blocks = (len / BLOCK_SIZE as u64) as u32;
    if total_blocks < 3 {
        return Err(Error::NoSpace);
    }

    if !force {
        if let Ok(existing) = FsImage::open_for_format(
            file.try_clone()?,
            Layout {
                bitmap_start: 0,
                inode_table_start: 0,
                data_start: 0,
                inode_count: 0,
                data_block_count: 0,
            },
        ) {
            if existing.superblock().magic == MAGIC {
                log::warn!("refusing to reformat image with existing magic; pass --force");
                return Err(Error::InvalidArgument);
            }
        }
    }

    let bi = block_count_for_inodes(inode_count);
    if 2 + bi >= total_blocks {
        return Err(Error::NoSpace);
    }
    // Closed form per spec §3: `bd` is solved once against
    // `T = total_blocks - 2 - bi`, not iterated against the post-bitmap data
    // block count (that would have to exclude the bitmap's own blocks from
    // the thing it's sized to cover, which doesn't converge cleanly).
    let remaining_after_inodes = total_blocks - 2 - bi;
    let bd = block_count_for_bitmap(remaining_after_inodes);
    if 2 + bd + bi >= total_blocks {
        return Err(Error::NoSpace);
    }
    let data_block_count = total_blocks - 2 - bd - bi;

    let layout = Layout {
        bitmap_start: 2,
        inode_table_start: 2 + bd,
        data_start: 2 + bd + bi,
        inode_count,
        data_block_count,
    };

    let mut image = FsImage::open_for_format(file, layout)?;
    if zero {
        image.zero_all();
    } else {
        image.raw_mut()[..BLOCK_SIZE * 2].fill(0);
    }
    image.zero_bitmap();
    image.zero_inode_table();

    let sb = Superblock {
        magic: MAGIC,
        image_size: len,
        inode_count,
        free_inodes: inode_count - 1,
        data_block_count,
        free_data_blocks: data_block_count,
        bitmap_start: layout.bitmap_start,
        inode_table_start: layout.inode_table_start,
        data_start: layout.data_start,
    };
    image.set_superblock(&sb);

    let clock = SystemClock;
    let mut root = Inode::free();
    root.mode = S_IFDIR | 0o777;
    root.links = 2;
    root.mtime = clock.now()?;
    image.set_inode(0, &root);

    log::info!(
        "formatted {} blocks, {} inodes, {} data blocks",
        total_blocks,
        inode_count,
        data_block_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn format_produces_valid_superblock_and_root() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(64 * BLOCK_SIZE as u64).unwrap();
        format(tmp.path(), 16, false, false).unwrap();

        let image = FsImage::open(tmp.path()).unwrap();
        let sb = image.superblock();
        assert_eq!(sb.magic, MAGIC);
        assert_eq!(sb.inode_count, 16);
        assert_eq!(sb.free_inodes, 15);

        let root = image.inode(0);
        assert!(root.is_dir());
        assert_eq!(root.links, 2);
    }

    #[test]
    fn format_refuses_to_reformat_without_force() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(64 * BLOCK_SIZE as u64).unwrap();
        format(tmp.path(), 16, false, false).unwrap();
        let err = format(tmp.path(), 8, false, false);
        assert!(err.is_err());
        format(tmp.path(), 8, true, false).unwrap();
        let image = FsImage::open(tmp.path()).unwrap();
        assert_eq!(image.superblock().inode_count, 8);
    }

    #[test]
    fn format_rejects_image_too_small_for_any_data() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(2 * BLOCK_SIZE as u64).unwrap();
        assert!(format(tmp.path(), 16, false, false).is_err());
    }

    /// Regression test: a total block count that makes the post-bitmap data
    /// block count land exactly on a multiple of `8*BLOCK_SIZE + 1` used to
    /// make the (wrong) iterative fixed-point converge one block short,
    /// leaving the bitmap's last bit pointing past its own region.
    #[test]
    fn bitmap_always_covers_every_data_block_it_claims_to() {
        let tmp = NamedTempFile::new().unwrap();
        let total_blocks: u64 = 32773;
        tmp.as_file()
            .set_len(total_blocks * BLOCK_SIZE as u64)
            .unwrap();
        format(tmp.path(), 16, false, false).unwrap();

        let image = FsImage::open(tmp.path()).unwrap();
        let sb = image.superblock();
        assert!(sb.is_valid());

        let bd = sb.inode_table_start - sb.bitmap_start;
        let bitmap_capacity_bits = bd as u64 * 8 * BLOCK_SIZE as u64;
        assert!(
            bitmap_capacity_bits >= sb.data_block_count as u64,
            "bitmap of {bd} block(s) cannot address {} data blocks",
            sb.data_block_count
        );

        // The last data block's bit must fall inside the bitmap region, not
        // spill into the inode table.
        let last_bit_byte_offset = (sb.data_block_count - 1) / 8;
        assert!((last_bit_byte_offset as u64) < bd as u64 * BLOCK_SIZE as u64);
    }
}
