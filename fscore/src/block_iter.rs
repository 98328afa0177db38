//! A lazy, restartable walk over the logical data blocks of an inode,
//! resolving inline extents then the indirect extent block. Implemented as a
//! real `Iterator` so callers can use ordinary `for`/`.take()`/`.skip()`
//! combinators.

use crate::image::FsImage;
use crate::layout::Inode;

pub struct BlockIter<'a> {
    image: &'a FsImage,
    inode: Inode,
    extent_idx: u32,
    offset_in_extent: u32,
}

impl<'a> BlockIter<'a> {
    pub fn new(image: &'a FsImage, inode: Inode) -> BlockIter<'a> {
        BlockIter {
            image,
            inode,
            extent_idx: 0,
            offset_in_extent: 0,
        }
    }
}

impl<'a> Iterator for BlockIter<'a> {
    /// The absolute data-region block index of the next block in file order.
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.inode.num_extents == 0 {
            return None;
        }
        loop {
            if self.extent_idx >= self.inode.num_extents {
                return None;
            }
            let ext = self
                .image
                .extent_at(&self.inode, self.extent_idx as usize);
            if self.offset_in_extent >= ext.count {
                self.extent_idx += 1;
                self.offset_in_extent = 0;
                continue;
            }
            let block = ext.start + self.offset_in_extent;
            self.offset_in_extent += 1;
            return Some(block);
        }
    }
}
