//! Image Mapper + Layout Binder: acquires the backing file, memory-maps it,
//! and bundles the cached `Layout` and raw bytes into a single context value
//! (`FsImage`) threaded through every other component instead of any
//! module-level global.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{Error, Result};
use crate::layout::{self, DirEntry, Extent, Inode, Layout, Superblock, BLOCK_SIZE};

pub struct FsImage {
    mmap: MmapMut,
    layout: Layout,
}

impl FsImage {
    /// Opens an existing, already-formatted image file and validates its
    /// superblock. Returns `Error::InvalidArgument` if the file fails to
    /// parse as a valid image.
    pub fn open(path: impl AsRef<Path>) -> Result<FsImage> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file)
    }

    /// Maps a file without validating an existing superblock, for the
    /// formatter to populate from scratch. `layout` is computed up front
    /// from the requested inode count and the file's size.
    pub fn open_for_format(file: File, layout: Layout) -> Result<FsImage> {
        let len = file.metadata()?.len();
        if len == 0 || len as usize % BLOCK_SIZE != 0 {
            return Err(Error::InvalidArgument);
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(FsImage { mmap, layout })
    }

    pub fn from_file(file: File) -> Result<FsImage> {
        let len = file.metadata()?.len();
        if (len as usize) < 2 * BLOCK_SIZE || len as usize % BLOCK_SIZE != 0 {
            return Err(Error::InvalidArgument);
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let sb = layout::read_superblock(&mmap);
        if !sb.is_valid() {
            log::error!("image failed validation: magic={:#x}", sb.magic);
            return Err(Error::InvalidArgument);
        }
        let layout = Layout::from_superblock(&sb);
        Ok(FsImage { mmap, layout })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn superblock(&self) -> Superblock {
        layout::read_superblock(&self.mmap)
    }

    pub fn set_superblock(&mut self, sb: &Superblock) {
        layout::write_superblock(&mut self.mmap, sb);
    }

    pub fn inode(&self, inum: u32) -> Inode {
        layout::inode_at(&self.mmap, &self.layout, inum)
    }

    pub fn set_inode(&mut self, inum: u32, inode: &Inode) {
        layout::set_inode_at(&mut self.mmap, &self.layout, inum, inode);
    }

    pub fn bitmap_bit(&self, block_idx: u32) -> bool {
        layout::bitmap_bit(&self.mmap, &self.layout, block_idx)
    }

    pub fn set_bitmap_bit(&mut self, block_idx: u32, value: bool) {
        layout::set_bitmap_bit(&mut self.mmap, &self.layout, block_idx, value);
    }

    pub fn zero_bitmap(&mut self) {
        let off = block_offset(self.layout.inode_table_start) - block_offset(self.layout.bitmap_start);
        let start = block_offset(self.layout.bitmap_start);
        self.mmap[start..start + off].fill(0);
    }

    pub fn zero_inode_table(&mut self) {
        let start = block_offset(self.layout.inode_table_start);
        let end = block_offset(self.layout.data_start);
        self.mmap[start..end].fill(0);
    }

    pub fn data_block(&self, block_idx: u32) -> &[u8] {
        layout::data_block(&self.mmap, &self.layout, block_idx)
    }

    pub fn data_block_mut(&mut self, block_idx: u32) -> &mut [u8] {
        layout::data_block_mut(&mut self.mmap, &self.layout, block_idx)
    }

    pub fn zero_block(&mut self, block_idx: u32) {
        layout::zero_block(&mut self.mmap, &self.layout, block_idx);
    }

    pub fn extent_at(&self, inode: &Inode, i: usize) -> Extent {
        layout::extent_at(&self.mmap, &self.layout, inode, i)
    }

    pub fn set_extent_at(&mut self, inode: &mut Inode, i: usize, ext: Extent) {
        layout::set_extent_at(&mut self.mmap, &self.layout, inode, i, ext);
    }

    pub fn dirent_at(&self, block_idx: u32, slot: usize) -> DirEntry {
        layout::dirent_at(&self.mmap, &self.layout, block_idx, slot)
    }

    pub fn set_dirent_at(&mut self, block_idx: u32, slot: usize, de: &DirEntry) {
        layout::set_dirent_at(&mut self.mmap, &self.layout, block_idx, slot, de);
    }

    pub fn clear_dirent_at(&mut self, block_idx: u32, slot: usize) {
        layout::clear_dirent_at(&mut self.mmap, &self.layout, block_idx, slot);
    }

    /// Best-effort flush on unmount; not a durability guarantee.
    pub fn flush(&self) {
        if let Err(e) = self.mmap.flush() {
            log::warn!("flush failed on unmount: {e}");
        }
    }

    /// Raw byte access, used only by the formatter to lay down the initial
    /// image before a `Layout` can be derived from a (not yet written)
    /// superblock.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn zero_all(&mut self) {
        self.mmap.fill(0);
    }
}

fn block_offset(block: u32) -> usize {
    block as usize * BLOCK_SIZE
}
