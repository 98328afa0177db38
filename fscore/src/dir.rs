//! Directory entry lookup, insertion, and removal. `.` and `..` are never
//! stored as physical entries; they are synthesized by the dispatcher's
//! `readdir`, so every slot walked here belongs to an actual child.

use crate::alloc::grow_inode;
use crate::block_iter::BlockIter;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::image::FsImage;
use crate::inode_alloc::{find_free_inode, init_inode};
use crate::layout::{DirEntry, Inode, BLOCK_SIZE, NAME_MAX, NUM_DENTRY_PER_BLOCK, S_IFDIR};
use crate::path::{resolve, split_parent};

/// One (block index, slot index, entry) triple per occupied or empty slot of
/// a directory's allocated data blocks.
fn for_each_slot<F>(image: &FsImage, dir_inode: &Inode, mut f: F)
where
    F: FnMut(u32, usize, DirEntry) -> bool,
{
    for block in BlockIter::new(image, *dir_inode) {
        for slot in 0..NUM_DENTRY_PER_BLOCK {
            let de = image.dirent_at(block, slot);
            if !f(block, slot, de) {
                return;
            }
        }
    }
}

pub fn lookup_entry(image: &FsImage, dir_inum: u32, name: &str) -> Option<u32> {
    let dir_inode = image.inode(dir_inum);
    let mut found = None;
    for_each_slot(image, &dir_inode, |_block, _slot, de| {
        if de.is_occupied() && de.name_str() == name {
            found = Some(de.inode);
            false
        } else {
            true
        }
    });
    found
}

/// `true` iff every slot in every allocated block of `dir_inum` is empty.
pub fn is_empty(image: &FsImage, dir_inum: u32) -> bool {
    let dir_inode = image.inode(dir_inum);
    let mut empty = true;
    for_each_slot(image, &dir_inode, |_block, _slot, de| {
        if de.is_occupied() {
            empty = false;
            false
        } else {
            true
        }
    });
    empty
}

/// Calls `emit(name, inode)` for every occupied entry of `dir_inum`, in
/// on-disk order. Stops early if `emit` returns `false`.
pub fn list_entries<F>(image: &FsImage, dir_inum: u32, mut emit: F)
where
    F: FnMut(&str, u32) -> bool,
{
    let dir_inode = image.inode(dir_inum);
    for_each_slot(image, &dir_inode, |_block, _slot, de| {
        if de.is_occupied() {
            emit(de.name_str(), de.inode)
        } else {
            true
        }
    });
}

/// Adds a new directory entry for `path`, allocating and initializing a
/// fresh inode. Returns the new inode's number.
pub fn add_entry(
    image: &mut FsImage,
    path: &str,
    mode: u32,
    initial_links: u16,
    clock: &dyn Clock,
) -> Result<u32> {
    let (parent_path, leaf) = split_parent(path);
    if leaf.is_empty() || leaf.len() > NAME_MAX - 1 {
        return Err(Error::NameTooLong);
    }
    if image.superblock().free_inodes == 0 {
        return Err(Error::NoSpace);
    }

    let parent_inum = resolve(image, parent_path)?;
    let mut parent = image.inode(parent_inum);
    if !parent.is_dir() {
        return Err(Error::NotDir);
    }
    if lookup_entry(image, parent_inum, leaf).is_some() {
        return Err(Error::Exists);
    }

    let creating_dir = mode & crate::layout::S_IFMT == S_IFDIR;
    if creating_dir {
        parent.links += 1;
    }

    match place_entry(image, parent_inum, &mut parent, leaf) {
        Ok(()) => {}
        Err(e) => {
            if creating_dir {
                parent.links -= 1;
                image.set_inode(parent_inum, &parent);
            }
            return Err(e);
        }
    }
    image.set_inode(parent_inum, &parent);

    let new_inum = find_free_inode(image).ok_or(Error::NoSpace)?;
    init_inode(image, new_inum, mode, initial_links, clock)?;

    // Now that the inode number is known, write it into the slot reserved
    // by `place_entry` (which only knew the name at that point).
    bind_entry(image, parent_inum, leaf, new_inum);

    Ok(new_inum)
}

/// Writes `(0, leaf)` into the first empty slot of `parent`, growing the
/// directory by one block first if every existing slot is occupied.
fn place_entry(image: &mut FsImage, _parent_inum: u32, parent: &mut Inode, leaf: &str) -> Result<()> {
    let mut target: Option<(u32, usize)> = None;
    for_each_slot(image, parent, |block, slot, de| {
        if !de.is_occupied() {
            target = Some((block, slot));
            false
        } else {
            true
        }
    });
    if let Some((block, slot)) = target {
        let mut entry = DirEntry::empty();
        entry.set_name(leaf);
        image.set_dirent_at(block, slot, &entry);
        return Ok(());
    }

    grow_inode(image, parent, BLOCK_SIZE as u64)?;
    parent.size += BLOCK_SIZE as u64;
    let last_block = BlockIter::new(image, *parent)
        .last()
        .expect("grow_inode just added a block");
    let mut entry = DirEntry::empty();
    entry.set_name(leaf);
    image.set_dirent_at(last_block, 0, &entry);
    Ok(())
}

fn bind_entry(image: &mut FsImage, dir_inum: u32, leaf: &str, inum: u32) {
    let dir_inode = image.inode(dir_inum);
    let mut target: Option<(u32, usize)> = None;
    for_each_slot(image, &dir_inode, |block, slot, de| {
        if de.is_occupied() && de.name_str() == leaf && de.inode == 0 {
            target = Some((block, slot));
            false
        } else {
            true
        }
    });
    if let Some((block, slot)) = target {
        let mut entry = image.dirent_at(block, slot);
        entry.inode = inum;
        image.set_dirent_at(block, slot, &entry);
    }
}

/// Removes the directory entry at `path` and frees its inode once its link
/// count drops to zero.
pub fn remove_entry(image: &mut FsImage, path: &str) -> Result<()> {
    let (parent_path, leaf) = split_parent(path);
    let parent_inum = resolve(image, parent_path)?;
    let target_inum = lookup_entry(image, parent_inum, leaf).ok_or(Error::NotFound)?;

    let mut target = image.inode(target_inum);
    let mut parent = image.inode(parent_inum);

    if target.is_dir() {
        target.links = target.links.saturating_sub(1);
        parent.links = parent.links.saturating_sub(1);
    }
    target.links = target.links.saturating_sub(1);

    let mut slot_to_clear: Option<(u32, usize)> = None;
    for_each_slot(image, &parent, |block, slot, de| {
        if de.is_occupied() && de.name_str() == leaf {
            slot_to_clear = Some((block, slot));
            false
        } else {
            true
        }
    });
    debug_assert!(slot_to_clear.is_some(), "resolved entry vanished during removal");
    if let Some((block, slot)) = slot_to_clear {
        image.clear_dirent_at(block, slot);
    }

    image.set_inode(parent_inum, &parent);

    if target.links == 0 {
        free_inode_blocks(image, &mut target);
        let mut sb = image.superblock();
        sb.free_inodes += 1;
        image.set_superblock(&sb);
    }
    image.set_inode(target_inum, &target);

    Ok(())
}

fn free_inode_blocks(image: &mut FsImage, inode: &mut Inode) {
    let num_extents = inode.num_extents;
    for i in 0..num_extents {
        let ext = image.extent_at(inode, i as usize);
        crate::bitmap::mark(image, ext.start, ext.count, false);
        let mut sb = image.superblock();
        sb.free_data_blocks += ext.count;
        image.set_superblock(&sb);
    }
    if num_extents as usize > crate::layout::INLINE_EXTENTS {
        crate::bitmap::mark(image, inode.indirect, 1, false);
        let mut sb = image.superblock();
        sb.free_data_blocks += 1;
        image.set_superblock(&sb);
        inode.indirect = 0;
    }
    inode.num_extents = 0;
    inode.size = 0;
}
