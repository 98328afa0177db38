//! Resolves `/`-separated paths to inode numbers.

use crate::dir::lookup_entry;
use crate::error::{Error, Result};
use crate::image::FsImage;
use crate::layout::{NAME_MAX, PATH_MAX};

pub const ROOT_INODE: u32 = 0;

/// Resolves an absolute path to an inode number, walking from the root and
/// following one directory entry per non-empty component. `/`, `/a/`, and
/// `//a` all resolve the same as `/a`.
pub fn resolve(image: &FsImage, path: &str) -> Result<u32> {
    if path.len() > PATH_MAX - 1 {
        return Err(Error::NameTooLong);
    }

    let mut current = ROOT_INODE;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if component.len() > NAME_MAX - 1 {
            return Err(Error::NameTooLong);
        }
        let inode = image.inode(current);
        if !inode.is_dir() {
            return Err(Error::NotDir);
        }
        match lookup_entry(image, current, component) {
            Some(next) => current = next,
            None => return Err(Error::NotFound),
        }
    }
    Ok(current)
}

/// Splits `path` into its parent directory path and leaf component, e.g.
/// `/a/b/c` -> (`/a/b`, `c`), `/a` -> (`/`, `a`).
pub fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => {
            let parent = &trimmed[..=idx];
            let leaf = &trimmed[idx + 1..];
            let parent = if parent.is_empty() { "/" } else { parent };
            (parent, leaf)
        }
        None => ("/", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_parent_basic() {
        assert_eq!(split_parent("/a"), ("/", "a"));
        assert_eq!(split_parent("/a/b"), ("/a", "b"));
        assert_eq!(split_parent("/a/b/"), ("/a", "b"));
    }
}
