//! Bitmap scanning primitives, kept free of any inode/superblock knowledge
//! so they can be unit-tested against a bare bitmap.

use crate::image::FsImage;

/// Scans the data bitmap for the first maximal run of zero bits whose
/// length is at least `n_needed`, returning its first `n_needed` blocks.
/// If no such run exists, returns the single longest zero run found,
/// `(start, length)` with `length < n_needed` (or `(0, 0)` if the bitmap is
/// entirely ones). Ties between equal-length runs are broken by the run
/// that occurs first.
pub fn find_free_run(image: &FsImage, n_needed: u32) -> (u32, u32) {
    let total = image.layout().data_block_count;
    let mut best_start = 0u32;
    let mut best_len = 0u32;
    let mut run_start = 0u32;
    let mut run_len = 0u32;
    let mut in_run = false;

    for b in 0..total {
        if !image.bitmap_bit(b) {
            if !in_run {
                run_start = b;
                run_len = 0;
                in_run = true;
            }
            run_len += 1;
            if run_len >= n_needed {
                return (run_start, n_needed);
            }
            if run_len > best_len {
                best_start = run_start;
                best_len = run_len;
            }
        } else {
            in_run = false;
        }
    }

    (best_start, best_len)
}

/// Number of consecutive zero bits starting at bit `b`, up to the end of the
/// bitmap. `b` itself may be out of range, in which case the tail is empty.
pub fn tail_length(image: &FsImage, b: u32) -> u32 {
    let total = image.layout().data_block_count;
    let mut n = 0u32;
    let mut cur = b;
    while cur < total && !image.bitmap_bit(cur) {
        n += 1;
        cur += 1;
    }
    n
}

/// Sets or clears `count` bits starting at `start`. Callers are responsible
/// for updating `superblock.free_data_blocks` to match (kept outside this
/// function so batch operations update the counter once).
pub fn mark(image: &mut FsImage, start: u32, count: u32, value: bool) {
    for b in start..start + count {
        image.set_bitmap_bit(b, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format;
    use tempfile::NamedTempFile;

    fn fresh_image(inodes: u32, blocks: u64) -> FsImage {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file()
            .set_len(blocks * crate::layout::BLOCK_SIZE as u64)
            .unwrap();
        format::format(tmp.path(), inodes, false, false).unwrap();
        FsImage::open(tmp.path()).unwrap()
    }

    #[test]
    fn find_free_run_prefers_first_sufficient_run() {
        let mut image = fresh_image(16, 64);
        // Carve out: [free 3][used 1][free 10][used 1][free rest]
        mark(&mut image, 0, 3, true);
        mark(&mut image, 4, 10, true);
        let (start, len) = find_free_run(&image, 5);
        // bit 3 is free (len 1, too short), bits 4..14 used, so the first
        // run of >=5 starts after the used block at 14.
        assert_eq!(len, 5);
        assert!(start >= 14);
    }

    #[test]
    fn find_free_run_falls_back_to_longest() {
        let mut image = fresh_image(16, 64);
        let total = image.layout().data_block_count;
        mark(&mut image, 0, total, true);
        mark(&mut image, 2, 3, false);
        let (start, len) = find_free_run(&image, 100);
        assert_eq!(start, 2);
        assert_eq!(len, 3);
    }

    #[test]
    fn tail_length_counts_to_next_used_bit() {
        let mut image = fresh_image(16, 64);
        mark(&mut image, 5, 1, true);
        assert_eq!(tail_length(&image, 0), 5);
        assert_eq!(tail_length(&image, 6), image.layout().data_block_count - 6);
    }
}
