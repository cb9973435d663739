//! Fixed two-pass mask cleanup.
//!
//! Detection output is speckled; these passes drop isolated marks and then
//! regrow what survives by one pixel. Neither pass evaluates the outermost
//! row or column, and each returns a fresh mask.

use crate::mask::Mask;

/// Marked 8-neighbors a watermark pixel needs to survive erosion.
const WATERMARK_MIN_NEIGHBORS: usize = 2;
/// Marked 8-neighbors a text pixel needs to survive erosion.
const TEXT_MIN_NEIGHBORS: usize = 1;

/// Orthogonal offsets used for the watermark dilation.
const ORTHOGONAL: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
/// Offsets used for the text dilation: thicken strokes rightward and downward.
const TEXT_GROWTH: [(i64, i64); 2] = [(1, 0), (0, 1)];

/// Clean a watermark mask: erode with the 2-neighbor rule, then dilate 4-connected.
#[must_use]
pub fn clean(mask: &Mask) -> Mask {
    let eroded = erode(mask, WATERMARK_MIN_NEIGHBORS);
    dilate(&eroded, &ORTHOGONAL)
}

/// Clean a text mask: drop fully isolated marks, then grow right and down.
///
/// Text strokes are thinner than watermark blobs, so erosion only needs one
/// marked neighbor.
#[must_use]
pub fn clean_text(mask: &Mask) -> Mask {
    let eroded = erode(mask, TEXT_MIN_NEIGHBORS);
    dilate(&eroded, &TEXT_GROWTH)
}

/// Keep interior marks with at least `min_neighbors` marked 8-neighbors.
fn erode(mask: &Mask, min_neighbors: usize) -> Mask {
    let (w, h) = (mask.width(), mask.height());
    let mut result = Mask::new(w, h);

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            if mask.get(x, y) && mask.marked_neighbors(x, y) >= min_neighbors {
                result.set(x, y, true);
            }
        }
    }

    result
}

/// Mark every interior mark and its neighbors at `offsets`.
fn dilate(mask: &Mask, offsets: &[(i64, i64)]) -> Mask {
    let (w, h) = (mask.width(), mask.height());
    let mut result = Mask::new(w, h);

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            if !mask.get(x, y) {
                continue;
            }
            result.set(x, y, true);
            for &(dx, dy) in offsets {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                // Interior pixels always have in-range neighbors.
                if let (Ok(nx), Ok(ny)) = (u32::try_from(nx), u32::try_from(ny)) {
                    result.set(nx, ny, true);
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(size: u32, x0: u32, y0: u32, side: u32) -> Mask {
        let mut mask = Mask::new(size, size);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn clean_preserves_length() {
        let mask = block(12, 3, 3, 4);
        assert_eq!(clean(&mask).len(), mask.len());
        assert_eq!(clean_text(&mask).len(), mask.len());
    }

    #[test]
    fn clean_keeps_solid_block_and_adds_orthogonal_ring() {
        // 5x5 block at (3..8, 3..8) on an 11x11 canvas.
        let mask = block(11, 3, 3, 5);
        let cleaned = clean(&mask);

        // Every block pixel has >= 3 marked neighbors, so the block survives.
        for y in 3..8 {
            for x in 3..8 {
                assert!(cleaned.get(x, y), "block pixel ({x},{y}) lost");
            }
        }
        // One-pixel orthogonal ring on each side.
        for i in 3..8 {
            assert!(cleaned.get(2, i));
            assert!(cleaned.get(8, i));
            assert!(cleaned.get(i, 2));
            assert!(cleaned.get(i, 8));
        }
        // 4-connected dilation never reaches the diagonal corners.
        assert!(!cleaned.get(2, 2));
        assert!(!cleaned.get(8, 8));
        assert_eq!(cleaned.count(), 25 + 4 * 5);
    }

    #[test]
    fn clean_twice_grows_at_most_one_more_ring() {
        let mask = block(15, 5, 5, 5);
        let once = clean(&mask);
        let twice = clean(&once);
        for (x, y) in twice.marked() {
            let near = (4..=10).contains(&x) && (4..=10).contains(&y)
                || (3..=11).contains(&x) && (5..=9).contains(&y)
                || (5..=9).contains(&x) && (3..=11).contains(&y);
            assert!(near, "({x},{y}) marked beyond one extra ring");
        }
    }

    #[test]
    fn clean_drops_isolated_marks() {
        let mut mask = Mask::new(9, 9);
        mask.set(4, 4, true);
        mask.set(1, 7, true);
        mask.set(2, 7, true);
        assert!(!clean(&mask).any());
    }

    #[test]
    fn clean_ignores_border_marks() {
        let mut mask = Mask::new(6, 6);
        for x in 0..6 {
            mask.set(x, 0, true);
        }
        assert!(!clean(&mask).any());
    }

    #[test]
    fn clean_text_keeps_pairs_and_grows_right_and_down() {
        let mut mask = Mask::new(8, 8);
        mask.set(3, 3, true);
        mask.set(4, 3, true);
        mask.set(6, 6, true);

        let cleaned = clean_text(&mask);
        assert!(cleaned.get(3, 3));
        assert!(cleaned.get(4, 3));
        assert!(cleaned.get(5, 3));
        assert!(cleaned.get(3, 4));
        assert!(cleaned.get(4, 4));
        assert!(!cleaned.get(2, 3));
        assert!(!cleaned.get(3, 2));
        // Isolated mark dropped.
        assert!(!cleaned.get(6, 6));
        assert_eq!(cleaned.count(), 5);
    }

    #[test]
    fn clean_does_not_mutate_input() {
        let mask = block(9, 2, 2, 3);
        let before = mask.clone();
        let _ = clean(&mask);
        let _ = clean_text(&mask);
        assert_eq!(mask, before);
    }
}
