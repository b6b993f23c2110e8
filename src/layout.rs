//! Collision-free widget placement on the dashboard grid.
//!
//! Boxes are measured in grid units on a fixed 12-column canvas. Placement either honors an
//! explicitly requested position (when it is in bounds and free) or scans row-major for the
//! first free slot.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LayoutError;

/// Number of columns on every page.
pub const GRID_COLUMNS: u32 = 12;

/// Lowest row edge a box may reach. Every committed box keeps `y + h` at or above it.
pub const MAX_GRID_ROWS: u32 = 1_000_000;

/// Extra rows scanned below the lowest box before falling back.
pub const DEFAULT_SCAN_MARGIN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl GridBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    /// Axis-aligned rectangle intersection.
    pub fn overlaps(&self, other: &GridBox) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// True when the box satisfies the grid bounds: `w` in `[1,12]`, `h >= 1`, `x <= 12 - w`
    /// and `y + h <= MAX_GRID_ROWS`.
    pub fn in_bounds(&self) -> bool {
        (1..=GRID_COLUMNS).contains(&self.w)
            && self.h >= 1
            && self.right() <= GRID_COLUMNS
            && self.bottom() <= MAX_GRID_ROWS
    }
}

/// Clamp a width to `[1, 12]`.
pub fn clamp_width(w: i64) -> u32 {
    w.clamp(1, GRID_COLUMNS as i64) as u32
}

/// Clamp a height to `[1, MAX_GRID_ROWS]`.
pub fn clamp_height(h: i64) -> u32 {
    h.clamp(1, MAX_GRID_ROWS as i64) as u32
}

/// Clamp an arbitrary box into bounds: size first, then `x` so the box fits the row and `y` so
/// it ends above `MAX_GRID_ROWS`.
pub fn clamp_box(x: i64, y: i64, w: i64, h: i64) -> GridBox {
    let w = clamp_width(w);
    let h = clamp_height(h);
    let max_x = (GRID_COLUMNS - w) as i64;
    GridBox {
        x: x.clamp(0, max_x) as u32,
        y: y.clamp(0, (MAX_GRID_ROWS - h) as i64) as u32,
        w,
        h,
    }
}

pub fn collides(candidate: &GridBox, existing: &[GridBox]) -> bool {
    existing.iter().any(|b| candidate.overlaps(b))
}

fn max_bottom(existing: &[GridBox]) -> u32 {
    existing.iter().map(GridBox::bottom).max().unwrap_or(0)
}

/// Placement engine. Only the scan margin is tunable; the column count is fixed.
#[derive(Debug, Clone, Copy)]
pub struct GridLayout {
    scan_margin: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            scan_margin: DEFAULT_SCAN_MARGIN,
        }
    }
}

impl GridLayout {
    pub fn new(scan_margin: u32) -> Self {
        Self { scan_margin }
    }

    /// Find a position for a `width` x `height` box among `existing`.
    ///
    /// A requested position is honored verbatim when it is fully in bounds and free. Otherwise
    /// the first free slot in row-major order wins; if the scan range is exhausted the box is
    /// appended below everything at `(0, max bottom)`.
    pub fn place(
        &self,
        existing: &[GridBox],
        width: i64,
        height: i64,
        requested: Option<(i64, i64)>,
    ) -> GridBox {
        let w = clamp_width(width);
        let h = clamp_height(height);

        if let Some((rx, ry)) = requested {
            if rx >= 0
                && ry >= 0
                && rx <= (GRID_COLUMNS - w) as i64
                && ry <= (MAX_GRID_ROWS - h) as i64
            {
                let candidate = GridBox::new(rx as u32, ry as u32, w, h);
                if !collides(&candidate, existing) {
                    debug!(x = rx, y = ry, w, h, "honoring requested grid position");
                    return candidate;
                }
            }
        }

        let bottom = max_bottom(existing);
        let scan_limit = bottom.saturating_add(h).saturating_add(self.scan_margin);
        for y in 0..=scan_limit {
            for x in 0..=(GRID_COLUMNS - w) {
                let candidate = GridBox::new(x, y, w, h);
                if !collides(&candidate, existing) {
                    return candidate;
                }
            }
        }

        debug!(bottom, w, h, "no free slot in scan range, appending below");
        GridBox::new(0, bottom.min(MAX_GRID_ROWS - h), w, h)
    }

    /// Re-validate a moved or resized box. The clamped box is kept when free, otherwise it is
    /// re-placed with its clamped position as the request.
    pub fn settle(&self, existing: &[GridBox], x: i64, y: i64, w: i64, h: i64) -> GridBox {
        let clamped = clamp_box(x, y, w, h);
        if !collides(&clamped, existing) {
            return clamped;
        }
        self.place(
            existing,
            clamped.w as i64,
            clamped.h as i64,
            Some((clamped.x as i64, clamped.y as i64)),
        )
    }
}

/// Free-function form of [`GridLayout::place`] with the default scan margin.
pub fn place(
    existing: &[GridBox],
    width: i64,
    height: i64,
    requested: Option<(i64, i64)>,
) -> GridBox {
    GridLayout::default().place(existing, width, height, requested)
}

/// True if no two boxes overlap.
pub fn is_collision_free(boxes: &[GridBox]) -> bool {
    for (i, a) in boxes.iter().enumerate() {
        for b in &boxes[i + 1..] {
            if a.overlaps(b) {
                return false;
            }
        }
    }
    true
}

/// Edge a group of boxes is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Alignment {
    Left,
    Right,
    Top,
    Bottom,
}

/// Check target positions for a group of boxes moving together. All or nothing: the first
/// target that leaves the grid or overlaps `fixed` (or an earlier target) fails the move.
pub fn validate_group(
    targets: &[(i64, i64, u32, u32)],
    fixed: &[GridBox],
) -> Result<Vec<GridBox>, LayoutError> {
    let mut placed: Vec<GridBox> = Vec::with_capacity(targets.len());
    for &(x, y, w, h) in targets {
        let fits = x >= 0
            && y >= 0
            && y <= MAX_GRID_ROWS.saturating_sub(h) as i64
            && x <= GRID_COLUMNS.saturating_sub(w) as i64;
        let candidate = GridBox::new(
            x.clamp(0, GRID_COLUMNS as i64) as u32,
            y.clamp(0, MAX_GRID_ROWS as i64) as u32,
            w,
            h,
        );
        if !fits || !candidate.in_bounds() {
            return Err(LayoutError::OutOfBounds { x, y, w, h });
        }
        if collides(&candidate, fixed) || collides(&candidate, &placed) {
            return Err(LayoutError::Overlap {
                x: candidate.x,
                y: candidate.y,
            });
        }
        placed.push(candidate);
    }
    Ok(placed)
}

/// Shift every box in a group by `(dx, dy)`.
pub fn translate_group(
    group: &[GridBox],
    dx: i64,
    dy: i64,
    fixed: &[GridBox],
) -> Result<Vec<GridBox>, LayoutError> {
    let targets: Vec<_> = group
        .iter()
        .map(|b| (dx.saturating_add(b.x as i64), dy.saturating_add(b.y as i64), b.w, b.h))
        .collect();
    validate_group(&targets, fixed)
}

/// Align a group on one edge: the leftmost left, rightmost right, topmost top or lowest bottom.
pub fn align_group(
    group: &[GridBox],
    alignment: Alignment,
    fixed: &[GridBox],
) -> Result<Vec<GridBox>, LayoutError> {
    let targets: Vec<_> = match alignment {
        Alignment::Left => {
            let left = group.iter().map(|b| b.x).min().unwrap_or(0) as i64;
            group.iter().map(|b| (left, b.y as i64, b.w, b.h)).collect()
        }
        Alignment::Right => {
            let right = group.iter().map(|b| b.x + b.w).max().unwrap_or(0) as i64;
            group
                .iter()
                .map(|b| (right - b.w as i64, b.y as i64, b.w, b.h))
                .collect()
        }
        Alignment::Top => {
            let top = group.iter().map(|b| b.y).min().unwrap_or(0) as i64;
            group.iter().map(|b| (b.x as i64, top, b.w, b.h)).collect()
        }
        Alignment::Bottom => {
            let bottom = max_bottom(group) as i64;
            group
                .iter()
                .map(|b| (b.x as i64, bottom - b.h as i64, b.w, b.h))
                .collect()
        }
    };
    validate_group(&targets, fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_edges_touching_do_not_collide() {
        let a = GridBox::new(0, 0, 6, 2);
        let b = GridBox::new(6, 0, 6, 2);
        let c = GridBox::new(0, 2, 6, 2);
        assert!(!a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.overlaps(&GridBox::new(5, 1, 2, 2)));
    }

    #[test]
    fn test_place_on_empty_grid() {
        assert_eq!(place(&[], 4, 3, None), GridBox::new(0, 0, 4, 3));
    }

    #[test]
    fn test_place_first_fit_row_major() {
        let existing = [GridBox::new(0, 0, 6, 2)];
        assert_eq!(place(&existing, 6, 2, None), GridBox::new(6, 0, 6, 2));
        let existing = [GridBox::new(0, 0, 6, 2), GridBox::new(6, 0, 6, 2)];
        assert_eq!(place(&existing, 4, 2, None), GridBox::new(0, 2, 4, 2));
    }

    #[test]
    fn test_place_clamps_size() {
        let b = place(&[], 20, 0, None);
        assert_eq!((b.w, b.h), (12, 1));
        let b = place(&[], -3, 2, None);
        assert_eq!(b.w, 1);
    }

    #[test]
    fn test_requested_position_honored_when_free() {
        let existing = [GridBox::new(0, 0, 6, 2)];
        assert_eq!(
            place(&existing, 3, 2, Some((8, 5))),
            GridBox::new(8, 5, 3, 2)
        );
    }

    #[test]
    fn test_requested_position_rejected_when_out_of_bounds_or_colliding() {
        let existing = [GridBox::new(0, 0, 6, 2)];
        assert_eq!(
            place(&existing, 6, 2, Some((10, 0))),
            GridBox::new(6, 0, 6, 2)
        );
        assert_eq!(
            place(&existing, 6, 2, Some((2, 1))),
            GridBox::new(6, 0, 6, 2)
        );
        assert_eq!(
            place(&existing, 6, 2, Some((-1, 0))),
            GridBox::new(6, 0, 6, 2)
        );
    }

    #[test]
    fn test_fills_gap_before_appending() {
        let existing = [GridBox::new(0, 0, 12, 2), GridBox::new(0, 2, 4, 2)];
        assert_eq!(place(&existing, 8, 2, None), GridBox::new(4, 2, 8, 2));
    }

    #[test]
    fn test_settle_clamps_and_repositions() {
        let existing = [GridBox::new(0, 0, 6, 2)];
        assert_eq!(
            GridLayout::default().settle(&existing, 10, 4, 6, 2),
            GridBox::new(6, 4, 6, 2)
        );
        assert_eq!(
            GridLayout::default().settle(&existing, 3, 0, 6, 2),
            GridBox::new(6, 0, 6, 2)
        );
    }

    #[test]
    fn test_clamp_box_keeps_in_bounds() {
        let b = clamp_box(11, -4, 5, 3);
        assert!(b.in_bounds());
        assert_eq!(b, GridBox::new(7, 0, 5, 3));
    }

    #[test]
    fn test_translate_group_all_or_nothing() {
        let group = [GridBox::new(0, 0, 4, 2), GridBox::new(4, 0, 4, 2)];
        let fixed = [GridBox::new(8, 4, 4, 2)];
        let moved = translate_group(&group, 0, 2, &fixed).unwrap();
        assert_eq!(moved[1], GridBox::new(4, 2, 4, 2));

        assert!(matches!(
            translate_group(&group, 5, 0, &fixed),
            Err(LayoutError::OutOfBounds { .. })
        ));
        assert!(matches!(
            translate_group(&group, 4, 4, &fixed),
            Err(LayoutError::Overlap { .. })
        ));
    }

    #[test]
    fn test_align_group_edges() {
        let group = [GridBox::new(1, 0, 4, 2), GridBox::new(6, 3, 2, 1)];
        let left = align_group(&group, Alignment::Left, &[]).unwrap();
        assert_eq!((left[0].x, left[1].x), (1, 1));
        let right = align_group(&group, Alignment::Right, &[]).unwrap();
        assert_eq!((right[0].x, right[1].x), (4, 6));
        let top = align_group(&group, Alignment::Top, &[]).unwrap();
        assert_eq!((top[0].y, top[1].y), (0, 0));
        let bottom = align_group(&group, Alignment::Bottom, &[]).unwrap();
        assert_eq!((bottom[0].y, bottom[1].y), (2, 3));

        // Stacked boxes cannot share a top edge.
        let stacked = [GridBox::new(0, 0, 4, 2), GridBox::new(2, 2, 4, 2)];
        assert!(align_group(&stacked, Alignment::Top, &[]).is_err());
    }
}
