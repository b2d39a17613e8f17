// ============================================================================
// COORDINATE SPACE – arbitrary-precision cells, fixed-precision pixels
// ============================================================================

use std::fmt;

use num::bigint::BigInt;
use num::rational::Ratio;
use num::{Signed, ToPrimitive};

/// Largest absolute cell coordinate that any single-cell edit may touch.
pub const EDIT_LIMIT: i64 = 1_000_000_000;

/// Most zoomed-out magnification (2^24 cells per pixel).
pub const MIN_MAG: i32 = -24;
/// Most zoomed-in magnification (32 pixels per cell, the largest icon size).
pub const MAX_MAG: i32 = 5;

// ============================================================================
// CELLS
// ============================================================================

/// A cell position on the conceptually unbounded grid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: BigInt,
    pub y: BigInt,
}

impl CellCoord {
    pub fn new(x: impl Into<BigInt>, y: impl Into<BigInt>) -> Self {
        Self { x: x.into(), y: y.into() }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    /// Machine-width form, if both components fit.
    pub fn to_i32(&self) -> Option<(i32, i32)> {
        Some((self.x.to_i32()?, self.y.to_i32()?))
    }

    pub fn within_edit_limits(&self) -> bool {
        !outside_limits(&self.x) && !outside_limits(&self.y)
    }
}

/// True if `v` lies outside the ±10^9 editable range.
pub fn outside_limits(v: &BigInt) -> bool {
    *v < BigInt::from(-EDIT_LIMIT) || *v > BigInt::from(EDIT_LIMIT)
}

/// Inclusive rectangle of cells. `right < left` (or `bottom < top`) means empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellRect {
    pub left: BigInt,
    pub top: BigInt,
    pub right: BigInt,
    pub bottom: BigInt,
}

impl CellRect {
    pub fn new(
        left: impl Into<BigInt>,
        top: impl Into<BigInt>,
        right: impl Into<BigInt>,
        bottom: impl Into<BigInt>,
    ) -> Self {
        Self {
            left: left.into(),
            top: top.into(),
            right: right.into(),
            bottom: bottom.into(),
        }
    }

    /// Rectangle of `width × height` cells with the given top-left cell.
    pub fn from_size(left: impl Into<BigInt>, top: impl Into<BigInt>, width: u64, height: u64) -> Self {
        let left = left.into();
        let top = top.into();
        let right = &left + BigInt::from(width) - 1;
        let bottom = &top + BigInt::from(height) - 1;
        Self { left, top, right, bottom }
    }

    pub fn is_empty(&self) -> bool {
        self.right < self.left || self.bottom < self.top
    }

    pub fn width(&self) -> BigInt {
        &self.right - &self.left + 1
    }

    pub fn height(&self) -> BigInt {
        &self.bottom - &self.top + 1
    }

    pub fn top_left(&self) -> CellCoord {
        CellCoord::new(self.left.clone(), self.top.clone())
    }

    pub fn bottom_right(&self) -> CellCoord {
        CellCoord::new(self.right.clone(), self.bottom.clone())
    }

    pub fn contains(&self, cell: &CellCoord) -> bool {
        cell.x >= self.left && cell.x <= self.right && cell.y >= self.top && cell.y <= self.bottom
    }

    /// True if the two rectangles share at least one cell.
    pub fn intersects(&self, other: &CellRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Grow (or shrink, for negative `margin`) by `margin` cells on every side.
    pub fn inflate(&self, margin: i64) -> CellRect {
        let m = BigInt::from(margin);
        CellRect {
            left: &self.left - &m,
            top: &self.top - &m,
            right: &self.right + &m,
            bottom: &self.bottom + &m,
        }
    }

    pub fn outside_limits(&self) -> bool {
        outside_limits(&self.left)
            || outside_limits(&self.top)
            || outside_limits(&self.right)
            || outside_limits(&self.bottom)
    }

    /// Ok if every corner lies within the editable range.
    pub fn check_edit_limits(&self) -> Result<(), EditError> {
        if self.outside_limits() {
            Err(EditError::OutOfBounds)
        } else {
            Ok(())
        }
    }

    /// Machine-width copy; `None` if any edge does not fit in `i32`.
    pub fn to_box(&self) -> Option<CellBox> {
        Some(CellBox {
            left: self.left.to_i32()?,
            top: self.top.to_i32()?,
            right: self.right.to_i32()?,
            bottom: self.bottom.to_i32()?,
        })
    }
}

/// Inclusive cell rectangle already known to lie within the editable range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl CellBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64 + 1
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64 + 1
    }

    pub fn is_empty(&self) -> bool {
        self.right < self.left || self.bottom < self.top
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn to_rect(&self) -> CellRect {
        CellRect::new(self.left, self.top, self.right, self.bottom)
    }
}

// ============================================================================
// PIXELS
// ============================================================================

/// Pixel rectangle in framebuffer space; `x + width` is exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(width: i32, height: i32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
        }
    }

    /// Shrink (negative) or grow (positive) by `amount` pixels on every side.
    pub fn inflate(&self, amount: i32) -> PixelRect {
        PixelRect::new(
            self.x - amount,
            self.y - amount,
            self.width + 2 * amount,
            self.height + 2 * amount,
        )
    }
}

// ============================================================================
// BOUNDED GRID
// ============================================================================

/// Optional finite grid. A zero dimension means unbounded along that axis.
///
/// A bounded axis of size `n` spans `-(n/2) ..= -(n/2) + n - 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridExtent {
    pub width: u32,
    pub height: u32,
}

impl GridExtent {
    pub const UNBOUNDED: GridExtent = GridExtent { width: 0, height: 0 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_bounded(&self) -> bool {
        self.width > 0 || self.height > 0
    }

    fn span(size: u32) -> Option<(i64, i64)> {
        if size == 0 {
            return None;
        }
        let lo = -(size as i64 / 2);
        Some((lo, lo + size as i64 - 1))
    }

    /// Horizontal `(left, right)` edges, if bounded.
    pub fn columns(&self) -> Option<(i64, i64)> {
        Self::span(self.width)
    }

    /// Vertical `(top, bottom)` edges, if bounded.
    pub fn rows(&self) -> Option<(i64, i64)> {
        Self::span(self.height)
    }

    /// Edges as `(left, top, right, bottom)`, using `i32` sentinels for
    /// unbounded axes. Used to clip loops over machine-width cells.
    pub fn clip_box(&self) -> CellBox {
        let (l, r) = self
            .columns()
            .map(|(l, r)| (clamp_i64(l), clamp_i64(r)))
            .unwrap_or((i32::MIN, i32::MAX));
        let (t, b) = self
            .rows()
            .map(|(t, b)| (clamp_i64(t), clamp_i64(b)))
            .unwrap_or((i32::MIN, i32::MAX));
        CellBox::new(l, t, r, b)
    }

    pub fn contains(&self, cell: &CellCoord) -> bool {
        let inside = |v: &BigInt, span: Option<(i64, i64)>| match span {
            Some((lo, hi)) => *v >= BigInt::from(lo) && *v <= BigInt::from(hi),
            None => true,
        };
        inside(&cell.x, self.columns()) && inside(&cell.y, self.rows())
    }

    /// Nearest cell inside the extent.
    pub fn clamp(&self, cell: &CellCoord) -> CellCoord {
        let clamp = |v: &BigInt, span: Option<(i64, i64)>| match span {
            Some((lo, hi)) => v.clone().max(BigInt::from(lo)).min(BigInt::from(hi)),
            None => v.clone(),
        };
        CellCoord {
            x: clamp(&cell.x, self.columns()),
            y: clamp(&cell.y, self.rows()),
        }
    }

    /// True if `rect` shares no cell with the extent.
    pub fn excludes(&self, rect: &CellRect) -> bool {
        let outside = |lo: &BigInt, hi: &BigInt, span: Option<(i64, i64)>| match span {
            Some((a, b)) => *hi < BigInt::from(a) || *lo > BigInt::from(b),
            None => false,
        };
        outside(&rect.left, &rect.right, self.columns()) || outside(&rect.top, &rect.bottom, self.rows())
    }
}

fn clamp_i64(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

// ============================================================================
// MAPPING
// ============================================================================

/// Multiply by `2^p`. Negative powers shift right, rounding toward −∞.
pub fn mul_pow2(v: &BigInt, p: i32) -> BigInt {
    if p > 0 {
        v << (p as usize)
    } else if p < 0 {
        v >> ((-p) as usize)
    } else {
        v.clone()
    }
}

/// Narrow to `i32`, saturating to `i32::MIN`/`i32::MAX` on overflow.
pub fn saturate_i32(v: &BigInt) -> i32 {
    match v.to_i32() {
        Some(n) => n,
        None if v.is_negative() => i32::MIN,
        None => i32::MAX,
    }
}

/// Pixel of the top-left corner of `cell`, given the cell at pixel (0,0).
///
/// The difference is taken in arbitrary precision before scaling, so cells near
/// the edit limits map exactly. Off-screen results that do not fit in `i32`
/// come back as the `i32::MIN`/`i32::MAX` sentinels.
pub fn to_pixel(cell: &CellCoord, origin: &CellCoord, mag: i32) -> (i32, i32) {
    let dx = mul_pow2(&(&cell.x - &origin.x), mag);
    let dy = mul_pow2(&(&cell.y - &origin.y), mag);
    (saturate_i32(&dx), saturate_i32(&dy))
}

/// Cell under pixel `(px, py)`, given the cell at pixel (0,0).
pub fn to_cell(px: i32, py: i32, origin: &CellCoord, mag: i32) -> CellCoord {
    CellCoord {
        x: mul_pow2(&BigInt::from(px), -mag) + &origin.x,
        y: mul_pow2(&BigInt::from(py), -mag) + &origin.y,
    }
}

/// Cells covered by one pixel along each axis.
pub fn cells_per_pixel(mag: i32) -> Ratio<u64> {
    let pow = 1u64 << mag.unsigned_abs().min(63);
    if mag >= 0 {
        Ratio::new(1, pow)
    } else {
        Ratio::from_integer(pow)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// An edit touched a cell beyond ±10^9.
    OutOfBounds,
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::OutOfBounds => write!(f, "Pattern is outside +/- 10^9 boundary"),
        }
    }
}

impl std::error::Error for EditError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_pow2_floors_negative_values() {
        assert_eq!(mul_pow2(&BigInt::from(-3), -1), BigInt::from(-2));
        assert_eq!(mul_pow2(&BigInt::from(3), -1), BigInt::from(1));
        assert_eq!(mul_pow2(&BigInt::from(-3), 2), BigInt::from(-12));
    }

    #[test]
    fn to_pixel_saturates_far_cells() {
        let origin = CellCoord::new(0, 0);
        let far = CellCoord::new(BigInt::from(1) << 40usize, -(BigInt::from(1) << 40usize));
        assert_eq!(to_pixel(&far, &origin, 0), (i32::MAX, i32::MIN));
    }

    #[test]
    fn to_pixel_is_exact_near_edit_limit() {
        let origin = CellCoord::new(EDIT_LIMIT - 10, -EDIT_LIMIT);
        let cell = CellCoord::new(EDIT_LIMIT, -EDIT_LIMIT + 3);
        assert_eq!(to_pixel(&cell, &origin, 2), (40, 12));
        assert_eq!(to_pixel(&cell, &origin, -1), (5, 1));
    }

    #[test]
    fn to_cell_floors_at_fractional_scales() {
        let origin = CellCoord::new(100, 100);
        assert_eq!(to_cell(7, 0, &origin, 2), CellCoord::new(101, 100));
        assert_eq!(to_cell(-1, 0, &origin, 2), CellCoord::new(99, 100));
        assert_eq!(to_cell(3, 1, &origin, -3), CellCoord::new(124, 108));
    }

    #[test]
    fn cells_per_pixel_matches_magnification() {
        assert_eq!(cells_per_pixel(0), Ratio::from_integer(1));
        assert_eq!(cells_per_pixel(-4), Ratio::from_integer(16));
        assert_eq!(cells_per_pixel(3), Ratio::new(1, 8));
    }

    #[test]
    fn bounded_grid_edges() {
        let grid = GridExtent::new(10, 7);
        assert_eq!(grid.columns(), Some((-5, 4)));
        assert_eq!(grid.rows(), Some((-3, 3)));
        assert!(grid.contains(&CellCoord::new(4, -3)));
        assert!(!grid.contains(&CellCoord::new(5, 0)));
        assert_eq!(grid.clamp(&CellCoord::new(99, -99)), CellCoord::new(4, -3));

        let half = GridExtent::new(0, 4);
        assert_eq!(half.clip_box(), CellBox::new(i32::MIN, -2, i32::MAX, 1));
        assert!(half.excludes(&CellRect::new(0, 2, 5, 9)));
        assert!(!half.excludes(&CellRect::new(-1_000, 1, 1_000, 9)));
    }

    #[test]
    fn edit_limits() {
        assert!(CellRect::new(-EDIT_LIMIT, 0, EDIT_LIMIT, 0).check_edit_limits().is_ok());
        assert_eq!(
            CellRect::new(0, 0, EDIT_LIMIT + 1, 0).check_edit_limits(),
            Err(EditError::OutOfBounds)
        );
    }

    #[test]
    fn pixel_rect_intersection() {
        let a = PixelRect::new(0, 0, 10, 10);
        assert_eq!(a.intersect(&PixelRect::new(5, -5, 10, 10)), Some(PixelRect::new(5, 0, 5, 5)));
        assert_eq!(a.intersect(&PixelRect::new(10, 0, 5, 5)), None);
        assert_eq!(a.inflate(-2), PixelRect::new(2, 2, 6, 6));
    }
}
