// ============================================================================
// VIEWPORT – pan position, magnification and pixel size of one layer's view
// ============================================================================

use num::bigint::BigInt;
use num::rational::Ratio;

use crate::coords::{
    self, CellCoord, CellRect, GridExtent, PixelRect, MAX_MAG, MIN_MAG,
};

/// Result of a zoom request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomOutcome {
    Zoomed,
    /// Already at the magnification limit; nothing changed.
    AtLimit,
}

/// A window onto the cell grid.
///
/// `position` is the cell at the pixel midpoint. `origin` (the cell at pixel
/// (0,0)) is derived from it whenever position, magnification or size change.
/// Every geometry change bumps `generation`, which overlay caches compare
/// against to know when their bitmaps are stale.
#[derive(Clone, Debug)]
pub struct Viewport {
    position: CellCoord,
    origin: CellCoord,
    mag: i32,
    width: i32,
    height: i32,
    min_mag: i32,
    max_mag: i32,
    extent: GridExtent,
    /// Pixels panned at mag > 0 that have not yet added up to a whole cell.
    residue: (i32, i32),
    generation: u64,
}

impl Viewport {
    pub fn new(width: i32, height: i32) -> Self {
        let mut view = Self {
            position: CellCoord::origin(),
            origin: CellCoord::origin(),
            mag: 0,
            width: width.max(1),
            height: height.max(1),
            min_mag: MIN_MAG,
            max_mag: MAX_MAG,
            extent: GridExtent::UNBOUNDED,
            residue: (0, 0),
            generation: 0,
        };
        view.reposition();
        view
    }

    /// Restrict magnification to `min ..= max` (clamped to the global limits).
    pub fn with_mag_limits(mut self, min: i32, max: i32) -> Self {
        self.set_mag_limits(min, max);
        self
    }

    /// Like `with_mag_limits`, in place. A magnification outside the new
    /// range is pulled into it.
    pub fn set_mag_limits(&mut self, min: i32, max: i32) {
        self.min_mag = min.clamp(MIN_MAG, MAX_MAG);
        self.max_mag = max.clamp(self.min_mag, MAX_MAG);
        self.mag = self.mag.clamp(self.min_mag, self.max_mag);
        self.reposition();
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn position(&self) -> &CellCoord {
        &self.position
    }

    /// Cell whose top-left corner sits at pixel (0,0).
    pub fn origin(&self) -> &CellCoord {
        &self.origin
    }

    pub fn mag(&self) -> i32 {
        self.mag
    }

    pub fn mag_limits(&self) -> (i32, i32) {
        (self.min_mag, self.max_mag)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn pixel_rect(&self) -> PixelRect {
        PixelRect::from_size(self.width, self.height)
    }

    pub fn extent(&self) -> GridExtent {
        self.extent
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pixels per cell edge, or `None` when minified.
    pub fn cell_size(&self) -> Option<i32> {
        (self.mag >= 0).then(|| 1 << self.mag)
    }

    // ------------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------------

    /// Top-left pixel of `cell`, saturating to `i32` sentinels when far away.
    pub fn to_pixel(&self, cell: &CellCoord) -> (i32, i32) {
        coords::to_pixel(cell, &self.origin, self.mag)
    }

    /// Cell under pixel `(px, py)`.
    pub fn to_cell(&self, px: i32, py: i32) -> CellCoord {
        coords::to_cell(px, py, &self.origin, self.mag)
    }

    pub fn cells_per_pixel(&self) -> Ratio<u64> {
        coords::cells_per_pixel(self.mag)
    }

    /// True if `cell` is fully visible. A partially visible cell at the right
    /// or bottom edge does not count.
    pub fn contains(&self, cell: &CellCoord) -> bool {
        if cell.x < self.origin.x || cell.y < self.origin.y {
            return false;
        }
        let cols = coords::mul_pow2(&BigInt::from(self.width), -self.mag);
        let rows = coords::mul_pow2(&BigInt::from(self.height), -self.mag);
        cell.x <= &self.origin.x + cols - 1 && cell.y <= &self.origin.y + rows - 1
    }

    /// Visible pixel area of a cell rectangle, clipped to the viewport.
    ///
    /// At mag > 1 the last pixel row and column are left uncovered so that
    /// overlays do not paint over the gap between cells.
    pub fn visible_rect(&self, rect: &CellRect) -> Option<PixelRect> {
        if rect.is_empty() {
            return None;
        }
        let (lx, ly) = self.to_pixel(&rect.top_left());
        let (rx, ry) = self.to_pixel(&rect.bottom_right());
        if lx > self.width || ly > self.height || rx < 0 || ry < 0 {
            return None;
        }
        let (mut rx, mut ry) = (rx as i64, ry as i64);
        if self.mag > 0 {
            let extra = (1i64 << self.mag) - 1;
            rx += extra;
            ry += extra;
            if self.mag > 1 {
                rx -= 1;
                ry -= 1;
            }
        }
        let x0 = (lx as i64).max(0);
        let y0 = (ly as i64).max(0);
        let x1 = rx.min(self.width as i64 - 1);
        let y1 = ry.min(self.height as i64 - 1);
        if x1 < x0 || y1 < y0 {
            return None;
        }
        Some(PixelRect::new(
            x0 as i32,
            y0 as i32,
            (x1 - x0 + 1) as i32,
            (y1 - y0 + 1) as i32,
        ))
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    pub fn set_extent(&mut self, extent: GridExtent) {
        self.extent = extent;
        self.reposition();
    }

    pub fn set_position(&mut self, position: CellCoord) {
        self.position = position;
        self.residue = (0, 0);
        self.reposition();
    }

    pub fn set_mag(&mut self, mag: i32) {
        self.mag = mag.clamp(self.min_mag, self.max_mag);
        self.reposition();
    }

    pub fn set_position_mag(&mut self, position: CellCoord, mag: i32) {
        self.position = position;
        self.residue = (0, 0);
        self.set_mag(mag);
    }

    /// Center on `rect` at the given magnification.
    pub fn center_on(&mut self, rect: &CellRect, mag: i32) {
        let x = (&rect.left + &rect.right + 1) >> 1usize;
        let y = (&rect.top + &rect.bottom + 1) >> 1usize;
        self.set_position_mag(CellCoord { x, y }, mag);
    }

    /// Copy position and magnification from another view (synced tiles).
    pub fn sync_from(&mut self, other: &Viewport) {
        self.position = other.position.clone();
        self.residue = (0, 0);
        self.mag = other.mag.clamp(self.min_mag, self.max_mag);
        self.reposition();
    }

    /// Shift the view by a pixel delta.
    ///
    /// At mag > 0 partial cells are carried over to the next pan so that a
    /// run of small drags still moves the view.
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let (cx, cy) = if self.mag > 0 {
            let scale = 1i64 << self.mag;
            let tx = self.residue.0 as i64 + dx as i64;
            let ty = self.residue.1 as i64 + dy as i64;
            self.residue = ((tx % scale) as i32, (ty % scale) as i32);
            (BigInt::from(tx / scale), BigInt::from(ty / scale))
        } else {
            (
                coords::mul_pow2(&BigInt::from(dx), -self.mag),
                coords::mul_pow2(&BigInt::from(dy), -self.mag),
            )
        };
        self.position.x += cx;
        self.position.y += cy;
        self.reposition();
    }

    /// Shift the view by whole cells.
    pub fn pan_cells(&mut self, dx: &BigInt, dy: &BigInt) {
        self.position.x += dx;
        self.position.y += dy;
        self.reposition();
    }

    /// Zoom in one step, about `anchor` if given, else about the center.
    pub fn zoom_in(&mut self, anchor: Option<(i32, i32)>) -> ZoomOutcome {
        if self.mag >= self.max_mag {
            return ZoomOutcome::AtLimit;
        }
        self.rescale(self.mag + 1, anchor);
        ZoomOutcome::Zoomed
    }

    /// Zoom out one step, about `anchor` if given, else about the center.
    pub fn zoom_out(&mut self, anchor: Option<(i32, i32)>) -> ZoomOutcome {
        if self.mag <= self.min_mag {
            return ZoomOutcome::AtLimit;
        }
        self.rescale(self.mag - 1, anchor);
        ZoomOutcome::Zoomed
    }

    fn rescale(&mut self, mag: i32, anchor: Option<(i32, i32)>) {
        let pinned = anchor.map(|(ax, ay)| (ax, ay, self.to_cell(ax, ay)));
        self.mag = mag;
        self.residue = (0, 0);
        self.reposition();
        if let Some((ax, ay, before)) = pinned {
            // Shift so the anchor pixel still shows the same cell.
            let after = self.to_cell(ax, ay);
            self.position.x -= after.x - before.x;
            self.position.y -= after.y - before.y;
            self.reposition();
        }
    }

    /// Largest magnification at which `bounds` plus `margin` cells fits.
    ///
    /// Returns false (and changes nothing) when `bounds` is empty.
    pub fn fit(&mut self, bounds: &CellRect, margin: i64) -> bool {
        if bounds.is_empty() {
            return false;
        }
        let rect = bounds.inflate(margin.max(0));
        let top_left = rect.top_left();
        let bottom_right = rect.bottom_right();
        self.center_on(&rect, self.max_mag);
        while self.mag > self.min_mag && !(self.contains(&top_left) && self.contains(&bottom_right)) {
            self.mag -= 1;
            self.reposition();
        }
        true
    }

    /// Change the pixel size; `position` stays where it is.
    pub fn resize(&mut self, width: i32, height: i32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.reposition();
    }

    fn reposition(&mut self) {
        if self.extent.is_bounded() {
            self.position = self.extent.clamp(&self.position);
        }
        let half_w = coords::mul_pow2(&BigInt::from(self.width), -self.mag) >> 1usize;
        let half_h = coords::mul_pow2(&BigInt::from(self.height), -self.mag) >> 1usize;
        self.origin = CellCoord {
            x: &self.position.x - half_w,
            y: &self.position.y - half_h,
        };
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_centers_position() {
        let mut view = Viewport::new(100, 60);
        assert_eq!(view.origin(), &CellCoord::new(-50, -30));
        view.set_mag(2);
        // 100 px / 4 = 25 cells, half is 12
        assert_eq!(view.origin(), &CellCoord::new(-12, -7));
        view.set_mag(-1);
        assert_eq!(view.origin(), &CellCoord::new(-100, -60));
    }

    #[test]
    fn zoom_stops_at_limits() {
        let mut view = Viewport::new(64, 64).with_mag_limits(-1, 1);
        assert_eq!(view.zoom_in(None), ZoomOutcome::Zoomed);
        assert_eq!(view.zoom_in(None), ZoomOutcome::AtLimit);
        assert_eq!(view.mag(), 1);
        assert_eq!(view.zoom_out(None), ZoomOutcome::Zoomed);
        assert_eq!(view.zoom_out(None), ZoomOutcome::Zoomed);
        let generation = view.generation();
        assert_eq!(view.zoom_out(None), ZoomOutcome::AtLimit);
        assert_eq!(view.generation(), generation);
    }

    #[test]
    fn center_zoom_keeps_position() {
        let mut view = Viewport::new(200, 100);
        view.set_position(CellCoord::new(1234, -77));
        view.zoom_in(None);
        view.zoom_in(None);
        assert_eq!(view.position(), &CellCoord::new(1234, -77));
    }

    #[test]
    fn anchored_zoom_pins_cell() {
        let mut view = Viewport::new(320, 240);
        view.set_position(CellCoord::new(-5_000, 17));
        let before = view.to_cell(17, 201);
        view.zoom_in(Some((17, 201)));
        assert_eq!(view.to_cell(17, 201), before);
        view.zoom_out(Some((17, 201)));
        view.zoom_out(Some((17, 201)));
        assert_eq!(view.to_cell(17, 201), before);
    }

    #[test]
    fn sub_cell_pans_accumulate() {
        let mut view = Viewport::new(64, 64);
        view.set_mag(3);
        view.pan(3, 0);
        assert_eq!(view.position().x, BigInt::from(0));
        view.pan(5, -9);
        assert_eq!(view.position(), &CellCoord::new(1, -1));
        view.set_mag(-2);
        view.pan(3, 0);
        assert_eq!(view.position().x, BigInt::from(13));
    }

    #[test]
    fn pan_bumps_generation() {
        let mut view = Viewport::new(10, 10);
        let g = view.generation();
        view.pan(1, 1);
        assert!(view.generation() > g);
    }

    #[test]
    fn fit_prefers_largest_mag() {
        let mut view = Viewport::new(100, 100);
        assert!(view.fit(&CellRect::new(0, 0, 9, 9), 0));
        // 10 cells fit at 8 px (80 px) but not at 16 px
        assert_eq!(view.mag(), 3);
        assert!(view.contains(&CellCoord::new(0, 0)));
        assert!(view.contains(&CellCoord::new(9, 9)));

        assert!(view.fit(&CellRect::new(-1_000, 0, 1_000, 10), 0));
        assert_eq!(view.mag(), -5);
    }

    #[test]
    fn fit_with_margin_and_empty_bounds() {
        let mut view = Viewport::new(100, 100);
        view.set_mag(1);
        assert!(!view.fit(&CellRect::new(5, 5, 4, 4), 3));
        assert_eq!(view.mag(), 1);
        assert!(view.fit(&CellRect::new(0, 0, 9, 9), 2));
        assert_eq!(view.mag(), 2);
    }

    #[test]
    fn resize_keeps_position() {
        let mut view = Viewport::new(100, 100);
        view.set_position(CellCoord::new(42, 42));
        view.resize(300, 50);
        assert_eq!(view.position(), &CellCoord::new(42, 42));
        assert_eq!(view.origin(), &CellCoord::new(-108, 17));
    }

    #[test]
    fn bounded_grid_clamps_position() {
        let mut view = Viewport::new(100, 100);
        view.set_extent(GridExtent::new(20, 0));
        view.pan(1_000, 1_000);
        assert_eq!(view.position(), &CellCoord::new(9, 1_000));
    }

    #[test]
    fn visible_rect_clips_and_skips_gap() {
        let mut view = Viewport::new(100, 100);
        view.set_mag(2);
        // origin is (-12, -12)
        let rect = CellRect::new(-12, -12, -11, -12);
        assert_eq!(view.visible_rect(&rect), Some(PixelRect::new(0, 0, 7, 3)));
        assert_eq!(view.visible_rect(&CellRect::new(100, 0, 101, 1)), None);
        let huge = CellRect::new(-1_000_000, -5, 1_000_000, -5);
        assert_eq!(view.visible_rect(&huge), Some(PixelRect::new(0, 28, 100, 3)));
    }
}
