// ============================================================================
// SPARSE GRID – ordered-map pattern store used by the CLI and the tests
// ============================================================================

use std::collections::BTreeMap;
use std::ops::Bound;

use num::ToPrimitive;

use crate::coords::{CellBox, CellRect};
use crate::engine::{CellRenderer, PatternStore};
use crate::viewport::Viewport;

/// Cells per block edge when magnified.
const BLOCK_CELLS: i64 = 32;
/// Pixels per block edge at mag <= 0.
const BLOCK_PIXELS: i64 = 64;

/// Live cells keyed by `(y, x)` so each row is a contiguous range.
#[derive(Clone, Debug, Default)]
pub struct SparseGrid {
    cells: BTreeMap<(i32, i32), u8>,
    num_states: u32,
    edits: u64,
}

impl SparseGrid {
    pub fn new(num_states: u32) -> Self {
        Self {
            cells: BTreeMap::new(),
            num_states: num_states.clamp(2, 256),
            edits: 0,
        }
    }

    /// Build from `(x, y, state)` triples. Invalid states are skipped.
    pub fn from_cells(num_states: u32, cells: impl IntoIterator<Item = (i32, i32, u8)>) -> Self {
        let mut grid = Self::new(num_states);
        for (x, y, state) in cells {
            grid.set_cell(x, y, state);
        }
        grid
    }

    pub fn population(&self) -> usize {
        self.cells.len()
    }

    /// Live cells as `(x, y, state)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32, u8)> + '_ {
        self.cells.iter().map(|(&(y, x), &s)| (x, y, s))
    }

    /// Number of `set_cell` calls that changed something since creation.
    pub fn edit_count(&self) -> u64 {
        self.edits
    }

    /// Change the state count without touching existing cells, as a rule
    /// change would. Cells may be left holding states that are now invalid.
    pub fn set_num_states(&mut self, num_states: u32) {
        self.num_states = num_states.clamp(2, 256);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Fill `area` with a deterministic pseudo-random soup.
    ///
    /// `density` is the percentage of cells made live; live cells get states
    /// spread over `1..num_states`.
    pub fn random_fill(&mut self, area: CellBox, density: u32, seed: u64) {
        let mut state = seed;
        for y in area.top..=area.bottom {
            for x in area.left..=area.right {
                let r = splitmix64(&mut state);
                if (r % 100) < density as u64 {
                    let live = 1 + ((r >> 32) % (self.num_states as u64 - 1)) as u8;
                    self.set_cell(x, y, live);
                }
            }
        }
    }

    fn row(&self, y: i32, from_x: i32, to_x: i32) -> impl Iterator<Item = (i32, u8)> + '_ {
        self.cells
            .range((Bound::Included((y, from_x)), Bound::Included((y, to_x))))
            .map(|(&(_, x), &s)| (x, s))
    }

    /// Live cells within rows `top..=bottom` and columns `left..=right`.
    fn cells_in(&self, area: CellBox) -> impl Iterator<Item = (i32, i32, u8)> + '_ {
        self.cells
            .range((Bound::Included((area.top, i32::MIN)), Bound::Included((area.bottom, i32::MAX))))
            .filter(move |(key, _)| key.1 >= area.left && key.1 <= area.right)
            .map(|(&(y, x), &s)| (x, y, s))
    }

    /// Visible machine-width cell window for `view`, with its origin.
    fn visible_cells(&self, view: &Viewport, cols: i64, rows: i64) -> Option<(i64, i64, CellBox)> {
        let x0 = view.origin().x.to_i64()?;
        let y0 = view.origin().y.to_i64()?;
        let left = x0.max(i32::MIN as i64);
        let top = y0.max(i32::MIN as i64);
        let right = x0.saturating_add(cols - 1).min(i32::MAX as i64);
        let bottom = y0.saturating_add(rows - 1).min(i32::MAX as i64);
        if right < left || bottom < top {
            return None;
        }
        Some((
            x0,
            y0,
            CellBox::new(left as i32, top as i32, right as i32, bottom as i32),
        ))
    }

    fn draw_magnified(&self, view: &Viewport, renderer: &mut dyn CellRenderer) {
        let mag = view.mag();
        let scale = 1i64 << mag;
        let (w, h) = (view.width() as i64, view.height() as i64);
        let cols = (w + scale - 1) >> mag;
        let rows = (h + scale - 1) >> mag;

        let mut states = vec![0u8; (cols * rows) as usize];
        let mut any_live = false;
        if let Some((x0, y0, area)) = self.visible_cells(view, cols, rows) {
            for (x, y, s) in self.cells_in(area) {
                let i = (y as i64 - y0) * cols + (x as i64 - x0);
                states[i as usize] = s;
                any_live = true;
            }
        }
        if !any_live {
            renderer.fill_dead(0, 0, w as i32, h as i32);
            return;
        }

        let mut block = Vec::with_capacity((BLOCK_CELLS * BLOCK_CELLS) as usize);
        for by in (0..rows).step_by(BLOCK_CELLS as usize) {
            let bh = BLOCK_CELLS.min(rows - by);
            for bx in (0..cols).step_by(BLOCK_CELLS as usize) {
                let bw = BLOCK_CELLS.min(cols - bx);
                block.clear();
                for j in by..by + bh {
                    let start = (j * cols + bx) as usize;
                    block.extend_from_slice(&states[start..start + bw as usize]);
                }
                let (px, py) = ((bx << mag) as i32, (by << mag) as i32);
                if block.iter().all(|&s| s == 0) {
                    let pw = (bw << mag).min(w - (bx << mag)) as i32;
                    let ph = (bh << mag).min(h - (by << mag)) as i32;
                    renderer.fill_dead(px, py, pw, ph);
                } else {
                    renderer.blit_cells(px, py, (bw << mag) as i32, (bh << mag) as i32, &block, scale as u32);
                }
            }
        }
    }

    /// At mag <= 0 each pixel covers `2^-mag` cells square and shows the
    /// first live state found in it, pre-resolved to RGB.
    fn draw_minified(&self, view: &Viewport, renderer: &mut dyn CellRenderer) {
        let shift = (-view.mag()) as u32;
        let (w, h) = (view.width() as i64, view.height() as i64);

        let mut pixels = vec![0u8; (w * h) as usize];
        let mut any_live = false;
        if let Some((x0, y0, area)) = self.visible_cells(view, w << shift, h << shift) {
            for (x, y, s) in self.cells_in(area) {
                let px = (x as i64 - x0) >> shift;
                let py = (y as i64 - y0) >> shift;
                let slot = &mut pixels[(py * w + px) as usize];
                if *slot == 0 {
                    *slot = s;
                    any_live = true;
                }
            }
        }
        if !any_live {
            renderer.fill_dead(0, 0, w as i32, h as i32);
            return;
        }

        let mut rgb = Vec::with_capacity((BLOCK_PIXELS * BLOCK_PIXELS * 3) as usize);
        for by in (0..h).step_by(BLOCK_PIXELS as usize) {
            let bh = BLOCK_PIXELS.min(h - by);
            for bx in (0..w).step_by(BLOCK_PIXELS as usize) {
                let bw = BLOCK_PIXELS.min(w - bx);
                let live = (by..by + bh).any(|j| {
                    let start = (j * w + bx) as usize;
                    pixels[start..start + bw as usize].iter().any(|&s| s != 0)
                });
                if !live {
                    renderer.fill_dead(bx as i32, by as i32, bw as i32, bh as i32);
                    continue;
                }
                rgb.clear();
                {
                    let table = renderer.color_table();
                    for j in by..by + bh {
                        let start = (j * w + bx) as usize;
                        for &s in &pixels[start..start + bw as usize] {
                            rgb.extend_from_slice(&table.get(s));
                        }
                    }
                }
                renderer.blit_cells(bx as i32, by as i32, bw as i32, bh as i32, &rgb, 1);
            }
        }
    }
}

impl PatternStore for SparseGrid {
    fn get_cell(&self, x: i32, y: i32) -> u8 {
        self.cells.get(&(y, x)).copied().unwrap_or(0)
    }

    fn set_cell(&mut self, x: i32, y: i32, state: u8) -> bool {
        if state as u32 >= self.num_states {
            return false;
        }
        let changed = if state == 0 {
            self.cells.remove(&(y, x)).is_some()
        } else {
            self.cells.insert((y, x), state) != Some(state)
        };
        if changed {
            self.edits += 1;
        }
        true
    }

    fn next_live_cell(&self, x: i32, y: i32) -> Option<(u32, u8)> {
        self.row(y, x, i32::MAX)
            .next()
            .map(|(cx, s)| ((cx as i64 - x as i64) as u32, s))
    }

    fn bounding_box(&self) -> Option<CellRect> {
        let (&(top, _), _) = self.cells.first_key_value()?;
        let (&(bottom, _), _) = self.cells.last_key_value()?;
        let mut left = i32::MAX;
        let mut right = i32::MIN;
        for &(_, x) in self.cells.keys() {
            left = left.min(x);
            right = right.max(x);
        }
        Some(CellRect::new(left, top, right, bottom))
    }

    fn num_states(&self) -> u32 {
        self.num_states
    }

    fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn commit_changes(&mut self) {
        log::debug!("sparse grid: {} live cells after {} edits", self.cells.len(), self.edits);
    }

    fn draw(&self, view: &Viewport, renderer: &mut dyn CellRenderer) {
        if view.mag() > 0 {
            self.draw_magnified(view, renderer);
        } else {
            self.draw_minified(view, renderer);
        }
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::colors::ColorTable;
    use crate::coords::CellCoord;

    /// Counts how often each viewport pixel is covered by a span.
    struct CoverageCounter {
        width: i32,
        height: i32,
        hits: Vec<u32>,
        colors: ColorTable,
        live_blits: usize,
    }

    impl CoverageCounter {
        fn new(width: i32, height: i32) -> Self {
            Self {
                width,
                height,
                hits: vec![0; (width * height) as usize],
                colors: ColorTable::default(),
                live_blits: 0,
            }
        }

        fn mark(&mut self, x: i32, y: i32, w: i32, h: i32) {
            for py in y.max(0)..(y + h).min(self.height) {
                for px in x.max(0)..(x + w).min(self.width) {
                    self.hits[(py * self.width + px) as usize] += 1;
                }
            }
        }
    }

    impl CellRenderer for CoverageCounter {
        fn fill_dead(&mut self, x: i32, y: i32, w: i32, h: i32) {
            self.mark(x, y, w, h);
        }

        fn blit_cells(&mut self, x: i32, y: i32, w: i32, h: i32, data: &[u8], scale: u32) {
            let expected = if scale == 1 { w * h * 3 } else { (w / scale as i32) * (h / scale as i32) };
            assert_eq!(data.len(), expected as usize);
            self.live_blits += 1;
            self.mark(x, y, w, h);
        }

        fn color_table(&self) -> &ColorTable {
            &self.colors
        }
    }

    fn soup() -> SparseGrid {
        let mut grid = SparseGrid::new(3);
        grid.random_fill(CellBox::new(-90, -70, 90, 70), 30, 7);
        grid
    }

    #[test]
    fn next_live_cell_reports_offset_and_state() {
        let grid = SparseGrid::from_cells(3, [(2, 0, 1), (9, 0, 2), (-4, 1, 1)]);
        assert_eq!(grid.next_live_cell(0, 0), Some((2, 1)));
        assert_eq!(grid.next_live_cell(3, 0), Some((6, 2)));
        assert_eq!(grid.next_live_cell(10, 0), None);
        assert_eq!(grid.next_live_cell(-10, 1), Some((6, 1)));
    }

    #[test]
    fn set_cell_rejects_invalid_states() {
        let mut grid = SparseGrid::new(2);
        assert!(!grid.set_cell(0, 0, 2));
        assert!(grid.set_cell(0, 0, 1));
        assert!(grid.set_cell(0, 0, 0));
        assert!(grid.is_empty());
        assert_eq!(grid.edit_count(), 2);
    }

    #[test]
    fn bounding_box_spans_all_cells() {
        let grid = SparseGrid::from_cells(2, [(5, -3, 1), (-2, 4, 1), (0, 0, 1)]);
        assert_eq!(grid.bounding_box(), Some(CellRect::new(-2, -3, 5, 4)));
        assert_eq!(SparseGrid::new(2).bounding_box(), None);
    }

    #[test]
    fn draw_covers_each_pixel_once_at_every_mag() {
        let grid = soup();
        for mag in -3..=5 {
            let mut view = Viewport::new(203, 117);
            view.set_position_mag(CellCoord::new(7, -3), mag);
            let mut counter = CoverageCounter::new(203, 117);
            grid.draw(&view, &mut counter);
            assert!(counter.hits.iter().all(|&n| n == 1), "mag {}", mag);
            assert!(counter.live_blits > 0, "mag {}", mag);
        }
    }

    #[test]
    fn draw_far_away_is_one_dead_span() {
        let grid = soup();
        let mut view = Viewport::new(50, 50);
        view.set_position(CellCoord::new(num::BigInt::from(1) << 80usize, 0));
        let mut counter = CoverageCounter::new(50, 50);
        grid.draw(&view, &mut counter);
        assert_eq!(counter.live_blits, 0);
        assert!(counter.hits.iter().all(|&n| n == 1));
    }

    #[test]
    fn draw_near_i64_limit_is_dead() {
        let grid = soup();
        for mag in [-2, 0, 3] {
            let mut view = Viewport::new(50, 50);
            view.set_position_mag(CellCoord::new(i64::MAX, i64::MAX), mag);
            let mut counter = CoverageCounter::new(50, 50);
            grid.draw(&view, &mut counter);
            assert_eq!(counter.live_blits, 0, "mag {}", mag);
            assert!(counter.hits.iter().all(|&n| n == 1), "mag {}", mag);
        }
    }

    #[test]
    fn random_fill_is_deterministic() {
        let a = soup();
        let b = soup();
        assert_eq!(a.cells().collect::<Vec<_>>(), b.cells().collect::<Vec<_>>());
        assert!(a.population() > 0);
        assert!(a.cells().all(|(_, _, s)| s == 1 || s == 2));
    }
}
