// ============================================================================
// ENGINE BOUNDARY – traits the automaton backend and host UI implement
// ============================================================================
//
// The renderer never walks a pattern itself. A backend implements
// `PatternStore`, and its `draw` reports what it sees through the two
// `CellRenderer` callbacks. Paste commits go straight through
// `get_cell`/`set_cell`/`next_live_cell`.

use crate::components::colors::ColorTable;
use crate::coords::CellRect;
use crate::viewport::Viewport;

/// Sink for one frame's worth of spans from a pattern store.
///
/// The spans a store emits for a viewport must jointly cover every pixel of
/// `0..width × 0..height` exactly once. A `blit_cells` span may overhang the
/// right or bottom edge by less than one cell; implementations clip.
pub trait CellRenderer {
    /// Paint a rectangle that contains no live cells.
    fn fill_dead(&mut self, x: i32, y: i32, w: i32, h: i32);

    /// Paint a rectangle from a byte raster.
    ///
    /// With `scale == 1` the data is `w * h` resolved RGB triples. Otherwise it
    /// holds one state byte per cell, `w / scale` cells per row, and each byte
    /// covers a `scale × scale` block of pixels.
    fn blit_cells(&mut self, x: i32, y: i32, w: i32, h: i32, data: &[u8], scale: u32);

    /// Current colors, for stores that pre-render minified views.
    fn color_table(&self) -> &ColorTable;
}

/// Storage of one pattern, as seen by rendering and pasting.
///
/// Coordinates are machine-width: callers check the ±10^9 edit limits before
/// addressing single cells.
pub trait PatternStore {
    fn get_cell(&self, x: i32, y: i32) -> u8;

    /// Set one cell. Returns false if `state` is not valid for this store.
    fn set_cell(&mut self, x: i32, y: i32, state: u8) -> bool;

    /// Distance from `(x, y)` to the next live cell on row `y` at or after
    /// `x`, together with its state. `None` when the rest of the row is dead.
    fn next_live_cell(&self, x: i32, y: i32) -> Option<(u32, u8)>;

    /// Smallest rectangle holding every live cell, `None` if empty.
    fn bounding_box(&self) -> Option<CellRect>;

    /// Number of states, including the dead state 0.
    fn num_states(&self) -> u32;

    fn is_empty(&self) -> bool;

    /// Flush pending edits (e.g. rebuild caches) after a batch of `set_cell`s.
    fn commit_changes(&mut self);

    /// Walk the cells visible in `view` and report them to `renderer`.
    fn draw(&self, view: &Viewport, renderer: &mut dyn CellRenderer);

    fn max_state(&self) -> u8 {
        (self.num_states().clamp(1, 256) - 1) as u8
    }
}

/// Receives every cell a paste commit changes (undo/redo hook).
pub trait ChangeRecorder {
    fn record_cell_change(&mut self, x: i32, y: i32, old: u8, new: u8);
}

/// Progress reporting and cooperative cancellation for long operations.
pub trait ProgressSink {
    fn begin_progress(&mut self, label: &str);

    /// Report completion in `0.0 ..= 1.0`. Returns true if the user cancelled.
    fn report_progress(&mut self, fraction: f64) -> bool;

    fn end_progress(&mut self);
}

/// Progress sink that never cancels and reports nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin_progress(&mut self, _label: &str) {}

    fn report_progress(&mut self, _fraction: f64) -> bool {
        false
    }

    fn end_progress(&mut self) {}
}

/// Progress sink that logs each further tenth of completion at debug level.
#[derive(Clone, Debug, Default)]
pub struct LogProgress {
    label: String,
    last_tenth: i32,
}

impl ProgressSink for LogProgress {
    fn begin_progress(&mut self, label: &str) {
        self.label = label.to_string();
        self.last_tenth = -1;
        log::debug!("{}: started", self.label);
    }

    fn report_progress(&mut self, fraction: f64) -> bool {
        let tenth = (fraction.clamp(0.0, 1.0) * 10.0) as i32;
        if tenth > self.last_tenth {
            self.last_tenth = tenth;
            log::debug!("{}: {}%", self.label, tenth * 10);
        }
        false
    }

    fn end_progress(&mut self) {
        log::debug!("{}: finished", self.label);
    }
}
