// ============================================================================
// PASTE MERGE – writes a source pattern into a destination store
// ============================================================================
//
// Two iteration strategies produce identical results:
//   * sparse: jump from live source cell to live source cell along each row
//   * dense:  visit every cell of the paste rectangle
// The sparse path is only valid when dead source cells cannot change the
// destination: mode Or, or a destination with nothing under the rectangle.

use std::fmt;

use num::bigint::BigInt;
use num::Integer;
use serde::{Deserialize, Serialize};

use crate::coords::{CellBox, CellCoord, CellRect, EditError, GridExtent};
use crate::engine::{ChangeRecorder, PatternStore, ProgressSink};

/// Cells between progress reports / cancellation polls.
pub const PROGRESS_INTERVAL: u64 = 4096;

// ----------------------------------------------------------------------------
// Modes and anchors
// ----------------------------------------------------------------------------

/// How a pasted cell combines with the cell already there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PasteMode {
    And,
    #[default]
    Copy,
    Or,
    Xor,
}

impl PasteMode {
    pub const ALL: [PasteMode; 4] = [PasteMode::And, PasteMode::Copy, PasteMode::Or, PasteMode::Xor];

    pub fn label(&self) -> &'static str {
        match self {
            PasteMode::And => "And",
            PasteMode::Copy => "Copy",
            PasteMode::Or => "Or",
            PasteMode::Xor => "Xor",
        }
    }

    /// And → Copy → Or → Xor → And.
    pub fn cycle(self) -> Self {
        match self {
            PasteMode::And => PasteMode::Copy,
            PasteMode::Copy => PasteMode::Or,
            PasteMode::Or => PasteMode::Xor,
            PasteMode::Xor => PasteMode::And,
        }
    }
}

/// Which point of the paste rectangle follows the pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PasteLocation {
    #[default]
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    Middle,
}

impl PasteLocation {
    /// Clockwise around the corners, then the middle.
    pub fn cycle(self) -> Self {
        match self {
            PasteLocation::TopLeft => PasteLocation::TopRight,
            PasteLocation::TopRight => PasteLocation::BottomRight,
            PasteLocation::BottomRight => PasteLocation::BottomLeft,
            PasteLocation::BottomLeft => PasteLocation::Middle,
            PasteLocation::Middle => PasteLocation::TopLeft,
        }
    }
}

/// Destination rectangle for a `width × height` paste clicked at `click`.
///
/// For `Middle`, above mag 1 an even dimension is shifted one cell further so
/// the pattern lands under the cell drawn at the pointer.
pub fn anchored_rect(click: &CellCoord, width: u64, height: u64, location: PasteLocation, mag: i32) -> CellRect {
    let wd = BigInt::from(width);
    let ht = BigInt::from(height);
    let mut left = click.x.clone();
    let mut top = click.y.clone();
    match location {
        PasteLocation::TopLeft => {}
        PasteLocation::TopRight => left -= &wd - 1,
        PasteLocation::BottomRight => {
            left -= &wd - 1;
            top -= &ht - 1;
        }
        PasteLocation::BottomLeft => top -= &ht - 1,
        PasteLocation::Middle => {
            let mut half_wd = &wd >> 1usize;
            let mut half_ht = &ht >> 1usize;
            if mag > 1 {
                if wd.is_even() {
                    half_wd -= 1;
                }
                if ht.is_even() {
                    half_ht -= 1;
                }
            }
            left -= half_wd;
            top -= half_ht;
        }
    }
    CellRect::from_size(left, top, width, height)
}

// ----------------------------------------------------------------------------
// Merge algebra
// ----------------------------------------------------------------------------

/// Result of merging one source cell `s` onto destination cell `d`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellMerge {
    /// New destination state, if it changes.
    pub write: Option<u8>,
    /// The source state had to be clamped to the destination's max state.
    pub reduced: bool,
}

impl CellMerge {
    const KEEP: CellMerge = CellMerge { write: None, reduced: false };

    fn clamped(s: u8, d: u8, max_state: u8) -> CellMerge {
        let reduced = s > max_state;
        let v = s.min(max_state);
        CellMerge {
            write: (v != d).then_some(v),
            reduced,
        }
    }
}

/// Merge rule shared by both iteration strategies.
pub fn merge_cell(mode: PasteMode, s: u8, d: u8, max_state: u8) -> CellMerge {
    match mode {
        PasteMode::Copy if s != d => CellMerge::clamped(s, d, max_state),
        PasteMode::Or if s != 0 && s != d => CellMerge::clamped(s, d, max_state),
        PasteMode::And if s != d && d != 0 => CellMerge { write: Some(0), reduced: false },
        PasteMode::Xor if s == d && s != 0 => CellMerge { write: Some(0), reduced: false },
        PasteMode::Xor if s != d && s != 0 => {
            // an invalid XOR result leaves the cell alone, never clamps
            let v = s ^ d;
            if v > max_state { CellMerge::KEEP } else { CellMerge { write: Some(v), reduced: false } }
        }
        _ => CellMerge::KEEP,
    }
}

/// Iteration strategy for a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePath {
    Sparse,
    Dense,
    /// Mode And over an empty destination area: nothing can change.
    Skip,
}

/// Pick the strategy. Conservative: dense whenever the destination has live
/// cells that may lie under the paste rectangle.
pub fn choose_path(mode: PasteMode, dest: &dyn PatternStore, dest_rect: &CellRect) -> MergePath {
    let sparse = mode == PasteMode::Or
        || dest.is_empty()
        || dest.bounding_box().is_none_or(|bb| !bb.intersects(dest_rect));
    match (sparse, mode) {
        (true, PasteMode::And) => MergePath::Skip,
        (true, _) => MergePath::Sparse,
        (false, _) => MergePath::Dense,
    }
}

/// One paste commit's inputs.
#[derive(Clone, Copy)]
pub struct MergeRequest<'a> {
    pub source: &'a dyn PatternStore,
    /// Source cells to paste.
    pub source_box: CellBox,
    /// Destination cell receiving `source_box`'s top-left.
    pub dest_left: i32,
    pub dest_top: i32,
    pub mode: PasteMode,
    /// Destination cells outside a bounded grid are never written.
    pub extent: GridExtent,
}

impl MergeRequest<'_> {
    pub fn dest_rect(&self) -> CellRect {
        CellRect::from_size(
            self.dest_left,
            self.dest_top,
            self.source_box.width().max(0) as u64,
            self.source_box.height().max(0) as u64,
        )
    }

    /// Source cells whose destinations lie inside the bounded grid.
    fn clipped_source(&self) -> Option<CellBox> {
        let clip = self.extent.clip_box();
        let ox = self.dest_left as i64 - self.source_box.left as i64;
        let oy = self.dest_top as i64 - self.source_box.top as i64;
        let left = (self.source_box.left as i64).max(clip.left as i64 - ox);
        let right = (self.source_box.right as i64).min(clip.right as i64 - ox);
        let top = (self.source_box.top as i64).max(clip.top as i64 - oy);
        let bottom = (self.source_box.bottom as i64).min(clip.bottom as i64 - oy);
        if right < left || bottom < top {
            return None;
        }
        Some(CellBox::new(left as i32, top as i32, right as i32, bottom as i32))
    }
}

/// What a commit did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PasteOutcome {
    pub changed: u64,
    /// Some states were clamped to the destination's max state.
    pub states_reduced: bool,
    /// The user cancelled part way; changes made so far are kept.
    pub cancelled: bool,
}

impl PasteOutcome {
    /// Message to show once after the commit, if any.
    pub fn notice(&self) -> Option<&'static str> {
        if self.cancelled {
            Some("Paste cancelled; cells already changed were kept.")
        } else if self.states_reduced {
            Some("Some cell states were reduced.")
        } else {
            None
        }
    }
}

/// Merge using the strategy `choose_path` picks.
pub fn merge(
    req: &MergeRequest,
    dest: &mut dyn PatternStore,
    recorder: Option<&mut dyn ChangeRecorder>,
    progress: &mut dyn ProgressSink,
) -> PasteOutcome {
    let path = choose_path(req.mode, dest, &req.dest_rect());
    merge_with(path, req, dest, recorder, progress)
}

/// Merge using an explicit strategy.
pub fn merge_with(
    path: MergePath,
    req: &MergeRequest,
    dest: &mut dyn PatternStore,
    recorder: Option<&mut dyn ChangeRecorder>,
    progress: &mut dyn ProgressSink,
) -> PasteOutcome {
    let Some(area) = req.clipped_source() else {
        return PasteOutcome::default();
    };
    let dense = match path {
        MergePath::Skip => return PasteOutcome::default(),
        MergePath::Sparse => false,
        MergePath::Dense => true,
    };

    let mut writer = CellWriter {
        dest,
        recorder,
        mode: req.mode,
        ox: req.dest_left as i64 - req.source_box.left as i64,
        oy: req.dest_top as i64 - req.source_box.top as i64,
        outcome: PasteOutcome::default(),
        visited: 0,
    };

    progress.begin_progress("Pasting pattern");
    let rows = area.height() as f64;
    'rows: for sy in area.top..=area.bottom {
        let done = (sy as i64 - area.top as i64) as f64 / rows;
        if dense {
            for sx in area.left..=area.right {
                writer.apply(sx, sy, req.source.get_cell(sx, sy));
                if writer.poll(progress, done) {
                    break 'rows;
                }
            }
            continue;
        }
        let mut sx = area.left as i64;
        while sx <= area.right as i64 {
            let Some((skip, s)) = req.source.next_live_cell(sx as i32, sy) else {
                break;
            };
            let cx = sx + skip as i64;
            if cx > area.right as i64 {
                break;
            }
            writer.apply(cx as i32, sy, s);
            if writer.poll(progress, done) {
                break 'rows;
            }
            sx = cx + 1;
        }
    }
    progress.end_progress();

    let outcome = writer.outcome;
    if outcome.changed > 0 {
        writer.dest.commit_changes();
    }
    log::info!(
        "paste {:?} via {:?}: {} cells changed{}{}",
        req.mode,
        path,
        outcome.changed,
        if outcome.states_reduced { ", states reduced" } else { "" },
        if outcome.cancelled { ", cancelled" } else { "" },
    );
    outcome
}

struct CellWriter<'d, 'r> {
    dest: &'d mut dyn PatternStore,
    recorder: Option<&'r mut dyn ChangeRecorder>,
    mode: PasteMode,
    ox: i64,
    oy: i64,
    outcome: PasteOutcome,
    visited: u64,
}

impl CellWriter<'_, '_> {
    fn apply(&mut self, sx: i32, sy: i32, s: u8) {
        let tx = (sx as i64 + self.ox) as i32;
        let ty = (sy as i64 + self.oy) as i32;
        let d = self.dest.get_cell(tx, ty);
        let merged = merge_cell(self.mode, s, d, self.dest.max_state());
        self.outcome.states_reduced |= merged.reduced;
        if let Some(v) = merged.write
            && self.dest.set_cell(tx, ty, v)
        {
            self.outcome.changed += 1;
            if let Some(rec) = self.recorder.as_deref_mut() {
                rec.record_cell_change(tx, ty, d, v);
            }
        }
    }

    /// Count a visited cell; every `PROGRESS_INTERVAL` cells report and
    /// return true if the user cancelled.
    fn poll(&mut self, progress: &mut dyn ProgressSink, fraction: f64) -> bool {
        self.visited += 1;
        if self.visited % PROGRESS_INTERVAL == 0 && progress.report_progress(fraction) {
            self.outcome.cancelled = true;
            return true;
        }
        false
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteError {
    /// The paste rectangle would leave the ±10^9 editable range.
    OutOfBounds,
    /// Pasting into a selection smaller than the pattern.
    BiggerThanSelection,
    /// Pasting into a selection when there is none.
    NoSelection,
    /// A paste was started while another one is still being placed.
    Busy,
    /// The pattern to paste has no live cells.
    EmptyPattern,
    /// A commit was requested before a destination was clicked.
    NotPlaced,
}

impl fmt::Display for PasteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasteError::OutOfBounds => write!(f, "Pasting is not allowed outside +/- 10^9 boundary"),
            PasteError::BiggerThanSelection => write!(f, "Clipboard pattern is bigger than selection"),
            PasteError::NoSelection => write!(f, "There is no selection to paste into"),
            PasteError::Busy => write!(f, "A paste is already in progress"),
            PasteError::EmptyPattern => write!(f, "There is no pattern to paste"),
            PasteError::NotPlaced => write!(f, "Click where you want to paste first"),
        }
    }
}

impl std::error::Error for PasteError {}

impl From<EditError> for PasteError {
    fn from(e: EditError) -> Self {
        match e {
            EditError::OutOfBounds => PasteError::OutOfBounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NoProgress;
    use crate::grid::SparseGrid;

    fn request(source: &SparseGrid, mode: PasteMode) -> MergeRequest<'_> {
        MergeRequest {
            source,
            source_box: CellBox::new(0, 0, 1, 0),
            dest_left: 0,
            dest_top: 0,
            mode,
            extent: GridExtent::UNBOUNDED,
        }
    }

    fn pasted(mode: PasteMode) -> (u8, u8) {
        let source = SparseGrid::from_cells(3, [(0, 0, 2)]);
        let mut dest = SparseGrid::from_cells(3, [(0, 0, 1), (1, 0, 2)]);
        merge(&request(&source, mode), &mut dest, None, &mut NoProgress);
        (dest.get_cell(0, 0), dest.get_cell(1, 0))
    }

    #[test]
    fn merge_algebra_on_two_cells() {
        assert_eq!(pasted(PasteMode::Copy), (2, 0));
        assert_eq!(pasted(PasteMode::Or), (2, 2));
        assert_eq!(pasted(PasteMode::And), (0, 0));
        assert_eq!(pasted(PasteMode::Xor), (1, 2));
    }

    #[test]
    fn xor_clears_equal_cells() {
        assert_eq!(merge_cell(PasteMode::Xor, 2, 2, 3).write, Some(0));
        assert_eq!(merge_cell(PasteMode::Xor, 1, 2, 3).write, Some(3));
        assert_eq!(merge_cell(PasteMode::Xor, 0, 0, 3).write, None);
    }

    #[test]
    fn states_reduced_reported_once() {
        let source = SparseGrid::from_cells(6, (0..10).map(|x| (x, 0, 5)));
        let mut dest = SparseGrid::new(4);
        let req = MergeRequest {
            source: &source,
            source_box: CellBox::new(0, 0, 9, 0),
            dest_left: 100,
            dest_top: 100,
            mode: PasteMode::Copy,
            extent: GridExtent::UNBOUNDED,
        };
        let outcome = merge(&req, &mut dest, None, &mut NoProgress);
        assert!(outcome.states_reduced);
        assert_eq!(outcome.changed, 10);
        assert_eq!(dest.get_cell(105, 100), 3);
        assert_eq!(outcome.notice(), Some("Some cell states were reduced."));
    }

    #[test]
    fn path_selection_is_conservative() {
        let dest = SparseGrid::from_cells(2, [(50, 50, 1)]);
        let near = CellRect::new(40, 40, 60, 60);
        let far = CellRect::new(0, 0, 10, 10);
        assert_eq!(choose_path(PasteMode::Copy, &dest, &near), MergePath::Dense);
        assert_eq!(choose_path(PasteMode::Or, &dest, &near), MergePath::Sparse);
        assert_eq!(choose_path(PasteMode::Xor, &dest, &far), MergePath::Sparse);
        assert_eq!(choose_path(PasteMode::And, &dest, &far), MergePath::Skip);
        assert_eq!(choose_path(PasteMode::And, &dest, &near), MergePath::Dense);
        assert_eq!(choose_path(PasteMode::And, &SparseGrid::new(2), &near), MergePath::Skip);
    }

    #[test]
    fn bounded_grid_clips_writes() {
        let source = SparseGrid::from_cells(2, (0..10).map(|x| (x, 0, 1)));
        let mut dest = SparseGrid::new(2);
        let req = MergeRequest {
            source: &source,
            source_box: CellBox::new(0, 0, 9, 0),
            dest_left: -8,
            dest_top: 0,
            mode: PasteMode::Copy,
            extent: GridExtent::new(10, 10),
        };
        let outcome = merge(&req, &mut dest, None, &mut NoProgress);
        // grid columns are -5..=4
        assert_eq!(outcome.changed, 7);
        assert_eq!(dest.bounding_box(), Some(CellRect::new(-5, 0, 1, 0)));
    }

    struct CancelAfter(u32);

    impl ProgressSink for CancelAfter {
        fn begin_progress(&mut self, _label: &str) {}
        fn report_progress(&mut self, _fraction: f64) -> bool {
            self.0 = self.0.saturating_sub(1);
            self.0 == 0
        }
        fn end_progress(&mut self) {}
    }

    #[test]
    fn cancellation_keeps_partial_changes() {
        let source = SparseGrid::from_cells(2, (0..100).flat_map(|y| (0..100).map(move |x| (x, y, 1))));
        let mut dest = SparseGrid::new(2);
        let req = MergeRequest {
            source: &source,
            source_box: CellBox::new(0, 0, 99, 99),
            dest_left: 0,
            dest_top: 0,
            mode: PasteMode::Copy,
            extent: GridExtent::UNBOUNDED,
        };
        let outcome = merge(&req, &mut dest, None, &mut CancelAfter(2));
        assert!(outcome.cancelled);
        assert_eq!(outcome.changed, 2 * PROGRESS_INTERVAL);
        assert_eq!(dest.population() as u64, outcome.changed);
    }

    #[test]
    fn anchors_offset_the_clicked_cell() {
        let click = CellCoord::new(100, 50);
        let r = anchored_rect(&click, 10, 4, PasteLocation::TopRight, 0);
        assert_eq!(r, CellRect::new(91, 50, 100, 53));
        let r = anchored_rect(&click, 10, 4, PasteLocation::BottomRight, 0);
        assert_eq!(r, CellRect::new(91, 47, 100, 50));
        let r = anchored_rect(&click, 10, 4, PasteLocation::BottomLeft, 0);
        assert_eq!(r, CellRect::new(100, 47, 109, 50));
        let r = anchored_rect(&click, 10, 5, PasteLocation::Middle, 0);
        assert_eq!(r, CellRect::new(95, 48, 104, 52));
        let r = anchored_rect(&click, 10, 5, PasteLocation::Middle, 2);
        assert_eq!(r, CellRect::new(96, 48, 105, 52));
    }

    #[test]
    fn cycling_visits_every_variant() {
        let mut loc = PasteLocation::TopLeft;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(loc);
            loc = loc.cycle();
        }
        assert_eq!(loc, PasteLocation::TopLeft);
        assert_eq!(seen.len(), 5);
        assert_eq!(PasteMode::Xor.cycle(), PasteMode::And);
        assert_eq!(PasteMode::ALL.map(|m| m.cycle().cycle().cycle().cycle()), PasteMode::ALL);
    }
}
