// ============================================================================
// CLIPBOARD PASTE - interactive placement session and cached paste preview
// ============================================================================

use image::{RgbImage, RgbaImage};
use num::bigint::BigInt;

use crate::components::colors::ColorTable;
use crate::coords::{CellBox, CellCoord, CellRect, GridExtent, PixelRect};
use crate::engine::{ChangeRecorder, PatternStore, ProgressSink};
use crate::ops::expand::{ExpandOptions, ExpandScratch, ScaleExpander};
use crate::ops::icons::IconSet;
use crate::ops::overlay::{blend_image, draw_outline, stencil_into};
use crate::ops::paste::{self, MergeRequest, PasteError, PasteLocation, PasteMode, PasteOutcome};
use crate::ops::text::rasterize_label;
use crate::viewport::Viewport;

// ---------------------------------------------------------------------------
//  Paste pattern
// ---------------------------------------------------------------------------

/// A pattern waiting to be pasted, held in its own temporary store together
/// with the colors and icons it should be previewed with.
pub struct PastePattern {
    store: Box<dyn PatternStore>,
    bbox: CellBox,
    colors: ColorTable,
    icons: Option<IconSet>,
}

impl PastePattern {
    /// Wrap `store`, pasting exactly its live-cell bounding box.
    pub fn new(store: Box<dyn PatternStore>, colors: ColorTable, icons: Option<IconSet>) -> Result<Self, PasteError> {
        let bbox = store.bounding_box().ok_or(PasteError::EmptyPattern)?;
        let bbox = bbox.to_box().ok_or(PasteError::OutOfBounds)?;
        Ok(Self { store, bbox, colors, icons })
    }

    /// Wrap `store`, pasting `bbox`. The box may include blank borders.
    pub fn with_box(store: Box<dyn PatternStore>, bbox: CellBox, colors: ColorTable, icons: Option<IconSet>) -> Self {
        Self { store, bbox, colors, icons }
    }

    pub fn bbox(&self) -> CellBox {
        self.bbox
    }

    pub fn width(&self) -> u64 {
        self.bbox.width().max(0) as u64
    }

    pub fn height(&self) -> u64 {
        self.bbox.height().max(0) as u64
    }

    pub fn store(&self) -> &dyn PatternStore {
        self.store.as_ref()
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn icons(&self) -> Option<&IconSet> {
        self.icons.as_ref()
    }

    fn request(&self, left: i32, top: i32, mode: PasteMode, extent: GridExtent) -> MergeRequest<'_> {
        MergeRequest {
            source: self.store.as_ref(),
            source_box: self.bbox,
            dest_left: left,
            dest_top: top,
            mode,
            extent,
        }
    }
}

/// Where the destination of a commit lives.
pub struct PasteTarget<'a> {
    pub dest: &'a mut dyn PatternStore,
    pub recorder: Option<&'a mut dyn ChangeRecorder>,
    pub progress: &'a mut dyn ProgressSink,
}

impl PasteTarget<'_> {
    fn merge(&mut self, req: &MergeRequest) -> PasteOutcome {
        let recorder = self.recorder.as_mut().map(|r| &mut **r as &mut dyn ChangeRecorder);
        paste::merge(req, &mut *self.dest, recorder, &mut *self.progress)
    }
}

/// Paste straight into the selection without interactive placement.
///
/// The pattern lands on the selection's top-left cell and must fit inside it.
pub fn paste_into_selection(
    pattern: &PastePattern,
    selection: Option<&CellRect>,
    mode: PasteMode,
    extent: GridExtent,
    target: &mut PasteTarget,
) -> Result<PasteOutcome, PasteError> {
    let selection = selection.filter(|s| !s.is_empty()).ok_or(PasteError::NoSelection)?;
    if BigInt::from(pattern.width()) > selection.width() || BigInt::from(pattern.height()) > selection.height() {
        return Err(PasteError::BiggerThanSelection);
    }
    let rect = CellRect::from_size(selection.left.clone(), selection.top.clone(), pattern.width(), pattern.height());
    rect.check_edit_limits()?;
    let dest = rect.to_box().ok_or(PasteError::OutOfBounds)?;
    Ok(target.merge(&pattern.request(dest.left, dest.top, mode, extent)))
}

// ---------------------------------------------------------------------------
//  Paste rectangle in pixels
// ---------------------------------------------------------------------------

/// On-screen rectangle of a `width × height` paste whose anchor follows the
/// pointer at `(px, py)`.
///
/// Above mag 1 the rectangle stops one pixel short of the last cell so it
/// does not cover the gap between cells.
pub fn paste_rect(view: &Viewport, px: i32, py: i32, width: u64, height: u64, location: PasteLocation) -> PixelRect {
    let mag = view.mag();
    let (lx, ly) = view.to_pixel(&view.to_cell(px, py));
    let w = span_pixels(width, mag);
    let h = span_pixels(height, mag);

    let cell = if mag > 0 { 1 << mag } else { 1 };
    let gap = if mag == 1 { 0 } else { 1 };
    let back = |len: i32| if mag > 0 { -(len - cell + gap) } else { -len + 1 };
    let half = |len: i32| if mag > 0 { -(len / cell / 2) * cell } else { -len / 2 };
    let (dx, dy) = match location {
        PasteLocation::TopLeft => (0, 0),
        PasteLocation::TopRight => (back(w), 0),
        PasteLocation::BottomRight => (back(w), back(h)),
        PasteLocation::BottomLeft => (0, back(h)),
        PasteLocation::Middle => (half(w), half(h)),
    };
    PixelRect::new(lx.saturating_add(dx), ly.saturating_add(dy), w, h)
}

/// Pixels covered by `cells` cells starting on a pixel boundary, without the
/// trailing gap pixel above mag 1. Saturates at `i32::MAX` so the result does
/// not depend on where the span starts.
fn span_pixels(cells: u64, mag: i32) -> i32 {
    let cells = cells.max(1) as u128;
    let len = if mag > 0 {
        (cells << mag) - u128::from(mag > 1)
    } else {
        ((cells - 1) >> -mag) + 1
    };
    len.min(i32::MAX as u128) as i32
}

/// Cells under a pixel rectangle of `view`.
fn cells_under(view: &Viewport, rect: &PixelRect) -> CellRect {
    let lt = view.to_cell(rect.x, rect.y);
    let rb = view.to_cell(rect.right().saturating_sub(1), rect.bottom().saturating_sub(1));
    CellRect::new(lt.x, lt.y, rb.x, rb.y)
}

fn pixels_to_cells(pixels: i32, mag: i32) -> i64 {
    if mag >= 0 {
        let cell = 1i64 << mag;
        (pixels as i64 + cell - 1) / cell
    } else {
        (pixels as i64) << -mag
    }
}

// ---------------------------------------------------------------------------
//  Paste preview
// ---------------------------------------------------------------------------

/// Rendering switches that affect the preview bitmap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreviewStyle {
    pub show_icons: bool,
    pub swap_colors: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct PreviewKey {
    rect_size: (i32, i32),
    view_size: (i32, i32),
    bbox: CellBox,
    location: PasteLocation,
    mag: i32,
    style: PreviewStyle,
    colors: ColorTable,
    icons: Option<u64>,
}

/// Size of the offscreen preview, the cells it shows and where it sits inside
/// the full paste rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PreviewGeometry {
    width: i32,
    height: i32,
    /// Shown cells as (left, top, width, height).
    cells: (i64, i64, i64, i64),
    offset: (i32, i32),
}

/// Work out how much of a paste rectangle the preview has to render.
///
/// Big pastes are capped at the view size, or twice that for `Middle` so the
/// pattern can overflow symmetrically. Capped sizes are rounded to whole cells.
fn preview_geometry(rect_w: i32, rect_h: i32, view_w: i32, view_h: i32, bbox: &CellBox, location: PasteLocation, mag: i32) -> PreviewGeometry {
    let (mut w, mut h) = (rect_w, rect_h);
    let mut cells = (bbox.left as i64, bbox.top as i64, bbox.width(), bbox.height());
    let cell = 1i32 << mag.max(0);

    if w > view_w || h > view_h {
        if location == PasteLocation::Middle {
            w = w.min(2 * view_w);
            h = h.min(2 * view_h);
            if mag > 0 {
                if (w + 1) % cell > 0 {
                    w += cell - (w + 1) % cell;
                }
                if (h + 1) % cell > 0 {
                    h += cell - (h + 1) % cell;
                }
            }
            // the uncovered part must split evenly on both sides
            let even_up = |full: i32, len: &mut i32| {
                if full > *len {
                    if mag > 0 {
                        if ((full - *len) / cell) & 1 == 1 {
                            *len += cell;
                        }
                    } else if (full - *len) & 1 == 1 {
                        *len += 1;
                    }
                }
            };
            even_up(rect_w, &mut w);
            even_up(rect_h, &mut h);
        } else {
            w = w.min(view_w);
            h = h.min(view_h);
            if mag > 0 {
                let gap = if mag == 1 { 0 } else { 1 };
                if (w + gap) % cell > 0 {
                    w += cell - (w + gap) % cell;
                }
                if (h + gap) % cell > 0 {
                    h += cell - (h + gap) % cell;
                }
            }
            let shown_w = pixels_to_cells(w, mag);
            let shown_h = pixels_to_cells(h, mag);
            let right_x = bbox.left as i64 + bbox.width() - shown_w;
            let bottom_y = bbox.top as i64 + bbox.height() - shown_h;
            cells = match location {
                PasteLocation::TopRight => (right_x, cells.1, shown_w, shown_h),
                PasteLocation::BottomRight => (right_x, bottom_y, shown_w, shown_h),
                PasteLocation::BottomLeft => (cells.0, bottom_y, shown_w, shown_h),
                _ => (cells.0, cells.1, shown_w, shown_h),
            };
        }
    }

    let mut offset = (0, 0);
    if rect_w > w || rect_h > h {
        offset = match location {
            PasteLocation::TopLeft => (0, 0),
            PasteLocation::TopRight => (rect_w - w, 0),
            PasteLocation::BottomRight => (rect_w - w, rect_h - h),
            PasteLocation::BottomLeft => (0, rect_h - h),
            PasteLocation::Middle => ((rect_w - w) / 2, (rect_h - h) / 2),
        };
    }
    PreviewGeometry { width: w.max(1), height: h.max(1), cells, offset }
}

/// Stencil of the pending paste plus the mode labels.
///
/// The stencil is rebuilt only when its key changes (pattern box, anchor,
/// magnification, style, colors, icons, rectangle or view size). Pointer
/// moves only change where it is blitted.
pub struct PastePreview {
    key: Option<PreviewKey>,
    stencil: RgbaImage,
    offset: (i32, i32),
    canvas: RgbImage,
    scratch: ExpandScratch,
    labels: Vec<RgbaImage>,
    rebuilds: usize,
}

impl PastePreview {
    pub fn new() -> Self {
        Self {
            key: None,
            stencil: RgbaImage::new(0, 0),
            offset: (0, 0),
            canvas: RgbImage::new(0, 0),
            scratch: ExpandScratch::new(),
            labels: PasteMode::ALL.iter().map(|m| rasterize_label(m.label())).collect(),
            rebuilds: 0,
        }
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn stencil(&self) -> &RgbaImage {
        &self.stencil
    }

    /// Offset of the stencil inside the paste rectangle.
    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    /// Drop the bitmap; the next `prepare` rebuilds it.
    pub fn clear(&mut self) {
        self.key = None;
        self.stencil = RgbaImage::new(0, 0);
    }

    /// Make sure the stencil matches the pattern drawn into `rect`.
    /// Returns true if it had to be rebuilt.
    pub fn prepare(&mut self, pattern: &PastePattern, view: &Viewport, rect: &PixelRect, location: PasteLocation, style: PreviewStyle) -> bool {
        let key = PreviewKey {
            rect_size: (rect.width, rect.height),
            view_size: (view.width(), view.height()),
            bbox: pattern.bbox,
            location,
            mag: view.mag(),
            style,
            colors: pattern.colors.clone(),
            icons: pattern.icons.as_ref().map(IconSet::stamp),
        };
        if self.key.as_ref() == Some(&key) {
            return false;
        }

        let mag = view.mag();
        let geom = preview_geometry(rect.width, rect.height, view.width(), view.height(), &pattern.bbox, location, mag);
        let (cx, cy, cw, ch) = geom.cells;
        let mid = if mag > 1 {
            CellCoord::new(cx + (cw - 1) / 2, cy + (ch - 1) / 2)
        } else {
            CellCoord::new(cx + cw / 2, cy + ch / 2)
        };
        let mut temp = Viewport::new(geom.width, geom.height);
        temp.set_position_mag(mid, mag);

        let colors = if style.swap_colors { pattern.colors.inverted() } else { pattern.colors.clone() };
        let options = ExpandOptions {
            show_icons: style.show_icons,
            grid_lines: false,
            swap_colors: style.swap_colors,
        };
        if self.canvas.dimensions() != (geom.width as u32, geom.height as u32) {
            self.canvas = RgbImage::new(geom.width as u32, geom.height as u32);
        }
        {
            let mut expander = ScaleExpander::new(&mut self.canvas, &colors, pattern.icons.as_ref(), options, &mut self.scratch);
            pattern.store.draw(&temp, &mut expander);
        }
        stencil_into(&self.canvas, colors.dead(), 255, &mut self.stencil);

        self.offset = geom.offset;
        self.key = Some(key);
        self.rebuilds += 1;
        log::debug!(
            "paste preview rebuilt: {}x{} at mag {}, offset {:?}",
            geom.width,
            geom.height,
            mag,
            geom.offset
        );
        true
    }

    /// Blit the stencil into `rect`, outline the whole rectangle and label it
    /// with `mode` just above when there is room.
    pub fn draw(&self, fb: &mut RgbImage, rect: &PixelRect, mode: PasteMode, outline: [u8; 3]) {
        blend_image(fb, &self.stencil, rect.x + self.offset.0, rect.y + self.offset.1);
        draw_outline(fb, *rect, 1, outline);
        if rect.y > 0 {
            let label = &self.labels[mode as usize];
            blend_image(fb, label, rect.x, rect.y - label.height() as i32 - 1);
        }
    }
}

impl Default for PastePreview {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
//  Paste session - Idle → AwaitingClick → Committing → Idle
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum PasteState {
    Idle,
    /// Tracking the pointer; `None` while it is outside the view.
    AwaitingClick { pointer: Option<(i32, i32)> },
    /// A valid click fixed the destination; the merge has not run yet.
    Committing { dest: CellBox, extent: GridExtent },
}

/// Input events fed to the session by the host event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasteEvent {
    PointerMoved(i32, i32),
    PointerLeft,
    Clicked(i32, i32),
    Cancelled,
    FocusLost,
}

/// What handling an event did.
#[derive(Clone, Debug, PartialEq)]
pub enum PasteStatus {
    /// No paste in progress; the event was ignored.
    Idle,
    /// Still placing.
    Tracking,
    /// Placement ended without touching the destination.
    Aborted,
    /// The destination is fixed; call `commit`.
    Placed(CellRect),
    /// Placement failed; back to idle.
    Failed(PasteError),
}

pub struct PasteSession {
    state: PasteState,
    pattern: Option<PastePattern>,
    location: PasteLocation,
    mode: PasteMode,
    preview: PastePreview,
}

impl PasteSession {
    pub fn new(location: PasteLocation, mode: PasteMode) -> Self {
        Self {
            state: PasteState::Idle,
            pattern: None,
            location,
            mode,
            preview: PastePreview::new(),
        }
    }

    pub fn state(&self) -> &PasteState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != PasteState::Idle
    }

    pub fn location(&self) -> PasteLocation {
        self.location
    }

    pub fn mode(&self) -> PasteMode {
        self.mode
    }

    pub fn pattern(&self) -> Option<&PastePattern> {
        self.pattern.as_ref()
    }

    pub fn preview(&self) -> &PastePreview {
        &self.preview
    }

    /// Start placing `pattern`.
    pub fn begin(&mut self, pattern: PastePattern) -> Result<(), PasteError> {
        if self.is_active() {
            return Err(PasteError::Busy);
        }
        log::info!("paste started: {}x{} cells, {:?}/{:?}", pattern.width(), pattern.height(), self.location, self.mode);
        self.pattern = Some(pattern);
        self.preview.clear();
        self.state = PasteState::AwaitingClick { pointer: None };
        Ok(())
    }

    /// Next anchor; the stencil follows on the next draw.
    pub fn cycle_location(&mut self) -> PasteLocation {
        self.location = self.location.cycle();
        self.location
    }

    pub fn cycle_mode(&mut self) -> PasteMode {
        self.mode = self.mode.cycle();
        self.mode
    }

    pub fn set_mode(&mut self, mode: PasteMode) {
        self.mode = mode;
    }

    pub fn handle(&mut self, event: PasteEvent, view: &Viewport) -> PasteStatus {
        if !matches!(self.state, PasteState::AwaitingClick { .. }) {
            return PasteStatus::Idle;
        }
        let Some(pattern) = self.pattern.as_ref() else {
            return self.abort();
        };
        let (w, h) = (pattern.width(), pattern.height());
        match event {
            PasteEvent::PointerMoved(x, y) => {
                let pointer = view.pixel_rect().contains(x, y).then_some((x, y));
                self.state = PasteState::AwaitingClick { pointer };
                PasteStatus::Tracking
            }
            PasteEvent::PointerLeft => {
                self.state = PasteState::AwaitingClick { pointer: None };
                PasteStatus::Tracking
            }
            PasteEvent::Cancelled | PasteEvent::FocusLost => self.abort(),
            PasteEvent::Clicked(x, y) => {
                if !view.pixel_rect().contains(x, y) {
                    return self.abort();
                }
                let extent = view.extent();
                let shown = paste_rect(view, x, y, w, h, self.location);
                if extent.excludes(&cells_under(view, &shown)) {
                    return self.abort();
                }
                let dest = paste::anchored_rect(&view.to_cell(x, y), w, h, self.location, view.mag());
                let checked = dest
                    .check_edit_limits()
                    .map_err(PasteError::from)
                    .and_then(|_| dest.to_box().ok_or(PasteError::OutOfBounds));
                match checked {
                    Ok(cells) => {
                        self.state = PasteState::Committing { dest: cells, extent };
                        PasteStatus::Placed(dest)
                    }
                    Err(e) => {
                        log::warn!("paste refused: {}", e);
                        self.finish();
                        PasteStatus::Failed(e)
                    }
                }
            }
        }
    }

    /// Run the merge for a placed paste and return to idle.
    pub fn commit(&mut self, target: &mut PasteTarget) -> Result<PasteOutcome, PasteError> {
        let PasteState::Committing { dest, extent } = self.state else {
            return Err(PasteError::NotPlaced);
        };
        let Some(pattern) = self.pattern.as_ref() else {
            self.finish();
            return Err(PasteError::NotPlaced);
        };
        let outcome = target.merge(&pattern.request(dest.left, dest.top, self.mode, extent));
        self.finish();
        Ok(outcome)
    }

    /// Paste rectangle under the pointer, while placing.
    pub fn paste_rect(&self, view: &Viewport) -> Option<PixelRect> {
        let PasteState::AwaitingClick { pointer: Some((x, y)) } = self.state else {
            return None;
        };
        let pattern = self.pattern.as_ref()?;
        Some(paste_rect(view, x, y, pattern.width(), pattern.height(), self.location))
    }

    /// Draw the stencil, outline and label for the current pointer position.
    pub fn draw(&mut self, fb: &mut RgbImage, view: &Viewport, style: PreviewStyle, outline: [u8; 3]) {
        let Some(rect) = self.paste_rect(view) else {
            return;
        };
        let Some(pattern) = self.pattern.as_ref() else {
            return;
        };
        self.preview.prepare(pattern, view, &rect, self.location, style);
        self.preview.draw(fb, &rect, self.mode, outline);
    }

    fn abort(&mut self) -> PasteStatus {
        log::info!("paste aborted");
        self.finish();
        PasteStatus::Aborted
    }

    fn finish(&mut self) {
        self.pattern = None;
        self.preview.clear();
        self.state = PasteState::Idle;
    }
}

impl Default for PasteSession {
    fn default() -> Self {
        Self::new(PasteLocation::default(), PasteMode::default())
    }
}
