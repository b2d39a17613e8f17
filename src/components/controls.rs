// ============================================================================
// TRANSLUCENT CONTROLS - 3×5 button panel drawn over a corner of the view
// ============================================================================

use image::{Rgba, RgbaImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::coords::{CellCoord, CellRect, PixelRect};
use crate::ops::overlay::{blend_image, blend_region};
use crate::viewport::{Viewport, ZoomOutcome};

/// Size of the outer border around the buttons.
const BORDER: i32 = 6;
/// Edge of each square button.
const BUTTON: i32 = 22;
const PER_ROW: i32 = 3;
const NUM_BUTTONS: i32 = 15;
/// Vertical gap after each of the first two rows.
const ROW_GAP: i32 = 4;

pub const PANEL_WIDTH: i32 = 2 * BORDER + PER_ROW * BUTTON;
pub const PANEL_HEIGHT: i32 = 2 * BORDER + (NUM_BUTTONS / PER_ROW) * BUTTON + 2 * ROW_GAP;

/// Alpha of every non-black pixel of the panel.
const PANEL_ALPHA: u8 = 192;
const PRESSED_RGBA: [u8; 4] = [20, 20, 20, 128];

const BODY: [u8; 3] = [190, 190, 190];
const EDGE: [u8; 3] = [110, 110, 110];
const INK: [u8; 3] = [40, 40, 40];

/// Buttons in panel order, left to right and top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Control {
    Step1,
    Slower,
    Faster,
    Fit,
    ZoomIn,
    ZoomOut,
    NW,
    Up,
    NE,
    Left,
    Middle,
    Right,
    SW,
    Down,
    SE,
}

impl Control {
    pub const ALL: [Control; 15] = [
        Control::Step1,
        Control::Slower,
        Control::Faster,
        Control::Fit,
        Control::ZoomIn,
        Control::ZoomOut,
        Control::NW,
        Control::Up,
        Control::NE,
        Control::Left,
        Control::Middle,
        Control::Right,
        Control::SW,
        Control::Down,
        Control::SE,
    ];

    fn index(self) -> i32 {
        self as i32
    }

    /// 7×7 glyph, low 7 bits of each row, MSB left.
    fn glyph(self) -> [u8; 7] {
        match self {
            Control::Step1 => [0b0001000, 0b0011000, 0b0001000, 0b0001000, 0b0001000, 0b0001000, 0b0011100],
            Control::Slower => [0b0000000, 0b0010010, 0b0100100, 0b1001000, 0b0100100, 0b0010010, 0b0000000],
            Control::Faster => [0b0000000, 0b0100100, 0b0010010, 0b0001001, 0b0010010, 0b0100100, 0b0000000],
            Control::Fit => [0b1100011, 0b1000001, 0b0000000, 0b0000000, 0b0000000, 0b1000001, 0b1100011],
            Control::ZoomIn => [0b0001000, 0b0001000, 0b0001000, 0b1111111, 0b0001000, 0b0001000, 0b0001000],
            Control::ZoomOut => [0b0000000, 0b0000000, 0b0000000, 0b1111111, 0b0000000, 0b0000000, 0b0000000],
            Control::NW => [0b1111000, 0b1100000, 0b1010000, 0b1001000, 0b0000100, 0b0000010, 0b0000001],
            Control::Up => [0b0001000, 0b0011100, 0b0101010, 0b1001001, 0b0001000, 0b0001000, 0b0001000],
            Control::NE => [0b0001111, 0b0000011, 0b0000101, 0b0001001, 0b0010000, 0b0100000, 0b1000000],
            Control::Left => [0b0001000, 0b0010000, 0b0100000, 0b1111111, 0b0100000, 0b0010000, 0b0001000],
            Control::Middle => [0b0000000, 0b0011100, 0b0100010, 0b0100010, 0b0100010, 0b0011100, 0b0000000],
            Control::Right => [0b0001000, 0b0000100, 0b0000010, 0b1111111, 0b0000010, 0b0000100, 0b0001000],
            Control::SW => [0b0000001, 0b0000010, 0b0000100, 0b1001000, 0b1010000, 0b1100000, 0b1111000],
            Control::Down => [0b0001000, 0b0001000, 0b0001000, 0b1001001, 0b0101010, 0b0011100, 0b0001000],
            Control::SE => [0b1000000, 0b0100000, 0b0010000, 0b0001001, 0b0000101, 0b0000011, 0b0001111],
        }
    }

    /// Top-left of this button inside the panel.
    fn origin(self) -> (i32, i32) {
        let i = self.index();
        let x = BORDER + (i % PER_ROW) * BUTTON;
        let mut y = BORDER + (i / PER_ROW) * BUTTON;
        if i >= 2 * PER_ROW {
            y += 2 * ROW_GAP;
        } else if i >= PER_ROW {
            y += ROW_GAP;
        }
        (x, y)
    }

    /// Perform the control's action on `view`.
    ///
    /// `bounds` is the pattern's bounding box, used by `Fit`. Speed controls
    /// are left to the host.
    pub fn apply(self, view: &mut Viewport, bounds: Option<&CellRect>) -> ControlAction {
        let small_x = small_scroll(view.mag(), view.width());
        let small_y = small_scroll(view.mag(), view.height());
        let diag = small_x.min(small_y);
        match self {
            Control::Step1 => return ControlAction::Speed(SpeedChange::Reset),
            Control::Slower => return ControlAction::Speed(SpeedChange::Slower),
            Control::Faster => return ControlAction::Speed(SpeedChange::Faster),
            Control::Fit => {
                if !bounds.is_some_and(|b| view.fit(b, 0)) {
                    return ControlAction::Nothing;
                }
            }
            Control::ZoomIn => {
                if view.zoom_in(None) == ZoomOutcome::AtLimit {
                    return ControlAction::Nothing;
                }
            }
            Control::ZoomOut => {
                if view.zoom_out(None) == ZoomOutcome::AtLimit {
                    return ControlAction::Nothing;
                }
            }
            Control::NW => view.pan(-diag, -diag),
            Control::Up => view.pan(0, -small_y),
            Control::NE => view.pan(diag, -diag),
            Control::Left => view.pan(-small_x, 0),
            Control::Middle => view.set_position(CellCoord::origin()),
            Control::Right => view.pan(small_x, 0),
            Control::SW => view.pan(-diag, diag),
            Control::Down => view.pan(0, small_y),
            Control::SE => view.pan(diag, diag),
        }
        ControlAction::ViewChanged
    }
}

/// Outcome of pressing a control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    ViewChanged,
    /// A generation speed change for the host to carry out.
    Speed(SpeedChange),
    Nothing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeedChange {
    Reset,
    Slower,
    Faster,
}

/// Pixels to pan for one press: whole cells when magnified (a single cell
/// once grid lines can show), otherwise about 5% of the view.
pub fn small_scroll(mag: i32, size: i32) -> i32 {
    if mag > 0 {
        if mag < 3 {
            let amount = ((size >> mag) / 20) << mag;
            if amount == 0 { 1 << mag } else { amount }
        } else {
            1 << mag
        }
    } else {
        (size / 20).max(1)
    }
}

/// Corner of the view holding the panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlsCorner {
    #[default]
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    Hidden,
}

/// Map a panel-local pixel to the button under it. Border and row gaps map to
/// nothing.
pub fn which_control(x: i32, y: i32) -> Option<Control> {
    let x = x - BORDER;
    let y = y - BORDER;
    if x < 0 || y < 0 {
        return None;
    }
    let row = if y < BUTTON + ROW_GAP {
        if y > BUTTON {
            return None;
        }
        1
    } else if y < 2 * (BUTTON + ROW_GAP) {
        if y > 2 * BUTTON + ROW_GAP {
            return None;
        }
        2
    } else {
        3 + (y - 2 * (BUTTON + ROW_GAP)) / BUTTON
    };
    let col = 1 + x / BUTTON;
    if col > PER_ROW || row > NUM_BUTTONS / PER_ROW {
        return None;
    }
    Control::ALL.get(((row - 1) * PER_ROW + col - 1) as usize).copied()
}

// ---------------------------------------------------------------------------
//  Panel
// ---------------------------------------------------------------------------

/// The translucent control panel: bitmap built once, placed per view size.
pub struct ControlsPanel {
    bitmap: RgbaImage,
    corner: ControlsCorner,
    rect: PixelRect,
    pressed: Option<Control>,
}

impl ControlsPanel {
    pub fn new(corner: ControlsCorner) -> Self {
        Self {
            bitmap: build_bitmap(),
            corner,
            rect: PixelRect::default(),
            pressed: None,
        }
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    /// Where the panel sits in the view; empty when hidden.
    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    pub fn corner(&self) -> ControlsCorner {
        self.corner
    }

    pub fn set_corner(&mut self, corner: ControlsCorner, view_w: i32, view_h: i32) {
        self.corner = corner;
        self.layout(view_w, view_h);
    }

    /// Recompute the panel position for a view of `view_w × view_h`.
    pub fn layout(&mut self, view_w: i32, view_h: i32) {
        let (w, h) = (PANEL_WIDTH, PANEL_HEIGHT);
        self.rect = match self.corner {
            ControlsCorner::TopLeft => PixelRect::new(0, 0, w, h),
            ControlsCorner::TopRight => PixelRect::new(view_w - w, 0, w, h),
            ControlsCorner::BottomRight => PixelRect::new(view_w - w, view_h - h, w, h),
            ControlsCorner::BottomLeft => PixelRect::new(0, view_h - h, w, h),
            ControlsCorner::Hidden => PixelRect::default(),
        };
    }

    /// Button under view pixel `(px, py)`.
    pub fn hit(&self, px: i32, py: i32) -> Option<Control> {
        if !self.rect.contains(px, py) {
            return None;
        }
        which_control(px - self.rect.x, py - self.rect.y)
    }

    pub fn press(&mut self, control: Option<Control>) {
        self.pressed = control;
    }

    pub fn pressed(&self) -> Option<Control> {
        self.pressed
    }

    /// Blend the panel, and the darkened pressed button, onto `fb`.
    pub fn draw(&self, fb: &mut RgbImage) {
        if self.rect.is_empty() {
            return;
        }
        blend_image(fb, &self.bitmap, self.rect.x, self.rect.y);
        if let Some(control) = self.pressed {
            let (bx, by) = control.origin();
            let dark = self.darkened(bx, by);
            let src = PixelRect::from_size(BUTTON, BUTTON);
            blend_region(fb, &dark, src, self.rect.x + bx, self.rect.y + by);
        }
    }

    fn darkened(&self, bx: i32, by: i32) -> RgbaImage {
        RgbaImage::from_fn(BUTTON as u32, BUTTON as u32, |x, y| {
            let a = self.bitmap.get_pixel(bx as u32 + x, by as u32 + y).0[3];
            if a == 0 { Rgba([0, 0, 0, 0]) } else { Rgba(PRESSED_RGBA) }
        })
    }
}

/// Draw the opaque panel, then make black transparent and the rest
/// translucent.
fn build_bitmap() -> RgbaImage {
    let mut img = RgbaImage::new(PANEL_WIDTH as u32, PANEL_HEIGHT as u32);
    let mut put = |x: i32, y: i32, rgb: [u8; 3]| {
        img.put_pixel(x as u32, y as u32, Rgba([rgb[0], rgb[1], rgb[2], 255]));
    };
    for control in Control::ALL {
        let (bx, by) = control.origin();
        // 1 px black margin keeps neighbouring buttons apart
        for y in 1..BUTTON - 1 {
            for x in 1..BUTTON - 1 {
                let edge = x == 1 || y == 1 || x == BUTTON - 2 || y == BUTTON - 2;
                put(bx + x, by + y, if edge { EDGE } else { BODY });
            }
        }
        for (row, bits) in control.glyph().iter().enumerate() {
            for col in 0..7 {
                if bits & (1 << (6 - col)) != 0 {
                    let gx = bx + 4 + col * 2;
                    let gy = by + 4 + row as i32 * 2;
                    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                        put(gx + dx, gy + dy, INK);
                    }
                }
            }
        }
    }
    for px in img.pixels_mut() {
        let [r, g, b, _] = px.0;
        px.0[3] = if r == 0 && g == 0 && b == 0 { 0 } else { PANEL_ALPHA };
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn panel_dimensions() {
        assert_eq!((PANEL_WIDTH, PANEL_HEIGHT), (78, 130));
        let panel = ControlsPanel::new(ControlsCorner::TopLeft);
        assert_eq!(panel.bitmap().dimensions(), (78, 130));
    }

    #[test]
    fn hit_testing_respects_border_and_gaps() {
        assert_eq!(which_control(0, 0), None);
        assert_eq!(which_control(6, 6), Some(Control::Step1));
        assert_eq!(which_control(6 + 44, 6), Some(Control::Faster));
        // inside the first row gap
        assert_eq!(which_control(10, 6 + 24), None);
        assert_eq!(which_control(10, 6 + 26), Some(Control::Fit));
        assert_eq!(which_control(6 + 22, 6 + 52 + 1), Some(Control::Up));
        assert_eq!(which_control(6 + 44, 6 + 52 + 66 - 1), Some(Control::SE));
        assert_eq!(which_control(6 + 66, 20), None);
        assert_eq!(which_control(10, 6 + 52 + 66), None);
    }

    #[test]
    fn every_button_maps_back_to_itself() {
        for control in Control::ALL {
            let (x, y) = control.origin();
            assert_eq!(which_control(x + 11, y + 11), Some(control));
        }
    }

    #[test]
    fn layout_follows_corner() {
        let mut panel = ControlsPanel::new(ControlsCorner::BottomRight);
        panel.layout(400, 300);
        assert_eq!(panel.rect(), PixelRect::new(322, 170, 78, 130));
        assert_eq!(panel.hit(322 + 6, 170 + 6), Some(Control::Step1));
        panel.set_corner(ControlsCorner::Hidden, 400, 300);
        assert!(panel.rect().is_empty());
        assert_eq!(panel.hit(0, 0), None);
    }

    #[test]
    fn pressed_button_is_darker() {
        let mut panel = ControlsPanel::new(ControlsCorner::TopLeft);
        panel.layout(200, 200);
        let mut plain = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        panel.draw(&mut plain);
        panel.press(Some(Control::Middle));
        let mut pressed = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        panel.draw(&mut pressed);
        let (x, y) = Control::Middle.origin();
        let (x, y) = (x as u32 + 3, y as u32 + 3);
        assert!(pressed.get_pixel(x, y).0[0] < plain.get_pixel(x, y).0[0]);
        // border pixels are transparent
        assert_eq!(plain.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn small_scroll_amounts() {
        assert_eq!(small_scroll(0, 400), 20);
        assert_eq!(small_scroll(-3, 10), 1);
        assert_eq!(small_scroll(1, 400), 20);
        assert_eq!(small_scroll(2, 40), 4);
        assert_eq!(small_scroll(4, 400), 16);
    }

    #[test]
    fn arrow_controls_pan_the_view() {
        let mut view = Viewport::new(400, 400);
        assert_eq!(Control::Right.apply(&mut view, None), ControlAction::ViewChanged);
        assert_eq!(view.position(), &CellCoord::new(20, 0));
        Control::NW.apply(&mut view, None);
        assert_eq!(view.position(), &CellCoord::new(0, -20));
        Control::Middle.apply(&mut view, None);
        assert_eq!(view.position(), &CellCoord::origin());
        assert_eq!(Control::Fit.apply(&mut view, None), ControlAction::Nothing);
        assert_eq!(Control::Faster.apply(&mut view, None), ControlAction::Speed(SpeedChange::Faster));
    }
}
