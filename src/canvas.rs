// ============================================================================
// RENDER CONTEXT - composes layers, grid, selections, paste preview, controls
// ============================================================================

use std::borrow::Cow;

use image::RgbImage;
use num::{BigInt, Integer, ToPrimitive};
use rayon::prelude::*;

use crate::components::colors::ColorTable;
use crate::components::controls::{ControlsCorner, ControlsPanel};
use crate::components::layers::{CURRENT_TILE_FRAME_RGB, Layer, LayerDisplay, LayerStack, TILE_FRAME_RGB};
use crate::coords::{CellCoord, PixelRect};
use crate::ops::clipboard::{PasteSession, PreviewStyle};
use crate::ops::expand::{ExpandOptions, ExpandScratch, ScaleExpander};
use crate::ops::overlay::{SelectionOverlay, blend_image, draw_outline, fill_rect, stencil_into};
use crate::pool::ImagePool;
use crate::settings::RenderSettings;
use crate::viewport::Viewport;

/// Everything a frame needs besides the layers themselves.
///
/// Holds the reusable buffers (expander rows, selection bitmaps, pooled
/// offscreen images) so steady-state frames do not allocate.
pub struct RenderContext {
    pub settings: RenderSettings,
    pub controls: ControlsPanel,
    scratch: ExpandScratch,
    selection: SelectionOverlay,
    pool: ImagePool,
    frames: u64,
}

impl RenderContext {
    pub fn new(settings: RenderSettings) -> Self {
        let controls = ControlsPanel::new(settings.controls);
        Self {
            settings,
            controls,
            scratch: ExpandScratch::new(),
            selection: SelectionOverlay::new(),
            pool: ImagePool::new(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn pool(&self) -> &ImagePool {
        &self.pool
    }

    /// The viewport pointer events should be mapped through.
    pub fn event_view<'a>(&self, layers: &'a LayerStack) -> &'a Viewport {
        match self.settings.layer_display {
            LayerDisplay::Stacked => layers.get(0).map_or(&layers.current().view, |l| &l.view),
            _ => &layers.current().view,
        }
    }

    /// Fit every viewport to a `width × height` window.
    pub fn resize(&mut self, layers: &mut LayerStack, width: i32, height: i32) {
        if self.settings.layer_display == LayerDisplay::Tiled && layers.len() > 1 {
            layers.layout_tiles(width, height, self.settings.tile_border);
        } else {
            layers.untile(width, height);
        }
        self.pool.clear();
        log::debug!("render context resized to {}x{}", width, height);
    }

    /// Draw one frame of `layers` into `fb`.
    pub fn render(&mut self, layers: &mut LayerStack, paste: &mut PasteSession, fb: &mut RgbImage) {
        self.frames += 1;
        let tiled = self.settings.layer_display == LayerDisplay::Tiled && layers.len() > 1;
        let stacked = self.settings.layer_display == LayerDisplay::Stacked && layers.len() > 1;

        if tiled {
            if self.settings.sync_views {
                layers.sync_views();
            }
            self.render_tiles(layers, paste, fb);
            return;
        }

        let primary = if stacked { 0 } else { layers.current_index() };
        let Some(base) = layers.get(primary) else {
            return;
        };
        let view = base.view.clone();
        let current = layers.current_index();
        self.draw_cells(base, &view, fb);
        self.draw_grid(&base.colors, &view, fb);
        self.draw_border(&view, fb);
        self.draw_selection(base, &view, primary == current, fb);
        if stacked {
            // each layer's selection goes on right after its own cells
            for (i, layer) in layers.iter().enumerate().skip(1) {
                self.draw_stacked(layer, &view, fb);
                self.draw_selection(layer, &view, i == current, fb);
            }
        }
        self.draw_foreground(paste, &view, fb);
    }

    fn render_tiles(&mut self, layers: &LayerStack, paste: &mut PasteSession, fb: &mut RgbImage) {
        let current = layers.current_index();
        for (i, layer) in layers.iter().enumerate() {
            let tile = layer.tile_rect;
            if tile.is_empty() {
                continue;
            }
            let mut buf = self.pool.acquire_rgb(tile.width as u32, tile.height as u32);
            self.draw_cells(layer, &layer.view, &mut buf);
            self.draw_grid(&layer.colors, &layer.view, &mut buf);
            self.draw_border(&layer.view, &mut buf);
            self.draw_selection(layer, &layer.view, i == current, &mut buf);
            if i == current {
                self.draw_foreground(paste, &layer.view, &mut buf);
            }
            image::imageops::replace(fb, &buf, tile.x as i64, tile.y as i64);
            self.pool.release_rgb(buf);

            let color = if i == current { CURRENT_TILE_FRAME_RGB } else { TILE_FRAME_RGB };
            let border = self.settings.tile_border;
            draw_outline(fb, tile.inflate(border), border, color);
        }
    }

    /// Cells of one layer through `view`, filling all of `fb`.
    fn draw_cells(&mut self, layer: &Layer, view: &Viewport, fb: &mut RgbImage) {
        let colors = shown_colors(&layer.colors, self.settings.swap_colors);
        let options = ExpandOptions {
            show_icons: self.settings.show_icons,
            grid_lines: self.grid_visible(view),
            swap_colors: self.settings.swap_colors,
        };
        let mut expander = ScaleExpander::new(fb, &colors, layer.icons.as_ref(), options, &mut self.scratch);
        layer.store.draw(view, &mut expander);
    }

    /// A non-primary stacked layer: live pixels at the layer opacity.
    fn draw_stacked(&mut self, layer: &Layer, view: &Viewport, fb: &mut RgbImage) {
        let (w, h) = fb.dimensions();
        let mut buf = self.pool.acquire_rgb(w, h);
        let mut stencil = self.pool.acquire_rgba(w, h);
        self.draw_cells(layer, view, &mut buf);
        let dead = shown_colors(&layer.colors, self.settings.swap_colors).dead();
        let alpha = (2.55 * self.settings.layer_opacity as f32).round() as u8;
        stencil_into(&buf, dead, alpha, &mut stencil);
        blend_image(fb, &stencil, 0, 0);
        self.pool.release_rgb(buf);
        self.pool.release_rgba(stencil);
    }

    fn grid_visible(&self, view: &Viewport) -> bool {
        self.settings.show_grid_lines && view.mag() >= self.settings.min_grid_mag && view.mag() > 0
    }

    /// Plain lines every cell and bold lines every `bold_spacing` cells,
    /// inside the bounded area only.
    fn draw_grid(&self, colors: &ColorTable, view: &Viewport, fb: &mut RgbImage) {
        if !self.grid_visible(view) {
            return;
        }
        let Some(inside) = grid_area(view).and_then(|r| r.intersect(&frame_rect(fb))) else {
            return;
        };
        let colors = shown_colors(colors, self.settings.swap_colors);
        let (plain, bold) = grid_line_colors(&colors);
        let spacing = self.settings.show_bold_lines.then_some(self.settings.bold_spacing as i64);
        let cell = 1i32 << view.mag();
        let origin = view.origin();

        let lines = |start: i32, end: i32, first_cell: &BigInt| -> Vec<(i32, bool)> {
            let phase = spacing.map(|s| first_cell.mod_floor(&BigInt::from(s)).to_i64().unwrap_or(0));
            let mut out = Vec::new();
            let mut k = 1i64;
            loop {
                let pos = k * cell as i64 - 1;
                if pos >= end as i64 {
                    break;
                }
                if pos >= start as i64 {
                    // the line sits just left of (or above) cell `first_cell + k`
                    let is_bold = match (spacing, phase) {
                        (Some(s), Some(p)) => (p + k) % s == 0,
                        _ => false,
                    };
                    out.push((pos as i32, is_bold));
                }
                k += 1;
            }
            out
        };
        let verticals = lines(inside.x, inside.right(), &origin.x);
        let horizontals = lines(inside.y, inside.bottom(), &origin.y);

        let width = fb.width() as usize;
        let mut row_kind: Vec<Option<bool>> = vec![None; fb.height() as usize];
        for &(y, is_bold) in &horizontals {
            row_kind[y as usize] = Some(is_bold);
        }
        let stride = width * 3;
        let (x0, x1) = (inside.x as usize, inside.right() as usize);
        let buf: &mut [u8] = fb;
        buf.par_chunks_mut(stride)
            .enumerate()
            .skip(inside.y as usize)
            .take(inside.height as usize)
            .for_each(|(y, line)| {
                if let Some(is_bold) = row_kind[y] {
                    let rgb = if is_bold { bold } else { plain };
                    for px in line[x0 * 3..x1 * 3].chunks_exact_mut(3) {
                        px.copy_from_slice(&rgb);
                    }
                    for &(x, vbold) in &verticals {
                        if vbold {
                            line[x as usize * 3..x as usize * 3 + 3].copy_from_slice(&bold);
                        }
                    }
                } else {
                    for &(x, vbold) in &verticals {
                        let rgb = if vbold { bold } else { plain };
                        line[x as usize * 3..x as usize * 3 + 3].copy_from_slice(&rgb);
                    }
                }
            });
    }

    /// Paint everything outside a bounded grid with the border color.
    fn draw_border(&self, view: &Viewport, fb: &mut RgbImage) {
        if !view.extent().is_bounded() {
            return;
        }
        let full = frame_rect(fb);
        let rgb = self.settings.border_rgb;
        let Some(inside) = grid_area(view) else {
            fill_rect(fb, full, rgb, 255);
            return;
        };
        fill_rect(fb, PixelRect::new(0, 0, full.width, inside.y), rgb, 255);
        fill_rect(fb, PixelRect::new(0, inside.bottom(), full.width, full.height - inside.bottom()), rgb, 255);
        fill_rect(fb, PixelRect::new(0, inside.y, inside.x, inside.height), rgb, 255);
        fill_rect(
            fb,
            PixelRect::new(inside.right(), inside.y, full.width - inside.right(), inside.height),
            rgb,
            255,
        );
    }

    fn draw_selection(&mut self, layer: &Layer, view: &Viewport, active: bool, fb: &mut RgbImage) {
        let Some(region) = layer.selection.as_ref().and_then(|sel| view.visible_rect(sel)) else {
            return;
        };
        let (w, h) = fb.dimensions();
        self.selection.prepare(self.settings.selection_rgb, w, h);
        self.selection.draw(fb, region, active);
    }

    /// Paste preview, then the controls panel on top.
    fn draw_foreground(&mut self, paste: &mut PasteSession, view: &Viewport, fb: &mut RgbImage) {
        let style = PreviewStyle {
            show_icons: self.settings.show_icons,
            swap_colors: self.settings.swap_colors,
        };
        paste.draw(fb, view, style, self.settings.paste_rgb);

        if self.settings.controls == ControlsCorner::Hidden {
            return;
        }
        if self.controls.corner() != self.settings.controls {
            self.controls.set_corner(self.settings.controls, view.width(), view.height());
        } else {
            self.controls.layout(view.width(), view.height());
        }
        self.controls.draw(fb);
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(RenderSettings::default())
    }
}

fn shown_colors(colors: &ColorTable, swap: bool) -> Cow<'_, ColorTable> {
    if swap {
        Cow::Owned(colors.inverted())
    } else {
        Cow::Borrowed(colors)
    }
}

/// Plain and bold line colors: darker than a light dead color, lighter than
/// a dark one.
pub fn grid_line_colors(colors: &ColorTable) -> ([u8; 3], [u8; 3]) {
    let dead = colors.dead();
    if colors.dead_gray() > 127 {
        (dead.map(|c| c.saturating_sub(32)), dead.map(|c| c.saturating_sub(64)))
    } else {
        (dead.map(|c| c.saturating_add(32)), dead.map(|c| c.saturating_add(64)))
    }
}

fn frame_rect(fb: &RgbImage) -> PixelRect {
    PixelRect::from_size(fb.width() as i32, fb.height() as i32)
}

/// Pixels of the view that lie inside the grid's bounds.
fn grid_area(view: &Viewport) -> Option<PixelRect> {
    let full = PixelRect::from_size(view.width(), view.height());
    let extent = view.extent();
    let span = |bounds: Option<(i64, i64)>, pos: fn(&Viewport, &CellCoord) -> i32, size: i32| -> (i32, i32) {
        match bounds {
            Some((lo, hi)) => {
                let start = pos(view, &CellCoord::new(lo, lo));
                let end = pos(view, &CellCoord::new(hi + 1, hi + 1)).max(start + 1);
                (start.max(0), end.min(size))
            }
            None => (0, size),
        }
    };
    let (x0, x1) = span(extent.columns(), |v, c| v.to_pixel(c).0, full.width);
    let (y0, y1) = span(extent.rows(), |v, c| v.to_pixel(c).1, full.height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{CellRect, GridExtent};
    use crate::grid::SparseGrid;
    use image::Rgb;

    const DEAD: [u8; 3] = [48, 48, 48];

    fn layer(cells: impl IntoIterator<Item = (i32, i32, u8)>, w: i32, h: i32) -> Layer {
        Layer::new(
            "test".into(),
            Box::new(SparseGrid::from_cells(2, cells)),
            ColorTable::default(),
            w,
            h,
        )
    }

    fn context() -> RenderContext {
        RenderContext::new(RenderSettings {
            controls: ControlsCorner::Hidden,
            ..Default::default()
        })
    }

    fn frame(w: u32, h: u32) -> RgbImage {
        RgbImage::new(w, h)
    }

    #[test]
    fn grid_lines_are_dead_color_brightened() {
        let mut ctx = context();
        let mut l = layer([], 40, 40);
        l.view.set_mag(2);
        let mut layers = LayerStack::new(l);
        let mut fb = frame(40, 40);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        // cell size 4, so lines at 3, 7, 11 ...
        assert_eq!(fb.get_pixel(1, 1), &Rgb(DEAD));
        assert_eq!(fb.get_pixel(3, 1), &Rgb([80, 80, 80]));
        assert_eq!(fb.get_pixel(1, 7), &Rgb([80, 80, 80]));
    }

    #[test]
    fn bold_lines_follow_cell_coordinates() {
        let mut ctx = context();
        let mut l = layer([], 40, 40);
        // origin cell (0,0) at pixel (0,0)
        l.view.set_position_mag(CellCoord::new(5, 5), 2);
        let mut layers = LayerStack::new(l);
        let mut fb = frame(40, 40);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        // left edge of cell 10 is pixel 40, so its line is pixel 39
        assert_eq!(fb.get_pixel(39, 1), &Rgb([112, 112, 112]));
        assert_eq!(fb.get_pixel(35, 1), &Rgb([80, 80, 80]));
    }

    #[test]
    fn no_grid_below_min_mag() {
        let mut ctx = context();
        let mut l = layer([], 20, 20);
        l.view.set_mag(1);
        let mut layers = LayerStack::new(l);
        let mut fb = frame(20, 20);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        assert!(fb.pixels().all(|p| p.0 == DEAD));
    }

    #[test]
    fn outside_bounded_grid_uses_border_color() {
        let mut ctx = context();
        let mut l = layer([], 20, 20);
        l.view.set_extent(GridExtent::new(10, 10));
        let mut layers = LayerStack::new(l);
        let mut fb = frame(20, 20);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        // cells -5..=4 map to pixels 5..15
        assert_eq!(fb.get_pixel(4, 10), &Rgb([128, 128, 128]));
        assert_eq!(fb.get_pixel(5, 10), &Rgb(DEAD));
        assert_eq!(fb.get_pixel(14, 14), &Rgb(DEAD));
        assert_eq!(fb.get_pixel(15, 14), &Rgb([128, 128, 128]));
    }

    #[test]
    fn selection_is_blended() {
        let mut ctx = context();
        let mut l = layer([], 20, 20);
        l.selection = Some(CellRect::new(0, 0, 1, 1));
        let mut layers = LayerStack::new(l);
        let mut fb = frame(20, 20);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        assert_ne!(fb.get_pixel(10, 10), &Rgb(DEAD));
        assert_eq!(fb.get_pixel(12, 12), &Rgb(DEAD));
    }

    #[test]
    fn stacked_layer_uses_opacity() {
        let mut ctx = context();
        ctx.settings.layer_display = LayerDisplay::Stacked;
        ctx.settings.layer_opacity = 100;
        let mut layers = LayerStack::new(layer([], 20, 20));
        layers.push(layer([(0, 0, 1)], 20, 20));
        let mut fb = frame(20, 20);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        assert_eq!(fb.get_pixel(10, 10), &Rgb([255, 255, 255]));
        assert_eq!(fb.get_pixel(11, 10), &Rgb(DEAD));

        ctx.settings.layer_opacity = 50;
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        let mixed = fb.get_pixel(10, 10).0[0];
        assert!(mixed > DEAD[0] && mixed < 255);
        // buffers came back from the pool on the second frame
        assert_eq!(ctx.pool().allocations(), 2);
    }

    #[test]
    fn later_stacked_layer_covers_earlier_selection() {
        let mut ctx = context();
        ctx.settings.layer_display = LayerDisplay::Stacked;
        ctx.settings.layer_opacity = 100;
        let mut bottom = layer([], 20, 20);
        bottom.selection = Some(CellRect::new(0, 0, 1, 1));
        let mut layers = LayerStack::new(bottom);
        layers.push(layer([(0, 0, 1)], 20, 20));
        let mut fb = frame(20, 20);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        // cell (0,0) of the top layer sits on the bottom layer's selection
        assert_eq!(fb.get_pixel(10, 10), &Rgb([255, 255, 255]));
        let tinted = fb.get_pixel(11, 11);
        assert_ne!(tinted, &Rgb(DEAD));
        assert_ne!(tinted, &Rgb([255, 255, 255]));
    }

    #[test]
    fn frame_smaller_than_view_is_clipped() {
        let mut ctx = context();
        ctx.settings.show_bold_lines = false;
        let mut l = layer([(0, 0, 1)], 100, 100);
        l.view.set_mag(3);
        l.selection = Some(CellRect::new(-20, -20, 20, 20));
        let mut layers = LayerStack::new(l);
        let mut fb = frame(50, 50);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        assert_eq!(fb.dimensions(), (50, 50));

        let mut plain = layer([], 100, 100);
        plain.view.set_mag(3);
        let mut layers = LayerStack::new(plain);
        let mut fb = frame(50, 50);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        // cell size 8, so lines at 7, 15 ...
        assert_eq!(fb.get_pixel(7, 1), &Rgb([80, 80, 80]));
        assert_eq!(fb.get_pixel(1, 47), &Rgb([80, 80, 80]));
        assert_eq!(fb.get_pixel(1, 1), &Rgb(DEAD));
    }

    #[test]
    fn tiles_get_frames() {
        let mut ctx = context();
        ctx.settings.layer_display = LayerDisplay::Tiled;
        ctx.settings.tile_border = 2;
        let mut layers = LayerStack::new(layer([], 100, 50));
        layers.push(layer([], 100, 50));
        ctx.resize(&mut layers, 100, 50);
        let mut fb = frame(100, 50);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        // layer 1 is current, on the right
        assert_eq!(fb.get_pixel(0, 0), &Rgb(TILE_FRAME_RGB));
        assert_eq!(fb.get_pixel(99, 49), &Rgb(CURRENT_TILE_FRAME_RGB));
        assert_eq!(fb.get_pixel(20, 20), &Rgb(DEAD));
    }

    #[test]
    fn controls_panel_is_drawn_in_its_corner() {
        let mut ctx = RenderContext::default();
        let mut layers = LayerStack::new(layer([], 200, 200));
        let mut fb = frame(200, 200);
        ctx.render(&mut layers, &mut PasteSession::default(), &mut fb);
        assert_eq!(ctx.controls.rect(), PixelRect::new(0, 0, 78, 130));
        let drawn = (0..78).flat_map(|x| (0..130).map(move |y| (x, y))).any(|(x, y)| fb.get_pixel(x, y).0 != DEAD);
        assert!(drawn);
    }
}
