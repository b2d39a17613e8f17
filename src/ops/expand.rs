// ============================================================================
// SCALE EXPANDER – turns engine spans into framebuffer pixels
// ============================================================================

use image::RgbImage;

use crate::components::colors::ColorTable;
use crate::coords::PixelRect;
use crate::engine::CellRenderer;
use crate::ops::icons::IconSet;

/// How magnified cells are painted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpandOptions {
    pub show_icons: bool,
    /// True grid lines will be painted over this frame, so no gap pixels.
    pub grid_lines: bool,
    /// Invert multicolor icon ink.
    pub swap_colors: bool,
}

/// Recolored sprites for one (icon set, color table, size) combination.
#[derive(Default)]
struct SpriteCache {
    stamp: u64,
    size: u32,
    swap: bool,
    colors: Option<ColorTable>,
    sprites: Vec<Option<Vec<u8>>>,
}

impl SpriteCache {
    fn validate(&mut self, icons: &IconSet, colors: &ColorTable, size: u32, swap: bool) {
        let valid = self.stamp == icons.stamp()
            && self.size == size
            && self.swap == swap
            && self.colors.as_ref() == Some(colors);
        if !valid {
            self.stamp = icons.stamp();
            self.size = size;
            self.swap = swap;
            self.colors = Some(colors.clone());
            self.sprites.clear();
            self.sprites.resize(256, None);
        }
    }

    fn prepare(&mut self, icons: &IconSet, colors: &ColorTable, state: u8, scale: u32) {
        let slot = &mut self.sprites[state as usize];
        if slot.is_none()
            && let Some(icon) = icons.icon(state, scale)
        {
            *slot = Some(icons.recolor(icon, state, colors, self.swap));
        }
    }

    fn get(&self, state: u8) -> Option<&[u8]> {
        self.sprites.get(state as usize)?.as_deref()
    }
}

/// Buffers the expander keeps between spans and frames.
#[derive(Default)]
pub struct ExpandScratch {
    /// One expanded pixel row of the current span, packed RGB.
    row: Vec<u8>,
    sprites: SpriteCache,
    /// Times `row` had to grow; stays flat once the span width settles.
    grow_count: usize,
}

impl ExpandScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grow_count(&self) -> usize {
        self.grow_count
    }

    fn row(&mut self, len: usize) -> &mut [u8] {
        if self.row.len() < len {
            self.row.resize(len, 0);
            self.grow_count += 1;
        }
        &mut self.row[..len]
    }
}

/// Writes spans into an RGB framebuffer, clipped to its bounds.
pub struct ScaleExpander<'a> {
    target: &'a mut RgbImage,
    colors: &'a ColorTable,
    icons: Option<&'a IconSet>,
    options: ExpandOptions,
    scratch: &'a mut ExpandScratch,
}

impl<'a> ScaleExpander<'a> {
    pub fn new(
        target: &'a mut RgbImage,
        colors: &'a ColorTable,
        icons: Option<&'a IconSet>,
        options: ExpandOptions,
        scratch: &'a mut ExpandScratch,
    ) -> Self {
        Self { target, colors, icons, options, scratch }
    }

    fn bounds(&self) -> PixelRect {
        PixelRect::from_size(self.target.width() as i32, self.target.height() as i32)
    }

    /// Copy `src` (packed RGB of the full span row starting at `span_x`) into
    /// framebuffer row `y`, keeping only the part inside `clip`.
    fn put_row(target: &mut RgbImage, clip: &PixelRect, y: i32, span_x: i32, src: &[u8]) {
        let stride = target.width() as usize * 3;
        let skip = (clip.x - span_x) as usize * 3;
        let len = clip.width as usize * 3;
        let start = y as usize * stride + clip.x as usize * 3;
        let buf: &mut [u8] = target;
        buf[start..start + len].copy_from_slice(&src[skip..skip + len]);
    }

    fn expand_states(&mut self, x: i32, y: i32, w: i32, h: i32, data: &[u8], scale: u32) {
        if scale == 0 {
            log::warn!("blit_cells: zero scale for a {}x{} span", w, h);
            return;
        }
        let s = scale as i32;
        let cols = (w / s).max(0) as usize;
        let rows = (h / s).max(0) as usize;
        let covered = PixelRect::new(x, y, cols as i32 * s, rows as i32 * s);
        let Some(clip) = covered.intersect(&self.bounds()) else {
            return;
        };
        let num_states = self.colors.num_states();
        let dead = self.colors.dead();
        let gap = scale > 2 && !self.options.grid_lines;

        let use_icons = self.options.show_icons && scale > 2;
        let icons = if use_icons { self.icons } else { None };
        if let Some(icons) = icons {
            self.scratch.sprites.validate(icons, self.colors, scale, self.options.swap_colors);
            for &state in data.iter().take(cols * rows) {
                if (state as u32) < num_states {
                    self.scratch.sprites.prepare(icons, self.colors, state, scale);
                }
            }
        }
        let icon_size = scale as usize - 1;

        let ExpandScratch { row, sprites, grow_count } = &mut *self.scratch;
        let span_len = cols * scale as usize * 3;
        if row.len() < span_len {
            row.resize(span_len, 0);
            *grow_count += 1;
        }
        let row = &mut row[..span_len];

        for j in 0..rows {
            let block_top = y + (j as i32) * s;
            if block_top + s <= clip.y || block_top >= clip.bottom() {
                continue;
            }
            let states = &data[(j * cols).min(data.len())..((j + 1) * cols).min(data.len())];
            for r in 0..scale as usize {
                let py = block_top + r as i32;
                if py < clip.y || py >= clip.bottom() {
                    continue;
                }
                for i in 0..cols {
                    let mut state = states.get(i).copied().unwrap_or(0);
                    if state as u32 >= num_states {
                        state = 0;
                    }
                    let block = &mut row[i * scale as usize * 3..(i + 1) * scale as usize * 3];
                    let sprite = if icons.is_some() { sprites.get(state) } else { None };
                    match sprite {
                        _ if state == 0 => fill_rgb(block, dead),
                        Some(sprite) => {
                            if r >= icon_size {
                                fill_rgb(block, dead);
                            } else {
                                let line = &sprite[r * icon_size * 3..(r + 1) * icon_size * 3];
                                block[..icon_size * 3].copy_from_slice(line);
                                fill_rgb(&mut block[icon_size * 3..], dead);
                            }
                        }
                        None => {
                            let color = self.colors.get(state);
                            if gap && r == scale as usize - 1 {
                                fill_rgb(block, dead);
                            } else if gap {
                                fill_rgb(&mut block[..icon_size * 3], color);
                                fill_rgb(&mut block[icon_size * 3..], dead);
                            } else {
                                fill_rgb(block, color);
                            }
                        }
                    }
                }
                Self::put_row(self.target, &clip, py, x, row);
            }
        }
    }
}

impl CellRenderer for ScaleExpander<'_> {
    fn fill_dead(&mut self, x: i32, y: i32, w: i32, h: i32) {
        let Some(clip) = PixelRect::new(x, y, w, h).intersect(&self.bounds()) else {
            return;
        };
        let dead = self.colors.dead();
        let row = self.scratch.row(clip.width as usize * 3);
        fill_rgb(row, dead);
        for py in clip.y..clip.bottom() {
            Self::put_row(self.target, &clip, py, clip.x, &self.scratch.row[..clip.width as usize * 3]);
        }
    }

    fn blit_cells(&mut self, x: i32, y: i32, w: i32, h: i32, data: &[u8], scale: u32) {
        if scale == 1 {
            let Some(clip) = PixelRect::new(x, y, w, h).intersect(&self.bounds()) else {
                return;
            };
            let stride = w as usize * 3;
            if data.len() < stride * h as usize {
                log::warn!("blit_cells: {} bytes for a {}x{} RGB span", data.len(), w, h);
                return;
            }
            for py in clip.y..clip.bottom() {
                let src_row = &data[(py - y) as usize * stride..(py - y + 1) as usize * stride];
                Self::put_row(self.target, &clip, py, x, src_row);
            }
        } else {
            self.expand_states(x, y, w, h, data, scale);
        }
    }

    fn color_table(&self) -> &ColorTable {
        self.colors
    }
}

fn fill_rgb(buf: &mut [u8], rgb: [u8; 3]) {
    for px in buf.chunks_exact_mut(3) {
        px.copy_from_slice(&rgb);
    }
}
