// ============================================================================
// ICON SETS – per-state sprites at 7×7, 15×15 and 31×31
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use image::{Rgb, RgbImage};

use crate::components::colors::ColorTable;

/// Supported icon edge lengths, one per magnified cell size 8, 16 and 32.
pub const ICON_SIZES: [u32; 3] = [7, 15, 31];

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

fn next_stamp() -> u64 {
    NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
}

/// Icons for the live states of a rule. State 0 never has an icon.
///
/// Black pixels are "not ink". In a grayscale set, white ink takes the state's
/// live color and gray ink blends from dead to live by its brightness. In a
/// multicolor set ink keeps its own RGB.
#[derive(Clone, Debug)]
pub struct IconSet {
    /// `sizes[k][state - 1]` is the icon of edge `ICON_SIZES[k]`.
    sizes: [Vec<Option<RgbImage>>; 3],
    multicolor: bool,
    stamp: u64,
}

impl IconSet {
    pub fn empty() -> Self {
        Self {
            sizes: [Vec::new(), Vec::new(), Vec::new()],
            multicolor: false,
            stamp: next_stamp(),
        }
    }

    /// Load icons of edge `size` from a vertical strip: the first square is
    /// state 1, the next state 2, and so on. Returns false if `size` is not one
    /// of `ICON_SIZES` or the strip is not `size` pixels wide.
    pub fn load_strip(&mut self, strip: &RgbImage, size: u32) -> bool {
        let Some(k) = size_index(size) else {
            return false;
        };
        if strip.width() != size || strip.height() < size {
            log::warn!("icon strip is {}x{}, expected width {}", strip.width(), strip.height(), size);
            return false;
        }
        let count = strip.height() / size;
        self.sizes[k] = (0..count)
            .map(|i| Some(image::imageops::crop_imm(strip, 0, i * size, size, size).to_image()))
            .collect();
        let multicolor = self.all_icons().any(is_multicolor);
        self.multicolor = multicolor;
        self.stamp = next_stamp();
        true
    }

    pub fn from_strip(strip: &RgbImage, size: u32) -> Option<Self> {
        let mut set = Self::empty();
        set.load_strip(strip, size).then_some(set)
    }

    /// Grayscale discs for states `1..num_states` at every size, with soft
    /// edges so the gray blend path gets used.
    pub fn circles(num_states: u32) -> Self {
        let live = num_states.clamp(2, 256) - 1;
        let mut set = Self::empty();
        for (k, &size) in ICON_SIZES.iter().enumerate() {
            let disc = disc_icon(size);
            set.sizes[k] = (0..live).map(|_| Some(disc.clone())).collect();
        }
        set
    }

    /// Icon for `state` when each cell is `scale` pixels wide.
    pub fn icon(&self, state: u8, scale: u32) -> Option<&RgbImage> {
        if state == 0 {
            return None;
        }
        let k = size_index(scale.checked_sub(1)?)?;
        self.sizes[k].get(state as usize - 1)?.as_ref()
    }

    pub fn has_size(&self, scale: u32) -> bool {
        scale
            .checked_sub(1)
            .and_then(size_index)
            .is_some_and(|k| self.sizes[k].iter().any(Option::is_some))
    }

    pub fn is_multicolor(&self) -> bool {
        self.multicolor
    }

    /// Changes whenever the set's content changes; used as a cache key.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    fn all_icons(&self) -> impl Iterator<Item = &RgbImage> {
        self.sizes.iter().flatten().flatten()
    }

    /// Recolor one icon into packed RGB, `size * size * 3` bytes.
    pub fn recolor(&self, icon: &RgbImage, state: u8, colors: &ColorTable, swap_colors: bool) -> Vec<u8> {
        let dead = colors.dead();
        let live = colors.get(state);
        let mut out = Vec::with_capacity((icon.width() * icon.height() * 3) as usize);
        for px in icon.pixels() {
            let [r, g, b] = px.0;
            let rgb = if r == 0 && g == 0 && b == 0 {
                dead
            } else if self.multicolor {
                if swap_colors { [255 - r, 255 - g, 255 - b] } else { [r, g, b] }
            } else if r == 255 {
                live
            } else {
                let frac = r as f32 / 255.0;
                [blend(dead[0], live[0], frac), blend(dead[1], live[1], frac), blend(dead[2], live[2], frac)]
            };
            out.extend_from_slice(&rgb);
        }
        out
    }
}

impl Default for IconSet {
    fn default() -> Self {
        Self::empty()
    }
}

fn size_index(size: u32) -> Option<usize> {
    ICON_SIZES.iter().position(|&s| s == size)
}

fn is_multicolor(icon: &RgbImage) -> bool {
    icon.pixels().any(|p| p.0[0] != p.0[1] || p.0[1] != p.0[2])
}

fn blend(dead: u8, live: u8, frac: f32) -> u8 {
    (dead as f32 + (live as f32 - dead as f32) * frac + 0.5) as u8
}

fn disc_icon(size: u32) -> RgbImage {
    let c = (size as f32 - 1.0) / 2.0;
    let radius = size as f32 / 2.0 - 0.5;
    RgbImage::from_fn(size, size, |x, y| {
        let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
        let v = if d <= radius - 0.5 {
            255
        } else if d >= radius + 0.5 {
            0
        } else {
            (255.0 * (radius + 0.5 - d)) as u8
        };
        Rgb([v, v, v])
    })
}
