// ============================================================================
// OVERLAYS - alpha blending, selection highlight, stencils, outlines
// ============================================================================

use image::{Rgba, RgbaImage, RgbImage};
use rayon::prelude::*;

use crate::coords::PixelRect;

/// Alpha of the selection highlight (about 50%).
pub const SELECTION_ALPHA: u8 = 128;
/// Neutral gray used for selections of layers other than the current one.
pub const INACTIVE_SELECTION: [u8; 3] = [160, 160, 160];

/// `bg·(1−a) + fg·a` on one channel, with `a` in 0..=255.
#[inline]
pub fn blend_channel(bg: u8, fg: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((bg as u32 * (255 - a) + fg as u32 * a + 127) / 255) as u8
}

#[inline]
fn blend_px(dst: &mut [u8], src: &[u8; 4]) {
    match src[3] {
        0 => {}
        255 => dst.copy_from_slice(&src[..3]),
        a => {
            dst[0] = blend_channel(dst[0], src[0], a);
            dst[1] = blend_channel(dst[1], src[1], a);
            dst[2] = blend_channel(dst[2], src[2], a);
        }
    }
}

/// Blend the `src` region of `overlay` onto `fb` with its top-left at
/// `(dx, dy)`. Anything outside `fb` is clipped.
pub fn blend_region(fb: &mut RgbImage, overlay: &RgbaImage, src: PixelRect, dx: i32, dy: i32) {
    let Some(src) = src.intersect(&PixelRect::from_size(overlay.width() as i32, overlay.height() as i32)) else {
        return;
    };
    let dest = PixelRect::new(dx, dy, src.width, src.height);
    let Some(clip) = dest.intersect(&PixelRect::from_size(fb.width() as i32, fb.height() as i32)) else {
        return;
    };
    let sx = src.x + (clip.x - dx);
    let sy = src.y + (clip.y - dy);
    let fb_stride = fb.width() as usize * 3;
    let ov_stride = overlay.width() as usize * 4;
    let ov = overlay.as_raw();

    let fb_buf: &mut [u8] = fb;
    fb_buf
        .par_chunks_mut(fb_stride)
        .enumerate()
        .skip(clip.y as usize)
        .take(clip.height as usize)
        .for_each(|(row, line)| {
            let oy = sy as usize + (row - clip.y as usize);
            let src_line = &ov[oy * ov_stride..(oy + 1) * ov_stride];
            for i in 0..clip.width as usize {
                let s = (sx as usize + i) * 4;
                let d = (clip.x as usize + i) * 3;
                let px = [src_line[s], src_line[s + 1], src_line[s + 2], src_line[s + 3]];
                blend_px(&mut line[d..d + 3], &px);
            }
        });
}

/// Blend a whole overlay onto `fb` at `(dx, dy)`.
pub fn blend_image(fb: &mut RgbImage, overlay: &RgbaImage, dx: i32, dy: i32) {
    let src = PixelRect::from_size(overlay.width() as i32, overlay.height() as i32);
    blend_region(fb, overlay, src, dx, dy);
}

/// Fill `rect` with a solid color at the given alpha.
pub fn fill_rect(fb: &mut RgbImage, rect: PixelRect, rgb: [u8; 3], alpha: u8) {
    let Some(clip) = rect.intersect(&PixelRect::from_size(fb.width() as i32, fb.height() as i32)) else {
        return;
    };
    let stride = fb.width() as usize * 3;
    let px = [rgb[0], rgb[1], rgb[2], alpha];
    let buf: &mut [u8] = fb;
    buf.par_chunks_mut(stride)
        .skip(clip.y as usize)
        .take(clip.height as usize)
        .for_each(|line| {
            for d in line[clip.x as usize * 3..clip.right() as usize * 3].chunks_exact_mut(3) {
                blend_px(d, &px);
            }
        });
}

/// Draw an opaque outline `thickness` pixels wide just inside `rect`.
pub fn draw_outline(fb: &mut RgbImage, rect: PixelRect, thickness: i32, rgb: [u8; 3]) {
    if rect.is_empty() || thickness <= 0 {
        return;
    }
    let t = thickness.min(rect.width).min(rect.height);
    fill_rect(fb, PixelRect::new(rect.x, rect.y, rect.width, t), rgb, 255);
    fill_rect(fb, PixelRect::new(rect.x, rect.bottom() - t, rect.width, t), rgb, 255);
    fill_rect(fb, PixelRect::new(rect.x, rect.y, t, rect.height), rgb, 255);
    fill_rect(fb, PixelRect::new(rect.right() - t, rect.y, t, rect.height), rgb, 255);
}

/// Turn a rendered pattern into an overlay: pixels equal to `dead` become
/// fully transparent, everything else gets `live_alpha`.
pub fn stencil_into(src: &RgbImage, dead: [u8; 3], live_alpha: u8, out: &mut RgbaImage) {
    if out.dimensions() != src.dimensions() {
        *out = RgbaImage::new(src.width(), src.height());
    }
    let s: &[u8] = src;
    let o: &mut [u8] = out;
    o.par_chunks_mut(4)
        .zip(s.par_chunks(3))
        .for_each(|(dst, px)| {
            if px == &dead[..] {
                dst.copy_from_slice(&[0, 0, 0, 0]);
            } else {
                dst.copy_from_slice(&[px[0], px[1], px[2], live_alpha]);
            }
        });
}

/// Number of pixels with non-zero alpha.
pub fn opaque_count(img: &RgbaImage) -> usize {
    img.pixels().filter(|p| p.0[3] != 0).count()
}

// ============================================================================
// SELECTION OVERLAY
// ============================================================================

/// Viewport-sized highlight bitmaps, rebuilt only when the selection color or
/// the viewport size changes. The blended region is decided per frame.
pub struct SelectionOverlay {
    active: RgbaImage,
    inactive: RgbaImage,
    color: Option<[u8; 3]>,
    rebuilds: usize,
}

impl SelectionOverlay {
    pub fn new() -> Self {
        Self {
            active: RgbaImage::new(0, 0),
            inactive: RgbaImage::new(0, 0),
            color: None,
            rebuilds: 0,
        }
    }

    /// Make sure the bitmaps match `color` and `width × height`.
    /// Returns true if they had to be rebuilt.
    pub fn prepare(&mut self, color: [u8; 3], width: u32, height: u32) -> bool {
        if self.color == Some(color) && self.active.dimensions() == (width, height) {
            return false;
        }
        let [r, g, b] = color;
        let [ir, ig, ib] = INACTIVE_SELECTION;
        self.active = RgbaImage::from_pixel(width, height, Rgba([r, g, b, SELECTION_ALPHA]));
        self.inactive = RgbaImage::from_pixel(width, height, Rgba([ir, ig, ib, SELECTION_ALPHA]));
        self.color = Some(color);
        self.rebuilds += 1;
        log::debug!("selection overlay rebuilt at {}x{}", width, height);
        true
    }

    /// Force a rebuild on the next `prepare`.
    pub fn invalidate(&mut self) {
        self.color = None;
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Blend the highlight over `region` of `fb`.
    pub fn draw(&self, fb: &mut RgbImage, region: PixelRect, active: bool) {
        let bitmap = if active { &self.active } else { &self.inactive };
        blend_region(fb, bitmap, region, region.x, region.y);
    }
}

impl Default for SelectionOverlay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn blend_formula() {
        assert_eq!(blend_channel(0, 255, 128), 128);
        assert_eq!(blend_channel(200, 0, 0), 200);
        assert_eq!(blend_channel(200, 10, 255), 10);
        assert_eq!(blend_channel(100, 200, 192), 175);
    }

    #[test]
    fn blend_region_clips_to_framebuffer() {
        let mut fb = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let ov = RgbaImage::from_pixel(3, 3, Rgba([255, 255, 255, 255]));
        blend_image(&mut fb, &ov, 2, -1);
        assert_eq!(fb.get_pixel(3, 1).0, [255, 255, 255]);
        assert_eq!(fb.get_pixel(2, 2).0, [0, 0, 0]);
        assert_eq!(fb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn stencil_masks_dead_pixels() {
        let mut src = RgbImage::from_pixel(3, 1, Rgb([9, 9, 9]));
        src.put_pixel(1, 0, Rgb([200, 0, 0]));
        let mut out = RgbaImage::new(0, 0);
        stencil_into(&src, [9, 9, 9], 255, &mut out);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [200, 0, 0, 255]);
        assert_eq!(opaque_count(&out), 1);
    }

    #[test]
    fn selection_overlay_caches_until_color_or_size_changes() {
        let mut sel = SelectionOverlay::new();
        assert!(sel.prepare([75, 175, 0], 10, 10));
        assert!(!sel.prepare([75, 175, 0], 10, 10));
        assert!(sel.prepare([75, 175, 0], 12, 10));
        assert!(sel.prepare([0, 0, 255], 12, 10));
        sel.invalidate();
        assert!(sel.prepare([0, 0, 255], 12, 10));
        assert_eq!(sel.rebuilds(), 4);
    }

    #[test]
    fn inactive_selection_is_gray() {
        let mut sel = SelectionOverlay::new();
        sel.prepare([255, 0, 0], 4, 4);
        let mut fb = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        sel.draw(&mut fb, PixelRect::new(1, 1, 2, 2), false);
        assert_eq!(fb.get_pixel(1, 1).0, [80, 80, 80]);
        assert_eq!(fb.get_pixel(0, 0).0, [0, 0, 0]);
        sel.draw(&mut fb, PixelRect::new(0, 0, 1, 1), true);
        assert_eq!(fb.get_pixel(0, 0).0, [128, 0, 0]);
    }

    #[test]
    fn outline_draws_border_only() {
        let mut fb = RgbImage::from_pixel(5, 5, Rgb([0, 0, 0]));
        draw_outline(&mut fb, PixelRect::new(0, 0, 5, 5), 1, [255, 0, 0]);
        assert_eq!(fb.get_pixel(0, 2).0, [255, 0, 0]);
        assert_eq!(fb.get_pixel(4, 4).0, [255, 0, 0]);
        assert_eq!(fb.get_pixel(2, 2).0, [0, 0, 0]);
    }
}
