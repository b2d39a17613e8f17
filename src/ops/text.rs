// ============================================================================
// LABEL TEXT – on-canvas labels rasterized with ab_glyph
// ============================================================================

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::{Rgba, RgbaImage};
use std::sync::OnceLock;

/// Pixel height labels are set at.
pub const LABEL_FONT_SIZE: f32 = 12.0;
/// Blank pixels around the text inside a label.
const PADDING: u32 = 2;

static LABEL_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

/// The bundled label font, parsed once.
pub fn label_font() -> Option<&'static FontArc> {
    LABEL_FONT
        .get_or_init(|| {
            match FontArc::try_from_slice(include_bytes!("../../assets/fonts/DejaVuSansMono.ttf")) {
                Ok(font) => Some(font),
                Err(e) => {
                    log::warn!("Label font failed to load: {}", e);
                    None
                }
            }
        })
        .as_ref()
}

/// Lay out one line at `size`: glyph ids with pen x positions, plus the
/// total advance width.
pub fn layout_line(font: &FontArc, text: &str, size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(size);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor_x += scaled.kern(prev, id);
        }
        glyphs.push((id, cursor_x));
        cursor_x += scaled.h_advance(id);
        last = Some(id);
    }
    (glyphs, cursor_x)
}

/// Size of the label bitmap `rasterize_label` produces for `text`.
pub fn label_size(text: &str) -> (u32, u32) {
    let Some(font) = label_font() else {
        return (2 * PADDING, 2 * PADDING);
    };
    let scaled = font.as_scaled(LABEL_FONT_SIZE);
    let (_, width) = layout_line(font, text, LABEL_FONT_SIZE);
    let height = scaled.ascent() - scaled.descent();
    (width.ceil() as u32 + 2 * PADDING, height.ceil() as u32 + 2 * PADDING)
}

/// Black anti-aliased text on an opaque white box.
pub fn rasterize_label(text: &str) -> RgbaImage {
    let (w, h) = label_size(text);
    let mut img = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
    let Some(font) = label_font() else {
        return img;
    };
    let ascent = font.as_scaled(LABEL_FONT_SIZE).ascent();
    let (glyphs, _) = layout_line(font, text, LABEL_FONT_SIZE);
    for (id, x) in glyphs {
        let glyph = id.with_scale_and_position(
            LABEL_FONT_SIZE,
            point(PADDING as f32 + x, PADDING as f32 + ascent),
        );
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let px = bounds.min.x as i32 + gx as i32;
            let py = bounds.min.y as i32 + gy as i32;
            if px < 0 || py < 0 || px >= w as i32 || py >= h as i32 {
                return;
            }
            let p = img.get_pixel_mut(px as u32, py as u32);
            let ink = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            let v = p.0[0].saturating_sub(ink);
            p.0 = [v, v, v, 255];
        });
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_font_is_bundled() {
        assert!(label_font().is_some());
    }

    #[test]
    fn label_dimensions() {
        let (w_or, h_or) = label_size("Or");
        let (w_xor, h_xor) = label_size("Xor");
        assert_eq!(h_or, h_xor);
        assert!(h_or > 2 * PADDING + 8);
        // monospace: one more glyph, one more advance
        assert!(w_xor > w_or);
        assert_eq!(label_size("").0, 2 * PADDING);
        assert_eq!(rasterize_label("Xor").dimensions(), (w_xor, h_xor));
    }

    #[test]
    fn glyphs_are_dark_on_white() {
        let img = rasterize_label("Copy");
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
        let dark = img.pixels().filter(|p| p.0[0] < 128).count();
        assert!(dark > 10, "only {} dark pixels", dark);
        assert!(img.pixels().all(|p| p.0[3] == 255 && p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn blank_label_is_just_the_box() {
        let img = rasterize_label("   ");
        assert!(img.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }
}
