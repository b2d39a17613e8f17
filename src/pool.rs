// ============================================================================
// IMAGE POOL - recycle offscreen frame buffers to avoid per-frame allocation
// ============================================================================

use std::collections::HashMap;

use image::{RgbImage, RgbaImage};

/// Key for pooled buffers: (width, height).
type PoolKey = (u32, u32);

/// Offscreen buffers keyed by dimensions.
///
/// Stacked layers each need a scratch RGB render and an RGBA stencil the size
/// of the viewport. Frames ask the pool first and hand the buffers back when
/// done, so steady-state drawing allocates nothing.
pub struct ImagePool {
    rgb: HashMap<PoolKey, Vec<RgbImage>>,
    rgba: HashMap<PoolKey, Vec<RgbaImage>>,
    /// Maximum number of buffers to keep per key and kind.
    max_per_key: usize,
    allocations: usize,
}

impl ImagePool {
    pub fn new() -> Self {
        Self {
            rgb: HashMap::new(),
            rgba: HashMap::new(),
            max_per_key: 4,
            allocations: 0,
        }
    }

    /// A `width × height` RGB buffer. Contents are unspecified when recycled.
    pub fn acquire_rgb(&mut self, width: u32, height: u32) -> RgbImage {
        match self.rgb.get_mut(&(width, height)).and_then(Vec::pop) {
            Some(img) => img,
            None => {
                self.allocations += 1;
                RgbImage::new(width, height)
            }
        }
    }

    /// A `width × height` RGBA buffer. Contents are unspecified when recycled.
    pub fn acquire_rgba(&mut self, width: u32, height: u32) -> RgbaImage {
        match self.rgba.get_mut(&(width, height)).and_then(Vec::pop) {
            Some(img) => img,
            None => {
                self.allocations += 1;
                RgbaImage::new(width, height)
            }
        }
    }

    /// Return a buffer. If the pool is full for its size it is dropped.
    pub fn release_rgb(&mut self, img: RgbImage) {
        let entry = self.rgb.entry(img.dimensions()).or_default();
        if entry.len() < self.max_per_key {
            entry.push(img);
        }
    }

    pub fn release_rgba(&mut self, img: RgbaImage) {
        let entry = self.rgba.entry(img.dimensions()).or_default();
        if entry.len() < self.max_per_key {
            entry.push(img);
        }
    }

    /// Drop all pooled buffers (e.g. after the window is resized).
    pub fn clear(&mut self) {
        self.rgb.clear();
        self.rgba.clear();
    }

    /// Total number of buffers currently in the pool.
    pub fn pooled_count(&self) -> usize {
        self.rgb.values().map(Vec::len).sum::<usize>() + self.rgba.values().map(Vec::len).sum::<usize>()
    }

    /// Approximate memory held by pooled buffers (bytes).
    pub fn pooled_memory_bytes(&self) -> usize {
        let rgb: usize = self
            .rgb
            .iter()
            .map(|((w, h), imgs)| (*w as usize) * (*h as usize) * 3 * imgs.len())
            .sum();
        let rgba: usize = self
            .rgba
            .iter()
            .map(|((w, h), imgs)| (*w as usize) * (*h as usize) * 4 * imgs.len())
            .sum();
        rgb + rgba
    }

    /// Buffers created because none of the right size was pooled.
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

impl Default for ImagePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_are_reused_by_size() {
        let mut pool = ImagePool::new();
        let a = pool.acquire_rgba(8, 4);
        pool.release_rgba(a);
        assert_eq!(pool.pooled_count(), 1);
        assert_eq!(pool.pooled_memory_bytes(), 8 * 4 * 4);
        let _ = pool.acquire_rgba(8, 4);
        assert_eq!(pool.allocations(), 1);
        let _ = pool.acquire_rgba(4, 8);
        assert_eq!(pool.allocations(), 2);
    }

    #[test]
    fn pool_caps_each_size() {
        let mut pool = ImagePool::new();
        for _ in 0..6 {
            pool.release_rgb(RgbImage::new(2, 2));
        }
        assert_eq!(pool.pooled_count(), 4);
        pool.clear();
        assert_eq!(pool.pooled_count(), 0);
    }
}
