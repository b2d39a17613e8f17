// ============================================================================
// LAYERS - pattern, view, selection and undo history per layer, plus tiling
// ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::components::colors::ColorTable;
use crate::components::history::{CellChangeLog, HistoryManager, PasteCommand};
use crate::coords::{CellRect, PixelRect};
use crate::engine::{PatternStore, ProgressSink};
use crate::ops::clipboard::{PasteSession, PasteTarget};
use crate::ops::icons::IconSet;
use crate::ops::paste::{PasteError, PasteOutcome};
use crate::settings::RenderSettings;
use crate::viewport::Viewport;

/// Frame around tiles that are not current.
pub const TILE_FRAME_RGB: [u8; 3] = [144, 144, 144];
/// Frame around the current tile.
pub const CURRENT_TILE_FRAME_RGB: [u8; 3] = [0, 255, 0];

/// How several layers share the view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerDisplay {
    /// Only the current layer is drawn.
    #[default]
    Single,
    /// All layers drawn over each other through the first layer's viewport.
    Stacked,
    /// Each layer gets its own tile and viewport.
    Tiled,
}

// ============================================================================
// LAYER
// ============================================================================

pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub store: Box<dyn PatternStore>,
    pub view: Viewport,
    pub selection: Option<CellRect>,
    pub colors: ColorTable,
    pub icons: Option<IconSet>,
    /// Set when cells changed since the last save.
    pub dirty: bool,
    pub history: HistoryManager,
    /// Where the layer is drawn when tiled. Empty otherwise.
    pub tile_rect: PixelRect,
}

impl Layer {
    pub fn new(name: String, store: Box<dyn PatternStore>, colors: ColorTable, width: i32, height: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            store,
            view: Viewport::new(width, height),
            selection: None,
            colors,
            icons: None,
            dirty: false,
            history: HistoryManager::default(),
            tile_rect: PixelRect::default(),
        }
    }

    pub fn with_icons(mut self, icons: IconSet) -> Self {
        self.icons = Some(icons);
        self
    }

    /// Take the magnification range and undo depth from `settings`.
    pub fn apply_settings(&mut self, settings: &RenderSettings) {
        self.view.set_mag_limits(settings.min_mag, settings.max_mag);
        self.history.set_max_history(settings.history_depth);
    }

    /// Commit a placed paste into this layer, recording it for undo.
    pub fn commit_paste(
        &mut self,
        session: &mut PasteSession,
        progress: &mut dyn ProgressSink,
    ) -> Result<PasteOutcome, PasteError> {
        let mode = session.mode();
        let mut changes = CellChangeLog::new();
        let outcome = {
            let mut target = PasteTarget {
                dest: &mut *self.store,
                recorder: Some(&mut changes),
                progress,
            };
            session.commit(&mut target)?
        };
        log::debug!(
            "paste into '{}': {} cells changed ({}){}",
            self.name,
            outcome.changed,
            mode.label(),
            if outcome.cancelled { ", cancelled" } else { "" }
        );
        if !changes.is_empty() {
            self.history
                .push(Box::new(PasteCommand::new(format!("Paste ({})", mode.label()), changes)));
            self.dirty = true;
        }
        Ok(outcome)
    }

    pub fn undo(&mut self) -> Option<String> {
        let done = self.history.undo(&mut *self.store)?;
        self.dirty = true;
        Some(done)
    }

    pub fn redo(&mut self) -> Option<String> {
        let done = self.history.redo(&mut *self.store)?;
        self.dirty = true;
        Some(done)
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered layers with one current layer. Never empty.
pub struct LayerStack {
    layers: Vec<Layer>,
    current: usize,
}

impl LayerStack {
    pub fn new(first: Layer) -> Self {
        Self {
            layers: vec![first],
            current: 0,
        }
    }

    /// Add a layer on top and make it current.
    pub fn push(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.current = self.layers.len() - 1;
        self.current
    }

    /// Remove a layer. The last remaining layer cannot be removed.
    pub fn remove(&mut self, index: usize) -> Option<Layer> {
        if self.layers.len() <= 1 || index >= self.layers.len() {
            return None;
        }
        let removed = self.layers.remove(index);
        if self.current > index || self.current >= self.layers.len() {
            self.current = self.current.saturating_sub(1);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Layer {
        &self.layers[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.current]
    }

    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.layers.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.layers.iter_mut()
    }

    pub fn apply_settings(&mut self, settings: &RenderSettings) {
        for layer in &mut self.layers {
            layer.apply_settings(settings);
        }
    }

    /// Give every other layer the current layer's position and scale.
    pub fn sync_views(&mut self) {
        let source = self.layers[self.current].view.clone();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            if i != self.current {
                layer.view.sync_from(&source);
            }
        }
    }

    /// Assign tile rectangles for a `width × height` area and size each
    /// layer's viewport to its tile.
    pub fn layout_tiles(&mut self, width: i32, height: i32, border: i32) {
        let rects = tile_layout(self.layers.len(), width, height, border);
        for (layer, rect) in self.layers.iter_mut().zip(rects) {
            layer.tile_rect = rect;
            layer.view.resize(rect.width, rect.height);
        }
    }

    /// Size every viewport to the whole area and forget the tiles.
    pub fn untile(&mut self, width: i32, height: i32) {
        for layer in &mut self.layers {
            layer.tile_rect = PixelRect::default();
            layer.view.resize(width, height);
        }
    }

    /// Index of the tile under a pixel.
    pub fn tile_at(&self, px: i32, py: i32) -> Option<usize> {
        self.layers.iter().position(|l| l.tile_rect.contains(px, py))
    }
}

// ============================================================================
// TILE LAYOUT
// ============================================================================

/// Split a `width × height` area into `count` tiles, each inset by `border`
/// pixels so neighboring tiles share an equal-width frame.
///
/// With 3, 5 or 7 tiles the grid has one spare cell, which widens the last tile.
pub fn tile_layout(count: usize, width: i32, height: i32, border: i32) -> Vec<PixelRect> {
    if count == 0 {
        return Vec::new();
    }
    let n = count as i32;
    let portrait = width <= height;
    let (mut rows, mut cols) = match count {
        4 => (2, 2),
        9 => (3, 3),
        3 | 5 | 7 if portrait => (n / 2 + 1, 2),
        3 | 5 | 7 => (2, n / 2 + 1),
        6 | 8 | 10 if portrait => (n / 2, 2),
        6 | 8 | 10 => (2, n / 2),
        _ if portrait => (n, 1),
        _ => (1, n),
    };

    let mut tile_w = width / cols;
    let mut tile_h = height / rows;
    if tile_w as f32 > tile_h as f32 * 2.5 {
        rows = 1;
        cols = n;
        tile_w = width / n;
        tile_h = height;
    } else if tile_h as f32 > tile_w as f32 * 2.5 {
        rows = n;
        cols = 1;
        tile_w = width;
        tile_h = height / n;
    }

    let mut tiles: Vec<PixelRect> = Vec::with_capacity(count);
    for i in 0..rows {
        for j in 0..cols {
            let mut r = PixelRect::new(j * tile_w, i * tile_h, tile_w, tile_h);
            // edge tiles absorb the division remainder
            if i == rows - 1 {
                r.height += height - rows * tile_h;
            }
            if j == cols - 1 {
                r.width += width - cols * tile_w;
            }
            if tiles.len() == count {
                if let Some(last) = tiles.last_mut() {
                    last.width += r.width - border;
                }
                continue;
            }
            r.x += border;
            r.y += border;
            r.width -= border;
            r.height -= border;
            if j == cols - 1 {
                r.width -= border;
            }
            if i == rows - 1 {
                r.height -= border;
            }
            tiles.push(r);
        }
    }
    tiles
}
