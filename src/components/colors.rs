// ============================================================================
// COLOR TABLE – one RGB triple per cell state, state 0 is dead
// ============================================================================

use serde::{Deserialize, Serialize};

/// Per-state colors owned by a layer. Read-only to the render pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTable {
    colors: Vec<[u8; 3]>,
}

impl ColorTable {
    /// Two-state table: dead and live.
    pub fn two_state(dead: [u8; 3], live: [u8; 3]) -> Self {
        Self { colors: vec![dead, live] }
    }

    /// `num_states` colors: `dead` for state 0, then a linear gradient from
    /// `from` (state 1) to `to` (the highest state).
    pub fn gradient(num_states: u32, dead: [u8; 3], from: [u8; 3], to: [u8; 3]) -> Self {
        let num_states = num_states.clamp(2, 256) as usize;
        let maxstate = num_states - 1;
        let mut colors = vec![dead; num_states];
        colors[1] = from;
        if maxstate > 2 {
            let n = (maxstate - 1) as f64;
            for (step, color) in colors.iter_mut().enumerate().take(maxstate).skip(2) {
                let t = (step - 1) as f64 / n;
                *color = [
                    lerp(from[0], to[0], t),
                    lerp(from[1], to[1], t),
                    lerp(from[2], to[2], t),
                ];
            }
        }
        if maxstate > 1 {
            colors[maxstate] = to;
        }
        Self { colors }
    }

    pub fn num_states(&self) -> u32 {
        self.colors.len() as u32
    }

    pub fn dead(&self) -> [u8; 3] {
        self.colors[0]
    }

    /// Color of `state`. Out-of-range states read as dead.
    pub fn get(&self, state: u8) -> [u8; 3] {
        match self.colors.get(state as usize) {
            Some(c) => *c,
            None => self.colors[0],
        }
    }

    pub fn set(&mut self, state: u8, rgb: [u8; 3]) {
        if let Some(c) = self.colors.get_mut(state as usize) {
            *c = rgb;
        }
    }

    /// Grow or shrink to `num_states`, padding with the last live color.
    pub fn resize(&mut self, num_states: u32) {
        let n = num_states.clamp(2, 256) as usize;
        let fill = self.colors.last().copied().unwrap_or([255, 255, 255]);
        self.colors.resize(n, fill);
    }

    /// Every channel inverted, for the "swap colors" display option.
    pub fn inverted(&self) -> Self {
        Self {
            colors: self
                .colors
                .iter()
                .map(|c| [255 - c[0], 255 - c[1], 255 - c[2]])
                .collect(),
        }
    }

    /// Separate R, G, B arrays, the layout engines expect for anti-aliasing.
    pub fn channels(&self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let r = self.colors.iter().map(|c| c[0]).collect();
        let g = self.colors.iter().map(|c| c[1]).collect();
        let b = self.colors.iter().map(|c| c[2]).collect();
        (r, g, b)
    }

    /// Gray level of the dead color, used to pick grid line contrast.
    pub fn dead_gray(&self) -> u8 {
        let [r, g, b] = self.dead();
        ((r as u32 + g as u32 + b as u32) / 3) as u8
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::two_state([48, 48, 48], [255, 255, 255])
    }
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t + 0.5).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_endpoints_and_midpoint() {
        let table = ColorTable::gradient(4, [0, 0, 0], [255, 0, 0], [255, 255, 0]);
        assert_eq!(table.num_states(), 4);
        assert_eq!(table.get(1), [255, 0, 0]);
        assert_eq!(table.get(2), [255, 128, 0]);
        assert_eq!(table.get(3), [255, 255, 0]);
    }

    #[test]
    fn out_of_range_state_reads_dead() {
        let table = ColorTable::two_state([1, 2, 3], [9, 9, 9]);
        assert_eq!(table.get(7), [1, 2, 3]);
    }

    #[test]
    fn inverted_and_channels() {
        let table = ColorTable::two_state([0, 10, 255], [200, 200, 200]).inverted();
        assert_eq!(table.dead(), [255, 245, 0]);
        let (r, g, b) = table.channels();
        assert_eq!((r[1], g[1], b[1]), (55, 55, 55));
    }

    #[test]
    fn resize_pads_with_last_color() {
        let mut table = ColorTable::two_state([0, 0, 0], [7, 8, 9]);
        table.resize(3);
        assert_eq!(table.get(2), [7, 8, 9]);
        table.resize(0);
        assert_eq!(table.num_states(), 2);
    }
}
