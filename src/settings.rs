// ============================================================================
// RENDER SETTINGS - persisted viewer preferences
// ============================================================================

use std::fmt;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::components::controls::ControlsCorner;
use crate::components::layers::LayerDisplay;
use crate::coords::{MAX_MAG, MIN_MAG};
use crate::ops::paste::{PasteLocation, PasteMode};

const SETTINGS_FILE: &str = "cellview_settings.json";

/// Preferences that affect how frames are rendered and how pastes behave.
///
/// Missing keys in a saved file fall back to their defaults, so older files
/// keep loading after new options are added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Draw icons instead of flat squares at 1:8 and above.
    pub show_icons: bool,
    /// Invert every cell color (and multicolor icon ink).
    pub swap_colors: bool,

    // Grid lines
    pub show_grid_lines: bool,
    /// Smallest magnification at which grid lines are drawn.
    pub min_grid_mag: i32,
    pub show_bold_lines: bool,
    /// Cells between bold lines.
    pub bold_spacing: u32,

    // Colors
    pub selection_rgb: [u8; 3],
    pub paste_rgb: [u8; 3],
    /// Area outside a bounded grid.
    pub border_rgb: [u8; 3],

    pub controls: ControlsCorner,

    // Layers
    pub layer_display: LayerDisplay,
    /// Opacity of stacked layers in percent, 1..=100.
    pub layer_opacity: u8,
    /// Tile frame width in pixels.
    pub tile_border: i32,
    /// Tiles copy the current layer's position and scale.
    pub sync_views: bool,

    pub min_mag: i32,
    pub max_mag: i32,

    pub paste_location: PasteLocation,
    pub paste_mode: PasteMode,

    /// Undo steps kept per layer.
    pub history_depth: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            show_icons: false,
            swap_colors: false,
            show_grid_lines: true,
            min_grid_mag: 2,
            show_bold_lines: true,
            bold_spacing: 10,
            selection_rgb: [75, 175, 0],
            paste_rgb: [255, 0, 0],
            border_rgb: [128, 128, 128],
            controls: ControlsCorner::TopLeft,
            layer_display: LayerDisplay::Single,
            layer_opacity: 80,
            tile_border: 3,
            sync_views: true,
            min_mag: MIN_MAG,
            max_mag: MAX_MAG,
            paste_location: PasteLocation::TopLeft,
            paste_mode: PasteMode::Copy,
            history_depth: 100,
        }
    }
}

impl RenderSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/cellview/cellview_settings.json  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\cellview\cellview_settings.json
    /// On macOS:   ~/Library/Application Support/cellview/cellview_settings.json
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let base = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            return Some(base.join("cellview").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("cellview").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("cellview")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let file = fs::File::open(path)?;
        let settings: RenderSettings = serde_json::from_reader(BufReader::new(file))?;
        Ok(settings.sanitized())
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        log::debug!("settings saved to {}", path.display());
        Ok(())
    }

    /// Pull every value back into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.layer_opacity = self.layer_opacity.clamp(1, 100);
        self.min_grid_mag = self.min_grid_mag.clamp(1, MAX_MAG);
        self.bold_spacing = self.bold_spacing.clamp(2, 100);
        self.tile_border = self.tile_border.clamp(1, 10);
        self.min_mag = self.min_mag.clamp(MIN_MAG, MAX_MAG);
        self.max_mag = self.max_mag.clamp(self.min_mag, MAX_MAG);
        self.history_depth = self.history_depth.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// No home or config directory could be determined.
    NoConfigDir,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "settings I/O error: {e}"),
            SettingsError::Json(e) => write!(f, "settings file is not valid: {e}"),
            SettingsError::NoConfigDir => write!(f, "no configuration directory available"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io(e) => Some(e),
            SettingsError::Json(e) => Some(e),
            SettingsError::NoConfigDir => None,
        }
    }
}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("cellview-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn saved_settings_load_back() {
        let path = scratch_file(SETTINGS_FILE);
        let settings = RenderSettings {
            show_icons: true,
            layer_opacity: 35,
            paste_mode: PasteMode::Xor,
            controls: ControlsCorner::BottomRight,
            ..Default::default()
        };
        settings.save_to(&path).expect("save");
        let loaded = RenderSettings::load_from(&path).expect("load");
        assert_eq!(loaded, settings);
        let _ = fs::remove_dir_all(path.parent().expect("dir"));
    }

    #[test]
    fn missing_keys_use_defaults_and_values_are_clamped() {
        let path = scratch_file("partial.json");
        fs::create_dir_all(path.parent().expect("dir")).expect("mkdir");
        fs::write(&path, r#"{ "layer_opacity": 0, "min_mag": -99, "show_grid_lines": false }"#).expect("write");
        let loaded = RenderSettings::load_from(&path).expect("load");
        assert_eq!(loaded.layer_opacity, 1);
        assert_eq!(loaded.min_mag, MIN_MAG);
        assert!(!loaded.show_grid_lines);
        assert_eq!(loaded.bold_spacing, 10);
        let _ = fs::remove_dir_all(path.parent().expect("dir"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let path = scratch_file("broken.json");
        fs::create_dir_all(path.parent().expect("dir")).expect("mkdir");
        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(RenderSettings::load_from(&path), Err(SettingsError::Json(_))));
        let _ = fs::remove_dir_all(path.parent().expect("dir"));
    }
}
