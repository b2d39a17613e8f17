// ============================================================================
// cellview CLI - headless frame rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   cellview -o soup.png                                   (64x64 random soup, fitted)
//   cellview -o glider.png --pattern glider --mag 4
//   cellview -o stack.png --second-layer stacked --opacity 60
//   cellview -o paste.png --paste glider --paste-at 320,240 --paste-mode xor
//   cellview -o preview.png --paste rpent --paste-at 100,100 --preview-only
//
// No window is opened. Everything runs on the current thread apart from the
// rayon-parallel pixel loops.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::RgbImage;

use crate::canvas::RenderContext;
use crate::components::colors::ColorTable;
use crate::components::controls::ControlsCorner;
use crate::components::layers::{Layer, LayerDisplay, LayerStack};
use crate::coords::{CellBox, GridExtent};
use crate::engine::{LogProgress, PatternStore};
use crate::grid::SparseGrid;
use crate::ops::clipboard::{PasteEvent, PastePattern, PasteSession, PasteStatus};
use crate::ops::icons::IconSet;
use crate::ops::paste::{PasteError, PasteLocation, PasteMode};
use crate::settings::{RenderSettings, SettingsError};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// cellview headless renderer.
///
/// Builds a pattern, optionally pastes another one into it, and writes the
/// composited view as a PNG.
#[derive(Parser, Debug)]
#[command(
    name = "cellview",
    about = "Render cellular-automaton patterns to PNG without a window",
    long_about = "Render a random soup or a built-in pattern through the cellview\n\
                  viewport, with optional stacked or tiled layers and an optional\n\
                  paste, and save the frame as PNG.\n\n\
                  Example:\n  \
                  cellview -o out.png --pattern glider --paste rpent --paste-at 200,150"
)]
pub struct CliArgs {
    /// Output PNG file.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Frame width in pixels.
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Pattern for the main layer: soup, glider, blinker, block, rpent, acorn.
    #[arg(short, long, default_value = "soup")]
    pub pattern: String,

    /// Side of the square soup area, in cells.
    #[arg(long, default_value_t = 64)]
    pub soup_size: u32,

    /// Percentage of live cells in a soup.
    #[arg(long, default_value_t = 35, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub density: u32,

    /// Soup seed.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Number of cell states (2..=256).
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(2..=256))]
    pub states: u32,

    /// Magnification as a power of two (negative zooms out). Fits the pattern when omitted.
    #[arg(short, long, allow_negative_numbers = true)]
    pub mag: Option<i32>,

    /// Bounded grid size, e.g. 100x80. A zero side is unbounded.
    #[arg(long, value_name = "WxH")]
    pub extent: Option<String>,

    /// Add a second soup layer shown as: stacked, tiled.
    #[arg(long, value_name = "MODE")]
    pub second_layer: Option<String>,

    /// Opacity of stacked layers, in percent.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub opacity: Option<u8>,

    /// Built-in pattern to paste into the main layer.
    #[arg(long, value_name = "PATTERN")]
    pub paste: Option<String>,

    /// Pixel where the paste is clicked, e.g. 320,240. Defaults to the frame centre.
    #[arg(long, value_name = "X,Y", allow_hyphen_values = true)]
    pub paste_at: Option<String>,

    /// Merge mode: and, copy, or, xor.
    #[arg(long)]
    pub paste_mode: Option<String>,

    /// Paste anchor: topleft, topright, bottomright, bottomleft, middle.
    #[arg(long)]
    pub paste_anchor: Option<String>,

    /// Draw the paste preview at --paste-at instead of committing it.
    #[arg(long)]
    pub preview_only: bool,

    /// Draw icons when zoomed in far enough.
    #[arg(long)]
    pub icons: bool,

    /// Invert every cell color.
    #[arg(long)]
    pub swap_colors: bool,

    /// Hide grid lines.
    #[arg(long)]
    pub no_grid: bool,

    /// Controls panel corner: topleft, topright, bottomright, bottomleft, hidden.
    #[arg(long, default_value = "hidden")]
    pub controls: String,

    /// Settings file to start from instead of the saved preferences.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Store the settings this run used (flags included) for later runs.
    #[arg(long)]
    pub save_settings: bool,

    /// Print timing and paste results.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    /// A flag value could not be understood.
    BadArgument(String),
    Settings(SettingsError),
    Paste(PasteError),
    /// The click missed the view or the bounded grid.
    PasteAborted,
    Image(image::ImageError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::BadArgument(msg) => write!(f, "{msg}"),
            CliError::Settings(e) => write!(f, "{e}"),
            CliError::Paste(e) => write!(f, "paste failed: {e}"),
            CliError::PasteAborted => write!(f, "paste aborted: click outside the view or grid"),
            CliError::Image(e) => write!(f, "could not write image: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Settings(e) => Some(e),
            CliError::Paste(e) => Some(e),
            CliError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(e: SettingsError) -> Self {
        CliError::Settings(e)
    }
}

impl From<PasteError> for CliError {
    fn from(e: PasteError) -> Self {
        CliError::Paste(e)
    }
}

impl From<image::ImageError> for CliError {
    fn from(e: image::ImageError) -> Self {
        CliError::Image(e)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Render one frame and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match render(&args) {
        Ok(report) => {
            if args.verbose {
                if let Some(line) = report {
                    println!("  {}", line);
                }
                println!(
                    "  → {} ({:.0}ms)",
                    args.output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Build the scene described by `args`, render it and save it.
/// Returns a line describing the paste, if one was committed.
pub fn render(args: &CliArgs) -> Result<Option<String>, CliError> {
    let (frame, report) = render_frame(args)?;
    frame.save(&args.output)?;
    log::info!("wrote {}", args.output.display());
    if args.save_settings {
        let settings = effective_settings(args)?;
        match &args.settings {
            Some(path) => settings.save_to(path)?,
            None => settings.save()?,
        }
    }
    Ok(report)
}

/// Saved preferences (or `--settings`) with the command-line overrides on top.
pub fn effective_settings(args: &CliArgs) -> Result<RenderSettings, CliError> {
    let mut settings = match &args.settings {
        Some(path) => RenderSettings::load_from(path)?,
        None => RenderSettings::load(),
    };
    settings.show_icons |= args.icons;
    settings.swap_colors |= args.swap_colors;
    if args.no_grid {
        settings.show_grid_lines = false;
    }
    settings.controls = parse_corner(&args.controls)?;
    if let Some(opacity) = args.opacity {
        settings.layer_opacity = opacity;
    }
    if let Some(mode) = &args.paste_mode {
        settings.paste_mode = parse_mode(mode)?;
    }
    if let Some(anchor) = &args.paste_anchor {
        settings.paste_location = parse_anchor(anchor)?;
    }
    if let Some(display) = args.second_layer.as_deref().map(parse_display).transpose()? {
        settings.layer_display = display;
    }
    Ok(settings.sanitized())
}

/// Build and render the scene without writing it anywhere.
pub fn render_frame(args: &CliArgs) -> Result<(RgbImage, Option<String>), CliError> {
    let settings = effective_settings(args)?;
    let second = args.second_layer.is_some();

    let (w, h) = (args.width.clamp(1, 16384) as i32, args.height.clamp(1, 16384) as i32);
    let extent = match &args.extent {
        Some(text) => parse_extent(text)?,
        None => GridExtent::default(),
    };
    let colors = color_table(args.states);

    let main_store = build_store(&args.pattern, args.states, args.soup_size, args.density, args.seed)?;
    let mut main = Layer::new(args.pattern.clone(), main_store, colors.clone(), w, h);
    if settings.show_icons {
        main = main.with_icons(IconSet::circles(args.states));
    }
    let mut layers = LayerStack::new(main);
    if second {
        let store = build_store("soup", args.states, args.soup_size, args.density, args.seed.wrapping_add(1))?;
        let mut layer = Layer::new("soup 2".into(), store, colors.clone(), w, h);
        if settings.show_icons {
            layer = layer.with_icons(IconSet::circles(args.states));
        }
        layers.push(layer);
        // pastes go to the main layer
        layers.set_current(0);
    }
    layers.apply_settings(&settings);

    let mut ctx = RenderContext::new(settings);
    ctx.resize(&mut layers, w, h);
    for layer in layers.iter_mut() {
        layer.view.set_extent(extent);
        let bounds = layer.store.bounding_box();
        match (args.mag, bounds) {
            (Some(mag), Some(bounds)) => layer.view.center_on(&bounds, mag),
            (Some(mag), None) => layer.view.set_mag(mag),
            (None, Some(bounds)) => {
                layer.view.fit(&bounds, 2);
            }
            (None, None) => {}
        }
    }

    let mut session = PasteSession::new(ctx.settings.paste_location, ctx.settings.paste_mode);
    let mut report = None;
    if let Some(name) = &args.paste {
        let store = build_store(name, args.states, args.soup_size, args.density, args.seed)?;
        let pattern = PastePattern::new(store, colors, None)?;
        session.begin(pattern)?;
        let (px, py) = match &args.paste_at {
            Some(text) => parse_point(text)?,
            None => (w / 2, h / 2),
        };
        let view = ctx.event_view(&layers).clone();
        if args.preview_only {
            session.handle(PasteEvent::PointerMoved(px, py), &view);
        } else {
            match session.handle(PasteEvent::Clicked(px, py), &view) {
                PasteStatus::Placed(rect) => {
                    let outcome = layers.current_mut().commit_paste(&mut session, &mut LogProgress::default())?;
                    let mut line = format!(
                        "pasted {} at ({}, {}): {} cells changed",
                        name, rect.left, rect.top, outcome.changed
                    );
                    if let Some(notice) = outcome.notice() {
                        line.push_str(&format!(" ({})", notice));
                    }
                    report = Some(line);
                }
                PasteStatus::Failed(e) => return Err(CliError::Paste(e)),
                _ => return Err(CliError::PasteAborted),
            }
        }
    }

    let mut frame = RgbImage::new(w as u32, h as u32);
    ctx.render(&mut layers, &mut session, &mut frame);
    Ok((frame, report))
}

// ============================================================================
// Helpers
// ============================================================================

const GLIDER: &[(i32, i32)] = &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];
const BLINKER: &[(i32, i32)] = &[(0, 0), (1, 0), (2, 0)];
const BLOCK: &[(i32, i32)] = &[(0, 0), (1, 0), (0, 1), (1, 1)];
const R_PENTOMINO: &[(i32, i32)] = &[(1, 0), (2, 0), (0, 1), (1, 1), (1, 2)];
const ACORN: &[(i32, i32)] = &[(1, 0), (3, 1), (0, 2), (1, 2), (4, 2), (5, 2), (6, 2)];

fn named_pattern(name: &str) -> Option<&'static [(i32, i32)]> {
    match name.to_lowercase().as_str() {
        "glider" => Some(GLIDER),
        "blinker" => Some(BLINKER),
        "block" => Some(BLOCK),
        "rpent" | "r-pentomino" => Some(R_PENTOMINO),
        "acorn" => Some(ACORN),
        _ => None,
    }
}

/// A random soup centred on the origin, or a built-in pattern at the origin.
fn build_store(name: &str, states: u32, soup: u32, density: u32, seed: u64) -> Result<Box<dyn PatternStore>, CliError> {
    let mut grid = SparseGrid::new(states);
    if name.eq_ignore_ascii_case("soup") {
        let side = soup.clamp(1, 4096) as i32;
        let left = -(side / 2);
        grid.random_fill(CellBox::new(left, left, left + side - 1, left + side - 1), density, seed);
    } else {
        let cells = named_pattern(name).ok_or_else(|| CliError::BadArgument(format!("unknown pattern '{name}'")))?;
        // multi-state rules get the highest state so the color gradient shows
        let state = (states - 1).min(255) as u8;
        for &(x, y) in cells {
            grid.set_cell(x, y, state);
        }
    }
    Ok(Box::new(grid))
}

fn color_table(states: u32) -> ColorTable {
    if states <= 2 {
        ColorTable::default()
    } else {
        ColorTable::gradient(states, [48, 48, 48], [255, 255, 0], [255, 0, 0])
    }
}

fn parse_mode(text: &str) -> Result<PasteMode, CliError> {
    PasteMode::ALL
        .into_iter()
        .find(|m| m.label().eq_ignore_ascii_case(text))
        .ok_or_else(|| CliError::BadArgument(format!("unknown paste mode '{text}'")))
}

fn parse_anchor(text: &str) -> Result<PasteLocation, CliError> {
    match text.to_lowercase().replace(['-', '_'], "").as_str() {
        "topleft" => Ok(PasteLocation::TopLeft),
        "topright" => Ok(PasteLocation::TopRight),
        "bottomright" => Ok(PasteLocation::BottomRight),
        "bottomleft" => Ok(PasteLocation::BottomLeft),
        "middle" => Ok(PasteLocation::Middle),
        _ => Err(CliError::BadArgument(format!("unknown paste anchor '{text}'"))),
    }
}

fn parse_corner(text: &str) -> Result<ControlsCorner, CliError> {
    match text.to_lowercase().replace(['-', '_'], "").as_str() {
        "topleft" => Ok(ControlsCorner::TopLeft),
        "topright" => Ok(ControlsCorner::TopRight),
        "bottomright" => Ok(ControlsCorner::BottomRight),
        "bottomleft" => Ok(ControlsCorner::BottomLeft),
        "hidden" | "none" => Ok(ControlsCorner::Hidden),
        _ => Err(CliError::BadArgument(format!("unknown controls corner '{text}'"))),
    }
}

fn parse_display(text: &str) -> Result<LayerDisplay, CliError> {
    match text.to_lowercase().as_str() {
        "stacked" | "stack" => Ok(LayerDisplay::Stacked),
        "tiled" | "tile" => Ok(LayerDisplay::Tiled),
        _ => Err(CliError::BadArgument(format!("unknown layer display '{text}'"))),
    }
}

fn parse_pair<T: std::str::FromStr>(text: &str, sep: char, what: &str) -> Result<(T, T), CliError> {
    let bad = || CliError::BadArgument(format!("expected {what}, got '{text}'"));
    let (a, b) = text.split_once(sep).ok_or_else(bad)?;
    Ok((a.trim().parse().map_err(|_| bad())?, b.trim().parse().map_err(|_| bad())?))
}

fn parse_point(text: &str) -> Result<(i32, i32), CliError> {
    parse_pair(text, ',', "X,Y")
}

fn parse_extent(text: &str) -> Result<GridExtent, CliError> {
    let (w, h) = parse_pair::<u32>(&text.to_lowercase(), 'x', "WxH")?;
    Ok(GridExtent::new(w, h))
}
