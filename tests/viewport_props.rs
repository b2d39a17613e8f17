use cellview::coords::{CellCoord, MAX_MAG, MIN_MAG};
use cellview::viewport::{Viewport, ZoomOutcome};
use proptest::prelude::*;

fn view_strategy() -> impl Strategy<Value = Viewport> {
    (
        1i32..1500,
        1i32..1500,
        -1_000_000_000_000i64..1_000_000_000_000,
        -1_000_000_000_000i64..1_000_000_000_000,
        MIN_MAG..=MAX_MAG,
    )
        .prop_map(|(w, h, x, y, mag)| {
            let mut view = Viewport::new(w, h);
            view.set_position_mag(CellCoord::new(x, y), mag);
            view
        })
}

proptest! {
    #[test]
    fn pixel_to_cell_and_back_stays_in_the_cell(view in view_strategy(), fx in 0.0f64..1.0, fy in 0.0f64..1.0) {
        let px = (fx * view.width() as f64) as i32;
        let py = (fy * view.height() as f64) as i32;
        let cell = view.to_cell(px, py);
        let (qx, qy) = view.to_pixel(&cell);
        let span = if view.mag() > 0 { 1 << view.mag() } else { 1 };
        prop_assert!((0..span).contains(&(px - qx)), "x {} -> {}", px, qx);
        prop_assert!((0..span).contains(&(py - qy)), "y {} -> {}", py, qy);
    }

    #[test]
    fn zoom_keeps_anchor_cell(mut view in view_strategy(), fx in 0.0f64..1.0, fy in 0.0f64..1.0, zoom_in in any::<bool>()) {
        let ax = (fx * view.width() as f64) as i32;
        let ay = (fy * view.height() as f64) as i32;
        let before = view.to_cell(ax, ay);
        let outcome = if zoom_in { view.zoom_in(Some((ax, ay))) } else { view.zoom_out(Some((ax, ay))) };
        if outcome == ZoomOutcome::Zoomed {
            prop_assert_eq!(view.to_cell(ax, ay), before);
        }
    }

    #[test]
    fn zoom_at_limit_changes_nothing(mut view in view_strategy()) {
        view.set_mag(MAX_MAG);
        let position = view.position().clone();
        prop_assert_eq!(view.zoom_in(None), ZoomOutcome::AtLimit);
        prop_assert_eq!(view.position(), &position);
        prop_assert_eq!(view.mag(), MAX_MAG);
    }
}
