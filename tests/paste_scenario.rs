use cellview::canvas::RenderContext;
use cellview::components::colors::ColorTable;
use cellview::components::controls::ControlsCorner;
use cellview::components::layers::{Layer, LayerStack};
use cellview::coords::{CellRect, PixelRect};
use cellview::engine::NoProgress;
use cellview::grid::SparseGrid;
use cellview::ops::clipboard::{PasteEvent, PastePattern, PasteSession, PasteStatus};
use cellview::ops::overlay::opaque_count;
use cellview::ops::paste::{PasteLocation, PasteMode};
use cellview::settings::RenderSettings;
use image::RgbImage;

fn diagonal_stripes() -> Vec<(i32, i32, u8)> {
    (0..10)
        .flat_map(|y| (0..10).map(move |x| (x, y)))
        .filter(|(x, y)| (x + y) % 3 == 0)
        .map(|(x, y)| (x, y, 1))
        .collect()
}

#[test]
fn middle_paste_on_a_100_pixel_view() {
    let live = diagonal_stripes();
    let layer = Layer::new("dest".into(), Box::new(SparseGrid::new(2)), ColorTable::default(), 100, 100);
    let mut layers = LayerStack::new(layer);
    let mut ctx = RenderContext::new(RenderSettings {
        controls: ControlsCorner::Hidden,
        ..Default::default()
    });
    ctx.resize(&mut layers, 100, 100);

    let pattern = PastePattern::new(
        Box::new(SparseGrid::from_cells(2, live.iter().copied())),
        ColorTable::default(),
        None,
    )
    .expect("pattern");
    let mut session = PasteSession::new(PasteLocation::Middle, PasteMode::Copy);
    session.begin(pattern).expect("begin");

    let view = ctx.event_view(&layers).clone();
    assert_eq!(session.handle(PasteEvent::PointerMoved(50, 50), &view), PasteStatus::Tracking);
    let mut fb = RgbImage::new(100, 100);
    ctx.render(&mut layers, &mut session, &mut fb);

    assert_eq!(session.paste_rect(&view), Some(PixelRect::new(45, 45, 10, 10)));
    let stencil = session.preview().stencil();
    assert_eq!(stencil.dimensions(), (10, 10));
    assert_eq!(opaque_count(stencil), live.len());
    // the preview shows live cells in white, the rest keeps its dead color
    assert_eq!(fb.get_pixel(45 + 1, 45 + 2).0, [255, 255, 255]);
    assert_eq!(fb.get_pixel(45 + 1, 45 + 1).0, [48, 48, 48]);

    // pointer moves only shift the stencil
    session.handle(PasteEvent::PointerMoved(60, 30), &view);
    ctx.render(&mut layers, &mut session, &mut fb);
    assert_eq!(session.preview().rebuilds(), 1);

    let status = session.handle(PasteEvent::Clicked(50, 50), &view);
    assert_eq!(status, PasteStatus::Placed(CellRect::from_size(-5, -5, 10, 10)));
    let outcome = layers
        .current_mut()
        .commit_paste(&mut session, &mut NoProgress)
        .expect("commit");
    assert_eq!(outcome.changed, live.len() as u64);
    assert!(!session.is_active());

    let dest = &layers.current().store;
    for &(x, y, _) in &live {
        assert_eq!(dest.get_cell(x - 5, y - 5), 1);
    }
    assert_eq!(dest.bounding_box(), Some(CellRect::new(-5, -5, 4, 4)));

    assert!(layers.current_mut().undo().is_some());
    assert!(layers.current().store.is_empty());
}
