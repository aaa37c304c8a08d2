//! Frame flushing against the headless device

mod common;

use common::*;
use tilevg_core::{Call, CallKind, Color, CompositeOperation, Paint, Scissor, Span};
use tilevg_gpu::SubmitPolicy;

const RED: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);

fn inside(x: u32, y: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
    (x0..x1).contains(&x) && (y0..y1).contains(&y)
}

#[test]
fn test_convex_fill_matches_stencil_fill() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let fan = rect_fan(2.0, 2.0, 14.0, 14.0);
    let bounds = [2.0, 2.0, 14.0, 14.0];
    let paint = Paint::color(RED);

    let mut frame = renderer.new_frame();
    frame.fill(&paint, CompositeOperation::SourceOver, &Scissor::NONE, 1.0, bounds, &[fill_path(&fan, true)]);
    assert!(matches!(frame.calls[0].kind, CallKind::ConvexFill { .. }));
    renderer.flush(&mut frame);
    let convex = pixels(&renderer);

    renderer.device_mut().clear([0.0; 4]);
    frame.fill(&paint, CompositeOperation::SourceOver, &Scissor::NONE, 1.0, bounds, &[fill_path(&fan, false)]);
    assert!(matches!(frame.calls[0].kind, CallKind::Fill { .. }));
    renderer.flush(&mut frame);
    let stenciled = pixels(&renderer);

    assert_eq!(convex, stenciled);
    assert!(renderer.device().target().stencil_is_clear());
    for y in 0..SIZE {
        for x in 0..SIZE {
            let expected = if inside(x, y, 2, 2, 14, 14) { [255, 0, 0, 255] } else { [0; 4] };
            assert_eq!(convex[(y * SIZE + x) as usize], expected, "pixel {x},{y}");
        }
    }
    Ok(())
}

#[test]
fn test_fill_nonzero_winding_hole() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let outer = rect_fan(2.0, 2.0, 14.0, 14.0);
    let inner = rect_fan_reversed(6.0, 6.0, 10.0, 10.0);

    let mut frame = renderer.new_frame();
    frame.fill(
        &Paint::color(RED),
        CompositeOperation::SourceOver,
        &Scissor::NONE,
        1.0,
        [2.0, 2.0, 14.0, 14.0],
        &[fill_path(&outer, false), fill_path(&inner, false)],
    );
    renderer.flush(&mut frame);
    save(&renderer, "fill_hole")?;

    let target = renderer.device().target();
    for y in 0..SIZE {
        for x in 0..SIZE {
            let painted = inside(x, y, 2, 2, 14, 14) && !inside(x, y, 6, 6, 10, 10);
            assert_eq!(target.pixel(x, y)[3] > 0.0, painted, "pixel {x},{y}");
        }
    }
    assert!(target.stencil_is_clear());
    Ok(())
}

#[test]
fn test_same_winding_fills_overlap_once() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let a = rect_fan(2.0, 2.0, 10.0, 10.0);
    let b = rect_fan(6.0, 6.0, 14.0, 14.0);

    let mut frame = renderer.new_frame();
    frame.fill(
        &Paint::color(Color::rgba(0.0, 0.0, 1.0, 0.5)),
        CompositeOperation::SourceOver,
        &Scissor::NONE,
        1.0,
        [2.0, 2.0, 14.0, 14.0],
        &[fill_path(&a, false), fill_path(&b, false)],
    );
    renderer.flush(&mut frame);

    let target = renderer.device().target();
    // winding 2 in the overlap still covers once
    assert!(approx(target.pixel(8, 8)[3], 0.5));
    assert!(approx(target.pixel(3, 3)[3], 0.5));
    assert!(target.stencil_is_clear());
    Ok(())
}

/// Alpha 0.5 red over `4..12` with a fringe out to `2..14`
fn fringed_fill(convex: bool) -> anyhow::Result<Vec<[u8; 4]>> {
    let mut renderer = renderer(config())?;
    let fan = rect_fan(4.0, 4.0, 12.0, 12.0);
    let fringe = fringe_ring([4.0, 4.0, 12.0, 12.0], [2.0, 2.0, 14.0, 14.0]);

    let mut frame = renderer.new_frame();
    frame.fill(
        &Paint::color(Color::rgba(1.0, 0.0, 0.0, 0.5)),
        CompositeOperation::SourceOver,
        &Scissor::NONE,
        1.0,
        [2.0, 2.0, 14.0, 14.0],
        &[fringed_path(&fan, &fringe, convex)],
    );
    assert_eq!(matches!(frame.calls[0].kind, CallKind::ConvexFill { .. }), convex);
    renderer.flush(&mut frame);

    let target = renderer.device().target();
    assert!(approx(target.pixel(8, 8)[3], 0.5));
    assert!(approx(target.pixel(4, 8)[3], 0.5));
    // u = 0.375 and 0.125 across the fringe
    assert!(approx(target.pixel(3, 8)[3], 0.375), "{:?}", target.pixel(3, 8));
    assert!(approx(target.pixel(2, 8)[3], 0.125), "{:?}", target.pixel(2, 8));
    assert_eq!(target.pixel(1, 8), [0.0; 4]);
    assert!(target.stencil_is_clear());
    Ok(pixels(&renderer))
}

#[test]
fn test_fill_fringes_match_convex_fringes() -> anyhow::Result<()> {
    let convex = fringed_fill(true)?;
    let stenciled = fringed_fill(false)?;
    assert_eq!(convex, stenciled);
    Ok(())
}

#[test]
fn test_fill_fringe_skips_covered_pixels() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let fan = rect_fan(4.0, 4.0, 12.0, 12.0);
    // the inner half of the fringe lies over the filled area
    let fringe = fringe_ring([5.0, 5.0, 11.0, 11.0], [3.0, 3.0, 13.0, 13.0]);

    let mut frame = renderer.new_frame();
    frame.fill(
        &Paint::color(Color::rgba(1.0, 0.0, 0.0, 0.5)),
        CompositeOperation::SourceOver,
        &Scissor::NONE,
        1.0,
        [3.0, 3.0, 13.0, 13.0],
        &[fringed_path(&fan, &fringe, false)],
    );
    renderer.flush(&mut frame);
    save(&renderer, "fill_fringe")?;

    let target = renderer.device().target();
    for (x, y) in [(4, 8), (11, 8), (8, 4), (8, 11), (4, 4), (8, 8)] {
        let pixel = target.pixel(x, y);
        assert!(approx(pixel[0], 0.5) && approx(pixel[3], 0.5), "pixel {x},{y}: {pixel:?}");
    }
    for (x, y) in [(3, 8), (12, 8), (8, 3), (8, 12)] {
        assert!(approx(target.pixel(x, y)[3], 0.125), "pixel {x},{y}: {:?}", target.pixel(x, y));
    }
    assert_eq!(target.pixel(2, 8), [0.0; 4]);
    assert!(target.stencil_is_clear());
    Ok(())
}

fn draw_cross(stencil_strokes: bool) -> anyhow::Result<tilevg_gpu::Renderer<tilevg_gpu::headless::HeadlessDevice>> {
    let mut renderer = renderer(config().stencil_strokes(stencil_strokes))?;
    let across = horizontal_strip(2.0, 14.0, 6.0, 10.0);
    let down = vertical_strip(2.0, 14.0, 6.0, 10.0);

    let mut frame = renderer.new_frame();
    frame.stroke(
        &Paint::color(Color::rgba(1.0, 0.0, 0.0, 0.5)),
        CompositeOperation::SourceOver,
        &Scissor::NONE,
        1.0,
        4.0,
        &[stroke_path(&across), stroke_path(&down)],
    );
    renderer.flush(&mut frame);
    Ok(renderer)
}

#[test]
fn test_stencil_stroke_blends_overlap_once() -> anyhow::Result<()> {
    let stenciled = draw_cross(true)?;
    let overwritten = draw_cross(false)?;
    save(&stenciled, "stroke_stencil")?;
    save(&overwritten, "stroke_overwrite")?;

    let once = stenciled.device().target().pixel(8, 8);
    assert!(approx(once[0], 0.5) && approx(once[3], 0.5), "{once:?}");
    let twice = overwritten.device().target().pixel(8, 8);
    assert!(approx(twice[0], 0.75) && approx(twice[3], 0.75), "{twice:?}");

    // outside the overlap both strategies agree, including the fringe
    for (x, y) in [(3, 8), (3, 6), (8, 3), (13, 9)] {
        let a = stenciled.device().target().pixel(x, y);
        let b = overwritten.device().target().pixel(x, y);
        assert!(approx(a[3], b[3]), "pixel {x},{y}: {a:?} vs {b:?}");
    }
    assert!(stenciled.device().target().stencil_is_clear());
    Ok(())
}

#[test]
fn test_scissor_clips_fill() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let fan = rect_fan(0.0, 0.0, 16.0, 16.0);

    let mut frame = renderer.new_frame();
    frame.fill(
        &Paint::color(RED),
        CompositeOperation::SourceOver,
        &Scissor::rect(0.0, 0.0, 8.0, 16.0),
        1.0,
        [0.0, 0.0, 16.0, 16.0],
        &[fill_path(&fan, true)],
    );
    renderer.flush(&mut frame);

    let target = renderer.device().target();
    assert_eq!(target.pixel_rgba8(7, 5), [255, 0, 0, 255]);
    assert_eq!(target.pixel_rgba8(8, 5), [0; 4]);
    Ok(())
}

#[test]
fn test_linear_gradient_ramps() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let fan = rect_fan(0.0, 0.0, 16.0, 16.0);
    let paint = Paint::linear_gradient(0.0, 0.0, 16.0, 0.0, Color::BLACK, Color::WHITE);

    let mut frame = renderer.new_frame();
    frame.fill(&paint, CompositeOperation::SourceOver, &Scissor::NONE, 1.0, [0.0, 0.0, 16.0, 16.0], &[fill_path(&fan, true)]);
    renderer.flush(&mut frame);

    let target = renderer.device().target();
    let row: Vec<f32> = (0..SIZE).map(|x| target.pixel(x, 4)[0]).collect();
    assert!(row.windows(2).all(|w| w[0] <= w[1]), "{row:?}");
    assert!(row[0] < 0.1 && row[15] > 0.9, "{row:?}");
    Ok(())
}

#[test]
fn test_destination_out_erases() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let full = rect_fan(0.0, 0.0, 16.0, 16.0);
    let hole = rect_fan(4.0, 4.0, 12.0, 12.0);

    let mut frame = renderer.new_frame();
    frame.fill(&Paint::color(RED), CompositeOperation::SourceOver, &Scissor::NONE, 1.0, [0.0, 0.0, 16.0, 16.0], &[fill_path(&full, true)]);
    frame.fill(
        &Paint::color(Color::WHITE),
        CompositeOperation::DestinationOut,
        &Scissor::NONE,
        1.0,
        [4.0, 4.0, 12.0, 12.0],
        &[fill_path(&hole, true)],
    );
    renderer.flush(&mut frame);

    let target = renderer.device().target();
    assert_eq!(target.pixel_rgba8(8, 8), [0; 4]);
    assert_eq!(target.pixel_rgba8(1, 1), [255, 0, 0, 255]);
    Ok(())
}

#[test]
fn test_empty_flush_submits_nothing() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let before = renderer.device().stats();
    let mut frame = renderer.new_frame();
    renderer.flush(&mut frame);
    assert_eq!(renderer.device().stats(), before);
    Ok(())
}

fn three_calls(renderer: &tilevg_gpu::Renderer<tilevg_gpu::headless::HeadlessDevice>) -> tilevg_core::FrameBuffers {
    let fan = rect_fan(2.0, 2.0, 6.0, 6.0);
    let strip = horizontal_strip(2.0, 14.0, 10.0, 12.0);
    let mut frame = renderer.new_frame();
    let paint = Paint::color(RED);
    let op = CompositeOperation::SourceOver;
    frame.fill(&paint, op, &Scissor::NONE, 1.0, [2.0, 2.0, 6.0, 6.0], &[fill_path(&fan, true)]);
    frame.fill(&paint, op, &Scissor::NONE, 1.0, [2.0, 2.0, 6.0, 6.0], &[fill_path(&fan, false)]);
    frame.stroke(&paint, op, &Scissor::NONE, 1.0, 2.0, &[stroke_path(&strip)]);
    frame
}

#[test]
fn test_per_call_submission() -> anyhow::Result<()> {
    let mut renderer = renderer(config())?;
    let before = renderer.device().stats();
    let mut frame = three_calls(&renderer);
    renderer.flush(&mut frame);

    let stats = renderer.device().stats();
    assert_eq!(stats.submissions - before.submissions, 3);
    assert_eq!(renderer.device().pending(), 0);
    assert!(frame.is_empty());
    Ok(())
}

#[test]
fn test_per_frame_submission() -> anyhow::Result<()> {
    let mut renderer = renderer(config().submit_policy(SubmitPolicy::PerFrame))?;
    let before = renderer.device().stats();
    let mut frame = three_calls(&renderer);
    renderer.flush(&mut frame);

    assert_eq!(renderer.device().stats().submissions - before.submissions, 1);
    assert_eq!(renderer.device().pending(), 1);
    assert_eq!(renderer.device().target().pixel_rgba8(3, 3), [0; 4]);

    use tilevg_gpu::Device;
    renderer.device_mut().wait_idle()?;
    assert_eq!(renderer.device().target().pixel_rgba8(3, 3), [255, 0, 0, 255]);

    // a third frame reuses the first command memory slot
    for _ in 0..2 {
        let mut frame = three_calls(&renderer);
        renderer.flush(&mut frame);
    }
    assert_eq!(renderer.device().stats().submissions - before.submissions, 3);
    Ok(())
}

#[test]
fn test_invalid_calls_are_skipped() -> anyhow::Result<()> {
    for debug in [false, true] {
        let mut renderer = renderer(config().debug(debug))?;
        let mut frame = renderer.new_frame();
        frame.calls.push(Call {
            kind: CallKind::ConvexFill { paths: Span::new(4, 2) },
            image: None,
            uniform_offset: 0,
            blend: CompositeOperation::SourceOver.blend_func(),
        });
        renderer.flush(&mut frame);
        assert!(renderer.device().target().stencil_is_clear());
        assert_eq!(renderer.device().target().pixel(0, 0), [0.0; 4]);
        assert_eq!(renderer.device().pending(), 0);
    }
    Ok(())
}

#[test]
fn test_flush_before_create_reports_error() -> anyhow::Result<()> {
    use std::cell::RefCell;
    use std::rc::Rc;
    use tilevg_gpu::headless::HeadlessDevice;
    use tilevg_gpu::{GpuError, Pools, Renderer};

    let pools = Pools::new(1 << 16, 1 << 10, 1 << 20);
    let device = HeadlessDevice::new(SIZE, SIZE, pools.memory_map());
    let mut renderer = Renderer::new(device, pools, config())?;
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    renderer.set_error_handler(move |err| sink.borrow_mut().push(err.clone()));

    let mut frame = three_calls(&renderer);
    renderer.flush(&mut frame);
    assert_eq!(*errors.borrow(), vec![GpuError::NotInitialized]);
    assert!(frame.is_empty());
    Ok(())
}
