//! Rendering through a real adapter; skipped when none is available

use tilevg_core::{
    Color, CompositeOperation, ImageFlags, Paint, PathGeometry, Scissor, TextureFormat, Vertex,
};
use tilevg_gpu::{Pools, Renderer, RendererConfig};
use tilevg_wgpu::{BackendError, WgpuDevice};

const SIZE: u32 = 16;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn renderer() -> anyhow::Result<Option<Renderer<WgpuDevice>>> {
    init_tracing();
    let pools = Pools::new(1 << 20, 4 << 10, 2 << 20);
    let device = match WgpuDevice::new(SIZE, SIZE, pools.memory_map()) {
        Ok(device) => device,
        Err(err @ (BackendError::AdapterNotFound | BackendError::RequestDevice(_))) => {
            eprintln!("skipping: {err}");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let mut renderer = Renderer::new(device, pools, RendererConfig::new(SIZE, SIZE))?;
    renderer.create()?;
    renderer.device_mut().clear([0.0; 4]);
    Ok(Some(renderer))
}

fn pixel(pixels: &[u8], x: u32, y: u32) -> [u8; 4] {
    let at = ((y * SIZE + x) * 4) as usize;
    [pixels[at], pixels[at + 1], pixels[at + 2], pixels[at + 3]]
}

fn rect_fan(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Vertex> {
    vec![
        Vertex::new(x0, y0, 0.5, 1.0),
        Vertex::new(x0, y1, 0.5, 1.0),
        Vertex::new(x1, y1, 0.5, 1.0),
        Vertex::new(x1, y0, 0.5, 1.0),
    ]
}

fn fill(fan: &[Vertex], convex: bool) -> PathGeometry<'_> {
    PathGeometry {
        fill: fan,
        stroke: &[],
        convex,
    }
}

#[test]
fn test_convex_and_stencil_fill() -> anyhow::Result<()> {
    let Some(mut renderer) = renderer()? else {
        return Ok(());
    };
    let paint = Paint::color(Color::rgba(1.0, 0.0, 0.0, 1.0));
    let bounds = [2.0, 2.0, 14.0, 14.0];
    let fan = rect_fan(2.0, 2.0, 14.0, 14.0);

    let mut frame = renderer.new_frame();
    frame.fill(&paint, CompositeOperation::SourceOver, &Scissor::NONE, 1.0, bounds, &[fill(&fan, true)]);
    renderer.flush(&mut frame);
    let convex = renderer.device().read_pixels()?;

    renderer.device_mut().clear([0.0; 4]);
    frame.fill(&paint, CompositeOperation::SourceOver, &Scissor::NONE, 1.0, bounds, &[fill(&fan, false)]);
    renderer.flush(&mut frame);
    let stenciled = renderer.device().read_pixels()?;

    assert_eq!(pixel(&convex, 8, 8), [255, 0, 0, 255]);
    assert_eq!(pixel(&convex, 0, 0), [0; 4]);
    assert_eq!(pixel(&stenciled, 8, 8), [255, 0, 0, 255]);
    assert_eq!(pixel(&stenciled, 15, 15), [0; 4]);
    Ok(())
}

#[test]
fn test_nonzero_hole() -> anyhow::Result<()> {
    let Some(mut renderer) = renderer()? else {
        return Ok(());
    };
    let outer = rect_fan(2.0, 2.0, 14.0, 14.0);
    let mut inner = rect_fan(6.0, 6.0, 10.0, 10.0);
    inner.reverse();

    let mut frame = renderer.new_frame();
    frame.fill(
        &Paint::color(Color::rgba(0.0, 0.0, 1.0, 1.0)),
        CompositeOperation::SourceOver,
        &Scissor::NONE,
        1.0,
        [2.0, 2.0, 14.0, 14.0],
        &[fill(&outer, false), fill(&inner, false)],
    );
    renderer.flush(&mut frame);

    let pixels = renderer.device().read_pixels()?;
    assert_eq!(pixel(&pixels, 3, 3), [0, 0, 255, 255]);
    assert_eq!(pixel(&pixels, 8, 8), [0; 4]);
    Ok(())
}

#[test]
fn test_textured_triangles() -> anyhow::Result<()> {
    let Some(mut renderer) = renderer()? else {
        return Ok(());
    };
    let checker = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [255, 255, 255, 255]].concat();
    let id = renderer
        .create_texture(TextureFormat::Rgba, 2, 2, ImageFlags::NEAREST, Some(&checker))
        .ok_or_else(|| anyhow::anyhow!("texture creation failed"))?;
    let image = renderer.paint_image(id).ok_or_else(|| anyhow::anyhow!("missing texture"))?;

    let s = SIZE as f32;
    let quad = [
        Vertex::new(0.0, 0.0, 0.0, 0.0),
        Vertex::new(0.0, s, 0.0, 1.0),
        Vertex::new(s, 0.0, 1.0, 0.0),
        Vertex::new(s, 0.0, 1.0, 0.0),
        Vertex::new(0.0, s, 0.0, 1.0),
        Vertex::new(s, s, 1.0, 1.0),
    ];
    let paint = Paint::image_pattern(0.0, 0.0, s, s, 0.0, image, 1.0);
    let mut frame = renderer.new_frame();
    frame.triangles(&paint, CompositeOperation::SourceOver, &Scissor::NONE, 1.0, &quad);
    renderer.flush(&mut frame);

    let pixels = renderer.device().read_pixels()?;
    assert_eq!(pixel(&pixels, 2, 2), [255, 0, 0, 255]);
    assert_eq!(pixel(&pixels, 12, 2), [0, 255, 0, 255]);
    assert_eq!(pixel(&pixels, 2, 12), [0, 0, 255, 255]);
    assert_eq!(pixel(&pixels, 12, 12), [255, 255, 255, 255]);
    assert!(renderer.device().pipeline_count() > 0);
    Ok(())
}
