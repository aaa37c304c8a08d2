//! Shared setup for the headless rendering tests

#![allow(dead_code)]

use std::path::Path;

use tilevg_core::{PathGeometry, Vertex};
use tilevg_gpu::headless::HeadlessDevice;
use tilevg_gpu::{GpuResult, Pools, Renderer, RendererConfig};

/// Test output directory
pub const OUTPUT_DIR: &str = "test_output/tilevg_gpu";

pub const SIZE: u32 = 16;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A renderer over a fresh headless device with its shaders loaded
pub fn renderer(config: RendererConfig) -> GpuResult<Renderer<HeadlessDevice>> {
    init_tracing();
    let pools = Pools::new(1 << 20, 4 << 10, 2 << 20);
    let device = HeadlessDevice::new(SIZE, SIZE, pools.memory_map());
    let mut renderer = Renderer::new(device, pools, config)?;
    renderer.create()?;
    Ok(renderer)
}

pub fn config() -> RendererConfig {
    RendererConfig::new(SIZE, SIZE)
}

/// Fan of an axis-aligned rectangle, counter-clockwise on screen
pub fn rect_fan(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Vertex> {
    vec![
        Vertex::new(x0, y0, 0.5, 1.0),
        Vertex::new(x0, y1, 0.5, 1.0),
        Vertex::new(x1, y1, 0.5, 1.0),
        Vertex::new(x1, y0, 0.5, 1.0),
    ]
}

/// The same rectangle wound the other way
pub fn rect_fan_reversed(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Vertex> {
    let mut fan = rect_fan(x0, y0, x1, y1);
    fan.reverse();
    fan
}

/// Horizontal stroke strip between `y0` and `y1`, `u` running across it
pub fn horizontal_strip(x0: f32, x1: f32, y0: f32, y1: f32) -> Vec<Vertex> {
    vec![
        Vertex::new(x0, y0, 0.0, 1.0),
        Vertex::new(x0, y1, 1.0, 1.0),
        Vertex::new(x1, y0, 0.0, 1.0),
        Vertex::new(x1, y1, 1.0, 1.0),
    ]
}

/// Vertical stroke strip between `x0` and `x1`
pub fn vertical_strip(y0: f32, y1: f32, x0: f32, x1: f32) -> Vec<Vertex> {
    vec![
        Vertex::new(x1, y0, 0.0, 1.0),
        Vertex::new(x0, y0, 1.0, 1.0),
        Vertex::new(x1, y1, 0.0, 1.0),
        Vertex::new(x0, y1, 1.0, 1.0),
    ]
}

pub fn fill_path(fill: &[Vertex], convex: bool) -> PathGeometry<'_> {
    PathGeometry {
        fill,
        stroke: &[],
        convex,
    }
}

pub fn fringed_path<'a>(fill: &'a [Vertex], fringe: &'a [Vertex], convex: bool) -> PathGeometry<'a> {
    PathGeometry {
        fill,
        stroke: fringe,
        convex,
    }
}

/// Closed antialiasing strip between two rectangles, `u` fading from 0.5 on
/// `inner` to 0 on `outer`
pub fn fringe_ring(inner: [f32; 4], outer: [f32; 4]) -> Vec<Vertex> {
    let corners = |[x0, y0, x1, y1]: [f32; 4]| [(x0, y0), (x0, y1), (x1, y1), (x1, y0)];
    corners(outer)
        .into_iter()
        .zip(corners(inner))
        .cycle()
        .take(5)
        .flat_map(|((ox, oy), (ix, iy))| [Vertex::new(ox, oy, 0.0, 1.0), Vertex::new(ix, iy, 0.5, 1.0)])
        .collect()
}

pub fn stroke_path(stroke: &[Vertex]) -> PathGeometry<'_> {
    PathGeometry {
        fill: &[],
        stroke,
        convex: false,
    }
}

pub fn pixels(renderer: &Renderer<HeadlessDevice>) -> Vec<[u8; 4]> {
    let target = renderer.device().target();
    (0..target.height())
        .flat_map(|y| (0..target.width()).map(move |x| (x, y)))
        .map(|(x, y)| target.pixel_rgba8(x, y))
        .collect()
}

/// Save the current target to `test_output/tilevg_gpu/<name>.png`
pub fn save(renderer: &Renderer<HeadlessDevice>, name: &str) -> anyhow::Result<()> {
    let dir = Path::new(OUTPUT_DIR);
    std::fs::create_dir_all(dir)?;
    renderer.device().save_png(dir.join(format!("{name}.png")))?;
    Ok(())
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}
