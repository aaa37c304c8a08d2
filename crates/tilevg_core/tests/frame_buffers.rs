//! Building a mixed frame through the public API

use tilevg_core::{
    uniform_stride, CallKind, Color, CompositeOperation, CreateFlags, FrameBuffers, Paint,
    PathGeometry, Scissor, ShaderType, Vertex,
};

fn square(x: f32, y: f32, s: f32) -> Vec<Vertex> {
    vec![
        Vertex::new(x, y, 0.5, 1.0),
        Vertex::new(x, y + s, 0.5, 1.0),
        Vertex::new(x + s, y + s, 0.5, 1.0),
        Vertex::new(x + s, y, 0.5, 1.0),
    ]
}

#[test]
fn test_mixed_frame() {
    let stride = uniform_stride(0x100);
    let mut frame = FrameBuffers::new(stride, CreateFlags::ANTIALIAS | CreateFlags::STENCIL_STROKES);
    let paint = Paint::color(Color::rgb(0.2, 0.4, 0.6));
    let op = CompositeOperation::SourceOver;

    let a = square(0.0, 0.0, 10.0);
    let b = square(20.0, 0.0, 10.0);
    let fringe = [Vertex::new(0.0, 0.0, 0.0, 1.0), Vertex::new(0.0, 1.0, 1.0, 1.0)];
    frame.fill(
        &paint,
        op,
        &Scissor::NONE,
        1.0,
        [0.0, 0.0, 30.0, 10.0],
        &[
            PathGeometry { fill: &a, stroke: &fringe, convex: true },
            PathGeometry { fill: &b, stroke: &[], convex: true },
        ],
    );
    frame.stroke(
        &paint,
        CompositeOperation::Lighter,
        &Scissor::rect(0.0, 0.0, 5.0, 5.0),
        1.0,
        2.0,
        &[PathGeometry { fill: &a, stroke: &fringe, convex: false }],
    );
    frame.triangles(&paint, op, &Scissor::NONE, 1.0, &a[..3]);

    assert_eq!(frame.calls.len(), 3);
    // two convex paths still need the stencil
    let CallKind::Fill { paths, cover } = frame.calls[0].kind else {
        panic!("expected a stencil fill, got {:?}", frame.calls[0].kind);
    };
    assert_eq!(paths.count, 2);
    assert_eq!(cover.count, 4);

    for call in &frame.calls {
        assert_eq!(call.uniform_offset as usize % stride, 0);
        assert_eq!(frame.validate(call), Ok(()));
    }

    // stencil stroke: the second record carries the interior threshold
    let offset = frame.calls[1].uniform_offset as usize;
    let edges = frame.uniform(offset).unwrap();
    let interior = frame.uniform(offset + stride).unwrap();
    assert_eq!(edges.stroke_thr, -1.0);
    assert!(interior.stroke_thr > 0.99);
    assert_eq!(frame.calls[1].blend, CompositeOperation::Lighter.blend_func());

    let tris = frame.uniform(frame.calls[2].uniform_offset as usize).unwrap();
    assert_eq!(tris.shader(), ShaderType::Image);

    frame.clear();
    assert!(frame.is_empty());
    assert_eq!(frame.uniform_stride(), stride);
}
