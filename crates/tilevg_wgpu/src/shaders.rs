//! WGSL fill programs
//!
//! One module holds the vertex stage and both fragment variants. The
//! fragment record mirrors [`tilevg_core::FragUniforms`] as eleven `vec4`s:
//!
//! | index | contents                                     |
//! |-------|----------------------------------------------|
//! | 0-2   | scissor matrix columns                       |
//! | 3-5   | paint matrix columns                         |
//! | 6     | inner color                                  |
//! | 7     | outer color                                  |
//! | 8     | scissor extent (xy), scissor scale (zw)      |
//! | 9     | paint extent (xy), radius, feather           |
//! | 10    | stroke mult, stroke threshold, tex type, shader type |

/// Vertex entry point
pub const VERTEX_ENTRY: &str = "vs_main";
/// Fragment entry point without stroke antialiasing
pub const FRAGMENT_ENTRY: &str = "fs_main";
/// Fragment entry point with stroke antialiasing and threshold discard
pub const FRAGMENT_AA_ENTRY: &str = "fs_main_aa";

pub const FILL_SHADER: &str = r#"
// ============================================================================
// tilevg fill shader
// ============================================================================

struct ViewUniforms {
    size: vec2<f32>,
}

struct FragUniforms {
    data: array<vec4<f32>, 11>,
}

struct VertexInput {
    @location(0) pos: vec2<f32>,
    @location(1) tcoord: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) pos: vec2<f32>,
    @location(1) tcoord: vec2<f32>,
}

// Shader types
const SHADER_FILL_GRADIENT: i32 = 0;
const SHADER_FILL_IMAGE: i32 = 1;
const SHADER_SIMPLE: i32 = 2;
const SHADER_IMAGE: i32 = 3;

// Texture types
const TEX_RGBA: i32 = 1;
const TEX_ALPHA: i32 = 2;

@group(0) @binding(0) var<uniform> viewport: ViewUniforms;
@group(0) @binding(1) var<uniform> frag: FragUniforms;
@group(1) @binding(0) var tex: texture_2d<f32>;
@group(1) @binding(1) var samp: sampler;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(
        2.0 * in.pos.x / viewport.size.x - 1.0,
        1.0 - 2.0 * in.pos.y / viewport.size.y,
        0.0,
        1.0,
    );
    out.pos = in.pos;
    out.tcoord = in.tcoord;
    return out;
}

fn scissor_transform(p: vec2<f32>) -> vec2<f32> {
    return frag.data[0].xy * p.x + frag.data[1].xy * p.y + frag.data[2].xy;
}

fn paint_transform(p: vec2<f32>) -> vec2<f32> {
    return frag.data[3].xy * p.x + frag.data[4].xy * p.y + frag.data[5].xy;
}

fn scissor_mask(p: vec2<f32>) -> f32 {
    let q = scissor_transform(p);
    let sc = vec2<f32>(0.5) - (abs(q) - frag.data[8].xy) * frag.data[8].zw;
    return clamp(sc.x, 0.0, 1.0) * clamp(sc.y, 0.0, 1.0);
}

fn stroke_mask(tcoord: vec2<f32>) -> f32 {
    return min(1.0, (1.0 - abs(tcoord.x * 2.0 - 1.0)) * frag.data[10].x) * min(1.0, tcoord.y);
}

fn sd_round_rect(pt: vec2<f32>, ext: vec2<f32>, rad: f32) -> f32 {
    let d = abs(pt) - (ext - vec2<f32>(rad));
    return min(max(d.x, d.y), 0.0) + length(max(d, vec2<f32>(0.0))) - rad;
}

fn apply_tex_type(color: vec4<f32>, tex_type: i32) -> vec4<f32> {
    if tex_type == TEX_RGBA {
        return vec4<f32>(color.rgb * color.a, color.a);
    }
    if tex_type == TEX_ALPHA {
        return vec4<f32>(color.r);
    }
    return color;
}

fn shade(pos: vec2<f32>, tcoord: vec2<f32>, stroke_alpha: f32) -> vec4<f32> {
    let shader_type = bitcast<i32>(frag.data[10].w);
    let tex_type = bitcast<i32>(frag.data[10].z);
    let scissor = scissor_mask(pos);

    if shader_type == SHADER_FILL_GRADIENT {
        let pt = paint_transform(pos);
        let feather = frag.data[9].w;
        let d = clamp((sd_round_rect(pt, frag.data[9].xy, frag.data[9].z) + feather * 0.5) / feather, 0.0, 1.0);
        return mix(frag.data[6], frag.data[7], d) * (stroke_alpha * scissor);
    }
    if shader_type == SHADER_FILL_IMAGE {
        let pt = paint_transform(pos);
        let uv = pt / frag.data[9].xy;
        let texel = apply_tex_type(textureSampleLevel(tex, samp, uv, 0.0), tex_type);
        return texel * frag.data[6] * (stroke_alpha * scissor);
    }
    if shader_type == SHADER_SIMPLE {
        return vec4<f32>(1.0);
    }
    let texel = apply_tex_type(textureSampleLevel(tex, samp, tcoord, 0.0), tex_type);
    return texel * scissor * frag.data[6];
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return shade(in.pos, in.tcoord, 1.0);
}

@fragment
fn fs_main_aa(in: VertexOutput) -> @location(0) vec4<f32> {
    let stroke_alpha = stroke_mask(in.tcoord);
    if stroke_alpha < frag.data[10].y {
        discard;
    }
    return shade(in.pos, in.tcoord, stroke_alpha);
}
"#;
