//! WGSL sources for the screen-covering quad.
//!
//! The vertex stage maps pixel positions (origin top-left) to clip space and
//! flips Y. The fragment stage returns the texel unmodified.

/// Entry point of [`QUAD_VERTEX_WGSL`].
pub const VERTEX_ENTRY: &str = "vs_main";

/// Entry point of [`QUAD_FRAGMENT_WGSL`].
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Vertex stage.
pub const QUAD_VERTEX_WGSL: &str = r"
@group(0) @binding(0) var<uniform> u_resolution: vec2<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(
    @location(0) a_position: vec2<f32>,
    @location(1) a_tex_coord: vec2<f32>,
) -> VertexOutput {
    let clip = a_position / u_resolution * 2.0 - vec2<f32>(1.0, 1.0);

    var out: VertexOutput;
    out.clip_position = vec4<f32>(clip.x, -clip.y, 0.0, 1.0);
    out.tex_coord = a_tex_coord;
    return out;
}
";

/// Fragment stage.
pub const QUAD_FRAGMENT_WGSL: &str = r"
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs_main(@location(0) v_tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(u_texture, u_sampler, v_tex_coord);
}
";
