//! Screen-space passes run after the main pass: the bloom chain and the composite

mod bloom;
mod tonemapping;

pub use bloom::{BloomPass, BloomStep, BLOOM_SHADER};
pub use tonemapping::{CompositePass, COMPOSITE_SHADER};

/// Common fullscreen triangle shader. Three vertices, no vertex buffer; uv (0, 0) is the
/// top-left of the target.
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct FullscreenOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_fullscreen(@builtin(vertex_index) vertex_index: u32) -> FullscreenOutput {
    var output: FullscreenOutput;

    // Vertices (0,0), (2,0), (0,2) cover the screen with one triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, y);

    return output;
}
"#;
