//! Composite: bloom mix, exposure, tonemapping and gamma onto the swapchain image

use crate::backend::*;
use crate::pipeline::context::{FramePass, PassContext};
use crate::render_graph::*;
use crate::sync::ImageAccess;

/// Clears and fully repaints the swapchain image
pub struct CompositePass;

impl FramePass for CompositePass {
    fn name(&self) -> &str {
        "composite"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Composite
    }

    fn declare(&self) -> PassUsage {
        PassUsage::new()
            .read(TargetId::SceneResolve, ImageAccess::FragmentShaderRead)
            .read(TargetId::Bloom(0), ImageAccess::FragmentShaderRead)
            .write(TargetId::Swapchain, ImageAccess::ColorAttachmentWrite)
    }

    fn execute(&self, ctx: &mut PassContext<'_>) {
        let extent = ctx.surface_extent;

        ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: "composite",
            extent,
            color: Some(ColorAttachment {
                image: ctx.swap_image,
                resolve_target: None,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                store_op: StoreOp::Store,
            }),
            depth: None,
        });
        ctx.encoder.set_viewport(Viewport::full(extent));
        ctx.encoder.set_scissor(ScissorRect::full(extent));
        ctx.encoder.bind_pipeline(PipelineKind::Composite);
        ctx.encoder.bind_group(0, ctx.globals);
        ctx.encoder.bind_group(1, ctx.targets.composite_sources());
        ctx.encoder.draw(0..3, 0..1);
        ctx.encoder.end_render_pass();
    }
}

pub const COMPOSITE_SHADER: &str = r#"
@group(1) @binding(0) var scene_texture: texture_2d<f32>;
@group(1) @binding(1) var bloom_texture: texture_2d<f32>;
@group(1) @binding(2) var linear_sampler: sampler;

fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

fn reinhard_tonemap(color: vec3<f32>) -> vec3<f32> {
    return color / (color + vec3<f32>(1.0));
}

fn uncharted2_partial(x: vec3<f32>) -> vec3<f32> {
    let a = 0.15;
    let b = 0.50;
    let c = 0.10;
    let d = 0.20;
    let e = 0.02;
    let f = 0.30;
    return ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f;
}

fn uncharted2_tonemap(color: vec3<f32>) -> vec3<f32> {
    let white = vec3<f32>(11.2);
    let curr = uncharted2_partial(color * 2.0);
    return saturate(curr / uncharted2_partial(white));
}

@fragment
fn fs_main(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let scene = textureSample(scene_texture, linear_sampler, input.uv).rgb;
    let bloom = textureSample(bloom_texture, linear_sampler, input.uv).rgb;

    var color = mix(scene, bloom, frame.bloom.x);
    color = color * frame.tonemap.x;

    var mapped: vec3<f32>;
    switch frame.options.x {
        case 0u: { mapped = reinhard_tonemap(color); }
        case 1u: { mapped = aces_tonemap(color); }
        case 2u: { mapped = uncharted2_tonemap(color); }
        default: { mapped = saturate(color); }
    }

    let gamma_corrected = pow(mapped, vec3<f32>(1.0 / frame.tonemap.y));
    return vec4<f32>(gamma_corrected, 1.0);
}
"#;
