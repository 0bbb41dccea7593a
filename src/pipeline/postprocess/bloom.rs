//! Bloom pyramid: prefilter, downsample chain, additive upsample chain
//!
//! ```text
//!  scene ─prefilter─► 0 ─down─► 1 ─down─► 2 ... ─down─► L-1
//!                     0 ◄─up─── 1 ◄─up─── 2 ... ◄─up─── L-1
//! ```
//!
//! Every step reads only its immediate neighbour, so the graph chains them one after
//! another. The prefilter belongs to the downsample stage but is not one of its L-1 steps.

use crate::backend::*;
use crate::pipeline::context::{FramePass, PassContext};
use crate::render_graph::*;
use crate::sync::ImageAccess;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomStep {
    /// Soft-threshold the resolved scene into level 0
    Prefilter,
    /// Filter level - 1 into `level`
    Downsample { level: u32 },
    /// Blend level + 1 additively into `level`
    Upsample { level: u32 },
}

/// One step of the bloom chain
pub struct BloomPass {
    step: BloomStep,
    name: String,
}

impl BloomPass {
    pub fn new(step: BloomStep) -> Self {
        let name = match step {
            BloomStep::Prefilter => "bloom prefilter".to_string(),
            BloomStep::Downsample { level } => {
                assert!(level > 0, "downsample writes levels 1 and up");
                format!("bloom downsample {level}")
            }
            BloomStep::Upsample { level } => format!("bloom upsample {level}"),
        };
        Self { step, name }
    }

    pub fn step(&self) -> BloomStep {
        self.step
    }

    /// Level this step renders into
    pub fn target_level(&self) -> u32 {
        match self.step {
            BloomStep::Prefilter => 0,
            BloomStep::Downsample { level } | BloomStep::Upsample { level } => level,
        }
    }

    fn source(&self) -> TargetId {
        match self.step {
            BloomStep::Prefilter => TargetId::SceneResolve,
            BloomStep::Downsample { level } => TargetId::Bloom(level - 1),
            BloomStep::Upsample { level } => TargetId::Bloom(level + 1),
        }
    }
}

impl FramePass for BloomPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> FrameStage {
        match self.step {
            BloomStep::Prefilter | BloomStep::Downsample { .. } => FrameStage::BloomDownsample,
            BloomStep::Upsample { .. } => FrameStage::BloomUpsample,
        }
    }

    fn declare(&self) -> PassUsage {
        let target = TargetId::Bloom(self.target_level());
        let write = match self.step {
            BloomStep::Upsample { .. } => ImageAccess::ColorAttachmentReadWrite,
            _ => ImageAccess::ColorAttachmentWrite,
        };
        PassUsage::new()
            .read(self.source(), ImageAccess::FragmentShaderRead)
            .write(target, write)
    }

    fn execute(&self, ctx: &mut PassContext<'_>) {
        let level = self.target_level();
        let Some(target) = ctx.targets.bloom_image(level) else {
            panic!("bloom level {level} does not exist");
        };
        let extent = target.extent();

        let (pipeline, source, load_op) = match self.step {
            BloomStep::Prefilter => (
                PipelineKind::BloomPrefilter,
                Some(ctx.targets.scene_source()),
                LoadOp::Clear([0.0; 4]),
            ),
            BloomStep::Downsample { level } => {
                ctx.stats.downsample_steps += 1;
                (
                    PipelineKind::BloomDownsample,
                    ctx.targets.bloom_source(level - 1),
                    LoadOp::Clear([0.0; 4]),
                )
            }
            BloomStep::Upsample { level } => {
                ctx.stats.upsample_steps += 1;
                (
                    PipelineKind::BloomUpsample,
                    ctx.targets.bloom_source(level + 1),
                    LoadOp::Load,
                )
            }
        };
        let Some(source) = source else {
            panic!("{}: source bind group missing", self.name);
        };

        ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: &self.name,
            extent,
            color: Some(ColorAttachment {
                image: target.id(),
                resolve_target: None,
                load_op,
                store_op: StoreOp::Store,
            }),
            depth: None,
        });
        ctx.encoder.set_viewport(Viewport::full(extent));
        ctx.encoder.set_scissor(ScissorRect::full(extent));
        ctx.encoder.bind_pipeline(pipeline);
        ctx.encoder.bind_group(0, ctx.globals);
        ctx.encoder.bind_group(1, source);
        ctx.encoder.draw(0..3, 0..1);
        ctx.encoder.end_render_pass();
    }
}

/// Fragment stages for all three steps. `frame.bloom` holds strength, threshold, knee and
/// filter radius.
pub const BLOOM_SHADER: &str = r#"
@group(1) @binding(0) var source_texture: texture_2d<f32>;
@group(1) @binding(1) var source_sampler: sampler;

fn luminance(color: vec3<f32>) -> f32 {
    return dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
}

@fragment
fn fs_prefilter(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let color = textureSample(source_texture, source_sampler, input.uv).rgb;
    let threshold = frame.bloom.y;
    let knee = max(threshold * frame.bloom.z, 0.0001);

    let brightness = luminance(color);
    var soft = clamp(brightness - threshold + knee, 0.0, 2.0 * knee);
    soft = soft * soft / (4.0 * knee);
    let contribution = max(soft, brightness - threshold) / max(brightness, 0.0001);

    return vec4<f32>(color * contribution, 1.0);
}

// 13-tap filter, weighted 0.5 for the inner box and 0.125 for each outer box
@fragment
fn fs_downsample(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let texel = 1.0 / vec2<f32>(textureDimensions(source_texture));
    let uv = input.uv;
    let x = texel.x;
    let y = texel.y;

    let a = textureSample(source_texture, source_sampler, uv + vec2<f32>(-2.0 * x, 2.0 * y)).rgb;
    let b = textureSample(source_texture, source_sampler, uv + vec2<f32>(0.0, 2.0 * y)).rgb;
    let c = textureSample(source_texture, source_sampler, uv + vec2<f32>(2.0 * x, 2.0 * y)).rgb;
    let d = textureSample(source_texture, source_sampler, uv + vec2<f32>(-2.0 * x, 0.0)).rgb;
    let e = textureSample(source_texture, source_sampler, uv).rgb;
    let f = textureSample(source_texture, source_sampler, uv + vec2<f32>(2.0 * x, 0.0)).rgb;
    let g = textureSample(source_texture, source_sampler, uv + vec2<f32>(-2.0 * x, -2.0 * y)).rgb;
    let h = textureSample(source_texture, source_sampler, uv + vec2<f32>(0.0, -2.0 * y)).rgb;
    let i = textureSample(source_texture, source_sampler, uv + vec2<f32>(2.0 * x, -2.0 * y)).rgb;
    let j = textureSample(source_texture, source_sampler, uv + vec2<f32>(-x, y)).rgb;
    let k = textureSample(source_texture, source_sampler, uv + vec2<f32>(x, y)).rgb;
    let l = textureSample(source_texture, source_sampler, uv + vec2<f32>(-x, -y)).rgb;
    let m = textureSample(source_texture, source_sampler, uv + vec2<f32>(x, -y)).rgb;

    var color = e * 0.125;
    color += (a + c + g + i) * 0.03125;
    color += (b + d + f + h) * 0.0625;
    color += (j + k + l + m) * 0.125;
    return vec4<f32>(max(color, vec3<f32>(0.0001)), 1.0);
}

// 3x3 tent filter; blended additively onto the destination level
@fragment
fn fs_upsample(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let r = frame.bloom.w;
    let uv = input.uv;

    let a = textureSample(source_texture, source_sampler, uv + vec2<f32>(-r, r)).rgb;
    let b = textureSample(source_texture, source_sampler, uv + vec2<f32>(0.0, r)).rgb;
    let c = textureSample(source_texture, source_sampler, uv + vec2<f32>(r, r)).rgb;
    let d = textureSample(source_texture, source_sampler, uv + vec2<f32>(-r, 0.0)).rgb;
    let e = textureSample(source_texture, source_sampler, uv).rgb;
    let f = textureSample(source_texture, source_sampler, uv + vec2<f32>(r, 0.0)).rgb;
    let g = textureSample(source_texture, source_sampler, uv + vec2<f32>(-r, -r)).rgb;
    let h = textureSample(source_texture, source_sampler, uv + vec2<f32>(0.0, -r)).rgb;
    let i = textureSample(source_texture, source_sampler, uv + vec2<f32>(r, -r)).rgb;

    var color = e * 4.0;
    color += (b + d + f + h) * 2.0;
    color += a + c + g + i;
    return vec4<f32>(color / 16.0, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_declarations() {
        let down = BloomPass::new(BloomStep::Downsample { level: 2 });
        let usage = down.declare();
        assert!(usage.reads_target(TargetId::Bloom(1)));
        assert!(usage.modifies_target(TargetId::Bloom(2)));
        assert_eq!(down.stage(), FrameStage::BloomDownsample);

        let up = BloomPass::new(BloomStep::Upsample { level: 0 });
        let usage = up.declare();
        assert!(usage.reads_target(TargetId::Bloom(1)));
        assert_eq!(usage.writes[0].access, ImageAccess::ColorAttachmentReadWrite);
        assert_eq!(up.stage(), FrameStage::BloomUpsample);

        let prefilter = BloomPass::new(BloomStep::Prefilter);
        assert!(prefilter.declare().reads_target(TargetId::SceneResolve));
        assert_eq!(prefilter.target_level(), 0);
    }

    #[test]
    #[should_panic(expected = "levels 1 and up")]
    fn test_downsample_into_level_zero_is_rejected() {
        BloomPass::new(BloomStep::Downsample { level: 0 });
    }
}
