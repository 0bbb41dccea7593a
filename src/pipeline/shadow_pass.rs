//! Shadow depth pass

use crate::backend::*;
use crate::culling::is_culled;
use crate::pipeline::context::{FramePass, PassContext};
use crate::pipeline::forward_pass::draw_mesh;
use crate::render_graph::*;
use crate::sync::ImageAccess;

/// Renders shadow casters visible from the light into the shadow map, depth only
pub struct ShadowPass;

impl FramePass for ShadowPass {
    fn name(&self) -> &str {
        "shadow"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Shadow
    }

    fn declare(&self) -> PassUsage {
        PassUsage::new()
            .write(TargetId::ShadowMap, ImageAccess::DepthAttachmentWrite)
            .release(TargetId::ShadowMap, ImageAccess::FragmentShaderRead)
    }

    fn execute(&self, ctx: &mut PassContext<'_>) {
        let shadow_map = ctx.targets.shadow_map();
        let extent = shadow_map.extent();

        ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: "shadow",
            extent,
            color: None,
            depth: Some(DepthAttachment {
                image: shadow_map.id(),
                clear_depth: Some(1.0),
                store_op: StoreOp::Store,
            }),
        });
        ctx.encoder.set_viewport(Viewport::flipped(extent));
        ctx.encoder.set_scissor(ScissorRect::full(extent));
        ctx.encoder.bind_pipeline(PipelineKind::Shadow);
        ctx.encoder.bind_group(0, ctx.globals);

        for drawable in ctx.scene.drawables.iter().filter(|d| d.casts_shadow) {
            if is_culled(&drawable.mesh.bounds, &drawable.world, ctx.light_frustum) {
                continue;
            }
            ctx.stats.shadow_casters += 1;
            draw_mesh(ctx.encoder, drawable);
        }

        ctx.encoder.end_render_pass();
    }
}

pub const SHADOW_SHADER: &str = r#"
struct ModelPush {
    model: mat4x4<f32>,
}

var<push_constant> push: ModelPush;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return frame.light_view_proj * push.model * vec4<f32>(position, 1.0);
}
"#;
