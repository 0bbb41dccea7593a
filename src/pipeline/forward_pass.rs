//! Main geometry pass: lit meshes and the sky into the multisampled HDR target

use crate::backend::*;
use crate::culling::is_culled;
use crate::pipeline::context::{FramePass, PassContext};
use crate::render_graph::*;
use crate::scene::Drawable;
use crate::sync::ImageAccess;

/// Forward shading with shadow lookups. The multisampled color target is resolved into
/// the single-sample scene target when the pass ends.
pub struct ForwardPass;

impl FramePass for ForwardPass {
    fn name(&self) -> &str {
        "main"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Main
    }

    fn declare(&self) -> PassUsage {
        PassUsage::new()
            .read(TargetId::ShadowMap, ImageAccess::FragmentShaderRead)
            .write(TargetId::SceneColorMsaa, ImageAccess::ColorAttachmentWrite)
            .write(TargetId::SceneDepthMsaa, ImageAccess::DepthAttachmentWrite)
            .write(TargetId::SceneResolve, ImageAccess::ColorAttachmentWrite)
    }

    fn execute(&self, ctx: &mut PassContext<'_>) {
        let extent = ctx.targets.extent();
        let (Some(color), Some(depth), Some(resolve)) = (
            ctx.targets.image(TargetId::SceneColorMsaa),
            ctx.targets.image(TargetId::SceneDepthMsaa),
            ctx.targets.image(TargetId::SceneResolve),
        ) else {
            panic!("main pass targets missing");
        };

        ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: "main",
            extent,
            color: Some(ColorAttachment {
                image: color.id(),
                resolve_target: Some(resolve.id()),
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                store_op: StoreOp::Discard,
            }),
            depth: Some(DepthAttachment {
                image: depth.id(),
                clear_depth: Some(1.0),
                store_op: StoreOp::Discard,
            }),
        });
        ctx.encoder.set_viewport(Viewport::flipped(extent));
        ctx.encoder.set_scissor(ScissorRect::full(extent));

        ctx.encoder.bind_pipeline(PipelineKind::Mesh);
        ctx.encoder.bind_group(0, ctx.globals);
        ctx.encoder.bind_group(1, ctx.targets.shadow_sampling());

        for drawable in &ctx.scene.drawables {
            if is_culled(&drawable.mesh.bounds, &drawable.world, ctx.camera_frustum) {
                ctx.stats.culled_drawables += 1;
                continue;
            }
            ctx.stats.visible_drawables += 1;
            ctx.encoder.bind_group(2, drawable.material);
            draw_mesh(ctx.encoder, drawable);
        }

        // Sky last, so it only shades pixels no mesh covered
        ctx.encoder.bind_pipeline(PipelineKind::Skybox);
        ctx.encoder.bind_group(0, ctx.globals);
        ctx.encoder.draw(0..3, 0..1);

        ctx.encoder.end_render_pass();
    }
}

/// Model matrix as push constants, then one indexed draw
pub(crate) fn draw_mesh(encoder: &mut dyn CommandEncoder, drawable: &Drawable) {
    let model = drawable.world.to_cols_array();
    encoder.push_constants(bytemuck::cast_slice(&model));
    encoder.bind_vertex_buffer(drawable.mesh.vertex_buffer, 0);
    encoder.bind_index_buffer(drawable.mesh.index_buffer, 0, IndexFormat::Uint32);
    encoder.draw_indexed(0..drawable.mesh.index_count, 0, 0..1);
}

pub const MESH_SHADER: &str = r#"
struct ModelPush {
    model: mat4x4<f32>,
}

struct MaterialUniforms {
    base_color: vec4<f32>,
    metallic_roughness: vec4<f32>,
    emissive: vec4<f32>,
}

var<push_constant> push: ModelPush;

@group(1) @binding(0) var shadow_map: texture_depth_2d;
@group(1) @binding(1) var shadow_sampler: sampler_comparison;
@group(2) @binding(0) var<uniform> material: MaterialUniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) light_space: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = push.model * vec4<f32>(in.position, 1.0);
    out.clip_position = frame.view_proj * world;
    out.world_position = world.xyz;
    out.world_normal = normalize((push.model * vec4<f32>(in.normal, 0.0)).xyz);
    out.light_space = frame.light_view_proj * world;
    return out;
}

fn shadow_factor(light_space: vec4<f32>) -> f32 {
    let ndc = light_space.xyz / light_space.w;
    // The shadow pass renders through a flipped viewport
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0) {
        return 1.0;
    }
    let texel = 1.0 / vec2<f32>(textureDimensions(shadow_map));
    let depth = ndc.z - frame.tonemap.z;
    var lit = 0.0;
    for (var x = -1; x <= 1; x++) {
        for (var y = -1; y <= 1; y++) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            lit += textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, depth);
        }
    }
    return lit / 9.0;
}

const PI: f32 = 3.14159265;

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * d * d);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = (roughness + 1.0) * (roughness + 1.0) / 8.0;
    let gv = n_dot_v / (n_dot_v * (1.0 - k) + k);
    let gl = n_dot_l / (n_dot_l * (1.0 - k) + k);
    return gv * gl;
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (1.0 - f0) * pow(1.0 - cos_theta, 5.0);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = material.base_color.rgb;
    let metallic = material.metallic_roughness.x;
    let roughness = clamp(material.metallic_roughness.y, 0.04, 1.0);

    let n = normalize(in.world_normal);
    let v = normalize(frame.camera_position.xyz - in.world_position);
    let l = normalize(-frame.light_direction.xyz);
    let h = normalize(v + l);

    let n_dot_l = max(dot(n, l), 0.0);
    let n_dot_v = max(dot(n, v), 0.0001);
    let n_dot_h = max(dot(n, h), 0.0);

    let f0 = mix(vec3<f32>(0.04), albedo, metallic);
    let f = fresnel_schlick(max(dot(h, v), 0.0), f0);
    let specular = distribution_ggx(n_dot_h, roughness) * geometry_smith(n_dot_v, n_dot_l, roughness) * f
        / (4.0 * n_dot_v * max(n_dot_l, 0.0001));
    let diffuse = (vec3<f32>(1.0) - f) * (1.0 - metallic) * albedo / PI;

    let radiance = frame.light_color.rgb * frame.light_direction.w;
    let direct = (diffuse + specular) * radiance * n_dot_l * shadow_factor(in.light_space);
    let ambient = albedo * 0.03 * frame.light_color.a;
    let emissive = material.emissive.rgb * material.emissive.a;

    return vec4<f32>(direct + ambient + emissive, material.base_color.a);
}
"#;

pub const SKYBOX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var out: VertexOutput;
    let x = f32((vertex_index << 1u) & 2u) * 2.0 - 1.0;
    let y = f32(vertex_index & 2u) * 2.0 - 1.0;
    out.position = vec4<f32>(x, y, 1.0, 1.0);
    out.ndc = vec2<f32>(x, y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let far = frame.inv_view_proj * vec4<f32>(in.ndc, 1.0, 1.0);
    let direction = normalize(far.xyz / far.w - frame.camera_position.xyz);

    let horizon = vec3<f32>(0.75, 0.82, 0.9);
    let zenith = vec3<f32>(0.18, 0.36, 0.72);
    let ground = vec3<f32>(0.2, 0.18, 0.16);
    let up = direction.y;
    var sky = mix(horizon, zenith, pow(clamp(up, 0.0, 1.0), 0.5));
    if (up < 0.0) {
        sky = mix(horizon, ground, clamp(-up * 4.0, 0.0, 1.0));
    }

    let sun_dir = normalize(-frame.light_direction.xyz);
    let sun = pow(max(dot(direction, sun_dir), 0.0), 512.0) * frame.light_color.rgb * frame.light_direction.w * 8.0;

    return vec4<f32>(sky * frame.light_color.a + sun, 1.0);
}
"#;
