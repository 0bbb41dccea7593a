//! Frame scheduler
//!
//! One frame is a fixed graph of passes:
//! 1. Shadow pass - light-space depth of shadow casters
//! 2. Main pass - lit meshes and sky, MSAA resolved at the end of the pass
//! 3. Bloom downsample - prefilter, then levels 1..L-1
//! 4. Bloom upsample - levels L-2..0, additive
//! 5. Composite - bloom mix and tonemapping onto the swapchain image
//! 6. Overlay - UI on top, then the image is released for presentation
//!
//! [`FrameRenderer`] owns the targets and the compiled graph and records a whole frame
//! into the slot handed out by the frame ring.

mod context;
mod forward_pass;
mod overlay_pass;
pub mod postprocess;
mod settings;
mod shadow_pass;
mod targets;
mod uniforms;

pub use context::{FramePass, FrameStats, PassContext, UiBuffers};
pub use forward_pass::ForwardPass;
pub use overlay_pass::{AtlasUpload, FontAtlas, OverlayPass};
pub use postprocess::{BloomPass, BloomStep, CompositePass};
pub use settings::{RenderSettings, TonemapOperator};
pub use shadow_pass::ShadowPass;
pub use targets::{RenderTargets, TargetConfig, DEPTH_FORMAT, HDR_FORMAT, SHADOW_FORMAT};
pub use uniforms::{FrameUniforms, FRAME_UNIFORMS_WGSL};

use crate::backend::*;
use crate::culling::{Aabb, Frustum};
use crate::error::RenderResult;
use crate::frame::{ActiveFrame, SurfaceResources};
use crate::render_graph::{CompiledGraph, FrameStage, RenderGraph, TargetId};
use crate::scene::{Camera, Scene};
use crate::sync::{BarrierBatch, GpuImage};
use crate::ui::UiFrame;
use crate::EngineConfig;
use glam::Vec3;
use std::collections::BTreeSet;

pub type FrameGraph = RenderGraph<Box<dyn FramePass>>;

fn add_pass(graph: &mut FrameGraph, pass: impl FramePass + 'static) {
    let name = pass.name().to_string();
    let usage = pass.declare();
    graph.add_pass(&name, pass.stage(), usage, Box::new(pass));
}

/// Build the frame graph for a bloom chain of `bloom_levels` levels
pub fn build_frame_graph(bloom_levels: u32) -> FrameGraph {
    assert!(bloom_levels > 0, "bloom chain needs at least one level");
    let mut graph = FrameGraph::new();

    add_pass(&mut graph, ShadowPass);
    add_pass(&mut graph, ForwardPass);

    add_pass(&mut graph, BloomPass::new(BloomStep::Prefilter));
    for level in 1..bloom_levels {
        add_pass(&mut graph, BloomPass::new(BloomStep::Downsample { level }));
    }
    for level in (0..bloom_levels - 1).rev() {
        add_pass(&mut graph, BloomPass::new(BloomStep::Upsample { level }));
    }

    add_pass(&mut graph, CompositePass);
    add_pass(&mut graph, OverlayPass);
    graph
}

/// WGSL source and entry points behind a pipeline kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub label: &'static str,
    pub source: String,
    pub vertex_entry: &'static str,
    /// `None` for depth-only pipelines
    pub fragment_entry: Option<&'static str>,
}

pub fn shader_source(kind: PipelineKind) -> ShaderSource {
    let fullscreen = |label, body: &str, fragment_entry| ShaderSource {
        label,
        source: format!(
            "{FRAME_UNIFORMS_WGSL}{}{body}",
            postprocess::FULLSCREEN_VERTEX_SHADER
        ),
        vertex_entry: "vs_fullscreen",
        fragment_entry: Some(fragment_entry),
    };
    let standalone = |label, body: &str, fragment_entry| ShaderSource {
        label,
        source: format!("{FRAME_UNIFORMS_WGSL}{body}"),
        vertex_entry: "vs_main",
        fragment_entry,
    };

    match kind {
        PipelineKind::Shadow => standalone("shadow", shadow_pass::SHADOW_SHADER, None),
        PipelineKind::Mesh => standalone("mesh", forward_pass::MESH_SHADER, Some("fs_main")),
        PipelineKind::Skybox => standalone("skybox", forward_pass::SKYBOX_SHADER, Some("fs_main")),
        PipelineKind::BloomPrefilter => {
            fullscreen("bloom prefilter", postprocess::BLOOM_SHADER, "fs_prefilter")
        }
        PipelineKind::BloomDownsample => {
            fullscreen("bloom downsample", postprocess::BLOOM_SHADER, "fs_downsample")
        }
        PipelineKind::BloomUpsample => {
            fullscreen("bloom upsample", postprocess::BLOOM_SHADER, "fs_upsample")
        }
        PipelineKind::Composite => fullscreen("composite", postprocess::COMPOSITE_SHADER, "fs_main"),
        PipelineKind::Overlay => standalone("overlay", overlay_pass::OVERLAY_SHADER, Some("fs_main")),
    }
}

/// Targets, font atlas and compiled frame graph. Records one frame per `render_frame`.
pub struct FrameRenderer {
    targets: RenderTargets,
    font: FontAtlas,
    graph: FrameGraph,
    compiled: CompiledGraph,
    settings: RenderSettings,
}

impl FrameRenderer {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        config: &EngineConfig,
        extent: Extent2d,
    ) -> RenderResult<Self> {
        config.validate()?;

        let surface_format = backend.swapchain_info().format;
        backend.prepare_pipelines(&PipelineConfig {
            hdr_format: HDR_FORMAT,
            depth_format: DEPTH_FORMAT,
            shadow_format: SHADOW_FORMAT,
            surface_format,
            msaa_samples: config.msaa_samples,
        })?;

        let targets = RenderTargets::new(
            backend,
            TargetConfig {
                msaa_samples: config.msaa_samples,
                bloom_levels: config.bloom_levels,
                shadow_map_size: config.shadow_map_size,
            },
            extent,
        )?;

        let graph = build_frame_graph(config.bloom_levels);
        let compiled = graph.compile()?;
        log::info!(
            "Frame graph: {} passes, {} bloom levels, {}x MSAA",
            graph.len(),
            config.bloom_levels,
            config.msaa_samples
        );

        Ok(Self {
            targets,
            font: FontAtlas::new(config.frames_in_flight as usize),
            graph,
            compiled,
            settings: RenderSettings::default(),
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn graph(&self) -> &FrameGraph {
        &self.graph
    }

    pub fn compiled(&self) -> &CompiledGraph {
        &self.compiled
    }

    pub fn font_atlas(&self) -> &FontAtlas {
        &self.font
    }

    /// Record the whole frame into the active slot.
    ///
    /// Uniforms and UI geometry are written into the slot's buffers before anything is
    /// recorded. Then, per graph node: one barrier batch for its reads and writes, the
    /// pass body, one batch for its releases.
    pub fn render_frame<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        frame: ActiveFrame<'_, B>,
        scene: &Scene,
        camera: &Camera,
        ui: &UiFrame,
    ) -> RenderResult<FrameStats> {
        let ActiveFrame {
            slot, swap_image, ..
        } = frame;

        let shadow_bounds = scene
            .bounds()
            .unwrap_or_else(|| Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        let light_view_proj = scene.light.view_projection(&shadow_bounds);
        let uniforms = FrameUniforms::new(camera, &scene.light, light_view_proj, &self.settings);

        let resources = slot.resources_mut();
        backend.write_buffer(resources.uniforms, 0, bytemuck::bytes_of(&uniforms))?;

        let ui_buffers = if ui.is_empty() {
            None
        } else {
            Some(UiBuffers {
                vertices: resources
                    .ui_vertices
                    .write(backend, bytemuck::cast_slice(&ui.vertices))?,
                indices: resources
                    .ui_indices
                    .write(backend, bytemuck::cast_slice(&ui.indices))?,
            })
        };
        let upload = self
            .font
            .stage(backend, &mut resources.staging, &ui.font_updates)?;
        let globals = resources.globals;

        let camera_frustum = camera.frustum();
        let light_frustum = Frustum::from_view_projection(light_view_proj);
        let swap_id = swap_image.id();
        let surface_extent = swap_image.extent();

        let mut stats = FrameStats::default();
        let graph = &self.graph;
        let compiled = &self.compiled;
        let targets = &mut self.targets;
        let font = &mut self.font;

        backend.encode(slot.command_buffer(), &mut |encoder| {
            if let Some(upload) = &upload {
                encoder.begin_debug_group("font upload");
                stats.barriers += font.record_upload(encoder, upload);
                encoder.end_debug_group();
            }
            let font_group = font.bind_group();

            let mut stages = BTreeSet::new();
            for (node, pass) in graph.ordered(compiled) {
                encoder.begin_debug_group(&node.name);

                let mut batch = BarrierBatch::new();
                for access in node.usage.acquires() {
                    let image = tracked_image(targets, swap_image, access.target);
                    batch.push(image.transition_to(access.access));
                }
                stats.elided_barriers += batch.elided();
                stats.barriers += batch.flush(encoder);

                let mut ctx = PassContext {
                    encoder: &mut *encoder,
                    targets: &*targets,
                    swap_image: swap_id,
                    surface_extent,
                    globals,
                    scene,
                    camera_frustum: &camera_frustum,
                    light_frustum: &light_frustum,
                    ui,
                    ui_buffers,
                    font: font_group,
                    stats: &mut stats,
                };
                pass.execute(&mut ctx);

                let mut batch = BarrierBatch::new();
                for access in &node.usage.releases {
                    let image = tracked_image(targets, swap_image, access.target);
                    batch.push(image.transition_to(access.access));
                }
                stats.elided_barriers += batch.elided();
                stats.barriers += batch.flush(encoder);

                encoder.end_debug_group();
                stages.insert(node.stage);
            }
            stats.stages = stages.len();
        })?;

        log::trace!("Frame recorded: {stats:?}");
        Ok(stats)
    }

    /// Release targets and the font atlas. The device must be idle.
    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        self.targets.destroy(backend);
        self.font.destroy(backend);
    }
}

fn tracked_image<'a>(
    targets: &'a mut RenderTargets,
    swap_image: &'a mut GpuImage,
    target: TargetId,
) -> &'a mut GpuImage {
    match target {
        TargetId::Swapchain => swap_image,
        other => match targets.image_mut(other) {
            Some(image) => image,
            None => panic!("frame graph references {other:?}, which has no image"),
        },
    }
}

impl<B: GraphicsBackend> SurfaceResources<B> for FrameRenderer {
    fn recreate(&mut self, backend: &mut B, extent: Extent2d) -> BackendResult<()> {
        self.targets.recreate(backend, extent)
    }
}

/// Every stage appears in the graph, in order
pub fn stage_order(graph: &FrameGraph, compiled: &CompiledGraph) -> Vec<FrameStage> {
    let mut stages: Vec<FrameStage> = Vec::new();
    for (node, _) in graph.ordered(compiled) {
        if stages.last() != Some(&node.stage) {
            stages.push(node.stage);
        }
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_shape() {
        let graph = build_frame_graph(4);
        let compiled = graph.compile().unwrap();

        // shadow, main, prefilter, 3 down, 3 up, composite, overlay
        assert_eq!(graph.len(), 11);
        assert_eq!(stage_order(&graph, &compiled), FrameStage::ALL.to_vec());
    }

    #[test]
    fn test_single_level_has_no_steps() {
        let graph = build_frame_graph(1);
        let compiled = graph.compile().unwrap();
        assert_eq!(graph.len(), 5);
        assert_eq!(
            stage_order(&graph, &compiled),
            vec![
                FrameStage::Shadow,
                FrameStage::Main,
                FrameStage::BloomDownsample,
                FrameStage::Composite,
                FrameStage::Overlay
            ]
        );
    }

    #[test]
    fn test_every_pipeline_has_a_shader() {
        for kind in PipelineKind::ALL {
            let shader = shader_source(kind);
            assert!(shader.source.contains("struct FrameUniforms"));
            assert!(shader.source.contains(shader.vertex_entry));
            if let Some(entry) = shader.fragment_entry {
                assert!(shader.source.contains(entry), "{kind:?} misses {entry}");
            }
        }
        assert!(shader_source(PipelineKind::Shadow).fragment_entry.is_none());
    }
}
