//! Descriptor set layouts, pipeline layouts and one graphics pipeline per [`PipelineKind`].
//!
//! Layouts are created once with the device. Pipelines depend on attachment formats and
//! are rebuilt by [`PipelineSet::rebuild`].

use std::collections::HashMap;
use std::ffi::CString;

use ash::vk;

use super::conversion::{convert_sample_count, convert_texture_format};
use crate::backend::types::{BindGroupLayoutKind, PipelineConfig, PipelineKind, TextureFormat};
use crate::backend::{BackendError, BackendResult};
use crate::pipeline::{shader_source, ShaderSource};
use crate::resources::MeshVertex;
use crate::ui::UiVertex;

const ALL_LAYOUTS: [BindGroupLayoutKind; 5] = [
    BindGroupLayoutKind::FrameGlobals,
    BindGroupLayoutKind::ShadowSampling,
    BindGroupLayoutKind::Material,
    BindGroupLayoutKind::SampledTexture,
    BindGroupLayoutKind::Composite,
];

/// Descriptor types per binding, in binding order
pub fn layout_bindings(kind: BindGroupLayoutKind) -> &'static [vk::DescriptorType] {
    match kind {
        BindGroupLayoutKind::FrameGlobals | BindGroupLayoutKind::Material => {
            &[vk::DescriptorType::UNIFORM_BUFFER]
        }
        BindGroupLayoutKind::ShadowSampling | BindGroupLayoutKind::SampledTexture => {
            &[vk::DescriptorType::SAMPLED_IMAGE, vk::DescriptorType::SAMPLER]
        }
        BindGroupLayoutKind::Composite => &[
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::SAMPLER,
        ],
    }
}

/// Fixed-function state that differs between pipeline kinds
struct PipelineState {
    color_format: Option<TextureFormat>,
    depth_format: Option<TextureFormat>,
    samples: u32,
    depth_write: bool,
    depth_compare: vk::CompareOp,
    cull_mode: vk::CullModeFlags,
    blend: Option<vk::PipelineColorBlendAttachmentState>,
    vertex_layout: VertexLayout,
    /// Rasterizer depth bias as (constant factor, slope factor)
    depth_bias: Option<(f32, f32)>,
}

#[derive(Clone, Copy)]
enum VertexLayout {
    None,
    /// Position only, from the mesh vertex stream
    MeshPosition,
    Mesh,
    Ui,
}

fn additive_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ONE)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

fn premultiplied_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_DST_ALPHA)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Shadow caster bias, in depth units and per unit of depth slope
const SHADOW_DEPTH_BIAS_CONSTANT: f32 = 1.25;
const SHADOW_DEPTH_BIAS_SLOPE: f32 = 1.75;

fn pipeline_state(kind: PipelineKind, config: &PipelineConfig) -> PipelineState {
    let fullscreen = |color_format, blend| PipelineState {
        color_format: Some(color_format),
        depth_format: None,
        samples: 1,
        depth_write: false,
        depth_compare: vk::CompareOp::ALWAYS,
        cull_mode: vk::CullModeFlags::NONE,
        blend,
        vertex_layout: VertexLayout::None,
        depth_bias: None,
    };

    match kind {
        PipelineKind::Shadow => PipelineState {
            color_format: None,
            depth_format: Some(config.shadow_format),
            samples: 1,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            cull_mode: vk::CullModeFlags::BACK,
            blend: None,
            vertex_layout: VertexLayout::MeshPosition,
            depth_bias: Some((SHADOW_DEPTH_BIAS_CONSTANT, SHADOW_DEPTH_BIAS_SLOPE)),
        },
        PipelineKind::Mesh => PipelineState {
            color_format: Some(config.hdr_format),
            depth_format: Some(config.depth_format),
            samples: config.msaa_samples,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            cull_mode: vk::CullModeFlags::BACK,
            blend: None,
            vertex_layout: VertexLayout::Mesh,
            depth_bias: None,
        },
        // Drawn at the far plane after opaque geometry
        PipelineKind::Skybox => PipelineState {
            color_format: Some(config.hdr_format),
            depth_format: Some(config.depth_format),
            samples: config.msaa_samples,
            depth_write: false,
            depth_compare: vk::CompareOp::LESS_OR_EQUAL,
            cull_mode: vk::CullModeFlags::NONE,
            blend: None,
            vertex_layout: VertexLayout::None,
            depth_bias: None,
        },
        PipelineKind::BloomPrefilter | PipelineKind::BloomDownsample => {
            fullscreen(config.hdr_format, None)
        }
        PipelineKind::BloomUpsample => fullscreen(config.hdr_format, Some(additive_blend())),
        PipelineKind::Composite => fullscreen(config.surface_format, None),
        PipelineKind::Overlay => PipelineState {
            vertex_layout: VertexLayout::Ui,
            ..fullscreen(config.surface_format, Some(premultiplied_blend()))
        },
    }
}

/// Compile WGSL to SPIR-V and wrap it in a shader module
fn compile_shader(
    device: &ash::Device,
    source: &ShaderSource,
    stage: naga::ShaderStage,
    entry_point: &str,
) -> BackendResult<vk::ShaderModule> {
    let module = naga::front::wgsl::parse_str(&source.source).map_err(|e| {
        BackendError::ShaderCreationFailed(format!(
            "{}: {}",
            source.label,
            e.emit_to_string(&source.source)
        ))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::PUSH_CONSTANT,
    );
    let info = validator.validate(&module).map_err(|e| {
        BackendError::ShaderCreationFailed(format!("{}: validation error: {e:?}", source.label))
    })?;

    let options = naga::back::spv::Options {
        lang_version: (1, 3),
        flags: naga::back::spv::WriterFlags::empty(),
        ..Default::default()
    };
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: entry_point.to_string(),
    };

    let spv = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| {
            BackendError::ShaderCreationFailed(format!("{}: SPIR-V generation: {e}", source.label))
        })?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&spv);
    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
        BackendError::ShaderCreationFailed(format!("{}: {e:?}", source.label))
    })
}

pub struct PipelineSet {
    set_layouts: HashMap<BindGroupLayoutKind, vk::DescriptorSetLayout>,
    layouts: HashMap<PipelineKind, vk::PipelineLayout>,
    pipelines: HashMap<PipelineKind, vk::Pipeline>,
}

impl PipelineSet {
    /// Create every descriptor set layout and pipeline layout. Pipelines come later.
    pub fn new(device: &ash::Device) -> BackendResult<Self> {
        let mut set = Self {
            set_layouts: HashMap::new(),
            layouts: HashMap::new(),
            pipelines: HashMap::new(),
        };

        // Partially built sets are torn down by the caller through `destroy`
        let result = set.create_layouts(device);
        if let Err(e) = result {
            unsafe { set.destroy(device) };
            return Err(e);
        }
        Ok(set)
    }

    fn create_layouts(&mut self, device: &ash::Device) -> BackendResult<()> {
        for kind in ALL_LAYOUTS {
            let stage_flags = match kind {
                BindGroupLayoutKind::FrameGlobals | BindGroupLayoutKind::Material => {
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
                }
                _ => vk::ShaderStageFlags::FRAGMENT,
            };
            let bindings: Vec<vk::DescriptorSetLayoutBinding> = layout_bindings(kind)
                .iter()
                .enumerate()
                .map(|(binding, &descriptor_type)| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(binding as u32)
                        .descriptor_type(descriptor_type)
                        .descriptor_count(1)
                        .stage_flags(stage_flags)
                })
                .collect();
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }
                .map_err(|e| {
                    BackendError::PipelineCreationFailed(format!("{kind:?} set layout: {e:?}"))
                })?;
            self.set_layouts.insert(kind, layout);
        }

        for kind in PipelineKind::ALL {
            let set_layouts: Vec<vk::DescriptorSetLayout> = kind
                .bind_group_layouts()
                .iter()
                .map(|layout| self.set_layouts[layout])
                .collect();
            let push_constant_ranges: Vec<vk::PushConstantRange> =
                match kind.push_constant_size() {
                    0 => Vec::new(),
                    size => vec![vk::PushConstantRange {
                        stage_flags: vk::ShaderStageFlags::VERTEX,
                        offset: 0,
                        size,
                    }],
                };
            let create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&push_constant_ranges);
            let layout = unsafe { device.create_pipeline_layout(&create_info, None) }.map_err(|e| {
                BackendError::PipelineCreationFailed(format!("{kind:?} pipeline layout: {e:?}"))
            })?;
            self.layouts.insert(kind, layout);
        }
        Ok(())
    }

    pub fn set_layout(&self, kind: BindGroupLayoutKind) -> Option<vk::DescriptorSetLayout> {
        self.set_layouts.get(&kind).copied()
    }

    pub fn layout(&self, kind: PipelineKind) -> Option<vk::PipelineLayout> {
        self.layouts.get(&kind).copied()
    }

    pub fn pipeline(&self, kind: PipelineKind) -> Option<vk::Pipeline> {
        self.pipelines.get(&kind).copied()
    }

    /// Drop existing pipelines and build all kinds against `config`.
    ///
    /// The device must be idle.
    pub fn rebuild(&mut self, device: &ash::Device, config: &PipelineConfig) -> BackendResult<()> {
        self.destroy_pipelines(device);
        for kind in PipelineKind::ALL {
            let pipeline = self.create_pipeline(device, kind, config)?;
            self.pipelines.insert(kind, pipeline);
        }
        log::info!(
            "Built {} pipelines (surface {:?}, {}x MSAA)",
            self.pipelines.len(),
            config.surface_format,
            config.msaa_samples
        );
        Ok(())
    }

    fn create_pipeline(
        &self,
        device: &ash::Device,
        kind: PipelineKind,
        config: &PipelineConfig,
    ) -> BackendResult<vk::Pipeline> {
        let source = shader_source(kind);
        let state = pipeline_state(kind, config);
        let layout = self.layouts[&kind];

        let vertex_module = compile_shader(device, &source, naga::ShaderStage::Vertex, source.vertex_entry)?;
        let fragment_module = match source.fragment_entry {
            Some(entry) => match compile_shader(device, &source, naga::ShaderStage::Fragment, entry) {
                Ok(module) => Some(module),
                Err(e) => {
                    unsafe { device.destroy_shader_module(vertex_module, None) };
                    return Err(e);
                }
            },
            None => None,
        };

        let result = build_pipeline(device, &source, &state, layout, vertex_module, fragment_module);

        unsafe {
            device.destroy_shader_module(vertex_module, None);
            if let Some(module) = fragment_module {
                device.destroy_shader_module(module, None);
            }
        }
        result.map_err(|e| BackendError::PipelineCreationFailed(format!("{kind:?}: {e}")))
    }

    fn destroy_pipelines(&mut self, device: &ash::Device) {
        for (_, pipeline) in self.pipelines.drain() {
            unsafe { device.destroy_pipeline(pipeline, None) };
        }
    }

    /// The device must be idle
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.destroy_pipelines(device);
        for (_, layout) in self.layouts.drain() {
            unsafe { device.destroy_pipeline_layout(layout, None) };
        }
        for (_, layout) in self.set_layouts.drain() {
            unsafe { device.destroy_descriptor_set_layout(layout, None) };
        }
    }
}

fn build_pipeline(
    device: &ash::Device,
    source: &ShaderSource,
    state: &PipelineState,
    layout: vk::PipelineLayout,
    vertex_module: vk::ShaderModule,
    fragment_module: Option<vk::ShaderModule>,
) -> Result<vk::Pipeline, String> {
    let vertex_entry = CString::new(source.vertex_entry).map_err(|e| e.to_string())?;
    let fragment_entry =
        CString::new(source.fragment_entry.unwrap_or_default()).map_err(|e| e.to_string())?;

    let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vertex_module)
        .name(&vertex_entry)];
    if let Some(module) = fragment_module {
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(module)
                .name(&fragment_entry),
        );
    }

    let (bindings, attributes) = vertex_input(state.vertex_layout);
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    // Meshes wind counter-clockwise; the flipped viewport keeps that orientation
    let mut rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(state.cull_mode)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE);
    if let Some((constant, slope)) = state.depth_bias {
        rasterization_state = rasterization_state
            .depth_bias_enable(true)
            .depth_bias_constant_factor(constant)
            .depth_bias_slope_factor(slope);
    }

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(convert_sample_count(state.samples));

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(state.depth_format.is_some())
        .depth_write_enable(state.depth_write)
        .depth_compare_op(state.depth_compare);

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = state
        .color_format
        .iter()
        .map(|_| {
            state.blend.unwrap_or_else(|| {
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
        })
        .collect();
    let color_blend_state =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats: Vec<vk::Format> = state
        .color_format
        .iter()
        .map(|&format| convert_texture_format(format))
        .collect();
    let depth_format = state
        .depth_format
        .map(convert_texture_format)
        .unwrap_or(vk::Format::UNDEFINED);
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(depth_format);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| format!("{e:?}"))?;

    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| "driver returned no pipeline".to_string())
}

fn vertex_input(
    layout: VertexLayout,
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let binding = |stride| {
        vec![vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(stride)
            .input_rate(vk::VertexInputRate::VERTEX)]
    };
    let attribute = |location, format, offset| {
        vk::VertexInputAttributeDescription::default()
            .location(location)
            .binding(0)
            .format(format)
            .offset(offset)
    };

    match layout {
        VertexLayout::None => (Vec::new(), Vec::new()),
        VertexLayout::MeshPosition => (
            binding(MeshVertex::STRIDE),
            vec![attribute(0, vk::Format::R32G32B32_SFLOAT, 0)],
        ),
        VertexLayout::Mesh => (
            binding(MeshVertex::STRIDE),
            vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
                attribute(1, vk::Format::R32G32B32_SFLOAT, 12),
                attribute(2, vk::Format::R32G32_SFLOAT, 24),
            ],
        ),
        VertexLayout::Ui => (
            binding(UiVertex::STRIDE),
            vec![
                attribute(0, vk::Format::R32G32_SFLOAT, 0),
                attribute(1, vk::Format::R32G32_SFLOAT, 8),
                attribute(2, vk::Format::R8G8B8A8_UNORM, 16),
            ],
        ),
    }
}
