//! Plain data types shared by every backend

use crate::backend::traits::{BufferHandle, ImageId};
use bitflags::bitflags;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8 => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

bitflags! {
    /// How an image may be used over its lifetime
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

bitflags! {
    /// How a buffer may be used over its lifetime
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const COPY_SRC = 1 << 3;
    }
}

/// Width and height of a surface or 2D image, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-sized extent cannot back any render target (minimized window)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Half resolution, never below one pixel
    pub fn halved(&self) -> Self {
        Self {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Description of a 2D image to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub label: String,
    pub extent: Extent2d,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
    pub samples: u32,
    pub usage: TextureUsage,
}

impl ImageDescriptor {
    pub fn new_2d(label: &str, format: TextureFormat, extent: Extent2d, usage: TextureUsage) -> Self {
        Self {
            label: label.to_string(),
            extent,
            mip_levels: 1,
            array_layers: 1,
            format,
            samples: 1,
            usage,
        }
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(label: &str, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: label.to_string(),
            size,
            usage,
        }
    }
}

/// Fixed samplers owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Bilinear, clamp to edge
    Linear,
    /// Depth comparison (less-or-equal) for shadow lookups
    ShadowCompare,
}

/// Descriptor set layouts known to the pipelines.
///
/// Set 0 is always `FrameGlobals`; the other kinds fill sets 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindGroupLayoutKind {
    /// binding 0: per-frame uniform buffer
    FrameGlobals,
    /// binding 0: shadow depth texture, binding 1: comparison sampler
    ShadowSampling,
    /// binding 0: material uniform buffer
    Material,
    /// binding 0: color texture, binding 1: linear sampler
    SampledTexture,
    /// binding 0: scene color, binding 1: bloom, binding 2: linear sampler
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    Texture(ImageId),
    Sampler(SamplerKind),
}

/// One pipeline per pass flavour. The pipeline provider builds them; passes only bind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Shadow,
    Mesh,
    Skybox,
    BloomPrefilter,
    BloomDownsample,
    BloomUpsample,
    Composite,
    Overlay,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 8] = [
        PipelineKind::Shadow,
        PipelineKind::Mesh,
        PipelineKind::Skybox,
        PipelineKind::BloomPrefilter,
        PipelineKind::BloomDownsample,
        PipelineKind::BloomUpsample,
        PipelineKind::Composite,
        PipelineKind::Overlay,
    ];

    /// Layouts of descriptor sets 0.., in order
    pub fn bind_group_layouts(&self) -> &'static [BindGroupLayoutKind] {
        use BindGroupLayoutKind::*;
        match self {
            PipelineKind::Shadow | PipelineKind::Skybox => &[FrameGlobals],
            PipelineKind::Mesh => &[FrameGlobals, ShadowSampling, Material],
            PipelineKind::BloomPrefilter
            | PipelineKind::BloomDownsample
            | PipelineKind::BloomUpsample
            | PipelineKind::Overlay => &[FrameGlobals, SampledTexture],
            PipelineKind::Composite => &[FrameGlobals, Composite],
        }
    }

    /// Bytes of vertex-stage push constants
    pub fn push_constant_size(&self) -> u32 {
        match self {
            // model matrix
            PipelineKind::Shadow | PipelineKind::Mesh => 64,
            // screen size in points
            PipelineKind::Overlay => 8,
            _ => 0,
        }
    }
}

/// Attachment formats the pipelines are built against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub hdr_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub shadow_format: TextureFormat,
    pub surface_format: TextureFormat,
    pub msaa_samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub image: ImageId,
    pub resolve_target: Option<ImageId>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub image: ImageId,
    /// `None` loads the existing contents
    pub clear_depth: Option<f32>,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor<'a> {
    pub label: &'a str,
    pub extent: Extent2d,
    pub color: Option<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Negative-height viewport so world +Y points up on screen
    pub fn flipped(extent: Extent2d) -> Self {
        Self {
            y: extent.height as f32,
            height: -(extent.height as f32),
            ..Self::full(extent)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Region of a buffer copied into mip 0, layer 0 of an image.
/// Buffer rows are tightly packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCopyRegion {
    pub buffer_offset: u64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The current swapchain as the frame ring sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub format: TextureFormat,
    pub extent: Extent2d,
    pub images: Vec<ImageId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was signaled
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}
