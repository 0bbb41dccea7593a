//! What a pass sees while it records

use crate::backend::{BindGroupHandle, BufferHandle, CommandEncoder, Extent2d, ImageId};
use crate::culling::Frustum;
use crate::pipeline::targets::RenderTargets;
use crate::render_graph::{FrameStage, PassUsage};
use crate::scene::Scene;
use crate::ui::UiFrame;

/// A node of the frame graph.
///
/// Passes only record draws. The scheduler issues the transitions for everything
/// `declare` lists, so a pass never touches image state itself.
pub trait FramePass {
    fn name(&self) -> &str;
    fn stage(&self) -> FrameStage;
    fn declare(&self) -> PassUsage;
    fn execute(&self, ctx: &mut PassContext<'_>);
}

/// Vertex and index buffers holding this frame's UI geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiBuffers {
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
}

/// Counters gathered while recording one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Distinct frame stages that ran
    pub stages: usize,
    pub visible_drawables: usize,
    pub culled_drawables: usize,
    pub shadow_casters: usize,
    pub downsample_steps: usize,
    pub upsample_steps: usize,
    pub ui_batches: usize,
    /// Image barriers recorded, font uploads included
    pub barriers: usize,
    /// Read-after-read transitions dropped by the barrier batches
    pub elided_barriers: usize,
}

pub struct PassContext<'a> {
    pub encoder: &'a mut dyn CommandEncoder,
    pub targets: &'a RenderTargets,
    pub swap_image: ImageId,
    pub surface_extent: Extent2d,
    /// Set 0 of every pipeline
    pub globals: BindGroupHandle,
    pub scene: &'a Scene,
    pub camera_frustum: &'a Frustum,
    pub light_frustum: &'a Frustum,
    pub ui: &'a UiFrame,
    pub ui_buffers: Option<UiBuffers>,
    pub font: Option<BindGroupHandle>,
    pub stats: &'a mut FrameStats,
}
