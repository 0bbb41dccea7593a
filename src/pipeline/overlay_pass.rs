//! UI overlay on top of the composited swapchain image, and the font atlas it samples

use crate::backend::*;
use crate::frame::GrowableBuffer;
use crate::pipeline::context::{FramePass, PassContext};
use crate::render_graph::*;
use crate::sync::{BarrierBatch, GpuImage, ImageAccess};
use crate::ui::UiTextureUpdate;

/// Draws UI batches with premultiplied alpha, then hands the image to presentation
pub struct OverlayPass;

impl FramePass for OverlayPass {
    fn name(&self) -> &str {
        "overlay"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Overlay
    }

    fn declare(&self) -> PassUsage {
        PassUsage::new()
            .write(TargetId::Swapchain, ImageAccess::ColorAttachmentReadWrite)
            .release(TargetId::Swapchain, ImageAccess::Present)
    }

    fn execute(&self, ctx: &mut PassContext<'_>) {
        if ctx.ui.is_empty() {
            return;
        }
        let (Some(buffers), Some(font)) = (ctx.ui_buffers, ctx.font) else {
            log::warn!("UI batches without a font atlas, overlay skipped");
            return;
        };

        let extent = ctx.surface_extent;
        let ppp = ctx.ui.pixels_per_point;
        let screen_size = [extent.width as f32 / ppp, extent.height as f32 / ppp];

        ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: "overlay",
            extent,
            color: Some(ColorAttachment {
                image: ctx.swap_image,
                resolve_target: None,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }),
            depth: None,
        });
        ctx.encoder.set_viewport(Viewport::full(extent));
        ctx.encoder.bind_pipeline(PipelineKind::Overlay);
        ctx.encoder.bind_group(0, ctx.globals);
        ctx.encoder.bind_group(1, font);
        ctx.encoder.push_constants(bytemuck::cast_slice(&screen_size));
        ctx.encoder.bind_vertex_buffer(buffers.vertices, 0);
        ctx.encoder.bind_index_buffer(buffers.indices, 0, IndexFormat::Uint32);

        for batch in &ctx.ui.batches {
            let Some([x, y, width, height]) = batch.scissor(ppp, extent.width, extent.height) else {
                continue;
            };
            ctx.encoder.set_scissor(ScissorRect {
                x: x as i32,
                y: y as i32,
                width,
                height,
            });
            ctx.encoder
                .draw_indexed(batch.indices.clone(), batch.base_vertex, 0..1);
            ctx.stats.ui_batches += 1;
        }

        ctx.encoder.end_render_pass();
    }
}

pub const OVERLAY_SHADER: &str = r#"
struct ScreenPush {
    size: vec2<f32>,
}

var<push_constant> screen: ScreenPush;

@group(1) @binding(0) var font_texture: texture_2d<f32>;
@group(1) @binding(1) var font_sampler: sampler;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(
        2.0 * in.position.x / screen.size.x - 1.0,
        2.0 * in.position.y / screen.size.y - 1.0,
        0.0,
        1.0,
    );
    out.uv = in.uv;
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color * textureSample(font_texture, font_sampler, in.uv);
}
"#;

/// Staged font pixels waiting to be recorded into the frame's command buffer
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasUpload {
    pub buffer: BufferHandle,
    pub regions: Vec<ImageCopyRegion>,
}

#[derive(Debug)]
struct RetiredAtlas {
    image: GpuImage,
    bind_group: BindGroupHandle,
    frames_left: usize,
}

/// The UI font texture.
///
/// A full-image update with a new size replaces the image. The old one may still be
/// sampled by frames in flight, so it is kept until that many frames have begun.
#[derive(Debug)]
pub struct FontAtlas {
    image: Option<GpuImage>,
    bind_group: Option<BindGroupHandle>,
    retired: Vec<RetiredAtlas>,
    frames_in_flight: usize,
}

impl FontAtlas {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            image: None,
            bind_group: None,
            retired: Vec::new(),
            frames_in_flight,
        }
    }

    pub fn bind_group(&self) -> Option<BindGroupHandle> {
        self.bind_group
    }

    pub fn image(&self) -> Option<&GpuImage> {
        self.image.as_ref()
    }

    /// Copy this frame's updates into `staging`. Call once per frame, after the slot
    /// owning `staging` has passed its fence wait.
    pub fn stage<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        staging: &mut GrowableBuffer,
        updates: &[UiTextureUpdate],
    ) -> BackendResult<Option<AtlasUpload>> {
        self.collect_retired(backend);
        if updates.is_empty() {
            return Ok(None);
        }

        let mut bytes = Vec::new();
        let mut regions = Vec::new();
        for update in updates {
            let [width, height] = update.size;
            if update.pixels.len() != width as usize * height as usize * 4 {
                log::warn!(
                    "Font update {}x{} carries {} bytes, dropped",
                    width,
                    height,
                    update.pixels.len()
                );
                continue;
            }
            let [x, y] = match update.pos {
                Some(pos) => pos,
                None => {
                    self.ensure_size(backend, Extent2d::new(width, height))?;
                    [0, 0]
                }
            };
            if self.image.is_none() {
                log::warn!("Font patch before the full atlas, dropped");
                continue;
            }
            regions.push(ImageCopyRegion {
                buffer_offset: bytes.len() as u64,
                x,
                y,
                width,
                height,
            });
            bytes.extend_from_slice(&update.pixels);
        }

        if regions.is_empty() {
            return Ok(None);
        }
        let buffer = staging.write(backend, &bytes)?;
        Ok(Some(AtlasUpload { buffer, regions }))
    }

    fn ensure_size<B: GraphicsBackend>(&mut self, backend: &mut B, extent: Extent2d) -> BackendResult<()> {
        if self.image.as_ref().map(GpuImage::extent) == Some(extent) {
            return Ok(());
        }
        if let (Some(image), Some(bind_group)) = (self.image.take(), self.bind_group.take()) {
            self.retired.push(RetiredAtlas {
                image,
                bind_group,
                frames_left: self.frames_in_flight,
            });
        }

        let image = GpuImage::create(
            backend,
            ImageDescriptor::new_2d(
                "ui font atlas",
                TextureFormat::Rgba8Unorm,
                extent,
                TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
            ),
        )?;
        let bind_group = backend.create_bind_group(
            BindGroupLayoutKind::SampledTexture,
            &[
                (0, BindGroupEntry::Texture(image.id())),
                (1, BindGroupEntry::Sampler(SamplerKind::Linear)),
            ],
        )?;
        self.image = Some(image);
        self.bind_group = Some(bind_group);
        Ok(())
    }

    fn collect_retired<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for retired in &mut self.retired {
            retired.frames_left = retired.frames_left.saturating_sub(1);
        }
        let (expired, kept): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(|r| r.frames_left == 0);
        self.retired = kept;
        for retired in expired {
            backend.destroy_bind_group(retired.bind_group);
            retired.image.destroy(backend);
        }
    }

    /// Transfer-write, copy every region, then make the atlas sampleable.
    /// Returns the number of barriers recorded.
    pub fn record_upload(&mut self, encoder: &mut dyn CommandEncoder, upload: &AtlasUpload) -> usize {
        let Some(image) = self.image.as_mut() else {
            return 0;
        };
        let mut batch = BarrierBatch::new();

        batch.push(image.transition_to(ImageAccess::TransferWrite));
        let mut recorded = batch.flush(encoder);
        for region in &upload.regions {
            encoder.copy_buffer_to_image(upload.buffer, image.id(), *region);
        }
        batch.push(image.transition_to(ImageAccess::FragmentShaderRead));
        recorded += batch.flush(encoder);
        recorded
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        for retired in self.retired.drain(..) {
            backend.destroy_bind_group(retired.bind_group);
            retired.image.destroy(backend);
        }
        if let Some(bind_group) = self.bind_group.take() {
            backend.destroy_bind_group(bind_group);
        }
        if let Some(image) = self.image.take() {
            image.destroy(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn full(width: u32, height: u32) -> UiTextureUpdate {
        UiTextureUpdate {
            pos: None,
            size: [width, height],
            pixels: vec![255; width as usize * height as usize * 4],
        }
    }

    #[test]
    fn test_full_then_patch() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let mut staging = GrowableBuffer::new("staging", BufferUsage::COPY_SRC);
        let mut atlas = FontAtlas::new(2);

        let patch = UiTextureUpdate {
            pos: Some([2, 3]),
            size: [2, 2],
            pixels: vec![0; 16],
        };
        let upload = atlas
            .stage(&mut backend, &mut staging, &[full(8, 8), patch])
            .unwrap()
            .unwrap();

        assert_eq!(upload.regions.len(), 2);
        assert_eq!(upload.regions[1].buffer_offset, 256);
        assert_eq!((upload.regions[1].x, upload.regions[1].y), (2, 3));
        assert_eq!(atlas.image().unwrap().extent(), Extent2d::new(8, 8));
        assert!(atlas.bind_group().is_some());
    }

    #[test]
    fn test_patch_without_atlas_is_dropped() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let mut staging = GrowableBuffer::new("staging", BufferUsage::COPY_SRC);
        let mut atlas = FontAtlas::new(2);
        let patch = UiTextureUpdate {
            pos: Some([0, 0]),
            size: [1, 1],
            pixels: vec![0; 4],
        };
        assert!(atlas.stage(&mut backend, &mut staging, &[patch]).unwrap().is_none());
    }

    #[test]
    fn test_oversized_update_is_dropped_by_size_check() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let mut staging = GrowableBuffer::new("staging", BufferUsage::COPY_SRC);
        let mut atlas = FontAtlas::new(2);
        // 65536 * 16384 * 4 is 2^32 bytes: zero once wrapped to 32 bits
        let huge = UiTextureUpdate {
            pos: None,
            size: [65536, 16384],
            pixels: Vec::new(),
        };
        assert!(atlas.stage(&mut backend, &mut staging, &[huge]).unwrap().is_none());
        assert!(atlas.image().is_none());
    }

    #[test]
    fn test_replaced_atlas_outlives_frames_in_flight() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let mut staging = GrowableBuffer::new("staging", BufferUsage::COPY_SRC);
        let mut atlas = FontAtlas::new(2);

        atlas.stage(&mut backend, &mut staging, &[full(4, 4)]).unwrap();
        atlas.stage(&mut backend, &mut staging, &[full(8, 8)]).unwrap();
        assert_eq!(backend.live_image_count(), 2);

        atlas.stage(&mut backend, &mut staging, &[]).unwrap();
        assert_eq!(backend.live_image_count(), 2);
        atlas.stage(&mut backend, &mut staging, &[]).unwrap();
        assert_eq!(backend.live_image_count(), 1);

        atlas.destroy(&mut backend);
        staging.destroy(&mut backend);
        assert_eq!(backend.live_image_count(), 0);
        assert_eq!(backend.live_bind_group_count(), 0);
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
