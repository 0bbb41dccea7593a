//! Main engine orchestrator
//!
//! [`Engine`] ties the frame ring to the frame renderer. One [`Engine::render_frame`] call
//! per displayed frame runs the whole loop:
//!
//! ```text
//! prepare_surface ─► begin_frame ─► acquire ─► FrameRenderer::render_frame ─► end_frame
//!  (resize/rebuild)  (fence wait)               (uniforms, graph recording)    (submit,
//!                                                                               present)
//! ```

use crate::backend::{Extent2d, GraphicsBackend};
use crate::error::RenderResult;
use crate::frame::{Acquire, FrameRing, PresentStatus, RingConfig, SurfaceStatus};
use crate::pipeline::{FrameRenderer, FrameStats, FrameUniforms, RenderSettings};
use crate::scene::{Camera, Scene};
use crate::ui::UiFrame;
use crate::EngineConfig;

/// Outcome of one `render_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Recorded and submitted. `present` tells whether the image reached the screen.
    Rendered {
        stats: FrameStats,
        present: PresentStatus,
    },
    /// Zero-sized surface; nothing was recorded
    Skipped,
    /// The swapchain went stale on acquire; it is rebuilt on the next call
    Dropped,
}

/// The main graphics engine
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    ring: FrameRing<B>,
    renderer: FrameRenderer,
    config: EngineConfig,
}

impl<B: GraphicsBackend> Engine<B> {
    pub fn new(mut backend: B, config: EngineConfig) -> RenderResult<Self> {
        config.validate()?;

        let extent = backend.swapchain_info().extent;
        let renderer = FrameRenderer::new(&mut backend, &config, extent)?;
        let ring = FrameRing::new(
            &mut backend,
            &RingConfig {
                frames_in_flight: config.frames_in_flight as usize,
                fence_timeout: config.fence_timeout,
                uniform_size: FrameUniforms::SIZE,
            },
        )?;

        log::info!(
            "Engine ready: {}x{}, {} frames in flight",
            extent.width,
            extent.height,
            config.frames_in_flight
        );
        Ok(Self {
            backend,
            ring,
            renderer,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn ring(&self) -> &FrameRing<B> {
        &self.ring
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    /// Tunables picked up by the next `render_frame`
    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        self.renderer.settings_mut()
    }

    pub fn surface_extent(&self) -> Extent2d {
        self.ring.surface_extent()
    }

    /// Forward a new drawable size from the windowing system
    pub fn resize(&mut self, width: u32, height: u32) {
        self.ring.notify_resize(Extent2d::new(width, height));
    }

    /// Render and present one frame
    pub fn render_frame(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        ui: &UiFrame,
    ) -> RenderResult<FrameStatus> {
        if self.ring.prepare_surface(&mut self.backend, &mut self.renderer)? == SurfaceStatus::Minimized {
            log::trace!("Surface minimized, frame skipped");
            return Ok(FrameStatus::Skipped);
        }

        let token = self.ring.begin_frame(&self.backend)?;
        let cycle = match self.ring.acquire_presentable_image(&mut self.backend) {
            Ok(Acquire::Ready(cycle)) => cycle,
            Ok(Acquire::SurfaceStale) => {
                self.ring.cancel_frame(token);
                return Ok(FrameStatus::Dropped);
            }
            Err(err) => {
                self.ring.cancel_frame(token);
                return Err(err);
            }
        };

        let frame = self.ring.frame(&token, &cycle);
        let stats = self
            .renderer
            .render_frame(&mut self.backend, frame, scene, camera, ui)?;
        let present = self.ring.end_frame(&mut self.backend, token, cycle)?;

        Ok(FrameStatus::Rendered { stats, present })
    }

    /// Wait for the GPU, release everything the engine created and hand the backend back
    pub fn shutdown(mut self) -> RenderResult<B> {
        log::info!("Shutting down after {} frames", self.ring.frame_number());
        self.ring.wait_idle(&self.backend)?;
        self.renderer.destroy(&mut self.backend);
        self.ring.destroy(&mut self.backend)?;
        Ok(self.backend)
    }
}

#[cfg(feature = "vulkan")]
impl Engine<crate::backend::VulkanBackend> {
    /// Create a Vulkan device and swapchain for `window` and build the engine on it
    pub fn for_window(window: &winit::window::Window, config: EngineConfig) -> RenderResult<Self> {
        let backend = crate::backend::VulkanBackend::new(window, &config)?;
        Self::new(backend, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_empty_frame_renders_all_stages() {
        let backend = DummyBackend::new(Extent2d::new(320, 240));
        let mut engine = Engine::new(backend, EngineConfig::default().with_bloom_levels(3)).unwrap();

        let status = engine
            .render_frame(&Scene::new(), &Camera::default(), &UiFrame::empty())
            .unwrap();
        let FrameStatus::Rendered { stats, present } = status else {
            panic!("expected a rendered frame, got {status:?}");
        };
        assert_eq!(present, PresentStatus::Presented);
        assert_eq!(stats.stages, 6);
        assert_eq!(stats.downsample_steps, 2);
        assert_eq!(stats.upsample_steps, 2);
        assert_eq!(stats.visible_drawables, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_gpu_work() {
        let backend = DummyBackend::new(Extent2d::new(320, 240));
        let result = Engine::new(backend, EngineConfig::default().with_msaa_samples(1));
        assert!(matches!(result, Err(crate::RenderError::Config(_))));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let backend = DummyBackend::new(Extent2d::new(64, 64));
        let mut engine = Engine::new(backend, EngineConfig::default()).unwrap();
        for _ in 0..3 {
            engine
                .render_frame(&Scene::new(), &Camera::default(), &UiFrame::empty())
                .unwrap();
        }
        let backend = engine.shutdown().unwrap();
        assert_eq!(backend.live_image_count(), 0);
        assert_eq!(backend.live_buffer_count(), 0);
        assert_eq!(backend.live_bind_group_count(), 0);
        assert_eq!(backend.live_sync_object_count(), 0);
        assert_eq!(backend.live_command_buffer_count(), 0);
    }
}
