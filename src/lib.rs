//! Lumina - frame orchestration and GPU synchronization for a small real-time renderer
//!
//! The engine turns a [`Scene`](scene::Scene), a [`Camera`](scene::Camera) and a UI frame
//! into presented images. Its core is four pieces:
//! - [`sync`]: per-image state tracking and barrier generation
//! - [`culling`]: frustum extraction and bounding box tests
//! - [`frame`]: the ring of frames in flight and the swapchain present loop
//! - [`pipeline`]: the frame graph (shadow, main, bloom, composite, overlay) and its scheduler
//!
//! Everything GPU-facing goes through [`backend::GraphicsBackend`]. `VulkanBackend` (feature
//! `vulkan`) drives a real device; `DummyBackend` records commands for tests.

pub mod backend;
pub mod culling;
pub mod engine;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod sync;
pub mod ui;
pub mod window;

pub use engine::{Engine, FrameStatus};
pub use error::{ConfigError, RenderError, RenderResult};
pub use pipeline::{FrameStats, RenderSettings, TonemapOperator};
pub use window::Window;

#[cfg(feature = "vulkan")]
pub use backend::VulkanBackend;

use std::time::Duration;

/// Configuration for initializing the graphics engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Frames the CPU may record ahead of the GPU
    pub frames_in_flight: u32,
    /// Samples of the main pass color and depth targets
    pub msaa_samples: u32,
    /// Levels of the bloom pyramid, level 0 at half resolution
    pub bloom_levels: u32,
    /// Edge length of the square shadow map
    pub shadow_map_size: u32,
    /// Longest wait for a frame fence before the device is considered lost
    pub fence_timeout: Duration,
    /// Enable the Vulkan validation layer
    pub validation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Lumina".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            frames_in_flight: 2,
            msaa_samples: 4,
            bloom_levels: 5,
            shadow_map_size: 2048,
            fence_timeout: Duration::from_secs(5),
            validation: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;
    pub const MAX_BLOOM_LEVELS: u32 = 8;

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples;
        self
    }

    pub fn with_bloom_levels(mut self, levels: u32) -> Self {
        self.bloom_levels = levels;
        self
    }

    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=Self::MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(ConfigError::FramesInFlight {
                value: self.frames_in_flight,
                max: Self::MAX_FRAMES_IN_FLIGHT,
            });
        }
        if !matches!(self.msaa_samples, 2 | 4 | 8) {
            return Err(ConfigError::MsaaSamples(self.msaa_samples));
        }
        if !(1..=Self::MAX_BLOOM_LEVELS).contains(&self.bloom_levels) {
            return Err(ConfigError::BloomLevels {
                value: self.bloom_levels,
                max: Self::MAX_BLOOM_LEVELS,
            });
        }
        if !self.shadow_map_size.is_power_of_two() || !(256..=8192).contains(&self.shadow_map_size) {
            return Err(ConfigError::ShadowMapSize(self.shadow_map_size));
        }
        if self.fence_timeout.is_zero() {
            return Err(ConfigError::ZeroFenceTimeout);
        }
        Ok(())
    }
}

/// Install `env_logger` with `info` as the default filter. `RUST_LOG` overrides it.
/// Calling it twice is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_config_rejections() {
        let base = EngineConfig::default();
        assert_eq!(
            base.clone().with_frames_in_flight(0).validate(),
            Err(ConfigError::FramesInFlight { value: 0, max: 4 })
        );
        assert_eq!(
            base.clone().with_msaa_samples(3).validate(),
            Err(ConfigError::MsaaSamples(3))
        );
        assert_eq!(
            base.clone().with_bloom_levels(9).validate(),
            Err(ConfigError::BloomLevels { value: 9, max: 8 })
        );
        assert_eq!(
            base.clone().with_shadow_map_size(1000).validate(),
            Err(ConfigError::ShadowMapSize(1000))
        );
        assert_eq!(
            base.with_fence_timeout(Duration::ZERO).validate(),
            Err(ConfigError::ZeroFenceTimeout)
        );
    }
}
