//! Error types

use crate::backend::BackendError;
use crate::render_graph::GraphError;
use std::time::Duration;
use thiserror::Error;

/// Rejected [`EngineConfig`](crate::EngineConfig) values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("frames_in_flight must be between 1 and {max}, got {value}")]
    FramesInFlight { value: u32, max: u32 },
    #[error("msaa_samples must be 2, 4 or 8, got {0}")]
    MsaaSamples(u32),
    #[error("bloom_levels must be between 1 and {max}, got {value}")]
    BloomLevels { value: u32, max: u32 },
    #[error("shadow_map_size must be a power of two between 256 and 8192, got {0}")]
    ShadowMapSize(u32),
    #[error("fence_timeout must be non-zero")]
    ZeroFenceTimeout,
}

/// Everything that can stop the engine.
///
/// Surface staleness is handled inside the frame ring and never shows up here, so every
/// variant is fatal to the caller.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Render graph: {0}")]
    Graph(#[from] GraphError),
    #[error("Fence of frame slot {slot} not signaled within {timeout:?} (device lost?)")]
    FenceTimeout { slot: usize, timeout: Duration },
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    /// Everything except a rejected configuration leaves GPU state undefined. Stale
    /// surfaces are recovered inside the frame ring and never reach the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RenderError::Config(_))
    }

    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            RenderError::FenceTimeout { .. } | RenderError::Backend(BackendError::DeviceLost)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(!RenderError::from(ConfigError::ZeroFenceTimeout).is_fatal());
        let timeout = RenderError::FenceTimeout {
            slot: 1,
            timeout: Duration::from_secs(5),
        };
        assert!(timeout.is_fatal());
        assert!(timeout.is_device_lost());
        assert!(!RenderError::from(BackendError::OutOfMemory).is_device_lost());
    }
}
