//! Render targets owned by the frame renderer
//!
//! The shadow map has a fixed size. Everything else follows the surface and is rebuilt
//! through [`SurfaceResources::recreate`] when the swapchain changes.

use crate::backend::{
    BackendResult, BindGroupEntry, BindGroupHandle, BindGroupLayoutKind, Extent2d,
    GraphicsBackend, ImageDescriptor, SamplerKind, TextureFormat, TextureUsage,
};
use crate::frame::SurfaceResources;
use crate::render_graph::TargetId;
use crate::sync::GpuImage;

pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
pub const SHADOW_FORMAT: TextureFormat = TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    pub msaa_samples: u32,
    pub bloom_levels: u32,
    pub shadow_map_size: u32,
}

/// Images and bind groups whose size follows the surface
#[derive(Debug)]
struct SurfaceTargets {
    scene_color_msaa: GpuImage,
    scene_depth_msaa: GpuImage,
    scene_resolve: GpuImage,
    bloom: Vec<GpuImage>,
    /// Resolved scene color, sampled by the bloom prefilter
    scene_source: BindGroupHandle,
    /// One per bloom level, sampled by the next step of the chain
    bloom_sources: Vec<BindGroupHandle>,
    composite: BindGroupHandle,
}

impl SurfaceTargets {
    fn create<B: GraphicsBackend>(
        backend: &mut B,
        config: &TargetConfig,
        extent: Extent2d,
    ) -> BackendResult<Self> {
        let scene_color_msaa = GpuImage::create(
            backend,
            ImageDescriptor::new_2d(
                "scene color msaa",
                HDR_FORMAT,
                extent,
                TextureUsage::RENDER_ATTACHMENT,
            )
            .with_samples(config.msaa_samples),
        )?;
        let scene_depth_msaa = GpuImage::create(
            backend,
            ImageDescriptor::new_2d(
                "scene depth msaa",
                DEPTH_FORMAT,
                extent,
                TextureUsage::RENDER_ATTACHMENT,
            )
            .with_samples(config.msaa_samples),
        )?;
        let scene_resolve = GpuImage::create(
            backend,
            ImageDescriptor::new_2d(
                "scene resolve",
                HDR_FORMAT,
                extent,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ),
        )?;

        let mut bloom = Vec::with_capacity(config.bloom_levels as usize);
        let mut level_extent = extent.halved();
        for level in 0..config.bloom_levels {
            bloom.push(GpuImage::create(
                backend,
                ImageDescriptor::new_2d(
                    &format!("bloom {level}"),
                    HDR_FORMAT,
                    level_extent,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ),
            )?);
            level_extent = level_extent.halved();
        }

        let scene_source = sampled_texture(backend, &scene_resolve)?;
        let bloom_sources = bloom
            .iter()
            .map(|image| sampled_texture(backend, image))
            .collect::<BackendResult<Vec<_>>>()?;
        let composite = backend.create_bind_group(
            BindGroupLayoutKind::Composite,
            &[
                (0, BindGroupEntry::Texture(scene_resolve.id())),
                (1, BindGroupEntry::Texture(bloom[0].id())),
                (2, BindGroupEntry::Sampler(SamplerKind::Linear)),
            ],
        )?;

        Ok(Self {
            scene_color_msaa,
            scene_depth_msaa,
            scene_resolve,
            bloom,
            scene_source,
            bloom_sources,
            composite,
        })
    }

    fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_bind_group(self.composite);
        backend.destroy_bind_group(self.scene_source);
        for group in self.bloom_sources {
            backend.destroy_bind_group(group);
        }
        self.scene_color_msaa.destroy(backend);
        self.scene_depth_msaa.destroy(backend);
        self.scene_resolve.destroy(backend);
        for image in self.bloom {
            image.destroy(backend);
        }
    }
}

fn sampled_texture<B: GraphicsBackend>(backend: &mut B, image: &GpuImage) -> BackendResult<BindGroupHandle> {
    backend.create_bind_group(
        BindGroupLayoutKind::SampledTexture,
        &[
            (0, BindGroupEntry::Texture(image.id())),
            (1, BindGroupEntry::Sampler(SamplerKind::Linear)),
        ],
    )
}

/// Every offscreen image the frame graph renders into
#[derive(Debug)]
pub struct RenderTargets {
    config: TargetConfig,
    extent: Extent2d,
    shadow_map: GpuImage,
    shadow_sampling: BindGroupHandle,
    // `None` only while being rebuilt
    surface: Option<SurfaceTargets>,
}

impl RenderTargets {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        config: TargetConfig,
        extent: Extent2d,
    ) -> BackendResult<Self> {
        assert!(config.bloom_levels > 0, "bloom chain needs at least one level");

        let size = config.shadow_map_size;
        let shadow_map = GpuImage::create(
            backend,
            ImageDescriptor::new_2d(
                "shadow map",
                SHADOW_FORMAT,
                Extent2d::new(size, size),
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ),
        )?;
        let shadow_sampling = backend.create_bind_group(
            BindGroupLayoutKind::ShadowSampling,
            &[
                (0, BindGroupEntry::Texture(shadow_map.id())),
                (1, BindGroupEntry::Sampler(SamplerKind::ShadowCompare)),
            ],
        )?;
        let surface = SurfaceTargets::create(backend, &config, extent)?;

        Ok(Self {
            config,
            extent,
            shadow_map,
            shadow_sampling,
            surface: Some(surface),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Size of the surface-sized targets
    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    pub fn bloom_levels(&self) -> u32 {
        self.config.bloom_levels
    }

    fn surface(&self) -> &SurfaceTargets {
        match &self.surface {
            Some(surface) => surface,
            None => panic!("render targets used while being rebuilt"),
        }
    }

    fn surface_mut(&mut self) -> &mut SurfaceTargets {
        match &mut self.surface {
            Some(surface) => surface,
            None => panic!("render targets used while being rebuilt"),
        }
    }

    /// The tracked image behind `target`. `None` for the swapchain, which the frame ring owns.
    pub fn image(&self, target: TargetId) -> Option<&GpuImage> {
        if target == TargetId::ShadowMap {
            return Some(&self.shadow_map);
        }
        let surface = self.surface();
        match target {
            TargetId::SceneColorMsaa => Some(&surface.scene_color_msaa),
            TargetId::SceneDepthMsaa => Some(&surface.scene_depth_msaa),
            TargetId::SceneResolve => Some(&surface.scene_resolve),
            TargetId::Bloom(level) => surface.bloom.get(level as usize),
            TargetId::ShadowMap | TargetId::Swapchain => None,
        }
    }

    pub fn image_mut(&mut self, target: TargetId) -> Option<&mut GpuImage> {
        if target == TargetId::ShadowMap {
            return Some(&mut self.shadow_map);
        }
        let surface = self.surface_mut();
        match target {
            TargetId::SceneColorMsaa => Some(&mut surface.scene_color_msaa),
            TargetId::SceneDepthMsaa => Some(&mut surface.scene_depth_msaa),
            TargetId::SceneResolve => Some(&mut surface.scene_resolve),
            TargetId::Bloom(level) => surface.bloom.get_mut(level as usize),
            TargetId::ShadowMap | TargetId::Swapchain => None,
        }
    }

    pub fn shadow_map(&self) -> &GpuImage {
        &self.shadow_map
    }

    pub fn bloom_image(&self, level: u32) -> Option<&GpuImage> {
        self.surface().bloom.get(level as usize)
    }

    /// Depth texture plus comparison sampler
    pub fn shadow_sampling(&self) -> BindGroupHandle {
        self.shadow_sampling
    }

    pub fn scene_source(&self) -> BindGroupHandle {
        self.surface().scene_source
    }

    pub fn bloom_source(&self, level: u32) -> Option<BindGroupHandle> {
        self.surface().bloom_sources.get(level as usize).copied()
    }

    pub fn composite_sources(&self) -> BindGroupHandle {
        self.surface().composite
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        if let Some(surface) = self.surface.take() {
            surface.destroy(backend);
        }
        backend.destroy_bind_group(self.shadow_sampling);
        self.shadow_map.destroy(backend);
    }
}

impl<B: GraphicsBackend> SurfaceResources<B> for RenderTargets {
    fn recreate(&mut self, backend: &mut B, extent: Extent2d) -> BackendResult<()> {
        log::debug!("Recreating render targets at {}x{}", extent.width, extent.height);
        if let Some(old) = self.surface.take() {
            old.destroy(backend);
        }
        self.surface = Some(SurfaceTargets::create(backend, &self.config, extent)?);
        self.extent = extent;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn config() -> TargetConfig {
        TargetConfig {
            msaa_samples: 4,
            bloom_levels: 4,
            shadow_map_size: 1024,
        }
    }

    #[test]
    fn test_bloom_chain_halves() {
        let mut backend = DummyBackend::new(Extent2d::new(800, 600));
        let targets = RenderTargets::new(&mut backend, config(), Extent2d::new(800, 600)).unwrap();

        let extents: Vec<Extent2d> = (0..4)
            .map(|level| targets.bloom_image(level).unwrap().extent())
            .collect();
        assert_eq!(
            extents,
            vec![
                Extent2d::new(400, 300),
                Extent2d::new(200, 150),
                Extent2d::new(100, 75),
                Extent2d::new(50, 37),
            ]
        );
        assert_eq!(
            targets.image(TargetId::SceneColorMsaa).unwrap().descriptor().samples,
            4
        );
        assert!(targets.image(TargetId::Swapchain).is_none());
        assert!(targets.image(TargetId::Bloom(4)).is_none());
    }

    #[test]
    fn test_recreate_replaces_surface_targets_only() {
        let mut backend = DummyBackend::new(Extent2d::new(64, 64));
        let mut targets = RenderTargets::new(&mut backend, config(), Extent2d::new(64, 64)).unwrap();
        let shadow = targets.shadow_map().id();
        let resolve = targets.image(TargetId::SceneResolve).unwrap().id();
        let images = backend.live_image_count();
        let groups = backend.live_bind_group_count();

        targets.recreate(&mut backend, Extent2d::new(32, 16)).unwrap();

        assert_eq!(targets.shadow_map().id(), shadow);
        assert_ne!(targets.image(TargetId::SceneResolve).unwrap().id(), resolve);
        assert_eq!(targets.extent(), Extent2d::new(32, 16));
        assert_eq!(backend.live_image_count(), images);
        assert_eq!(backend.live_bind_group_count(), groups);

        targets.destroy(&mut backend);
        assert_eq!(backend.live_image_count(), 0);
        assert_eq!(backend.live_bind_group_count(), 0);
    }

    #[test]
    fn test_tiny_surface_clamps_bloom_levels() {
        let mut backend = DummyBackend::new(Extent2d::new(2, 2));
        let targets = RenderTargets::new(&mut backend, config(), Extent2d::new(2, 2)).unwrap();
        assert_eq!(targets.bloom_image(3).unwrap().extent(), Extent2d::new(1, 1));
    }
}
