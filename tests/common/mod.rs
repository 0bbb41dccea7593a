//! Shared helpers for the engine integration tests.
//!
//! Every test drives a real [`Engine`] over the [`DummyBackend`], which records each
//! backend call and command so the tests can assert on ordering and synchronization.

use glam::{Mat4, Vec3};
use lumina::backend::{DummyBackend, DummyEvent, Extent2d, RecordedCommand};
use lumina::pipeline::FrameStats;
use lumina::resources::{GpuMaterial, GpuMesh, Material, Mesh};
use lumina::scene::{Camera, Drawable, Scene};
use lumina::sync::ImageBarrier;
use lumina::ui::UiFrame;
use lumina::{Engine, EngineConfig, FrameStatus};

pub const SURFACE: Extent2d = Extent2d::new(320, 240);

pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_validation(false)
}

pub fn dummy_engine(extent: Extent2d, config: EngineConfig) -> Engine<DummyBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    Engine::new(DummyBackend::new(extent), config).expect("engine over the dummy backend")
}

/// Render a frame with no drawables and no UI
pub fn render_empty(engine: &mut Engine<DummyBackend>) -> FrameStatus {
    engine
        .render_frame(&Scene::new(), &Camera::default(), &UiFrame::empty())
        .expect("frame")
}

#[allow(dead_code)]
pub fn rendered_stats(status: FrameStatus) -> FrameStats {
    match status {
        FrameStatus::Rendered { stats, .. } => stats,
        other => panic!("expected a rendered frame, got {other:?}"),
    }
}

/// Commands of the most recent recorded command buffer
#[allow(dead_code)]
pub fn last_record(events: &[DummyEvent]) -> Vec<RecordedCommand> {
    events
        .iter()
        .rev()
        .find_map(|event| match event {
            DummyEvent::Record { commands, .. } => Some(commands.clone()),
            _ => None,
        })
        .expect("no command buffer was recorded")
}

/// Every image barrier, flattened in recording order
#[allow(dead_code)]
pub fn barriers(commands: &[RecordedCommand]) -> Vec<ImageBarrier> {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::Barrier(barriers) => Some(barriers.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[allow(dead_code)]
pub fn render_pass_labels(commands: &[RecordedCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::BeginRenderPass { label, .. } => Some(label.clone()),
            _ => None,
        })
        .collect()
}

#[allow(dead_code)]
pub fn position<F: Fn(&DummyEvent) -> bool>(events: &[DummyEvent], predicate: F) -> Option<usize> {
    events.iter().position(predicate)
}

/// Unit cube and a plastic material uploaded to the engine's backend
#[allow(dead_code)]
pub struct CubeAssets {
    pub mesh: GpuMesh,
    pub material: GpuMaterial,
}

#[allow(dead_code)]
impl CubeAssets {
    pub fn upload(engine: &mut Engine<DummyBackend>) -> Self {
        let backend = engine.backend_mut();
        Self {
            mesh: Mesh::cube(1.0).upload(backend).expect("cube upload"),
            material: Material::plastic(Vec3::new(0.8, 0.2, 0.2))
                .upload(backend)
                .expect("material upload"),
        }
    }

    pub fn drawable(&self) -> Drawable {
        Drawable::new(self.mesh, &self.material)
    }

    pub fn drawable_at(&self, translation: Vec3) -> Drawable {
        self.drawable()
            .with_world(Mat4::from_translation(translation))
    }

    pub fn destroy(self, backend: &mut DummyBackend) {
        self.mesh.destroy(backend);
        self.material.destroy(backend);
    }
}
