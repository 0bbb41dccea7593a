//! Interactive viewer: a small lit scene with bloom and an egui overlay
//!
//! Run with:
//!   cargo run --example viewer
//!   cargo run --example viewer -- --msaa 8 --bloom-levels 6 --no-vsync
//!
//! Controls:
//!   Space   - Pause/resume the orbit
//!   Escape  - Exit

use clap::Parser;
use glam::{Quat, Vec3};
use lumina::{
    resources::{GpuMaterial, GpuMesh, Material, Mesh},
    scene::{Camera, Drawable, Projection, Scene, Transform},
    ui::UiFrame,
    window::{self, WindowCallback},
    Engine, EngineConfig, FrameStatus, TonemapOperator, VulkanBackend, Window,
};
use std::time::{Duration, Instant};
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Parser, Debug)]
#[command(name = "viewer", about = "HDR forward renderer demo")]
struct Args {
    /// Window width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// MSAA sample count (2, 4 or 8)
    #[arg(long, default_value_t = 4)]
    msaa: u32,

    /// Levels of the bloom pyramid
    #[arg(long, default_value_t = 5)]
    bloom_levels: u32,

    /// Frames the CPU may record ahead of the GPU
    #[arg(long, default_value_t = 2)]
    frames_in_flight: u32,

    /// Present without waiting for vertical blank
    #[arg(long)]
    no_vsync: bool,

    /// Enable the Vulkan validation layer
    #[arg(long)]
    validation: bool,
}

struct SceneAssets {
    meshes: Vec<GpuMesh>,
    materials: Vec<GpuMaterial>,
}

impl SceneAssets {
    fn destroy(self, backend: &mut VulkanBackend) {
        for mesh in self.meshes {
            mesh.destroy(backend);
        }
        for material in self.materials {
            material.destroy(backend);
        }
    }
}

fn build_scene(backend: &mut VulkanBackend) -> lumina::backend::BackendResult<(Scene, SceneAssets)> {
    let ground = Mesh::plane(20.0, 20.0).upload(backend)?;
    let cube = Mesh::cube(1.0).upload(backend)?;
    let sphere = Mesh::sphere(0.6, 48, 24).upload(backend)?;

    let floor = Material::plastic(Vec3::new(0.55, 0.55, 0.5)).upload(backend)?;
    let red = Material::plastic(Vec3::new(0.8, 0.1, 0.08)).upload(backend)?;
    let gold = Material::metal(Vec3::new(1.0, 0.78, 0.34), 0.3).upload(backend)?;
    let glow = Material::emissive(Vec3::new(0.4, 0.8, 1.0), 12.0).upload(backend)?;

    let mut scene = Scene::new();
    scene.add(Drawable::new(ground, &floor).without_shadow());
    scene.add(Drawable::new(cube, &red).with_transform(
        Transform::from_position(Vec3::new(-1.5, 0.5, 0.0)).with_rotation(Quat::from_rotation_y(0.6)),
    ));
    scene.add(Drawable::new(sphere, &gold).with_transform(Transform::from_position(Vec3::new(1.5, 0.6, 0.0))));
    scene.add(
        Drawable::new(sphere, &glow)
            .with_transform(Transform::from_position_scale(Vec3::new(0.0, 1.8, -1.5), Vec3::splat(0.3)))
            .without_shadow(),
    );

    Ok((
        scene,
        SceneAssets {
            meshes: vec![ground, cube, sphere],
            materials: vec![floor, red, gold, glow],
        },
    ))
}

struct Viewer {
    engine: Option<Engine<VulkanBackend>>,
    assets: Option<SceneAssets>,
    scene: Scene,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    start: Instant,
    last_frame: Instant,
    projection: Projection,
    orbit_angle: f32,
    paused: bool,
    frame_time: Duration,
}

impl Viewer {
    fn camera(&self) -> Camera {
        let eye = Vec3::new(self.orbit_angle.cos() * 7.0, 3.0, self.orbit_angle.sin() * 7.0);
        Camera::look_at(eye, Vec3::new(0.0, 0.5, 0.0), self.projection)
    }

    fn build_ui(&mut self, window: &Window) -> UiFrame {
        let raw_input = self.egui_state.take_egui_input(window.window());
        let frame_ms = self.frame_time.as_secs_f32() * 1000.0;
        let Some(engine) = self.engine.as_mut() else {
            return UiFrame::empty();
        };
        let settings = engine.settings_mut();

        let output = self.egui_ctx.run(raw_input, |ctx| {
            egui::Window::new("Renderer").show(ctx, |ui| {
                ui.label(format!("{frame_ms:.2} ms"));
                ui.add(egui::Slider::new(&mut settings.exposure, 0.1..=4.0).text("exposure"));
                ui.add(egui::Slider::new(&mut settings.bloom_strength, 0.0..=0.3).text("bloom"));
                ui.add(egui::Slider::new(&mut settings.bloom_threshold, 0.0..=4.0).text("threshold"));
                egui::ComboBox::from_label("tonemap")
                    .selected_text(settings.tonemap.name())
                    .show_ui(ui, |ui| {
                        for operator in TonemapOperator::ALL {
                            ui.selectable_value(&mut settings.tonemap, operator, operator.name());
                        }
                    });
            });
        });

        self.egui_state
            .handle_platform_output(window.window(), output.platform_output);
        let primitives = self.egui_ctx.tessellate(output.shapes, output.pixels_per_point);
        UiFrame::from_egui(&primitives, &output.textures_delta, output.pixels_per_point)
    }

    fn frame(&mut self, window: &mut Window) {
        let now = Instant::now();
        self.frame_time = now - self.last_frame;
        self.last_frame = now;
        if !self.paused {
            self.orbit_angle += self.frame_time.as_secs_f32() * 0.3;
        }

        if let Some(extent) = window.take_resize() {
            if !extent.is_empty() {
                self.projection.set_aspect(extent.aspect_ratio());
            }
            if let Some(engine) = self.engine.as_mut() {
                engine.resize(extent.width, extent.height);
            }
        }

        let ui = self.build_ui(window);
        let camera = self.camera();
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        match engine.render_frame(&self.scene, &camera, &ui) {
            Ok(FrameStatus::Rendered { stats, .. }) => log::trace!("{stats:?}"),
            Ok(status) => log::debug!("Frame not rendered: {status:?}"),
            Err(err) if err.is_fatal() => {
                log::error!("Rendering failed: {err}");
                window.request_close();
            }
            Err(err) => log::warn!("Frame failed: {err}"),
        }
    }

    fn shutdown(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        log::info!("Ran for {:.1}s", self.start.elapsed().as_secs_f32());
        match engine.shutdown() {
            Ok(mut backend) => {
                if let Some(assets) = self.assets.take() {
                    assets.destroy(&mut backend);
                }
            }
            Err(err) => log::error!("Shutdown failed: {err}"),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    lumina::init_logging();
    let args = Args::parse();

    let config = EngineConfig::default()
        .with_title("lumina viewer")
        .with_size(args.width, args.height)
        .with_vsync(!args.no_vsync)
        .with_msaa_samples(args.msaa)
        .with_bloom_levels(args.bloom_levels)
        .with_frames_in_flight(args.frames_in_flight)
        .with_validation(args.validation || cfg!(debug_assertions));
    config.validate()?;

    let event_loop = window::create_event_loop()?;
    let window = Window::new(&event_loop, &config.title, config.width, config.height)?;

    let mut engine = Engine::for_window(window.window(), config)?;
    let (scene, assets) = build_scene(engine.backend_mut())?;

    let egui_ctx = egui::Context::default();
    let egui_state = egui_winit::State::new(
        egui_ctx.clone(),
        egui::ViewportId::ROOT,
        window.window(),
        Some(window.window().scale_factor() as f32),
        None,
    );

    let now = Instant::now();
    let mut viewer = Viewer {
        engine: Some(engine),
        assets: Some(assets),
        scene,
        egui_ctx,
        egui_state,
        start: now,
        last_frame: now,
        projection: Projection::perspective(50.0, window.extent().aspect_ratio(), 0.1, 100.0),
        orbit_angle: 0.0,
        paused: false,
        frame_time: Duration::ZERO,
    };

    window::run(event_loop, window, move |window, callback| match callback {
        WindowCallback::Event(event) => {
            let response = viewer.egui_state.on_window_event(window.window(), event);
            if response.consumed {
                return;
            }
            if let WindowEvent::KeyboardInput { event, .. } = event {
                if event.state == ElementState::Pressed {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => window.request_close(),
                        PhysicalKey::Code(KeyCode::Space) => viewer.paused = !viewer.paused,
                        _ => {}
                    }
                }
            }
        }
        WindowCallback::Frame => viewer.frame(window),
        WindowCallback::Exiting => viewer.shutdown(),
    })?;

    Ok(())
}
