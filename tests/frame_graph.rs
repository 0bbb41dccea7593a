//! Whole-frame recording: pass order, barrier chains, culling and upload ordering.

mod common;

use common::{
    barriers, dummy_engine, last_record, render_empty, render_pass_labels, rendered_stats,
    test_config, CubeAssets, SURFACE,
};
use glam::{Mat4, Vec3};
use lumina::backend::{DummyEvent, Extent2d, ImageId, RecordedCommand};
use lumina::pipeline::FrameUniforms;
use lumina::render_graph::TargetId;
use lumina::scene::{Camera, Scene};
use lumina::sync::{ImageLayout, ResourceState};
use lumina::ui::{UiFrame, UiTextureUpdate, UiVertex};
use lumina::FrameStatus;
use rstest::rstest;
use std::collections::HashMap;

fn expected_pass_labels(levels: u32) -> Vec<String> {
    let mut labels = vec![
        "shadow".to_string(),
        "main".to_string(),
        "bloom prefilter".to_string(),
    ];
    labels.extend((1..levels).map(|level| format!("bloom downsample {level}")));
    labels.extend((0..levels - 1).rev().map(|level| format!("bloom upsample {level}")));
    labels.push("composite".to_string());
    labels
}

#[rstest]
#[case::single_level(1)]
#[case::two_levels(2)]
#[case::four_levels(4)]
#[case::eight_levels(8)]
fn test_bloom_chain_runs_in_order(#[case] levels: u32) {
    let mut engine = dummy_engine(Extent2d::new(512, 512), test_config().with_bloom_levels(levels));
    let stats = rendered_stats(render_empty(&mut engine));

    assert_eq!(stats.downsample_steps, levels as usize - 1);
    assert_eq!(stats.upsample_steps, levels as usize - 1);
    assert_eq!(stats.stages, if levels == 1 { 5 } else { 6 });

    let commands = last_record(&engine.backend().events());
    assert_eq!(render_pass_labels(&commands), expected_pass_labels(levels));
}

#[rstest]
#[case::two_levels(2)]
#[case::five_levels(5)]
fn test_every_sampled_image_was_transitioned_first(#[case] levels: u32) {
    let mut engine = dummy_engine(SURFACE, test_config().with_bloom_levels(levels));
    render_empty(&mut engine);
    let commands = last_record(&engine.backend().events());

    let targets = engine.renderer().targets();
    let id = |target: TargetId| targets.image(target).unwrap().id();
    let resolve = id(TargetId::SceneResolve);
    let bloom = |level: u32| id(TargetId::Bloom(level));

    // Images a render pass samples, by label
    let sources: HashMap<String, Vec<ImageId>> = expected_pass_labels(levels)
        .into_iter()
        .map(|label| {
            let sampled = if label == "main" {
                vec![targets.shadow_map().id()]
            } else if label == "bloom prefilter" {
                vec![resolve]
            } else if let Some(level) = label.strip_prefix("bloom downsample ") {
                vec![bloom(level.parse::<u32>().unwrap() - 1)]
            } else if let Some(level) = label.strip_prefix("bloom upsample ") {
                vec![bloom(level.parse::<u32>().unwrap() + 1)]
            } else if label == "composite" {
                vec![resolve, bloom(0)]
            } else {
                Vec::new()
            };
            (label, sampled)
        })
        .collect();

    let mut layouts: HashMap<ImageId, ImageLayout> = HashMap::new();
    for command in &commands {
        match command {
            RecordedCommand::Barrier(batch) => {
                for barrier in batch {
                    layouts.insert(barrier.image, barrier.new.layout);
                }
            }
            RecordedCommand::BeginRenderPass {
                label, color, depth, ..
            } => {
                for image in &sources[label] {
                    assert_eq!(
                        layouts.get(image),
                        Some(&ImageLayout::ShaderReadOnly),
                        "{label} samples {image:?} before it is readable"
                    );
                }
                if let Some(color) = color {
                    assert_eq!(layouts.get(&color.image), Some(&ImageLayout::ColorAttachment));
                    if let Some(resolve) = color.resolve_target {
                        assert_eq!(layouts.get(&resolve), Some(&ImageLayout::ColorAttachment));
                    }
                }
                if let Some(depth) = depth {
                    assert_eq!(layouts.get(&depth.image), Some(&ImageLayout::DepthAttachment));
                }
            }
            _ => {}
        }
    }
}

#[test]
fn test_barriers_chain_without_gaps() {
    let mut engine = dummy_engine(SURFACE, test_config().with_bloom_levels(4));
    render_empty(&mut engine);
    let first = barriers(&last_record(&engine.backend().events()));

    let mut last: HashMap<ImageId, ResourceState> = HashMap::new();
    for barrier in &first {
        let expected = last.get(&barrier.image).copied().unwrap_or(ResourceState::UNDEFINED);
        assert_eq!(barrier.old, expected, "{:?} skipped a recorded state", barrier.image);
        last.insert(barrier.image, barrier.new);
    }

    // The swapchain image leaves the frame ready for presentation
    let swap_barrier = first.last().unwrap();
    assert_eq!(swap_barrier.new.layout, ImageLayout::PresentSrc);

    // Persistent targets carry their state into the next frame
    render_empty(&mut engine);
    let second = barriers(&last_record(&engine.backend().events()));
    let shadow = engine.renderer().targets().shadow_map().id();
    let shadow_first = second.iter().find(|b| b.image == shadow).unwrap();
    assert_eq!(shadow_first.old, last[&shadow]);
    assert_eq!(shadow_first.new.layout, ImageLayout::DepthAttachment);
}

#[test]
fn test_shadow_release_elides_the_main_pass_acquire() {
    let mut engine = dummy_engine(SURFACE, test_config());
    let stats = rendered_stats(render_empty(&mut engine));
    assert!(stats.elided_barriers >= 1);

    let shadow = engine.renderer().targets().shadow_map().id();
    let commands = last_record(&engine.backend().events());
    let shadow_barriers: Vec<_> = barriers(&commands)
        .into_iter()
        .filter(|b| b.image == shadow)
        .collect();
    // Into depth for the shadow pass, out to sampling after it; nothing for the main pass
    assert_eq!(shadow_barriers.len(), 2);
    assert_eq!(shadow_barriers[1].new.layout, ImageLayout::ShaderReadOnly);
}

#[test]
fn test_cube_in_front_of_identity_camera_is_drawn() {
    let mut engine = dummy_engine(SURFACE, test_config().with_bloom_levels(4));
    let cube = CubeAssets::upload(&mut engine);

    let mut scene = Scene::new();
    scene.add(cube.drawable());
    let camera = Camera::from_view_projection(Mat4::IDENTITY);

    let status = engine
        .render_frame(&scene, &camera, &UiFrame::empty())
        .unwrap();
    let stats = rendered_stats(status);
    assert_eq!(stats.stages, 6);
    assert_eq!(stats.visible_drawables, 1);
    assert_eq!(stats.culled_drawables, 0);
    assert_eq!(stats.shadow_casters, 1);
    assert_eq!(stats.downsample_steps, 3);
    assert_eq!(stats.upsample_steps, 3);

    let commands = last_record(&engine.backend().events());
    let draws = commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::DrawIndexed { .. }))
        .count();
    assert_eq!(draws, 2, "one shadow draw and one main draw");
    assert!(commands.contains(&RecordedCommand::PushConstants(
        bytemuck::cast_slice(&Mat4::IDENTITY.to_cols_array()).to_vec()
    )));

    let mut backend = engine.shutdown().unwrap();
    cube.destroy(&mut backend);
    assert_eq!(backend.live_buffer_count(), 0);
    assert_eq!(backend.live_bind_group_count(), 0);
    assert_eq!(backend.live_image_count(), 0);
}

#[test]
fn test_off_screen_cube_is_culled_but_still_casts() {
    let mut engine = dummy_engine(SURFACE, test_config());
    let cube = CubeAssets::upload(&mut engine);

    let mut scene = Scene::new();
    scene.add(cube.drawable());
    scene.add(cube.drawable_at(Vec3::new(10.0, 0.0, 0.0)));
    scene.add(cube.drawable_at(Vec3::new(0.2, 0.0, 0.0)).without_shadow());

    let stats = rendered_stats(
        engine
            .render_frame(&scene, &Camera::from_view_projection(Mat4::IDENTITY), &UiFrame::empty())
            .unwrap(),
    );
    assert_eq!(stats.visible_drawables, 2);
    assert_eq!(stats.culled_drawables, 1);
    // The light frustum covers the whole scene, so both shadow casters are drawn
    assert_eq!(stats.shadow_casters, 2);
}

#[test]
fn test_uniforms_are_written_before_recording() {
    let mut engine = dummy_engine(SURFACE, test_config());
    render_empty(&mut engine);
    let events = engine.backend().take_events();

    let kinds: Vec<&str> = events
        .iter()
        .map(|event| match event {
            DummyEvent::WriteBuffer { len, .. } => {
                assert_eq!(*len as u64, FrameUniforms::SIZE);
                "write"
            }
            DummyEvent::ResetCommandBuffer(_) => "reset",
            DummyEvent::Record { .. } => "record",
            DummyEvent::FenceWait { .. } => "wait",
            DummyEvent::Submit { .. } => "submit",
            DummyEvent::Acquire { .. } => "acquire",
            DummyEvent::Present { .. } => "present",
            DummyEvent::WaitIdle => "idle",
            DummyEvent::RecreateSwapchain(_) => "recreate",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["reset", "acquire", "write", "record", "submit", "present"]
    );
}

fn ui_quad() -> UiFrame {
    let vertex = |x: f32, y: f32| UiVertex {
        pos: [x, y],
        uv: [0.0, 0.0],
        color: [255, 255, 255, 255],
    };
    let mut ui = UiFrame::empty();
    ui.push_batch(
        [0.0, 0.0, 100.0, 100.0],
        &[vertex(10.0, 10.0), vertex(90.0, 10.0), vertex(90.0, 90.0), vertex(10.0, 90.0)],
        &[0, 1, 2, 0, 2, 3],
    );
    ui.font_updates.push(UiTextureUpdate {
        pos: None,
        size: [2, 2],
        pixels: vec![255; 16],
    });
    ui
}

#[test]
fn test_ui_overlay_draws_after_composite_and_uploads_font_first() {
    let mut engine = dummy_engine(SURFACE, test_config());
    let status = engine
        .render_frame(&Scene::new(), &Camera::default(), &ui_quad())
        .unwrap();
    let stats = rendered_stats(status);
    assert_eq!(stats.ui_batches, 1);

    let commands = last_record(&engine.backend().events());
    assert_eq!(commands[0], RecordedCommand::BeginDebugGroup("font upload".to_string()));
    let copy = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::CopyBufferToImage { .. }))
        .unwrap();
    let first_pass = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::BeginRenderPass { .. }))
        .unwrap();
    assert!(copy < first_pass);

    let labels = render_pass_labels(&commands);
    assert_eq!(labels.last().map(String::as_str), Some("overlay"));
    assert_eq!(labels[labels.len() - 2], "composite");

    // UI geometry and the staged pixels were written before recording
    let events = engine.backend().events();
    let writes = events
        .iter()
        .filter(|e| matches!(e, DummyEvent::WriteBuffer { .. }))
        .count();
    assert_eq!(writes, 4, "uniforms, ui vertices, ui indices, font staging");

    // Without new pixels the next frame skips the upload
    engine.backend().take_events();
    let mut ui = ui_quad();
    ui.font_updates.clear();
    engine.render_frame(&Scene::new(), &Camera::default(), &ui).unwrap();
    let commands = last_record(&engine.backend().events());
    assert!(!commands
        .iter()
        .any(|c| matches!(c, RecordedCommand::CopyBufferToImage { .. })));
    assert_eq!(render_pass_labels(&commands).last().map(String::as_str), Some("overlay"));
}

#[test]
fn test_minimized_then_restored_engine_keeps_rendering() {
    let mut engine = dummy_engine(SURFACE, test_config());
    engine.resize(0, 0);
    assert_eq!(render_empty(&mut engine), FrameStatus::Skipped);
    engine.resize(SURFACE.width, SURFACE.height);
    assert!(matches!(render_empty(&mut engine), FrameStatus::Rendered { .. }));
}
