//! Swapchain invalidation: resize, minimize, out-of-date and suboptimal results.

mod common;

use common::{dummy_engine, last_record, position, render_empty, test_config, SURFACE};
use lumina::backend::{AcquireOutcome, DummyEvent, Extent2d, GraphicsBackend, PresentOutcome};
use lumina::frame::{PresentStatus, SlotState};
use lumina::render_graph::TargetId;
use lumina::sync::ImageLayout;
use lumina::FrameStatus;

fn recreations(events: &[DummyEvent]) -> Vec<Extent2d> {
    events
        .iter()
        .filter_map(|e| match e {
            DummyEvent::RecreateSwapchain(extent) => Some(*extent),
            _ => None,
        })
        .collect()
}

#[test]
fn test_resize_rebuilds_before_the_next_acquire() {
    let mut engine = dummy_engine(SURFACE, test_config().with_bloom_levels(3));
    render_empty(&mut engine);
    let images_before = engine.backend().live_image_count();
    engine.backend().take_events();

    engine.resize(640, 480);
    assert!(engine.ring().rebuild_pending());
    let status = render_empty(&mut engine);
    assert!(matches!(status, FrameStatus::Rendered { .. }));

    let events = engine.backend().take_events();
    assert_eq!(recreations(&events), vec![Extent2d::new(640, 480)]);
    let idle = position(&events, |e| matches!(e, DummyEvent::WaitIdle)).unwrap();
    let recreate = position(&events, |e| matches!(e, DummyEvent::RecreateSwapchain(_))).unwrap();
    let acquire = position(&events, |e| matches!(e, DummyEvent::Acquire { .. })).unwrap();
    assert!(idle < recreate && recreate < acquire);

    assert_eq!(engine.surface_extent(), Extent2d::new(640, 480));
    let targets = engine.renderer().targets();
    assert_eq!(targets.extent(), Extent2d::new(640, 480));
    assert_eq!(targets.bloom_image(0).unwrap().extent(), Extent2d::new(320, 240));
    // The shadow map does not follow the surface
    assert_eq!(targets.shadow_map().extent(), Extent2d::new(2048, 2048));
    assert_eq!(engine.backend().live_image_count(), images_before);
    assert!(!engine.ring().rebuild_pending());

    // The backend was asked for the new sizes, not only the bookkeeping
    for (target, extent, samples) in [
        (TargetId::SceneColorMsaa, Extent2d::new(640, 480), 4),
        (TargetId::SceneDepthMsaa, Extent2d::new(640, 480), 4),
        (TargetId::SceneResolve, Extent2d::new(640, 480), 1),
        (TargetId::Bloom(2), Extent2d::new(80, 60), 1),
    ] {
        let id = targets.image(target).unwrap().id();
        let desc = engine.backend().image_descriptor(id).unwrap();
        assert_eq!((desc.extent, desc.samples), (extent, samples), "{target:?}");
    }
}

#[test]
fn test_resize_to_same_size_is_ignored() {
    let mut engine = dummy_engine(SURFACE, test_config());
    engine.resize(SURFACE.width, SURFACE.height);
    assert!(!engine.ring().rebuild_pending());
    render_empty(&mut engine);
    assert!(recreations(&engine.backend().events()).is_empty());
}

#[test]
fn test_minimized_surface_skips_frames() {
    let mut engine = dummy_engine(SURFACE, test_config());
    render_empty(&mut engine);
    engine.backend().take_events();

    engine.resize(0, 0);
    for _ in 0..3 {
        assert_eq!(render_empty(&mut engine), FrameStatus::Skipped);
    }
    assert!(engine.backend().take_events().is_empty());
    assert_eq!(engine.ring().frame_number(), 1);

    engine.resize(800, 600);
    let status = render_empty(&mut engine);
    assert!(matches!(status, FrameStatus::Rendered { .. }));
    assert_eq!(
        recreations(&engine.backend().events()),
        vec![Extent2d::new(800, 600)]
    );
}

#[test]
fn test_out_of_date_acquire_drops_the_frame() {
    let mut engine = dummy_engine(SURFACE, test_config());
    engine.backend_mut().script_acquire(AcquireOutcome::OutOfDate);

    assert_eq!(render_empty(&mut engine), FrameStatus::Dropped);
    let events = engine.backend().take_events();
    assert!(!events.iter().any(|e| matches!(e, DummyEvent::Record { .. })));
    assert!(!events.iter().any(|e| matches!(e, DummyEvent::Submit { .. })));
    assert!(engine.ring().rebuild_pending());
    assert_eq!(engine.ring().slot_state(0), SlotState::Idle);
    assert_eq!(engine.ring().frame_number(), 0);

    // Rebuilt at the same size, then the frame goes through on the same slot
    let status = render_empty(&mut engine);
    assert!(matches!(
        status,
        FrameStatus::Rendered {
            present: PresentStatus::Presented,
            ..
        }
    ));
    assert_eq!(recreations(&engine.backend().events()), vec![SURFACE]);
    assert_eq!(engine.ring().frame_number(), 1);
}

#[test]
fn test_out_of_date_present_rebuilds_next_frame() {
    let mut engine = dummy_engine(SURFACE, test_config());
    engine.backend_mut().script_present(PresentOutcome::OutOfDate);

    let status = render_empty(&mut engine);
    assert!(matches!(
        status,
        FrameStatus::Rendered {
            present: PresentStatus::SurfaceStale,
            ..
        }
    ));
    assert!(engine.ring().rebuild_pending());

    engine.backend().take_events();
    render_empty(&mut engine);
    assert_eq!(recreations(&engine.backend().events()), vec![SURFACE]);
}

#[test]
fn test_suboptimal_results_present_and_schedule_a_rebuild() {
    let mut engine = dummy_engine(SURFACE, test_config());
    engine.backend_mut().script_acquire(AcquireOutcome::Acquired {
        image_index: 0,
        suboptimal: true,
    });
    let status = render_empty(&mut engine);
    assert!(matches!(
        status,
        FrameStatus::Rendered {
            present: PresentStatus::Presented,
            ..
        }
    ));
    assert!(engine.ring().rebuild_pending());
    render_empty(&mut engine);
    assert!(!engine.ring().rebuild_pending());

    engine.backend_mut().script_present(PresentOutcome::Suboptimal);
    let status = render_empty(&mut engine);
    assert!(matches!(
        status,
        FrameStatus::Rendered {
            present: PresentStatus::Suboptimal,
            ..
        }
    ));
    assert!(engine.ring().rebuild_pending());
}

#[test]
fn test_swapchain_image_count_change_resizes_semaphore_pools() {
    let mut engine = dummy_engine(SURFACE, test_config().with_frames_in_flight(2));
    assert_eq!(engine.ring().swap_image_count(), 3);
    assert_eq!(engine.ring().acquire_semaphore_count(), 3);

    engine.backend_mut().set_image_count(5);
    engine.resize(400, 300);
    for _ in 0..7 {
        render_empty(&mut engine);
    }
    assert_eq!(engine.ring().swap_image_count(), 5);
    assert_eq!(engine.ring().acquire_semaphore_count(), 5);

    // Fewer images than frames in flight still leaves one acquire semaphore per slot
    engine.backend_mut().set_image_count(1);
    engine.resize(200, 150);
    for _ in 0..3 {
        render_empty(&mut engine);
    }
    assert_eq!(engine.ring().swap_image_count(), 1);
    assert_eq!(engine.ring().acquire_semaphore_count(), 2);

    let backend = engine.shutdown().expect("shutdown");
    assert_eq!(backend.live_sync_object_count(), 0);
}

#[test]
fn test_new_swapchain_images_start_undefined() {
    let mut engine = dummy_engine(SURFACE, test_config());
    for _ in 0..3 {
        render_empty(&mut engine);
    }
    engine.resize(256, 256);
    render_empty(&mut engine);

    let swap_images = engine.backend().swapchain_info().images;
    let commands = last_record(&engine.backend().events());
    let first = common::barriers(&commands)
        .into_iter()
        .find(|b| swap_images.contains(&b.image))
        .expect("swapchain image barrier");
    assert_eq!(first.old.layout, ImageLayout::Undefined);
    assert_eq!(first.new.layout, ImageLayout::ColorAttachment);

    // Surface-sized targets are new images too
    let resolve = engine
        .renderer()
        .targets()
        .image(TargetId::SceneResolve)
        .unwrap()
        .id();
    let first = common::barriers(&commands)
        .into_iter()
        .find(|b| b.image == resolve)
        .unwrap();
    assert_eq!(first.old.layout, ImageLayout::Undefined);
}
