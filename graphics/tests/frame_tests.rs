//! Frame loop integration tests.
//!
//! These drive the device through whole frames the way an application
//! does: begin, record, submit, present, end. Checks that need the
//! recording backend's bookkeeping (validation log, resource states,
//! present counts) only run on the dummy backend.
//!
//! ```bash
//! cargo test --test frame_tests
//! SOLSTICE_SHADER_DIR=shaders/spv cargo test --features vulkan-backend --test frame_tests
//! ```

mod common;

use std::thread;
use std::time::Duration;

use glam::Vec3;
use rstest::rstest;

use common::{Backend, TestContext};
use solstice_graphics::backend::GpuResourceHandle;
use solstice_graphics::backend::dummy::StallGate;
use solstice_graphics::scene::{LightDescriptor, MeshData, ModelDescriptor, Transform};
use solstice_graphics::{
    Context, Device, EditorOverlay, FrameRenderer, FrameView, GraphicsContext, GraphicsError,
    ResourceState, Scene,
};

fn demo_scene(device: &Device) -> Scene {
    let mut scene = Scene::new(device).expect("scene");
    scene
        .add_model(
            device,
            &ModelDescriptor::new("cube", MeshData::cube())
                .with_transform(Transform::from_translation(Vec3::new(0.0, 0.5, 0.0))),
        )
        .expect("cube");
    scene
        .add_model(
            device,
            &ModelDescriptor::new("sphere", MeshData::sphere(16, 8))
                .with_transform(Transform::from_translation(Vec3::new(2.0, 0.5, 0.0))),
        )
        .expect("sphere");
    scene
        .add_light(LightDescriptor::directional(
            Vec3::new(-0.3, -1.0, -0.2),
            Vec3::ONE,
            3.0,
        ))
        .expect("sun");
    scene
}

// ============================================================================
// Frame Slots and Fences
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_frame_slots_cycle(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let slots = ctx.device.frames_in_flight();
    assert_eq!(ctx.device.current_frame_index(), 0);

    for frame in 0..100u64 {
        assert_eq!(ctx.device.frame_count(), frame);
        assert_eq!(ctx.device.current_frame_index(), frame as usize % slots);
        ctx.empty_frame();
    }

    assert_eq!(ctx.device.frame_count(), 100);
    if let Some(swapchain) = ctx.device.swapchain().as_dummy() {
        assert_eq!(swapchain.present_count(), 100);
    }
    assert!(ctx.validation_errors().is_empty());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_frame_fence_values_increase(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut last = ctx.device.direct_queue().current_fence_value();
    for _ in 0..8 {
        let slot = ctx.device.current_frame_index();
        ctx.empty_frame();
        let value = ctx.device.frame_fence_value(slot).expect("slot fence");
        assert!(value > last, "fence value {value} after {last}");
        last = value;

        // The slot about to be recorded has finished its previous frame.
        let next = ctx.device.current_frame_index();
        let pending = ctx.device.frame_fence_value(next).expect("slot fence");
        assert!(ctx.device.direct_queue().is_fence_complete(pending));
    }
    ctx.device.wait_idle().expect("wait idle");
    assert!(ctx.device.direct_queue().completed_fence_value() >= last);
}

#[test]
fn test_end_frame_waits_for_reused_slot() {
    let Some(mut ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let device = &mut ctx.device;
    let gate = StallGate::new();

    device.begin_frame().unwrap();
    device
        .graphics_context()
        .command_list_mut()
        .as_dummy_mut()
        .unwrap()
        .stall_until(&gate);
    device.execute_graphics_context().unwrap();
    device.present().unwrap();
    // The next slot has never been used, so this returns at once.
    device.end_frame().unwrap();
    let first = device.frame_fence_value(0).unwrap();
    assert!(!device.direct_queue().is_fence_complete(first));

    let opener = {
        let gate = gate.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            gate.open();
        })
    };

    device.begin_frame().unwrap();
    device.execute_graphics_context().unwrap();
    device.present().unwrap();
    // Slot 0 comes around again and must wait for the stalled frame.
    device.end_frame().unwrap();
    assert!(gate.is_open());
    assert!(device.direct_queue().is_fence_complete(first));
    assert_eq!(device.current_frame_index(), 0);

    opener.join().unwrap();
}

// ============================================================================
// Window Resize
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_resize_window_rewrites_backbuffer_rtvs(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    ctx.empty_frame();
    let rtvs = ctx.device.backbuffer_rtvs().to_vec();
    let rtv_cursor = ctx.device.rtv_heap().current_descriptor_index();

    ctx.device.resize_window(96, 80).unwrap();
    assert_eq!(ctx.device.backbuffer_extent().width, 96);
    assert_eq!(ctx.device.backbuffer_extent().height, 80);
    assert_eq!(ctx.device.backbuffer_rtvs(), rtvs.as_slice());
    assert_eq!(ctx.device.rtv_heap().current_descriptor_index(), rtv_cursor);
    for (index, rtv) in ctx.device.backbuffer_rtvs().iter().enumerate() {
        assert_eq!(rtv.index() as usize, index);
    }
    if let Some(dummy) = ctx.dummy() {
        for (index, rtv) in ctx.device.backbuffer_rtvs().iter().enumerate() {
            let backbuffer = ctx.device.swapchain().backbuffer(index).unwrap();
            let target = dummy.descriptor_target(*rtv).map(GpuResourceHandle::Dummy);
            assert_eq!(target, Some(backbuffer.handle()));
        }
    }
    assert_eq!(
        ctx.device.current_frame_index(),
        ctx.device.swapchain().current_index()
    );

    // Minimized windows report a zero size.
    ctx.device.resize_window(0, 0).unwrap();
    assert_eq!(ctx.device.backbuffer_extent().width, 96);

    for _ in 0..4 {
        ctx.empty_frame();
    }
    assert!(ctx.validation_errors().is_empty());
}

#[test]
fn test_resize_window_drains_pending_work() {
    let Some(mut ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let device = &mut ctx.device;
    let gate = StallGate::new();

    device.begin_frame().unwrap();
    device
        .graphics_context()
        .command_list_mut()
        .as_dummy_mut()
        .unwrap()
        .stall_until(&gate);
    device.execute_graphics_context().unwrap();
    device.present().unwrap();
    device.end_frame().unwrap();

    let mut copy = device.get_copy_context().unwrap();
    copy.command_list_mut()
        .as_dummy_mut()
        .unwrap()
        .stall_until(&gate);
    device.copy_queue().execute_contexts(&mut [&mut copy]).unwrap();
    let copy_value = device.copy_queue().signal().unwrap();
    let direct_value = device.frame_fence_value(0).unwrap();
    assert!(!device.direct_queue().is_fence_complete(direct_value));
    assert!(!device.copy_queue().is_fence_complete(copy_value));

    let opener = {
        let gate = gate.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            gate.open();
        })
    };
    device.resize_window(72, 40).unwrap();
    assert!(gate.is_open());

    for queue in [device.direct_queue(), device.copy_queue()] {
        assert_eq!(queue.completed_fence_value(), queue.current_fence_value());
    }
    let completed = device.direct_queue().completed_fence_value();
    for slot in 0..device.frames_in_flight() {
        assert_eq!(device.frame_fence_value(slot), Some(completed));
    }

    opener.join().unwrap();
    drop(copy);
    ctx.empty_frame();
    assert!(ctx.validation_errors().is_empty());
}

// ============================================================================
// Full Deferred Frame
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_deferred_frames_render_cleanly(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut renderer = FrameRenderer::new(&ctx.device).unwrap();
    let mut scene = demo_scene(&ctx.device);

    for _ in 0..6 {
        renderer
            .render_frame(&mut ctx.device, &mut scene, None, 1.0 / 60.0)
            .unwrap();
    }
    ctx.device.wait_idle().unwrap();
    assert_eq!(ctx.device.frame_count(), 6);
    assert_eq!(ctx.validation_errors(), Vec::<String>::new());
}

#[test]
fn test_targets_return_to_resting_states() {
    let Some(mut ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let mut renderer = FrameRenderer::new(&ctx.device).unwrap();
    let mut scene = demo_scene(&ctx.device);
    renderer
        .render_frame(&mut ctx.device, &mut scene, None, 0.016)
        .unwrap();
    ctx.device.wait_idle().unwrap();

    let dummy = ctx.dummy().unwrap();
    for target in renderer.targets() {
        assert_eq!(
            dummy.resource_state(target.handle()),
            Some(ResourceState::ShaderResource),
            "{:?}",
            target.label()
        );
    }
    assert_eq!(
        dummy.resource_state(renderer.depth().handle()),
        Some(ResourceState::DepthWrite)
    );
    for index in 0..ctx.device.frames_in_flight() {
        let backbuffer = ctx.device.swapchain().backbuffer(index).unwrap();
        assert_eq!(
            dummy.resource_state(backbuffer.handle()),
            Some(ResourceState::Present)
        );
    }
}

#[test]
fn test_frame_records_draws_and_dispatches() {
    let Some(mut ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let mut renderer = FrameRenderer::new(&ctx.device).unwrap();
    let mut scene = demo_scene(&ctx.device);

    ctx.device.begin_frame().unwrap();
    renderer
        .render(&ctx.device, &mut scene, None, 0.016)
        .unwrap();
    {
        let graphics = ctx.device.graphics_context();
        let list = graphics.command_list().as_dummy().unwrap();
        // Both models are drawn into the gbuffer and the shadow map.
        assert!(list.draw_count() >= 4, "{} draws", list.draw_count());
        assert!(list.dispatch_count() > 0);
    }
    ctx.device.execute_graphics_context().unwrap();
    ctx.device.present().unwrap();
    ctx.device.end_frame().unwrap();
}

#[test]
fn test_renderer_resize_across_bloom_mip_counts() {
    let Some(mut ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let mut renderer = FrameRenderer::new(&ctx.device).unwrap();
    let mut scene = demo_scene(&ctx.device);
    renderer
        .render_frame(&mut ctx.device, &mut scene, None, 0.016)
        .unwrap();
    let cursor = ctx.device.cbv_srv_uav_heap().current_descriptor_index();
    let bloom_srv = renderer.bloom().output().srv_index();

    // 8x8 has a 3 mip pyramid, 64x64 the full 5.
    for _ in 0..10 {
        renderer.resize(&mut ctx.device, 8, 8, None).unwrap();
        renderer
            .render_frame(&mut ctx.device, &mut scene, None, 0.016)
            .unwrap();
        renderer.resize(&mut ctx.device, 64, 64, None).unwrap();
        renderer
            .render_frame(&mut ctx.device, &mut scene, None, 0.016)
            .unwrap();
    }

    assert_eq!(ctx.device.cbv_srv_uav_heap().current_descriptor_index(), cursor);
    assert_eq!(renderer.bloom().output().srv_index(), bloom_srv);
    ctx.device.wait_idle().unwrap();
    assert!(ctx.validation_errors().is_empty(), "{:?}", ctx.validation_errors());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_renderer_resize_keeps_descriptor_cursors(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut renderer = FrameRenderer::new(&ctx.device).unwrap();
    let mut scene = demo_scene(&ctx.device);
    renderer
        .render_frame(&mut ctx.device, &mut scene, None, 0.016)
        .unwrap();

    let cursors = |device: &Device| {
        (
            device.cbv_srv_uav_heap().current_descriptor_index(),
            device.rtv_heap().current_descriptor_index(),
            device.dsv_heap().current_descriptor_index(),
        )
    };
    let before = cursors(&ctx.device);
    let hdr_srv = renderer.hdr().srv_index();
    let depth_dsv = renderer.depth().dsv();

    // 128x96 keeps the bloom pyramid at the same mip count.
    renderer.resize(&mut ctx.device, 128, 96, None).unwrap();
    assert_eq!(cursors(&ctx.device), before);
    assert_eq!(renderer.hdr().srv_index(), hdr_srv);
    assert_eq!(renderer.depth().dsv(), depth_dsv);
    assert_eq!(renderer.extent().width, 128);
    assert_eq!(renderer.hdr().width(), 128);
    assert_eq!(renderer.geometry().albedo().height(), 96);

    for _ in 0..3 {
        renderer
            .render_frame(&mut ctx.device, &mut scene, None, 0.016)
            .unwrap();
    }
    ctx.device.wait_idle().unwrap();
    assert!(ctx.validation_errors().is_empty());
}

// ============================================================================
// Editor Overlay
// ============================================================================

#[derive(Default)]
struct RecordingOverlay {
    frames: Vec<usize>,
    resized: Option<(u32, u32)>,
}

impl EditorOverlay for RecordingOverlay {
    fn render(
        &mut self,
        _device: &Device,
        scene: &mut Scene,
        frame: &FrameView,
        ctx: &mut GraphicsContext,
    ) -> Result<(), GraphicsError> {
        self.frames.push(frame.frame_index);
        assert_eq!(ctx.pending_barriers(), 0);
        if let Some(model) = scene.model_by_name("cube") {
            model.transform.translation.y += 0.1;
        }
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        self.resized = Some((width, height));
    }
}

#[test]
fn test_editor_overlay_runs_each_frame() {
    let Some(mut ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let mut renderer = FrameRenderer::new(&ctx.device).unwrap();
    let mut scene = demo_scene(&ctx.device);
    let mut overlay = RecordingOverlay::default();

    for _ in 0..4 {
        renderer
            .render_frame(&mut ctx.device, &mut scene, Some(&mut overlay), 0.016)
            .unwrap();
    }
    assert_eq!(overlay.frames, vec![0, 1, 0, 1]);
    let cube = scene.model_by_name("cube").unwrap();
    assert!((cube.transform.translation.y - 0.9).abs() < 1e-4);

    renderer
        .resize(&mut ctx.device, 80, 60, Some(&mut overlay))
        .unwrap();
    assert_eq!(overlay.resized, Some((80, 60)));

    ctx.device.wait_idle().unwrap();
    assert!(ctx.validation_errors().is_empty());
}
