//! Resource, descriptor and device setup integration tests.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{Backend, TestContext, test_config, test_pattern};
use solstice_graphics::types::DescriptorHeapType;
use solstice_graphics::{
    AdapterInfo, AdapterType, BackendKind, BindingTier, BufferDescriptor, BufferUsage, Device,
    DeviceConfig, DummyBackend, DummyOptions, GraphicsError, HeapCapacities, InMemoryShaders,
    ResourceState, TextureDescriptor, TextureFormat, TextureUsage,
};

// ============================================================================
// Upload and Readback
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_texture_upload_readback(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let pixels = test_pattern(8, 8);
    let texture = ctx
        .device
        .create_texture(
            &TextureDescriptor::new_2d(
                8,
                8,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TextureFromData,
            )
            .with_full_mip_chain()
            .with_label("pattern"),
            Some(&pixels),
        )
        .unwrap();
    assert_eq!(texture.mip_levels(), 4);

    let readback = ctx.device.read_back_texture(&texture).unwrap();
    assert_eq!(readback, pixels);
    assert!(ctx.validation_errors().is_empty());
}

#[rstest]
#[case::render_target(TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::RenderTarget))]
#[case::uav_texture(TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::UavTexture))]
#[case::cube_map(TextureDescriptor::new_cube(8, TextureFormat::Rgba8Unorm))]
fn test_upload_into_target_usages(#[case] desc: TextureDescriptor) {
    let Some(ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let pixels = test_pattern(8, 8 * desc.array_layers);
    let texture = ctx.device.create_texture(&desc, Some(&pixels)).unwrap();

    let dummy = ctx.dummy().unwrap();
    assert_eq!(
        dummy.resource_state(texture.handle()),
        Some(ResourceState::ShaderResource)
    );
    assert_eq!(ctx.device.read_back_texture(&texture).unwrap(), pixels);
    assert_eq!(
        dummy.resource_state(texture.handle()),
        Some(ResourceState::ShaderResource)
    );
    assert!(ctx.validation_errors().is_empty(), "{:?}", ctx.validation_errors());
}

#[test]
fn test_mip_generation_starts_from_initial_state() {
    let Some(ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let texture = ctx
        .device
        .create_texture(
            &TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::TextureFromData)
                .with_full_mip_chain()
                .with_initial_state(ResourceState::ShaderResource),
            None,
        )
        .unwrap();
    assert_eq!(
        ctx.dummy().unwrap().resource_state(texture.handle()),
        Some(ResourceState::ShaderResource)
    );
    assert!(ctx.validation_errors().is_empty(), "{:?}", ctx.validation_errors());
}

#[test]
fn test_texture_data_size_checked() {
    let Some(ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let err = ctx
        .device
        .create_texture(
            &TextureDescriptor::new_2d(
                4,
                4,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TextureFromData,
            ),
            Some(&[0u8; 15]),
        )
        .unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidParameter(_)));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_structured_buffer_upload_readback(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let data: Vec<u8> = (0..=255u8).collect();
    let buffer = ctx
        .device
        .create_buffer(
            &BufferDescriptor::new(BufferUsage::StructuredBuffer, data.len() as u64, 16)
                .with_label("bytes"),
            Some(&data),
        )
        .unwrap();
    assert_eq!(buffer.element_count(), 16);
    assert!(buffer.srv_index().is_some());
    assert_eq!(ctx.device.read_back_buffer(&buffer).unwrap(), data);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_constant_buffer_is_cpu_writable(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let buffer = ctx
        .device
        .create_buffer(
            &BufferDescriptor::new(BufferUsage::ConstantBuffer, 64, 0),
            None,
        )
        .unwrap();
    assert!(buffer.cbv_index().is_some());
    buffer.update(16, &[7, 8, 9, 10]).unwrap();
    assert_eq!(buffer.read(16, 4).unwrap(), vec![7, 8, 9, 10]);
    assert!(buffer.update(buffer.size(), &[1]).is_err());
}

#[test]
fn test_dropped_resources_leave_memory_report() {
    let Some(ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let before = ctx.device.memory_report();
    let texture = ctx
        .device
        .create_texture(
            &TextureDescriptor::new_2d(32, 32, TextureFormat::Rgba16Float, TextureUsage::RenderTarget),
            None,
        )
        .unwrap();
    let during = ctx.device.memory_report();
    assert_eq!(during.live_allocations, before.live_allocations + 1);
    assert!(during.live_bytes >= before.live_bytes + texture.allocation_size());

    drop(texture);
    let after = ctx.device.memory_report();
    assert_eq!(after.live_allocations, before.live_allocations);
    assert_eq!(after.live_bytes, before.live_bytes);
    assert_eq!(after.total_allocations, during.total_allocations);
}

// ============================================================================
// Descriptor Heaps
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_rtv_heap_exhaustion(#[case] backend: Backend) {
    let heaps = HeapCapacities {
        rtv: 4,
        ..HeapCapacities::default()
    };
    let config = test_config(backend, 64, 64).with_heaps(heaps);
    let Some(ctx) = TestContext::with_config(backend, config) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    // Two slots hold the back buffer RTVs.
    assert_eq!(ctx.device.rtv_heap().current_descriptor_index(), 2);

    let target = || {
        ctx.device.create_texture(
            &TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::RenderTarget),
            None,
        )
    };
    let first = target().unwrap();
    let second = target().unwrap();
    assert_ne!(first.rtv(), second.rtv());

    let err = target().unwrap_err();
    assert!(
        matches!(
            err,
            GraphicsError::DescriptorHeapExhausted {
                heap: DescriptorHeapType::Rtv,
                capacity: 4
            }
        ),
        "{err}"
    );
}

#[test]
fn test_failed_allocation_keeps_cursor() {
    let Some(ctx) = TestContext::new(Backend::Dummy) else {
        return;
    };
    let heap = ctx.device.cbv_srv_uav_heap();
    let remaining = heap.capacity() - heap.current_descriptor_index();
    assert!(heap.allocate(remaining + 1).is_err());
    let cursor = heap.current_descriptor_index();
    let block = heap.allocate(remaining).unwrap();
    assert_eq!(block.index, cursor);
    assert_eq!(heap.current_descriptor_index(), heap.capacity());
    assert!(heap.current_descriptor_handle().is_err());
}

// ============================================================================
// Pooled Contexts
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_compute_and_copy_contexts_are_reused(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = &ctx.device;

    let compute_before = device.compute_context_pool_len();
    let a = device.get_compute_context().unwrap();
    let b = device.get_compute_context().unwrap();
    device.execute_and_flush_compute_context(a).unwrap();
    device.execute_and_flush_compute_context(b).unwrap();
    assert_eq!(device.compute_context_pool_len(), compute_before.max(2));

    for _ in 0..10 {
        let ctx = device.get_compute_context().unwrap();
        device.execute_and_flush_compute_context(ctx).unwrap();
    }
    assert_eq!(device.compute_context_pool_len(), compute_before.max(2));

    let copy_before = device.copy_context_pool_len();
    for _ in 0..10 {
        let ctx = device.get_copy_context().unwrap();
        device.execute_and_flush_copy_context(ctx).unwrap();
    }
    assert_eq!(device.copy_context_pool_len(), copy_before.max(1));
    assert!(ctx.validation_errors().is_empty());
}

// ============================================================================
// Device Creation
// ============================================================================

fn dummy_device(config: DeviceConfig, options: DummyOptions) -> Result<Device, GraphicsError> {
    common::init_logging();
    let backend = DummyBackend::with_options(options)?;
    Device::with_backend(
        config,
        Arc::new(backend),
        Arc::new(InMemoryShaders::placeholder()),
        None,
    )
}

fn adapter(name: &str, adapter_type: AdapterType, memory_mib: u64) -> AdapterInfo {
    AdapterInfo {
        name: name.to_string(),
        vendor_id: 0x10de,
        adapter_type,
        dedicated_video_memory: memory_mib * 1024 * 1024,
    }
}

#[test]
fn test_device_uses_largest_hardware_adapter() {
    let options = DummyOptions {
        adapters: vec![
            adapter("Software Rasterizer", AdapterType::Software, 65536),
            adapter("Laptop iGPU", AdapterType::Integrated, 512),
            adapter("Desktop GPU", AdapterType::Discrete, 8192),
        ],
        ..DummyOptions::default()
    };
    let device = dummy_device(test_config(Backend::Dummy, 64, 64), options).unwrap();
    assert_eq!(device.adapter().name, "Desktop GPU");
}

#[test]
fn test_software_only_is_no_suitable_adapter() {
    let options = DummyOptions {
        adapters: vec![adapter("Software Rasterizer", AdapterType::Software, 65536)],
        ..DummyOptions::default()
    };
    let err = dummy_device(test_config(Backend::Dummy, 64, 64), options).unwrap_err();
    assert!(matches!(err, GraphicsError::NoSuitableAdapter));
}

#[test]
fn test_missing_capabilities_fall_back() {
    let options = DummyOptions {
        tearing_supported: false,
        binding_tier: BindingTier::Tier1_0,
        ..DummyOptions::default()
    };
    let config = test_config(Backend::Dummy, 64, 64)
        .with_vsync(false)
        .with_tearing(true);
    let mut device = dummy_device(config, options).unwrap();
    assert_eq!(device.capabilities().binding_tier, BindingTier::Tier1_0);
    assert!(!device.capabilities().tearing_supported);

    device.begin_frame().unwrap();
    device.execute_graphics_context().unwrap();
    device.present().unwrap();
    device.end_frame().unwrap();
    let swapchain = device.swapchain().as_dummy().unwrap();
    assert_eq!(swapchain.last_present(), Some((0, false)));
}

#[test]
fn test_device_from_toml_config() {
    let config = DeviceConfig::from_toml_str(
        r#"
        backend = "dummy"
        frames_in_flight = 3
        vsync = false
        allow_tearing = true
        width = 320
        height = 200

        [heaps]
        rtv = 16
        "#,
    )
    .unwrap();
    assert_eq!(config.backend, BackendKind::Dummy);

    let Some(mut ctx) = TestContext::with_config(Backend::Dummy, config) else {
        return;
    };
    assert_eq!(ctx.device.frames_in_flight(), 3);
    assert_eq!(ctx.device.backbuffer_rtvs().len(), 3);
    assert_eq!(ctx.device.rtv_heap().capacity(), 16);
    assert_eq!(ctx.device.backbuffer_extent().width, 320);

    ctx.empty_frame();
    let swapchain = ctx.device.swapchain().as_dummy().unwrap();
    assert_eq!(swapchain.last_present(), Some((0, true)));
}

#[test]
fn test_invalid_config_rejected_before_backend_work() {
    let config = DeviceConfig::new()
        .with_backend(BackendKind::Dummy)
        .with_frames_in_flight(1);
    let err = Device::new(config, Arc::new(InMemoryShaders::placeholder()), None).unwrap_err();
    assert!(matches!(err, GraphicsError::Config(_)));
}
