use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use solstice_graphics::backend::GpuResourceHandle;
use solstice_graphics::backend::dummy::ResourceId;
use solstice_graphics::context::BarrierBatch;
use solstice_graphics::scene::{MeshData, ModelDescriptor};
use solstice_graphics::{
    BackendKind, BufferDescriptor, BufferUsage, Device, DeviceConfig, FrameRenderer,
    InMemoryShaders, ResourceState, Scene,
};

fn dummy_device() -> Device {
    let config = DeviceConfig::new()
        .with_backend(BackendKind::Dummy)
        .with_frames_in_flight(2)
        .with_validation(false)
        .with_size(256, 256);
    Device::new(config, Arc::new(InMemoryShaders::placeholder()), None).unwrap()
}

// ---------------------------------------------------------------------------
// Barrier batching
// ---------------------------------------------------------------------------

fn bench_barrier_batch_distinct(c: &mut Criterion) {
    c.bench_function("barrier_batch_32_distinct", |b| {
        b.iter(|| {
            let mut batch = BarrierBatch::new();
            for id in 0..32 {
                batch.add(
                    GpuResourceHandle::Dummy(ResourceId(id)),
                    ResourceState::ShaderResource,
                    ResourceState::RenderTarget,
                );
            }
            black_box(batch.take());
        });
    });
}

fn bench_barrier_batch_chained(c: &mut Criterion) {
    c.bench_function("barrier_batch_8_chained_x4", |b| {
        b.iter(|| {
            let mut batch = BarrierBatch::new();
            for id in 0..8 {
                let handle = GpuResourceHandle::Dummy(ResourceId(id));
                batch.add(handle, ResourceState::ShaderResource, ResourceState::RenderTarget);
                batch.add(handle, ResourceState::RenderTarget, ResourceState::CopySource);
                batch.add(handle, ResourceState::CopySource, ResourceState::UnorderedAccess);
                batch.add(handle, ResourceState::UnorderedAccess, ResourceState::ShaderResource);
            }
            black_box(batch.len());
        });
    });
}

// ---------------------------------------------------------------------------
// Descriptors and resources
// ---------------------------------------------------------------------------

fn bench_descriptor_allocate(c: &mut Criterion) {
    let device = dummy_device();
    let heap = device.cbv_srv_uav_heap();
    let start = heap.current_descriptor_index();
    c.bench_function("descriptor_heap_walk_64", |b| {
        b.iter(|| {
            let mut handle = heap.descriptor_handle_at(start).unwrap();
            for _ in 0..64 {
                heap.offset_descriptor(&mut handle, 1).unwrap();
            }
            black_box(handle);
        });
    });
}

fn bench_dummy_create_upload_buffer(c: &mut Criterion) {
    let device = dummy_device();
    c.bench_function("dummy_create_upload_buffer", |b| {
        b.iter(|| {
            // Upload buffers take no descriptor slots.
            let buffer = device
                .create_buffer(&BufferDescriptor::new(BufferUsage::UploadBuffer, 4096, 0), None)
                .unwrap();
            black_box(buffer.size());
        });
    });
}

fn bench_dummy_buffer_readback(c: &mut Criterion) {
    let device = dummy_device();
    let data = vec![7u8; 64 * 1024];
    let buffer = device
        .create_buffer(
            &BufferDescriptor::new(BufferUsage::StructuredBuffer, data.len() as u64, 16),
            Some(&data),
        )
        .unwrap();
    let mut group = c.benchmark_group("dummy_copy_queue");
    group.sample_size(20);
    group.bench_function("read_back_64k", |b| {
        b.iter(|| black_box(device.read_back_buffer(&buffer).unwrap()))
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Frame loop
// ---------------------------------------------------------------------------

fn bench_empty_frame(c: &mut Criterion) {
    let mut device = dummy_device();
    c.bench_function("dummy_empty_frame", |b| {
        b.iter(|| {
            device.begin_frame().unwrap();
            device.execute_graphics_context().unwrap();
            device.present().unwrap();
            device.end_frame().unwrap();
        });
    });
}

fn bench_deferred_frame(c: &mut Criterion) {
    let mut device = dummy_device();
    let mut renderer = FrameRenderer::new(&device).unwrap();
    let mut scene = Scene::new(&device).unwrap();
    for i in 0..16 {
        scene
            .add_model(&device, &ModelDescriptor::new(format!("cube {i}"), MeshData::cube()))
            .unwrap();
    }
    c.bench_function("dummy_deferred_frame_16_models", |b| {
        b.iter(|| {
            renderer
                .render_frame(&mut device, &mut scene, None, 1.0 / 60.0)
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_barrier_batch_distinct,
    bench_barrier_batch_chained,
    bench_descriptor_allocate,
    bench_dummy_create_upload_buffer,
    bench_dummy_buffer_readback,
    bench_empty_frame,
    bench_deferred_frame,
);
criterion_main!(benches);
