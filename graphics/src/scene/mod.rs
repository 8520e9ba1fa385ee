//! Scene state consumed by the render passes.
//!
//! The scene owns models, lights, the camera and an optional environment
//! map, plus one set of constant buffers per frame slot:
//!
//! - scene constants (camera matrices, light-space matrix, light count)
//! - light records
//! - point light proxy instances
//! - per-model transform and material constants
//!
//! A frame uses the scene in three steps:
//!
//! 1. [`RenderScene::update`] advances the camera from input.
//! 2. [`RenderScene::prepare`] writes the constants of the current slot. The
//!    caller must have waited for that slot's previous frame, which
//!    [`Device::begin_frame`](crate::Device::begin_frame) guarantees.
//! 3. Passes bind their pipeline and call [`RenderScene::render_models`] or
//!    [`RenderScene::render_lights`], which only set root constants and
//!    record draws. The scene never records barriers or submits work.

mod camera;
mod input;
mod light;
mod mesh;
mod model;

pub use camera::Camera;
pub use input::{CameraKeys, InputState};
pub use light::{LightData, LightDescriptor, LightKind, MAX_LIGHTS};
pub use mesh::{GpuMesh, MeshData, Vertex};
pub use model::{Material, Model, ModelDescriptor, NO_TEXTURE, Transform};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::assets::{ImageData, create_texture_from_image};
use crate::context::GraphicsContext;
use crate::error::GraphicsError;
use crate::factory::{ResourceFactory, create_constant_buffers};
use crate::profiling::profile_function;
use crate::resources::{Buffer, Texture};

use light::{LightConstants, LightInstanceConstants};

/// Half-size of the area around the origin covered by the shadow map.
const SHADOW_EXTENT: f32 = 25.0;

/// Per-pass inputs forwarded to the scene's draw constants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassBindings {
    /// Sampler heap index.
    pub sampler: u32,
    /// Pass-defined words, e.g. the shadow map SRV or a "depth only" flag.
    pub pass_data: [u32; 4],
}

/// Root constants of every scene draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DrawConstants {
    pub scene_cbv: u32,
    /// Model constants for model draws, proxy instances for light draws.
    pub object_cbv: u32,
    pub vertex_srv: u32,
    pub sampler: u32,
    pub pass_data: [u32; 4],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct SceneConstants {
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    inverse_view_projection: Mat4,
    light_view_projection: Mat4,
    camera_position: [f32; 4],
    light_cbv: u32,
    light_count: u32,
    environment_srv: u32,
    time: f32,
}

/// What the render passes need from a scene.
pub trait RenderScene {
    /// Advance simulation state by `delta_time` seconds.
    fn update(&mut self, delta_time: f32, input: &InputState, aspect_ratio: f32);

    /// Write this frame's constants into the buffers of `frame_slot`.
    fn prepare(&mut self, frame_slot: usize) -> Result<(), GraphicsError>;

    /// CBV index of the prepared slot's scene constants.
    fn scene_constants_index(&self) -> Result<u32, GraphicsError>;

    /// SRV index of the environment map, if one is set.
    fn environment_srv(&self) -> Option<u32>;

    /// Draw every model with the currently bound pipeline.
    fn render_models(
        &self,
        ctx: &mut GraphicsContext,
        bindings: &PassBindings,
    ) -> Result<(), GraphicsError>;

    /// Draw one proxy per point light with the currently bound pipeline.
    fn render_lights(
        &self,
        ctx: &mut GraphicsContext,
        bindings: &PassBindings,
    ) -> Result<(), GraphicsError>;
}

/// Models, lights and camera of the rendered world.
#[derive(Debug)]
pub struct Scene {
    pub camera: Camera,
    models: Vec<Model>,
    lights: Vec<LightDescriptor>,
    environment: Option<Texture>,
    light_proxy: GpuMesh,
    scene_buffers: Vec<Buffer>,
    light_buffers: Vec<Buffer>,
    instance_buffers: Vec<Buffer>,
    aspect_ratio: f32,
    elapsed: f32,
    current_slot: usize,
}

impl Scene {
    pub fn new(factory: &dyn ResourceFactory) -> Result<Self, GraphicsError> {
        let extent = factory.backbuffer_extent();
        Ok(Self {
            camera: Camera::default(),
            models: Vec::new(),
            lights: Vec::new(),
            environment: None,
            light_proxy: GpuMesh::new(factory, &MeshData::cube(), "light proxy")?,
            scene_buffers: create_constant_buffers(
                factory,
                "scene constants",
                &SceneConstants::zeroed(),
            )?,
            light_buffers: create_constant_buffers(factory, "lights", &LightConstants::zeroed())?,
            instance_buffers: create_constant_buffers(
                factory,
                "light proxies",
                &LightInstanceConstants::zeroed(),
            )?,
            aspect_ratio: if extent.is_empty() { 1.0 } else { extent.aspect_ratio() },
            elapsed: 0.0,
            current_slot: 0,
        })
    }

    /// Upload a model and append it; returns its index.
    pub fn add_model(
        &mut self,
        factory: &dyn ResourceFactory,
        desc: &ModelDescriptor,
    ) -> Result<usize, GraphicsError> {
        let model = Model::new(factory, desc)?;
        // Other slots may still be in flight, so only this slot's buffer is
        // rewritten here; the rest are filled by later `prepare` calls.
        model.write_constants(self.current_slot)?;
        self.models.push(model);
        Ok(self.models.len() - 1)
    }

    /// Add a light; returns its index.
    pub fn add_light(&mut self, desc: LightDescriptor) -> Result<usize, GraphicsError> {
        if self.lights.len() >= MAX_LIGHTS {
            return Err(GraphicsError::InvalidParameter(format!(
                "scene already holds the maximum of {MAX_LIGHTS} lights"
            )));
        }
        self.lights.push(desc);
        Ok(self.lights.len() - 1)
    }

    /// Use an equirectangular HDR image as the sky.
    pub fn set_environment(
        &mut self,
        factory: &dyn ResourceFactory,
        image: &ImageData,
    ) -> Result<(), GraphicsError> {
        self.environment = Some(create_texture_from_image(factory, image, "environment")?);
        Ok(())
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [Model] {
        &mut self.models
    }

    pub fn model_by_name(&mut self, name: &str) -> Option<&mut Model> {
        self.models.iter_mut().find(|model| model.name() == name)
    }

    pub fn lights(&self) -> &[LightDescriptor] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [LightDescriptor] {
        &mut self.lights
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    fn point_lights(&self) -> impl Iterator<Item = &LightDescriptor> {
        self.lights.iter().filter(|light| light.kind == LightKind::Point)
    }

    /// Light-space matrix of the first directional light.
    pub fn light_view_projection(&self) -> Mat4 {
        self.lights
            .iter()
            .find(|light| light.kind == LightKind::Directional)
            .map_or(Mat4::IDENTITY, |light| {
                light.shadow_view_projection(Vec3::ZERO, SHADOW_EXTENT)
            })
    }

    fn slot_buffer<'a>(
        buffers: &'a [Buffer],
        slot: usize,
        what: &str,
    ) -> Result<&'a Buffer, GraphicsError> {
        buffers.get(slot).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("frame slot {slot} out of range for {what}"))
        })
    }

    fn cbv(buffer: &Buffer) -> Result<u32, GraphicsError> {
        buffer.cbv_index().ok_or_else(|| {
            GraphicsError::Internal(format!("constant buffer {:?} has no CBV", buffer.label()))
        })
    }

    fn scene_constants(&self, light_cbv: u32) -> SceneConstants {
        let view = self.camera.view_matrix();
        let projection = self.camera.projection_matrix(self.aspect_ratio);
        let view_projection = projection * view;
        SceneConstants {
            view,
            projection,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            light_view_projection: self.light_view_projection(),
            camera_position: self.camera.position.extend(1.0).to_array(),
            light_cbv,
            light_count: self.lights.len() as u32,
            environment_srv: self.environment_srv().unwrap_or(NO_TEXTURE),
            time: self.elapsed,
        }
    }

    fn draw_constants(
        &self,
        object_cbv: u32,
        vertex_srv: u32,
        bindings: &PassBindings,
    ) -> Result<DrawConstants, GraphicsError> {
        Ok(DrawConstants {
            scene_cbv: self.scene_constants_index()?,
            object_cbv,
            vertex_srv,
            sampler: bindings.sampler,
            pass_data: bindings.pass_data,
        })
    }
}

impl RenderScene for Scene {
    fn update(&mut self, delta_time: f32, input: &InputState, aspect_ratio: f32) {
        if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            self.aspect_ratio = aspect_ratio;
        }
        self.elapsed += delta_time;
        self.camera.update(delta_time, input);
    }

    fn prepare(&mut self, frame_slot: usize) -> Result<(), GraphicsError> {
        profile_function!();
        let light_buffer = Self::slot_buffer(&self.light_buffers, frame_slot, "lights")?;
        let scene_buffer = Self::slot_buffer(&self.scene_buffers, frame_slot, "scene constants")?;
        let instance_buffer =
            Self::slot_buffer(&self.instance_buffers, frame_slot, "light proxies")?;

        let mut lights = LightConstants::zeroed();
        for (record, light) in lights.lights.iter_mut().zip(&self.lights) {
            *record = light.gpu_data();
        }
        lights.count = self.lights.len() as u32;
        light_buffer.update(0, bytemuck::bytes_of(&lights))?;

        let mut instances = LightInstanceConstants::zeroed();
        for (i, light) in self.point_lights().enumerate() {
            instances.transforms[i] = light.proxy_transform();
            instances.colors[i] = light.color.extend(light.intensity).to_array();
        }
        instance_buffer.update(0, bytemuck::bytes_of(&instances))?;

        let constants = self.scene_constants(Self::cbv(light_buffer)?);
        scene_buffer.update(0, bytemuck::bytes_of(&constants))?;

        for model in &self.models {
            model.write_constants(frame_slot)?;
        }
        self.current_slot = frame_slot;
        log::trace!(
            "Prepared scene for slot {frame_slot}: {} models, {} lights",
            self.models.len(),
            self.lights.len()
        );
        Ok(())
    }

    fn scene_constants_index(&self) -> Result<u32, GraphicsError> {
        Self::cbv(Self::slot_buffer(
            &self.scene_buffers,
            self.current_slot,
            "scene constants",
        )?)
    }

    fn environment_srv(&self) -> Option<u32> {
        self.environment.as_ref().map(Texture::srv_index)
    }

    fn render_models(
        &self,
        ctx: &mut GraphicsContext,
        bindings: &PassBindings,
    ) -> Result<(), GraphicsError> {
        for model in &self.models {
            let constants = self.draw_constants(
                model.constant_buffer_index(self.current_slot)?,
                model.mesh().vertex_srv()?,
                bindings,
            )?;
            ctx.set_graphics_constants(&constants)?;
            model.mesh().draw(ctx, 1);
        }
        Ok(())
    }

    fn render_lights(
        &self,
        ctx: &mut GraphicsContext,
        bindings: &PassBindings,
    ) -> Result<(), GraphicsError> {
        let count = self.point_lights().count() as u32;
        if count == 0 {
            return Ok(());
        }
        let instances =
            Self::slot_buffer(&self.instance_buffers, self.current_slot, "light proxies")?;
        let constants =
            self.draw_constants(Self::cbv(instances)?, self.light_proxy.vertex_srv()?, bindings)?;
        ctx.set_graphics_constants(&constants)?;
        self.light_proxy.draw(ctx, count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{BackendKind, DeviceConfig};
    use crate::context::Context;
    use crate::device::Device;
    use crate::shader::InMemoryShaders;

    fn device() -> Device {
        let config = DeviceConfig::new()
            .with_backend(BackendKind::Dummy)
            .with_frames_in_flight(2)
            .with_size(64, 32);
        Device::new(config, Arc::new(InMemoryShaders::placeholder()), None).unwrap()
    }

    fn read_constants(buffer: &Buffer) -> SceneConstants {
        let bytes = buffer
            .read(0, std::mem::size_of::<SceneConstants>() as u64)
            .unwrap();
        bytemuck::pod_read_unaligned(&bytes)
    }

    #[test]
    fn test_light_limit() {
        let device = device();
        let mut scene = Scene::new(&device).unwrap();
        let light = LightDescriptor::point(Vec3::ZERO, Vec3::ONE, 1.0, 4.0);
        for i in 0..MAX_LIGHTS {
            assert_eq!(scene.add_light(light).unwrap(), i);
        }
        assert!(matches!(
            scene.add_light(light),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_prepare_writes_only_its_slot() {
        let device = device();
        let mut scene = Scene::new(&device).unwrap();
        scene.camera.position = Vec3::new(1.0, 2.0, 3.0);
        scene
            .add_light(LightDescriptor::directional(Vec3::NEG_Y, Vec3::ONE, 2.0))
            .unwrap();
        scene.prepare(1).unwrap();

        let written = read_constants(&scene.scene_buffers[1]);
        assert_eq!(written.camera_position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(written.light_count, 1);
        assert_eq!(written.environment_srv, NO_TEXTURE);
        assert_eq!(Some(written.light_cbv), scene.light_buffers[1].cbv_index());

        let untouched = read_constants(&scene.scene_buffers[0]);
        assert_eq!(untouched.light_count, 0);
        assert_eq!(
            scene.scene_constants_index().unwrap(),
            scene.scene_buffers[1].cbv_index().unwrap()
        );
    }

    #[test]
    fn test_prepare_rejects_unknown_slot() {
        let device = device();
        let mut scene = Scene::new(&device).unwrap();
        assert!(scene.prepare(2).is_err());
    }

    #[test]
    fn test_update_moves_camera_and_keeps_aspect() {
        let device = device();
        let mut scene = Scene::new(&device).unwrap();
        assert_eq!(scene.aspect_ratio(), 2.0);
        let mut input = InputState::new();
        input.set_key(CameraKeys::FORWARD, true);
        let start = scene.camera.position;
        scene.update(0.1, &input, 0.0);
        assert_ne!(scene.camera.position, start);
        assert_eq!(scene.aspect_ratio(), 2.0);
    }

    #[test]
    fn test_render_records_draws_only() {
        let mut device = device();
        let mut scene = Scene::new(&device).unwrap();
        scene
            .add_model(&device, &ModelDescriptor::new("cube", MeshData::cube()))
            .unwrap();
        scene
            .add_model(&device, &ModelDescriptor::new("ball", MeshData::sphere(8, 4)))
            .unwrap();
        scene
            .add_light(LightDescriptor::point(Vec3::Y, Vec3::ONE, 1.0, 3.0))
            .unwrap();
        assert!(scene.model_by_name("ball").is_some());

        device.begin_frame().unwrap();
        scene.prepare(device.current_frame_index()).unwrap();
        let desc = device
            .graphics_pipeline_descriptor("gbuffer_vs", "gbuffer_ps")
            .unwrap();
        let pipeline = device.create_graphics_pipeline(&desc).unwrap();

        let mut ctx = device.graphics_context();
        ctx.set_pipeline_state(&pipeline);
        let bindings = PassBindings::default();
        scene.render_models(&mut ctx, &bindings).unwrap();
        scene.render_lights(&mut ctx, &bindings).unwrap();

        assert_eq!(ctx.pending_barriers(), 0);
        let list = ctx.command_list().as_dummy().unwrap();
        assert_eq!(list.draw_count(), 3);
    }

    #[test]
    fn test_model_albedo_gets_texture() {
        let device = device();
        let mut scene = Scene::new(&device).unwrap();
        let desc = ModelDescriptor::new("textured", MeshData::cube())
            .with_albedo(ImageData::placeholder(crate::assets::ImageKind::Color));
        let index = scene.add_model(&device, &desc).unwrap();
        let model = &scene.models()[index];
        let albedo = model.albedo().unwrap();
        assert_eq!(albedo.mip_levels(), 3);
        assert_eq!(model.constants().albedo_srv, albedo.srv_index());
    }
}
