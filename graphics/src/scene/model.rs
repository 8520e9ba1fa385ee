//! Renderable models: geometry, material and per-slot transforms.

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};

use crate::assets::{ImageData, create_texture_from_image};
use crate::error::GraphicsError;
use crate::factory::{ResourceFactory, create_constant_buffers};
use crate::resources::{Buffer, Texture};

use super::mesh::{GpuMesh, MeshData};

/// Descriptor index shaders treat as "no texture bound".
pub const NO_TEXTURE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    /// Euler angles in radians, applied in XYZ order.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }
}

/// Surface parameters, editable at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: 0.0,
        }
    }
}

/// Everything needed to add a model to the scene.
#[derive(Debug, Clone, Default)]
pub struct ModelDescriptor {
    pub name: String,
    pub mesh: MeshData,
    pub transform: Transform,
    pub material: Material,
    /// Decoded albedo image; uploaded and mip-mapped on creation.
    pub albedo: Option<ImageData>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, mesh: MeshData) -> Self {
        Self {
            name: name.into(),
            mesh,
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_albedo(mut self, image: ImageData) -> Self {
        self.albedo = Some(image);
        self
    }
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ModelConstants {
    pub model: Mat4,
    pub normal: Mat4,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: f32,
    pub albedo_srv: u32,
}

#[derive(Debug)]
pub struct Model {
    name: String,
    pub transform: Transform,
    pub material: Material,
    mesh: GpuMesh,
    albedo: Option<Texture>,
    constant_buffers: Vec<Buffer>,
}

impl Model {
    pub fn new(factory: &dyn ResourceFactory, desc: &ModelDescriptor) -> Result<Self, GraphicsError> {
        let mesh = GpuMesh::new(factory, &desc.mesh, &desc.name)?;
        let albedo = desc
            .albedo
            .as_ref()
            .map(|image| create_texture_from_image(factory, image, &format!("{} albedo", desc.name)))
            .transpose()?;

        let mut model = Self {
            name: desc.name.clone(),
            transform: desc.transform,
            material: desc.material,
            mesh,
            albedo,
            constant_buffers: Vec::new(),
        };
        model.constant_buffers = create_constant_buffers(factory, &desc.name, &model.constants())?;
        log::debug!("Created model {:?} ({} indices)", model.name, model.mesh.index_count());
        Ok(model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &GpuMesh {
        &self.mesh
    }

    pub fn albedo(&self) -> Option<&Texture> {
        self.albedo.as_ref()
    }

    pub(crate) fn constants(&self) -> ModelConstants {
        let model = self.transform.matrix();
        ModelConstants {
            model,
            normal: model.inverse().transpose(),
            base_color: self.material.base_color.to_array(),
            metallic: self.material.metallic,
            roughness: self.material.roughness,
            emissive: self.material.emissive,
            albedo_srv: self.albedo.as_ref().map_or(NO_TEXTURE, Texture::srv_index),
        }
    }

    /// Write the current transform and material into the slot's buffer.
    pub(crate) fn write_constants(&self, slot: usize) -> Result<(), GraphicsError> {
        self.constant_buffer(slot)?
            .update(0, bytemuck::bytes_of(&self.constants()))
    }

    pub(crate) fn constant_buffer_index(&self, slot: usize) -> Result<u32, GraphicsError> {
        let buffer = self.constant_buffer(slot)?;
        buffer.cbv_index().ok_or_else(|| {
            GraphicsError::Internal(format!("model {:?} constants have no CBV", self.name))
        })
    }

    fn constant_buffer(&self, slot: usize) -> Result<&Buffer, GraphicsError> {
        self.constant_buffers.get(slot).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "frame slot {slot} out of range for model {:?}",
                self.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_matrix() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            scale: Vec3::splat(2.0),
        };
        let point = transform.matrix().transform_point3(Vec3::X);
        assert!((point - Vec3::new(1.0, 2.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_constants_fit_one_cbv() {
        assert_eq!(std::mem::size_of::<ModelConstants>(), 160);
    }
}
