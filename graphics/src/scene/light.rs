//! Light sources and their GPU layout.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Lights beyond this count are rejected by [`Scene::add_light`](super::Scene::add_light).
pub const MAX_LIGHTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Infinitely distant, casts the shadow map.
    Directional,
    /// Omni light with a finite radius, drawn as a proxy cube.
    Point,
}

/// A light as added to the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDescriptor {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// World position; ignored for directional lights.
    pub position: Vec3,
    /// Direction the light travels; ignored for point lights.
    pub direction: Vec3,
    pub radius: f32,
}

impl LightDescriptor {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            position: Vec3::ZERO,
            direction: direction.normalize_or_zero(),
            radius: 0.0,
        }
    }

    pub fn point(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
            position,
            direction: Vec3::NEG_Y,
            radius,
        }
    }

    pub(crate) fn gpu_data(&self) -> LightData {
        let (vector, w) = match self.kind {
            LightKind::Directional => (self.direction, 0.0),
            LightKind::Point => (self.position, 1.0),
        };
        LightData {
            position_or_direction: vector.extend(w).to_array(),
            color_intensity: self.color.extend(self.intensity).to_array(),
            radius: self.radius,
            _pad: [0.0; 3],
        }
    }

    /// World transform of the proxy cube drawn for a point light.
    pub(crate) fn proxy_transform(&self) -> Mat4 {
        let size = (self.radius * 0.05).clamp(0.05, 0.5);
        Mat4::from_scale_rotation_translation(Vec3::splat(size), glam::Quat::IDENTITY, self.position)
    }

    /// Orthographic light-space matrix covering `extent` units around `focus`.
    pub(crate) fn shadow_view_projection(&self, focus: Vec3, extent: f32) -> Mat4 {
        let direction = self.direction.normalize_or_zero();
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_to_lh(focus - direction * extent * 2.0, direction, up);
        let projection =
            Mat4::orthographic_lh(-extent, extent, -extent, extent, 0.1, extent * 4.0);
        projection * view
    }
}

/// Shader-side light record. `w` of the first vector is 0 for directional
/// lights and 1 for point lights.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct LightData {
    pub position_or_direction: [f32; 4],
    pub color_intensity: [f32; 4],
    pub radius: f32,
    pub _pad: [f32; 3],
}

/// Constant buffer with every light in the scene.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct LightConstants {
    pub lights: [LightData; MAX_LIGHTS],
    pub count: u32,
    pub _pad: [u32; 3],
}

/// Constant buffer with one proxy transform and color per point light.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct LightInstanceConstants {
    pub transforms: [Mat4; MAX_LIGHTS],
    pub colors: [[f32; 4]; MAX_LIGHTS],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_data_encodes_kind() {
        let sun = LightDescriptor::directional(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE, 3.0);
        let data = sun.gpu_data();
        assert_eq!(data.position_or_direction, [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(data.color_intensity[3], 3.0);

        let lamp = LightDescriptor::point(Vec3::new(1.0, 2.0, 3.0), Vec3::X, 1.0, 5.0);
        assert_eq!(lamp.gpu_data().position_or_direction, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(lamp.gpu_data().radius, 5.0);
    }

    #[test]
    fn test_shadow_projection_contains_focus() {
        let sun = LightDescriptor::directional(Vec3::new(-1.0, -1.0, 0.5), Vec3::ONE, 1.0);
        let clip = sun.shadow_view_projection(Vec3::ZERO, 20.0) * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.x.abs() <= 1.0 && clip.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&clip.z));
    }

    #[test]
    fn test_straight_down_light_has_valid_basis() {
        let sun = LightDescriptor::directional(Vec3::NEG_Y, Vec3::ONE, 1.0);
        assert!(sun.shadow_view_projection(Vec3::ZERO, 10.0).is_finite());
    }

    #[test]
    fn test_constant_layouts() {
        assert_eq!(std::mem::size_of::<LightData>(), 48);
        assert_eq!(std::mem::size_of::<LightConstants>(), 48 * MAX_LIGHTS + 16);
        assert_eq!(std::mem::size_of::<LightInstanceConstants>(), 80 * MAX_LIGHTS);
    }
}
