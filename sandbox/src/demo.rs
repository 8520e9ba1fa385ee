//! The demo scene: a ground slab, a few lit shapes and a sun.

use std::path::Path;

use glam::{Vec3, Vec4};
use solstice_graphics::assets::{ImageData, ImageKind, load_image};
use solstice_graphics::scene::{
    Camera, LightDescriptor, Material, MeshData, ModelDescriptor, Transform,
};
use solstice_graphics::{GraphicsError, ResourceFactory, Scene};

/// Name of the model the overlay spins.
pub const TURNTABLE_MODEL: &str = "centerpiece";

pub fn build_scene(
    factory: &dyn ResourceFactory,
    environment: Option<&Path>,
) -> Result<Scene, GraphicsError> {
    let mut scene = Scene::new(factory)?;
    scene.camera = Camera::new(Vec3::new(0.0, 2.5, -6.0));
    scene.camera.look_at(Vec3::new(0.0, 0.5, 0.0));

    scene.add_model(
        factory,
        &ModelDescriptor::new("ground", MeshData::cube())
            .with_transform(
                Transform::from_translation(Vec3::new(0.0, -0.05, 0.0))
                    .with_scale(Vec3::new(12.0, 0.1, 12.0)),
            )
            .with_material(Material {
                base_color: Vec4::new(0.6, 0.6, 0.6, 1.0),
                roughness: 0.9,
                ..Material::default()
            })
            .with_albedo(ImageData::placeholder(ImageKind::Color)),
    )?;
    scene.add_model(
        factory,
        &ModelDescriptor::new(TURNTABLE_MODEL, MeshData::cube())
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.5, 0.0))),
    )?;
    for (i, x) in [-2.0f32, 2.0].into_iter().enumerate() {
        scene.add_model(
            factory,
            &ModelDescriptor::new(format!("sphere {i}"), MeshData::sphere(32, 16))
                .with_transform(Transform::from_translation(Vec3::new(x, 0.5, 0.0)))
                .with_material(Material {
                    base_color: Vec4::new(0.9, 0.3 + 0.4 * i as f32, 0.2, 1.0),
                    metallic: i as f32,
                    roughness: 0.3,
                    ..Material::default()
                }),
        )?;
    }

    scene.add_light(LightDescriptor::directional(
        Vec3::new(-0.4, -1.0, 0.3),
        Vec3::new(1.0, 0.95, 0.85),
        3.0,
    ))?;
    scene.add_light(LightDescriptor::point(
        Vec3::new(0.0, 2.0, -1.5),
        Vec3::new(0.4, 0.6, 1.0),
        8.0,
        5.0,
    ))?;

    if let Some(path) = environment {
        match load_image(path, ImageKind::Hdr) {
            Ok(image) => scene.set_environment(factory, &image)?,
            Err(e) if e.is_recoverable() => {
                log::warn!("Skipping environment {}: {e}", path.display());
            }
            Err(e) => return Err(e),
        }
    }

    log::info!(
        "Demo scene: {} models, {} lights",
        scene.models().len(),
        scene.lights().len()
    );
    Ok(scene)
}
