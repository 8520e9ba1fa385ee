//! Image decoding for textures.
//!
//! The engine only needs "a decoded image becomes a GPU texture". This
//! module turns PNG and Radiance HDR files into tightly packed RGBA pixels
//! and hands them to [`ResourceFactory::create_texture`]. A missing or
//! undecodable file is a recoverable [`GraphicsError::AssetLoad`]; callers
//! may substitute [`ImageData::placeholder`].

use std::path::Path;

use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::Texture;
use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

/// How the pixels of an image are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageKind {
    /// sRGB-encoded color (albedo, emissive).
    #[default]
    Color,
    /// Linear data (normals, metal/roughness).
    Linear,
    /// High dynamic range radiance, stored as 32-bit floats.
    Hdr,
}

impl ImageKind {
    pub fn format(self) -> TextureFormat {
        match self {
            Self::Color => TextureFormat::Rgba8UnormSrgb,
            Self::Linear => TextureFormat::Rgba8Unorm,
            Self::Hdr => TextureFormat::Rgba32Float,
        }
    }

    pub fn usage(self) -> TextureUsage {
        match self {
            Self::Color | Self::Linear => TextureUsage::TextureFromData,
            Self::Hdr => TextureUsage::HdrTextureFromData,
        }
    }
}

/// Decoded, tightly packed RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// A 4x4 two-tone checkerboard.
    pub fn placeholder(kind: ImageKind) -> Self {
        const SIZE: u32 = 4;
        let texel = |dark: bool| -> Vec<u8> {
            let value = if dark { 0.1f32 } else { 0.9 };
            match kind {
                ImageKind::Hdr => bytemuck::cast_slice::<f32, u8>(&[value, value, value, 1.0]).to_vec(),
                ImageKind::Color | ImageKind::Linear => {
                    let byte = (value * 255.0) as u8;
                    vec![byte, byte, byte, 255]
                }
            }
        };
        let pixels = (0..SIZE * SIZE)
            .flat_map(|i| texel((i % SIZE + i / SIZE) % 2 == 0))
            .collect();
        Self {
            width: SIZE,
            height: SIZE,
            kind,
            pixels,
        }
    }

    /// Texture descriptor with a full mip chain.
    pub fn texture_descriptor(&self) -> TextureDescriptor {
        TextureDescriptor::new_2d(self.width, self.height, self.kind.format(), self.kind.usage())
            .with_full_mip_chain()
    }
}

/// Decode an image file.
pub fn load_image(path: &Path, kind: ImageKind) -> Result<ImageData, GraphicsError> {
    let asset_error = |reason: String| GraphicsError::AssetLoad {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| asset_error(e.to_string()))?;
    let image = decode_image(&bytes, kind).map_err(|e| match e {
        GraphicsError::AssetLoad { reason, .. } => asset_error(reason),
        other => other,
    })?;
    log::debug!(
        "Loaded {} ({}x{}, {:?})",
        path.display(),
        image.width,
        image.height,
        kind
    );
    Ok(image)
}

/// Decode an in-memory PNG or HDR image.
pub fn decode_image(bytes: &[u8], kind: ImageKind) -> Result<ImageData, GraphicsError> {
    let image = image::load_from_memory(bytes).map_err(|e| GraphicsError::AssetLoad {
        path: "<memory>".into(),
        reason: e.to_string(),
    })?;
    let (width, height) = (image.width(), image.height());
    let pixels = match kind {
        ImageKind::Hdr => bytemuck::cast_slice::<f32, u8>(image.to_rgba32f().as_raw()).to_vec(),
        ImageKind::Color | ImageKind::Linear => image.to_rgba8().into_raw(),
    };
    Ok(ImageData {
        width,
        height,
        kind,
        pixels,
    })
}

/// Create a texture from decoded pixels.
pub fn create_texture_from_image(
    factory: &dyn ResourceFactory,
    image: &ImageData,
    label: &str,
) -> Result<Texture, GraphicsError> {
    factory.create_texture(
        &image.texture_descriptor().with_label(label),
        Some(&image.pixels),
    )
}

/// Load an image file into a texture, falling back to a placeholder when the
/// file cannot be read or decoded.
pub fn load_texture_or_placeholder(
    factory: &dyn ResourceFactory,
    path: &Path,
    kind: ImageKind,
) -> Result<Texture, GraphicsError> {
    let label = path.display().to_string();
    let image = match load_image(path, kind) {
        Ok(image) => image,
        Err(e) if e.is_recoverable() => {
            log::warn!("{e}; using placeholder texture");
            ImageData::placeholder(kind)
        }
        Err(e) => return Err(e),
    };
    create_texture_from_image(factory, &image, &label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_sizes() {
        let color = ImageData::placeholder(ImageKind::Color);
        assert_eq!(color.pixels.len(), 4 * 4 * 4);
        assert_eq!(color.texture_descriptor().mip0_size(), color.pixels.len() as u64);

        let hdr = ImageData::placeholder(ImageKind::Hdr);
        assert_eq!(hdr.pixels.len(), 4 * 4 * 16);
        assert_eq!(hdr.texture_descriptor().mip_levels, 3);
    }

    #[test]
    fn test_missing_file_is_recoverable() {
        let err = load_image(Path::new("/nonexistent/albedo.png"), ImageKind::Color).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("albedo.png"));
    }

    #[test]
    fn test_decode_png() {
        let mut png = Vec::new();
        let image = image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        image
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&png, ImageKind::Linear).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 3));
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_garbage_is_asset_error() {
        let err = decode_image(b"not an image", ImageKind::Color).unwrap_err();
        assert!(matches!(err, GraphicsError::AssetLoad { .. }));
    }
}
