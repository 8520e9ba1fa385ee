//! Device configuration.
//!
//! A [`DeviceConfig`] is usually loaded from a TOML file:
//!
//! ```toml
//! backend = "dummy"
//! frames_in_flight = 2
//! vsync = false
//! allow_tearing = true
//!
//! [heaps]
//! cbv_srv_uav = 4096
//! rtv = 32
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::GraphicsError;

/// Smallest supported number of frames in flight.
pub const MIN_FRAMES_IN_FLIGHT: usize = 2;
/// Largest supported number of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// GPU backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Best available: Vulkan when compiled in, dummy otherwise.
    #[default]
    Auto,
    /// Simulated GPU with a validation layer. Always available.
    Dummy,
    /// Native Vulkan via ash. Requires the `vulkan-backend` feature.
    Vulkan,
}

/// Fixed capacities of the four descriptor heaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeapCapacities {
    pub cbv_srv_uav: u32,
    pub rtv: u32,
    pub dsv: u32,
    pub sampler: u32,
}

impl Default for HeapCapacities {
    fn default() -> Self {
        Self {
            cbv_srv_uav: 10_000,
            rtv: 50,
            dsv: 50,
            sampler: 1024,
        }
    }
}

/// Configuration used to create a [`Device`](crate::Device).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: BackendKind,
    /// Number of frame slots (back buffers, graphics contexts, fence values).
    pub frames_in_flight: usize,
    /// Present with a sync interval of one.
    pub vsync: bool,
    /// Present with the tearing flag when v-sync is off and the display
    /// supports it.
    pub allow_tearing: bool,
    /// Enable backend validation (Vulkan validation layers, dummy state
    /// tracking).
    pub validation: bool,
    pub heaps: HeapCapacities,
    /// Initial back buffer size.
    pub width: u32,
    pub height: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            frames_in_flight: 3,
            vsync: true,
            allow_tearing: false,
            validation: cfg!(debug_assertions),
            heaps: HeapCapacities::default(),
            width: 1280,
            height: 720,
        }
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, GraphicsError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| GraphicsError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, GraphicsError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphicsError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            GraphicsError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        log::debug!("Loaded device config from {}", path.display());
        Ok(config)
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_tearing(mut self, allow_tearing: bool) -> Self {
        self.allow_tearing = allow_tearing;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_heaps(mut self, heaps: HeapCapacities) -> Self {
        self.heaps = heaps;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Check the configuration for values the device cannot work with.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if !(MIN_FRAMES_IN_FLIGHT..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(GraphicsError::Config(format!(
                "frames_in_flight must be in {MIN_FRAMES_IN_FLIGHT}..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        let heaps = &self.heaps;
        if heaps.cbv_srv_uav == 0 || heaps.rtv == 0 || heaps.dsv == 0 || heaps.sampler == 0 {
            return Err(GraphicsError::Config(
                "descriptor heap capacities must be non-zero".to_string(),
            ));
        }
        // Back buffer RTVs live in the first frames_in_flight RTV slots.
        if (heaps.rtv as usize) < self.frames_in_flight {
            return Err(GraphicsError::Config(format!(
                "rtv heap capacity {} cannot hold {} back buffers",
                heaps.rtv, self.frames_in_flight
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(GraphicsError::Config(format!(
                "initial size {}x{} is empty",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = DeviceConfig::from_toml_str("").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.heaps.cbv_srv_uav, 10_000);
    }

    #[test]
    fn test_parse_overrides() {
        let config = DeviceConfig::from_toml_str(
            r#"
            backend = "dummy"
            frames_in_flight = 2
            vsync = false
            allow_tearing = true

            [heaps]
            rtv = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Dummy);
        assert_eq!(config.frames_in_flight, 2);
        assert!(!config.vsync);
        assert!(config.allow_tearing);
        assert_eq!(config.heaps.rtv, 8);
        assert_eq!(config.heaps.dsv, 50);
    }

    #[test]
    fn test_rejects_frames_out_of_range() {
        let err = DeviceConfig::from_toml_str("frames_in_flight = 7").unwrap_err();
        assert!(matches!(err, GraphicsError::Config(_)));
        assert!(DeviceConfig::new().with_frames_in_flight(1).validate().is_err());
    }

    #[test]
    fn test_rtv_heap_must_fit_back_buffers() {
        let config = DeviceConfig::new().with_heaps(HeapCapacities {
            rtv: 2,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let err = DeviceConfig::from_toml_str("backend = \"metal\"").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DeviceConfig::load(Path::new("/nonexistent/solstice.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
