//! Shared setup for the integration tests.
//!
//! Every test runs against each backend enabled at compile time. The Vulkan
//! cases need compiled SPIR-V: point `SOLSTICE_SHADER_DIR` at a directory of
//! `<name>.spv` files. Without it, or without a Vulkan device, those cases
//! are skipped.

use std::sync::Arc;

use solstice_graphics::{
    BackendKind, Device, DeviceConfig, DummyBackend, InMemoryShaders, ShaderDirectory,
    ShaderSource,
};

/// Environment variable naming the compiled shader directory.
pub const SHADER_DIR_VAR: &str = "SOLSTICE_SHADER_DIR";

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Backends the tests are parameterized over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Recording backend with state validation.
    Dummy,
    /// Vulkan via ash.
    Vulkan,
}

impl Backend {
    /// Whether this backend was compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => true,
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => false,
        }
    }

    fn kind(self) -> BackendKind {
        match self {
            Backend::Dummy => BackendKind::Dummy,
            Backend::Vulkan => BackendKind::Vulkan,
        }
    }

    fn shaders(self) -> Option<Arc<dyn ShaderSource>> {
        match self {
            Backend::Dummy => Some(Arc::new(InMemoryShaders::placeholder())),
            Backend::Vulkan => {
                let dir = std::env::var_os(SHADER_DIR_VAR)?;
                Some(Arc::new(ShaderDirectory::new(dir)))
            }
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Base configuration for a headless test device.
pub fn test_config(backend: Backend, width: u32, height: u32) -> DeviceConfig {
    DeviceConfig::new()
        .with_backend(backend.kind())
        .with_frames_in_flight(2)
        .with_validation(true)
        .with_size(width, height)
}

/// A headless device on one backend.
pub struct TestContext {
    pub backend: Backend,
    pub device: Device,
}

impl TestContext {
    /// A 64x64 device with two frames in flight, or `None` when the backend
    /// cannot be used here.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_config(backend, test_config(backend, 64, 64))
    }

    pub fn with_config(backend: Backend, config: DeviceConfig) -> Option<Self> {
        init_logging();
        if !backend.is_available() {
            return None;
        }
        let shaders = backend.shaders()?;
        match Device::new(config, shaders, None) {
            Ok(device) => Some(Self { backend, device }),
            Err(e) => {
                eprintln!("Failed to create {backend:?} device: {e}");
                None
            }
        }
    }

    /// The dummy backend, for validation and state checks.
    pub fn dummy(&self) -> Option<&DummyBackend> {
        self.device.dummy_backend()
    }

    /// Validation messages recorded so far; always empty off the dummy
    /// backend.
    pub fn validation_errors(&self) -> Vec<String> {
        self.dummy()
            .map(DummyBackend::validation_errors)
            .unwrap_or_default()
    }

    /// Run one empty frame: begin, submit, present, end.
    pub fn empty_frame(&mut self) {
        self.device.begin_frame().expect("begin frame");
        self.device
            .execute_graphics_context()
            .expect("submit graphics context");
        self.device.present().expect("present");
        self.device.end_frame().expect("end frame");
    }
}

/// `width * height` RGBA8 texels in a recognizable pattern.
pub fn test_pattern(width: u32, height: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| {
            let x = (i % width) as u8;
            let y = (i / width) as u8;
            [x.wrapping_mul(16), y.wrapping_mul(16), x ^ y, 255]
        })
        .collect()
}
