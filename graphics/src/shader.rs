//! Shader binary sources.
//!
//! Shaders are compiled offline; the engine only loads the resulting
//! binaries by name. [`ShaderDirectory`] reads `<dir>/<name>.spv`,
//! [`InMemoryShaders`] serves registered bytes and is what tests and the
//! dummy backend use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::GraphicsError;
use crate::types::ShaderBinary;

/// Resolves shader names to compiled binaries.
pub trait ShaderSource: Send + Sync {
    fn load(&self, name: &str) -> Result<ShaderBinary, GraphicsError>;
}

/// Loads `<root>/<name>.spv` from disk.
#[derive(Debug, Clone)]
pub struct ShaderDirectory {
    root: PathBuf,
}

impl ShaderDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.spv"))
    }
}

impl ShaderSource for ShaderDirectory {
    fn load(&self, name: &str) -> Result<ShaderBinary, GraphicsError> {
        let path = self.path_of(name);
        let bytes = std::fs::read(&path).map_err(|e| GraphicsError::AssetLoad {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        log::debug!("Loaded shader {name} ({} bytes)", bytes.len());
        Ok(ShaderBinary::new(name, bytes))
    }
}

/// Shader binaries registered in memory.
#[derive(Debug, Default)]
pub struct InMemoryShaders {
    shaders: RwLock<HashMap<String, ShaderBinary>>,
    placeholder: bool,
}

impl InMemoryShaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that answers every name with a small placeholder binary.
    ///
    /// Only meaningful for backends that never hand shaders to a driver.
    pub fn placeholder() -> Self {
        Self {
            shaders: RwLock::new(HashMap::new()),
            placeholder: true,
        }
    }

    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let name = name.into();
        let binary = ShaderBinary::new(name.as_str(), bytes.into());
        self.shaders.write().insert(name, binary);
    }

    pub fn with(self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl ShaderSource for InMemoryShaders {
    fn load(&self, name: &str) -> Result<ShaderBinary, GraphicsError> {
        if let Some(binary) = self.shaders.read().get(name) {
            return Ok(binary.clone());
        }
        if self.placeholder {
            // A SPIR-V magic number, so the binary is never empty.
            return Ok(ShaderBinary::new(name, 0x0723_0203u32.to_le_bytes().to_vec()));
        }
        Err(GraphicsError::AssetLoad {
            path: PathBuf::from(format!("{name}.spv")),
            reason: "shader not registered".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_lookup() {
        let shaders = InMemoryShaders::new().with("gbuffer_vs", vec![1u8, 2, 3, 4]);
        assert_eq!(shaders.load("gbuffer_vs").unwrap().bytes(), &[1, 2, 3, 4]);
        let err = shaders.load("missing_ps").unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("missing_ps.spv"));
    }

    #[test]
    fn test_placeholder_answers_everything() {
        let shaders = InMemoryShaders::placeholder();
        let binary = shaders.load("bloom_downsample_cs").unwrap();
        assert_eq!(binary.name(), "bloom_downsample_cs");
        assert!(!binary.bytes().is_empty());
    }

    #[test]
    fn test_directory_missing_file() {
        let shaders = ShaderDirectory::new("/nonexistent/shaders");
        let err = shaders.load("composite_ps").unwrap_err();
        assert!(matches!(err, GraphicsError::AssetLoad { .. }));
        assert_eq!(shaders.path_of("composite_ps"), PathBuf::from("/nonexistent/shaders/composite_ps.spv"));
    }
}
