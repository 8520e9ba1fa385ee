//! Adapter enumeration results and selection.

use crate::error::GraphicsError;

/// Type of graphics adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterType {
    /// Discrete GPU (dedicated graphics card).
    Discrete,
    /// Integrated GPU (shared with CPU).
    Integrated,
    /// Software renderer.
    Software,
    /// Unknown adapter type.
    Unknown,
}

/// Information about a graphics adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Adapter name.
    pub name: String,
    /// PCI vendor id.
    pub vendor_id: u32,
    pub adapter_type: AdapterType,
    /// Device-local memory in bytes.
    pub dedicated_video_memory: u64,
}

impl AdapterInfo {
    pub fn is_software(&self) -> bool {
        self.adapter_type == AdapterType::Software
    }
}

/// Pick the adapter to create the device on.
///
/// Software adapters are skipped; among the rest the one with the most
/// dedicated video memory wins, ties going to the first enumerated.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Result<usize, GraphicsError> {
    let mut best: Option<(usize, u64)> = None;
    for (index, adapter) in adapters.iter().enumerate() {
        if adapter.is_software() {
            log::debug!("Skipping software adapter {}", adapter.name);
            continue;
        }
        if best.is_none_or(|(_, memory)| adapter.dedicated_video_memory > memory) {
            best = Some((index, adapter.dedicated_video_memory));
        }
    }

    let (index, _) = best.ok_or(GraphicsError::NoSuitableAdapter)?;
    let adapter = &adapters[index];
    log::info!(
        "Selected adapter: {} ({} MiB dedicated)",
        adapter.name,
        adapter.dedicated_video_memory / (1024 * 1024)
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, adapter_type: AdapterType, memory_mib: u64) -> AdapterInfo {
        AdapterInfo {
            name: name.to_string(),
            vendor_id: 0,
            adapter_type,
            dedicated_video_memory: memory_mib * 1024 * 1024,
        }
    }

    #[test]
    fn test_prefers_most_memory() {
        let adapters = [
            adapter("integrated", AdapterType::Integrated, 512),
            adapter("discrete", AdapterType::Discrete, 8192),
            adapter("small discrete", AdapterType::Discrete, 2048),
        ];
        assert_eq!(select_adapter(&adapters), Ok(1));
    }

    #[test]
    fn test_skips_software() {
        let adapters = [
            adapter("warp", AdapterType::Software, 65536),
            adapter("integrated", AdapterType::Integrated, 128),
        ];
        assert_eq!(select_adapter(&adapters), Ok(1));
    }

    #[test]
    fn test_no_suitable_adapter() {
        let adapters = [adapter("llvmpipe", AdapterType::Software, 0)];
        assert_eq!(select_adapter(&adapters), Err(GraphicsError::NoSuitableAdapter));
        assert_eq!(select_adapter(&[]), Err(GraphicsError::NoSuitableAdapter));
    }
}
