//! Command line arguments.
//!
//! A `--config` file provides the base [`DeviceConfig`]; explicit flags
//! override it.

use std::path::PathBuf;

use clap::Parser;
use solstice_graphics::{BackendKind, DeviceConfig, GraphicsError};

/// Graphics backend selection for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliBackend {
    /// Vulkan when it initializes, otherwise the dummy backend.
    Auto,
    /// Native Vulkan via ash.
    Vulkan,
    /// Recording backend for testing and CI environments.
    Dummy,
}

impl From<CliBackend> for BackendKind {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Auto => BackendKind::Auto,
            CliBackend::Vulkan => BackendKind::Vulkan,
            CliBackend::Dummy => BackendKind::Dummy,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "solstice-sandbox",
    about = "Render the demo scene through the Solstice deferred pipeline",
    long_about = "Render the demo scene through the Solstice deferred pipeline.\n\n\
        EXAMPLES:\n\
          # Headless smoke test on the dummy backend\n\
          solstice-sandbox --backend dummy --headless --max-frames 100\n\
        \n\
          # Vulkan in a window, shaders compiled to SPIR-V\n\
          solstice-sandbox --backend vulkan --shader-dir shaders/spv",
    version
)]
pub struct Args {
    /// Device configuration file (TOML).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Graphics backend to use.
    #[arg(long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Directory of compiled `<name>.spv` shaders.
    #[arg(long)]
    pub shader_dir: Option<PathBuf>,

    /// Number of frames the CPU may record ahead of the GPU.
    #[arg(long)]
    pub frames_in_flight: Option<usize>,

    /// Initial back buffer width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Initial back buffer height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Disable vertical sync.
    #[arg(long)]
    pub no_vsync: bool,

    /// Allow tearing when v-sync is off.
    #[arg(long)]
    pub tearing: bool,

    /// Enable backend validation.
    #[arg(long, conflicts_with = "no_validation")]
    pub validation: bool,

    /// Disable backend validation.
    #[arg(long, conflicts_with = "validation")]
    pub no_validation: bool,

    /// Render without a window.
    #[arg(long)]
    pub headless: bool,

    /// Exit after rendering N frames.
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Equirectangular HDR image used as the sky.
    #[arg(long)]
    pub environment: Option<PathBuf>,
}

impl Args {
    /// Frames a headless run renders when `--max-frames` is not given.
    pub const HEADLESS_FRAMES: u64 = 100;

    /// The configuration file, if any, with the command line applied on top.
    pub fn device_config(&self) -> Result<DeviceConfig, GraphicsError> {
        let mut config = match &self.config {
            Some(path) => DeviceConfig::load(path)?,
            None => DeviceConfig::new(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(frames) = self.frames_in_flight {
            config.frames_in_flight = frames;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if self.no_vsync {
            config.vsync = false;
        }
        if self.tearing {
            config.allow_tearing = true;
        }
        if self.validation {
            config.validation = true;
        } else if self.no_validation {
            config.validation = false;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn frame_limit(&self) -> Option<u64> {
        match (self.max_frames, self.headless) {
            (Some(frames), _) => Some(frames),
            (None, true) => Some(Self::HEADLESS_FRAMES),
            (None, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("solstice-sandbox").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "--backend",
            "dummy",
            "--frames-in-flight",
            "4",
            "--no-vsync",
            "--tearing",
            "--width",
            "640",
        ]);
        let config = args.device_config().unwrap();
        assert_eq!(config.backend, BackendKind::Dummy);
        assert_eq!(config.frames_in_flight, 4);
        assert!(!config.vsync);
        assert!(config.allow_tearing);
        assert_eq!(config.width, 640);
        assert_eq!(config.height, DeviceConfig::default().height);
    }

    #[rstest]
    #[case::too_many_frames(&["--frames-in-flight", "9"])]
    #[case::single_frame(&["--frames-in-flight", "1"])]
    #[case::zero_width(&["--width", "0"])]
    #[case::zero_height(&["--height", "0"])]
    fn test_invalid_override_rejected(#[case] flags: &[&str]) {
        let err = parse(flags).device_config().unwrap_err();
        assert!(matches!(err, GraphicsError::Config(_)));
    }

    #[rstest]
    #[case::validation(&["--validation"], true)]
    #[case::no_validation(&["--no-validation"], false)]
    fn test_validation_flag(#[case] flags: &[&str], #[case] expected: bool) {
        assert_eq!(parse(flags).device_config().unwrap().validation, expected);
    }

    #[test]
    fn test_validation_flags_conflict() {
        let result = Args::try_parse_from(["solstice-sandbox", "--validation", "--no-validation"]);
        assert!(result.is_err());
    }

    #[rstest]
    #[case::headless(&["--headless"], Some(Args::HEADLESS_FRAMES))]
    #[case::headless_limited(&["--headless", "--max-frames", "3"], Some(3))]
    #[case::windowed_limited(&["--max-frames", "7"], Some(7))]
    #[case::windowed(&[], None)]
    fn test_frame_limit(#[case] flags: &[&str], #[case] expected: Option<u64>) {
        assert_eq!(parse(flags).frame_limit(), expected);
    }
}
