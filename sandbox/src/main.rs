//! Solstice sandbox: renders the demo scene through the deferred pipeline.
//!
//! ```bash
//! solstice-sandbox --backend dummy --headless --max-frames 100
//! solstice-sandbox --config sandbox.toml --shader-dir shaders/spv
//! ```

mod app;
mod args;
mod demo;
mod overlay;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use solstice_graphics::{
    BackendKind, DeviceConfig, GraphicsError, InMemoryShaders, ShaderDirectory, ShaderSource,
};

use crate::args::Args;

fn shader_source(args: &Args, config: &DeviceConfig) -> Result<Arc<dyn ShaderSource>, GraphicsError> {
    match &args.shader_dir {
        Some(dir) => Ok(Arc::new(ShaderDirectory::new(dir))),
        // Placeholder bytecode is only meaningful to the recording backend.
        None if config.backend == BackendKind::Dummy => Ok(Arc::new(InMemoryShaders::placeholder())),
        None => Err(GraphicsError::Config(format!(
            "--shader-dir is required with the {:?} backend",
            config.backend
        ))),
    }
}

fn run(args: Args) -> Result<(), GraphicsError> {
    let config = args.device_config()?;
    let shaders = shader_source(&args, &config)?;
    log::info!(
        "Solstice sandbox {} ({:?} backend, {} frames in flight)",
        solstice_graphics::VERSION,
        config.backend,
        config.frames_in_flight
    );

    if args.headless {
        let frames = args.frame_limit().unwrap_or(Args::HEADLESS_FRAMES);
        app::run_headless(config, shaders, &args, frames)
    } else {
        app::run_windowed(config, shaders, args)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
