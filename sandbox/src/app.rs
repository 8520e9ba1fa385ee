//! Headless and windowed frame loops.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use solstice_graphics::backend::WindowTarget;
use solstice_graphics::scene::CameraKeys;
use solstice_graphics::{
    Device, DeviceConfig, FrameRenderer, GraphicsError, InputState, RenderScene, Scene,
    ShaderSource,
};

use crate::args::Args;
use crate::demo::{self, TURNTABLE_MODEL};
use crate::overlay::StatsOverlay;

/// Frames between statistics lines.
const STATS_INTERVAL: u64 = 120;
const TURNTABLE_SPEED: f32 = 0.6;
/// Fixed step used without a window.
const HEADLESS_DELTA: f32 = 1.0 / 60.0;

/// Everything that lives as long as the device.
struct Gpu {
    device: Device,
    renderer: FrameRenderer,
    scene: Scene,
    overlay: StatsOverlay,
}

impl Gpu {
    fn new(
        config: DeviceConfig,
        shaders: Arc<dyn ShaderSource>,
        window: Option<&dyn WindowTarget>,
        args: &Args,
    ) -> Result<Self, GraphicsError> {
        let device = Device::new(config, shaders, window)?;
        let renderer = FrameRenderer::new(&device)?;
        let scene = demo::build_scene(&device, args.environment.as_deref())?;
        let overlay =
            StatsOverlay::new(STATS_INTERVAL).with_turntable(TURNTABLE_MODEL, TURNTABLE_SPEED);
        Ok(Self {
            device,
            renderer,
            scene,
            overlay,
        })
    }

    fn frame(&mut self, delta_time: f32, input: &InputState) -> Result<(), GraphicsError> {
        let aspect_ratio = self.device.backbuffer_extent().aspect_ratio();
        self.scene.update(delta_time, input, aspect_ratio);
        self.renderer.render_frame(
            &mut self.device,
            &mut self.scene,
            Some(&mut self.overlay),
            delta_time,
        )
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        self.renderer
            .resize(&mut self.device, width, height, Some(&mut self.overlay))
    }

    /// Drain the queues and fail on any recorded validation message.
    fn finish(&self) -> Result<(), GraphicsError> {
        self.device.wait_idle()?;
        let Some(dummy) = self.device.dummy_backend() else {
            return Ok(());
        };
        let errors = dummy.validation_errors();
        for message in &errors {
            log::error!("Validation: {message}");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GraphicsError::Internal(format!(
                "{} validation errors",
                errors.len()
            )))
        }
    }
}

/// Render `frames` frames without a window.
pub fn run_headless(
    config: DeviceConfig,
    shaders: Arc<dyn ShaderSource>,
    args: &Args,
    frames: u64,
) -> Result<(), GraphicsError> {
    let mut gpu = Gpu::new(config, shaders, None, args)?;
    let input = InputState::new();
    let start = Instant::now();
    for _ in 0..frames {
        gpu.frame(HEADLESS_DELTA, &input)?;
    }
    gpu.finish()?;
    log::info!(
        "Rendered {frames} frames in {:.2}s",
        start.elapsed().as_secs_f32()
    );
    Ok(())
}

/// Open a window and render until it closes or the frame limit is hit.
pub fn run_windowed(
    config: DeviceConfig,
    shaders: Arc<dyn ShaderSource>,
    args: Args,
) -> Result<(), GraphicsError> {
    let event_loop = EventLoop::new()
        .map_err(|e| GraphicsError::InitializationFailed(format!("event loop: {e}")))?;
    let mut app = SandboxApp {
        gpu: None,
        window: None,
        frame_limit: args.frame_limit(),
        config,
        shaders,
        args,
        input: InputState::new(),
        last_frame: Instant::now(),
        frames: 0,
        error: None,
    };
    event_loop
        .run_app(&mut app)
        .map_err(|e| GraphicsError::Internal(format!("event loop: {e}")))?;
    match app.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct SandboxApp {
    // Dropped before the window the swapchain presents to.
    gpu: Option<Gpu>,
    window: Option<Window>,
    config: DeviceConfig,
    shaders: Arc<dyn ShaderSource>,
    args: Args,
    input: InputState,
    last_frame: Instant,
    frames: u64,
    frame_limit: Option<u64>,
    error: Option<GraphicsError>,
}

impl SandboxApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: GraphicsError) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn create_gpu(&mut self, window: &Window) -> Result<Gpu, GraphicsError> {
        let size = window.inner_size();
        let config = self.config.clone().with_size(size.width, size.height);
        Gpu::new(
            config,
            Arc::clone(&self.shaders),
            Some(window as &dyn WindowTarget),
            &self.args,
        )
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let now = Instant::now();
        let delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let result = gpu.frame(delta_time, &self.input);
        self.input.end_frame();
        if let Err(e) = result {
            self.fail(event_loop, e);
            return;
        }

        self.frames += 1;
        if self.frame_limit.is_some_and(|limit| self.frames >= limit) {
            log::info!("Reached max frames limit ({}), exiting", self.frames);
            self.shutdown(event_loop);
        } else if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(gpu) = self.gpu.take()
            && let Err(e) = gpu.finish()
        {
            self.error = Some(e);
        }
        event_loop.exit();
    }
}

fn camera_key(code: KeyCode) -> Option<CameraKeys> {
    Some(match code {
        KeyCode::KeyW => CameraKeys::FORWARD,
        KeyCode::KeyS => CameraKeys::BACKWARD,
        KeyCode::KeyA => CameraKeys::LEFT,
        KeyCode::KeyD => CameraKeys::RIGHT,
        KeyCode::KeyE | KeyCode::Space => CameraKeys::UP,
        KeyCode::KeyQ | KeyCode::ControlLeft => CameraKeys::DOWN,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => CameraKeys::BOOST,
        _ => return None,
    })
}

impl ApplicationHandler for SandboxApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("Solstice Sandbox")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.width,
                self.config.height,
            ));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => window,
            Err(e) => {
                self.fail(
                    event_loop,
                    GraphicsError::InitializationFailed(format!("window: {e}")),
                );
                return;
            }
        };
        match self.create_gpu(&window) {
            Ok(gpu) => {
                log::info!("Window created");
                self.gpu = Some(gpu);
                self.last_frame = Instant::now();
                window.request_redraw();
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu
                    && let Err(e) = gpu.resize(size.width, size.height)
                {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                let pressed = event.state == ElementState::Pressed;
                if code == KeyCode::Escape && pressed {
                    self.shutdown(event_loop);
                } else if let Some(key) = camera_key(code) {
                    self.input.set_key(key, pressed);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.input.look_active = state == ElementState::Pressed;
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input.mouse_delta += glam::Vec2::new(delta.0 as f32, delta.1 as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;
    use solstice_graphics::InMemoryShaders;

    #[test]
    fn test_headless_dummy_run() {
        let _ = env_logger::builder().is_test(true).try_init();
        let args = Args::try_parse_from([
            "solstice-sandbox",
            "--backend",
            "dummy",
            "--headless",
            "--width",
            "128",
            "--height",
            "72",
            "--validation",
        ])
        .unwrap();
        let config = args.device_config().unwrap();
        run_headless(config, Arc::new(InMemoryShaders::placeholder()), &args, 5).unwrap();
    }

    #[test]
    fn test_movement_keys_map_to_camera() {
        assert_eq!(camera_key(KeyCode::KeyW), Some(CameraKeys::FORWARD));
        assert_eq!(camera_key(KeyCode::ShiftRight), Some(CameraKeys::BOOST));
        assert_eq!(camera_key(KeyCode::KeyZ), None);
    }
}
