//! Editor overlay collaborator.
//!
//! The overlay runs once per frame after the composite pass and before the
//! back buffer returns to `Present`. It draws into the same graphics context
//! with the back buffer bound as the render target, and may mutate the scene
//! (move models, add models) through the device's resource factories.

use crate::context::GraphicsContext;
use crate::descriptor::CpuDescriptorHandle;
use crate::device::Device;
use crate::error::GraphicsError;
use crate::scene::Scene;
use crate::types::Extent2d;

/// Per-frame facts handed to the overlay.
#[derive(Debug, Clone, Copy)]
pub struct FrameView {
    pub frame_index: usize,
    pub frame_count: u64,
    pub extent: Extent2d,
    /// RTV of the back buffer being drawn.
    pub backbuffer_rtv: CpuDescriptorHandle,
    /// SRV of the tone-mapped image, for viewport panels.
    pub scene_srv: u32,
    pub delta_time: f32,
}

pub trait EditorOverlay {
    /// Record the overlay into `ctx`.
    ///
    /// The back buffer is in `RenderTarget` and bound. The overlay must not
    /// change its state and must not submit the context.
    fn render(
        &mut self,
        device: &Device,
        scene: &mut Scene,
        frame: &FrameView,
        ctx: &mut GraphicsContext,
    ) -> Result<(), GraphicsError>;

    fn on_resize(&mut self, _width: u32, _height: u32) {}
}
