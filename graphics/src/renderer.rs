//! The fixed deferred frame.
//!
//! [`FrameRenderer`] owns the targets shared between passes (the main depth
//! buffer and the HDR target) and records the passes in their fixed order
//! into the current slot's graphics context:
//!
//! ```text
//! transition point        barriers recorded in one call
//! ─────────────────────   ──────────────────────────────────────────────
//! geometry entry          gbuffer SR->RT
//! ssao entry              gbuffer RT->SR, depth DW->SR, ao SR->RT
//! shadow entry            ao RT->SR, depth SR->DW, shadow SR->DW
//! shading entry           shadow DW->SR, hdr SR->RT
//! forward entry           depth DW->DR
//! bloom entry             hdr RT->SR, depth DR->DW, bloom SR->UAV
//! post process entry      bloom UAV->SR, ldr SR->RT
//! composite entry         ldr RT->SR, back buffer Present->RT
//! finish                  back buffer RT->Present
//! ```
//!
//! Every frame starts and ends with the private targets in
//! `ShaderResource`, depth in `DepthWrite` and the back buffers in `Present`.

use crate::context::GraphicsContext;
use crate::device::Device;
use crate::editor::{EditorOverlay, FrameView};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::passes::{
    BackBufferTarget, BloomPass, CompositePass, DEPTH_FORMAT, ForwardPass, GeometryPass, HDR_FORMAT,
    PostProcessPass, RenderPass, ShadingInputs, ShadingPass, ShadowPass, SsaoPass,
};
use crate::profiling::{profile_function, profile_scope};
use crate::resources::Texture;
use crate::scene::{RenderScene, Scene};
use crate::types::{Extent2d, TextureDescriptor, TextureUsage};

#[derive(Debug)]
pub struct FrameRenderer {
    extent: Extent2d,
    depth: Texture,
    hdr: Texture,
    geometry: GeometryPass,
    ssao: SsaoPass,
    shadow: ShadowPass,
    shading: ShadingPass,
    forward: ForwardPass,
    bloom: BloomPass,
    post_process: PostProcessPass,
    composite: CompositePass,
}

impl FrameRenderer {
    /// Create every pass at the back buffer's resolution.
    pub fn new(factory: &dyn ResourceFactory) -> Result<Self, GraphicsError> {
        let extent = factory.backbuffer_extent();
        let (width, height) = (extent.width, extent.height);
        log::debug!("Creating frame renderer at {width}x{height}");
        Ok(Self {
            extent,
            depth: factory.create_texture(
                &TextureDescriptor::new_2d(width, height, DEPTH_FORMAT, TextureUsage::DepthStencil)
                    .with_label("depth"),
                None,
            )?,
            hdr: factory.create_texture(
                &TextureDescriptor::new_2d(width, height, HDR_FORMAT, TextureUsage::RenderTarget)
                    .with_label("hdr"),
                None,
            )?,
            geometry: GeometryPass::new(factory, width, height)?,
            ssao: SsaoPass::new(factory, width, height)?,
            shadow: ShadowPass::new(factory)?,
            shading: ShadingPass::new(factory)?,
            forward: ForwardPass::new(factory)?,
            bloom: BloomPass::new(factory, width, height)?,
            post_process: PostProcessPass::new(factory, width, height)?,
            composite: CompositePass::new(factory)?,
        })
    }

    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    pub fn depth(&self) -> &Texture {
        &self.depth
    }

    pub fn hdr(&self) -> &Texture {
        &self.hdr
    }

    pub fn geometry(&self) -> &GeometryPass {
        &self.geometry
    }

    pub fn ssao_mut(&mut self) -> &mut SsaoPass {
        &mut self.ssao
    }

    pub fn shadow(&self) -> &ShadowPass {
        &self.shadow
    }

    pub fn bloom_mut(&mut self) -> &mut BloomPass {
        &mut self.bloom
    }

    pub fn bloom(&self) -> &BloomPass {
        &self.bloom
    }

    pub fn post_process(&self) -> &PostProcessPass {
        &self.post_process
    }

    pub fn post_process_mut(&mut self) -> &mut PostProcessPass {
        &mut self.post_process
    }

    /// Every private and shared target, for state checks.
    pub fn targets(&self) -> Vec<&Texture> {
        vec![
            &self.hdr,
            self.geometry.albedo(),
            self.geometry.normals(),
            self.geometry.positions(),
            self.ssao.output(),
            self.shadow.shadow_map(),
            self.bloom.output(),
            self.post_process.output(),
        ]
    }

    fn passes_mut(&mut self) -> [&mut dyn RenderPass; 8] {
        [
            &mut self.geometry,
            &mut self.ssao,
            &mut self.shadow,
            &mut self.shading,
            &mut self.forward,
            &mut self.bloom,
            &mut self.post_process,
            &mut self.composite,
        ]
    }

    /// Record the whole frame into the current slot's graphics context.
    ///
    /// The caller has called [`Device::begin_frame`] and submits the context
    /// afterwards.
    pub fn render(
        &mut self,
        device: &Device,
        scene: &mut Scene,
        editor: Option<&mut dyn EditorOverlay>,
        delta_time: f32,
    ) -> Result<(), GraphicsError> {
        profile_function!();
        let slot = device.current_frame_index();
        scene.prepare(slot)?;

        let target = BackBufferTarget {
            resource: device.current_backbuffer()?,
            rtv: device.current_backbuffer_rtv()?,
            extent: device.backbuffer_extent(),
        };
        let mut ctx = device.graphics_context();
        self.record_passes(&*scene, &mut ctx, slot, &target)?;

        if let Some(editor) = editor {
            profile_scope!("editor overlay");
            let frame = FrameView {
                frame_index: slot,
                frame_count: device.frame_count(),
                extent: target.extent,
                backbuffer_rtv: target.rtv,
                scene_srv: self.post_process.output().srv_index(),
                delta_time,
            };
            editor.render(device, scene, &frame, &mut ctx)?;
        }

        self.composite.finish(&mut ctx, &target);
        Ok(())
    }

    fn record_passes(
        &self,
        scene: &dyn RenderScene,
        ctx: &mut GraphicsContext,
        slot: usize,
        target: &BackBufferTarget<'_>,
    ) -> Result<(), GraphicsError> {
        {
            profile_scope!("geometry");
            self.geometry.render(scene, ctx, &self.depth)?;
        }
        {
            profile_scope!("ssao");
            self.ssao
                .render(scene, ctx, &self.depth, self.geometry.normals())?;
        }
        {
            profile_scope!("shadow");
            self.shadow.render(scene, ctx)?;
        }
        {
            profile_scope!("shading");
            let inputs = ShadingInputs {
                albedo: self.geometry.albedo(),
                normals: self.geometry.normals(),
                positions: self.geometry.positions(),
                ambient_occlusion: self.ssao.output(),
                shadow_map: self.shadow.shadow_map(),
                shadow_sampler: self.shadow.sampler(),
            };
            self.shading.render(scene, ctx, &self.hdr, &inputs)?;
        }
        {
            profile_scope!("forward");
            self.forward.render(scene, ctx, &self.hdr, &self.depth)?;
        }
        {
            profile_scope!("bloom");
            self.bloom.render(ctx, &self.hdr)?;
        }
        {
            profile_scope!("post process");
            self.post_process.render(
                ctx,
                slot,
                &self.hdr,
                self.ssao.output(),
                self.bloom.output(),
            )?;
        }
        profile_scope!("composite");
        self.composite
            .render(ctx, target, self.post_process.output())
    }

    /// One complete frame: begin, record, submit, present, end.
    pub fn render_frame(
        &mut self,
        device: &mut Device,
        scene: &mut Scene,
        editor: Option<&mut dyn EditorOverlay>,
        delta_time: f32,
    ) -> Result<(), GraphicsError> {
        device.begin_frame()?;
        self.render(device, scene, editor, delta_time)?;
        device.execute_graphics_context()?;
        device.present()?;
        device.end_frame()
    }

    /// Resize the swapchain and every resolution-dependent target.
    pub fn resize(
        &mut self,
        device: &mut Device,
        width: u32,
        height: u32,
        editor: Option<&mut dyn EditorOverlay>,
    ) -> Result<(), GraphicsError> {
        let extent = Extent2d::new(width, height);
        if extent.is_empty() || extent == self.extent {
            return Ok(());
        }
        device.resize_window(width, height)?;

        let factory: &dyn ResourceFactory = &*device;
        factory.resize_texture(&mut self.depth, width, height)?;
        factory.resize_texture(&mut self.hdr, width, height)?;
        for pass in self.passes_mut() {
            log::trace!("Resizing {} pass", pass.name());
            pass.resize(factory, width, height)?;
        }
        if let Some(editor) = editor {
            editor.on_resize(width, height);
        }
        self.extent = extent;
        log::debug!("Frame renderer resized to {width}x{height}");
        Ok(())
    }
}
