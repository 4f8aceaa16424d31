//! wgpu rendering context implementing the backend contract
//!
//! Owns the device/queue handles, the per-frame command encoder, and the
//! shared depth-stencil buffer that stands in for WebGL's context-global
//! stencil state: mask passes write it, and while a mask bracket is active
//! every fullscreen draw attaches it with the current comparison.

use std::sync::Arc;

use glam::Mat4;
use tracing::{debug, warn};

use crate::backend::{RenderBackend, StencilFunc};
use crate::error::ComposerError;
use crate::graphics::blit::{Blitter, STENCIL_FORMAT};
use crate::graphics::target::ColorTarget;
use crate::pass::{Pass, PassState};
use crate::passes::CopyPass;

/// Per-frame scene inputs forwarded to passes
///
/// The composer does not interpret these; the scene graph itself lives in
/// the host application, which renders it and hands the resulting textures
/// in.
#[derive(Debug, Clone)]
pub struct SceneInput {
    /// The rendered scene color
    pub color: wgpu::TextureView,
    /// The scene depth, required by depth-driven effects (SSAO, Bokeh)
    pub depth: Option<wgpu::TextureView>,
}

impl SceneInput {
    /// Scene input with color only
    pub fn new(color: wgpu::TextureView) -> Self {
        Self { color, depth: None }
    }

    /// Scene input with color and depth
    pub fn with_depth(color: wgpu::TextureView, depth: wgpu::TextureView) -> Self {
        Self {
            color,
            depth: Some(depth),
        }
    }
}

/// Camera parameters forwarded to depth-driven passes
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    /// Projection matrix
    pub projection: Mat4,
    /// View matrix
    pub view: Mat4,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            near: 0.1,
            far: 1000.0,
        }
    }
}

struct StencilBuffer {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl StencilBuffer {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shared Stencil Buffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: (width, height),
        }
    }
}

struct FrameState {
    encoder: wgpu::CommandEncoder,
    output: Option<wgpu::TextureView>,
}

/// Split borrow of the context handed to passes while recording a frame
pub struct Frame<'a> {
    /// Device for resource creation
    pub device: &'a wgpu::Device,
    /// Queue for buffer uploads
    pub queue: &'a wgpu::Queue,
    /// Format of the composer's color targets
    pub format: wgpu::TextureFormat,
    /// Current stencil comparison
    pub stencil_func: StencilFunc,
    /// Shared stencil buffer view
    pub stencil_view: &'a wgpu::TextureView,
    /// Fullscreen copy machinery
    pub blit: &'a Blitter,
    /// Encoder recording this frame
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Surface view for screen-output passes, if the frame has one
    pub output: Option<&'a wgpu::TextureView>,
}

impl<'a> Frame<'a> {
    /// The view a pass draws into: the frame output for screen-output
    /// passes, otherwise the write target
    pub fn color_attachment(
        &self,
        state: &PassState,
        write: &'a ColorTarget,
    ) -> Result<&'a wgpu::TextureView, ComposerError> {
        if state.render_to_screen {
            self.output.ok_or(ComposerError::NoScreenTarget)
        } else {
            Ok(write.view())
        }
    }

    /// Depth-stencil attachment for the current stencil comparison, if a
    /// mask bracket is active
    pub fn stencil_attachment(&self) -> Option<wgpu::RenderPassDepthStencilAttachment<'a>> {
        (self.stencil_func != StencilFunc::Always).then(|| {
            wgpu::RenderPassDepthStencilAttachment {
                view: self.stencil_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
            }
        })
    }
}

/// wgpu implementation of [`RenderBackend`]
pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    stencil_func: StencilFunc,
    stencil: StencilBuffer,
    blit: Blitter,
    frame: Option<FrameState>,
}

impl WgpuContext {
    /// Default format for composer targets: 4-channel, linearly filterable
    pub const DEFAULT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    /// Create a context over an existing device and queue
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
    ) -> Self {
        let blit = Blitter::new(&device, format);
        let stencil = StencilBuffer::new(&device, 1, 1);
        debug!(format = ?format, "Created wgpu composer context");
        Self {
            device,
            queue,
            format,
            stencil_func: StencilFunc::Always,
            stencil,
            blit,
            frame: None,
        }
    }

    /// The wrapped device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The wrapped queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Format of the composer's color targets
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Current stencil comparison
    pub fn stencil_func(&self) -> StencilFunc {
        self.stencil_func
    }

    /// Begin recording a frame
    ///
    /// `output` is the surface view that screen-output passes draw into;
    /// `None` for purely off-screen frames. A frame already in flight is
    /// submitted first.
    pub fn begin_frame(&mut self, output: Option<wgpu::TextureView>) {
        if self.frame.is_some() {
            warn!("begin_frame called with a frame in flight; submitting it");
            self.end_frame();
        }
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Composer Frame Encoder"),
            });
        self.frame = Some(FrameState { encoder, output });
    }

    /// Submit the recorded frame
    pub fn end_frame(&mut self) -> Option<wgpu::SubmissionIndex> {
        let frame = self.frame.take()?;
        Some(self.queue.submit([frame.encoder.finish()]))
    }

    /// Split borrow for pass recording; `None` outside begin/end_frame
    pub fn frame(&mut self) -> Option<Frame<'_>> {
        let frame = self.frame.as_mut()?;
        Some(Frame {
            device: &self.device,
            queue: &self.queue,
            format: self.format,
            stencil_func: self.stencil_func,
            stencil_view: &self.stencil.view,
            blit: &self.blit,
            encoder: &mut frame.encoder,
            output: frame.output.as_ref(),
        })
    }

    fn ensure_stencil(&mut self, width: u32, height: u32) {
        if self.stencil.size != (width, height) {
            self.stencil.texture.destroy();
            self.stencil = StencilBuffer::new(&self.device, width, height);
        }
    }
}

impl RenderBackend for WgpuContext {
    type Target = ColorTarget;
    type Scene = SceneInput;
    type Camera = CameraState;

    fn create_target(&mut self, width: u32, height: u32) -> ColorTarget {
        self.ensure_stencil(width, height);
        ColorTarget::new(&self.device, width, height, self.format)
    }

    fn resize_target(&mut self, target: &mut ColorTarget, width: u32, height: u32) {
        self.ensure_stencil(width, height);
        target.resize(&self.device, width, height);
    }

    fn dispose_target(&mut self, target: ColorTarget) {
        target.destroy();
    }

    fn set_stencil_func(&mut self, func: StencilFunc) {
        self.stencil_func = func;
    }

    fn create_copy_pass(&mut self) -> Option<Box<dyn Pass<Self>>> {
        Some(Box::new(CopyPass::new()))
    }
}

impl std::fmt::Debug for WgpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuContext")
            .field("format", &self.format)
            .field("stencil_func", &self.stencil_func)
            .field("frame_active", &self.frame.is_some())
            .finish()
    }
}
