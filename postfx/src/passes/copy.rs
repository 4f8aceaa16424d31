//! Copy pass: blits the read buffer onto the output unchanged
//!
//! Also serves as the composer's internal copy pass, where the stencil-gated
//! variant composites the write buffer onto the read buffer inside a mask
//! bracket.

use crate::error::ComposerError;
use crate::graphics::{CameraState, ColorTarget, SceneInput, WgpuContext};
use crate::pass::{Pass, PassState};

/// Straight copy of the read buffer
pub struct CopyPass {
    state: PassState,
}

impl CopyPass {
    /// Serialization tag
    pub const TYPE_TAG: &'static str = "Copy";

    /// Create a copy pass
    pub fn new() -> Self {
        Self {
            state: PassState::new(true),
        }
    }
}

impl Default for CopyPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass<WgpuContext> for CopyPass {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn render(
        &mut self,
        backend: &mut WgpuContext,
        write: &ColorTarget,
        read: &ColorTarget,
        _scene: &SceneInput,
        _camera: &CameraState,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), ComposerError> {
        let frame = backend.frame().ok_or(ComposerError::NoActiveFrame)?;
        let dest = frame.color_attachment(&self.state, write)?;

        frame.blit.blit(
            frame.device,
            frame.encoder,
            read.view(),
            dest,
            frame.stencil_func,
            Some(frame.stencil_view),
            self.state.clear.then_some(wgpu::Color::BLACK),
        );
        Ok(())
    }
}
