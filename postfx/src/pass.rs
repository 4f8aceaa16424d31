//! Pass contract for the post-processing pipeline

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::RenderBackend;
use crate::error::ComposerError;

/// Role a pass plays in stencil-mask bracketing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskRole {
    /// Ordinary pass, no effect on the mask bracket
    #[default]
    None,
    /// Opens a mask bracket: subsequent passes render stencil-constrained
    Begin,
    /// Closes the current mask bracket
    End,
}

/// Flag state shared by every pass variant
///
/// These are the fields the composer reads each frame and the codec writes
/// to the wire for every pass regardless of variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassState {
    /// Stable identifier, preserved across serialization
    pub uuid: Uuid,
    /// Disabled passes are skipped entirely
    pub enabled: bool,
    /// Whether the composer swaps the buffer pair after this pass
    pub needs_swap: bool,
    /// Render to the frame's surface view instead of the write buffer
    pub render_to_screen: bool,
    /// Clear the output before drawing
    pub clear: bool,
}

impl PassState {
    /// Create state with a fresh uuid and the given swap behavior
    pub fn new(needs_swap: bool) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            enabled: true,
            needs_swap,
            render_to_screen: false,
            clear: false,
        }
    }

    /// Create state that also clears its output before drawing
    pub fn with_clear(needs_swap: bool) -> Self {
        Self {
            clear: true,
            ..Self::new(needs_swap)
        }
    }
}

/// One stage of the post-processing pipeline
///
/// A pass reads from `read` and/or the scene inputs and writes into `write`
/// (or the screen, if [`PassState::render_to_screen`] is set). The composer
/// always supplies the current write/read pair; what a pass does with them is
/// its own business.
pub trait Pass<B: RenderBackend> {
    /// Type discriminator used by the serialization codec
    fn type_tag(&self) -> &'static str;

    /// Shared flag state
    fn state(&self) -> &PassState;

    /// Mutable shared flag state
    fn state_mut(&mut self) -> &mut PassState;

    /// Record this pass's rendering work for the current frame
    ///
    /// Failures propagate to the composer's caller uncaught; the composer
    /// performs no recovery of its own.
    #[allow(clippy::too_many_arguments)]
    fn render(
        &mut self,
        backend: &mut B,
        write: &B::Target,
        read: &B::Target,
        scene: &B::Scene,
        camera: &B::Camera,
        delta: f32,
        mask_active: bool,
    ) -> Result<(), ComposerError>;

    /// Called when the composer's buffers change size
    fn set_size(&mut self, _backend: &mut B, _width: u32, _height: u32) {}

    /// Role in mask bracketing; `None` for ordinary passes
    fn mask_role(&self) -> MaskRole {
        MaskRole::None
    }

    /// Variant-specific parameters as a JSON object
    fn params_json(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    /// Overwrite variant-specific parameters from a serialized record
    ///
    /// Unknown fields are ignored; missing fields keep their defaults.
    fn apply_params(&mut self, _params: &serde_json::Value) {}

    /// Identifier shorthand
    fn uuid(&self) -> Uuid {
        self.state().uuid
    }

    /// Enabled shorthand
    fn enabled(&self) -> bool {
        self.state().enabled
    }

    /// Swap-request shorthand
    fn needs_swap(&self) -> bool {
        self.state().needs_swap
    }

    /// Screen-output shorthand
    fn render_to_screen(&self) -> bool {
        self.state().render_to_screen
    }
}
