//! Render pass: brings the host-rendered scene color into the chain
//!
//! The scene graph itself is drawn by the host application; this pass seeds
//! the pipeline by copying that result into the write buffer. It is also the
//! fallback variant for unrecognized serialized type tags.

use serde::{Deserialize, Serialize};

use crate::error::ComposerError;
use crate::graphics::{CameraState, ColorTarget, SceneInput, WgpuContext};
use crate::pass::{Pass, PassState};

/// Render pass parameters
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderSettings {
    /// Clear color applied when the pass clears its output; black if unset
    pub clear_color: Option<[f64; 4]>,
}

/// Scene entry point of the pipeline
pub struct RenderPass {
    state: PassState,
    /// Parameters
    pub settings: RenderSettings,
}

impl RenderPass {
    /// Serialization tag
    pub const TYPE_TAG: &'static str = "Render";

    /// Create a render pass that clears and swaps
    pub fn new() -> Self {
        Self {
            state: PassState::with_clear(true),
            settings: RenderSettings::default(),
        }
    }

    fn clear_color(&self) -> Option<wgpu::Color> {
        if !self.state.clear {
            return None;
        }
        let [r, g, b, a] = self.settings.clear_color.unwrap_or([0.0, 0.0, 0.0, 1.0]);
        Some(wgpu::Color { r, g, b, a })
    }
}

impl Default for RenderPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass<WgpuContext> for RenderPass {
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
        _read: &ColorTarget,
        scene: &SceneInput,
        _camera: &CameraState,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), ComposerError> {
        let clear = self.clear_color();
        let frame = backend.frame().ok_or(ComposerError::NoActiveFrame)?;
        let dest = frame.color_attachment(&self.state, write)?;

        frame.blit.blit(
            frame.device,
            frame.encoder,
            &scene.color,
            dest,
            frame.stencil_func,
            Some(frame.stencil_view),
            clear,
        );
        Ok(())
    }

    fn params_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }

    fn apply_params(&mut self, params: &serde_json::Value) {
        if let Ok(settings) = serde_json::from_value(params.clone()) {
            self.settings = settings;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_camel_case() {
        let mut pass = RenderPass::new();
        pass.settings.clear_color = Some([0.25, 0.5, 0.75, 1.0]);

        let value = pass.params_json();
        assert_eq!(
            value.get("clearColor").and_then(|v| v.as_array()).map(|a| a.len()),
            Some(4)
        );

        let mut restored = RenderPass::new();
        restored.apply_params(&value);
        assert_eq!(restored.settings.clear_color, Some([0.25, 0.5, 0.75, 1.0]));
    }

    #[test]
    fn missing_params_keep_defaults() {
        let mut pass = RenderPass::new();
        pass.apply_params(&serde_json::json!({}));
        assert_eq!(pass.settings.clear_color, None);
    }
}
