//! wgpu implementation of the rendering backend contract

pub(crate) mod blit;
mod context;
mod target;

pub use blit::Blitter;
pub use context::{CameraState, Frame, SceneInput, WgpuContext};
pub use target::ColorTarget;
