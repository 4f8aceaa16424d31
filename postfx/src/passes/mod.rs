//! Concrete pass variants for the wgpu backend

mod bloom;
mod bokeh;
mod copy;
mod fxaa;
mod mask;
mod render;
mod ssao;

pub use bloom::{BloomPass, BloomSettings};
pub use bokeh::{BokehPass, BokehSettings};
pub use copy::CopyPass;
pub use fxaa::FxaaPass;
pub use mask::{ClearMaskPass, MaskPass};
pub use render::{RenderPass, RenderSettings};
pub use ssao::{SsaoPass, SsaoSettings};
