//! Post-processing effect composer for wgpu
//!
//! This crate provides an ordered chain of rendering passes ping-ponging
//! between two off-screen color targets, with stencil-mask bracketing and
//! JSON serialization of the pipeline configuration.
//!
//! ```
//! use postfx::headless::HeadlessBackend;
//! use postfx::prelude::*;
//!
//! let mut backend = HeadlessBackend::new();
//! let mut composer = EffectComposer::with_size(&mut backend, 1280, 720);
//! assert_eq!(composer.size(), (1280, 720));
//! composer.render(&mut backend, &(), &(), 0.016).unwrap();
//! ```

pub mod backend;
pub mod composer;
pub mod config;
pub mod error;
pub mod graphics;
pub mod headless;
pub mod io;
pub mod pass;
pub mod passes;

// Re-export commonly used types
pub mod prelude {
    // Composer types
    pub use crate::composer::EffectComposer;

    // Contract types
    pub use crate::backend::{ColorBuffer, RenderBackend, StencilFunc};
    pub use crate::pass::{MaskRole, Pass, PassState};

    // Error types
    pub use crate::error::ComposerError;

    // Config types
    pub use crate::config::PipelineConfig;

    // IO types
    pub use crate::io::{ComposerDocument, PassRecord, PassRegistry};

    // wgpu backend types
    pub use crate::graphics::{CameraState, ColorTarget, SceneInput, WgpuContext};

    // Pass variants
    pub use crate::passes::{
        BloomPass, BloomSettings, BokehPass, BokehSettings, ClearMaskPass, CopyPass, FxaaPass,
        MaskPass, RenderPass, RenderSettings, SsaoPass, SsaoSettings,
    };

    // Math types
    pub use glam::{Mat4, Vec2, Vec3, Vec4};

    // Id type carried by composers and passes
    pub use uuid::Uuid;

    pub use wgpu;
}

/// Initialize logging for the composer
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wgpu_core=warn,wgpu_hal=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
