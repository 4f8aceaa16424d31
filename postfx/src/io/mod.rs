//! Serialization of pipeline configurations

mod document;
mod registry;

pub use document::{ComposerDocument, PassRecord};
pub use registry::{PassConstructor, PassRegistry};
