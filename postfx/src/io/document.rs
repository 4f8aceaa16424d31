//! Pipeline document: serialized composer state

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::backend::RenderBackend;
use crate::composer::EffectComposer;
use crate::error::ComposerError;
use crate::io::registry::PassRegistry;
use crate::pass::{Pass, PassState};

/// One serialized pass: type tag, shared flags, and variant parameters
///
/// On the wire the three parts share a single JSON object:
/// `{ "type": tag, "uuid", "enabled", "needsSwap", "renderToScreen",
/// "clear", ...variant fields }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassRecord {
    /// Variant discriminator
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Pass id
    pub uuid: Uuid,
    /// Enabled flag
    pub enabled: bool,
    /// Swap-request flag
    pub needs_swap: bool,
    /// Screen-output flag
    pub render_to_screen: bool,
    /// Clear flag
    pub clear: bool,
    /// Variant-specific fields, flattened into the record
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl PassRecord {
    /// Capture a pass into its serialized form
    pub fn from_pass<B: RenderBackend>(pass: &dyn Pass<B>) -> Self {
        let params = match pass.params_json() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let state = pass.state();
        Self {
            type_tag: pass.type_tag().to_string(),
            uuid: state.uuid,
            enabled: state.enabled,
            needs_swap: state.needs_swap,
            render_to_screen: state.render_to_screen,
            clear: state.clear,
            params,
        }
    }

    /// Shared flag state carried by this record
    pub fn state(&self) -> PassState {
        PassState {
            uuid: self.uuid,
            enabled: self.enabled,
            needs_swap: self.needs_swap,
            render_to_screen: self.render_to_screen,
            clear: self.clear,
        }
    }
}

/// Serialized composer: id plus pass records in execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerDocument {
    /// The composer's id
    pub uuid: Uuid,
    /// Pass records, order significant
    pub passes: Vec<PassRecord>,
}

impl ComposerDocument {
    /// Capture a composer's pipeline configuration
    pub fn from_composer<B: RenderBackend>(composer: &EffectComposer<B>) -> Self {
        Self {
            uuid: composer.uuid(),
            passes: composer
                .passes()
                .iter()
                .map(|pass| PassRecord::from_pass(pass.as_ref()))
                .collect(),
        }
    }

    /// Build a fresh composer from this document
    ///
    /// The composer comes back at the default 1×1 size; callers follow up
    /// with `set_size` once the output dimensions are known. Unrecognized
    /// type tags degrade to the registry's fallback variant; the document
    /// never fails to instantiate.
    pub fn instantiate<B: RenderBackend>(
        &self,
        backend: &mut B,
        registry: &PassRegistry<B>,
    ) -> EffectComposer<B> {
        info!(
            uuid = %self.uuid,
            pass_count = self.passes.len(),
            "Instantiating composer pipeline"
        );

        let mut composer = EffectComposer::new(backend);
        composer.restore_uuid(self.uuid);
        for record in &self.passes {
            composer.add_pass(registry.instantiate(record));
        }
        composer
    }

    /// Save this document to a pretty-printed JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ComposerError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(path = ?path, "Pipeline document saved");
        Ok(())
    }

    /// Load a document from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ComposerError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let document = serde_json::from_str(&json)?;
        info!(path = ?path, "Pipeline document loaded");
        Ok(document)
    }
}
