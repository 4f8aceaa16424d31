//! Pass registry for type-tag dispatch at the deserialization boundary

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::RenderBackend;
use crate::io::document::PassRecord;
use crate::pass::Pass;

/// A function that default-constructs a concrete pass variant
pub type PassConstructor<B> = Arc<dyn Fn() -> Box<dyn Pass<B>>>;

/// Registry mapping serialized type tags to pass constructors
///
/// Deserialization dispatches on the wire format's type tag; this is the one
/// place where tag inspection is inherent. An unrecognized tag degrades to
/// the fallback constructor rather than failing the document.
pub struct PassRegistry<B: RenderBackend> {
    constructors: HashMap<String, PassConstructor<B>>,
    fallback: PassConstructor<B>,
}

impl<B: RenderBackend> PassRegistry<B> {
    /// Create a registry with the given fallback constructor
    pub fn new<F>(fallback: F) -> Self
    where
        F: Fn() -> Box<dyn Pass<B>> + 'static,
    {
        Self {
            constructors: HashMap::new(),
            fallback: Arc::new(fallback),
        }
    }

    /// Register a constructor for a type tag
    pub fn register<F>(&mut self, tag: &str, constructor: F)
    where
        F: Fn() -> Box<dyn Pass<B>> + 'static,
    {
        self.constructors
            .insert(tag.to_string(), Arc::new(constructor));
        debug!(tag = tag, "Registered pass constructor");
    }

    /// Check whether a type tag is registered
    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// All registered type tags
    pub fn registered_tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|s| s.as_str())
    }

    /// Number of registered type tags
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Build a pass from a serialized record
    ///
    /// The record's shared flags always overwrite the fresh pass's state,
    /// regardless of variant; variant parameters are applied afterwards.
    pub fn instantiate(&self, record: &PassRecord) -> Box<dyn Pass<B>> {
        let constructor = match self.constructors.get(&record.type_tag) {
            Some(constructor) => constructor,
            None => {
                warn!(
                    tag = %record.type_tag,
                    "Unknown pass type in pipeline document, using fallback"
                );
                &self.fallback
            }
        };

        let mut pass = constructor();
        *pass.state_mut() = record.state();
        pass.apply_params(&serde_json::Value::Object(record.params.clone()));
        pass
    }
}

impl<B: RenderBackend> std::fmt::Debug for PassRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassRegistry")
            .field(
                "registered_tags",
                &self.constructors.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PassRegistry<crate::graphics::WgpuContext> {
    /// Registry covering every pass variant shipped with the crate
    ///
    /// The fallback is a plain [`RenderPass`](crate::passes::RenderPass).
    pub fn with_standard_passes() -> Self {
        use crate::graphics::WgpuContext;
        use crate::passes::{
            BloomPass, BokehPass, ClearMaskPass, CopyPass, FxaaPass, MaskPass, RenderPass,
            SsaoPass,
        };

        let mut registry =
            Self::new(|| Box::new(RenderPass::new()) as Box<dyn Pass<WgpuContext>>);

        registry.register(RenderPass::TYPE_TAG, || Box::new(RenderPass::new()));
        registry.register(CopyPass::TYPE_TAG, || Box::new(CopyPass::new()));
        registry.register(BloomPass::TYPE_TAG, || Box::new(BloomPass::new()));
        registry.register(SsaoPass::TYPE_TAG, || Box::new(SsaoPass::new()));
        registry.register(BokehPass::TYPE_TAG, || Box::new(BokehPass::new()));
        registry.register(FxaaPass::TYPE_TAG, || Box::new(FxaaPass::new()));
        registry.register(MaskPass::TYPE_TAG, || Box::new(MaskPass::new()));
        registry.register(ClearMaskPass::TYPE_TAG, || Box::new(ClearMaskPass::new()));

        debug!(
            tag_count = registry.len(),
            "Created registry with standard passes"
        );

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::WgpuContext;
    use crate::passes::{BloomPass, RenderPass};
    use uuid::Uuid;

    fn record(tag: &str) -> PassRecord {
        PassRecord {
            type_tag: tag.to_string(),
            uuid: Uuid::new_v4(),
            enabled: false,
            needs_swap: false,
            render_to_screen: true,
            clear: true,
            params: serde_json::Map::new(),
        }
    }

    #[test]
    fn standard_registry_knows_every_shipped_tag() {
        let registry = PassRegistry::with_standard_passes();
        for tag in ["Render", "UnrealBloom", "SSAO", "Bokeh", "FXAA", "Copy", "Mask", "ClearMask"]
        {
            assert!(registry.is_registered(tag), "missing tag {tag}");
        }
        assert!(!registry.is_registered("Foobar"));
    }

    #[test]
    fn instantiate_dispatches_on_tag() {
        let registry = PassRegistry::with_standard_passes();
        let pass = registry.instantiate(&record(BloomPass::TYPE_TAG));
        assert_eq!(pass.type_tag(), BloomPass::TYPE_TAG);
    }

    #[test]
    fn unknown_tag_degrades_to_fallback_with_flags_applied() {
        let registry = PassRegistry::with_standard_passes();
        let rec = record("Foobar");
        let pass = registry.instantiate(&rec);

        assert_eq!(pass.type_tag(), RenderPass::TYPE_TAG);
        // Shared flags come from the record even for the fallback.
        assert_eq!(pass.uuid(), rec.uuid);
        assert!(!pass.enabled());
        assert!(pass.render_to_screen());
    }

    #[test]
    fn instantiate_applies_variant_params() {
        let registry = PassRegistry::with_standard_passes();
        let mut rec = record(BloomPass::TYPE_TAG);
        rec.params
            .insert("strength".to_string(), serde_json::json!(0.25));

        let pass = registry.instantiate(&rec);
        let strength = pass
            .params_json()
            .get("strength")
            .and_then(|v| v.as_f64())
            .unwrap();
        assert!((strength - 0.25).abs() < 1e-6);
    }

    #[test]
    fn registry_reports_registered_tags() {
        let mut registry: PassRegistry<WgpuContext> =
            PassRegistry::new(|| Box::new(RenderPass::new()));
        assert!(registry.is_empty());

        registry.register("Render", || Box::new(RenderPass::new()));
        assert_eq!(registry.len(), 1);
        let tags: Vec<_> = registry.registered_tags().collect();
        assert_eq!(tags, vec!["Render"]);
    }
}
