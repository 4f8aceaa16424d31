//! Configuration types for the composer library

use std::path::PathBuf;
use tracing::debug;

/// Configuration for where pipeline documents live
///
/// Hosting editors keep named pipeline configurations as JSON files; this
/// maps pipeline names to paths the same way for every tool touching them.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for all editor assets
    pub asset_root: PathBuf,
    /// Directory name for pipeline documents (relative to asset_root)
    pub pipelines_dir: String,
}

impl PipelineConfig {
    /// Create a config with custom paths
    pub fn new(asset_root: PathBuf, pipelines_dir: String) -> Self {
        debug!(
            asset_root = ?asset_root,
            pipelines_dir = pipelines_dir,
            "Creating new PipelineConfig"
        );
        Self {
            asset_root,
            pipelines_dir,
        }
    }

    /// Get the full path to a pipeline document
    pub fn pipeline_path(&self, name: &str) -> PathBuf {
        // Validate name to prevent path traversal attacks
        if name.contains("..") || name.contains('/') || name.contains('\\') {
            panic!("Invalid pipeline name: {name}");
        }
        let path = self
            .asset_root
            .join(&self.pipelines_dir)
            .join(format!("{name}.json"));
        debug!(name = name, path = ?path, "Generated pipeline path");
        path
    }

    /// Check that the pipeline directory exists
    pub fn validate(&self) -> Result<(), std::io::Error> {
        let pipelines_path = self.asset_root.join(&self.pipelines_dir);

        if !self.asset_root.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Asset root directory not found: {:?}", self.asset_root),
            ));
        }

        if !pipelines_path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Pipelines directory not found: {pipelines_path:?}"),
            ));
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            pipelines_dir: "pipelines".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_path() {
        let config = PipelineConfig {
            asset_root: PathBuf::from("editor/assets"),
            pipelines_dir: "pipelines".to_string(),
        };

        let path = config.pipeline_path("default");
        assert_eq!(path, PathBuf::from("editor/assets/pipelines/default.json"));
    }

    #[test]
    #[should_panic(expected = "Invalid pipeline name: ../evil")]
    fn test_rejects_path_traversal_parent() {
        let config = PipelineConfig::default();
        config.pipeline_path("../evil");
    }

    #[test]
    #[should_panic(expected = "Invalid pipeline name: some/path/evil")]
    fn test_rejects_path_traversal_slash() {
        let config = PipelineConfig::default();
        config.pipeline_path("some/path/evil");
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.asset_root, PathBuf::from("assets"));
        assert_eq!(config.pipelines_dir, "pipelines");
    }

    #[test]
    fn test_validate_missing_root() {
        let config = PipelineConfig {
            asset_root: PathBuf::from("definitely/not/here"),
            pipelines_dir: "pipelines".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
