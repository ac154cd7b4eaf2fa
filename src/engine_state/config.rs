//! # Engine Configuration
//!
//! The JSON document an [`EngineState`](super::EngineState) is built from.
//! Every field has a default, so `{}` is a complete configuration:
//!
//! ```json
//! {
//!     "catalog_path": "blocks.json",
//!     "terrain": { "sea_level": 60 },
//!     "biomes": { "upsample_resolution": 32 },
//!     "streaming": { "seed": 7, "view_distance": 4, "workers": 2 }
//! }
//! ```
//!
//! The configuration is validated once, when the engine is created, and is
//! immutable afterwards.

use std::{fs, path::Path, path::PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use web_time::Duration;

use super::{
    rendering::pipeline::PipelineConfig,
    voxels::{biome::BiomeConfig, chunk::CHUNK_HEIGHT, generation::terrain_config::TerrainConfig},
};

/// Chunk streaming, worker and per-frame budget settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    /// World seed shared by every noise field.
    pub seed: u64,
    /// Chebyshev radius, in chunks, of the ring kept generated around the observer.
    pub view_distance: u32,
    /// Extra chunks retained beyond `view_distance` before eviction.
    pub retain_margin: u32,
    /// Worker threads for generation and meshing. Zero runs tasks inline.
    pub workers: usize,
    /// Mesh dispatch time per pass, in milliseconds.
    ///
    /// With `workers > 0` this bounds how long a pass spends publishing mesh
    /// tasks, not the meshing itself, which runs on the pool. Layers whose
    /// mesh is in flight are skipped until it lands.
    pub generation_budget_ms: f64,
    /// GPU upload time per pass, in milliseconds.
    pub upload_budget_ms: f64,
    /// Rows per chunk layer.
    pub layer_height: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            seed: 0,
            view_distance: 6,
            retain_margin: 2,
            workers: 4,
            generation_budget_ms: 1000.0 / 90.0,
            upload_budget_ms: 1000.0 / 240.0,
            layer_height: 32,
        }
    }
}

impl StreamingConfig {
    /// The per-pass limits of the layer pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            view_distance: self.view_distance,
            generation_budget: Duration::from_secs_f64(self.generation_budget_ms / 1000.0),
            upload_budget: Duration::from_secs_f64(self.upload_budget_ms / 1000.0),
        }
    }
}

/// The complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Block catalog file. The built-in catalog is used when absent.
    pub catalog_path: Option<PathBuf>,
    pub terrain: TerrainConfig,
    pub biomes: BiomeConfig,
    pub streaming: StreamingConfig,
}

impl EngineConfig {
    /// Reads a configuration file.
    ///
    /// A relative `catalog_path` is resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_json(&json).with_context(|| format!("invalid config {}", path.display()))?;

        if let (Some(catalog), Some(dir)) = (config.catalog_path.as_mut(), path.parent()) {
            if catalog.is_relative() {
                *catalog = dir.join(&*catalog);
            }
        }
        Ok(config)
    }

    /// Parses and validates a configuration from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json).context("malformed engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that are not validated by the subsystems themselves.
    pub fn validate(&self) -> Result<()> {
        let streaming = &self.streaming;
        ensure!(
            streaming.layer_height >= 1 && streaming.layer_height <= CHUNK_HEIGHT,
            "layer_height {} must be between 1 and {}",
            streaming.layer_height,
            CHUNK_HEIGHT
        );
        ensure!(streaming.view_distance >= 1, "view_distance must be at least 1");
        ensure!(
            streaming.generation_budget_ms.is_finite()
                && streaming.generation_budget_ms >= 0.0
                && streaming.upload_budget_ms.is_finite()
                && streaming.upload_budget_ms >= 0.0,
            "frame budgets must be finite and non-negative"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default_config() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.streaming.layer_height, 32);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn sections_are_merged_with_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "streaming": { "seed": 9, "workers": 0, "upload_budget_ms": 0 } }"#)
                .unwrap();
        assert_eq!(config.streaming.seed, 9);
        assert_eq!(config.streaming.workers, 0);
        assert_eq!(config.streaming.view_distance, 6);

        let pipeline = config.streaming.pipeline_config();
        assert_eq!(pipeline.upload_budget, Duration::ZERO);
        assert!(pipeline.generation_budget > Duration::from_millis(11));
        assert!(pipeline.generation_budget < Duration::from_millis(12));
    }

    #[test]
    fn invalid_settings_fail_fast() {
        assert!(EngineConfig::from_json(r#"{ "streaming": { "layer_height": 0 } }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "streaming": { "layer_height": 1000 } }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "streaming": { "generation_budget_ms": -1 } }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "unknown": 1 }"#).is_err());
        assert!(EngineConfig::from_json("not json").is_err());
    }
}
