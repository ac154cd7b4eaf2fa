//! # Biome Module
//!
//! Biomes decide how a column of terrain looks: its height range, how rough it
//! is, how cave-riddled it is, which blocks form its surface skin and how much
//! vegetation grows on it.
//!
//! ## Key Components
//! - `Biome`: the closed set of biome identities
//! - `BiomeParams`: per-biome generation parameters and surface palette
//! - `BiomeConfig`: the serializable configuration (grid + parameters)
//! - `biome_map::BiomeMap`: the validated, immutable lookup built from a `BiomeConfig`

use std::collections::BTreeMap;

use num_derive::FromPrimitive;
use phf::phf_map;
use serde::{Deserialize, Serialize};

pub mod biome_map;

pub use biome_map::{BiomeMap, BiomeSample};

/// Every biome the generator knows about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive)]
#[repr(u8)]
pub enum Biome {
    Plains = 0,
    Forest = 1,
    Desert = 2,
    Mushroom = 3,
    Mountains = 4,
    Tundra = 5,
}

/// Biome names as written in configuration files.
pub static BIOME_NAMES: phf::Map<&'static str, Biome> = phf_map! {
    "plains" => Biome::Plains,
    "forest" => Biome::Forest,
    "desert" => Biome::Desert,
    "mushroom" => Biome::Mushroom,
    "mountains" => Biome::Mountains,
    "tundra" => Biome::Tundra,
};

impl Biome {
    pub fn from_name(name: &str) -> Option<Biome> {
        BIOME_NAMES.get(name).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Biome::Plains => "plains",
            Biome::Forest => "forest",
            Biome::Desert => "desert",
            Biome::Mushroom => "mushroom",
            Biome::Mountains => "mountains",
            Biome::Tundra => "tundra",
        }
    }
}

/// Keys of the numeric parameters that are bilinearly upsampled across the
/// climate grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BiomeParam {
    MinHeight = 0,
    MaxHeight = 1,
    Smoothness = 2,
    CaveDensity = 3,
    CaveFrequency = 4,
}

impl BiomeParam {
    pub const COUNT: usize = 5;

    pub fn all() -> [BiomeParam; BiomeParam::COUNT] {
        [
            BiomeParam::MinHeight,
            BiomeParam::MaxHeight,
            BiomeParam::Smoothness,
            BiomeParam::CaveDensity,
            BiomeParam::CaveFrequency,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Generation parameters of one biome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BiomeParams {
    /// Lowest surface height, in blocks.
    pub min_height: f32,
    /// Highest surface height, in blocks.
    pub max_height: f32,
    /// Horizontal scale of the height noise. Larger is smoother.
    pub smoothness: f32,
    /// 0..1, shifts the cave cutoff. Higher means more caves.
    pub cave_density: f32,
    /// Scale of the 3D cave noise. Larger means wider, rarer tunnels.
    pub cave_frequency: f32,
    /// Per-column chance of a tree.
    #[serde(default)]
    pub tree_density: f32,
    /// Per-column chance of tall grass.
    #[serde(default)]
    pub grass_density: f32,
    /// Block at the surface.
    pub surface: String,
    /// Block under the surface, down to the soil depth.
    pub filler: String,
    /// Surface used where the sub-biome noise selects the alternative skin.
    #[serde(default)]
    pub alt_surface: Option<String>,
    #[serde(default)]
    pub alt_filler: Option<String>,
}

impl BiomeParams {
    /// Reads one of the upsampled numeric parameters.
    pub fn get(&self, param: BiomeParam) -> f32 {
        match param {
            BiomeParam::MinHeight => self.min_height,
            BiomeParam::MaxHeight => self.max_height,
            BiomeParam::Smoothness => self.smoothness,
            BiomeParam::CaveDensity => self.cave_density,
            BiomeParam::CaveFrequency => self.cave_frequency,
        }
    }
}

/// Serializable biome configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BiomeConfig {
    /// Square grid of biome names. Rows go from dry to humid, columns from
    /// cold to hot.
    pub grid: Vec<Vec<String>>,
    /// Parameters keyed by biome name.
    pub biomes: BTreeMap<String, BiomeParams>,
    /// Side length of the upsampled parameter tables.
    pub upsample_resolution: usize,
}

#[allow(clippy::too_many_arguments)]
fn params(
    min_height: f32,
    max_height: f32,
    smoothness: f32,
    cave_density: f32,
    tree_density: f32,
    grass_density: f32,
    surface: &str,
    filler: &str,
    alt: Option<(&str, &str)>,
) -> BiomeParams {
    BiomeParams {
        min_height,
        max_height,
        smoothness,
        cave_density,
        cave_frequency: 24.0,
        tree_density,
        grass_density,
        surface: surface.to_string(),
        filler: filler.to_string(),
        alt_surface: alt.map(|(surface, _)| surface.to_string()),
        alt_filler: alt.map(|(_, filler)| filler.to_string()),
    }
}

impl Default for BiomeConfig {
    fn default() -> Self {
        let grid = [
            ["tundra", "plains", "desert", "desert"],
            ["tundra", "plains", "plains", "desert"],
            ["mountains", "forest", "plains", "mushroom"],
            ["mountains", "forest", "forest", "mushroom"],
        ]
        .iter()
        .map(|row| row.iter().map(|name| name.to_string()).collect())
        .collect();

        let mut biomes = BTreeMap::new();
        biomes.insert(
            "plains".to_string(),
            params(60.0, 72.0, 96.0, 0.5, 0.003, 0.12, "grass", "dirt", Some(("sand", "sand"))),
        );
        biomes.insert(
            "forest".to_string(),
            params(64.0, 80.0, 64.0, 0.5, 0.04, 0.05, "grass", "dirt", None),
        );
        biomes.insert(
            "desert".to_string(),
            params(62.0, 70.0, 128.0, 0.3, 0.0, 0.0, "sand", "sand", Some(("gravel", "sand"))),
        );
        biomes.insert(
            "mushroom".to_string(),
            params(62.0, 76.0, 48.0, 0.7, 0.01, 0.0, "mycelium", "dirt", None),
        );
        biomes.insert(
            "mountains".to_string(),
            params(70.0, 140.0, 48.0, 0.6, 0.002, 0.02, "stone", "stone", Some(("grass", "dirt"))),
        );
        biomes.insert(
            "tundra".to_string(),
            params(62.0, 74.0, 80.0, 0.4, 0.004, 0.0, "snow", "dirt", None),
        );

        BiomeConfig {
            grid,
            biomes,
            upsample_resolution: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn names_round_trip_through_the_static_map() {
        for id in 0..6u8 {
            let biome = Biome::from_u8(id).unwrap();
            assert_eq!(Biome::from_name(biome.name()), Some(biome));
        }
        assert_eq!(Biome::from_u8(6), None);
        assert_eq!(Biome::from_name("swamp"), None);
    }

    #[test]
    fn default_config_covers_every_grid_cell() {
        let config = BiomeConfig::default();
        for row in &config.grid {
            assert_eq!(row.len(), config.grid.len());
            for name in row {
                assert!(config.biomes.contains_key(name), "{name} has no parameters");
            }
        }
    }
}
