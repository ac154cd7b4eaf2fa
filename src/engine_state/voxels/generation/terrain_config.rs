//! Tunable constants of terrain generation.
//!
//! Every threshold the generator uses is a field here rather than a literal in
//! the algorithm, so worlds can be retuned from the config file. The defaults
//! are the tuned values the built-in biomes were designed around.

use serde::{Deserialize, Serialize};

/// Top-level terrain generation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerrainConfig {
    /// Horizontal scale of the humidity and temperature fields.
    pub climate_scale: f64,
    /// Horizontal scale of the sub-biome selector field.
    pub subbiome_scale: f64,
    /// Normalized sub-biome value above which the alternative skin is used.
    pub subbiome_threshold: f64,
    /// Rows of filler below the surface block.
    pub soil_depth: u32,
    /// Columns below this height are flooded with `liquid`. `None` disables water.
    pub sea_level: Option<i32>,
    pub stone: String,
    pub bedrock: String,
    pub liquid: String,
    /// Surface block of flooded columns.
    pub underwater_surface: String,
    pub caves: CaveConfig,
    pub ores: OreConfig,
    pub bedrock_floor: BedrockConfig,
    pub decoration: DecorationConfig,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        TerrainConfig {
            climate_scale: 640.0,
            subbiome_scale: 90.0,
            subbiome_threshold: 0.68,
            soil_depth: 3,
            sea_level: Some(62),
            stone: "stone".to_string(),
            bedrock: "bedrock".to_string(),
            liquid: "water".to_string(),
            underwater_surface: "sand".to_string(),
            caves: CaveConfig::default(),
            ores: OreConfig::default(),
            bedrock_floor: BedrockConfig::default(),
            decoration: DecorationConfig::default(),
        }
    }
}

/// Cave carving. A block is cleared when the cave noise exceeds a cutoff that
/// blends from `surface_cutoff` to `deep_cutoff` over `blend_depth` blocks
/// below the surface, shifted by the biome's cave density.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaveConfig {
    pub enabled: bool,
    pub surface_cutoff: f64,
    pub deep_cutoff: f64,
    pub blend_depth: f64,
    /// How far a cave density of 0 or 1 moves the cutoff away from neutral.
    pub density_influence: f64,
    /// Vertical stretch of the cave field relative to the horizontal scale.
    pub vertical_scale: f64,
}

impl Default for CaveConfig {
    fn default() -> Self {
        CaveConfig {
            enabled: true,
            surface_cutoff: 0.58,
            deep_cutoff: 0.36,
            blend_depth: 40.0,
            density_influence: 0.24,
            vertical_scale: 0.6,
        }
    }
}

/// Ore veins inside a fixed height band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OreConfig {
    pub enabled: bool,
    pub min_y: u32,
    pub max_y: u32,
    /// Horizontal scale of the 2D field choosing which ore a region holds.
    pub type_scale: f64,
    /// Scale of the 3D vein field.
    pub vein_scale: f64,
    /// Normalized vein value above which stone becomes ore.
    pub threshold: f64,
    /// Ore block names, bucketed in order by the ore-type field.
    pub types: Vec<String>,
}

impl Default for OreConfig {
    fn default() -> Self {
        OreConfig {
            enabled: true,
            min_y: 10,
            max_y: 50,
            type_scale: 48.0,
            vein_scale: 5.0,
            threshold: 0.76,
            types: vec![
                "coal_ore".to_string(),
                "iron_ore".to_string(),
                "gold_ore".to_string(),
                "diamond_ore".to_string(),
            ],
        }
    }
}

/// Jagged bedrock floor: row 0 is always bedrock, rows 1..=3 use one
/// threshold each against offset samples of a bedrock noise field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BedrockConfig {
    pub scale: f64,
    pub thresholds: [f64; 3],
}

impl Default for BedrockConfig {
    fn default() -> Self {
        BedrockConfig {
            scale: 0.37,
            thresholds: [-0.25, 0.1, 0.4],
        }
    }
}

/// Surface decoration run after the main fill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecorationConfig {
    pub enabled: bool,
    /// Per-column chance of revealing a near-surface ore at the surface.
    pub clue_chance: f64,
    /// How far below the surface an ore may sit and still leave a clue.
    pub clue_depth: u32,
    /// Columns this close to the chunk edge never grow trees.
    pub tree_margin: u32,
    pub trunk_min: u32,
    pub trunk_max: u32,
    pub log: String,
    pub leaves: String,
    pub plant: String,
    /// The only surface block plants grow on.
    pub plant_soil: String,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        DecorationConfig {
            enabled: true,
            clue_chance: 0.06,
            clue_depth: 8,
            tree_margin: 2,
            trunk_min: 4,
            trunk_max: 6,
            log: "log".to_string(),
            leaves: "leaves".to_string(),
            plant: "tall_grass".to_string(),
            plant_soil: "grass".to_string(),
        }
    }
}
