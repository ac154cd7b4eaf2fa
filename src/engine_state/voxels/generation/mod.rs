//! # Terrain Generation
//!
//! Fills a chunk with terrain, deterministically, from the world seed and the
//! chunk's coordinates.
//!
//! ## Passes
//!
//! 1. **Columns**: sample climate, pick the biome, blend its parameters,
//!    compute the surface height, fill stone, apply the soil skin and flood
//!    columns below sea level.
//! 2. **Ores** (`ores`): inject ore veins into stone within the ore band.
//! 3. **Caves** (`caves`): carve 3D noise tunnels above the bedrock band.
//! 4. **Bedrock** (`bedrock`): solid row 0 plus a jagged floor in rows 1..=3.
//! 5. **Decoration** (`decoration`): ore clues, trees and plants, driven by a
//!    per-chunk random stream seeded from `(seed, chunk_x, chunk_z)`.
//!
//! Every noise field is derived from the world seed with a fixed salt, and the
//! random stream is consumed in a fixed column order, so generating the same
//! chunk twice always yields byte-identical blocks.

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use log::trace;

use super::{
    biome::{Biome, BiomeMap, BiomeParam},
    block::{BlockCatalog, BlockId},
    chunk::{Chunk, ChunkCoord, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
    noise_field::NoiseField,
};

mod bedrock;
mod caves;
mod decoration;
mod ores;
pub mod terrain_config;

pub use terrain_config::{BedrockConfig, CaveConfig, DecorationConfig, OreConfig, TerrainConfig};

/// Rows at the bottom of the world reserved for bedrock. Caves never carve them.
pub const BEDROCK_ROWS: usize = 4;

const SALT_HEIGHT: u64 = 0x4845_4947_4854;
const SALT_HUMIDITY: u64 = 0x4855_4D49_44;
const SALT_TEMPERATURE: u64 = 0x5445_4D50;
const SALT_SUBBIOME: u64 = 0x5355_4242;
const SALT_ORE_TYPE: u64 = 0x4F52_4554;
const SALT_ORE_VEIN: u64 = 0x4F52_4556;
const SALT_CAVE: u64 = 0x4341_5645;
const SALT_BEDROCK: u64 = 0x4245_4452;

/// Everything the generator decided about one world column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnSample {
    pub biome: Biome,
    /// Blended surface bounds for this column, rounded inward to whole blocks.
    pub min_surface: i32,
    pub max_surface: i32,
    pub smoothness: f32,
    pub cave_density: f32,
    pub cave_frequency: f32,
    pub surface_height: i32,
    /// Whether the sub-biome field selected the alternative skin.
    pub alternate_skin: bool,
}

/// Surface skin of one biome, resolved to block ids.
#[derive(Clone, Copy, Debug)]
struct Skin {
    surface: BlockId,
    filler: BlockId,
    alternate: Option<(BlockId, BlockId)>,
}

/// Block ids the generator places, resolved from names once at construction.
#[derive(Clone, Debug)]
pub(crate) struct Palette {
    pub stone: BlockId,
    pub bedrock: BlockId,
    pub liquid: BlockId,
    pub underwater_surface: BlockId,
    pub ores: Vec<BlockId>,
    pub log: BlockId,
    pub leaves: BlockId,
    pub plant: BlockId,
    pub plant_soil: BlockId,
    skins: Vec<(Biome, Skin)>,
}

impl Palette {
    fn resolve(config: &TerrainConfig, biomes: &BiomeMap, catalog: &BlockCatalog) -> Result<Self> {
        let skins = biomes
            .entries()
            .iter()
            .map(|entry| {
                let params = &entry.params;
                let alternate = match (&params.alt_surface, &params.alt_filler) {
                    (Some(surface), Some(filler)) => Some((catalog.id(surface)?, catalog.id(filler)?)),
                    _ => None,
                };
                let skin = Skin {
                    surface: catalog.id(&params.surface)?,
                    filler: catalog.id(&params.filler)?,
                    alternate,
                };
                Ok((entry.biome, skin))
            })
            .collect::<Result<Vec<_>>>()
            .context("biome surface palette names an unknown block")?;

        let ores = config
            .ores
            .types
            .iter()
            .map(|name| catalog.id(name))
            .collect::<Result<Vec<_>>>()
            .context("ore list names an unknown block")?;

        Ok(Palette {
            stone: catalog.id(&config.stone)?,
            bedrock: catalog.id(&config.bedrock)?,
            liquid: catalog.id(&config.liquid)?,
            underwater_surface: catalog.id(&config.underwater_surface)?,
            ores,
            log: catalog.id(&config.decoration.log)?,
            leaves: catalog.id(&config.decoration.leaves)?,
            plant: catalog.id(&config.decoration.plant)?,
            plant_soil: catalog.id(&config.decoration.plant_soil)?,
            skins,
        })
    }

    fn skin(&self, biome: Biome) -> Option<Skin> {
        self.skins
            .iter()
            .find(|(skin_biome, _)| *skin_biome == biome)
            .map(|(_, skin)| *skin)
    }

    pub fn is_ore(&self, block: BlockId) -> bool {
        self.ores.contains(&block)
    }
}

/// The noise fields of one world.
#[derive(Clone, Debug)]
pub(crate) struct TerrainFields {
    pub height: NoiseField,
    pub humidity: NoiseField,
    pub temperature: NoiseField,
    pub subbiome: NoiseField,
    pub ore_type: NoiseField,
    pub ore_vein: NoiseField,
    pub cave: NoiseField,
    pub bedrock: NoiseField,
}

impl TerrainFields {
    fn new(seed: u64) -> Self {
        TerrainFields {
            height: NoiseField::derived(seed, SALT_HEIGHT),
            humidity: NoiseField::derived(seed, SALT_HUMIDITY),
            temperature: NoiseField::derived(seed, SALT_TEMPERATURE),
            subbiome: NoiseField::derived(seed, SALT_SUBBIOME),
            ore_type: NoiseField::derived(seed, SALT_ORE_TYPE),
            ore_vein: NoiseField::derived(seed, SALT_ORE_VEIN),
            cave: NoiseField::derived(seed, SALT_CAVE),
            bedrock: NoiseField::derived(seed, SALT_BEDROCK),
        }
    }
}

/// Deterministic terrain generator for one world seed.
///
/// The generator is immutable after construction and is shared between
/// worker threads behind an `Arc`.
#[derive(Debug)]
pub struct TerrainGenerator {
    seed: u64,
    config: TerrainConfig,
    biomes: BiomeMap,
    catalog: Arc<BlockCatalog>,
    palette: Palette,
    fields: TerrainFields,
}

impl TerrainGenerator {
    /// Creates a generator.
    ///
    /// # Errors
    /// Fails if any block named by `config` or by a biome's surface palette is
    /// not registered in `catalog`, or if the configuration is inconsistent.
    pub fn new(
        seed: u64,
        config: TerrainConfig,
        biomes: BiomeMap,
        catalog: Arc<BlockCatalog>,
    ) -> Result<Self> {
        validate_config(&config)?;
        let palette = Palette::resolve(&config, &biomes, &catalog)?;

        Ok(TerrainGenerator {
            seed,
            config,
            biomes,
            catalog,
            palette,
            fields: TerrainFields::new(seed),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<BlockCatalog> {
        &self.catalog
    }

    pub fn biome_map(&self) -> &BiomeMap {
        &self.biomes
    }

    /// Samples the column at world position `(world_x, world_z)`.
    pub fn column_at(&self, world_x: i32, world_z: i32) -> ColumnSample {
        let (x, z) = (world_x as f64, world_z as f64);
        let climate_scale = self.config.climate_scale;
        let humidity = self.fields.humidity.noise2(x / climate_scale, z / climate_scale);
        let temperature = self
            .fields
            .temperature
            .noise2(x / climate_scale, z / climate_scale);

        let biome = self.biomes.sample_clamped(humidity, temperature).biome;
        let param = |key| self.biomes.parameter_at_clamped(humidity, temperature, key);
        let min_height = param(BiomeParam::MinHeight);
        let max_height = param(BiomeParam::MaxHeight);
        let smoothness = param(BiomeParam::Smoothness) as f64;

        let min_surface = min_height.ceil() as i32;
        let max_surface = (max_height.floor() as i32).max(min_surface);
        let normalized = self.fields.height.normalized2(x / smoothness, z / smoothness);
        let surface_height = ((normalized * (max_surface - min_surface) as f64).floor() as i32
            + min_surface)
            .clamp(min_surface, max_surface);

        let subbiome_scale = self.config.subbiome_scale;
        let alternate_skin = self
            .fields
            .subbiome
            .normalized2(x / subbiome_scale, z / subbiome_scale)
            > self.config.subbiome_threshold;

        ColumnSample {
            biome,
            min_surface,
            max_surface,
            smoothness: smoothness as f32,
            cave_density: param(BiomeParam::CaveDensity),
            cave_frequency: param(BiomeParam::CaveFrequency),
            surface_height,
            alternate_skin,
        }
    }

    /// Generated surface height at a world column.
    pub fn surface_height_at(&self, world_x: i32, world_z: i32) -> i32 {
        self.column_at(world_x, world_z).surface_height
    }

    /// Generates the chunk at `coord`.
    ///
    /// # Errors
    /// Fails if a column's biome has no surface skin or a surface height falls
    /// outside the world. Both indicate a configuration bug, and a partial
    /// chunk is never returned.
    pub fn generate(&self, coord: ChunkCoord) -> Result<Chunk> {
        let mut chunk = Chunk::new(self.seed, coord);
        let origin = coord.world_origin();
        let mut columns = Vec::with_capacity(CHUNK_WIDTH * CHUNK_DEPTH);

        for z in 0..CHUNK_DEPTH {
            for x in 0..CHUNK_WIDTH {
                let column = self.column_at(origin.x + x as i32, origin.z + z as i32);
                self.fill_column(&mut chunk, x, z, &column)?;
                columns.push(column);
            }
        }

        if self.config.ores.enabled {
            ores::inject_ores(&mut chunk, &columns, &self.config, &self.fields, &self.palette);
        }
        if self.config.caves.enabled {
            caves::carve_caves(&mut chunk, &columns, &self.config.caves, &self.fields.cave, &self.catalog);
        }
        bedrock::lay_bedrock(&mut chunk, &self.config.bedrock_floor, &self.fields.bedrock, &self.palette);
        if self.config.decoration.enabled {
            decoration::decorate(
                &mut chunk,
                &columns,
                &self.config,
                &self.palette,
                &self.catalog,
                &self.biomes,
            );
        }

        trace!(
            "Generated chunk {} with {} blocks",
            coord,
            chunk.non_empty_count()
        );
        Ok(chunk)
    }

    fn fill_column(&self, chunk: &mut Chunk, x: usize, z: usize, column: &ColumnSample) -> Result<()> {
        let height = column.surface_height;
        ensure!(
            (0..CHUNK_HEIGHT as i32 - 1).contains(&height),
            "surface height {} at column ({}, {}) of chunk {} is outside the world",
            height,
            x,
            z,
            chunk.coord()
        );
        let skin = self
            .palette
            .skin(column.biome)
            .with_context(|| format!("biome {} has no surface skin", column.biome.name()))?;

        let (mut surface, filler) = match (column.alternate_skin, skin.alternate) {
            (true, Some(alternate)) => alternate,
            _ => (skin.surface, skin.filler),
        };

        let flooded = self.config.sea_level.is_some_and(|sea_level| height < sea_level);
        if flooded {
            surface = self.palette.underwater_surface;
        }

        let height = height as usize;
        let soil_top = height.saturating_sub(self.config.soil_depth as usize);
        for y in 0..=height {
            let block = if y == height {
                surface
            } else if y >= soil_top {
                filler
            } else {
                self.palette.stone
            };
            chunk.set_block(x, y, z, block);
        }

        if let Some(sea_level) = self.config.sea_level {
            let top = (sea_level as usize).min(CHUNK_HEIGHT - 1);
            for y in (height + 1)..=top {
                chunk.set_block(x, y, z, self.palette.liquid);
            }
        }

        chunk.set_surface_height(x, z, height as i32);
        chunk.set_biome(x, z, column.biome);
        Ok(())
    }
}

fn validate_config(config: &TerrainConfig) -> Result<()> {
    ensure!(
        config.climate_scale > 0.0 && config.subbiome_scale > 0.0,
        "climate_scale and subbiome_scale must be positive"
    );
    ensure!(
        config.ores.min_y <= config.ores.max_y && (config.ores.max_y as usize) < CHUNK_HEIGHT,
        "ore band {}..={} is invalid",
        config.ores.min_y,
        config.ores.max_y
    );
    ensure!(
        !config.ores.enabled || !config.ores.types.is_empty(),
        "ores are enabled but no ore types are configured"
    );
    ensure!(config.ores.vein_scale > 0.0 && config.ores.type_scale > 0.0, "ore scales must be positive");
    ensure!(
        config.caves.blend_depth > 0.0 && config.caves.vertical_scale > 0.0,
        "cave blend_depth and vertical_scale must be positive"
    );
    ensure!(
        config.decoration.trunk_min >= 1 && config.decoration.trunk_min <= config.decoration.trunk_max,
        "trunk height range {}..={} is invalid",
        config.decoration.trunk_min,
        config.decoration.trunk_max
    );
    ensure!(
        (config.decoration.tree_margin as usize) * 2 < CHUNK_WIDTH.min(CHUNK_DEPTH),
        "tree margin {} leaves no room for trees",
        config.decoration.tree_margin
    );
    if let Some(sea_level) = config.sea_level {
        ensure!(
            (1..CHUNK_HEIGHT as i32).contains(&sea_level),
            "sea level {} is outside the world",
            sea_level
        );
    }
    Ok(())
}
