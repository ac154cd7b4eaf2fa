//! Surface decoration: ore clues, trees and plants.
//!
//! Decoration is the only pass driven by a random stream rather than noise.
//! The stream is seeded from the world seed and the chunk coordinates and is
//! consumed in a fixed column order, so it is as reproducible as the rest of
//! generation.

use fastrand::Rng;

use super::{ColumnSample, Palette, TerrainConfig};
use crate::engine_state::voxels::{
    biome::BiomeMap,
    block::{BlockCatalog, BlockId, StateOfMatter, EMPTY},
    chunk::{Chunk, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
    noise_field::chunk_seed,
};

/// Leaf radius of the two lower canopy rows. The two rows above use radius 1.
const CANOPY_RADIUS: i32 = 2;

pub(super) fn decorate(
    chunk: &mut Chunk,
    columns: &[ColumnSample],
    config: &TerrainConfig,
    palette: &Palette,
    catalog: &BlockCatalog,
    biomes: &BiomeMap,
) {
    let coord = chunk.coord();
    let mut rng = Rng::with_seed(chunk_seed(chunk.seed(), coord.x, coord.z));
    let decoration = &config.decoration;
    let margin = decoration.tree_margin as usize;

    for z in 0..CHUNK_DEPTH {
        for x in 0..CHUNK_WIDTH {
            let column = &columns[z * CHUNK_WIDTH + x];
            let Some(params) = biomes.params(column.biome) else {
                continue;
            };
            let height = column.surface_height as usize;
            if height + 1 >= CHUNK_HEIGHT {
                continue;
            }

            if rng.f64() < decoration.clue_chance {
                place_ore_clue(chunk, x, height, z, decoration.clue_depth as usize, palette);
            }

            let surface = chunk.block(x, height, z);
            let open_above = chunk.block(x, height + 1, z) == EMPTY;
            let above_sea = config
                .sea_level
                .is_none_or(|sea_level| column.surface_height >= sea_level);
            let grounded = catalog.is_solid(surface)
                && catalog.state_of_matter(surface) != StateOfMatter::Liquid;

            let inside_margin = (margin..CHUNK_WIDTH - margin).contains(&x)
                && (margin..CHUNK_DEPTH - margin).contains(&z);
            if rng.f32() < params.tree_density {
                let trunk = rng.u32(decoration.trunk_min..=decoration.trunk_max) as usize;
                if inside_margin && above_sea && grounded && open_above {
                    grow_tree(chunk, x, height, z, trunk, palette);
                    continue;
                }
            }

            if rng.f32() < params.grass_density && surface == palette.plant_soil && open_above {
                chunk.set_block(x, height + 1, z, palette.plant);
            }
        }
    }
}

/// Replaces the surface block with the first ore found within `depth` rows below it.
fn place_ore_clue(chunk: &mut Chunk, x: usize, height: usize, z: usize, depth: usize, palette: &Palette) {
    if chunk.block(x, height, z) == EMPTY {
        return;
    }
    let lowest = height.saturating_sub(depth);
    let ore = (lowest..height)
        .rev()
        .map(|y| chunk.block(x, y, z))
        .find(|block| palette.is_ore(*block));
    if let Some(ore) = ore {
        chunk.set_block(x, height, z, ore);
    }
}

fn grow_tree(chunk: &mut Chunk, x: usize, height: usize, z: usize, trunk: usize, palette: &Palette) {
    let top = height + trunk;
    if top + 2 >= CHUNK_HEIGHT {
        return;
    }

    for y in height + 1..=top {
        let current = chunk.block(x, y, z);
        if current == EMPTY || current == palette.leaves {
            chunk.set_block(x, y, z, palette.log);
        }
    }

    for y in top - 1..=top + 2 {
        let radius = if y <= top { CANOPY_RADIUS } else { 1 };
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                let corner = dx.abs() == radius && dz.abs() == radius;
                if corner && (radius == CANOPY_RADIUS || y == top + 2) {
                    continue;
                }
                place_leaf(chunk, x as i32 + dx, y, z as i32 + dz, palette.leaves);
            }
        }
    }
}

fn place_leaf(chunk: &mut Chunk, x: i32, y: usize, z: i32, leaves: BlockId) {
    if chunk.get_block(x, y as i32, z) == Some(EMPTY) {
        chunk.set_block(x as usize, y, z as usize, leaves);
    }
}

#[cfg(test)]
mod tests {
    use crate::engine_state::voxels::{
        biome::BiomeConfig,
        chunk::{ChunkCoord, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
        generation::{tests::generator_with, TerrainConfig},
    };

    fn forest_generator() -> super::super::TerrainGenerator {
        let mut biomes = BiomeConfig::default();
        biomes.grid = vec![vec!["forest".to_string()]];
        biomes.upsample_resolution = 4;
        if let Some(forest) = biomes.biomes.get_mut("forest") {
            forest.tree_density = 0.2;
            forest.grass_density = 0.3;
        }
        let mut config = TerrainConfig::default();
        config.sea_level = None;
        config.caves.enabled = false;
        generator_with(config, biomes)
    }

    #[test]
    fn trees_stay_inside_the_margin() {
        let generator = forest_generator();
        let log = generator.catalog().id("log").unwrap();
        let chunk = generator.generate(ChunkCoord::new(4, 4)).unwrap();

        let mut trunks = 0;
        for y in 0..CHUNK_HEIGHT {
            for z in 0..CHUNK_DEPTH {
                for x in 0..CHUNK_WIDTH {
                    if chunk.block(x, y, z) == log {
                        assert!((2..CHUNK_WIDTH - 2).contains(&x));
                        assert!((2..CHUNK_DEPTH - 2).contains(&z));
                        trunks += 1;
                    }
                }
            }
        }
        assert!(trunks > 0);
    }

    #[test]
    fn plants_only_grow_on_plant_soil() {
        let generator = forest_generator();
        let catalog = generator.catalog().clone();
        let (plant, soil) = (catalog.id("tall_grass").unwrap(), catalog.id("grass").unwrap());
        let chunk = generator.generate(ChunkCoord::new(-2, 9)).unwrap();

        let mut plants = 0;
        for y in 1..CHUNK_HEIGHT {
            for z in 0..CHUNK_DEPTH {
                for x in 0..CHUNK_WIDTH {
                    if chunk.block(x, y, z) == plant {
                        assert_eq!(chunk.block(x, y - 1, z), soil);
                        plants += 1;
                    }
                }
            }
        }
        assert!(plants > 0);
    }

    #[test]
    fn decoration_is_reproducible_per_chunk() {
        let generator = forest_generator();
        let a = generator.generate(ChunkCoord::new(7, 1)).unwrap();
        let b = generator.generate(ChunkCoord::new(7, 1)).unwrap();
        let swapped = generator.generate(ChunkCoord::new(1, 7)).unwrap();
        assert!(a.blocks() == b.blocks());
        assert!(a.blocks() != swapped.blocks());
    }
}
