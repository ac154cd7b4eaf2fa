//! Cave carving.
//!
//! Blocks are cleared where 3D noise rises above a cutoff. The cutoff is high
//! near the surface and drops with depth, so caves rarely breach the surface
//! but riddle the deep stone. A biome's cave density shifts the cutoff down
//! (denser) or up (sparser).

use super::{CaveConfig, ColumnSample, BEDROCK_ROWS};
use crate::engine_state::voxels::{
    block::{BlockCatalog, StateOfMatter, EMPTY},
    chunk::{Chunk, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
    noise_field::NoiseField,
};

/// Noise cutoff at `depth` blocks below the surface for a biome of the given density.
pub(super) fn cave_cutoff(config: &CaveConfig, depth: f64, density: f64) -> f64 {
    let blend = (depth / config.blend_depth).clamp(0.0, 1.0);
    let base = config.surface_cutoff + (config.deep_cutoff - config.surface_cutoff) * blend;
    base + (0.5 - density) * config.density_influence
}

pub(super) fn carve_caves(
    chunk: &mut Chunk,
    columns: &[ColumnSample],
    config: &CaveConfig,
    field: &NoiseField,
    catalog: &BlockCatalog,
) {
    let origin = chunk.world_origin();
    let is_liquid = |block| catalog.state_of_matter(block) == StateOfMatter::Liquid;

    for z in 0..CHUNK_DEPTH {
        for x in 0..CHUNK_WIDTH {
            let column = &columns[z * CHUNK_WIDTH + x];
            let frequency = column.cave_frequency as f64;
            let (wx, wz) = ((origin.x + x as i32) as f64, (origin.z + z as i32) as f64);
            let top = (column.surface_height as usize).min(CHUNK_HEIGHT - 2);

            for y in BEDROCK_ROWS..=top {
                let block = chunk.block(x, y, z);
                if block == EMPTY || is_liquid(block) || is_liquid(chunk.block(x, y + 1, z)) {
                    continue;
                }
                let depth = (column.surface_height - y as i32) as f64;
                let cutoff = cave_cutoff(config, depth, column.cave_density as f64);
                let sample = field.noise3(
                    wx / frequency,
                    y as f64 / (frequency * config.vertical_scale),
                    wz / frequency,
                );
                if sample > cutoff {
                    chunk.set_block(x, y, z, EMPTY);
                }
            }
        }
    }
}
