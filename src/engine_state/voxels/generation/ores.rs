//! Ore veins.
//!
//! A 2D field picks which ore a region holds, a 3D field decides where veins
//! run. Only stone inside the configured band and below the soil is replaced.

use super::{ColumnSample, Palette, TerrainConfig, TerrainFields};
use crate::engine_state::voxels::chunk::{Chunk, CHUNK_DEPTH, CHUNK_WIDTH};

pub(super) fn inject_ores(
    chunk: &mut Chunk,
    columns: &[ColumnSample],
    config: &TerrainConfig,
    fields: &TerrainFields,
    palette: &Palette,
) {
    let ores = &config.ores;
    if palette.ores.is_empty() {
        return;
    }
    let origin = chunk.world_origin();

    for z in 0..CHUNK_DEPTH {
        for x in 0..CHUNK_WIDTH {
            let column = &columns[z * CHUNK_WIDTH + x];
            let (wx, wz) = ((origin.x + x as i32) as f64, (origin.z + z as i32) as f64);

            let selector = fields
                .ore_type
                .normalized2(wx / ores.type_scale, wz / ores.type_scale);
            let bucket = ((selector * palette.ores.len() as f64) as usize).min(palette.ores.len() - 1);
            let ore = palette.ores[bucket];

            let soil_floor = column.surface_height - config.soil_depth as i32;
            let top = (ores.max_y as i32).min(soil_floor - 1);
            for y in ores.min_y as i32..=top {
                let y = y as usize;
                if chunk.block(x, y, z) != palette.stone {
                    continue;
                }
                let vein = fields.ore_vein.noise3(
                    wx / ores.vein_scale,
                    y as f64 / ores.vein_scale,
                    wz / ores.vein_scale,
                );
                if (vein + 1.0) * 0.5 > ores.threshold {
                    chunk.set_block(x, y, z, ore);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine_state::voxels::{
        biome::BiomeConfig,
        chunk::{ChunkCoord, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
        generation::{tests::generator_with, TerrainConfig},
    };

    #[test]
    fn ores_only_appear_inside_the_band() {
        let mut config = TerrainConfig::default();
        config.caves.enabled = false;
        config.decoration.enabled = false;
        let generator = generator_with(config.clone(), BiomeConfig::default());
        let catalog = generator.catalog().clone();
        let ore_ids: Vec<_> = config
            .ores
            .types
            .iter()
            .map(|name| catalog.id(name).unwrap())
            .collect();

        let mut found = 0;
        for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(3, -4)] {
            let chunk = generator.generate(coord).unwrap();
            for y in 0..CHUNK_HEIGHT {
                for z in 0..CHUNK_DEPTH {
                    for x in 0..CHUNK_WIDTH {
                        if ore_ids.contains(&chunk.block(x, y, z)) {
                            assert!((10..=50).contains(&y), "ore at row {y}");
                            found += 1;
                        }
                    }
                }
            }
        }
        assert!(found > 0);
    }
}
