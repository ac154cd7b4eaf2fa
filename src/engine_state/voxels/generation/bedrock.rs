//! Jagged bedrock floor.

use super::{BedrockConfig, Palette};
use crate::engine_state::voxels::{
    chunk::{Chunk, CHUNK_DEPTH, CHUNK_WIDTH},
    noise_field::NoiseField,
};

/// Horizontal offset between the samples of successive rows.
const ROW_OFFSET: f64 = 101.3;

pub(super) fn lay_bedrock(chunk: &mut Chunk, config: &BedrockConfig, field: &NoiseField, palette: &Palette) {
    let origin = chunk.world_origin();

    for z in 0..CHUNK_DEPTH {
        for x in 0..CHUNK_WIDTH {
            chunk.set_block(x, 0, z, palette.bedrock);

            let (wx, wz) = ((origin.x + x as i32) as f64, (origin.z + z as i32) as f64);
            for (row, threshold) in config.thresholds.iter().enumerate() {
                let offset = ROW_OFFSET * (row + 1) as f64;
                let sample = field.noise2(wx * config.scale + offset, wz * config.scale - offset);
                if sample > *threshold {
                    chunk.set_block(x, row + 1, z, palette.bedrock);
                }
            }
        }
    }
}
