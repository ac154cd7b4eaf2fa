//! # Biome Map
//!
//! A climate lookup: (humidity, temperature) → biome, plus a set of
//! bilinearly-upsampled parameter tables so that numeric generation
//! parameters blend smoothly across biome borders instead of stepping.
//!
//! Climate inputs live in `[CLIMATE_MIN, CLIMATE_MAX]`. The strict lookups
//! reject anything outside that range. The `*_clamped` variants are the
//! boundary API for raw noise samples and clamp before delegating.

use anyhow::{bail, ensure, Context, Result};

use super::{Biome, BiomeConfig, BiomeParam, BiomeParams};
use crate::engine_state::voxels::chunk::CHUNK_HEIGHT;

pub const CLIMATE_MIN: f64 = -1.0;
pub const CLIMATE_MAX: f64 = 1.0;

/// One distinct biome present in the grid together with its parameters.
#[derive(Clone, Debug)]
pub struct BiomeEntry {
    pub biome: Biome,
    pub params: BiomeParams,
}

/// The result of a climate lookup.
#[derive(Clone, Copy, Debug)]
pub struct BiomeSample<'a> {
    pub biome: Biome,
    pub params: &'a BiomeParams,
}

/// Immutable biome lookup built once at startup.
#[derive(Clone, Debug)]
pub struct BiomeMap {
    size: usize,
    /// Index into `entries` for every low-resolution grid cell, row-major with
    /// humidity as the row.
    cells: Vec<usize>,
    entries: Vec<BiomeEntry>,
    resolution: usize,
    /// One `resolution × resolution` table per `BiomeParam`.
    upsampled: Vec<Vec<f32>>,
}

impl BiomeMap {
    /// Validates `config` and builds the lookup tables.
    ///
    /// # Errors
    /// Fails when the grid is empty or not square, names an unknown biome or a
    /// biome without parameters, when any parameter is out of range, or when the
    /// upsample resolution is smaller than the grid.
    pub fn new(config: &BiomeConfig) -> Result<Self> {
        let size = config.grid.len();
        ensure!(size > 0, "biome grid is empty");
        ensure!(
            config.upsample_resolution >= size,
            "upsample resolution {} is smaller than the {}x{} biome grid",
            config.upsample_resolution,
            size,
            size
        );

        for name in config.biomes.keys() {
            if Biome::from_name(name).is_none() {
                bail!("parameters given for unknown biome '{}'", name);
            }
        }

        let mut entries: Vec<BiomeEntry> = Vec::new();
        let mut cells = Vec::with_capacity(size * size);

        for (row_index, row) in config.grid.iter().enumerate() {
            ensure!(
                row.len() == size,
                "biome grid row {} has {} cells, expected {}",
                row_index,
                row.len(),
                size
            );
            for name in row {
                let biome = Biome::from_name(name)
                    .with_context(|| format!("biome grid names unknown biome '{}'", name))?;
                let entry_index = match entries.iter().position(|entry| entry.biome == biome) {
                    Some(index) => index,
                    None => {
                        let params = config
                            .biomes
                            .get(name)
                            .with_context(|| format!("biome '{}' has no parameters", name))?;
                        validate_params(name, params)?;
                        entries.push(BiomeEntry {
                            biome,
                            params: params.clone(),
                        });
                        entries.len() - 1
                    }
                };
                cells.push(entry_index);
            }
        }

        let resolution = config.upsample_resolution;
        let upsampled = BiomeParam::all()
            .iter()
            .map(|&param| {
                let low_res: Vec<f32> = cells
                    .iter()
                    .map(|&entry| entries[entry].params.get(param))
                    .collect();
                upsample_bilinear(&low_res, size, resolution)
            })
            .collect();

        Ok(BiomeMap {
            size,
            cells,
            entries,
            resolution,
            upsampled,
        })
    }

    /// Side length of the low-resolution grid.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Side length of the upsampled parameter tables.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Distinct biomes present in the grid.
    pub fn entries(&self) -> &[BiomeEntry] {
        &self.entries
    }

    /// Looks up the biome for a climate sample.
    ///
    /// # Errors
    /// Fails if either input is not finite or lies outside `[CLIMATE_MIN, CLIMATE_MAX]`.
    pub fn biome_at(&self, humidity: f64, temperature: f64) -> Result<Biome> {
        Ok(self.sample(humidity, temperature)?.biome)
    }

    /// Looks up the biome and its parameters for a climate sample.
    pub fn sample(&self, humidity: f64, temperature: f64) -> Result<BiomeSample<'_>> {
        check_climate("humidity", humidity)?;
        check_climate("temperature", temperature)?;
        let row = grid_cell(humidity, self.size);
        let column = grid_cell(temperature, self.size);
        let entry = &self.entries[self.cells[row * self.size + column]];
        Ok(BiomeSample {
            biome: entry.biome,
            params: &entry.params,
        })
    }

    /// Boundary variant of [`BiomeMap::sample`] for raw noise values.
    pub fn sample_clamped(&self, humidity: f64, temperature: f64) -> BiomeSample<'_> {
        let row = grid_cell(clamp_climate(humidity), self.size);
        let column = grid_cell(clamp_climate(temperature), self.size);
        let entry = &self.entries[self.cells[row * self.size + column]];
        BiomeSample {
            biome: entry.biome,
            params: &entry.params,
        }
    }

    /// The unblended parameters of `biome`, if it appears in the grid.
    pub fn params(&self, biome: Biome) -> Option<&BiomeParams> {
        self.entries
            .iter()
            .find(|entry| entry.biome == biome)
            .map(|entry| &entry.params)
    }

    /// The unblended value of `param` for `biome`.
    pub fn parameter(&self, biome: Biome, param: BiomeParam) -> Option<f32> {
        self.params(biome).map(|params| params.get(param))
    }

    /// The blended value of `param` at a climate sample, read bilinearly from
    /// the upsampled table.
    pub fn parameter_at(&self, humidity: f64, temperature: f64, param: BiomeParam) -> Result<f32> {
        check_climate("humidity", humidity)?;
        check_climate("temperature", temperature)?;
        Ok(self.read_upsampled(humidity, temperature, param))
    }

    /// Boundary variant of [`BiomeMap::parameter_at`] for raw noise values.
    pub fn parameter_at_clamped(&self, humidity: f64, temperature: f64, param: BiomeParam) -> f32 {
        self.read_upsampled(clamp_climate(humidity), clamp_climate(temperature), param)
    }

    fn read_upsampled(&self, humidity: f64, temperature: f64, param: BiomeParam) -> f32 {
        let to_table = |value: f64| {
            let normalized = (value - CLIMATE_MIN) / (CLIMATE_MAX - CLIMATE_MIN);
            (normalized * self.resolution as f64 - 0.5) as f32
        };
        sample_bilinear(
            &self.upsampled[param.index()],
            self.resolution,
            to_table(humidity),
            to_table(temperature),
        )
    }
}

fn validate_params(name: &str, params: &BiomeParams) -> Result<()> {
    ensure!(
        params.min_height >= 1.0,
        "biome '{}' min_height {} must be at least 1",
        name,
        params.min_height
    );
    ensure!(
        params.min_height <= params.max_height,
        "biome '{}' min_height {} exceeds max_height {}",
        name,
        params.min_height,
        params.max_height
    );
    ensure!(
        params.max_height < (CHUNK_HEIGHT - 16) as f32,
        "biome '{}' max_height {} leaves no headroom below the world height {}",
        name,
        params.max_height,
        CHUNK_HEIGHT
    );
    ensure!(
        params.smoothness > 0.0 && params.cave_frequency > 0.0,
        "biome '{}' smoothness and cave_frequency must be positive",
        name
    );
    for (label, value) in [
        ("cave_density", params.cave_density),
        ("tree_density", params.tree_density),
        ("grass_density", params.grass_density),
    ] {
        ensure!(
            (0.0..=1.0).contains(&value),
            "biome '{}' {} {} is outside 0..=1",
            name,
            label,
            value
        );
    }
    ensure!(
        params.alt_surface.is_some() == params.alt_filler.is_some(),
        "biome '{}' must set both alt_surface and alt_filler or neither",
        name
    );
    Ok(())
}

fn check_climate(label: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && (CLIMATE_MIN..=CLIMATE_MAX).contains(&value),
        "{} {} is outside [{}, {}]",
        label,
        value,
        CLIMATE_MIN,
        CLIMATE_MAX
    );
    Ok(())
}

fn clamp_climate(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(CLIMATE_MIN, CLIMATE_MAX)
}

fn grid_cell(value: f64, size: usize) -> usize {
    let normalized = (value - CLIMATE_MIN) / (CLIMATE_MAX - CLIMATE_MIN);
    ((normalized * size as f64) as usize).min(size - 1)
}

/// Resamples a `size × size` grid to `resolution × resolution`, treating each
/// value as sitting at its cell centre.
pub fn upsample_bilinear(values: &[f32], size: usize, resolution: usize) -> Vec<f32> {
    let scale = size as f32 / resolution as f32;
    let mut upsampled = Vec::with_capacity(resolution * resolution);
    for row in 0..resolution {
        let u = (row as f32 + 0.5) * scale - 0.5;
        for column in 0..resolution {
            let v = (column as f32 + 0.5) * scale - 0.5;
            upsampled.push(sample_bilinear(values, size, u, v));
        }
    }
    upsampled
}

/// Bilinear read of a square grid at continuous cell coordinates, clamped to
/// the grid edges.
fn sample_bilinear(values: &[f32], size: usize, u: f32, v: f32) -> f32 {
    let max = (size - 1) as f32;
    let u = u.clamp(0.0, max);
    let v = v.clamp(0.0, max);
    let u0 = u.floor() as usize;
    let v0 = v.floor() as usize;
    let u1 = (u0 + 1).min(size - 1);
    let v1 = (v0 + 1).min(size - 1);
    let fu = u - u0 as f32;
    let fv = v - v0 as f32;

    let top = values[u0 * size + v0] * (1.0 - fv) + values[u0 * size + v1] * fv;
    let bottom = values[u1 * size + v0] * (1.0 - fv) + values[u1 * size + v1] * fv;
    top * (1.0 - fu) + bottom * fu
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_biome_config() -> BiomeConfig {
        let mut config = BiomeConfig::default();
        config.grid = vec![
            vec!["desert".to_string(), "forest".to_string()],
            vec!["forest".to_string(), "desert".to_string()],
        ];
        config.upsample_resolution = 8;
        config
    }

    #[test]
    fn corners_map_to_grid_corners() {
        let map = BiomeMap::new(&BiomeConfig::default()).unwrap();
        assert_eq!(map.biome_at(-1.0, -1.0).unwrap(), Biome::Tundra);
        assert_eq!(map.biome_at(-1.0, 1.0).unwrap(), Biome::Desert);
        assert_eq!(map.biome_at(1.0, -1.0).unwrap(), Biome::Mountains);
        assert_eq!(map.biome_at(1.0, 1.0).unwrap(), Biome::Mushroom);
    }

    #[test]
    fn strict_lookup_rejects_out_of_range_climate() {
        let map = BiomeMap::new(&BiomeConfig::default()).unwrap();
        assert!(map.biome_at(1.5, 0.0).is_err());
        assert!(map.biome_at(0.0, f64::NAN).is_err());
        assert!(map.parameter_at(-1.01, 0.0, BiomeParam::MinHeight).is_err());

        let clamped = map.sample_clamped(5.0, 5.0);
        assert_eq!(clamped.biome, Biome::Mushroom);
        assert_eq!(
            map.parameter_at_clamped(5.0, 5.0, BiomeParam::MaxHeight),
            map.parameter_at(1.0, 1.0, BiomeParam::MaxHeight).unwrap()
        );
    }

    #[test]
    fn upsampling_at_native_resolution_is_identity() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(upsample_bilinear(&values, 2, 2), values.to_vec());
    }

    #[test]
    fn upsampling_interpolates_between_cell_centres() {
        let values = [0.0, 4.0, 0.0, 4.0];
        let upsampled = upsample_bilinear(&values, 2, 4);

        let first_row = &upsampled[0..4];
        assert_eq!(first_row[0], 0.0);
        assert_eq!(first_row[1], 1.0);
        assert_eq!(first_row[2], 3.0);
        assert_eq!(first_row[3], 4.0);
        assert_eq!(&upsampled[12..16], first_row);
    }

    #[test]
    fn blended_parameters_stay_within_biome_extremes() {
        let map = BiomeMap::new(&two_biome_config()).unwrap();
        let desert = map.parameter(Biome::Desert, BiomeParam::MaxHeight).unwrap();
        let forest = map.parameter(Biome::Forest, BiomeParam::MaxHeight).unwrap();
        let (low, high) = (desert.min(forest), desert.max(forest));

        for step in 0..=20 {
            let climate = -1.0 + step as f64 * 0.1;
            let value = map.parameter_at(climate, -climate, BiomeParam::MaxHeight).unwrap();
            assert!(value >= low - 1e-4 && value <= high + 1e-4);
        }
    }

    #[test]
    fn invalid_configs_fail_fast() {
        let mut not_square = two_biome_config();
        not_square.grid[1].pop();
        assert!(BiomeMap::new(&not_square).is_err());

        let mut unknown = two_biome_config();
        unknown.grid[0][0] = "swamp".to_string();
        assert!(BiomeMap::new(&unknown).is_err());

        let mut inverted = two_biome_config();
        if let Some(params) = inverted.biomes.get_mut("forest") {
            params.min_height = 90.0;
            params.max_height = 80.0;
        }
        assert!(BiomeMap::new(&inverted).is_err());

        let mut missing = two_biome_config();
        missing.biomes.remove("desert");
        assert!(BiomeMap::new(&missing).is_err());

        let mut coarse = two_biome_config();
        coarse.upsample_resolution = 1;
        assert!(BiomeMap::new(&coarse).is_err());

        assert!(BiomeMap::new(&BiomeConfig {
            grid: Vec::new(),
            ..BiomeConfig::default()
        })
        .is_err());
    }
}
