//! # Voxel Terrain Entry Point
//!
//! Runs the headless terrain driver from the library's `run()` function.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- config.json
//! ```

fn main() -> anyhow::Result<()> {
    voxel_terrain::run()
}
