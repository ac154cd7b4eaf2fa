//! # Block Module
//!
//! Block identifiers, block faces and the data-driven block catalog.
//!
//! Blocks are stored in chunks as a single byte. The byte is meaningless on
//! its own; every property lives in the [`catalog::BlockCatalog`], which is
//! constructed once at startup and passed by reference wherever blocks are
//! interpreted.

pub mod block_side;
pub mod catalog;

pub use catalog::{BlockCatalog, BlockDescriptor, BlockKind, StateOfMatter, TransparencyClass};

/// The compact integer type used to store a block in a chunk.
pub type BlockId = u8;

/// Sentinel for "no block".
pub const EMPTY: BlockId = 0;
