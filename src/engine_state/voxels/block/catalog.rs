//! # Block Catalog
//!
//! The registry that maps a compact block id to everything the generator and
//! the mesher need to know about that block: per-face textures, solidity,
//! occlusion participation, transparency class, state of matter and the
//! `BlockKind` tag selecting how the block is meshed.
//!
//! The catalog is data-driven. Definitions are read from JSON (a built-in
//! catalog is embedded in the binary), validated once, and then shared
//! immutably behind an `Arc` by every generation and meshing task.
//!
//! ## JSON format
//!
//! ```json
//! { "blocks": [
//!     { "id": 1, "name": "stone", "textures": 1 },
//!     { "id": 3, "name": "grass", "textures": { "top": 3, "bottom": 2, "sides": 4 } },
//!     { "id": 8, "name": "water", "kind": "liquid", "textures": 11 }
//! ] }
//! ```
//!
//! `solid`, `occludes`, `transparency` and `state` are optional and default
//! from the block's `kind`.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{bail, ensure, Context, Result};
use bitvec::prelude::*;
use serde::Deserialize;

use super::{block_side::BlockSide, BlockId, EMPTY};

/// The catalog compiled into the crate.
const BUILTIN_CATALOG: &str = include_str!("blocks.json");

/// Number of addressable block ids.
const ID_SPACE: usize = BlockId::MAX as usize + 1;

/// Selects the meshing behaviour of a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// A full unit cube with six independently culled faces.
    Cube,
    /// A cube that never shows faces against the same liquid.
    Liquid,
    /// Two crossed, double-sided quads (plants). Never occludes anything.
    Cross,
}

/// How much light a block lets through, which decides its draw pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyClass {
    /// Fully opaque, drawn in the opaque pass.
    Opaque,
    /// Binary alpha, drawn in the opaque pass with alpha discard.
    Cutout,
    /// Blended, drawn back-to-front in the alpha pass.
    Translucent,
}

/// Physical state of a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateOfMatter {
    Solid,
    Liquid,
    Gas,
}

/// Texture ids for the six faces of a block, as written in the catalog file.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum FaceTextures {
    Uniform(u16),
    Capped { top: u16, bottom: u16, sides: u16 },
    PerSide([u16; 6]),
}

impl FaceTextures {
    fn resolve(&self) -> [u16; 6] {
        match *self {
            FaceTextures::Uniform(texture) => [texture; 6],
            FaceTextures::Capped { top, bottom, sides } => {
                let mut textures = [sides; 6];
                textures[BlockSide::TOP.index()] = top;
                textures[BlockSide::BOTTOM.index()] = bottom;
                textures
            }
            FaceTextures::PerSide(textures) => textures,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockDefinition {
    id: BlockId,
    name: String,
    #[serde(default = "default_kind")]
    kind: BlockKind,
    textures: FaceTextures,
    solid: Option<bool>,
    occludes: Option<bool>,
    transparency: Option<TransparencyClass>,
    state: Option<StateOfMatter>,
}

fn default_kind() -> BlockKind {
    BlockKind::Cube
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    blocks: Vec<BlockDefinition>,
}

/// Fully resolved properties of one registered block.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockDescriptor {
    pub id: BlockId,
    pub name: String,
    pub kind: BlockKind,
    /// Texture id per face, indexed by `BlockSide::index`.
    pub textures: [u16; 6],
    pub solid: bool,
    /// Whether the block darkens neighbouring vertices through ambient occlusion.
    pub occludes: bool,
    pub transparency: TransparencyClass,
    pub state: StateOfMatter,
}

impl BlockDescriptor {
    fn from_definition(definition: BlockDefinition) -> Self {
        let (solid, occludes, transparency, state) = match definition.kind {
            BlockKind::Cube => (true, true, TransparencyClass::Opaque, StateOfMatter::Solid),
            BlockKind::Liquid => (
                false,
                false,
                TransparencyClass::Translucent,
                StateOfMatter::Liquid,
            ),
            BlockKind::Cross => (false, false, TransparencyClass::Cutout, StateOfMatter::Solid),
        };

        BlockDescriptor {
            id: definition.id,
            name: definition.name,
            kind: definition.kind,
            textures: definition.textures.resolve(),
            solid: definition.solid.unwrap_or(solid),
            occludes: definition.occludes.unwrap_or(occludes),
            transparency: definition.transparency.unwrap_or(transparency),
            state: definition.state.unwrap_or(state),
        }
    }

    /// Whether this block hides every face placed against it.
    pub fn fully_occludes(&self) -> bool {
        self.solid && self.kind == BlockKind::Cube && self.transparency == TransparencyClass::Opaque
    }
}

/// Immutable registry of every block the world can contain.
///
/// Id `0` is reserved for [`EMPTY`] and is never registered.
#[derive(Debug)]
pub struct BlockCatalog {
    descriptors: Vec<Option<BlockDescriptor>>,
    ids_by_name: HashMap<String, BlockId>,
    solid: BitVec,
    occlusion_solid: BitVec,
    fully_occluding: BitVec,
}

impl BlockCatalog {
    /// Builds the catalog embedded in the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG).context("built-in block catalog is invalid")
    }

    /// Reads and validates a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read block catalog {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid block catalog {}", path.display()))
    }

    /// Parses and validates a catalog from its JSON text.
    ///
    /// # Errors
    /// Fails on malformed JSON, a definition using the reserved id `0`, duplicate
    /// ids or names, or a liquid kind whose state of matter is not liquid.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json).context("malformed block catalog")?;
        let descriptors = file
            .blocks
            .into_iter()
            .map(BlockDescriptor::from_definition)
            .collect();
        Self::from_descriptors(descriptors)
    }

    /// Registers already-resolved descriptors.
    pub fn from_descriptors(definitions: Vec<BlockDescriptor>) -> Result<Self> {
        ensure!(!definitions.is_empty(), "block catalog defines no blocks");

        let mut descriptors: Vec<Option<BlockDescriptor>> = vec![None; ID_SPACE];
        let mut ids_by_name = HashMap::new();
        let mut solid = bitvec![0; ID_SPACE];
        let mut occlusion_solid = bitvec![0; ID_SPACE];
        let mut fully_occluding = bitvec![0; ID_SPACE];

        for descriptor in definitions {
            let id = descriptor.id;
            if id == EMPTY {
                bail!("block '{}' uses the reserved empty id 0", descriptor.name);
            }
            ensure!(
                !descriptor.name.is_empty(),
                "block id {} has an empty name",
                id
            );
            if let Some(existing) = &descriptors[id as usize] {
                bail!(
                    "block id {} is registered twice ('{}' and '{}')",
                    id,
                    existing.name,
                    descriptor.name
                );
            }
            if ids_by_name.insert(descriptor.name.clone(), id).is_some() {
                bail!("block name '{}' is registered twice", descriptor.name);
            }
            if descriptor.kind == BlockKind::Liquid {
                ensure!(
                    descriptor.state == StateOfMatter::Liquid,
                    "liquid block '{}' must have a liquid state of matter",
                    descriptor.name
                );
            }

            solid.set(id as usize, descriptor.solid);
            occlusion_solid.set(id as usize, descriptor.occludes);
            fully_occluding.set(id as usize, descriptor.fully_occludes());
            descriptors[id as usize] = Some(descriptor);
        }

        Ok(BlockCatalog {
            descriptors,
            ids_by_name,
            solid,
            occlusion_solid,
            fully_occluding,
        })
    }

    /// Number of registered blocks.
    pub fn len(&self) -> usize {
        self.ids_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids_by_name.is_empty()
    }

    pub fn descriptor(&self, id: BlockId) -> Option<&BlockDescriptor> {
        self.descriptors[id as usize].as_ref()
    }

    pub fn is_registered(&self, id: BlockId) -> bool {
        self.descriptors[id as usize].is_some()
    }

    /// Resolves a block name to its id.
    ///
    /// # Errors
    /// Fails if no block with that name is registered. Generation palettes are
    /// resolved through this at startup, so a typo in configuration is fatal.
    pub fn id(&self, name: &str) -> Result<BlockId> {
        self.ids_by_name
            .get(name)
            .copied()
            .with_context(|| format!("unknown block '{}'", name))
    }

    /// Texture id drawn on `side` of `id`. Unregistered ids map to texture 0.
    pub fn face_texture(&self, id: BlockId, side: BlockSide) -> u16 {
        self.descriptor(id)
            .map(|descriptor| descriptor.textures[side.index()])
            .unwrap_or(0)
    }

    pub fn is_solid(&self, id: BlockId) -> bool {
        self.solid[id as usize]
    }

    pub fn is_occlusion_solid(&self, id: BlockId) -> bool {
        self.occlusion_solid[id as usize]
    }

    /// Transparency class of `id`, or `None` for empty and unregistered ids.
    pub fn transparency_class(&self, id: BlockId) -> Option<TransparencyClass> {
        self.descriptor(id).map(|descriptor| descriptor.transparency)
    }

    /// State of matter of `id`. Empty space is a gas.
    pub fn state_of_matter(&self, id: BlockId) -> StateOfMatter {
        self.descriptor(id)
            .map(|descriptor| descriptor.state)
            .unwrap_or(StateOfMatter::Gas)
    }

    pub fn kind(&self, id: BlockId) -> Option<BlockKind> {
        self.descriptor(id).map(|descriptor| descriptor.kind)
    }

    /// Decides whether the face of `block` that touches `neighbor` is visible.
    ///
    /// A face is hidden only behind a solid, opaque cube, or behind another
    /// block with the same id unless that block is cutout (leaves keep their
    /// inner faces, water and glass do not).
    pub fn should_emit_face(&self, block: BlockId, neighbor: BlockId) -> bool {
        if neighbor == EMPTY {
            return true;
        }
        let Some(neighbor_descriptor) = self.descriptor(neighbor) else {
            return true;
        };
        if neighbor == block {
            return neighbor_descriptor.transparency == TransparencyClass::Cutout;
        }
        !self.fully_occluding[neighbor as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> BlockCatalog {
        BlockCatalog::builtin().unwrap()
    }

    #[test]
    fn builtin_catalog_resolves_names_and_textures() {
        let catalog = catalog();
        let grass = catalog.id("grass").unwrap();

        assert_eq!(catalog.face_texture(grass, BlockSide::TOP), 3);
        assert_eq!(catalog.face_texture(grass, BlockSide::BOTTOM), 2);
        assert_eq!(catalog.face_texture(grass, BlockSide::LEFT), 4);
        assert!(catalog.is_solid(grass));
        assert!(catalog.id("unobtainium").is_err());
    }

    #[test]
    fn kind_defaults_apply_unless_overridden() {
        let catalog = catalog();
        let water = catalog.id("water").unwrap();
        let leaves = catalog.id("leaves").unwrap();
        let glass = catalog.id("glass").unwrap();

        assert!(!catalog.is_solid(water));
        assert_eq!(catalog.state_of_matter(water), StateOfMatter::Liquid);
        assert_eq!(catalog.transparency_class(water), Some(TransparencyClass::Translucent));

        assert!(!catalog.is_solid(leaves));
        assert!(catalog.is_occlusion_solid(leaves));

        assert!(catalog.is_solid(glass));
        assert!(!catalog.is_occlusion_solid(glass));
        assert_eq!(catalog.state_of_matter(EMPTY), StateOfMatter::Gas);
    }

    #[test]
    fn face_rules_follow_transparency() {
        let catalog = catalog();
        let stone = catalog.id("stone").unwrap();
        let dirt = catalog.id("dirt").unwrap();
        let water = catalog.id("water").unwrap();
        let glass = catalog.id("glass").unwrap();
        let leaves = catalog.id("leaves").unwrap();
        let tall_grass = catalog.id("tall_grass").unwrap();

        assert!(!catalog.should_emit_face(stone, stone));
        assert!(!catalog.should_emit_face(stone, dirt));
        assert!(catalog.should_emit_face(stone, EMPTY));
        assert!(catalog.should_emit_face(stone, water));
        assert!(!catalog.should_emit_face(water, water));
        assert!(!catalog.should_emit_face(water, stone));
        assert!(!catalog.should_emit_face(glass, glass));
        assert!(catalog.should_emit_face(stone, glass));
        assert!(catalog.should_emit_face(leaves, leaves));
        assert!(catalog.should_emit_face(stone, tall_grass));
    }

    #[test]
    fn rejects_reserved_and_duplicate_ids() {
        let reserved = r#"{ "blocks": [ { "id": 0, "name": "air", "textures": 0 } ] }"#;
        assert!(BlockCatalog::from_json(reserved).is_err());

        let duplicate = r#"{ "blocks": [
            { "id": 1, "name": "stone", "textures": 1 },
            { "id": 1, "name": "granite", "textures": 2 }
        ] }"#;
        assert!(BlockCatalog::from_json(duplicate).is_err());

        let duplicate_name = r#"{ "blocks": [
            { "id": 1, "name": "stone", "textures": 1 },
            { "id": 2, "name": "stone", "textures": 2 }
        ] }"#;
        assert!(BlockCatalog::from_json(duplicate_name).is_err());
    }

    #[test]
    fn rejects_malformed_catalogs() {
        assert!(BlockCatalog::from_json("{ \"blocks\": 3 }").is_err());
        assert!(BlockCatalog::from_json("{ \"blocks\": [] }").is_err());
        let bad_liquid = r#"{ "blocks": [
            { "id": 1, "name": "lava", "kind": "liquid", "textures": 1, "state": "solid" }
        ] }"#;
        assert!(BlockCatalog::from_json(bad_liquid).is_err());
    }

    #[test]
    fn per_side_textures_follow_side_order() {
        let json = r#"{ "blocks": [ { "id": 4, "name": "dice", "textures": [1, 2, 3, 4, 5, 6] } ] }"#;
        let catalog = BlockCatalog::from_json(json).unwrap();
        assert_eq!(catalog.face_texture(4, BlockSide::FRONT), 1);
        assert_eq!(catalog.face_texture(4, BlockSide::RIGHT), 6);
        assert_eq!(catalog.face_texture(5, BlockSide::RIGHT), 0);
        assert_eq!(catalog.len(), 1);
    }
}
