//! Mesh data structures and the layer mesh builder.
//!
//! The builder walks every block of a layer and emits a quad for each visible
//! face, with per-corner ambient occlusion. Geometry is split by transparency
//! class into an opaque stream (opaque and cutout blocks) and an alpha stream
//! (translucent blocks). When the layer is finished each stream is quantized
//! into [`CompressedVertex`] records and deduplicated into an indexed mesh.

use cgmath::Point3;

use super::{
    face::{Face, FACE_UVS},
    stream::VertexStream,
};
use crate::engine_state::{
    rendering::{
        meshing::{
            ambient_occlusion::{FaceOcclusion, OcclusionNeighborhood},
            dedup::deduplicate_indexed,
        },
        vertex::{CompressedVertex, LayerExtent, Vertex, CROSS_FACE},
    },
    voxels::{
        block::{block_side::BlockSide, BlockCatalog, BlockId, BlockKind, TransparencyClass},
        chunk::{chunk_iteration::SlabBlockIterator, Chunk, CHUNK_DEPTH, CHUNK_WIDTH},
        world::BlockAccess,
    },
};

/// Number of face counters: one per block side plus one for cross quads.
pub const FACE_KINDS: usize = 7;

/// Indexed, quantized geometry ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<CompressedVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Bytes of vertex and index data.
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice()) + std::mem::size_of_val(self.indices.as_slice())
    }
}

/// The generated mesh of one layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerMesh {
    /// Opaque and cutout geometry.
    pub opaque: MeshData,
    /// Translucent geometry, drawn back to front with blending.
    pub alpha: MeshData,
    /// Quads emitted per `BlockSide` index, plus cross quads at index 6.
    pub faces: [usize; FACE_KINDS],
    /// Vertices emitted before deduplication.
    pub emitted_vertices: usize,
}

impl LayerMesh {
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.alpha.is_empty()
    }

    /// Total quads emitted.
    pub fn face_count(&self) -> usize {
        self.faces.iter().sum()
    }

    pub fn faces_on(&self, side: BlockSide) -> usize {
        self.faces[side.index()]
    }

    pub fn byte_size(&self) -> usize {
        self.opaque.byte_size() + self.alpha.byte_size()
    }
}

/// Builds the mesh of one layer.
///
/// Block lookups outside the layer go through `access` in world coordinates,
/// so faces on layer and chunk boundaries are culled against whatever the
/// neighbouring layer or chunk holds.
pub struct MeshBuilder<'a, A: BlockAccess> {
    access: &'a A,
    catalog: &'a BlockCatalog,
    /// World position of the layer's minimum corner.
    origin: Point3<i32>,
    extent: LayerExtent,
    opaque: VertexStream<Vertex>,
    alpha: VertexStream<Vertex>,
    faces: [usize; FACE_KINDS],
}

impl<'a, A: BlockAccess> MeshBuilder<'a, A> {
    pub fn new(access: &'a A, catalog: &'a BlockCatalog, origin: Point3<i32>, layer_height: usize) -> Self {
        MeshBuilder {
            access,
            catalog,
            origin,
            extent: LayerExtent::new(CHUNK_WIDTH, layer_height, CHUNK_DEPTH),
            opaque: VertexStream::new(),
            alpha: VertexStream::new(),
            faces: [0; FACE_KINDS],
        }
    }

    /// Emits the visible geometry of `block` at layer-local position `local`.
    pub fn add_block(&mut self, local: Point3<usize>, block: BlockId) {
        let Some(kind) = self.catalog.kind(block) else {
            return;
        };
        let translucent = self.catalog.transparency_class(block) == Some(TransparencyClass::Translucent);

        match kind {
            BlockKind::Cube | BlockKind::Liquid => self.add_cube(local, block, translucent),
            BlockKind::Cross => self.add_cross(local, block, translucent),
        }
    }

    fn add_cube(&mut self, local: Point3<usize>, block: BlockId, translucent: bool) {
        let world = Point3::new(
            self.origin.x + local.x as i32,
            self.origin.y + local.y as i32,
            self.origin.z + local.z as i32,
        );
        let mut occlusion = OcclusionNeighborhood::new(self.access, self.catalog, world);

        for side in BlockSide::all() {
            let neighbor_position = world + side.normal();
            let neighbor = self.access.block_at(
                neighbor_position.x,
                neighbor_position.y,
                neighbor_position.z,
            );
            if !self.catalog.should_emit_face(block, neighbor) {
                continue;
            }

            let face = Face::new(local.x as f32, local.y as f32, local.z as f32, side);
            let ao = occlusion.face(side);
            let texture = self.catalog.face_texture(block, side);
            self.emit_quad(face.corners(), texture, side.index() as u16, ao, translucent);
            self.faces[side.index()] += 1;
        }
    }

    /// Two double-sided quads along the block's vertical diagonals.
    fn add_cross(&mut self, local: Point3<usize>, block: BlockId, translucent: bool) {
        let (x, y, z) = (local.x as f32, local.y as f32, local.z as f32);
        let texture = self.catalog.face_texture(block, BlockSide::FRONT);
        let diagonals = [
            [
                Point3::new(x, y, z),
                Point3::new(x + 1.0, y, z + 1.0),
                Point3::new(x + 1.0, y + 1.0, z + 1.0),
                Point3::new(x, y + 1.0, z),
            ],
            [
                Point3::new(x + 1.0, y, z),
                Point3::new(x, y, z + 1.0),
                Point3::new(x, y + 1.0, z + 1.0),
                Point3::new(x + 1.0, y + 1.0, z),
            ],
        ];

        for [ll, lr, ur, ul] in diagonals {
            self.emit_quad([ll, lr, ur, ul], texture, CROSS_FACE, FaceOcclusion::none(), translucent);
            self.emit_quad([lr, ll, ul, ur], texture, CROSS_FACE, FaceOcclusion::none(), translucent);
            self.faces[CROSS_FACE as usize] += 2;
        }
    }

    fn emit_quad(
        &mut self,
        corners: [Point3<f32>; 4],
        texture: u16,
        face: u16,
        occlusion: FaceOcclusion,
        translucent: bool,
    ) {
        let intensities = occlusion.intensities();
        let mut vertices = [Vertex {
            position: [0.0; 3],
            uv: [0.0; 2],
            texture,
            ao: 0.0,
            face,
        }; 4];
        for (corner, vertex) in vertices.iter_mut().enumerate() {
            vertex.position = corners[corner].into();
            vertex.uv = FACE_UVS[corner];
            vertex.ao = intensities[corner];
        }

        let stream = if translucent {
            &mut self.alpha
        } else {
            &mut self.opaque
        };
        stream.quad(vertices, occlusion.flip);
    }

    /// Quantizes and deduplicates both streams.
    pub fn finish(self) -> LayerMesh {
        let emitted_vertices = self.opaque.vertices().len() + self.alpha.vertices().len();
        let extent = self.extent;
        let pack = |stream: &VertexStream<Vertex>| {
            let compressed = stream.map(|vertex| vertex.compress(&extent));
            let (vertices, indices) = deduplicate_indexed(compressed.vertices(), compressed.indices());
            MeshData { vertices, indices }
        };

        LayerMesh {
            opaque: pack(&self.opaque),
            alpha: pack(&self.alpha),
            faces: self.faces,
            emitted_vertices,
        }
    }
}

/// Builds the mesh of the layer of `chunk` spanning rows `base_y..base_y + layer_height`.
///
/// # Arguments
/// * `chunk` - The chunk owning the layer
/// * `access` - Block lookups for neighbours, in world coordinates
/// * `catalog` - The block catalog
/// * `base_y` - The layer's lowest row
/// * `layer_height` - Rows per layer
pub fn build_layer_mesh(
    chunk: &Chunk,
    access: &impl BlockAccess,
    catalog: &BlockCatalog,
    base_y: usize,
    layer_height: usize,
) -> LayerMesh {
    let chunk_origin = chunk.world_origin();
    let origin = Point3::new(chunk_origin.x, base_y as i32, chunk_origin.z);
    let mut builder = MeshBuilder::new(access, catalog, origin, layer_height);

    for (position, block) in SlabBlockIterator::new(chunk, base_y, base_y + layer_height) {
        builder.add_block(Point3::new(position.x, position.y - base_y, position.z), block);
    }

    builder.finish()
}
