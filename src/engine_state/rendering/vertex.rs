//! Vertex data structures and layouts for voxel rendering.
//!
//! Meshing produces full-precision [`Vertex`] records. Before upload they are
//! quantized into [`CompressedVertex`], a 16-byte record whose lanes map
//! directly onto GPU-native normalized short-integer attribute formats.
//!
//! # Quantization
//! - Position: unsigned fraction of the layer's local extents (`u16`)
//! - UV: signed fraction of [`MAX_TEXTURE_REPEAT`] (`i16`, `Snorm16`)
//! - Ambient occlusion: unsigned fraction (`u16`)
//! - Texture id and face: raw integers

use cgmath::Vector3;

/// Largest UV coordinate a vertex can carry. Quads may repeat their texture up
/// to this many times.
pub const MAX_TEXTURE_REPEAT: f32 = 16.0;

/// Face index carried by cross-shaped foliage quads.
pub const CROSS_FACE: u16 = 6;

const UNORM16_MAX: f32 = u16::MAX as f32;
const SNORM16_MAX: f32 = i16::MAX as f32;

/// A full-precision mesh vertex in layer-local space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    /// Position relative to the layer's origin.
    pub position: [f32; 3],
    /// Texture coordinates, in texture repeats.
    pub uv: [f32; 2],
    /// Block-catalog texture id.
    pub texture: u16,
    /// Darkening factor from ambient occlusion, in `[0, 1]`.
    pub ao: f32,
    /// `BlockSide` index of the face, or [`CROSS_FACE`].
    pub face: u16,
}

/// A quantized vertex as stored in GPU vertex buffers.
///
/// # Memory Layout
/// - `position`: 3x u16 (6 bytes)
/// - `face`: u16 (2 bytes)
/// - `uv`: 2x i16 (4 bytes)
/// - `texture`: u16 (2 bytes)
/// - `ao`: u16 (2 bytes)
///
/// Total size: 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompressedVertex {
    pub position: [u16; 3],
    pub face: u16,
    pub uv: [i16; 2],
    pub texture: u16,
    pub ao: u16,
}

/// Local extents of a layer, the range position quantization covers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LayerExtent(pub Vector3<f32>);

impl LayerExtent {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        LayerExtent(Vector3::new(width as f32, height as f32, depth as f32))
    }

    /// Size of one position quantization step along each axis.
    pub fn step(&self) -> Vector3<f32> {
        self.0 / UNORM16_MAX
    }
}

fn quantize_unorm(value: f32, range: f32) -> u16 {
    ((value / range).clamp(0.0, 1.0) * UNORM16_MAX).round() as u16
}

fn quantize_snorm(value: f32, range: f32) -> i16 {
    ((value / range).clamp(-1.0, 1.0) * SNORM16_MAX).round() as i16
}

impl Vertex {
    /// Quantizes the vertex for a layer of the given extents.
    pub fn compress(&self, extent: &LayerExtent) -> CompressedVertex {
        CompressedVertex {
            position: [
                quantize_unorm(self.position[0], extent.0.x),
                quantize_unorm(self.position[1], extent.0.y),
                quantize_unorm(self.position[2], extent.0.z),
            ],
            face: self.face,
            uv: [
                quantize_snorm(self.uv[0], MAX_TEXTURE_REPEAT),
                quantize_snorm(self.uv[1], MAX_TEXTURE_REPEAT),
            ],
            texture: self.texture,
            ao: quantize_unorm(self.ao, 1.0),
        }
    }
}

impl CompressedVertex {
    /// Reconstructs an approximate full-precision vertex.
    pub fn decompress(&self, extent: &LayerExtent) -> Vertex {
        Vertex {
            position: [
                self.position[0] as f32 / UNORM16_MAX * extent.0.x,
                self.position[1] as f32 / UNORM16_MAX * extent.0.y,
                self.position[2] as f32 / UNORM16_MAX * extent.0.z,
            ],
            uv: [
                self.uv[0] as f32 / SNORM16_MAX * MAX_TEXTURE_REPEAT,
                self.uv[1] as f32 / SNORM16_MAX * MAX_TEXTURE_REPEAT,
            ],
            texture: self.texture,
            ao: self.ao as f32 / UNORM16_MAX,
            face: self.face,
        }
    }

    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position and face (vec4<u32>, Uint16x4), scaled back in the shader
    /// - `location = 1`: uv (vec2<f32>, Snorm16x2)
    /// - `location = 2`: texture and ao (vec2<u32>, Uint16x2)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Uint16x4,
            },
            wgpu::VertexAttribute {
                offset: std::mem::size_of::<[u16; 4]>() as wgpu::BufferAddress,
                shader_location: 1,
                format: wgpu::VertexFormat::Snorm16x2,
            },
            wgpu::VertexAttribute {
                offset: std::mem::size_of::<[u16; 6]>() as wgpu::BufferAddress,
                shader_location: 2,
                format: wgpu::VertexFormat::Uint16x2,
            },
        ];

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CompressedVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent() -> LayerExtent {
        LayerExtent::new(32, 32, 32)
    }

    #[test]
    fn compressed_vertex_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<CompressedVertex>(), 16);
        assert_eq!(CompressedVertex::desc().array_stride, 16);
    }

    #[test]
    fn position_round_trip_stays_within_one_step() {
        let extent = extent();
        let step = extent.step();
        for i in 0..=400 {
            let t = i as f32 / 400.0;
            let vertex = Vertex {
                position: [t * 32.0, (1.0 - t) * 32.0, (t * 7.3).fract() * 32.0],
                uv: [t, 1.0 - t],
                texture: 9,
                ao: t * 0.45,
                face: 3,
            };
            let restored = vertex.compress(&extent).decompress(&extent);
            assert!((restored.position[0] - vertex.position[0]).abs() <= step.x);
            assert!((restored.position[1] - vertex.position[1]).abs() <= step.y);
            assert!((restored.position[2] - vertex.position[2]).abs() <= step.z);
            assert!((restored.uv[0] - vertex.uv[0]).abs() <= MAX_TEXTURE_REPEAT / SNORM16_MAX);
            assert!((restored.ao - vertex.ao).abs() <= 1.0 / UNORM16_MAX);
            assert_eq!(restored.texture, 9);
            assert_eq!(restored.face, 3);
        }
    }

    #[test]
    fn extremes_map_to_the_ends_of_the_range() {
        let extent = extent();
        let vertex = Vertex {
            position: [0.0, 32.0, 32.0],
            uv: [-MAX_TEXTURE_REPEAT, MAX_TEXTURE_REPEAT],
            texture: u16::MAX,
            ao: 1.0,
            face: 0,
        };
        let compressed = vertex.compress(&extent);
        assert_eq!(compressed.position, [0, u16::MAX, u16::MAX]);
        assert_eq!(compressed.uv, [-i16::MAX, i16::MAX]);
        assert_eq!(compressed.ao, u16::MAX);
        assert_eq!(compressed.texture, u16::MAX);
    }
}
