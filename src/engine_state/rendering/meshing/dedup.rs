//! Structural vertex deduplication.
//!
//! Vertices are merged only when their records are bitwise identical. Each
//! unique record gets a dense index in first-seen order, and the triangle list
//! is rewritten to reference the unique array.

use std::collections::HashMap;
use std::hash::Hash;

/// Deduplicates an unindexed triangle list.
///
/// # Returns
/// The unique vertices in first-seen order and one index per input vertex.
pub fn deduplicate<V: Copy + Eq + Hash>(flat: &[V]) -> (Vec<V>, Vec<u32>) {
    let mut unique = Vec::new();
    let mut seen: HashMap<V, u32> = HashMap::with_capacity(flat.len());
    let indices: Vec<u32> = flat
        .iter()
        .map(|vertex| {
            *seen.entry(*vertex).or_insert_with(|| {
                unique.push(*vertex);
                unique.len() as u32 - 1
            })
        })
        .collect();
    (unique, indices)
}

/// Deduplicates an indexed mesh, as if it were first expanded to a triangle list.
///
/// Vertices no index refers to are dropped.
pub fn deduplicate_indexed<V: Copy + Eq + Hash>(vertices: &[V], indices: &[u32]) -> (Vec<V>, Vec<u32>) {
    let flat: Vec<V> = indices.iter().map(|&index| vertices[index as usize]).collect();
    deduplicate(&flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::vertex::CompressedVertex;

    fn vertex(x: u16, ao: u16) -> CompressedVertex {
        CompressedVertex {
            position: [x, 0, 0],
            face: 3,
            uv: [0, 0],
            texture: 1,
            ao,
        }
    }

    #[test]
    fn identical_records_share_an_index_in_first_seen_order() {
        let flat = [vertex(5, 0), vertex(1, 0), vertex(5, 0), vertex(2, 0), vertex(1, 0)];
        let (unique, indices) = deduplicate(&flat);
        assert_eq!(unique, vec![vertex(5, 0), vertex(1, 0), vertex(2, 0)]);
        assert_eq!(indices, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn one_bit_differences_are_never_merged() {
        let flat = [vertex(7, 100), vertex(7, 101), vertex(8, 100)];
        let (unique, _) = deduplicate(&flat);
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn deduplicating_twice_is_a_no_op() {
        let vertices = [vertex(0, 0), vertex(1, 0), vertex(0, 0), vertex(2, 9), vertex(1, 0), vertex(3, 0)];
        let indices = [0, 1, 2, 2, 3, 0, 4, 5, 1];
        let (once_vertices, once_indices) = deduplicate_indexed(&vertices, &indices);
        let (twice_vertices, twice_indices) = deduplicate_indexed(&once_vertices, &once_indices);
        assert_eq!(once_vertices, twice_vertices);
        assert_eq!(once_indices, twice_indices);
        assert_eq!(once_vertices.len(), 4);
    }
}
