//! A growable vertex/index stream with an offset marker.
//!
//! Callers emit geometry in small batches (one face at a time) using indices
//! relative to the batch. [`VertexStream::mark`] records the running vertex
//! count; every index pushed afterwards is rebased onto that marker, whether
//! it is pushed before or after the batch's vertices.

/// Indexed geometry under construction.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexStream<V> {
    vertices: Vec<V>,
    indices: Vec<u32>,
    offset: u32,
}

impl<V> Default for VertexStream<V> {
    fn default() -> Self {
        VertexStream {
            vertices: Vec::new(),
            indices: Vec::new(),
            offset: 0,
        }
    }
}

impl<V: Copy> VertexStream<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new batch at the current vertex count.
    pub fn mark(&mut self) {
        self.offset = self.vertices.len() as u32;
    }

    /// The current offset marker.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn vertex(&mut self, vertex: V) {
        self.vertices.push(vertex);
    }

    /// Pushes an index relative to the current batch.
    pub fn index(&mut self, index: u32) {
        self.indices.push(self.offset + index);
    }

    /// Emits a quad as one batch: four corners and two triangles.
    ///
    /// The default split runs along the corner 0 to corner 2 diagonal.
    /// `flip` splits along corner 1 to corner 3 instead.
    pub fn quad(&mut self, corners: [V; 4], flip: bool) {
        self.mark();
        let triangles: [u32; 6] = if flip {
            [1, 2, 3, 3, 0, 1]
        } else {
            [0, 1, 2, 2, 3, 0]
        };
        for index in triangles {
            self.index(index);
        }
        for corner in corners {
            self.vertex(corner);
        }
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Expands the stream into an unindexed triangle list.
    pub fn flatten(&self) -> Vec<V> {
        self.indices
            .iter()
            .map(|&index| self.vertices[index as usize])
            .collect()
    }

    /// Applies `f` to every vertex, keeping the indices.
    pub fn map<W: Copy>(&self, f: impl FnMut(&V) -> W) -> VertexStream<W> {
        VertexStream {
            vertices: self.vertices.iter().map(f).collect(),
            indices: self.indices.clone(),
            offset: self.offset,
        }
    }

    pub fn into_parts(self) -> (Vec<V>, Vec<u32>) {
        (self.vertices, self.indices)
    }
}
