use crate::render::frame::Vertex;

pub const VERTICES_PER_QUAD: usize = 4;
pub const INDICES_PER_QUAD: usize = 6;
/// Largest batch a `u16` index buffer can address.
pub const MAX_VERTEX_CAPACITY: usize = u16::MAX as usize + 1;

/// Fixed-capacity vertex accumulator for textured quads.
///
/// Quads are drawn as one triangle strip; each quad's first and last vertex
/// are repeated so consecutive quads are joined by degenerate triangles.
pub struct VertexBatch {
    vertices: Vec<Vertex>,
    capacity: usize,
}

impl VertexBatch {
    /// `capacity` is rounded down to whole quads (at least one) and clamped to
    /// what 16-bit indices can reach.
    pub fn new(capacity: usize) -> Self {
        if capacity > MAX_VERTEX_CAPACITY {
            log::warn!("vertex capacity {} clamped to {}", capacity, MAX_VERTEX_CAPACITY);
        }
        let capacity = capacity.min(MAX_VERTEX_CAPACITY);
        let capacity = (capacity / VERTICES_PER_QUAD * VERTICES_PER_QUAD).max(VERTICES_PER_QUAD);
        Self { vertices: Vec::with_capacity(capacity), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn has_room_for_quad(&self) -> bool {
        self.vertices.len() + VERTICES_PER_QUAD <= self.capacity
    }

    /// Appends one quad. The caller flushes first when there is no room.
    pub fn push_quad(&mut self, quad: [Vertex; 4]) {
        debug_assert!(self.has_room_for_quad());
        self.vertices.extend_from_slice(&quad);
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Strip indices consumed by the queued quads.
    pub fn element_count(&self) -> usize {
        self.vertices.len() / VERTICES_PER_QUAD * INDICES_PER_QUAD
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Static strip index pattern `[i, i, i+1, i+2, i+3, i+3]` per quad.
    pub fn quad_indices(vertex_capacity: usize) -> Vec<u16> {
        let quads = vertex_capacity.min(MAX_VERTEX_CAPACITY) / VERTICES_PER_QUAD;
        let mut indices = Vec::with_capacity(quads * INDICES_PER_QUAD);
        for q in 0..quads {
            let i = (q * VERTICES_PER_QUAD) as u16;
            indices.extend_from_slice(&[i, i, i + 1, i + 2, i + 3, i + 3]);
        }
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::Rgba;

    fn quad(tag: f32) -> [Vertex; 4] {
        [Vertex::new(tag, 0.0, 0.0, 0.0, Rgba::WHITE); 4]
    }

    #[test]
    fn capacity_rounds_to_whole_quads() {
        assert_eq!(VertexBatch::new(10).capacity(), 8);
        assert_eq!(VertexBatch::new(0).capacity(), 4);
    }

    #[test]
    fn room_check_tracks_capacity() {
        let mut batch = VertexBatch::new(8);
        batch.push_quad(quad(0.0));
        assert!(batch.has_room_for_quad());
        batch.push_quad(quad(1.0));
        assert!(!batch.has_room_for_quad());
        assert_eq!(batch.element_count(), 12);
        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn strip_indices_repeat_quad_ends() {
        let indices = VertexBatch::quad_indices(8);
        assert_eq!(indices, vec![0, 0, 1, 2, 3, 3, 4, 4, 5, 6, 7, 7]);
        assert_eq!(VertexBatch::quad_indices(65536).last(), Some(&65535));
    }

    #[test]
    fn oversized_capacity_is_clamped_to_u16_indices() {
        let batch = VertexBatch::new(70_000);
        assert_eq!(batch.capacity(), MAX_VERTEX_CAPACITY);
        let indices = VertexBatch::quad_indices(70_000);
        assert_eq!(indices.len(), MAX_VERTEX_CAPACITY / VERTICES_PER_QUAD * INDICES_PER_QUAD);
        assert_eq!(indices.last(), Some(&u16::MAX));
        // No wrap back to zero past the first quad.
        assert!(indices[6..].iter().all(|&i| i >= 4));
    }
}
