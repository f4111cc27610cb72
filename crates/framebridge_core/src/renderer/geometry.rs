//! Screen-covering quad geometry.

use bytemuck::{Pod, Zeroable};

/// Index order of the two triangles of the quad.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Drawable size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl SurfaceSize {
    /// Creates a size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Resolution uniform value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_vec2(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// One vertex: pixel-space position and texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Position in pixels, origin top-left.
    pub position: [f32; 2],
    /// Texture coordinate in `[0, 1]`.
    pub tex_coord: [f32; 2],
}

/// The four corners of the quad.
///
/// Texture coordinates are fixed; only positions depend on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadGeometry {
    /// Corners in index order: top-left, top-right, bottom-left, bottom-right.
    pub vertices: [QuadVertex; 4],
}

impl QuadGeometry {
    /// Quad exactly covering a surface of `size` pixels.
    #[must_use]
    pub fn covering(size: SurfaceSize) -> Self {
        let [w, h] = size.as_vec2();
        Self {
            vertices: [
                QuadVertex { position: [0.0, 0.0], tex_coord: [0.0, 0.0] },
                QuadVertex { position: [w, 0.0], tex_coord: [1.0, 0.0] },
                QuadVertex { position: [0.0, h], tex_coord: [0.0, 1.0] },
                QuadVertex { position: [w, h], tex_coord: [1.0, 1.0] },
            ],
        }
    }

    /// Corner positions.
    #[must_use]
    pub fn positions(&self) -> [[f32; 2]; 4] {
        self.vertices.map(|v| v.position)
    }

    /// Vertex data as bytes for upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_covers_surface() {
        let quad = QuadGeometry::covering(SurfaceSize::new(640, 480));
        assert_eq!(
            quad.positions(),
            [[0.0, 0.0], [640.0, 0.0], [0.0, 480.0], [640.0, 480.0]]
        );
    }

    #[test]
    fn test_tex_coords_are_fixed() {
        let small = QuadGeometry::covering(SurfaceSize::new(1, 1));
        let large = QuadGeometry::covering(SurfaceSize::new(3840, 2160));
        for (a, b) in small.vertices.iter().zip(large.vertices.iter()) {
            assert_eq!(a.tex_coord, b.tex_coord);
        }
    }

    #[test]
    fn test_vertex_bytes_layout() {
        let quad = QuadGeometry::covering(SurfaceSize::new(2, 2));
        assert_eq!(quad.as_bytes().len(), 4 * 16);
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
    }

    #[test]
    fn test_indices_form_two_triangles() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| i < 4));
    }
}
