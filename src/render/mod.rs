//! GPU seam shared by the mesh engine and the materials.
//!
//! Everything that touches the graphics API goes through [`GraphicsDevice`]:
//! buffer allocation and upload, program binding, polygon mode and the
//! indexed draw. The native backend drives wgpu; the headless backend keeps
//! everything in memory and records draws.

pub mod headless;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;

pub use headless::{DrawRecord, HeadlessBuffer, HeadlessDevice};
#[cfg(not(target_arch = "wasm32"))]
pub use native::WgpuDevice;

use serde::{Deserialize, Serialize};

use crate::shader::ShaderProgram;

/// What a buffer is bound as when drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// Rasterization mode for triangles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

/// One three-float attribute stream read from the vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexAttributeBinding {
    /// Shader input location the stream feeds.
    pub location: u32,
    /// Byte offset of the stream's first element inside the vertex buffer.
    pub offset: u64,
}

/// Attribute bindings for a vertex buffer laid out as consecutive blocks of
/// tightly packed `vec3<f32>` elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexLayout {
    attributes: Vec<VertexAttributeBinding>,
}

impl VertexLayout {
    /// Byte stride of every attribute stream.
    pub const STRIDE: u64 = 3 * std::mem::size_of::<f32>() as u64;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, location: u32, offset: u64) {
        self.attributes
            .push(VertexAttributeBinding { location, offset });
    }

    pub fn attributes(&self) -> &[VertexAttributeBinding] {
        &self.attributes
    }

    pub fn locations(&self) -> Vec<u32> {
        self.attributes.iter().map(|attr| attr.location).collect()
    }

    /// Returns the binding feeding `location`, if any.
    pub fn binding(&self, location: u32) -> Option<&VertexAttributeBinding> {
        self.attributes.iter().find(|attr| attr.location == location)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Buffers and layout consumed by a single indexed draw.
pub struct GeometryBinding<'a, B> {
    pub vertices: &'a B,
    pub indices: &'a B,
    pub layout: &'a VertexLayout,
}

/// Graphics API surface used by the core.
///
/// Buffers are owned handles; dropping one releases the GPU allocation.
pub trait GraphicsDevice {
    type Buffer;

    /// Allocates a zero-filled buffer of `size` bytes.
    fn create_buffer(&mut self, label: &str, usage: BufferUsage, size: u64) -> Self::Buffer;

    /// Overwrites `data.len()` bytes of `buffer` starting at `offset`.
    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    /// Makes `program` current and uploads its uniform block.
    fn bind_program(&mut self, program: &ShaderProgram);

    fn set_polygon_mode(&mut self, mode: PolygonMode);

    /// Draws `index_count` indices as a triangle list with the current program.
    fn draw_indexed(&mut self, geometry: GeometryBinding<'_, Self::Buffer>, index_count: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_tracks_bindings_in_order() {
        let mut layout = VertexLayout::new();
        assert!(layout.is_empty());
        layout.push(2, 0);
        layout.push(0, 120);
        assert_eq!(layout.locations(), vec![2, 0]);
        assert_eq!(layout.binding(0).map(|b| b.offset), Some(120));
        assert!(layout.binding(1).is_none());
    }
}
