//! In-memory device used by tests and the `--headless` mode.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{error, trace, warn};

use super::{BufferUsage, GeometryBinding, GraphicsDevice, PolygonMode, VertexAttributeBinding};
use crate::shader::{ProgramId, ShaderProgram};

/// Buffer backed by a byte vector. Dropping it releases the allocation.
#[derive(Debug)]
pub struct HeadlessBuffer {
    id: u64,
    label: String,
    usage: BufferUsage,
    data: RefCell<Vec<u8>>,
    live: Rc<Cell<usize>>,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn size(&self) -> u64 {
        self.data.borrow().len() as u64
    }

    /// Copy of the buffer contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    /// Contents reinterpreted as native-endian `f32` values.
    pub fn read_f32(&self) -> Vec<f32> {
        self.data
            .borrow()
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Contents reinterpreted as native-endian `u32` values.
    pub fn read_u32(&self) -> Vec<u32> {
        self.data
            .borrow()
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

impl Drop for HeadlessBuffer {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Snapshot of the state captured by one indexed draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub polygon_mode: PolygonMode,
    pub vertex_buffer: u64,
    pub index_buffer: u64,
    pub attributes: Vec<VertexAttributeBinding>,
    pub index_count: u32,
    pub uniforms: Vec<u8>,
}

#[derive(Debug)]
struct BoundProgram {
    id: ProgramId,
    uniforms: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_buffer: u64,
    allocations: usize,
    live: Rc<Cell<usize>>,
    program: Option<BoundProgram>,
    polygon_mode: PolygonMode,
    draw_count: usize,
    last_draw: Option<DrawRecord>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffers created over the device lifetime.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Number of buffers that have not been dropped yet.
    pub fn live_buffers(&self) -> usize {
        self.live.get()
    }

    /// Number of draws issued with a linked program bound.
    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    /// Only the most recent draw is kept.
    pub fn last_draw(&self) -> Option<&DrawRecord> {
        self.last_draw.as_ref()
    }

    pub fn polygon_mode(&self) -> PolygonMode {
        self.polygon_mode
    }
}

impl GraphicsDevice for HeadlessDevice {
    type Buffer = HeadlessBuffer;

    fn create_buffer(&mut self, label: &str, usage: BufferUsage, size: u64) -> HeadlessBuffer {
        self.next_buffer += 1;
        self.allocations += 1;
        self.live.set(self.live.get() + 1);
        trace!("headless: creating buffer {label} ({size} bytes)");
        HeadlessBuffer {
            id: self.next_buffer,
            label: label.to_string(),
            usage,
            data: RefCell::new(vec![0; size as usize]),
            live: Rc::clone(&self.live),
        }
    }

    fn write_buffer(&mut self, buffer: &HeadlessBuffer, offset: u64, data: &[u8]) {
        let mut contents = buffer.data.borrow_mut();
        let start = offset as usize;
        match contents.get_mut(start..start + data.len()) {
            Some(target) => target.copy_from_slice(data),
            None => error!(
                "headless: write of {} bytes at {offset} overflows {} ({} bytes)",
                data.len(),
                buffer.label,
                contents.len()
            ),
        }
    }

    fn bind_program(&mut self, program: &ShaderProgram) {
        if !program.is_linked() {
            error!("{}: shader is not properly linked", program.label());
            self.program = None;
            return;
        }
        self.program = Some(BoundProgram {
            id: program.id(),
            uniforms: program.uniform_data().to_vec(),
        });
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.polygon_mode = mode;
    }

    fn draw_indexed(&mut self, geometry: GeometryBinding<'_, HeadlessBuffer>, index_count: u32) {
        let Some(program) = &self.program else {
            warn!("draw issued without a usable program; skipping");
            return;
        };
        if geometry.indices.size() < u64::from(index_count) * 4 {
            warn!(
                "headless: draw of {index_count} indices exceeds {}",
                geometry.indices.label
            );
        }
        self.last_draw = Some(DrawRecord {
            program: program.id,
            polygon_mode: self.polygon_mode,
            vertex_buffer: geometry.vertices.id,
            index_buffer: geometry.indices.id,
            attributes: geometry.layout.attributes().to_vec(),
            index_count,
            uniforms: program.uniforms.clone(),
        });
        self.draw_count += 1;
    }
}
