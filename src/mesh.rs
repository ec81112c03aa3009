//! GPU-backed UV-sphere.
//!
//! The mesh owns one vertex buffer (positions block then normals block) and
//! one index buffer. Radius edits rewrite the vertex buffer in place; any
//! change to the segment counts reallocates both buffers.

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::geometry::{self, SphereGeometry};
use crate::material::Material;
use crate::render::{BufferUsage, GeometryBinding, GraphicsDevice, VertexLayout};
use crate::shader::ProgramId;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("invalid sphere parameters: radius={radius} longitude={longitude} latitude={latitude}")]
    InvalidParameters {
        radius: f32,
        longitude: u32,
        latitude: u32,
    },
}

fn valid_radius(radius: f32) -> bool {
    radius.is_finite() && radius > 0.0
}

pub struct SphereMesh<D: GraphicsDevice> {
    radius: f32,
    longitude: u32,
    latitude: u32,
    geometry: SphereGeometry,
    vertex_buffer: D::Buffer,
    index_buffer: D::Buffer,
    slots: AttributeSlots,
    layout: VertexLayout,
    material: ProgramId,
}

/// Attribute locations captured from the bound material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttributeSlots {
    position: i32,
    normal: i32,
}

impl AttributeSlots {
    fn of(material: &Material) -> Self {
        Self {
            position: material.position_attribute_slot(),
            normal: material.normal_attribute_slot(),
        }
    }

    /// Positions start at offset zero, normals right after the last position.
    fn layout(self, geometry: &SphereGeometry) -> VertexLayout {
        let mut layout = VertexLayout::new();
        if let Ok(location) = u32::try_from(self.position) {
            layout.push(location, 0);
        }
        if let Ok(location) = u32::try_from(self.normal) {
            layout.push(location, geometry.normals_offset());
        }
        layout
    }
}

impl<D: GraphicsDevice> SphereMesh<D> {
    /// Generates the sphere, uploads it and binds its layout for `material`.
    pub fn new(
        device: &mut D,
        radius: f32,
        longitude: u32,
        latitude: u32,
        material: &Material,
    ) -> Result<Self, MeshError> {
        if !valid_radius(radius) || !geometry::segments_supported(longitude, latitude) {
            return Err(MeshError::InvalidParameters {
                radius,
                longitude,
                latitude,
            });
        }

        let geometry = SphereGeometry::generate(radius, longitude, latitude);
        let (vertex_buffer, index_buffer) = Self::upload(device, &geometry);
        info!(
            "sphere created: radius={radius} longitude={longitude} latitude={latitude} ({} triangles)",
            geometry.triangle_count()
        );
        let slots = AttributeSlots::of(material);
        Ok(Self {
            radius,
            longitude,
            latitude,
            slots,
            layout: slots.layout(&geometry),
            geometry,
            vertex_buffer,
            index_buffer,
            material: material.id(),
        })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn longitude(&self) -> u32 {
        self.longitude
    }

    pub fn latitude(&self) -> u32 {
        self.latitude
    }

    pub fn triangle_count(&self) -> u32 {
        geometry::triangle_count(self.longitude, self.latitude)
    }

    /// Number of indices submitted per draw.
    pub fn index_count(&self) -> u32 {
        3 * self.triangle_count()
    }

    pub fn vertex_count(&self) -> u32 {
        geometry::vertex_count(self.longitude, self.latitude)
    }

    /// CPU-side copy of the uploaded arrays.
    pub fn geometry(&self) -> &SphereGeometry {
        &self.geometry
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn vertex_buffer(&self) -> &D::Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &D::Buffer {
        &self.index_buffer
    }

    /// Program the layout was resolved against.
    pub fn material_id(&self) -> ProgramId {
        self.material
    }

    /// Rescales the sphere. Rejects non-positive radii.
    pub fn set_radius(&mut self, device: &mut D, radius: f32) -> bool {
        if !valid_radius(radius) {
            debug!("sphere: rejecting radius {radius}");
            return false;
        }
        if radius == self.radius {
            return false;
        }
        self.radius = radius;
        let (positions, normals) =
            geometry::generate_vertices(radius, self.longitude, self.latitude);
        self.geometry.positions = positions;
        self.geometry.normals = normals;
        // Topology is unchanged, so the existing allocation is reused.
        device.write_buffer(&self.vertex_buffer, 0, &self.geometry.vertex_bytes());
        true
    }

    /// Changes the number of columns. Rejects zero, unchanged and
    /// overflowing values.
    pub fn set_longitude(&mut self, device: &mut D, longitude: u32) -> bool {
        if longitude == self.longitude || !geometry::segments_supported(longitude, self.latitude) {
            debug!("sphere: ignoring longitude {longitude}");
            return false;
        }
        self.rebuild(device, longitude, self.latitude);
        true
    }

    /// Changes the number of interior rings. Rejects zero, unchanged and
    /// overflowing values.
    pub fn set_latitude(&mut self, device: &mut D, latitude: u32) -> bool {
        if latitude == self.latitude || !geometry::segments_supported(self.longitude, latitude) {
            debug!("sphere: ignoring latitude {latitude}");
            return false;
        }
        self.rebuild(device, self.longitude, latitude);
        true
    }

    /// Rebinds the vertex layout to `material`'s attribute slots and refreshes
    /// the buffer contents.
    pub fn set_material(&mut self, device: &mut D, material: &Material) {
        if !material.is_ready() {
            warn!(
                "sphere: switching to {} in state {:?}",
                material.label(),
                material.state()
            );
        }
        let geometry = SphereGeometry::generate(self.radius, self.longitude, self.latitude);
        let sizes_changed = geometry.vertex_count() != self.geometry.vertex_count()
            || geometry.indices.len() != self.geometry.indices.len();
        self.geometry = geometry;
        if sizes_changed {
            self.reallocate(device);
        } else {
            device.write_buffer(&self.vertex_buffer, 0, &self.geometry.vertex_bytes());
            device.write_buffer(&self.index_buffer, 0, self.geometry.index_bytes());
        }
        self.slots = AttributeSlots::of(material);
        self.layout = self.slots.layout(&self.geometry);
        self.material = material.id();
        debug!(
            "sphere: bound to {} with attribute locations {:?}",
            material.label(),
            self.layout.locations()
        );
    }

    /// Binds `material` and draws the whole sphere.
    ///
    /// `material` must be the one last passed to [`set_material`] (or
    /// [`new`]); otherwise the draw is skipped.
    ///
    /// [`set_material`]: Self::set_material
    /// [`new`]: Self::new
    pub fn render(&self, device: &mut D, material: &Material) {
        if material.id() != self.material {
            error!(
                "sphere: {} is not the material the vertex layout was bound for",
                material.label()
            );
            return;
        }
        material.bind(device);
        device.draw_indexed(
            GeometryBinding {
                vertices: &self.vertex_buffer,
                indices: &self.index_buffer,
                layout: &self.layout,
            },
            self.index_count(),
        );
    }

    fn rebuild(&mut self, device: &mut D, longitude: u32, latitude: u32) {
        self.geometry = SphereGeometry::generate(self.radius, longitude, latitude);
        self.longitude = longitude;
        self.latitude = latitude;
        self.reallocate(device);
        // The normals block moved with the new vertex count.
        self.layout = self.slots.layout(&self.geometry);
    }

    fn reallocate(&mut self, device: &mut D) {
        debug!(
            "sphere: reallocating buffers for {} vertices, {} indices",
            self.geometry.vertex_count(),
            self.geometry.indices.len()
        );
        // Assigning drops the previous buffers.
        let (vertex_buffer, index_buffer) = Self::upload(device, &self.geometry);
        self.vertex_buffer = vertex_buffer;
        self.index_buffer = index_buffer;
    }

    fn upload(device: &mut D, geometry: &SphereGeometry) -> (D::Buffer, D::Buffer) {
        let vertex_bytes = geometry.vertex_bytes();
        let vertex_buffer = device.create_buffer(
            "sphere vertices",
            BufferUsage::Vertex,
            vertex_bytes.len() as u64,
        );
        device.write_buffer(&vertex_buffer, 0, &vertex_bytes);

        let index_bytes = geometry.index_bytes();
        let index_buffer = device.create_buffer(
            "sphere indices",
            BufferUsage::Index,
            index_bytes.len() as u64,
        );
        device.write_buffer(&index_buffer, 0, index_bytes);
        (vertex_buffer, index_buffer)
    }
}
