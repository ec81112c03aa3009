//! UV-sphere tessellation.
//!
//! A sphere with `longitude` columns and `latitude` interior rings has
//! `longitude * latitude` ring vertices followed by the south and north pole
//! vertices. Rings are ordered from south to north.

use std::f32::consts::PI;

use glam::Vec3;

/// Number of triangles in a sphere: two per band quad plus one per cap wedge
/// at each pole.
pub const fn triangle_count(longitude: u32, latitude: u32) -> u32 {
    longitude * (latitude - 1) * 2 + 2 * longitude
}

/// Number of vertices in a sphere: the interior rings plus both poles.
pub const fn vertex_count(longitude: u32, latitude: u32) -> u32 {
    longitude * latitude + 2
}

/// [`triangle_count`] that returns `None` instead of overflowing. The index
/// count (three per triangle) must also fit a `u32`.
pub fn checked_triangle_count(longitude: u32, latitude: u32) -> Option<u32> {
    let bands = longitude.checked_mul(latitude.checked_sub(1)?)?.checked_mul(2)?;
    let triangles = bands.checked_add(longitude.checked_mul(2)?)?;
    triangles.checked_mul(3)?;
    Some(triangles)
}

/// [`vertex_count`] that returns `None` instead of overflowing.
pub fn checked_vertex_count(longitude: u32, latitude: u32) -> Option<u32> {
    longitude.checked_mul(latitude)?.checked_add(2)
}

/// Whether a sphere with these segment counts can be generated: both counts
/// are at least one, every count fits a `u32` and both byte arrays fit in
/// memory addressing.
pub fn segments_supported(longitude: u32, latitude: u32) -> bool {
    if longitude < 1 || latitude < 1 {
        return false;
    }
    let (Some(vertices), Some(triangles)) = (
        checked_vertex_count(longitude, latitude),
        checked_triangle_count(longitude, latitude),
    ) else {
        return false;
    };
    let vertex_bytes = u64::from(vertices) * 2 * std::mem::size_of::<Vec3>() as u64;
    let index_bytes = u64::from(triangles) * 3 * std::mem::size_of::<u32>() as u64;
    usize::try_from(vertex_bytes).is_ok() && usize::try_from(index_bytes).is_ok()
}

/// CPU-side sphere arrays. `positions` and `normals` always have equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SphereGeometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl SphereGeometry {
    /// Generates vertices and indices. Callers guarantee `radius > 0`,
    /// `longitude >= 1` and `latitude >= 1`.
    pub fn generate(radius: f32, longitude: u32, latitude: u32) -> Self {
        let (positions, normals) = generate_vertices(radius, longitude, latitude);
        Self {
            positions,
            normals,
            indices: generate_indices(longitude, latitude),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Byte offset of the normals block inside [`vertex_bytes`].
    ///
    /// [`vertex_bytes`]: Self::vertex_bytes
    pub fn normals_offset(&self) -> u64 {
        (self.positions.len() * std::mem::size_of::<Vec3>()) as u64
    }

    /// Positions block followed by the normals block, tightly packed.
    pub fn vertex_bytes(&self) -> Vec<u8> {
        debug_assert_eq!(self.positions.len(), self.normals.len());
        let mut bytes = Vec::with_capacity(self.normals_offset() as usize * 2);
        bytes.extend_from_slice(bytemuck::cast_slice(&self.positions));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.normals));
        bytes
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Ring vertices followed by the south and north poles.
pub fn generate_vertices(radius: f32, longitude: u32, latitude: u32) -> (Vec<Vec3>, Vec<Vec3>) {
    let count = vertex_count(longitude, latitude) as usize;
    let mut positions = Vec::with_capacity(count);
    let mut normals = Vec::with_capacity(count);

    let theta_step = 2.0 * PI / longitude as f32;
    let phi_step = PI / (latitude + 1) as f32;

    for row in 0..latitude {
        // Phi sweeps from the south pole towards the north pole.
        let phi = PI - (row + 1) as f32 * phi_step;
        for col in 0..longitude {
            let theta = col as f32 * theta_step;
            let position = radius
                * Vec3::new(theta.sin() * phi.sin(), phi.cos(), theta.cos() * phi.sin());
            positions.push(position);
            // Centered at the origin, so the normal is the normalized position.
            normals.push(position.normalize());
        }
    }

    positions.push(Vec3::new(0.0, -radius, 0.0));
    normals.push(Vec3::NEG_Y);
    positions.push(Vec3::new(0.0, radius, 0.0));
    normals.push(Vec3::Y);

    (positions, normals)
}

/// Triangle list covering the bands between rings and both pole caps.
pub fn generate_indices(longitude: u32, latitude: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity(triangle_count(longitude, latitude) as usize * 3);
    let wrap = |row_start: u32, col: u32| {
        if col + 1 < longitude {
            row_start + col + 1
        } else {
            row_start
        }
    };

    for row in 0..latitude.saturating_sub(1) {
        let row_start = row * longitude;
        let next_row_start = row_start + longitude;
        for col in 0..longitude {
            let v = row_start + col;
            let vi = wrap(row_start, col);
            let vj = next_row_start + col;
            let vji = wrap(next_row_start, col);
            indices.extend_from_slice(&[v, vi, vj, vi, vji, vj]);
        }
    }

    let south = longitude * latitude;
    let north = south + 1;
    let last_row_start = (latitude - 1) * longitude;
    for col in 0..longitude {
        indices.extend_from_slice(&[south, wrap(0, col), col]);
        indices.extend_from_slice(&[north, last_row_start + col, wrap(last_row_start, col)]);
    }

    indices
}
