//! Parametrized UV-sphere rendering with swappable materials.
//!
//! The crate is split into the procedural sphere ([`geometry`], [`mesh`]),
//! the material layer ([`material`]) built on an in-crate shader service
//! ([`shader`]), and a [`render`] seam that either drives wgpu or records
//! draws in memory. The application glue (settings, camera, input and the
//! per-frame session) sits on top and stays free of windowing code so it
//! can run headless.

pub mod app;
pub mod camera;
pub mod geometry;
pub mod input;
pub mod material;
pub mod mesh;
pub mod render;
pub mod settings;
pub mod shader;

pub use app::{edit_for_key, ParameterEdit, ShadingSession, RADIUS_STEP};
pub use camera::Camera;
pub use geometry::SphereGeometry;
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use material::{
    BasicMaterial, BasicParams, LitMaterial, LitParams, Material, MaterialError,
    MaterialLibrary, MaterialState, SceneUniforms, ShaderSources, ShadingMode,
};
pub use mesh::{MeshError, SphereMesh};
pub use render::{
    BufferUsage, GeometryBinding, GraphicsDevice, HeadlessDevice, PolygonMode, VertexLayout,
};
#[cfg(not(target_arch = "wasm32"))]
pub use render::WgpuDevice;
pub use settings::{parse_lighting_model, Settings, SphereSettings};
pub use shader::{ShaderError, ShaderProgram, ShaderStage, UniformValue, UNUSED_ATTRIBUTE};
