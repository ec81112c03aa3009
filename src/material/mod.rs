//! Materials: a shader program plus the attribute slots and uniforms the
//! sphere mesh and the render loop need from it.
//!
//! [`Material`] is a closed set of two variants. Both share the scene-level
//! uniforms (projection, view, view position, lighting model) and expose a
//! position slot; only [`LitMaterial`] consumes normals.

mod basic;
mod library;
mod lit;

pub use basic::BasicMaterial;
pub use library::{BasicParams, LitParams, MaterialLibrary, ShadingMode};
pub use lit::LitMaterial;

use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::GraphicsDevice;
use crate::shader::{ProgramId, ShaderError, ShaderProgram, ShaderStage, UNUSED_ATTRIBUTE};

/// Vertex input carrying positions.
pub const POSITION_ATTRIBUTE: &str = "v_position";
/// Vertex input carrying normals.
pub const NORMAL_ATTRIBUTE: &str = "v_normal";

const PROJECTION_UNIFORM: &str = "projection";
const VIEW_UNIFORM: &str = "view";
const VIEW_POSITION_UNIFORM: &str = "view_position";
const PHONG_UNIFORM: &str = "phong";

/// Default directory holding the bundled WGSL sources.
pub fn default_shader_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders"))
}

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("material is already initialized")]
    AlreadyInitialized,
    #[error("unable to build the material shader")]
    Shader(#[from] ShaderError),
    #[error("unable to find shader location for {attribute}")]
    MissingAttribute { attribute: &'static str },
}

/// Lifecycle of a material. `Failed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialState {
    #[default]
    Uninitialized,
    Ready,
    Failed,
}

/// Shader source files a material compiles, one per stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderSources {
    stages: Vec<(ShaderStage, PathBuf)>,
}

impl ShaderSources {
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            stages: vec![
                (ShaderStage::Vertex, vertex.into()),
                (ShaderStage::Fragment, fragment.into()),
            ],
        }
    }

    /// `<dir>/<name>.vert.wgsl` and `<dir>/<name>.frag.wgsl`.
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join(format!("{name}.vert.wgsl")),
            dir.join(format!("{name}.frag.wgsl")),
        )
    }

    /// Adds an optional stage (tessellation, geometry or compute).
    pub fn with_stage(mut self, stage: ShaderStage, path: impl Into<PathBuf>) -> Self {
        self.stages.push((stage, path.into()));
        self
    }

    pub fn stages(&self) -> &[(ShaderStage, PathBuf)] {
        &self.stages
    }
}

/// Scene-level uniforms shared by every material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneUniforms {
    pub projection: Mat4,
    pub view: Mat4,
    pub view_position: Vec3,
}

impl Default for SceneUniforms {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            view_position: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

/// Program, sources and lifecycle state common to both variants.
#[derive(Debug)]
struct MaterialCore {
    program: ShaderProgram,
    sources: ShaderSources,
    state: MaterialState,
}

impl MaterialCore {
    fn new(label: &str, sources: ShaderSources) -> Self {
        Self {
            program: ShaderProgram::new(label),
            sources,
            state: MaterialState::Uninitialized,
        }
    }

    /// Compiles every configured stage, links, then lets `resolve` look up
    /// the variant's attribute slots. Any failure is terminal.
    fn initialize(
        &mut self,
        resolve: impl FnOnce(&ShaderProgram) -> Result<(), MaterialError>,
    ) -> Result<(), MaterialError> {
        if self.state != MaterialState::Uninitialized {
            return Err(MaterialError::AlreadyInitialized);
        }

        let result = self.build().and_then(|()| resolve(&self.program));
        match &result {
            Ok(()) => {
                self.state = MaterialState::Ready;
                info!("{}: material ready", self.program.label());
            }
            Err(err) => {
                self.state = MaterialState::Failed;
                error!("{}: error when loading shader: {err}", self.program.label());
            }
        }
        result
    }

    fn build(&mut self) -> Result<(), MaterialError> {
        // Every stage is attempted so all compile errors get logged.
        let mut first_error = None;
        for (stage, path) in &self.sources.stages {
            if let Err(err) = self.program.add_shader_from_file(*stage, path) {
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err.into());
        }
        self.program.link()?;
        Ok(())
    }

    fn bind<D: GraphicsDevice>(&self, device: &mut D) {
        if self.state != MaterialState::Ready {
            error!(
                "{}: binding a material in state {:?}",
                self.program.label(),
                self.state
            );
        }
        device.bind_program(&self.program);
    }
}

/// Resolves a required attribute, failing when the program does not use it.
fn require_attribute(program: &ShaderProgram, attribute: &'static str) -> Result<i32, MaterialError> {
    let location = program.attribute_location(attribute);
    if location == UNUSED_ATTRIBUTE {
        return Err(MaterialError::MissingAttribute { attribute });
    }
    Ok(location)
}

/// A material the sphere mesh can be drawn with.
#[derive(Debug)]
pub enum Material {
    Basic(BasicMaterial),
    Lit(LitMaterial),
}

impl Material {
    fn core(&self) -> &MaterialCore {
        match self {
            Self::Basic(material) => &material.core,
            Self::Lit(material) => &material.core,
        }
    }

    fn core_mut(&mut self) -> &mut MaterialCore {
        match self {
            Self::Basic(material) => &mut material.core,
            Self::Lit(material) => &mut material.core,
        }
    }

    /// Identity of the underlying program.
    pub fn id(&self) -> ProgramId {
        self.core().program.id()
    }

    pub fn label(&self) -> &str {
        self.core().program.label()
    }

    pub fn state(&self) -> MaterialState {
        self.core().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == MaterialState::Ready
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.core().program
    }

    pub fn initialize(&mut self) -> Result<(), MaterialError> {
        match self {
            Self::Basic(material) => material.initialize(),
            Self::Lit(material) => material.initialize(),
        }
    }

    /// Activates the program and the variant's raster state.
    pub fn bind<D: GraphicsDevice>(&self, device: &mut D) {
        match self {
            Self::Basic(material) => material.bind(device),
            Self::Lit(material) => material.bind(device),
        }
    }

    pub fn position_attribute_slot(&self) -> i32 {
        match self {
            Self::Basic(material) => material.position_attribute_slot(),
            Self::Lit(material) => material.position_attribute_slot(),
        }
    }

    /// Normal slot, [`UNUSED_ATTRIBUTE`] when the variant ignores normals.
    pub fn normal_attribute_slot(&self) -> i32 {
        match self {
            Self::Basic(material) => material.normal_attribute_slot(),
            Self::Lit(material) => material.normal_attribute_slot(),
        }
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.core_mut().program.set_mat4(PROJECTION_UNIFORM, projection);
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.core_mut().program.set_mat4(VIEW_UNIFORM, view);
    }

    pub fn set_view_position(&mut self, position: Vec3) {
        self.core_mut()
            .program
            .set_vec3(VIEW_POSITION_UNIFORM, position);
    }

    /// `true` selects Phong, `false` Blinn-Phong. Ignored by unlit programs.
    pub fn set_phong(&mut self, phong: bool) {
        self.core_mut().program.set_bool(PHONG_UNIFORM, phong);
    }

    pub fn set_scene_uniforms(&mut self, scene: &SceneUniforms) {
        self.set_projection(scene.projection);
        self.set_view(scene.view);
        self.set_view_position(scene.view_position);
    }

    pub fn as_basic(&self) -> Option<&BasicMaterial> {
        match self {
            Self::Basic(material) => Some(material),
            Self::Lit(_) => None,
        }
    }

    pub fn as_basic_mut(&mut self) -> Option<&mut BasicMaterial> {
        match self {
            Self::Basic(material) => Some(material),
            Self::Lit(_) => None,
        }
    }

    pub fn as_lit(&self) -> Option<&LitMaterial> {
        match self {
            Self::Lit(material) => Some(material),
            Self::Basic(_) => None,
        }
    }

    pub fn as_lit_mut(&mut self) -> Option<&mut LitMaterial> {
        match self {
            Self::Lit(material) => Some(material),
            Self::Basic(_) => None,
        }
    }
}

impl From<BasicMaterial> for Material {
    fn from(material: BasicMaterial) -> Self {
        Self::Basic(material)
    }
}

impl From<LitMaterial> for Material {
    fn from(material: LitMaterial) -> Self {
        Self::Lit(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HeadlessDevice, PolygonMode};

    fn ready_lit() -> Material {
        let mut material = Material::from(LitMaterial::new(ShaderSources::in_dir(
            default_shader_dir(),
            "lit",
        )));
        material.initialize().unwrap();
        material
    }

    fn ready_basic() -> Material {
        let mut material = Material::from(BasicMaterial::new(ShaderSources::in_dir(
            default_shader_dir(),
            "basic",
        )));
        material.initialize().unwrap();
        material
    }

    #[test]
    fn bundled_materials_initialize() {
        let lit = ready_lit();
        assert!(lit.is_ready());
        assert_eq!(lit.position_attribute_slot(), 0);
        assert_eq!(lit.normal_attribute_slot(), 1);

        let basic = ready_basic();
        assert!(basic.is_ready());
        assert_eq!(basic.position_attribute_slot(), 0);
        assert_eq!(basic.normal_attribute_slot(), UNUSED_ATTRIBUTE);
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let mut material = ready_basic();
        let err = material.initialize().unwrap_err();
        assert!(matches!(err, MaterialError::AlreadyInitialized));
        assert_eq!(material.state(), MaterialState::Ready);
    }

    #[test]
    fn missing_sources_leave_material_failed() {
        let mut material = Material::from(BasicMaterial::new(ShaderSources::new(
            "does/not/exist.vert.wgsl",
            "does/not/exist.frag.wgsl",
        )));
        let err = material.initialize().unwrap_err();
        assert!(matches!(err, MaterialError::Shader(ShaderError::Io { .. })));
        assert_eq!(material.state(), MaterialState::Failed);
        assert!(matches!(
            material.initialize(),
            Err(MaterialError::AlreadyInitialized)
        ));
    }

    #[test]
    fn unsupported_optional_stage_fails_initialization() {
        let dir = default_shader_dir();
        let sources = ShaderSources::in_dir(&dir, "basic")
            .with_stage(ShaderStage::Geometry, dir.join("basic.vert.wgsl"));
        let mut material = Material::from(BasicMaterial::new(sources));
        assert!(material.initialize().is_err());
        assert_eq!(material.state(), MaterialState::Failed);
    }

    #[test]
    fn scene_uniforms_reach_the_program() {
        let mut material = ready_lit();
        let scene = SceneUniforms {
            projection: Mat4::from_scale(Vec3::splat(2.0)),
            view: Mat4::IDENTITY,
            view_position: Vec3::new(1.0, 2.0, 3.0),
        };
        material.set_scene_uniforms(&scene);
        material.set_phong(true);

        let block = material.program().uniform_block();
        let data = material.program().uniform_data();
        let offset = block.member("view_position").unwrap().offset as usize;
        let floats: Vec<f32> = data[offset..offset + 12]
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(floats, vec![1.0, 2.0, 3.0]);
        let phong = block.member("phong").unwrap().offset as usize;
        assert_eq!(&data[phong..phong + 4], &1u32.to_ne_bytes());
        assert_eq!(&data[0..4], &2.0f32.to_ne_bytes());
    }

    #[test]
    fn phong_is_ignored_by_unlit_programs() {
        let mut material = ready_basic();
        let before = material.program().uniform_data().to_vec();
        material.set_phong(true);
        assert_eq!(material.program().uniform_data(), before.as_slice());
    }

    #[test]
    fn bind_selects_polygon_mode_per_variant() {
        let mut device = HeadlessDevice::new();
        let mut basic = ready_basic();
        basic.as_basic_mut().unwrap().set_wireframe(true);
        basic.bind(&mut device);
        assert_eq!(device.polygon_mode(), PolygonMode::Line);

        let lit = ready_lit();
        lit.bind(&mut device);
        assert_eq!(device.polygon_mode(), PolygonMode::Fill);
    }

    #[test]
    fn variant_accessors() {
        let mut lit = ready_lit();
        assert!(lit.as_basic().is_none());
        assert!(lit.as_basic_mut().is_none());
        assert!(lit.as_lit_mut().is_some());
        assert!(ready_basic().as_lit().is_none());
    }
}
