//! Shader program service: compiles WGSL stages, links them into a program,
//! answers attribute-location queries and stages named uniform writes.
//!
//! Programs are plain CPU-side objects. A [`GraphicsDevice`] turns them into
//! GPU modules and pipelines the first time they are bound.
//!
//! [`GraphicsDevice`]: crate::render::GraphicsDevice

mod reflect;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::bytes_of;
use glam::{Mat3, Mat4, Vec3, Vec4};
use log::{error, trace, warn};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use reflect::{UniformBlock, UniformKind, UniformMember, UNIFORM_BINDING, UNIFORM_GROUP};

/// Location reported for attributes the program does not consume.
pub const UNUSED_ATTRIBUTE: i32 = -1;

/// Pipeline stage a shader source is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    TessControl,
    TessEvaluation,
    Geometry,
    Compute,
}

impl ShaderStage {
    fn naga_stage(self) -> Option<naga::ShaderStage> {
        match self {
            Self::Vertex => Some(naga::ShaderStage::Vertex),
            Self::Fragment => Some(naga::ShaderStage::Fragment),
            Self::TessControl | Self::TessEvaluation | Self::Geometry | Self::Compute => None,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::TessControl => "tessellation control",
            Self::TessEvaluation => "tessellation evaluation",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
        })
    }
}

/// Errors raised while compiling or linking a [`ShaderProgram`].
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("unable to read shader source {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} shader {name} failed to compile:\n{message}")]
    Compile {
        stage: ShaderStage,
        name: String,
        message: String,
    },
    #[error("{stage} shader {name} does not define a {stage} entry point")]
    MissingEntryPoint { stage: ShaderStage, name: String },
    #[error("{0} shaders are not supported by the render pipeline")]
    UnsupportedStage(ShaderStage),
    #[error("a {0} shader is already attached")]
    DuplicateStage(ShaderStage),
    #[error("program has no {0} shader attached")]
    MissingStage(ShaderStage),
    #[error("uniform block of the {stage} shader does not match the other stages")]
    UniformMismatch { stage: ShaderStage },
    #[error("program is already linked")]
    AlreadyLinked,
}

/// Process-unique identity of a shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

impl ProgramId {
    fn next() -> Self {
        Self(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Typed value accepted by [`ShaderProgram::set_uniform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    fn fits(&self, kind: UniformKind) -> bool {
        matches!(
            (self, kind),
            (Self::Bool(_) | Self::Int(_), UniformKind::Int)
                | (Self::Float(_), UniformKind::Float)
                | (Self::Vec3(_), UniformKind::Vec3)
                | (Self::Vec4(_), UniformKind::Vec4)
                | (Self::Mat3(_), UniformKind::Mat3)
                | (Self::Mat4(_), UniformKind::Mat4)
        )
    }

    /// Host bytes in uniform address space layout.
    fn to_bytes(self) -> Vec<u8> {
        match self {
            Self::Bool(value) => bytes_of(&u32::from(value)).to_vec(),
            Self::Int(value) => bytes_of(&value).to_vec(),
            Self::Float(value) => bytes_of(&value).to_vec(),
            Self::Vec3(value) => bytes_of(&value.to_array()).to_vec(),
            Self::Vec4(value) => bytes_of(&value.to_array()).to_vec(),
            Self::Mat3(value) => bytes_of(&mat3_to_3x4(value)).to_vec(),
            Self::Mat4(value) => bytes_of(&value.to_cols_array_2d()).to_vec(),
        }
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

/// A successfully compiled and validated stage.
#[derive(Debug)]
pub struct CompiledStage {
    stage: ShaderStage,
    name: String,
    source: String,
    entry_point: String,
    module: naga::Module,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Identifier of the source (usually its path).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Groups shader stages into a program and exposes named attributes and uniforms.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    label: String,
    stages: Vec<CompiledStage>,
    linked: bool,
    attributes: HashMap<String, u32>,
    uniforms: UniformBlock,
    uniform_data: Vec<u8>,
}

impl ShaderProgram {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: ProgramId::next(),
            label: label.into(),
            stages: Vec::new(),
            linked: false,
            attributes: HashMap::new(),
            uniforms: UniformBlock::default(),
            uniform_data: Vec::new(),
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Reads `path` and attaches it as the given stage.
    pub fn add_shader_from_file(
        &mut self,
        stage: ShaderStage,
        path: impl AsRef<Path>,
    ) -> Result<(), ShaderError> {
        let path = path.as_ref();
        let result = fs::read_to_string(path)
            .map_err(|source| ShaderError::Io {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|source| self.attach(stage, path.display().to_string(), source));
        if let Err(err) = &result {
            error!("{}: {err}", self.label);
        }
        result
    }

    /// Compiles `source` in memory and attaches it as the given stage.
    pub fn add_shader_from_source(
        &mut self,
        stage: ShaderStage,
        name: &str,
        source: &str,
    ) -> Result<(), ShaderError> {
        let result = self.attach(stage, name.to_string(), source.to_string());
        if let Err(err) = &result {
            error!("{}: {err}", self.label);
        }
        result
    }

    fn attach(
        &mut self,
        stage: ShaderStage,
        name: String,
        source: String,
    ) -> Result<(), ShaderError> {
        if self.linked {
            return Err(ShaderError::AlreadyLinked);
        }
        let naga_stage = stage
            .naga_stage()
            .ok_or(ShaderError::UnsupportedStage(stage))?;
        if self.stage(stage).is_some() {
            return Err(ShaderError::DuplicateStage(stage));
        }

        let module =
            naga::front::wgsl::parse_str(&source).map_err(|err| ShaderError::Compile {
                stage,
                name: name.clone(),
                message: err.emit_to_string(&source),
            })?;
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|err| ShaderError::Compile {
                stage,
                name: name.clone(),
                message: err.emit_to_string(&source),
            })?;

        let entry_point = module
            .entry_points
            .iter()
            .find(|entry| entry.stage == naga_stage)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| ShaderError::MissingEntryPoint {
                stage,
                name: name.clone(),
            })?;

        self.stages.push(CompiledStage {
            stage,
            name,
            source,
            entry_point,
            module,
        });
        Ok(())
    }

    /// Links the attached stages, resolving attributes and the uniform block.
    pub fn link(&mut self) -> Result<(), ShaderError> {
        let result = self.try_link();
        if let Err(err) = &result {
            error!("{}: program linking failed: {err}", self.label);
        }
        self.linked = result.is_ok();
        result
    }

    fn try_link(&mut self) -> Result<(), ShaderError> {
        if self.linked {
            return Err(ShaderError::AlreadyLinked);
        }
        let vertex = self
            .stage(ShaderStage::Vertex)
            .ok_or(ShaderError::MissingStage(ShaderStage::Vertex))?;
        self.stage(ShaderStage::Fragment)
            .ok_or(ShaderError::MissingStage(ShaderStage::Fragment))?;

        let attributes = vertex
            .module
            .entry_points
            .iter()
            .find(|entry| entry.name == vertex.entry_point)
            .map(|entry| reflect::vertex_inputs(&vertex.module, entry))
            .unwrap_or_default();

        let mut uniforms: Option<UniformBlock> = None;
        for stage in &self.stages {
            let Some(block) = reflect::uniform_block(&stage.module) else {
                continue;
            };
            match &uniforms {
                Some(existing) if *existing != block => {
                    return Err(ShaderError::UniformMismatch { stage: stage.stage });
                }
                Some(_) => {}
                None => uniforms = Some(block),
            }
        }

        let uniforms = uniforms.unwrap_or_default();
        self.uniform_data = vec![0; uniforms.size as usize];
        self.uniforms = uniforms;
        self.attributes = attributes.into_iter().collect();
        Ok(())
    }

    /// Returns the attached stage of the given kind.
    pub fn stage(&self, stage: ShaderStage) -> Option<&CompiledStage> {
        self.stages.iter().find(|compiled| compiled.stage == stage)
    }

    /// Location of a named vertex input, or [`UNUSED_ATTRIBUTE`].
    pub fn attribute_location(&self, name: &str) -> i32 {
        if !self.linked {
            return UNUSED_ATTRIBUTE;
        }
        self.attributes
            .get(name)
            .and_then(|location| i32::try_from(*location).ok())
            .unwrap_or(UNUSED_ATTRIBUTE)
    }

    /// Writes `value` into the named uniform block member.
    ///
    /// Unknown names are ignored, like a write to uniform location -1.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let Some(member) = self.uniforms.member(name) else {
            trace!("{}: no uniform named {name}", self.label);
            return;
        };
        if !value.fits(member.kind) {
            warn!(
                "{}: uniform {name} is {:?}, ignoring {value:?}",
                self.label, member.kind
            );
            return;
        }
        let bytes = value.to_bytes();
        let start = member.offset as usize;
        if let Some(target) = self.uniform_data.get_mut(start..start + bytes.len()) {
            target.copy_from_slice(&bytes);
        }
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set_uniform(name, UniformValue::Bool(value));
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Int(value));
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.set_uniform(name, UniformValue::Vec3(value));
    }

    pub fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.set_uniform(name, UniformValue::Vec4(value));
    }

    pub fn set_mat3(&mut self, name: &str, value: Mat3) {
        self.set_uniform(name, UniformValue::Mat3(value));
    }

    pub fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.set_uniform(name, UniformValue::Mat4(value));
    }

    /// Reflected uniform block layout (empty before linking).
    pub fn uniform_block(&self) -> &UniformBlock {
        &self.uniforms
    }

    /// Current host image of the uniform block.
    pub fn uniform_data(&self) -> &[u8] {
        &self.uniform_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    color: vec3<f32>,
    flag: u32,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@vertex
fn vs_main(@location(0) v_position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return uniforms.projection * vec4<f32>(v_position, 1.0);
}
"#;

    const FRAGMENT: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    color: vec3<f32>,
    flag: u32,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(uniforms.color, 1.0);
}
"#;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn linked_program() -> ShaderProgram {
        let mut program = ShaderProgram::new("test");
        program
            .add_shader_from_source(ShaderStage::Vertex, "test.vert", VERTEX)
            .unwrap();
        program
            .add_shader_from_source(ShaderStage::Fragment, "test.frag", FRAGMENT)
            .unwrap();
        program.link().unwrap();
        program
    }

    #[test]
    fn linking_resolves_attribute_locations() {
        let program = linked_program();
        assert!(program.is_linked());
        assert_eq!(program.attribute_location("v_position"), 0);
        assert_eq!(program.attribute_location("v_normal"), UNUSED_ATTRIBUTE);
    }

    #[test]
    fn attributes_are_unknown_before_linking() {
        let mut program = ShaderProgram::new("test");
        program
            .add_shader_from_source(ShaderStage::Vertex, "test.vert", VERTEX)
            .unwrap();
        assert_eq!(program.attribute_location("v_position"), UNUSED_ATTRIBUTE);
    }

    #[test]
    fn uniform_writes_land_at_reflected_offsets() {
        let mut program = linked_program();
        program.set_vec3("color", Vec3::new(1.0, 2.0, 3.0));
        program.set_bool("flag", true);
        let data = program.uniform_data();
        assert_eq!(data.len(), 80);
        assert_eq!(floats(&data[64..76]), vec![1.0, 2.0, 3.0]);
        assert_eq!(&data[76..80], &1u32.to_ne_bytes());
    }

    #[test]
    fn mistyped_or_unknown_uniforms_are_ignored() {
        let mut program = linked_program();
        program.set_float("color", 4.0);
        program.set_vec3("missing", Vec3::ONE);
        assert!(program.uniform_data().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn link_requires_fragment_stage() {
        let mut program = ShaderProgram::new("test");
        program
            .add_shader_from_source(ShaderStage::Vertex, "test.vert", VERTEX)
            .unwrap();
        let err = program.link().unwrap_err();
        assert!(matches!(
            err,
            ShaderError::MissingStage(ShaderStage::Fragment)
        ));
        assert!(!program.is_linked());
    }

    #[test]
    fn syntax_errors_are_reported_as_compile_failures() {
        let mut program = ShaderProgram::new("test");
        let err = program
            .add_shader_from_source(ShaderStage::Vertex, "broken.vert", "fn vs_main( {")
            .unwrap_err();
        assert!(matches!(err, ShaderError::Compile { .. }));
    }

    #[test]
    fn stage_without_matching_entry_point_is_rejected() {
        let mut program = ShaderProgram::new("test");
        let err = program
            .add_shader_from_source(ShaderStage::Vertex, "test.frag", FRAGMENT)
            .unwrap_err();
        assert!(matches!(err, ShaderError::MissingEntryPoint { .. }));
    }

    #[test]
    fn geometry_stage_is_unsupported() {
        let mut program = ShaderProgram::new("test");
        let err = program
            .add_shader_from_source(ShaderStage::Geometry, "test.geom", VERTEX)
            .unwrap_err();
        assert!(matches!(
            err,
            ShaderError::UnsupportedStage(ShaderStage::Geometry)
        ));
    }

    #[test]
    fn mismatched_uniform_blocks_fail_to_link() {
        let fragment = FRAGMENT.replace("flag: u32,", "flag: u32,\n    extra: f32,");
        let mut program = ShaderProgram::new("test");
        program
            .add_shader_from_source(ShaderStage::Vertex, "test.vert", VERTEX)
            .unwrap();
        program
            .add_shader_from_source(ShaderStage::Fragment, "test.frag", &fragment)
            .unwrap();
        let err = program.link().unwrap_err();
        assert!(matches!(err, ShaderError::UniformMismatch { .. }));
    }

    #[test]
    fn mat3_uniforms_use_padded_columns() {
        let bytes = UniformValue::Mat3(Mat3::IDENTITY).to_bytes();
        assert_eq!(bytes.len(), 48);
        let floats = floats(&bytes);
        assert_eq!(&floats[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[4..8], &[0.0, 1.0, 0.0, 0.0]);
    }
}
