use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::anyhow;
use glam::{Vec3, Vec4};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{BasicMaterial, LitMaterial, Material, MaterialError, SceneUniforms, ShaderSources};

/// Shading selected for the sphere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadingMode {
    #[default]
    Lit,
    Unlit,
    Wireframe,
}

impl ShadingMode {
    pub const ALL: [ShadingMode; 3] = [Self::Lit, Self::Unlit, Self::Wireframe];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lit => "lit",
            Self::Unlit => "unlit",
            Self::Wireframe => "wireframe",
        }
    }
}

impl fmt::Display for ShadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShadingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                anyhow!("unknown shading mode '{value}' (expected lit, unlit or wireframe)")
            })
    }
}

/// Editable parameters of the lit material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LitParams {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub specular_exponent: f32,
    pub light_position: Vec3,
    pub light_color: Vec4,
}

impl Default for LitParams {
    fn default() -> Self {
        Self {
            ambient: Vec3::new(0.05, 0.05, 0.1),
            diffuse: Vec3::new(0.0, 0.0, 1.0),
            specular: Vec3::new(0.1, 0.5, 1.0),
            specular_exponent: 128.0,
            light_position: Vec3::ONE,
            light_color: Vec4::ONE,
        }
    }
}

impl LitParams {
    pub fn apply(&self, material: &mut LitMaterial) {
        material.set_ambient_color(self.ambient);
        material.set_diffuse_color(self.diffuse);
        material.set_specular_color(self.specular);
        material.set_specular_exponent(self.specular_exponent);
        material.set_light_position(self.light_position);
        material.set_light_color(self.light_color);
    }
}

/// Editable parameters of the unlit material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicParams {
    pub color: Vec3,
}

impl Default for BasicParams {
    fn default() -> Self {
        Self {
            color: Vec3::new(0.0, 0.0, 1.0),
        }
    }
}

impl BasicParams {
    pub fn apply(&self, material: &mut BasicMaterial) {
        material.set_color(self.color);
    }
}

/// Owns every material instance and maps the shading mode to the active one.
#[derive(Debug)]
pub struct MaterialLibrary {
    basic: Material,
    lit: Material,
    mode: ShadingMode,
}

impl MaterialLibrary {
    /// Uninitialized materials reading `basic.*.wgsl` and `lit.*.wgsl` from
    /// `shader_dir`.
    pub fn new(shader_dir: impl AsRef<Path>) -> Self {
        let dir = shader_dir.as_ref();
        Self {
            basic: BasicMaterial::new(ShaderSources::in_dir(dir, "basic")).into(),
            lit: LitMaterial::new(ShaderSources::in_dir(dir, "lit")).into(),
            mode: ShadingMode::default(),
        }
    }

    /// Builds and initializes both materials.
    pub fn load(shader_dir: impl AsRef<Path>) -> Result<Self, MaterialError> {
        let mut library = Self::new(shader_dir);
        library.initialize()?;
        Ok(library)
    }

    pub fn initialize(&mut self) -> Result<(), MaterialError> {
        self.basic.initialize()?;
        self.lit.initialize()
    }

    pub fn mode(&self) -> ShadingMode {
        self.mode
    }

    /// Switches the active material. Returns whether the active material
    /// instance changed, in which case meshes must be rebound.
    pub fn set_mode(&mut self, mode: ShadingMode) -> bool {
        let previous = self.active().id();
        self.mode = mode;
        if let Some(basic) = self.basic.as_basic_mut() {
            basic.set_wireframe(mode == ShadingMode::Wireframe);
        }
        let changed = previous != self.active().id();
        debug!("shading mode set to {mode} (material changed: {changed})");
        changed
    }

    pub fn active(&self) -> &Material {
        match self.mode {
            ShadingMode::Lit => &self.lit,
            ShadingMode::Unlit | ShadingMode::Wireframe => &self.basic,
        }
    }

    pub fn active_mut(&mut self) -> &mut Material {
        match self.mode {
            ShadingMode::Lit => &mut self.lit,
            ShadingMode::Unlit | ShadingMode::Wireframe => &mut self.basic,
        }
    }

    pub fn basic(&self) -> &Material {
        &self.basic
    }

    pub fn lit(&self) -> &Material {
        &self.lit
    }

    pub fn apply_basic(&mut self, params: &BasicParams) {
        if let Some(basic) = self.basic.as_basic_mut() {
            params.apply(basic);
        }
    }

    pub fn apply_lit(&mut self, params: &LitParams) {
        if let Some(lit) = self.lit.as_lit_mut() {
            params.apply(lit);
        }
    }

    /// Pushes scene uniforms and the lighting model to the active material.
    pub fn apply_scene(&mut self, scene: &SceneUniforms, phong: bool) {
        let material = self.active_mut();
        material.set_scene_uniforms(scene);
        material.set_phong(phong);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::default_shader_dir;

    #[test]
    fn shading_modes_parse_case_insensitively() {
        assert_eq!("Wireframe".parse::<ShadingMode>().unwrap(), ShadingMode::Wireframe);
        assert_eq!(" lit ".parse::<ShadingMode>().unwrap(), ShadingMode::Lit);
        assert!("phong".parse::<ShadingMode>().is_err());
    }

    #[test]
    fn modes_resolve_to_materials() {
        let mut library = MaterialLibrary::load(default_shader_dir()).unwrap();
        assert!(library.active().as_lit().is_some());

        assert!(library.set_mode(ShadingMode::Wireframe));
        assert!(library.active().as_basic().unwrap().wireframe());

        // same material instance, only the raster state differs
        assert!(!library.set_mode(ShadingMode::Unlit));
        assert!(!library.active().as_basic().unwrap().wireframe());

        assert!(library.set_mode(ShadingMode::Lit));
        assert_eq!(library.active().id(), library.lit().id());
    }

    #[test]
    fn defaults_match_the_reference_scene() {
        let params = LitParams::default();
        assert_eq!(params.ambient, Vec3::new(0.05, 0.05, 0.1));
        assert_eq!(params.specular_exponent, 128.0);
        assert_eq!(params.light_color, Vec4::ONE);
    }

    #[test]
    fn params_are_written_to_their_materials() {
        let mut library = MaterialLibrary::load(default_shader_dir()).unwrap();
        library.apply_lit(&LitParams::default());
        library.apply_basic(&BasicParams {
            color: Vec3::new(1.0, 0.0, 0.0),
        });

        let lit = library.lit().program();
        let offset = lit
            .uniform_block()
            .member("specular_exponent")
            .unwrap()
            .offset as usize;
        assert_eq!(&lit.uniform_data()[offset..offset + 4], &128.0f32.to_ne_bytes());

        let basic = library.basic().program();
        let offset = basic.uniform_block().member("color").unwrap().offset as usize;
        assert_eq!(&basic.uniform_data()[offset..offset + 4], &1.0f32.to_ne_bytes());
    }
}
