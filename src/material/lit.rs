use glam::{Vec3, Vec4};

use super::{
    require_attribute, MaterialCore, MaterialError, MaterialState, ShaderSources,
    NORMAL_ATTRIBUTE, POSITION_ATTRIBUTE,
};
use crate::render::{GraphicsDevice, PolygonMode};
use crate::shader::UNUSED_ATTRIBUTE;

const AMBIENT_COLOR_UNIFORM: &str = "ambient_color";
const DIFFUSE_COLOR_UNIFORM: &str = "diffuse_color";
const SPECULAR_COLOR_UNIFORM: &str = "specular_color";
const SPECULAR_EXPONENT_UNIFORM: &str = "specular_exponent";
const LIGHT_POSITION_UNIFORM: &str = "light_position";
const LIGHT_COLOR_UNIFORM: &str = "light_color";

/// Material lit by a single point light with a Phong or Blinn-Phong
/// specular term. Needs both positions and normals.
#[derive(Debug)]
pub struct LitMaterial {
    pub(super) core: MaterialCore,
    position_slot: i32,
    normal_slot: i32,
}

impl LitMaterial {
    pub fn new(sources: ShaderSources) -> Self {
        Self {
            core: MaterialCore::new("lit material", sources),
            position_slot: UNUSED_ATTRIBUTE,
            normal_slot: UNUSED_ATTRIBUTE,
        }
    }

    pub fn initialize(&mut self) -> Result<(), MaterialError> {
        let (position_slot, normal_slot) = (&mut self.position_slot, &mut self.normal_slot);
        self.core.initialize(|program| {
            *position_slot = require_attribute(program, POSITION_ATTRIBUTE)?;
            *normal_slot = require_attribute(program, NORMAL_ATTRIBUTE)?;
            Ok(())
        })
    }

    pub fn state(&self) -> MaterialState {
        self.core.state
    }

    /// Always renders filled.
    pub fn bind<D: GraphicsDevice>(&self, device: &mut D) {
        device.set_polygon_mode(PolygonMode::Fill);
        self.core.bind(device);
    }

    pub fn position_attribute_slot(&self) -> i32 {
        self.position_slot
    }

    pub fn normal_attribute_slot(&self) -> i32 {
        self.normal_slot
    }

    pub fn set_ambient_color(&mut self, color: Vec3) {
        self.core.program.set_vec3(AMBIENT_COLOR_UNIFORM, color);
    }

    pub fn set_diffuse_color(&mut self, color: Vec3) {
        self.core.program.set_vec3(DIFFUSE_COLOR_UNIFORM, color);
    }

    pub fn set_specular_color(&mut self, color: Vec3) {
        self.core.program.set_vec3(SPECULAR_COLOR_UNIFORM, color);
    }

    pub fn set_specular_exponent(&mut self, exponent: f32) {
        self.core
            .program
            .set_float(SPECULAR_EXPONENT_UNIFORM, exponent);
    }

    pub fn set_light_position(&mut self, position: Vec3) {
        self.core.program.set_vec3(LIGHT_POSITION_UNIFORM, position);
    }

    /// RGB color with the intensity in alpha.
    pub fn set_light_color(&mut self, color: Vec4) {
        self.core.program.set_vec4(LIGHT_COLOR_UNIFORM, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::default_shader_dir;
    use crate::shader::UniformKind;

    #[test]
    fn lit_block_exposes_every_parameter() {
        let mut material = LitMaterial::new(ShaderSources::in_dir(default_shader_dir(), "lit"));
        material.initialize().unwrap();
        let block = material.core.program.uniform_block();
        for (name, kind) in [
            (AMBIENT_COLOR_UNIFORM, UniformKind::Vec3),
            (DIFFUSE_COLOR_UNIFORM, UniformKind::Vec3),
            (SPECULAR_COLOR_UNIFORM, UniformKind::Vec3),
            (SPECULAR_EXPONENT_UNIFORM, UniformKind::Float),
            (LIGHT_POSITION_UNIFORM, UniformKind::Vec3),
            (LIGHT_COLOR_UNIFORM, UniformKind::Vec4),
        ] {
            assert_eq!(block.member(name).map(|member| member.kind), Some(kind), "{name}");
        }
    }

    #[test]
    fn light_color_keeps_alpha() {
        let mut material = LitMaterial::new(ShaderSources::in_dir(default_shader_dir(), "lit"));
        material.initialize().unwrap();
        material.set_light_color(Vec4::new(1.0, 0.5, 0.25, 0.75));
        let offset = material
            .core
            .program
            .uniform_block()
            .member(LIGHT_COLOR_UNIFORM)
            .unwrap()
            .offset as usize;
        let data = material.core.program.uniform_data();
        assert_eq!(&data[offset + 12..offset + 16], &0.75f32.to_ne_bytes());
    }
}
