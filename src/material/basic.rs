use glam::Vec3;

use super::{
    require_attribute, MaterialCore, MaterialError, MaterialState, ShaderSources,
    POSITION_ATTRIBUTE,
};
use crate::render::{GraphicsDevice, PolygonMode};
use crate::shader::UNUSED_ATTRIBUTE;

const COLOR_UNIFORM: &str = "color";

/// Unlit material drawing a single flat color, filled or as a wireframe.
#[derive(Debug)]
pub struct BasicMaterial {
    pub(super) core: MaterialCore,
    position_slot: i32,
    wireframe: bool,
}

impl BasicMaterial {
    pub fn new(sources: ShaderSources) -> Self {
        Self {
            core: MaterialCore::new("basic material", sources),
            position_slot: UNUSED_ATTRIBUTE,
            wireframe: false,
        }
    }

    pub fn initialize(&mut self) -> Result<(), MaterialError> {
        let position_slot = &mut self.position_slot;
        self.core.initialize(|program| {
            *position_slot = require_attribute(program, POSITION_ATTRIBUTE)?;
            Ok(())
        })
    }

    pub fn state(&self) -> MaterialState {
        self.core.state
    }

    pub fn bind<D: GraphicsDevice>(&self, device: &mut D) {
        device.set_polygon_mode(if self.wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        });
        self.core.bind(device);
    }

    pub fn position_attribute_slot(&self) -> i32 {
        self.position_slot
    }

    pub fn normal_attribute_slot(&self) -> i32 {
        UNUSED_ATTRIBUTE
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.core.program.set_vec3(COLOR_UNIFORM, color);
    }

    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.wireframe = wireframe;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::default_shader_dir;
    use crate::render::HeadlessDevice;

    fn material() -> BasicMaterial {
        let mut material = BasicMaterial::new(ShaderSources::in_dir(default_shader_dir(), "basic"));
        material.initialize().unwrap();
        material
    }

    #[test]
    fn color_is_written_to_the_block() {
        let mut material = material();
        material.set_color(Vec3::new(0.25, 0.5, 1.0));
        let offset = material
            .core
            .program
            .uniform_block()
            .member(COLOR_UNIFORM)
            .unwrap()
            .offset as usize;
        let data = material.core.program.uniform_data();
        assert_eq!(&data[offset..offset + 4], &0.25f32.to_ne_bytes());
        assert_eq!(&data[offset + 8..offset + 12], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn filled_by_default() {
        let mut device = HeadlessDevice::new();
        device.set_polygon_mode(PolygonMode::Line);
        let material = material();
        assert!(!material.wireframe());
        material.bind(&mut device);
        assert_eq!(device.polygon_mode(), PolygonMode::Fill);
    }

    #[test]
    fn uninitialized_material_has_no_slots() {
        let material = BasicMaterial::new(ShaderSources::in_dir(default_shader_dir(), "basic"));
        assert_eq!(material.state(), MaterialState::Uninitialized);
        assert_eq!(material.position_attribute_slot(), UNUSED_ATTRIBUTE);
    }
}
