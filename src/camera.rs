use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::material::SceneUniforms;

/// Maps OpenGL clip depth (-1..1) to the 0..1 range wgpu clips against.
pub const CLIP_DEPTH_REMAP: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.0, 0.0, 0.5, 1.0,
]);

const WORLD_UP: Vec3 = Vec3::Y;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;
const MAX_PITCH: f32 = 89.0;
const MIN_ZOOM: f32 = 1.0;
const MAX_ZOOM: f32 = 45.0;

/// Fly-through camera steered with yaw and pitch angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    /// Vertical field of view in degrees.
    zoom: f32,
    speed: f32,
    sensitivity: f32,
    #[serde(skip)]
    front: Vec3,
    #[serde(skip)]
    up: Vec3,
    #[serde(skip)]
    right: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(3.0, 0.0, 0.0))
    }
}

impl Camera {
    /// Camera at `position` looking down -X.
    pub fn new(position: Vec3) -> Self {
        let mut camera = Self {
            position,
            yaw: 180.0,
            pitch: 0.0,
            zoom: MAX_ZOOM,
            speed: 2.5,
            sensitivity: 0.002,
            front: Vec3::NEG_Z,
            up: WORLD_UP,
            right: Vec3::X,
        };
        camera.update_vectors();
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    /// Moves along the view direction (`forward`) and the right vector
    /// (`strafe`), each in -1..=1. `boost` doubles the speed.
    pub fn fly(&mut self, forward: f32, strafe: f32, delta_time: f32, boost: bool) {
        let mut step = self.speed * delta_time;
        if boost {
            step *= 2.0;
        }
        self.position += self.front * forward * step;
        self.position += self.right * strafe * step;
    }

    /// Turns by a cursor delta in pixels. Narrow fields of view turn slower.
    pub fn look(&mut self, dx: f32, dy: f32) {
        let scale = self.sensitivity * self.zoom;
        self.yaw += dx * scale;
        self.pitch = (self.pitch - dy * scale).clamp(-MAX_PITCH, MAX_PITCH);
        self.update_vectors();
    }

    pub fn scroll(&mut self, delta: f32) {
        self.zoom = (self.zoom - delta).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        let fov = self.zoom.to_radians();
        CLIP_DEPTH_REMAP * Mat4::perspective_rh_gl(fov, aspect.max(0.01), NEAR_PLANE, FAR_PLANE)
    }

    /// Scene uniforms for this camera, or the fixed front view when the
    /// camera is disabled.
    pub fn scene_uniforms(&self, enabled: bool, aspect: f32) -> SceneUniforms {
        if !enabled {
            return SceneUniforms {
                projection: CLIP_DEPTH_REMAP,
                ..SceneUniforms::default()
            };
        }
        SceneUniforms {
            projection: self.projection(aspect),
            view: self.view_matrix(),
            view_position: self.position,
        }
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(WORLD_UP).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    #[test]
    fn default_camera_looks_at_the_origin() {
        let camera = Camera::default();
        assert!((camera.front() - Vec3::NEG_X).length() < 1e-6);
        let view = camera.view_matrix();
        let origin = view.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.0, 0.0, -3.0)).length() < 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.look(0.0, -1.0e6);
        assert_eq!(camera.pitch(), 89.0);
        camera.look(0.0, 1.0e6);
        assert_eq!(camera.pitch(), -89.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = Camera::default();
        camera.scroll(100.0);
        assert_eq!(camera.zoom(), 1.0);
        camera.scroll(-100.0);
        assert_eq!(camera.zoom(), 45.0);
    }

    #[test]
    fn boost_doubles_the_step() {
        let mut slow = Camera::default();
        let mut fast = Camera::default();
        slow.fly(1.0, 0.0, 0.5, false);
        fast.fly(1.0, 0.0, 0.5, true);
        assert!((slow.position().x - (3.0 - 1.25)).abs() < 1e-5);
        assert!((fast.position().x - (3.0 - 2.5)).abs() < 1e-5);
    }

    #[test]
    fn depth_remap_targets_zero_to_one() {
        let near = CLIP_DEPTH_REMAP * Vec4::new(0.0, 0.0, -1.0, 1.0);
        let far = CLIP_DEPTH_REMAP * Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(near.z, 0.0);
        assert_eq!(far.z, 1.0);
    }

    #[test]
    fn disabled_camera_uses_the_fixed_view() {
        let uniforms = Camera::default().scene_uniforms(false, 1.0);
        assert_eq!(uniforms.view, Mat4::IDENTITY);
        assert_eq!(uniforms.projection, CLIP_DEPTH_REMAP);
        assert_eq!(uniforms.view_position, Vec3::new(0.0, 0.0, -1.0));
    }
}
