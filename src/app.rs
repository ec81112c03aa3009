use std::fmt::Write as _;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::camera::Camera;
use crate::input::{InputState, KeyCode, MouseButton, NamedKey};
use crate::material::{BasicParams, LitParams, MaterialLibrary, ShadingMode};
use crate::mesh::SphereMesh;
use crate::render::GraphicsDevice;
use crate::settings::Settings;

/// Radius change applied by the `+` and `-` keys.
pub const RADIUS_STEP: f32 = 0.05;

/// A single user edit of the viewer state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterEdit {
    SetMode(ShadingMode),
    SetPhong(bool),
    TogglePhong,
    ToggleCamera,
    SetRadius(f32),
    AdjustRadius(f32),
    SetLongitude(u32),
    AdjustLongitude(i32),
    SetLatitude(u32),
    AdjustLatitude(i32),
    SetLit(LitParams),
    SetBasic(BasicParams),
}

/// Keyboard shortcut table.
pub fn edit_for_key(key: KeyCode) -> Option<ParameterEdit> {
    let edit = match key {
        KeyCode::Digit(1) => ParameterEdit::SetMode(ShadingMode::Lit),
        KeyCode::Digit(2) => ParameterEdit::SetMode(ShadingMode::Unlit),
        KeyCode::Digit(3) => ParameterEdit::SetMode(ShadingMode::Wireframe),
        KeyCode::Character('P') => ParameterEdit::TogglePhong,
        KeyCode::Character('C') => ParameterEdit::ToggleCamera,
        KeyCode::Named(NamedKey::Plus) => ParameterEdit::AdjustRadius(RADIUS_STEP),
        KeyCode::Named(NamedKey::Minus) => ParameterEdit::AdjustRadius(-RADIUS_STEP),
        KeyCode::Named(NamedKey::Left) => ParameterEdit::AdjustLongitude(-1),
        KeyCode::Named(NamedKey::Right) => ParameterEdit::AdjustLongitude(1),
        KeyCode::Named(NamedKey::Down) => ParameterEdit::AdjustLatitude(-1),
        KeyCode::Named(NamedKey::Up) => ParameterEdit::AdjustLatitude(1),
        _ => return None,
    };
    Some(edit)
}

/// Sphere, materials and camera driven by one render loop.
pub struct ShadingSession<D: GraphicsDevice> {
    settings: Settings,
    materials: MaterialLibrary,
    mesh: SphereMesh<D>,
    camera: Camera,
    frames: u64,
}

impl<D: GraphicsDevice> ShadingSession<D> {
    /// Initializes both materials and uploads the initial sphere.
    pub fn new(device: &mut D, settings: Settings) -> Result<Self> {
        settings.sphere.validate()?;
        let mut materials = MaterialLibrary::load(&settings.shader_dir).with_context(|| {
            format!(
                "failed to initialize materials from {}",
                settings.shader_dir.display()
            )
        })?;
        materials.set_mode(settings.mode);

        let sphere = settings.sphere;
        let mesh = SphereMesh::new(
            device,
            sphere.radius,
            sphere.longitude,
            sphere.latitude,
            materials.active(),
        )?;
        info!(
            "session ready: {} shading, {} vertices",
            settings.mode,
            mesh.vertex_count()
        );

        Ok(Self {
            settings,
            materials,
            mesh,
            camera: Camera::default(),
            frames: 0,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn materials(&self) -> &MaterialLibrary {
        &self.materials
    }

    pub fn mesh(&self) -> &SphereMesh<D> {
        &self.mesh
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Applies `edit`. Returns whether anything changed.
    pub fn apply(&mut self, device: &mut D, edit: ParameterEdit) -> bool {
        debug!("applying {edit:?}");
        match edit {
            ParameterEdit::SetMode(mode) => {
                self.settings.mode = mode;
                if self.materials.set_mode(mode) {
                    self.mesh.set_material(device, self.materials.active());
                }
                true
            }
            ParameterEdit::SetPhong(phong) => {
                let changed = self.settings.phong != phong;
                self.settings.phong = phong;
                changed
            }
            ParameterEdit::TogglePhong => {
                self.settings.phong = !self.settings.phong;
                true
            }
            ParameterEdit::ToggleCamera => {
                self.settings.camera_enabled = !self.settings.camera_enabled;
                true
            }
            ParameterEdit::SetRadius(radius) => {
                let changed = self.mesh.set_radius(device, radius);
                self.settings.sphere.radius = self.mesh.radius();
                changed
            }
            ParameterEdit::AdjustRadius(delta) => {
                let radius = self.mesh.radius() + delta;
                self.apply(device, ParameterEdit::SetRadius(radius))
            }
            ParameterEdit::SetLongitude(longitude) => {
                let changed = self.mesh.set_longitude(device, longitude);
                self.settings.sphere.longitude = self.mesh.longitude();
                changed
            }
            ParameterEdit::AdjustLongitude(delta) => {
                let Some(longitude) = self.mesh.longitude().checked_add_signed(delta) else {
                    return false;
                };
                self.apply(device, ParameterEdit::SetLongitude(longitude))
            }
            ParameterEdit::SetLatitude(latitude) => {
                let changed = self.mesh.set_latitude(device, latitude);
                self.settings.sphere.latitude = self.mesh.latitude();
                changed
            }
            ParameterEdit::AdjustLatitude(delta) => {
                let Some(latitude) = self.mesh.latitude().checked_add_signed(delta) else {
                    return false;
                };
                self.apply(device, ParameterEdit::SetLatitude(latitude))
            }
            ParameterEdit::SetLit(params) => {
                self.settings.lit = params;
                true
            }
            ParameterEdit::SetBasic(params) => {
                self.settings.basic = params;
                true
            }
        }
    }

    /// Applies every key pressed since the last frame. Returns `false` when
    /// Escape asks to quit.
    pub fn handle_keys(&mut self, device: &mut D, input: &InputState) -> bool {
        for key in input.take_pressed() {
            if key == KeyCode::Named(NamedKey::Escape) {
                return false;
            }
            if let Some(edit) = edit_for_key(key) {
                self.apply(device, edit);
            }
        }
        true
    }

    /// Flies the camera while the right button is held and the camera is on.
    /// Returns whether the camera is being steered.
    pub fn update_camera(&mut self, input: &InputState, delta_time: f32) -> bool {
        let cursor = input.take_mouse_delta();
        let scroll = input.take_scroll();
        if !self.settings.camera_enabled || !input.is_mouse_button_down(MouseButton::RIGHT) {
            return false;
        }

        let axis = |positive: char, negative: char| {
            let held = |c| input.is_key_down(KeyCode::Character(c)) as i32;
            (held(positive) - held(negative)) as f32
        };
        let boost = input.is_key_down(KeyCode::Named(NamedKey::LeftShift))
            || input.is_key_down(KeyCode::Named(NamedKey::RightShift));
        self.camera
            .fly(axis('W', 'S'), axis('D', 'A'), delta_time, boost);
        self.camera.look(cursor.x, cursor.y);
        self.camera.scroll(scroll);
        true
    }

    /// Pushes material and scene uniforms, then draws the sphere.
    pub fn render(&mut self, device: &mut D, aspect: f32) {
        self.materials.apply_lit(&self.settings.lit);
        self.materials.apply_basic(&self.settings.basic);
        let scene = self
            .camera
            .scene_uniforms(self.settings.camera_enabled, aspect);
        self.materials.apply_scene(&scene, self.settings.phong);
        self.mesh.render(device, self.materials.active());
        self.frames += 1;
    }

    /// Human-readable description of the current sphere and shading.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Sphere: radius={:.2} longitude={} latitude={}",
            self.mesh.radius(),
            self.mesh.longitude(),
            self.mesh.latitude()
        );
        let _ = writeln!(
            out,
            "Vertices: {}  Triangles: {}  Indices: {}",
            self.mesh.vertex_count(),
            self.mesh.triangle_count(),
            self.mesh.index_count()
        );
        let shading = match self.settings.mode {
            ShadingMode::Lit if self.settings.phong => "lit (phong)".to_string(),
            ShadingMode::Lit => "lit (blinn-phong)".to_string(),
            mode => mode.to_string(),
        };
        let _ = write!(out, "Shading: {shading}");
        out
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::render::{HeadlessDevice, PolygonMode};

    fn session(device: &mut HeadlessDevice) -> ShadingSession<HeadlessDevice> {
        ShadingSession::new(device, Settings::default()).unwrap()
    }

    #[test]
    fn default_session_summary() {
        let mut device = HeadlessDevice::new();
        let session = session(&mut device);
        assert_eq!(
            session.summary(),
            "Sphere: radius=0.90 longitude=22 latitude=20\n\
             Vertices: 442  Triangles: 880  Indices: 2640\n\
             Shading: lit (phong)"
        );
    }

    #[test]
    fn mode_switch_rebinds_the_mesh() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        session.apply(&mut device, ParameterEdit::SetMode(ShadingMode::Wireframe));
        session.render(&mut device, 1.0);
        let draw = device.last_draw().unwrap();
        assert_eq!(draw.polygon_mode, PolygonMode::Line);
        assert_eq!(draw.attributes.len(), 1);
        assert_eq!(draw.program, session.materials().basic().id());
        assert!(session.summary().ends_with("Shading: wireframe"));
    }

    #[test]
    fn geometry_edits_follow_the_mesh() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        assert!(session.apply(&mut device, ParameterEdit::AdjustRadius(RADIUS_STEP)));
        assert!((session.settings().sphere.radius - 0.95).abs() < 1e-6);
        assert!(session.apply(&mut device, ParameterEdit::AdjustLongitude(1)));
        assert_eq!(session.mesh().longitude(), 23);

        assert!(!session.apply(&mut device, ParameterEdit::SetLatitude(0)));
        assert!(!session.apply(&mut device, ParameterEdit::AdjustRadius(-10.0)));
        assert_eq!(session.settings().sphere.latitude, 20);
        assert!((session.settings().sphere.radius - 0.95).abs() < 1e-6);
    }

    #[test]
    fn latitude_cannot_drop_below_one() {
        let mut device = HeadlessDevice::new();
        let settings = Settings {
            sphere: crate::settings::SphereSettings {
                radius: 1.0,
                longitude: 3,
                latitude: 1,
            },
            ..Settings::default()
        };
        let mut session = ShadingSession::new(&mut device, settings).unwrap();
        assert!(!session.apply(&mut device, ParameterEdit::AdjustLatitude(-1)));
        assert_eq!(session.mesh().latitude(), 1);
    }

    #[test]
    fn keys_map_to_edits() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        let input = InputState::new();
        input.set_key_down(KeyCode::Digit(2));
        input.set_key_down(KeyCode::Character('P'));
        input.set_key_down(KeyCode::Named(NamedKey::Up));
        assert!(session.handle_keys(&mut device, &input));
        assert_eq!(session.settings().mode, ShadingMode::Unlit);
        assert!(!session.settings().phong);
        assert_eq!(session.mesh().latitude(), 21);

        input.set_key_down(KeyCode::Named(NamedKey::Escape));
        assert!(!session.handle_keys(&mut device, &input));
    }

    #[test]
    fn camera_only_moves_when_enabled_and_held() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        let input = InputState::new();
        input.set_key_down(KeyCode::Character('W'));
        input.set_mouse_button_down(MouseButton::RIGHT);
        assert!(!session.update_camera(&input, 1.0));
        assert_eq!(session.camera().position(), Camera::default().position());

        session.apply(&mut device, ParameterEdit::ToggleCamera);
        input.set_mouse_position(Vec2::ZERO);
        input.set_mouse_position(Vec2::new(0.0, -10.0));
        assert!(session.update_camera(&input, 1.0));
        assert!(session.camera().position().x < 3.0);
        assert!(session.camera().pitch() > 0.0);
    }

    #[test]
    fn render_pushes_scene_uniforms() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        session.render(&mut device, 1.0);
        session.render(&mut device, 1.0);
        assert_eq!(session.frames_rendered(), 2);
        assert_eq!(device.draw_count(), 2);

        let lit = session.materials().lit().program();
        let phong = lit.uniform_block().member("phong").unwrap().offset as usize;
        let uniforms = &device.last_draw().unwrap().uniforms;
        assert_eq!(&uniforms[phong..phong + 4], &1u32.to_ne_bytes());
    }

    #[test]
    fn missing_shader_directory_fails_session() {
        let mut device = HeadlessDevice::new();
        let settings = Settings {
            shader_dir: "/nonexistent/shaders".into(),
            ..Settings::default()
        };
        assert!(ShadingSession::new(&mut device, settings).is_err());
    }
}
