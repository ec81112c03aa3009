use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use glam::{Vec3, Vec4};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::geometry;
use crate::material::{default_shader_dir, BasicParams, LitParams, ShadingMode};

/// Viewer configuration: initial sphere, shading and material parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sphere: SphereSettings,
    pub mode: ShadingMode,
    /// Phong when set, Blinn-Phong otherwise.
    pub phong: bool,
    pub camera_enabled: bool,
    pub lit: LitParams,
    pub basic: BasicParams,
    pub shader_dir: PathBuf,
    pub window_size: (u32, u32),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sphere: SphereSettings::default(),
            mode: ShadingMode::Lit,
            phong: true,
            camera_enabled: false,
            lit: LitParams::default(),
            basic: BasicParams::default(),
            shader_dir: default_shader_dir(),
            window_size: (900, 900),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereSettings {
    pub radius: f32,
    pub longitude: u32,
    pub latitude: u32,
}

impl Default for SphereSettings {
    fn default() -> Self {
        Self {
            radius: 0.9,
            longitude: 22,
            latitude: 20,
        }
    }
}

impl SphereSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            bail!("sphere radius must be positive, got {}", self.radius);
        }
        if self.longitude < 1 || self.latitude < 1 {
            bail!(
                "sphere needs at least one longitude and latitude segment, got {}x{}",
                self.longitude,
                self.latitude
            );
        }
        if !geometry::segments_supported(self.longitude, self.latitude) {
            bail!(
                "sphere with {}x{} segments is too large to index",
                self.longitude,
                self.latitude
            );
        }
        Ok(())
    }
}

impl Settings {
    /// Reads a preset file. A relative `<shaders>` directory is resolved
    /// against the preset's own directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read preset {}", path.display()))?;
        let mut settings = Self::from_xml(&xml)
            .with_context(|| format!("failed to parse preset {}", path.display()))?;
        if settings.shader_dir.is_relative() {
            if let Some(parent) = path.parent() {
                settings.shader_dir = parent.join(&settings.shader_dir);
            }
        }
        Ok(settings)
    }

    /// Parses a preset document. Missing elements keep their defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid preset XML")?;
        let root = document.root_element();
        if !root.has_tag_name("preset") {
            bail!("expected <preset> root, found <{}>", root.tag_name().name());
        }

        let mut settings = Self::default();

        if let Some(sphere) = child(&root, "sphere") {
            let current = settings.sphere;
            settings.sphere = SphereSettings {
                radius: parse_f32(optional_text(&sphere, "radius"), current.radius)?,
                longitude: parse_u32(optional_text(&sphere, "longitude"), current.longitude)?,
                latitude: parse_u32(optional_text(&sphere, "latitude"), current.latitude)?,
            };
            settings.sphere.validate()?;
        }

        if let Some(shading) = child(&root, "shading") {
            if let Some(mode) = optional_text(&shading, "mode") {
                settings.mode = mode.parse()?;
            }
            if let Some(model) = optional_text(&shading, "model") {
                settings.phong = parse_lighting_model(&model)?;
            }
        }

        if let Some(camera) = child(&root, "camera") {
            settings.camera_enabled =
                parse_bool(optional_text(&camera, "enabled"), settings.camera_enabled)?;
        }

        if let Some(material) = child(&root, "material") {
            let lit = &mut settings.lit;
            lit.ambient = parse_vec3(optional_text(&material, "ambient"), lit.ambient)?;
            lit.diffuse = parse_vec3(optional_text(&material, "diffuse"), lit.diffuse)?;
            lit.specular = parse_vec3(optional_text(&material, "specular"), lit.specular)?;
            lit.specular_exponent = parse_f32(
                optional_text(&material, "specular-exponent"),
                lit.specular_exponent,
            )?;
            settings.basic.color =
                parse_vec3(optional_text(&material, "color"), settings.basic.color)?;
        }

        if let Some(light) = child(&root, "light") {
            let lit = &mut settings.lit;
            lit.light_position =
                parse_vec3(optional_text(&light, "position"), lit.light_position)?;
            lit.light_color = parse_vec4(optional_text(&light, "color"), lit.light_color)?;
        }

        if let Some(shaders) = optional_text(&root, "shaders") {
            settings.shader_dir = PathBuf::from(shaders);
        }

        if let Some(window) = child(&root, "window") {
            let (width, height) = settings.window_size;
            settings.window_size = (
                parse_u32(optional_text(&window, "width"), width)?.max(1),
                parse_u32(optional_text(&window, "height"), height)?.max(1),
            );
        }

        Ok(settings)
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components<const N: usize>(value: &str, what: &str) -> Result<[f32; N]> {
    let numbers = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid {what} component '{component}': {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    numbers
        .try_into()
        .map_err(|numbers: Vec<f32>| anyhow!("{what} needs {N} components, got {}", numbers.len()))
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    Ok(Vec3::from_array(parse_components(&value, "vector")?))
}

fn parse_vec4(value: Option<String>, default: Vec4) -> Result<Vec4> {
    let Some(value) = value else {
        return Ok(default);
    };
    Ok(Vec4::from_array(parse_components(&value, "color")?))
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer '{value}': {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        Some("true" | "yes" | "1") => Ok(true),
        Some("false" | "no" | "0") => Ok(false),
        Some(other) => Err(anyhow!("failed to parse boolean '{other}'")),
        None => Ok(default),
    }
}

/// `phong` or `blinn-phong`; returns whether Phong is selected.
pub fn parse_lighting_model(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "phong" => Ok(true),
        "blinn-phong" | "blinn" => Ok(false),
        other => Err(anyhow!(
            "unknown lighting model '{other}' (expected phong or blinn-phong)"
        )),
    }
}
