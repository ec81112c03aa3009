use std::fs;
use std::path::Path;

use sphere_shading::material::default_shader_dir;
use sphere_shading::{
    BasicMaterial, HeadlessDevice, LitMaterial, Material, MaterialError, MaterialLibrary,
    MaterialState, ShaderSources, ShadingMode, SphereMesh, UNUSED_ATTRIBUTE,
};
use tempfile::TempDir;

/// Copies the bundled shaders, replacing `name` with `source`.
fn shader_dir_with(name: &str, source: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    for entry in fs::read_dir(default_shader_dir()).expect("shader dir") {
        let path = entry.expect("dir entry").path();
        let file_name = path.file_name().expect("file name");
        fs::copy(&path, dir.path().join(file_name)).expect("copy shader");
    }
    fs::write(dir.path().join(name), source).expect("write shader");
    dir
}

fn bundled(name: &str) -> String {
    fs::read_to_string(default_shader_dir().join(name)).expect("bundled shader")
}

fn lit(dir: &Path) -> Material {
    LitMaterial::new(ShaderSources::in_dir(dir, "lit")).into()
}

#[test]
fn shader_without_position_input_fails_initialization() {
    let vertex = bundled("basic.vert.wgsl").replace("v_position", "a_position");
    let dir = shader_dir_with("basic.vert.wgsl", &vertex);
    let mut material: Material = BasicMaterial::new(ShaderSources::in_dir(dir.path(), "basic")).into();

    let err = material.initialize().unwrap_err();
    assert!(matches!(
        err,
        MaterialError::MissingAttribute {
            attribute: "v_position"
        }
    ));
    assert_eq!(material.state(), MaterialState::Failed);
    assert_eq!(material.position_attribute_slot(), UNUSED_ATTRIBUTE);
}

#[test]
fn lit_shader_without_normals_fails_initialization() {
    let vertex = bundled("lit.vert.wgsl")
        .replace("@location(1) v_normal: vec3<f32>,", "")
        .replace("input.v_normal", "input.v_position");
    let dir = shader_dir_with("lit.vert.wgsl", &vertex);
    let mut material = lit(dir.path());

    let err = material.initialize().unwrap_err();
    assert!(matches!(
        err,
        MaterialError::MissingAttribute {
            attribute: "v_normal"
        }
    ));
    assert_eq!(material.state(), MaterialState::Failed);
}

#[test]
fn compile_errors_fail_initialization() {
    let dir = shader_dir_with("lit.frag.wgsl", "@fragment fn fs_main( {");
    let mut material = lit(dir.path());
    assert!(matches!(
        material.initialize(),
        Err(MaterialError::Shader(_))
    ));
    assert_eq!(material.state(), MaterialState::Failed);
}

#[test]
fn relocated_attributes_follow_the_shader() {
    let vertex = bundled("lit.vert.wgsl")
        .replace("@location(0) v_position", "@location(4) v_position")
        .replace("@location(1) v_normal", "@location(2) v_normal");
    let dir = shader_dir_with("lit.vert.wgsl", &vertex);
    let mut material = lit(dir.path());
    material.initialize().expect("relocated shader links");
    assert_eq!(material.position_attribute_slot(), 4);
    assert_eq!(material.normal_attribute_slot(), 2);

    let mut device = HeadlessDevice::new();
    let mesh = SphereMesh::new(&mut device, 1.0, 4, 2, &material).expect("mesh");
    let layout = mesh.layout();
    assert_eq!(layout.binding(4).map(|b| b.offset), Some(0));
    assert_eq!(layout.binding(2).map(|b| b.offset), Some(10 * 12));
}

#[test]
fn library_swaps_reshape_the_draw() {
    let mut library = MaterialLibrary::load(default_shader_dir()).expect("library");
    let mut device = HeadlessDevice::new();
    let mut mesh = SphereMesh::new(&mut device, 0.5, 8, 6, library.active()).expect("mesh");

    mesh.render(&mut device, library.active());
    assert_eq!(device.last_draw().expect("draw").attributes.len(), 2);

    for mode in [ShadingMode::Unlit, ShadingMode::Wireframe, ShadingMode::Lit] {
        if library.set_mode(mode) {
            mesh.set_material(&mut device, library.active());
        }
        mesh.render(&mut device, library.active());
        let draw = device.last_draw().expect("draw");
        let expected = if mode == ShadingMode::Lit { 2 } else { 1 };
        assert_eq!(draw.attributes.len(), expected, "{mode}");
        assert_eq!(draw.index_count, mesh.index_count());
    }
}
