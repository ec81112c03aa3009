use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn preset(xml: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp preset");
    tmp.write_all(xml.as_bytes()).expect("write preset");
    tmp
}

#[test]
fn headless_run_prints_summary() {
    let mut cmd = Command::cargo_bin("sphere-shading").expect("binary exists");
    cmd.args(["--headless", "--frames", "3"]);
    cmd.assert()
        .success()
        .stdout(contains("Sphere: radius=0.90 longitude=22 latitude=20"))
        .stdout(contains("Vertices: 442  Triangles: 880  Indices: 2640"))
        .stdout(contains("Shading: lit (phong)"))
        .stdout(contains("Rendered 3 frame(s), 3 draw call(s)"));
}

#[test]
fn cli_overrides_preset_values() {
    let preset = preset(
        r#"<preset>
  <sphere>
    <radius>2</radius>
    <longitude>4</longitude>
    <latitude>2</latitude>
  </sphere>
  <shading><mode>unlit</mode></shading>
</preset>
"#,
    );
    let mut cmd = Command::cargo_bin("sphere-shading").expect("binary exists");
    cmd.arg("--preset")
        .arg(preset.path())
        .arg("--shaders")
        .arg(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders"))
        .args(["--mode", "wireframe", "--radius", "1", "--headless"]);
    cmd.assert()
        .success()
        .stdout(contains("Sphere: radius=1.00 longitude=4 latitude=2"))
        .stdout(contains("Vertices: 10  Triangles: 16  Indices: 48"))
        .stdout(contains("Shading: wireframe"))
        .stdout(contains("Rendered 1 frame(s), 1 draw call(s)"));
}

#[test]
fn blinn_flag_selects_blinn_phong() {
    let mut cmd = Command::cargo_bin("sphere-shading").expect("binary exists");
    cmd.args(["--headless", "--blinn", "--frames", "0"]);
    cmd.assert()
        .success()
        .stdout(contains("Shading: lit (blinn-phong)"))
        .stdout(contains("Rendered 0 frame(s), 0 draw call(s)"));
}

#[test]
fn degenerate_sphere_is_rejected() {
    let mut cmd = Command::cargo_bin("sphere-shading").expect("binary exists");
    cmd.args(["--headless", "--latitude", "0"]);
    cmd.assert()
        .failure()
        .stderr(contains("latitude segment"));
}

#[test]
fn oversized_sphere_is_rejected() {
    let mut cmd = Command::cargo_bin("sphere-shading").expect("binary exists");
    cmd.args(["--headless", "--longitude", "22", "--latitude", "200000000"]);
    cmd.assert().failure().stderr(contains("too large"));
}

#[test]
fn unknown_argument_prints_usage() {
    let mut cmd = Command::cargo_bin("sphere-shading").expect("binary exists");
    cmd.arg("--bogus");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"))
        .stderr(contains("Usage: sphere-shading"));
}

#[test]
fn missing_shaders_fail_startup() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut cmd = Command::cargo_bin("sphere-shading").expect("binary exists");
    cmd.arg("--shaders").arg(dir.path()).arg("--headless");
    cmd.assert()
        .failure()
        .stderr(contains("failed to initialize materials"));
}
