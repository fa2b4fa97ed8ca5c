use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

const SCENE: &str = r#"<scene>
  <width>48</width>
  <height>48</height>
  <clear>0 0 0 1</clear>
  <camera>
    <sized>2 2</sized>
    <position>0 0 1</position>
  </camera>
  <polygon>
    <name>rgb</name>
    <vertex><pos>0 0</pos><color>1 0 0 1</color></vertex>
    <vertex><pos>1 0</pos><color>0 1 0 1</color></vertex>
    <vertex><pos>0 1</pos><color>0 0 1 1</color></vertex>
  </polygon>
</scene>
"#;

fn write_scene(contents: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(contents.as_bytes()).expect("write scene");
    tmp
}

#[test]
fn cli_prints_scene_summary() {
    let scene = write_scene(SCENE);
    let mut cmd = Command::cargo_bin("polygon-stage").expect("binary exists");
    cmd.arg(scene.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 1 polygons (3 vertices, 1 triangles)"))
        .stdout(contains(" - rgb: 3 vertices, 1 triangles"));
}

#[test]
fn cli_renders_png_on_cpu() {
    let scene = write_scene(SCENE);
    let dir = TempDir::new().expect("temp dir");
    let out = dir.path().join("frame.png");

    let mut cmd = Command::cargo_bin("polygon-stage").expect("binary exists");
    cmd.arg(scene.path())
        .arg("--backend")
        .arg("cpu")
        .arg("--out")
        .arg(&out);
    cmd.assert()
        .success()
        .stdout(contains("Rendered 48x48 with cpu backend"))
        .stdout(contains("Wrote"));

    let image = image::open(&out).expect("png decodes").to_rgba8();
    assert_eq!(image.dimensions(), (48, 48));
    // Camera spans -1..1, so the red corner sits at the image center.
    let center = image.get_pixel(24, 23);
    assert!(center[0] > 200, "center pixel {center:?} should be red");
    assert_eq!(image.get_pixel(2, 45).0, [0, 0, 0, 255]);
}

#[test]
fn cli_rejects_invalid_indices() {
    let scene = write_scene(
        r#"<scene><polygon>
            <vertex><pos>0 0</pos></vertex>
            <vertex><pos>1 0</pos></vertex>
            <vertex><pos>0 1</pos></vertex>
            <indices>0 1 5</indices>
        </polygon></scene>"#,
    );
    let mut cmd = Command::cargo_bin("polygon-stage").expect("binary exists");
    cmd.arg(scene.path()).arg("--backend").arg("cpu");
    cmd.assert()
        .failure()
        .stderr(contains("index 5 is out of range for 3 vertices"));
}

#[test]
fn cli_requires_a_scene_path() {
    let mut cmd = Command::cargo_bin("polygon-stage").expect("binary exists");
    cmd.assert().failure().stderr(contains("Usage: polygon-stage"));
}
