use std::fs;
use std::process::Command;

use tempfile::TempDir;

const FRAGMENT: &str = "#include <common.glsl>\nuniform vec3 u_campos;\nin vec2 v_uv;\nout vec4 color;\nvoid main() { color = shade(v_uv); }\n";

fn write_job_file(root: &std::path::Path, fragment: &str) -> std::path::PathBuf {
    let shaders = root.join("shaders");
    fs::create_dir_all(shaders.join("gl")).unwrap();
    fs::write(
        shaders.join("common.glsl"),
        "vec4 shade(vec2 uv) { return vec4(uv, 0.0, 1.0); }\n",
    )
    .unwrap();
    fs::write(shaders.join("gl/imposter.fs"), FRAGMENT).unwrap();
    fs::write(
        shaders.join("step.glsl"),
        "layout(local_size_x = 1) in;\n// %X %WIDTH\nvoid main() {}\n",
    )
    .unwrap();

    let file = root.join("jobs.toml");
    fs::write(
        &file,
        format!(
            r#"
version = 1

[defaults]
shader_root = "shaders"
output_dir = "bakes"

[[jobs]]
kind = "imposter"
name = "tree"
fragment = "{fragment}"
resolution = 64
n_row = 4

[[jobs]]
kind = "compute"
name = "noise"
shader = "step.glsl"
width = 8
height = 8
"#
        ),
    )
    .unwrap();
    file
}

#[test]
fn dry_run_resolves_every_job() {
    let root = TempDir::new().unwrap();
    let file = write_job_file(root.path(), "gl/imposter.fs");

    let output = Command::new(env!("CARGO_BIN_EXE_shaderbake"))
        .args(["jobs", "--dry-run"])
        .arg(&file)
        .output()
        .expect("failed to run shaderbake jobs --dry-run");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tree"));
    assert!(stdout.contains("noise"));
    assert!(stdout.contains("tree.png"));
    assert!(!root.path().join("bakes").exists());
}

#[test]
fn dry_run_reports_missing_sources() {
    let root = TempDir::new().unwrap();
    let file = write_job_file(root.path(), "gl/missing.fs");

    let output = Command::new(env!("CARGO_BIN_EXE_shaderbake"))
        .args(["jobs", "--dry-run"])
        .arg(&file)
        .output()
        .expect("failed to run shaderbake jobs --dry-run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("gl/missing.fs"));
}

#[test]
fn invalid_job_file_is_rejected() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("jobs.toml");
    fs::write(&file, "version = 1\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_shaderbake"))
        .args(["jobs", "--dry-run"])
        .arg(&file)
        .status()
        .expect("failed to run shaderbake");

    assert!(!status.success());
}
