//! End-to-end tests of the `rembg-remove` binary
//!
//! These cover the paths that never reach a real model: argument errors,
//! missing inputs, bad configuration, and model load failures. A successful
//! run needs a segmentation model, so that path is covered through
//! `cli::execute` with a stub remover in `src/cli/main.rs` and
//! `tests/removal_workflows.rs`.

#![cfg(feature = "cli")]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const BINARY: &str = env!("CARGO_BIN_EXE_rembg-remove");
const USAGE_LINE: &str = "Usage: rembg-remove <input_path> <output_path>";

fn command(cache_dir: &Path) -> Command {
    let mut cmd = Command::new(BINARY);
    cmd.env_remove("REMBG_LOG")
        .env_remove("RUST_LOG")
        .env_remove("REMBG_MODEL")
        .env_remove("REMBG_BACKEND")
        .env_remove("REMBG_MODEL_PATH")
        .env("U2NET_HOME", cache_dir)
        .env("NO_COLOR", "1");
    cmd
}

fn run_binary(args: &[&str], cache_dir: &Path) -> Output {
    command(cache_dir)
        .args(args)
        .output()
        .expect("Failed to run rembg-remove")
}

fn write_jpeg(path: &Path) {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb([200, 30, 30])))
        .save_with_format(path, ImageFormat::Jpeg)
        .expect("Failed to write test image");
}

#[test]
fn test_no_arguments_prints_usage() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_binary(&[], temp_dir.path());

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stderr).trim_end(), USAGE_LINE);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_wrong_argument_counts_print_usage() {
    let temp_dir = TempDir::new().unwrap();
    for args in [&["only-one.jpg"][..], &["a.jpg", "b.png", "c.png"][..]] {
        let output = run_binary(args, temp_dir.path());
        assert_eq!(output.status.code(), Some(1), "args: {args:?}");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim_end(), USAGE_LINE);
    }
}

#[test]
fn test_separator_counts_as_an_argument() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("photo.jpg");
    let out = temp_dir.path().join("out.png");
    write_jpeg(&input);
    let input = input.to_str().unwrap();
    let out_str = out.to_str().unwrap();

    for args in [
        &["--", input, out_str][..],
        &[input, "--", out_str][..],
    ] {
        let output = run_binary(args, temp_dir.path());
        assert_eq!(output.status.code(), Some(1), "args: {args:?}");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim_end(), USAGE_LINE);
    }
    assert!(!out.exists());
}

#[test]
fn test_missing_input_reports_path_and_leaves_no_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("missing.jpg");
    let out = temp_dir.path().join("out.png");

    let output = run_binary(
        &[input.to_str().unwrap(), out.to_str().unwrap()],
        temp_dir.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr).trim_end(),
        format!("Input file not found: {}", input.display())
    );
    assert!(!out.exists());
    // No model download was attempted
    assert!(!temp_dir.path().join("u2net.onnx").exists());
}

#[test]
fn test_corrupt_model_fails_without_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("photo.jpg");
    let model = temp_dir.path().join("broken.onnx");
    let out = temp_dir.path().join("out.png");
    write_jpeg(&input);
    std::fs::write(&model, b"definitely not an onnx graph").unwrap();

    let output = command(temp_dir.path())
        .arg(&input)
        .arg(&out)
        .env("REMBG_MODEL_PATH", &model)
        .env("REMBG_BACKEND", "tract")
        .output()
        .expect("Failed to run rembg-remove");

    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
    assert!(!out.exists());
}

#[test]
fn test_invalid_configuration_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("photo.jpg");
    let out = temp_dir.path().join("out.png");
    write_jpeg(&input);

    let output = command(temp_dir.path())
        .arg(&input)
        .arg(&out)
        .env("REMBG_MODEL", "not-a-model")
        .output()
        .expect("Failed to run rembg-remove");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not-a-model"), "stderr: {stderr}");
    assert!(!out.exists());
}
