//! rembg-remove CLI Tool
//!
//! Removes the background of one image and writes the result as a PNG.

#[cfg(feature = "cli")]
use rembg_remove::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<std::process::ExitCode> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
