//! Background Removal CLI Tool
//!
//! `rembg-remove <input_path> <output_path>` removes the background of one
//! image and writes the result as a PNG with an alpha channel.
//!
//! Exit status is 0 on success and 1 otherwise. Usage and missing-input
//! errors print a single fixed line to stderr before any model is loaded.

use crate::{
    cache::format_size,
    codec::{ImageCodec, PngCodec},
    config::RemovalConfig,
    download::ModelDownloader,
    inference::InferenceBackend,
    remove_background_file,
    remover::{BackgroundRemover, ModelRemover},
    tracing_config::TracingConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, info_span};

/// Printed to stderr for any argument list other than exactly two paths
pub const USAGE: &str = "Usage: rembg-remove <input_path> <output_path>";

/// Remove the background of an image and save it as PNG
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "rembg-remove")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Image file to process
    #[arg(value_name = "INPUT_PATH", allow_hyphen_values = true)]
    pub input_path: PathBuf,

    /// Where to write the PNG result
    #[arg(value_name = "OUTPUT_PATH", allow_hyphen_values = true)]
    pub output_path: PathBuf,
}

/// Reasons an invocation is rejected before any processing starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("{}", USAGE)]
    Usage,

    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
}

impl InvocationError {
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Usage => Outcome::UsageError,
            Self::InputNotFound(_) => Outcome::InputNotFound,
        }
    }
}

/// How a run ended when it did not fail with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    UsageError,
    InputNotFound,
}

impl Outcome {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::UsageError | Self::InputNotFound => 1,
        }
    }

    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

impl Cli {
    /// Parse a full argument list (program name first) and check the input path
    ///
    /// Exactly two arguments must follow the program name. They are always
    /// taken literally, so `--` and flag-like values are paths too. The input
    /// must be an existing regular file; directories count as missing.
    pub fn from_args<I, T>(args: I) -> std::result::Result<Self, InvocationError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let [program, input, output] = args.as_slice() else {
            return Err(InvocationError::Usage);
        };

        let cli = Self::try_parse_from([program, &OsString::from("--"), input, output])
            .map_err(|_| InvocationError::Usage)?;

        if !cli.input_path.is_file() {
            return Err(InvocationError::InputNotFound(cli.input_path));
        }

        Ok(cli)
    }
}

/// Run one invocation
///
/// `make_remover` is only called once the arguments are valid, so usage and
/// missing-input errors never load a model.
///
/// # Errors
/// Anything that fails after validation: remover construction, reading the
/// input, removal, or writing the output.
pub fn execute<I, T, W, C, F, R>(
    args: I,
    stderr: &mut W,
    codec: &C,
    make_remover: F,
) -> Result<Outcome>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    C: ImageCodec + ?Sized,
    F: FnOnce() -> Result<R>,
    R: BackgroundRemover,
{
    let cli = match Cli::from_args(args) {
        Ok(cli) => cli,
        Err(e) => {
            writeln!(stderr, "{e}").context("Failed to write to stderr")?;
            return Ok(e.outcome());
        },
    };

    let span = info_span!(
        "remove_background",
        input = %cli.input_path.display(),
        output = %cli.output_path.display(),
    );
    let _guard = span.enter();

    let start_time = Instant::now();
    let mut remover = make_remover().context("Failed to initialize background remover")?;

    remove_background_file(&cli.input_path, &cli.output_path, &mut remover, codec).with_context(
        || {
            format!(
                "Failed to remove background from {}",
                cli.input_path.display()
            )
        },
    )?;

    info!(
        elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0,
        "Saved {}",
        cli.output_path.display()
    );
    Ok(Outcome::Success)
}

/// Main CLI entry point
pub fn main() -> Result<ExitCode> {
    if let Err(e) = TracingConfig::from_env().init() {
        eprintln!("warning: logging disabled: {e:#}");
    }

    let codec = PngCodec::new();
    let outcome = execute(
        std::env::args_os(),
        &mut io::stderr(),
        &codec,
        build_remover,
    )?;
    Ok(outcome.exit_code())
}

fn build_remover() -> Result<ModelRemover<Box<dyn InferenceBackend>>> {
    let config = RemovalConfig::from_env().context("Invalid configuration")?;
    debug!(
        model = %config.model,
        backend = %config.backend,
        provider = %config.execution_provider,
        "Resolved configuration"
    );

    let model_path = ensure_model_available(&config)?;
    ModelRemover::from_config(config, model_path).context("Failed to create inference backend")
}

/// Locate the model file, downloading it into the cache on first use
fn ensure_model_available(config: &RemovalConfig) -> Result<PathBuf> {
    if let Some(path) = &config.model_path {
        anyhow::ensure!(path.is_file(), "Model file not found: {}", path.display());
        return Ok(path.clone());
    }

    let downloader = ModelDownloader::new().context("Failed to open model cache")?;
    if let Some(path) = downloader
        .verified_cached_model(config.model)
        .context("Failed to check cached model")?
    {
        debug!("Using cached model {}", path.display());
        return Ok(path);
    }
    let cache = downloader.cache();

    info!(
        "Downloading model {} into {}",
        config.model,
        cache.cache_dir().display()
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start download runtime")?;
    let path = runtime
        .block_on(downloader.ensure_model(config.model, io::stderr().is_terminal()))
        .with_context(|| format!("Failed to download model {}", config.model))?;

    if let Ok(meta) = std::fs::metadata(&path) {
        info!("Model ready ({})", format_size(meta.len()));
    }
    Ok(path)
}
