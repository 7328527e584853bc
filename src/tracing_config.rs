//! Tracing configuration for the command line binary
//!
//! The library only emits events; the binary installs the subscriber. Output
//! always goes to stderr so stdout stays untouched, and the default level is
//! `warn` so a successful run is silent.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Primary filter variable, takes precedence over `RUST_LOG`
pub const ENV_LOG: &str = "REMBG_LOG";
/// Fallback filter variable
pub const ENV_RUST_LOG: &str = "RUST_LOG";
/// Filter used when neither variable is set
pub const DEFAULT_FILTER: &str = "warn";

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output with colors
    Console,
    /// Plain output without ANSI escapes
    Compact,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Environment filter string, `DEFAULT_FILTER` when unset
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve filter and format from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve filter and format through an arbitrary variable lookup
    ///
    /// `NO_COLOR` (any value) selects the plain format.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_filter = [ENV_LOG, ENV_RUST_LOG]
            .into_iter()
            .filter_map(&lookup)
            .find(|value| !value.trim().is_empty());

        let format = if lookup("NO_COLOR").is_some() {
            TracingFormat::Compact
        } else {
            TracingFormat::Console
        };

        Self { format, env_filter }
    }

    /// Set output format
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive that will be installed
    pub fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(DEFAULT_FILTER)
    }

    /// Install the global subscriber
    ///
    /// Also bridges `log` records from the backends into tracing.
    pub fn init(self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(self.filter_directive())?;
        let registry = Registry::default().with(filter);

        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(self.format == TracingFormat::Console)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .compact();

        registry.with(fmt_layer).try_init()?;
        Ok(())
    }
}
