//! Tracing setup for the `chatvault` binary.
//!
//! Every event goes to stderr so that replies streamed on stdout can be piped
//! cleanly. The filter is built per `chatvault::*` target from a preset chosen
//! by the verbosity flags, then `--log TARGET=LEVEL` overrides are applied on
//! top. `RUST_LOG`, when set, replaces all of it.

use std::collections::BTreeMap;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Namespace shared by all chatvault log targets.
pub const NAMESPACE: &str = "chatvault";

/// Targets emitted by the chatvault crates, without the namespace prefix.
pub const TARGETS: &[&str] = &[
    "db",
    "search",
    "lifecycle",
    "pipeline",
    "gemini",
    "export",
    "session",
    "startup",
];

/// Dependencies whose targets may be overridden by their bare name.
pub const EXTERNAL_TARGETS: &[&str] = &["reqwest", "hyper", "rusqlite"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Base verbosity, picked from the `-q/-v/-d/--trace` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Errors only
    Quiet,
    /// Warnings, plus deletes
    #[default]
    Production,
    Verbose,
    Debug,
    Trace,
}

impl LogPreset {
    /// The most specific flag wins; `--quiet` beats everything.
    pub fn from_flags(verbose: bool, debug: bool, trace: bool, quiet: bool) -> Self {
        match (quiet, trace, debug, verbose) {
            (true, ..) => LogPreset::Quiet,
            (_, true, ..) => LogPreset::Trace,
            (_, _, true, _) => LogPreset::Debug,
            (_, _, _, true) => LogPreset::Verbose,
            _ => LogPreset::Production,
        }
    }

    /// Level for one chatvault target (short name).
    pub fn level_for(self, target: &str) -> LevelFilter {
        match self {
            LogPreset::Quiet => LevelFilter::ERROR,
            LogPreset::Production if target == "lifecycle" => LevelFilter::INFO,
            LogPreset::Production => LevelFilter::WARN,
            LogPreset::Verbose => LevelFilter::INFO,
            // Transcript appends log at trace per message
            LogPreset::Debug if target == "export" => LevelFilter::INFO,
            LogPreset::Debug => LevelFilter::DEBUG,
            LogPreset::Trace => LevelFilter::TRACE,
        }
    }

    /// Default for everything outside the chatvault namespace.
    fn external_level(self) -> LevelFilter {
        match self {
            LogPreset::Quiet => LevelFilter::ERROR,
            LogPreset::Production | LogPreset::Verbose => LevelFilter::WARN,
            LogPreset::Debug => LevelFilter::INFO,
            LogPreset::Trace => LevelFilter::DEBUG,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    pub format: LogFormat,
    /// Full target name to level; later `--log` flags replace earlier ones.
    pub overrides: BTreeMap<String, LevelFilter>,
    /// `--log` entries that could not be parsed, reported once logging is up.
    pub rejected: Vec<String>,
}

impl LogConfig {
    pub fn new(preset: LogPreset, format: LogFormat) -> Self {
        Self {
            preset,
            format,
            ..Self::default()
        }
    }

    /// Apply `--log` values. Each may hold several comma-separated
    /// `target=level` pairs.
    pub fn with_overrides(mut self, values: &[String]) -> Self {
        for part in values.iter().flat_map(|v| v.split(',')) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match parse_override(part) {
                Some((targets, level)) => {
                    for target in targets {
                        self.overrides.insert(target, level);
                    }
                }
                None => self.rejected.push(part.to_string()),
            }
        }
        self
    }

    /// Filter directives for this configuration, ignoring `RUST_LOG`.
    pub fn directives(&self) -> String {
        let mut levels: BTreeMap<String, LevelFilter> = TARGETS
            .iter()
            .map(|t| (format!("{NAMESPACE}::{t}"), self.preset.level_for(t)))
            .collect();
        levels.extend(self.overrides.iter().map(|(t, l)| (t.clone(), *l)));

        std::iter::once(self.preset.external_level().to_string().to_lowercase())
            .chain(
                levels
                    .into_iter()
                    .map(|(target, level)| format!("{target}={}", level.to_string().to_lowercase())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }
        EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Parse `target=level` into full target names.
///
/// Short names gain the namespace prefix; the bare namespace expands to every
/// known target so it is not shadowed by the per-target defaults.
fn parse_override(part: &str) -> Option<(Vec<String>, LevelFilter)> {
    let (target, level) = part.split_once('=')?;
    let target = target.trim();
    let level: LevelFilter = level.trim().to_lowercase().parse().ok()?;
    if target.is_empty() {
        return None;
    }

    let targets = if target == NAMESPACE {
        TARGETS.iter().map(|t| format!("{NAMESPACE}::{t}")).collect()
    } else if target.starts_with(&format!("{NAMESPACE}::")) || EXTERNAL_TARGETS.contains(&target) {
        vec![target.to_string()]
    } else {
        vec![format!("{NAMESPACE}::{target}")]
    };
    Some((targets, level))
}

/// Build the subscriber, writing formatted events to `writer`.
fn subscriber<W>(filter: EnvFilter, format: LogFormat, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => Box::new(registry.with(fmt::layer().with_writer(writer).with_target(true))),
        LogFormat::Json => Box::new(
            registry.with(fmt::layer().json().with_writer(writer).with_target(true)),
        ),
    }
}

/// Install the global subscriber, logging to stderr.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    subscriber(config.filter(), config.format, std::io::stderr).try_init()?;
    for part in &config.rejected {
        tracing::warn!(target: "chatvault::startup", "Ignoring invalid --log value '{}'", part);
    }
    Ok(())
}
