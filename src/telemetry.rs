//! `tracing` subscriber setup: stdout layer, optional rolling file layer,
//! and log retention.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{FileLoggingConfig, LogFormat, LogRotation, LoggingConfig};
use crate::paths;

pub const LOG_ENV_VAR: &str = "PIXELROOM_LOG";
const LOG_FILE_PREFIX: &str = "pixelroom.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8, logging: LoggingConfig) -> Self {
        Self { verbosity, logging }
    }
}

/// Keeps the non-blocking file writer alive; drop it to flush.
pub struct TelemetryGuard {
    _guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber. A second call leaves the first in place.
pub fn init(config: TelemetryConfig) -> TelemetryGuard {
    let filter = build_filter(config.verbosity, config.logging.filter.as_deref());

    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.logging.stdout {
        layers.push(build_stdout_layer(config.logging.stdout_format));
    }

    let mut file_prune_report = None;
    let mut file_setup_error = None;
    if config.logging.file.enabled {
        let dir = resolve_log_dir(&config.logging.file);
        match fs::create_dir_all(&dir) {
            Ok(()) => {
                let retention = LogRetention::from_file_config(&config.logging.file);
                if retention.is_enabled() {
                    match retention.prune(&dir, LOG_FILE_PREFIX, SystemTime::now()) {
                        Ok(report) => file_prune_report = Some(report),
                        Err(err) => {
                            file_setup_error = Some(format!("log retention failed: {err}"));
                        }
                    }
                }

                let (layer, guard) = build_file_layer(&config.logging.file, &dir);
                layers.push(layer);
                guards.push(guard);
            }
            Err(err) => {
                file_setup_error =
                    Some(format!("log dir init failed for {}: {err}", dir.display()));
            }
        }
    }

    layers.push(Box::new(filter));

    if let Err(err) = Registry::default().with(layers).try_init() {
        tracing::debug!("subscriber already installed: {err}");
    }

    if let Some(report) = file_prune_report {
        tracing::info!(
            pruned = report.removed,
            failed = report.failed,
            candidates = report.candidates,
            "log retention applied"
        );
    }
    if let Some(error) = file_setup_error {
        tracing::warn!("{error}");
    }

    TelemetryGuard { _guards: guards }
}

/// `PIXELROOM_LOG` wins, then the configured filter, then verbosity.
fn build_filter(verbosity: u8, configured: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(level_from_verbosity(verbosity).into());
    if std::env::var_os(LOG_ENV_VAR).is_some() {
        return builder.with_env_var(LOG_ENV_VAR).from_env_lossy();
    }
    match configured {
        Some(directives) => builder.parse_lossy(directives),
        None => builder.parse_lossy(""),
    }
}

fn build_stdout_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Tree => Box::new(
            tracing_tree::HierarchicalLayer::new(2).with_writer(std::io::stderr),
        ),
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        ),
    }
}

fn build_file_layer(
    config: &FileLoggingConfig,
    dir: &Path,
) -> (BoxedLayer, tracing_appender::non_blocking::WorkerGuard) {
    let rotation = match config.rotation {
        LogRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        LogRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        LogRotation::Minutely => tracing_appender::rolling::Rotation::MINUTELY,
        LogRotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };
    let appender =
        tracing_appender::rolling::RollingFileAppender::new(rotation, dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer: BoxedLayer = match config.format {
        LogFormat::Tree => Box::new(
            tracing_tree::HierarchicalLayer::new(2)
                .with_ansi(false)
                .with_writer(writer),
        ),
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        ),
    };
    (layer, guard)
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::WARN,
        1 => tracing::metadata::LevelFilter::INFO,
        2 => tracing::metadata::LevelFilter::DEBUG,
        _ => tracing::metadata::LevelFilter::TRACE,
    }
}

fn resolve_log_dir(config: &FileLoggingConfig) -> PathBuf {
    config.dir.clone().unwrap_or_else(paths::log_dir)
}

/// How many rolled `pixelroom.log.*` files survive startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogRetention {
    pub max_age: Option<Duration>,
    pub max_files: Option<usize>,
}

impl LogRetention {
    pub fn from_file_config(config: &FileLoggingConfig) -> Self {
        Self {
            max_age: config
                .retention_max_age_days
                .map(|days| Duration::from_secs(days.saturating_mul(86_400))),
            max_files: config.retention_max_files,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some() || self.max_files.is_some()
    }

    /// Ranked newest first: a log goes once it is past `max_age` or past
    /// the `max_files` newest.
    fn expires(&self, rank: usize, age: Duration) -> bool {
        self.max_age.is_some_and(|max| age > max) || self.max_files.is_some_and(|max| rank >= max)
    }

    /// Delete expired logs under `dir`. Files not named `prefix*` are never touched.
    pub fn prune(&self, dir: &Path, prefix: &str, now: SystemTime) -> std::io::Result<PruneReport> {
        let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let is_log = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(prefix));
                let meta = entry.metadata()?;
                if is_log && meta.is_file() {
                    logs.push((meta.modified().unwrap_or(now), entry.path()));
                }
            }
        }
        logs.sort_by(|a, b| b.0.cmp(&a.0));

        let mut report = PruneReport {
            candidates: logs.len(),
            ..PruneReport::default()
        };
        for (rank, (modified, path)) in logs.iter().enumerate() {
            let age = now.duration_since(*modified).unwrap_or(Duration::ZERO);
            if !self.expires(rank, age) {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => report.removed += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::debug!("could not prune {}: {err}", path.display());
                }
            }
        }
        Ok(report)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub candidates: usize,
    pub removed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn write_log(dir: &Path, name: &str, age: Duration, now: SystemTime) {
        let path = dir.join(name);
        fs::write(&path, b"{}").expect("write log");
        let file = fs::File::options().write(true).open(&path).expect("open log");
        file.set_modified(now - age).expect("set mtime");
    }

    fn remaining(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn default_policy_keeps_two_weeks_of_sim_runs() {
        let retention = LogRetention::from_file_config(&FileLoggingConfig::default());
        assert_eq!(retention.max_age, Some(14 * DAY));
        assert_eq!(retention.max_files, Some(20));
        assert!(retention.is_enabled());
        assert!(!LogRetention::default().is_enabled());
    }

    #[test]
    fn age_and_count_limits_both_apply() {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = SystemTime::now();
        write_log(dir.path(), "pixelroom.log.2026-10-01", 13 * DAY, now);
        write_log(dir.path(), "pixelroom.log.2026-10-11", 3 * DAY, now);
        write_log(dir.path(), "pixelroom.log.2026-10-13", DAY, now);
        write_log(dir.path(), "pixelroom.log.2026-10-14", Duration::ZERO, now);

        let retention = LogRetention {
            max_age: Some(7 * DAY),
            max_files: Some(2),
        };
        let report = retention
            .prune(dir.path(), LOG_FILE_PREFIX, now)
            .expect("prune");

        assert_eq!(
            report,
            PruneReport {
                candidates: 4,
                removed: 2,
                failed: 0,
            }
        );
        assert_eq!(
            remaining(dir.path()),
            vec!["pixelroom.log.2026-10-13", "pixelroom.log.2026-10-14"]
        );
    }

    #[test]
    fn foreign_files_and_missing_dirs_are_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = SystemTime::now();
        write_log(dir.path(), "pixelroom.log.old", 30 * DAY, now);
        write_log(dir.path(), "canvas-export.json", 30 * DAY, now);

        let retention = LogRetention {
            max_age: Some(DAY),
            max_files: None,
        };
        let report = retention
            .prune(dir.path(), LOG_FILE_PREFIX, now)
            .expect("prune");
        assert_eq!(report.removed, 1);
        assert_eq!(remaining(dir.path()), vec!["canvas-export.json"]);

        let missing = dir.path().join("not-created-yet");
        let report = retention
            .prune(&missing, LOG_FILE_PREFIX, now)
            .expect("missing dir");
        assert_eq!(report, PruneReport::default());
    }

    #[test]
    fn verbosity_maps_to_levels() {
        use tracing::metadata::LevelFilter;
        assert_eq!(level_from_verbosity(0), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(1), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(2), LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(9), LevelFilter::TRACE);
    }
}
