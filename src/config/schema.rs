use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{CanvasStore, CoreError, Grid, Rgba};
use crate::sync::{BrushState, BusError, BusLimits, SessionSettings};

use super::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub canvas: CanvasConfig,
    pub brush: BrushConfig,
    pub replication: ReplicationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject settings the canvas cannot run with. Capacity 0 is allowed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.canvas.cell_size.is_finite() || self.canvas.cell_size <= 0.0 {
            return Err(invalid(
                "canvas.cell_size",
                format!("must be positive and finite, got {}", self.canvas.cell_size),
            ));
        }
        if self.canvas.capacity == 0 {
            tracing::warn!("canvas.capacity is 0; every placed cell is evicted immediately");
        }
        if self.canvas.tombstone_limit == 0 {
            tracing::warn!("canvas.tombstone_limit is 0; late writes can outlive an erase");
        }

        let brush = &self.brush;
        brush
            .default_color
            .validate()
            .map_err(|e| invalid("brush.default_color", e.to_string()))?;
        if !brush.min_size.is_finite() || brush.min_size <= 0.0 {
            return Err(invalid(
                "brush.min_size",
                format!("must be positive and finite, got {}", brush.min_size),
            ));
        }
        if !brush.max_size.is_finite() || brush.min_size > brush.max_size {
            return Err(invalid(
                "brush.max_size",
                format!(
                    "must be finite and at least min_size {}, got {}",
                    brush.min_size, brush.max_size
                ),
            ));
        }
        if !brush.default_size.is_finite() {
            return Err(invalid("brush.default_size", "must be finite".to_string()));
        }
        if !brush.draw_cooldown_seconds.is_finite() || brush.draw_cooldown_seconds < 0.0 {
            return Err(invalid(
                "brush.draw_cooldown_seconds",
                format!(
                    "must be non-negative, got {}",
                    brush.draw_cooldown_seconds
                ),
            ));
        }
        if !brush.min_stroke_distance.is_finite() || brush.min_stroke_distance < 0.0 {
            return Err(invalid(
                "brush.min_stroke_distance",
                format!("must be non-negative, got {}", brush.min_stroke_distance),
            ));
        }
        if !brush.erase_radius_multiplier.is_finite() || brush.erase_radius_multiplier <= 0.0 {
            return Err(invalid(
                "brush.erase_radius_multiplier",
                format!("must be positive, got {}", brush.erase_radius_multiplier),
            ));
        }

        let replication = &self.replication;
        if replication.max_participants == 0 {
            return Err(invalid(
                "replication.max_participants",
                "must be at least 1".to_string(),
            ));
        }
        if replication.channel_capacity == 0 {
            return Err(invalid(
                "replication.channel_capacity",
                "must be at least 1".to_string(),
            ));
        }
        if replication.max_frame_bytes <= crate::sync::frame::FRAME_HEADER_LEN {
            return Err(invalid(
                "replication.max_frame_bytes",
                format!(
                    "must exceed the {}-byte frame header",
                    crate::sync::frame::FRAME_HEADER_LEN
                ),
            ));
        }
        Ok(())
    }

    pub fn grid(&self) -> Result<Grid, CoreError> {
        Grid::new(self.canvas.cell_size)
    }

    pub fn canvas_store(&self) -> Result<CanvasStore, CoreError> {
        Ok(CanvasStore::new(self.grid()?, self.canvas.capacity)
            .with_tombstone_limit(self.canvas.tombstone_limit))
    }

    pub fn session_settings(&self) -> SessionSettings {
        let brush = &self.brush;
        let cooldown_ms = (brush.draw_cooldown_seconds.max(0.0) * 1000.0).round() as u64;
        SessionSettings {
            initial_brush: BrushState::new(brush.default_color, brush.default_size),
            min_size: brush.min_size,
            max_size: brush.max_size,
            erase_radius_multiplier: brush.erase_radius_multiplier,
            draw_cooldown_ms: cooldown_ms,
            min_stroke_distance: brush.min_stroke_distance,
            dedup_window: self.replication.dedup_window,
            max_frame_bytes: self.replication.max_frame_bytes,
            max_clock_skew_ms: self.replication.max_clock_skew_ms,
        }
    }

    pub fn bus_limits(&self) -> Result<BusLimits, BusError> {
        BusLimits::new(
            self.replication.max_participants,
            self.replication.channel_capacity,
        )
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub cell_size: f64,
    pub capacity: usize,
    /// Erase marks kept against late writes.
    pub tombstone_limit: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            capacity: 1000,
            tombstone_limit: crate::core::DEFAULT_TOMBSTONE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub default_color: Rgba,
    pub default_size: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub draw_cooldown_seconds: f64,
    pub min_stroke_distance: f64,
    pub erase_radius_multiplier: f64,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            default_color: Rgba::RED,
            default_size: 1.0,
            min_size: 0.1,
            max_size: 10.0,
            draw_cooldown_seconds: 0.05,
            min_stroke_distance: 0.5,
            erase_radius_multiplier: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub dedup_window: usize,
    pub max_participants: usize,
    pub channel_capacity: usize,
    pub max_frame_bytes: usize,
    pub max_clock_skew_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            dedup_window: crate::sync::dedup::DEFAULT_DEDUP_WINDOW,
            max_participants: crate::sync::transport::DEFAULT_MAX_PARTICIPANTS,
            channel_capacity: crate::sync::transport::DEFAULT_CHANNEL_CAPACITY,
            max_frame_bytes: crate::sync::frame::DEFAULT_MAX_FRAME_BYTES,
            max_clock_skew_ms: crate::sync::session::DEFAULT_MAX_CLOCK_SKEW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Tree,
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Tree,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
            retention_max_age_days: Some(14),
            retention_max_files: Some(20),
        }
    }
}

/// A partial config read from one file. Unset fields keep the lower layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub canvas: CanvasConfigOverride,
    pub brush: BrushConfigOverride,
    pub replication: ReplicationConfigOverride,
    pub logging: LoggingConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        self.canvas.apply_to(&mut base.canvas);
        self.brush.apply_to(&mut base.brush);
        self.replication.apply_to(&mut base.replication);
        self.logging.apply_to(&mut base.logging);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfigOverride {
    pub cell_size: Option<f64>,
    pub capacity: Option<usize>,
    pub tombstone_limit: Option<usize>,
}

impl CanvasConfigOverride {
    pub fn apply_to(&self, target: &mut CanvasConfig) {
        if let Some(cell_size) = self.cell_size {
            target.cell_size = cell_size;
        }
        if let Some(capacity) = self.capacity {
            target.capacity = capacity;
        }
        if let Some(limit) = self.tombstone_limit {
            target.tombstone_limit = limit;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfigOverride {
    pub default_color: Option<Rgba>,
    pub default_size: Option<f32>,
    pub min_size: Option<f32>,
    pub max_size: Option<f32>,
    pub draw_cooldown_seconds: Option<f64>,
    pub min_stroke_distance: Option<f64>,
    pub erase_radius_multiplier: Option<f64>,
}

impl BrushConfigOverride {
    pub fn apply_to(&self, target: &mut BrushConfig) {
        if let Some(color) = self.default_color {
            target.default_color = color;
        }
        if let Some(size) = self.default_size {
            target.default_size = size;
        }
        if let Some(size) = self.min_size {
            target.min_size = size;
        }
        if let Some(size) = self.max_size {
            target.max_size = size;
        }
        if let Some(seconds) = self.draw_cooldown_seconds {
            target.draw_cooldown_seconds = seconds;
        }
        if let Some(distance) = self.min_stroke_distance {
            target.min_stroke_distance = distance;
        }
        if let Some(multiplier) = self.erase_radius_multiplier {
            target.erase_radius_multiplier = multiplier;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfigOverride {
    pub dedup_window: Option<usize>,
    pub max_participants: Option<usize>,
    pub channel_capacity: Option<usize>,
    pub max_frame_bytes: Option<usize>,
    pub max_clock_skew_ms: Option<u64>,
}

impl ReplicationConfigOverride {
    pub fn apply_to(&self, target: &mut ReplicationConfig) {
        if let Some(window) = self.dedup_window {
            target.dedup_window = window;
        }
        if let Some(max) = self.max_participants {
            target.max_participants = max;
        }
        if let Some(capacity) = self.channel_capacity {
            target.channel_capacity = capacity;
        }
        if let Some(bytes) = self.max_frame_bytes {
            target.max_frame_bytes = bytes;
        }
        if let Some(skew) = self.max_clock_skew_ms {
            target.max_clock_skew_ms = skew;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(days) = self.retention_max_age_days {
            target.retention_max_age_days = Some(days);
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}
