use std::str::FromStr;

use super::{Config, ConfigLayer};

pub const ENV_CELL_SIZE: &str = "PIXELROOM_CELL_SIZE";
pub const ENV_CAPACITY: &str = "PIXELROOM_CAPACITY";
pub const ENV_DRAW_COOLDOWN_SECONDS: &str = "PIXELROOM_DRAW_COOLDOWN_SECONDS";
pub const ENV_MAX_PARTICIPANTS: &str = "PIXELROOM_MAX_PARTICIPANTS";

pub fn merge_layers(user: Option<ConfigLayer>, project: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = project {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_with(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and skipped.
pub fn apply_env_overrides_with(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(value) = parse_env::<f64>(&lookup, ENV_CELL_SIZE) {
        if value.is_finite() && value > 0.0 {
            config.canvas.cell_size = value;
        } else {
            tracing::warn!("invalid {ENV_CELL_SIZE}, ignoring: {value} is not positive");
        }
    }

    if let Some(value) = parse_env::<usize>(&lookup, ENV_CAPACITY) {
        config.canvas.capacity = value;
    }

    if let Some(value) = parse_env::<f64>(&lookup, ENV_DRAW_COOLDOWN_SECONDS) {
        if value.is_finite() && value >= 0.0 {
            config.brush.draw_cooldown_seconds = value;
        } else {
            tracing::warn!("invalid {ENV_DRAW_COOLDOWN_SECONDS}, ignoring: {value} is negative");
        }
    }

    if let Some(value) = parse_env::<usize>(&lookup, ENV_MAX_PARTICIPANTS) {
        if value > 0 {
            config.replication.max_participants = value;
        } else {
            tracing::warn!("invalid {ENV_MAX_PARTICIPANTS}, ignoring: must be at least 1");
        }
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}
