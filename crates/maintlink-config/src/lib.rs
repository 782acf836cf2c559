//! Configuration for maintlink.
//!
//! One TOML file plus `MAINTLINK_*` environment overrides, validated and
//! translated into `maintlink_core::ConsoleConfig`. Nested keys use a
//! double underscore in the environment: `MAINTLINK_API__BASE_URL`,
//! `MAINTLINK_CHANNELS__MOTOR__DELAY_MS`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use maintlink_core::{
    Channel, ChannelConfig, ChannelSettings, ConsoleConfig, HealthConfig, StreamConfig,
};

/// Default board service root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:4321/api/v1";

const ENV_PREFIX: &str = "MAINTLINK_";

/// `MAINTLINK_*` variables read by CLI flags rather than the config tree.
const CLI_ONLY_ENV: [&str; 5] = ["config", "api_url", "output", "color", "timeout_ms"];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSection,
    pub channels: ChannelsSection,
    pub health: HealthSection,
    pub stream: StreamSection,
    pub mode: ModeSection,
    pub pollers: PollersSection,
    pub measurement: MeasurementSection,
}

/// Board service endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    /// Feed URL. Derived from `base_url` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            stream_url: None,
            timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl ApiSection {
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|e| invalid("api.base_url", format!("{e}: {}", self.base_url)))
    }

    /// Explicit feed URL, if one is configured.
    pub fn stream_url(&self) -> Result<Option<Url>, ConfigError> {
        self.stream_url
            .as_deref()
            .map(|raw| Url::parse(raw).map_err(|e| invalid("api.stream_url", format!("{e}: {raw}"))))
            .transpose()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Pacing and retry budget for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelSection {
    pub delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl ChannelSection {
    fn defaults_for(channel: Channel) -> Self {
        let defaults = ChannelConfig::for_channel(channel);
        Self {
            delay_ms: millis(defaults.command_delay),
            max_retries: defaults.max_retries,
            retry_delay_ms: millis(defaults.retry_delay),
            timeout_ms: millis(defaults.command_timeout),
        }
    }

    fn to_channel_config(&self, channel: Channel) -> Result<ChannelConfig, ConfigError> {
        if self.timeout_ms == 0 {
            return Err(invalid(format!("channels.{channel}.timeout_ms"), "must be greater than zero"));
        }
        Ok(ChannelConfig {
            command_delay: Duration::from_millis(self.delay_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            command_timeout: Duration::from_millis(self.timeout_ms),
        })
    }
}

/// Missing fields in a partial `[channels.X]` table fall back to that
/// channel's own defaults, not another channel's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelsSection {
    pub sensor: ChannelSection,
    pub motor: ChannelSection,
    pub system: ChannelSection,
}

impl Default for ChannelsSection {
    fn default() -> Self {
        Self {
            sensor: ChannelSection::defaults_for(Channel::Sensor),
            motor: ChannelSection::defaults_for(Channel::Motor),
            system: ChannelSection::defaults_for(Channel::System),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelsSection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize, Default)]
        struct PartialChannel {
            delay_ms: Option<u64>,
            max_retries: Option<u32>,
            retry_delay_ms: Option<u64>,
            timeout_ms: Option<u64>,
        }

        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct PartialChannels {
            sensor: PartialChannel,
            motor: PartialChannel,
            system: PartialChannel,
        }

        fn merge(partial: PartialChannel, channel: Channel) -> ChannelSection {
            let base = ChannelSection::defaults_for(channel);
            ChannelSection {
                delay_ms: partial.delay_ms.unwrap_or(base.delay_ms),
                max_retries: partial.max_retries.unwrap_or(base.max_retries),
                retry_delay_ms: partial.retry_delay_ms.unwrap_or(base.retry_delay_ms),
                timeout_ms: partial.timeout_ms.unwrap_or(base.timeout_ms),
            }
        }

        let partial = PartialChannels::deserialize(deserializer)?;
        Ok(Self {
            sensor: merge(partial.sensor, Channel::Sensor),
            motor: merge(partial.motor, Channel::Motor),
            system: merge(partial.system, Channel::System),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSection {
    pub enabled: bool,
    pub interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub channels: Vec<String>,
}

impl Default for HealthSection {
    fn default() -> Self {
        let defaults = HealthConfig::default();
        Self {
            enabled: defaults.enabled,
            interval_ms: millis(defaults.interval),
            probe_timeout_ms: millis(defaults.probe_timeout),
            channels: defaults.channels.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamSection {
    pub enabled: bool,
    pub reconnect_delay_ms: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        let defaults = StreamConfig::default();
        Self {
            enabled: defaults.enabled,
            reconnect_delay_ms: millis(defaults.reconnect_delay),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModeSection {
    /// 0 disables polling; mode then follows feed pushes only.
    pub poll_interval_ms: u64,
}

impl Default for ModeSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
        }
    }
}

/// Mode-gated background polling. 0 disables a producer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollersSection {
    pub sensor_values_ms: u64,
    pub general_status_ms: u64,
    pub fill_level_ms: u64,
}

impl Default for PollersSection {
    fn default() -> Self {
        Self {
            sensor_values_ms: 1_000,
            general_status_ms: 5_000,
            fill_level_ms: 10_000,
        }
    }
}

impl PollersSection {
    fn enabled(ms: u64) -> Option<Duration> {
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    pub fn sensor_values(&self) -> Option<Duration> {
        Self::enabled(self.sensor_values_ms)
    }

    pub fn general_status(&self) -> Option<Duration> {
        Self::enabled(self.general_status_ms)
    }

    pub fn fill_level(&self) -> Option<Duration> {
        Self::enabled(self.fill_level_ms)
    }
}

/// Continuous weight measurement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MeasurementSection {
    pub interval_ms: u64,
}

impl Default for MeasurementSection {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

impl MeasurementSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    /// Check everything `to_console_config` and the CLI rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api.base_url()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("api.base_url", format!("expected http or https, got {}", base.scheme())));
        }
        if let Some(stream) = self.api.stream_url()? {
            if !matches!(stream.scheme(), "ws" | "wss") {
                return Err(invalid("api.stream_url", format!("expected ws or wss, got {}", stream.scheme())));
            }
        }
        if self.api.timeout_ms == 0 {
            return Err(invalid("api.timeout_ms", "must be greater than zero"));
        }
        if self.measurement.interval_ms == 0 {
            return Err(invalid("measurement.interval_ms", "must be greater than zero"));
        }
        self.to_console_config().map(|_| ())
    }

    pub fn to_console_config(&self) -> Result<ConsoleConfig, ConfigError> {
        let channels = ChannelSettings {
            sensor: self.channels.sensor.to_channel_config(Channel::Sensor)?,
            motor: self.channels.motor.to_channel_config(Channel::Motor)?,
            system: self.channels.system.to_channel_config(Channel::System)?,
        };

        if self.health.enabled && self.health.interval_ms == 0 {
            return Err(invalid("health.interval_ms", "must be greater than zero when health probing is enabled"));
        }
        if self.health.probe_timeout_ms == 0 {
            return Err(invalid("health.probe_timeout_ms", "must be greater than zero"));
        }
        let probe_channels = self
            .health
            .channels
            .iter()
            .map(|name| {
                Channel::from_str(name).map_err(|_| {
                    invalid("health.channels", format!("unknown channel '{name}', expected sensor, motor or system"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if self.stream.enabled && self.stream.reconnect_delay_ms == 0 {
            return Err(invalid("stream.reconnect_delay_ms", "must be greater than zero"));
        }

        Ok(ConsoleConfig {
            channels,
            health: HealthConfig {
                enabled: self.health.enabled,
                interval: Duration::from_millis(self.health.interval_ms),
                probe_timeout: Duration::from_millis(self.health.probe_timeout_ms),
                channels: probe_channels,
            },
            stream: StreamConfig {
                enabled: self.stream.enabled,
                reconnect_delay: Duration::from_millis(self.stream.reconnect_delay_ms),
            },
            mode_poll_interval: (self.mode.poll_interval_ms > 0)
                .then(|| Duration::from_millis(self.mode.poll_interval_ms)),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "maintlink", "maintlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("maintlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Layer defaults, the TOML file (if present), and the environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&CLI_ONLY_ENV).split("__"))
}

/// Load and validate the config. `None` uses [`config_path`].
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be loaded.
pub fn load_config_or_default(path: Option<&Path>) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it. Returns the path written.
pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(path)
}
