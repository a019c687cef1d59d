//! Typed, validated configuration tree. Replaces the Python original's
//! module-level dict constants (`config.py`) plus the bare `assert`s that
//! followed each one; here the equivalent checks live in [`Config::validate`]
//! and fail with a [`ConfigError`] instead of aborting the process.

use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
};

pub type Timestamp = DateTime<Local>;

/// Order fixes the bit layout of `DasConfig.send_flag_bitmap`: bit
/// `channel * 4 + index_of(data_type)` is set iff the stream is requested.
pub const SEND_FLAG_ORDER: [DataType; 4] = [
    DataType::Intensity,
    DataType::VibRms,
    DataType::VibDemod,
    DataType::DiffDemod,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    DiffDemod,
    VibDemod,
    Intensity,
    VibRms,
}

impl DataType {
    fn send_flag_index(self) -> usize {
        SEND_FLAG_ORDER
            .iter()
            .position(|dt| *dt == self)
            .expect("SEND_FLAG_ORDER covers every DataType variant")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketConfig {
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            local_addr: "192.168.1.100:8009".parse().expect("valid literal"),
            remote_addr: "192.168.1.240:8007".parse().expect("valid literal"),
        }
    }
}

/// One receive-side data channel: the device emits frames of this kind at
/// `sample_rate_hz`, carrying `channel`'s data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    pub data_type: DataType,
    pub sample_rate_hz: u32,
    pub channel: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DasDeviceConfig {
    /// Raw per-pulse point count the device emits before valid-point trimming.
    pub data_size: u32,
    /// `[lo, hi)` sub-range of the raw point vector that is retained.
    pub valid_point_lo: u32,
    pub valid_point_hi: u32,
    pub pulse_width_ns: u32,
    #[serde(default = "default_optical_switch_flags")]
    pub optical_switch_flags: [bool; 32],
    #[serde(default)]
    pub optical_switch_counter_threshold: u32,
    pub streams: HashMap<String, StreamConfig>,
}

fn default_optical_switch_flags() -> [bool; 32] {
    [false; 32]
}

impl DasDeviceConfig {
    pub fn valid_points(&self) -> u32 {
        self.valid_point_hi - self.valid_point_lo
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameCounterConfig {
    pub interval_secs: u64,
    pub gist: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTargetConfig {
    pub prefix: String,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfig {
    pub enable: bool,
    #[serde(deserialize_with = "deserialize_local_datetime")]
    pub begin: Timestamp,
    #[serde(deserialize_with = "deserialize_local_datetime")]
    pub end: Timestamp,
    pub path: PathBuf,
    pub targets: HashMap<String, SaveTargetConfig>,
}

impl SaveConfig {
    pub fn interval_secs(&self, stream: &str) -> Option<u64> {
        self.targets.get(stream).map(|t| t.interval_secs)
    }
}

fn deserialize_local_datetime<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let naive = chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .map_err(serde::de::Error::custom)?;
    Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| serde::de::Error::custom(format!("ambiguous local time: {raw}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    pub enable: bool,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPongConfig {
    #[serde(default = "default_pingpong_size")]
    pub size: usize,
}

impl Default for PingPongConfig {
    fn default() -> Self {
        Self {
            size: default_pingpong_size(),
        }
    }
}

fn default_pingpong_size() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub socket: SocketConfig,
    pub das: DasDeviceConfig,
    pub frame_counter: FrameCounterConfig,
    pub handle_interval_secs: u64,
    #[serde(default)]
    pub strict_begin_target: Option<String>,
    pub save: SaveConfig,
    #[serde(default)]
    pub pingpong: PingPongConfig,
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Replays every `assert` from the Python `config.py` module as a typed,
    /// recoverable check instead of a process-aborting assertion.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.das.valid_point_lo < self.das.valid_point_hi
            && self.das.valid_point_hi <= self.das.data_size)
        {
            return Err(ConfigError::OutOfRange {
                field: "das.valid_point_range",
                detail: format!(
                    "[{}, {}) not within [0, {})",
                    self.das.valid_point_lo, self.das.valid_point_hi, self.das.data_size
                ),
            });
        }

        if !self.das.streams.contains_key(&self.frame_counter.gist) {
            return Err(ConfigError::UnknownStream(self.frame_counter.gist.clone()));
        }

        if let Some(target) = &self.strict_begin_target
            && !self.das.streams.contains_key(target)
        {
            return Err(ConfigError::UnknownStream(target.clone()));
        }

        for (name, target) in &self.save.targets {
            if !self.das.streams.contains_key(name) {
                return Err(ConfigError::UnknownStream(name.clone()));
            }
            if target.interval_secs % self.handle_interval_secs != 0 {
                return Err(ConfigError::IntervalNotMultiple {
                    stream: name.clone(),
                    save_interval: target.interval_secs,
                    handle_interval: self.handle_interval_secs,
                });
            }
        }

        if self.pingpong.size < 2 {
            return Err(ConfigError::RingTooSmall(self.pingpong.size));
        }

        if self.snapshot.enable && !self.das.streams.contains_key(&self.snapshot.target) {
            return Err(ConfigError::UnknownStream(self.snapshot.target.clone()));
        }

        for (name, stream) in &self.das.streams {
            if stream.channel > 1 {
                return Err(ConfigError::OutOfRange {
                    field: "das.streams.channel",
                    detail: format!("stream {name:?} has channel {}, must be 0 or 1", stream.channel),
                });
            }
        }

        Ok(())
    }

    /// Bytes per handle-interval block for one stream: `sample_rate * handle_interval * valid_points * 2`.
    pub fn block_bytes(&self, stream: &str) -> Option<usize> {
        let stream_cfg = self.das.streams.get(stream)?;
        Some(
            stream_cfg.sample_rate_hz as usize
                * self.handle_interval_secs as usize
                * self.das.valid_points() as usize
                * 2,
        )
    }

    /// Bytes per save-interval file for one stream, or `None` if it isn't configured for saving.
    pub fn save_cache_bytes(&self, stream: &str) -> Option<usize> {
        let stream_cfg = self.das.streams.get(stream)?;
        let interval = self.save.interval_secs(stream)?;
        Some(stream_cfg.sample_rate_hz as usize * interval as usize * self.das.valid_points() as usize * 2)
    }
}

pub(crate) use self::bitmap::{optical_switch_bitmap, send_flag_bitmap};

mod bitmap {
    use super::{Config, DataType, SEND_FLAG_ORDER};

    pub(crate) fn send_flag_bitmap(config: &Config) -> u32 {
        let mut bitmap: u32 = 0;
        for stream in config.das.streams.values() {
            let type_index = stream
                .data_type
                .send_flag_index();
            let bit = stream.channel as usize * SEND_FLAG_ORDER.len() + type_index;
            bitmap |= 1 << bit;
        }
        bitmap
    }

    pub(crate) fn optical_switch_bitmap(flags: &[bool; 32]) -> u32 {
        let mut bitmap: u32 = 0;
        for (i, flag) in flags.iter().enumerate() {
            if *flag {
                bitmap |= 1 << i;
            }
        }
        bitmap
    }

    #[allow(dead_code)]
    fn _assert_variants_match(dt: DataType) -> usize {
        match dt {
            DataType::Intensity | DataType::VibRms | DataType::VibDemod | DataType::DiffDemod => 0,
        }
    }
}
