//! Layered error taxonomy for the acquisition core, one enum per subsystem,
//! following the same from-conversion chaining the rest of the corpus uses.

use miette::Diagnostic;
use std::{io, net::AddrParseError, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("I/O error reading config: {0}")]
    IoError(#[from] io::Error),
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddrParseError),
    #[error("{field} is out of range: {detail}")]
    OutOfRange { field: &'static str, detail: String },
    #[error("stream {0:?} is referenced but not defined under streams")]
    UnknownStream(String),
    #[error("save interval for stream {stream:?} ({save_interval}s) is not a multiple of handle_interval ({handle_interval}s)")]
    IntervalNotMultiple {
        stream: String,
        save_interval: u64,
        handle_interval: u64,
    },
    #[error("ping-pong ring size must be >= 2, got {0}")]
    RingTooSmall(usize),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Outcome of attempting to decode one frame out of a byte buffer. `NeedMore` is
/// not an error — it means the buffer does not yet contain a complete frame.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Error, Debug, Diagnostic)]
pub enum IngestError {
    #[error("I/O error on acquisition socket: {0}")]
    IoError(#[from] io::Error),
    #[error("config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("failed to spawn receive worker thread: {0}")]
    SpawnError(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug, Diagnostic)]
pub enum PersistError {
    #[error("I/O error writing block to {path}: {source}")]
    IoError { path: PathBuf, source: io::Error },
    #[error("failed to create save directory {path}: {source}")]
    CreateDirError { path: PathBuf, source: io::Error },
}

pub type PersistResult<T> = Result<T, PersistError>;

#[derive(Error, Debug, Diagnostic)]
pub enum DasCoreError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

pub type DasCoreResult<T> = Result<T, DasCoreError>;
