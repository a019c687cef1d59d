//! Block persister: consumes filled-buffer tasks, decides whether each falls
//! inside the configured save window, accumulates into a per-stream cache,
//! and flushes full caches to disk. Ports `DataHandler.save_data`.

use crate::{
    buffer::{PingPongRing, SaveCache},
    config::{Config, Timestamp},
    error::{PersistError, PersistResult},
    reassembler::Task,
};
use chrono::Duration as ChronoDuration;
use crossbeam::channel::Receiver;
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};

struct SaveTarget {
    prefix: String,
    window: ChronoDuration,
    cache: SaveCache,
    saving: bool,
}

pub struct Persister {
    rings: HashMap<String, PingPongRing>,
    targets: HashMap<String, SaveTarget>,
    save_path: PathBuf,
    save_begin: Timestamp,
    save_end: Timestamp,
}

/// Observable result of handling one task, mainly for tests; the running
/// loop logs these rather than returning them to a caller.
#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    NotConfigured,
    WindowMiss,
    Buffered,
    Written(PathBuf),
    SkippedExisting(PathBuf),
}

impl Persister {
    pub fn new(config: &Config, rings: HashMap<String, PingPongRing>) -> PersistResult<Self> {
        if config.save.enable && !config.save.path.exists() {
            fs::create_dir_all(&config.save.path).map_err(|source| PersistError::CreateDirError {
                path: config.save.path.clone(),
                source,
            })?;
        }

        let mut targets = HashMap::new();
        for (name, target_cfg) in &config.save.targets {
            let cache_bytes = config
                .save_cache_bytes(name)
                .unwrap_or_else(|| panic!("stream {name:?} referenced by save.targets is not in das.streams"));
            targets.insert(
                name.clone(),
                SaveTarget {
                    prefix: target_cfg.prefix.clone(),
                    window: ChronoDuration::seconds(target_cfg.interval_secs as i64),
                    cache: SaveCache::new(cache_bytes),
                    saving: false,
                },
            );
        }

        Ok(Self {
            rings,
            targets,
            save_path: config.save.path.clone(),
            save_begin: config.save.begin,
            save_end: config.save.end,
        })
    }

    /// Blocking loop: the dedicated persist-worker thread calls this directly
    /// (no async runtime involved — the whole point is a plain blocking
    /// thread polling the task queue with a timeout, matching the original's
    /// single extra worker process).
    pub fn run(mut self, task_rx: Receiver<Task>, shutdown: impl Fn() -> bool) {
        loop {
            match task_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(task) => {
                    if let Err(e) = self.handle_task(&task) {
                        tracing::error!(stream = %task.stream, error = %e, "fatal persist error, stopping persist worker");
                        return;
                    }
                }
                Err(crossbeam::channel::RecvTimeoutError::Timeout) => {
                    if shutdown() {
                        return;
                    }
                }
                Err(crossbeam::channel::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn handle_task(&mut self, task: &Task) -> PersistResult<SaveOutcome> {
        let Some(target) = self.targets.get_mut(&task.stream) else {
            return Ok(SaveOutcome::NotConfigured);
        };

        let window_start = self.save_begin - target.window;
        let window_end_bound = self.save_end + target.window;
        if !(window_start <= task.window_end && task.window_end <= window_end_bound) {
            if target.saving {
                info!(stream = %task.stream, "stopped saving (window closed)");
                target.saving = false;
            }
            return Ok(SaveOutcome::WindowMiss);
        }

        if !target.saving {
            info!(stream = %task.stream, "started saving");
            target.saving = true;
        }

        let ring = self
            .rings
            .get(&task.stream)
            .unwrap_or_else(|| panic!("no ping-pong ring for stream {:?}", task.stream));
        let full = ring.with_buffer(task.buf_index, |buf| target.cache.append(buf));

        if !full {
            return Ok(SaveOutcome::Buffered);
        }

        let path = file_path(&self.save_path, &target.prefix, task.window_end);
        if path.exists() {
            warn!(path = %path.display(), "save file already exists, skipping write");
            target.cache.reset();
            return Ok(SaveOutcome::SkippedExisting(path));
        }

        write_atomically(&path, target.cache.take_and_reset()).map_err(|source| PersistError::IoError {
            path: path.clone(),
            source,
        })?;
        Ok(SaveOutcome::Written(path))
    }
}

fn file_path(save_path: &Path, prefix: &str, window_end: Timestamp) -> PathBuf {
    let stamp = window_end.format("%Y-%m-%d_%H-%M-%S%.3f");
    save_path.join(format!("{prefix}{stamp}.dat"))
}

/// Writes `bytes` to `path` via a temp-file-then-rename so a concurrent
/// reader (or a crash mid-write) never observes a partial file.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("dat.tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}
