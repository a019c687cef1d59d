//! Ping-pong reassembly: copies each matching command's body into the
//! current buffer of its stream's ring, handing filled buffers off to the
//! persister via a task queue. Ports `DataRecorder` from the original driver.

use crate::{
    buffer::PingPongRing,
    config::{Config, Timestamp},
    protocol::{CommandKind, kind_for_data_type},
};
use chrono::Local;
use crossbeam::channel::Sender;
use std::collections::HashMap;
use tracing::error;

/// Handed from the Reassembler to the Persister once a ring buffer fills.
#[derive(Debug, Clone)]
pub struct Task {
    pub stream: String,
    pub buf_index: usize,
    pub window_end: Timestamp,
}

struct StreamState {
    ring: PingPongRing,
    cursor: usize,
    offset: usize,
    valid_point_lo: usize,
    valid_bytes: usize,
}

pub struct Reassembler {
    streams: HashMap<CommandKind, Vec<String>>,
    state: HashMap<String, StreamState>,
    raw_point_bytes: usize,
    /// `now < gate_until` ⇒ every command is dropped, regardless of stream.
    /// `None` when `strict_begin_target` isn't configured.
    gate_until: Option<Timestamp>,
    task_tx: Sender<Task>,
}

impl Reassembler {
    pub fn new(config: &Config, rings: HashMap<String, PingPongRing>, task_tx: Sender<Task>) -> Self {
        let mut streams: HashMap<CommandKind, Vec<String>> = HashMap::new();
        let mut state = HashMap::new();

        for (name, stream_cfg) in &config.das.streams {
            let kind = kind_for_data_type(stream_cfg.data_type);
            streams.entry(kind).or_default().push(name.clone());

            let ring = rings
                .get(name)
                .unwrap_or_else(|| panic!("no ping-pong ring allocated for stream {name:?}"))
                .clone();
            state.insert(
                name.clone(),
                StreamState {
                    ring,
                    cursor: 0,
                    offset: 0,
                    valid_point_lo: config.das.valid_point_lo as usize,
                    valid_bytes: config.das.valid_points() as usize * 2,
                },
            );
        }

        let gate_until = config.strict_begin_target.as_deref().and_then(|target| {
            let interval_secs = config.save.interval_secs(target)?;
            Some(config.save.begin - chrono::Duration::seconds(interval_secs as i64))
        });

        Self {
            streams,
            state,
            raw_point_bytes: config.das.data_size as usize * 2,
            gate_until,
            task_tx,
        }
    }

    /// Feeds one decoded command's body. `kind` must be a data-stream kind;
    /// anything else is ignored here (loss accounting and snapshotting
    /// subscribe to the same event independently).
    pub fn on_command(&mut self, kind: CommandKind, body: &[u8]) {
        let Some(names) = self.streams.get(&kind) else {
            return;
        };
        let names = names.clone();

        if let Some(gate_until) = self.gate_until
            && Local::now() < gate_until
        {
            return;
        }

        if body.len() != self.raw_point_bytes {
            error!(expected = self.raw_point_bytes, actual = body.len(), "invalid data size");
            return;
        }

        for name in names {
            self.write_and_advance(&name, body, Local::now());
        }
    }

    fn write_and_advance(&mut self, name: &str, body: &[u8], now: Timestamp) {
        let slice_start = self.state[name].valid_point_lo * 2;
        let slice = &body[slice_start..slice_start + self.state[name].valid_bytes];

        let state = self.state.get_mut(name).expect("validated above");
        let slice_len = slice.len();
        let offset = state.offset;
        state.ring.with_buffer(state.cursor, |buf| {
            buf[offset..offset + slice_len].copy_from_slice(slice);
        });
        state.offset += slice_len;

        if state.offset == state.ring.buf_len() {
            let filled_index = state.cursor;
            state.offset = 0;
            state.cursor = (state.cursor + 1) % state.ring.len();

            if self
                .task_tx
                .send(Task {
                    stream: name.to_owned(),
                    buf_index: filled_index,
                    window_end: now,
                })
                .is_err()
            {
                error!(stream = name, "persister task queue is closed, dropping block");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DasDeviceConfig, DataType, FrameCounterConfig, LogConfig, PingPongConfig, SaveConfig, SnapshotConfig, SocketConfig, StreamConfig};
    use chrono::Local;
    use std::collections::HashMap;

    fn test_config() -> Config {
        let mut streams = HashMap::new();
        streams.insert(
            "vib".to_owned(),
            StreamConfig {
                data_type: DataType::VibDemod,
                sample_rate_hz: 1,
                channel: 0,
            },
        );

        Config {
            socket: SocketConfig::default(),
            das: DasDeviceConfig {
                data_size: 4,
                valid_point_lo: 0,
                valid_point_hi: 2,
                pulse_width_ns: 100,
                optical_switch_flags: [false; 32],
                optical_switch_counter_threshold: 0,
                streams,
            },
            frame_counter: FrameCounterConfig {
                interval_secs: 60,
                gist: "vib".to_owned(),
            },
            handle_interval_secs: 1,
            strict_begin_target: None,
            save: SaveConfig {
                enable: false,
                begin: Local::now(),
                end: Local::now(),
                path: "/tmp/das-test".into(),
                targets: HashMap::new(),
            },
            pingpong: PingPongConfig { size: 3 },
            snapshot: SnapshotConfig {
                enable: false,
                target: "vib".to_owned(),
            },
            log: LogConfig::default(),
        }
    }

    #[test]
    fn s4_fills_exactly_n_buffers_without_blocking() {
        let config = test_config();
        let block_bytes = config.block_bytes("vib").expect("configured stream");
        assert_eq!(block_bytes, 4);

        let mut rings = HashMap::new();
        rings.insert("vib".to_owned(), PingPongRing::new(3, block_bytes));

        let (tx, rx) = crossbeam::channel::unbounded();
        let mut reassembler = Reassembler::new(&config, rings, tx);

        // raw body is data_size*2 = 8 bytes; valid range [0,2) keeps the first 4.
        for i in 0..9u8 {
            let body = vec![i, i, i, i, 0xAA, 0xAA, 0xAA, 0xAA];
            reassembler.on_command(CommandKind::VibDemod, &body);
        }

        let tasks: Vec<_> = rx.try_iter().collect();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].buf_index, 0);
        assert_eq!(tasks[1].buf_index, 1);
        assert_eq!(tasks[2].buf_index, 2);
    }

    #[test]
    fn invalid_body_size_is_dropped_not_written() {
        let config = test_config();
        let block_bytes = config.block_bytes("vib").expect("configured stream");
        let mut rings = HashMap::new();
        rings.insert("vib".to_owned(), PingPongRing::new(3, block_bytes));
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut reassembler = Reassembler::new(&config, rings, tx);

        reassembler.on_command(CommandKind::VibDemod, &[1, 2, 3]);

        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn strict_begin_target_gate_drops_everything_before_threshold() {
        let mut config = test_config();
        config.strict_begin_target = Some("vib".to_owned());
        config.save.targets.insert(
            "vib".to_owned(),
            crate::config::SaveTargetConfig {
                prefix: "Raw".to_owned(),
                interval_secs: 1,
            },
        );
        config.save.begin = Local::now() + chrono::Duration::hours(1);

        let block_bytes = config.block_bytes("vib").expect("configured stream");
        let mut rings = HashMap::new();
        rings.insert("vib".to_owned(), PingPongRing::new(3, block_bytes));
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut reassembler = Reassembler::new(&config, rings, tx);

        let body = vec![1, 1, 1, 1, 0, 0, 0, 0];
        reassembler.on_command(CommandKind::VibDemod, &body);

        assert_eq!(rx.try_iter().count(), 0);
    }
}
