//! Live snapshot surface: one slot for the stream configured under
//! `snapshot.target`, refreshed on every matching command and read by
//! external consumers (a plotter, an auxiliary audio sampler). Ports
//! `PlotData`/`show_plot` from the original driver, minus the plotting and
//! audio output themselves — those are external collaborators.

use crate::{buffer::SnapshotSlot, config::Config, net::CommandEvent, protocol::kind_for_data_type};

/// Builds the subscriber closure the receiver should register for `command`
/// events, plus the slot external consumers read from. `None` if snapshots
/// aren't enabled or the configured target stream doesn't map to a known
/// command kind.
pub fn build(config: &Config) -> Option<(SnapshotSlot, Box<dyn FnMut(&CommandEvent) + Send>)> {
    if !config.snapshot.enable {
        return None;
    }
    let target_stream = config.das.streams.get(&config.snapshot.target)?;
    let target_kind = kind_for_data_type(target_stream.data_type);

    let valid_lo = config.das.valid_point_lo as usize * 2;
    let valid_bytes = config.das.valid_points() as usize * 2;
    let slot = SnapshotSlot::new(valid_bytes);
    let writer_slot = slot.clone();

    let subscriber: Box<dyn FnMut(&CommandEvent) + Send> = Box::new(move |event: &CommandEvent| {
        if event.kind != target_kind {
            return;
        }
        if event.body.len() < valid_lo + valid_bytes {
            return;
        }
        writer_slot.try_write(&event.body[valid_lo..valid_lo + valid_bytes]);
    });

    Some((slot, subscriber))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DasDeviceConfig, DataType, FrameCounterConfig, LogConfig, PingPongConfig, SaveConfig, SnapshotConfig, SocketConfig, StreamConfig};
    use crate::protocol::CommandKind;
    use chrono::Local;
    use std::collections::HashMap;

    fn test_config(enable: bool) -> Config {
        let mut streams = HashMap::new();
        streams.insert(
            "vib".to_owned(),
            StreamConfig {
                data_type: DataType::VibDemod,
                sample_rate_hz: 5000,
                channel: 0,
            },
        );
        Config {
            socket: SocketConfig::default(),
            das: DasDeviceConfig {
                data_size: 4,
                valid_point_lo: 1,
                valid_point_hi: 3,
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
                path: "/tmp".into(),
                targets: HashMap::new(),
            },
            pingpong: PingPongConfig { size: 3 },
            snapshot: SnapshotConfig {
                enable,
                target: "vib".to_owned(),
            },
            log: LogConfig::default(),
        }
    }

    #[test]
    fn disabled_snapshot_builds_nothing() {
        assert!(build(&test_config(false)).is_none());
    }

    #[test]
    fn matching_frame_updates_slot_with_valid_point_range() {
        let config = test_config(true);
        let (slot, mut subscriber) = build(&config).expect("snapshot enabled");

        subscriber(&CommandEvent {
            kind: CommandKind::VibDemod,
            body: vec![0xAA, 0x01, 0x02, 0xBB],
        });

        assert_eq!(*slot.read(), [0x01, 0x02]);
    }

    #[test]
    fn non_matching_kind_is_ignored() {
        let config = test_config(true);
        let (slot, mut subscriber) = build(&config).expect("snapshot enabled");

        subscriber(&CommandEvent {
            kind: CommandKind::Intensity,
            body: vec![0xAA, 0x01, 0x02, 0xBB],
        });

        assert_eq!(*slot.read(), [0x00, 0x00]);
    }
}
