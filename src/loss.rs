//! Frame-loss accounting against a theoretical nominal sample clock. Ports
//! the original driver's `FrameCounter`: an interval window that resets on a
//! configured period, plus a global window spanning the whole run.

use crate::{config::Timestamp, protocol::CommandKind};
use chrono::Local;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct LossReading {
    pub interval_loss_rate: f64,
    pub global_loss_rate: f64,
    pub interval_dropped: i64,
    pub global_dropped: i64,
}

pub struct FrameAccountant {
    gist_kind: CommandKind,
    nominal_rate_hz: u32,
    summary_interval_secs: u64,
    interval_start: Option<Timestamp>,
    interval_count: u64,
    global_start: Option<Timestamp>,
    global_count: u64,
    max_interval_loss_rate: f64,
}

impl FrameAccountant {
    pub fn new(gist_kind: CommandKind, nominal_rate_hz: u32, summary_interval_secs: u64) -> Self {
        Self {
            gist_kind,
            nominal_rate_hz,
            summary_interval_secs,
            interval_start: None,
            interval_count: 0,
            global_start: None,
            global_count: 0,
            max_interval_loss_rate: 0.0,
        }
    }

    /// Call on every decoded command; only frames of the configured gist
    /// stream are counted.
    pub fn record(&mut self, kind: CommandKind) {
        if kind != self.gist_kind {
            return;
        }
        let now = Local::now();
        if self.interval_start.is_none() {
            self.interval_start = Some(now);
        }
        if self.global_start.is_none() {
            self.global_start = Some(now);
        }
        self.interval_count += 1;
        self.global_count += 1;
    }

    /// Call roughly once a second. Always logs a DEBUG line; every
    /// `summary_interval_secs` also logs an INFO summary and resets the
    /// interval window (the global window never resets).
    pub fn tick(&mut self) -> Option<LossReading> {
        let interval_start = self.interval_start?;
        let global_start = self.global_start?;
        let now = Local::now();

        let reading = self.compute_reading(now, interval_start, global_start);

        debug!(
            interval_dropped = reading.interval_dropped,
            interval_loss_rate = reading.interval_loss_rate,
            max_interval_loss_rate = self.max_interval_loss_rate,
            global_dropped = reading.global_dropped,
            global_loss_rate = reading.global_loss_rate,
            "frame loss tick"
        );

        let elapsed = (now - interval_start).num_milliseconds() as f64 / 1000.0;
        if elapsed >= self.summary_interval_secs as f64 {
            info!(
                interval_dropped = reading.interval_dropped,
                interval_loss_rate = reading.interval_loss_rate,
                global_dropped = reading.global_dropped,
                global_loss_rate = reading.global_loss_rate,
                "frame loss summary"
            );
            self.max_interval_loss_rate = self.max_interval_loss_rate.max(reading.interval_loss_rate);
            self.interval_count = 0;
            self.interval_start = Some(now);
        }

        Some(reading)
    }

    fn compute_reading(&self, now: Timestamp, interval_start: Timestamp, global_start: Timestamp) -> LossReading {
        let interval_theoretical = theoretical_frames(now, interval_start, self.nominal_rate_hz);
        let global_theoretical = theoretical_frames(now, global_start, self.nominal_rate_hz);

        let interval_loss_rate = loss_rate(self.interval_count, interval_theoretical);
        let global_loss_rate = loss_rate(self.global_count, global_theoretical);

        LossReading {
            interval_loss_rate,
            global_loss_rate,
            interval_dropped: interval_theoretical - self.interval_count as i64,
            global_dropped: global_theoretical - self.global_count as i64,
        }
    }

    pub fn max_interval_loss_rate(&self) -> f64 {
        self.max_interval_loss_rate
    }
}

fn theoretical_frames(now: Timestamp, since: Timestamp, nominal_rate_hz: u32) -> i64 {
    let elapsed_secs = (now - since).num_milliseconds() as f64 / 1000.0;
    (elapsed_secs * nominal_rate_hz as f64).round() as i64
}

/// `0` theoretical frames (a just-started window) yields `0` loss rather than
/// dividing by zero.
fn loss_rate(actual: u64, theoretical: i64) -> f64 {
    if theoretical <= 0 {
        return 0.0;
    }
    (1.0 - actual as f64 / theoretical as f64).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_loss_rate_one_percent() {
        // 4950 received against a 5000 Hz nominal rate over a 1s window.
        assert!((loss_rate(4950, 5000) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn zero_theoretical_frames_yields_zero_loss() {
        assert_eq!(loss_rate(0, 0), 0.0);
    }

    #[test]
    fn perfect_reception_has_zero_loss() {
        assert_eq!(loss_rate(5000, 5000), 0.0);
    }

    #[test]
    fn non_gist_stream_is_not_counted() {
        let mut accountant = FrameAccountant::new(CommandKind::VibDemod, 5000, 60);
        accountant.record(CommandKind::Intensity);
        assert!(accountant.tick().is_none());
    }
}
