//! Small cross-cutting helpers with no better home.

use thread_priority::{RealtimeThreadSchedulePolicy, ThreadPriority, ThreadSchedulePolicy, set_thread_priority_and_policy, thread_native_id};
use tracing::{info, warn};

/// Raises the calling thread to realtime FIFO scheduling. Best-effort: the
/// acquisition thread should run at this priority to keep up with the
/// sustained ~5 kHz frame rate, but a failure (no `CAP_SYS_NICE`, running in
/// a sandboxed container, ...) is not fatal.
pub fn set_realtime_priority() {
    let tid = thread_native_id();
    match set_thread_priority_and_policy(
        tid,
        ThreadPriority::Max,
        ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
    ) {
        Ok(()) => info!("acquisition thread raised to realtime FIFO priority"),
        Err(e) => warn!(error = ?e, "could not set realtime thread priority, continuing at default priority"),
    }
}
