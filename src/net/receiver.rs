//! Datagram receiver: owns the acquisition UDP socket, maintains the rolling
//! byte cache, and drives the frame codec to completion for every accepted
//! datagram. Ports `ServerProtocol.datagram_received` from the original driver.

use crate::{
    error::{IngestError, IngestResult},
    loss::FrameAccountant,
    protocol::{
        CommandKind, DecodeOutcome, Direction,
        command::{RECV_END, RECV_START},
        decode_frame,
    },
    pubsub::Publisher,
};
use std::{net::SocketAddr, thread, time::Duration};
use tokio::{net::UdpSocket, runtime, select, sync::oneshot, time::interval};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::{error, info, warn};

/// The three send-direction frames the receive worker emits on its own,
/// outside of any external command: the device configuration handshake and
/// the start/stop bracket around the streaming window. Pre-encoded by the
/// caller so this module never needs to know about [`crate::config::Config`].
pub struct HandshakeFrames {
    pub das_config: Vec<u8>,
    pub start_stream: Vec<u8>,
    pub stop_stream: Vec<u8>,
}

/// The receiver's own truncation bound on the rolling cache, distinct from
/// (but numerically equal to) the codec's per-frame body length cap.
const MAX_FRAME_SIZE: usize = 5000;

#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub kind: CommandKind,
    pub body: Vec<u8>,
}

/// Callbacks registered before the receiver is spawned; it owns them for its
/// entire lifetime since both caller and receiver agree no further
/// subscription happens once streaming starts (mirrors the original's
/// `on`/`off` API, minus the ability to unsubscribe once live).
pub struct ReceiverSubscriptions {
    pub on_command: Publisher<CommandEvent>,
    pub on_error: Publisher<String>,
}

impl ReceiverSubscriptions {
    pub fn new() -> Self {
        Self {
            on_command: Publisher::new(),
            on_error: Publisher::new(),
        }
    }
}

impl Default for ReceiverSubscriptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed back to the controller so it can request a clean stop; the
/// receiver's own subsystem translates this into `subsys.request_shutdown()`.
pub struct ReceiverHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: thread::JoinHandle<()>,
}

impl ReceiverHandle {
    pub fn stop_and_join(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            tx.send(()).ok();
        }
        self.join.join().ok();
    }
}

/// Spawns the receive worker on a dedicated OS thread running its own
/// single-threaded tokio runtime, matching the teacher's `start_receiver`
/// pattern: one thread per cooperative scheduler rather than sharing the
/// process-wide multi-threaded runtime.
pub fn spawn_receiver(
    socket: UdpSocket,
    remote: SocketAddr,
    raw_point_count: u32,
    handshake: HandshakeFrames,
    loss: FrameAccountant,
    subscriptions: ReceiverSubscriptions,
) -> IngestResult<ReceiverHandle> {
    let (stop_tx, stop_rx) = oneshot::channel();

    let join = thread::Builder::new()
        .name("das-receiver".to_owned())
        .spawn(move || {
            crate::utils::set_realtime_priority();

            let runtime = match runtime::Builder::new_current_thread().enable_all().build() {
                Ok(it) => it,
                Err(e) => {
                    error!(error = %e, "failed to build receiver runtime");
                    return;
                }
            };

            let receiver = Receiver {
                socket,
                remote,
                raw_point_count,
                enabled: false,
                handshake,
                loss,
                data_cache: Vec::with_capacity(MAX_FRAME_SIZE * 2),
                subscriptions,
                last_error_log: None,
            };

            runtime.block_on(async move {
                let stop_rx = stop_rx;
                if let Err(e) = Toplevel::new(|s| async move {
                    s.start(SubsystemBuilder::new("das-receiver", move |s| receiver.run(s, stop_rx)));
                })
                .handle_shutdown_requests(std::time::Duration::from_secs(1))
                .await
                {
                    error!(error = %e, "receiver subsystem failed to shut down cleanly");
                }
            });
        })
        .map_err(|e| IngestError::SpawnError(e.to_string()))?;

    Ok(ReceiverHandle {
        stop_tx: Some(stop_tx),
        join,
    })
}

struct Receiver {
    socket: UdpSocket,
    remote: SocketAddr,
    raw_point_count: u32,
    /// Set only once the startup handshake has completed; datagrams arriving
    /// before that (or after shutdown) are dropped, matching the original
    /// driver's `self.enable` flag on `ServerProtocol`.
    enabled: bool,
    handshake: HandshakeFrames,
    loss: FrameAccountant,
    data_cache: Vec<u8>,
    subscriptions: ReceiverSubscriptions,
    last_error_log: Option<std::time::Instant>,
}

impl Receiver {
    async fn run(mut self, subsys: SubsystemHandle, stop_rx: oneshot::Receiver<()>) -> Result<(), std::convert::Infallible> {
        info!("receive worker started");

        if let Err(e) = self.socket.send_to(&self.handshake.das_config, self.remote).await {
            error!(error = %e, "failed to send DAS configuration");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Err(e) = self.socket.send_to(&self.handshake.start_stream, self.remote).await {
            error!(error = %e, "failed to send start-stream command");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.enabled = true;
        info!("streaming enabled");

        let mut buf = [0u8; 65_535];
        let mut loss_tick = interval(Duration::from_secs(1));
        tokio::pin!(stop_rx);
        loop {
            select! {
                recvd = self.socket.recv_from(&mut buf) => {
                    match recvd {
                        Ok((len, addr)) => self.on_datagram(addr, &buf[..len]),
                        Err(e) => warn!(error = %e, "socket read error"),
                    }
                }
                _ = loss_tick.tick() => {
                    self.loss.tick();
                }
                _ = &mut stop_rx => {
                    subsys.request_shutdown();
                    break;
                }
                _ = subsys.on_shutdown_requested() => break,
            }
        }

        self.enabled = false;
        if let Err(e) = self.socket.send_to(&self.handshake.stop_stream, self.remote).await {
            error!(error = %e, "failed to send stop-stream command");
        }
        info!("receive worker stopped");
        Ok(())
    }

    fn on_datagram(&mut self, addr: SocketAddr, data: &[u8]) {
        if addr != self.remote || !self.enabled {
            return;
        }
        self.data_cache.extend_from_slice(data);
        self.drain_frames();
    }

    fn drain_frames(&mut self) {
        loop {
            let front = find(&self.data_cache, &RECV_START);
            let Some(front) = front else {
                if self.data_cache.len() > RECV_START.len() {
                    let keep_from = self.data_cache.len() - RECV_START.len();
                    self.data_cache.drain(..keep_from);
                }
                return;
            };

            let rear = rfind(&self.data_cache, &RECV_END);
            let rear_isize = rear.map(|r| r as isize).unwrap_or(-1);
            if rear_isize <= front as isize {
                self.data_cache.drain(..front);
                if self.data_cache.len() > MAX_FRAME_SIZE {
                    let excess = self.data_cache.len() - MAX_FRAME_SIZE;
                    self.data_cache.drain(..excess);
                }
                return;
            }
            let rear = rear.expect("rear_isize > front implies rear is Some");

            let candidate = &self.data_cache[front..rear + RECV_END.len()];
            match decode_frame(candidate, Direction::Recv, self.raw_point_count) {
                Ok(DecodeOutcome::Complete(frame)) => {
                    let consumed = front + frame.consumed;
                    self.data_cache.drain(..consumed);
                    self.loss.record(frame.kind);
                    self.subscriptions.on_command.publish(&CommandEvent {
                        kind: frame.kind,
                        body: frame.body,
                    });
                }
                Ok(DecodeOutcome::NeedMore) => return,
                Err(e) => {
                    self.report_error(e.to_string());
                    self.data_cache.drain(..front + 1);
                }
            }
        }
    }

    /// Rate-limits error reporting to at most one log line per second, same
    /// as the original driver's `ErrorLogger`.
    fn report_error(&mut self, message: String) {
        let now = std::time::Instant::now();
        let should_log = self.last_error_log.is_none_or(|last| now.duration_since(last).as_secs() >= 1);
        if should_log {
            self.last_error_log = Some(now);
        }
        self.subscriptions.on_error.publish(&message);
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{RECV_END, RECV_START};

    fn vib_demod_frame(body: &[u8]) -> Vec<u8> {
        let mut frame = vec![RECV_START[0], RECV_START[1], 0x0C, 0x00, 0x00, 0x00, 0x80, 0x11, 0x00, 0xDA];
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(&RECV_END);
        frame
    }

    fn test_receiver() -> (Receiver, tokio::sync::mpsc::UnboundedReceiver<CommandEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut subs = ReceiverSubscriptions::new();
        subs.on_command.subscribe(move |event| {
            tx.send(event.clone()).ok();
        });
        let receiver = Receiver {
            socket: unreachable_socket(),
            remote: "127.0.0.1:1".parse().expect("valid addr"),
            raw_point_count: 2,
            enabled: true,
            handshake: HandshakeFrames {
                das_config: Vec::new(),
                start_stream: Vec::new(),
                stop_stream: Vec::new(),
            },
            loss: FrameAccountant::new(CommandKind::VibDemod, 5000, 60),
            data_cache: Vec::new(),
            subscriptions: subs,
            last_error_log: None,
        };
        (receiver, rx)
    }

    fn unreachable_socket() -> UdpSocket {
        // Never polled in these tests; only `drain_frames`/`on_datagram` are exercised directly.
        let std_socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind");
        std_socket.set_nonblocking(true).expect("nonblocking");
        UdpSocket::from_std(std_socket).expect("tokio socket")
    }

    #[tokio::test]
    async fn s1_and_s2_concatenated_frames_decode_in_order() {
        let (mut receiver, mut rx) = test_receiver();
        let remote = receiver.remote;

        let mut datagram = vib_demod_frame(&[1, 2, 3, 4]);
        datagram.extend(vib_demod_frame(&[5, 6, 7, 8]));
        receiver.on_datagram(remote, &datagram);

        let first = rx.try_recv().expect("first command");
        let second = rx.try_recv().expect("second command");
        assert_eq!(first.body, vec![1, 2, 3, 4]);
        assert_eq!(second.body, vec![5, 6, 7, 8]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn s3_malformed_frame_is_skipped_and_search_resumes() {
        let (mut receiver, mut rx) = test_receiver();
        let remote = receiver.remote;

        let mut datagram = vec![RECV_START[0], RECV_START[1], 0x0C, 0x00, 0x00, 0x00, 0x80, 0x11, 0x00, 0xDA];
        datagram.extend_from_slice(&10_000u32.to_le_bytes());
        datagram.extend(vib_demod_frame(&[9, 9, 9, 9]));

        receiver.on_datagram(remote, &datagram);

        let good = rx.try_recv().expect("the valid frame after the malformed one");
        assert_eq!(good.body, vec![9, 9, 9, 9]);
    }

    #[tokio::test]
    async fn frame_straddling_two_datagrams_decodes_once_complete() {
        let (mut receiver, mut rx) = test_receiver();
        let remote = receiver.remote;
        let frame = vib_demod_frame(&[4, 5, 6, 7]);

        receiver.on_datagram(remote, &frame[..frame.len() - 1]);
        assert!(rx.try_recv().is_err());

        receiver.on_datagram(remote, &frame[frame.len() - 1..]);
        let decoded = rx.try_recv().expect("now complete");
        assert_eq!(decoded.body, vec![4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn wrong_sender_is_ignored() {
        let (mut receiver, mut rx) = test_receiver();
        let frame = vib_demod_frame(&[1, 2, 3, 4]);
        receiver.on_datagram("127.0.0.1:9999".parse().expect("addr"), &frame);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disabled_receiver_drops_datagrams() {
        let (mut receiver, mut rx) = test_receiver();
        receiver.enabled = false;
        let remote = receiver.remote;
        let frame = vib_demod_frame(&[1, 2, 3, 4]);
        receiver.on_datagram(remote, &frame);
        assert!(rx.try_recv().is_err());
    }
}
