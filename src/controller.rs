//! Wires every subsystem together and owns the two worker threads for the
//! lifetime of one acquisition run. Ports the startup/shutdown choreography
//! from `main.py`: configure the device, bracket the streaming window with
//! start/stop commands, and keep the persist worker draining until every
//! buffered block has been handled.

use crate::{
    buffer::PingPongRing,
    config::Config,
    error::{DasCoreResult, IngestError},
    loss::FrameAccountant,
    net::{CommandEvent, HandshakeFrames, ReceiverHandle, ReceiverSubscriptions, create_acquisition_socket, spawn_receiver},
    persister::Persister,
    protocol::{command, kind_for_data_type},
    reassembler::Reassembler,
    snapshot,
};
use std::{collections::HashMap, thread};
use tracing::{error, info};

/// Everything needed to observe a live run: currently just the snapshot slot,
/// which is `None` when snapshots are disabled in configuration.
pub struct Handles {
    pub snapshot: Option<crate::buffer::SnapshotSlot>,
}

/// The running acquisition core. Dropping this without calling [`Controller::stop`]
/// leaves both worker threads running detached — always stop explicitly.
pub struct Controller {
    receiver: ReceiverHandle,
    persister_join: thread::JoinHandle<()>,
    handles: Handles,
}

impl Controller {
    /// Builds every shared buffer and subsystem from `config` and spawns the
    /// receive and persist workers. Returns once both are up; the receive
    /// worker performs its own device handshake (DasConfig, then StartStream)
    /// asynchronously after that.
    pub fn start(config: &Config) -> DasCoreResult<Self> {
        let rings = build_rings(config);

        let persister = Persister::new(config, rings.clone())?;
        let (task_tx, task_rx) = crossbeam::channel::unbounded();
        let mut reassembler = Reassembler::new(config, rings, task_tx);

        let mut subscriptions = ReceiverSubscriptions::new();
        subscriptions.on_error.subscribe(|message| {
            error!(error = %message, "receive worker reported a frame decode error");
        });
        subscriptions
            .on_command
            .subscribe(move |event: &CommandEvent| reassembler.on_command(event.kind, &event.body));

        let snapshot_slot = match snapshot::build(config) {
            Some((slot, subscriber)) => {
                subscriptions.on_command.subscribe(subscriber);
                Some(slot)
            }
            None => None,
        };

        let loss = build_loss_accountant(config);

        let handshake = HandshakeFrames {
            das_config: command::encode_das_config(config),
            start_stream: command::encode_start_stream(),
            stop_stream: command::encode_stop_stream(),
        };

        let socket = create_acquisition_socket(&config.socket)?;
        let receiver = spawn_receiver(socket, config.socket.remote_addr, config.das.data_size, handshake, loss, subscriptions)?;

        let persister_join = thread::Builder::new()
            .name("das-persister".to_owned())
            .spawn(move || {
                // No forced shutdown: once the receive worker's Reassembler (and
                // its task_tx clone) is dropped, the channel disconnects on its
                // own and `run` returns after draining whatever is left.
                persister.run(task_rx, || false);
                info!("persist worker stopped");
            })
            .map_err(|e| IngestError::SpawnError(e.to_string()))?;

        Ok(Self {
            receiver,
            persister_join,
            handles: Handles { snapshot: snapshot_slot },
        })
    }

    pub fn handles(&self) -> &Handles {
        &self.handles
    }

    /// Stops the receive worker (which sends `StopStream` on its way out) and
    /// then blocks until the persist worker has drained every block already
    /// in flight.
    pub fn stop(self) {
        self.receiver.stop_and_join();
        self.persister_join.join().ok();
    }
}

fn build_rings(config: &Config) -> HashMap<String, PingPongRing> {
    config
        .das
        .streams
        .keys()
        .map(|name| {
            let buf_len = config
                .block_bytes(name)
                .unwrap_or_else(|| panic!("stream {name:?} has no computable block size"));
            (name.clone(), PingPongRing::new(config.pingpong.size, buf_len))
        })
        .collect()
}

fn build_loss_accountant(config: &Config) -> FrameAccountant {
    let gist_stream = config
        .das
        .streams
        .get(&config.frame_counter.gist)
        .expect("Config::validate ensures frame_counter.gist names a configured stream");
    FrameAccountant::new(
        kind_for_data_type(gist_stream.data_type),
        gist_stream.sample_rate_hz,
        config.frame_counter.interval_secs,
    )
}
