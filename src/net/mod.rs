//! UDP transport: socket construction and the datagram receive loop.

pub mod receiver;
pub mod socket;

pub use receiver::{CommandEvent, HandshakeFrames, ReceiverHandle, ReceiverSubscriptions, spawn_receiver};
pub use socket::create_acquisition_socket;
