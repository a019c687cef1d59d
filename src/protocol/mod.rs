//! Wire protocol: the closed command set ([`command`]) and the frame codec
//! that locates and decodes one command at a time out of a byte stream
//! ([`codec`]).

pub mod codec;
pub mod command;

pub use codec::{DecodeOutcome, DecodedFrame, decode_frame};
pub use command::{CommandKind, DasConfigFields, Direction, kind_for_data_type};
