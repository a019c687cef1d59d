//! The closed set of wire commands, encoded as a tagged enum rather than the
//! string-keyed `COMMAND_TYPE_DICT` table the original device driver used —
//! `(head0, head1, head2?)` is the discriminant, matched in [`CommandKind::lookup`].

use crate::config::{Config, DataType, optical_switch_bitmap, send_flag_bitmap};

pub const RECV_START: [u8; 2] = [0x33, 0x55];
pub const RECV_END: [u8; 2] = [0x33, 0xAA];
pub const SEND_START: [u8; 2] = [0xCC, 0x55];
pub const SEND_END: [u8; 2] = [0xCC, 0xAA];
pub const DEVICE_TYPE: [u8; 4] = [0x0C, 0x00, 0x00, 0x00];

pub const BODY_INCLUDED_TRUE: u8 = 0xDA;
pub const BODY_INCLUDED_FALSE: u8 = 0x00;

pub const MAX_BODY_LENGTH: u32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Recv,
    Send,
}

impl Direction {
    pub fn start_marker(self) -> [u8; 2] {
        match self {
            Direction::Recv => RECV_START,
            Direction::Send => SEND_START,
        }
    }

    pub fn end_marker(self) -> [u8; 2] {
        match self {
            Direction::Recv => RECV_END,
            Direction::Send => SEND_END,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    DiffDemod,
    VibDemod,
    Intensity,
    VibRms,
    Heartbeat,
    TamperAlarm,
    DasConfig,
    EdfaConfig,
    RamanConfig,
    StartStream,
    StopStream,
}

/// Discriminant triple plus the body shape a [`CommandKind`] expects; `head2`
/// is `None` when the kind is recognized from `(head0, head1)` alone.
struct Discriminant {
    kind: CommandKind,
    direction: Direction,
    head0: u8,
    head1: u8,
    head2: Option<u8>,
    body_included: bool,
    /// `Some(n)` pins an exact body length; `None` means it is validated elsewhere
    /// (the DAS data streams, whose length depends on the configured point count).
    fixed_body_length: Option<u32>,
}

fn table() -> &'static [Discriminant] {
    const fn recv(kind: CommandKind, head0: u8, head1: u8, len: u32) -> Discriminant {
        Discriminant {
            kind,
            direction: Direction::Recv,
            head0,
            head1,
            head2: None,
            body_included: true,
            fixed_body_length: Some(len),
        }
    }
    // leaked once; the table is tiny and process-lifetime, matching the
    // teacher's habit of building such dispatch tables lazily.
    static TABLE: std::sync::OnceLock<Vec<Discriminant>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            recv(CommandKind::DiffDemod, 0x80, 0x01, 0), // length is data-size-dependent; see DATA_STREAM_KINDS
            recv(CommandKind::VibDemod, 0x80, 0x11, 0),
            recv(CommandKind::Intensity, 0x80, 0x19, 0),
            recv(CommandKind::VibRms, 0x80, 0x1A, 0),
            Discriminant {
                kind: CommandKind::Heartbeat,
                direction: Direction::Recv,
                head0: 0xA0,
                head1: 0x01,
                head2: Some(0x00),
                body_included: true,
                fixed_body_length: Some(32),
            },
            Discriminant {
                kind: CommandKind::TamperAlarm,
                direction: Direction::Recv,
                head0: 0x90,
                head1: 0x03,
                head2: Some(0x00),
                body_included: true,
                fixed_body_length: Some(32),
            },
            Discriminant {
                kind: CommandKind::DasConfig,
                direction: Direction::Send,
                head0: 0x30,
                head1: 0x01,
                head2: Some(0x00),
                body_included: true,
                fixed_body_length: Some(32),
            },
            Discriminant {
                kind: CommandKind::EdfaConfig,
                direction: Direction::Send,
                head0: 0x30,
                head1: 0x02,
                head2: Some(0x00),
                body_included: true,
                fixed_body_length: Some(2),
            },
            Discriminant {
                kind: CommandKind::RamanConfig,
                direction: Direction::Send,
                head0: 0x30,
                head1: 0x03,
                head2: Some(0x00),
                body_included: true,
                fixed_body_length: Some(2),
            },
            Discriminant {
                kind: CommandKind::StartStream,
                direction: Direction::Send,
                head0: 0x10,
                head1: 0x01,
                head2: Some(0x00),
                body_included: false,
                fixed_body_length: None,
            },
            Discriminant {
                kind: CommandKind::StopStream,
                direction: Direction::Send,
                head0: 0x10,
                head1: 0x01,
                head2: Some(0xFF),
                body_included: false,
                fixed_body_length: None,
            },
        ]
    })
}

/// The four DAS data stream kinds carry a body whose fixed length depends on
/// the device's configured `data_size` (`raw_point_count * 2`), so it is not
/// baked into the static discriminant table above.
pub const DATA_STREAM_KINDS: [CommandKind; 4] = [
    CommandKind::DiffDemod,
    CommandKind::VibDemod,
    CommandKind::Intensity,
    CommandKind::VibRms,
];

/// The one stable mapping from a configured stream's data type to the
/// command kind its frames are decoded as; shared by the reassembler, the
/// snapshot builder, and loss accounting so there is exactly one place that
/// knows this correspondence.
pub fn kind_for_data_type(data_type: DataType) -> CommandKind {
    match data_type {
        DataType::DiffDemod => CommandKind::DiffDemod,
        DataType::VibDemod => CommandKind::VibDemod,
        DataType::Intensity => CommandKind::Intensity,
        DataType::VibRms => CommandKind::VibRms,
    }
}

impl CommandKind {
    pub fn direction(self) -> Direction {
        table()
            .iter()
            .find(|d| d.kind == self)
            .map(|d| d.direction)
            .unwrap_or(Direction::Recv)
    }

    pub fn is_data_stream(self) -> bool {
        DATA_STREAM_KINDS.contains(&self)
    }

    /// Matches `(head0, head1, head2?, body_included, body_length)` against the
    /// discriminant table. Unknown triples, or a recognized triple whose
    /// `body_included`/`body_length` disagrees with what the kind fixes, are
    /// both rejected — the caller turns that into `CodecError::Malformed`.
    pub fn lookup(
        head0: u8,
        head1: u8,
        head2: u8,
        body_included: bool,
        body_length: u32,
        raw_point_count: u32,
    ) -> Option<CommandKind> {
        for d in table() {
            if d.head0 != head0 || d.head1 != head1 {
                continue;
            }
            if let Some(expected_head2) = d.head2
                && expected_head2 != head2
            {
                continue;
            }
            if d.body_included != body_included {
                return None;
            }
            let expected_len = if d.is_data_stream_kind() {
                Some(raw_point_count * 2)
            } else {
                d.fixed_body_length
            };
            if let Some(expected) = expected_len
                && expected != body_length
            {
                return None;
            }
            return Some(d.kind);
        }
        None
    }
}

impl Discriminant {
    fn is_data_stream_kind(&self) -> bool {
        self.kind.is_data_stream()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DasConfigFields {
    pub pulse_width_div4: u32,
    pub send_flag_bitmap: u32,
    pub optical_switch_flag_bitmap: u32,
    pub optical_switch_counter_threshold: u32,
}

impl DasConfigFields {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pulse_width_div4: config.das.pulse_width_ns / 4,
            send_flag_bitmap: send_flag_bitmap(config),
            optical_switch_flag_bitmap: optical_switch_bitmap(&config.das.optical_switch_flags),
            optical_switch_counter_threshold: config.das.optical_switch_counter_threshold,
        }
    }

    pub fn encode(self) -> [u8; 32] {
        let mut body = [0u8; 32];
        body[0..4].copy_from_slice(&self.pulse_width_div4.to_le_bytes());
        body[4..8].copy_from_slice(&self.send_flag_bitmap.to_le_bytes());
        body[8..12].copy_from_slice(&self.optical_switch_flag_bitmap.to_le_bytes());
        body[12..16].copy_from_slice(&self.optical_switch_counter_threshold.to_le_bytes());
        // remaining 16 bytes are reserved and stay zero.
        body
    }
}

/// Builds the full wire frame for a send-direction command: start marker,
/// device type, head bytes, body-included flag, optional length-prefixed
/// body, end marker. Mirrors `SendCommand.__init__` in the original driver.
pub fn encode_send_frame(kind: CommandKind, body: &[u8]) -> Vec<u8> {
    debug_assert_eq!(kind.direction(), Direction::Send);
    let discriminant = table()
        .iter()
        .find(|d| d.kind == kind)
        .expect("every CommandKind has a discriminant entry");

    let mut frame = Vec::with_capacity(14 + body.len() + 2);
    frame.extend_from_slice(&SEND_START);
    frame.extend_from_slice(&DEVICE_TYPE);
    frame.push(discriminant.head0);
    frame.push(discriminant.head1);
    frame.push(discriminant.head2.unwrap_or(0));
    if discriminant.body_included {
        frame.push(BODY_INCLUDED_TRUE);
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(body);
    } else {
        frame.push(BODY_INCLUDED_FALSE);
    }
    frame.extend_from_slice(&SEND_END);
    frame
}

pub fn encode_das_config(config: &Config) -> Vec<u8> {
    encode_send_frame(CommandKind::DasConfig, &DasConfigFields::from_config(config).encode())
}

pub fn encode_edfa_config(pump_current: u16) -> Vec<u8> {
    encode_send_frame(CommandKind::EdfaConfig, &pump_current.to_le_bytes())
}

pub fn encode_raman_config(current: u16) -> Vec<u8> {
    encode_send_frame(CommandKind::RamanConfig, &current.to_le_bytes())
}

pub fn encode_start_stream() -> Vec<u8> {
    encode_send_frame(CommandKind::StartStream, &[])
}

pub fn encode_stop_stream() -> Vec<u8> {
    encode_send_frame(CommandKind::StopStream, &[])
}
