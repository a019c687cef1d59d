//! Pure frame codec: locates one frame at the front of a byte slice and either
//! decodes it, reports that more bytes are needed, or rejects it as malformed.
//! Carries no I/O and no state beyond its arguments — the receiver drives it.

use super::command::{BODY_INCLUDED_FALSE, BODY_INCLUDED_TRUE, CommandKind, DEVICE_TYPE, Direction, MAX_BODY_LENGTH};
use crate::error::CodecError;

const FRAME_START_LEN: usize = 2;
const DEVICE_TYPE_LEN: usize = 4;
const HEAD_LEN: usize = 3; // head0 + head1 + head2
const BODY_INCLUDED_LEN: usize = 1;
const BODY_LENGTH_LEN: usize = 4;
const FRAME_END_LEN: usize = 2;

/// Offset of `body_included` from the start of the frame.
const BODY_INCLUDED_OFFSET: usize = FRAME_START_LEN + DEVICE_TYPE_LEN + HEAD_LEN;
const BODY_LENGTH_OFFSET: usize = BODY_INCLUDED_OFFSET + BODY_INCLUDED_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub kind: CommandKind,
    pub body: Vec<u8>,
    /// Number of bytes of `buf` this frame consumed, from offset 0.
    pub consumed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Complete(DecodedFrame),
    /// `buf` is a valid prefix of a frame but doesn't contain it all yet.
    NeedMore,
}

/// Attempts to decode exactly one frame starting at `buf[0]`. The caller is
/// responsible for first locating the start/end markers that bound the
/// candidate region (see [`crate::net::receiver`]); this function re-validates
/// the start marker itself so it can be unit-tested in isolation.
pub fn decode_frame(
    buf: &[u8],
    direction: Direction,
    raw_point_count: u32,
) -> Result<DecodeOutcome, CodecError> {
    let start_marker = direction.start_marker();
    let end_marker = direction.end_marker();

    macro_rules! need {
        ($n:expr) => {
            if buf.len() < $n {
                return Ok(DecodeOutcome::NeedMore);
            }
        };
    }

    need!(FRAME_START_LEN);
    if buf[..FRAME_START_LEN] != start_marker {
        return Err(CodecError::Malformed(format!(
            "invalid frame start {:02X?}",
            &buf[..FRAME_START_LEN]
        )));
    }

    need!(FRAME_START_LEN + DEVICE_TYPE_LEN);
    if direction == Direction::Recv && buf[FRAME_START_LEN..FRAME_START_LEN + DEVICE_TYPE_LEN] != DEVICE_TYPE {
        return Err(CodecError::Malformed(format!(
            "invalid device type {:02X?}",
            &buf[FRAME_START_LEN..FRAME_START_LEN + DEVICE_TYPE_LEN]
        )));
    }

    need!(BODY_INCLUDED_OFFSET + BODY_INCLUDED_LEN);
    let head0 = buf[FRAME_START_LEN + DEVICE_TYPE_LEN];
    let head1 = buf[FRAME_START_LEN + DEVICE_TYPE_LEN + 1];
    let head2 = buf[FRAME_START_LEN + DEVICE_TYPE_LEN + 2];
    let body_included_byte = buf[BODY_INCLUDED_OFFSET];

    let body_included = match body_included_byte {
        BODY_INCLUDED_TRUE => true,
        BODY_INCLUDED_FALSE => false,
        other => {
            return Err(CodecError::Malformed(format!(
                "invalid bodyIncluded value 0x{other:02X}"
            )));
        }
    };

    let (body_length, header_len) = if body_included {
        need!(BODY_LENGTH_OFFSET + BODY_LENGTH_LEN);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[BODY_LENGTH_OFFSET..BODY_LENGTH_OFFSET + BODY_LENGTH_LEN]);
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_BODY_LENGTH {
            return Err(CodecError::Malformed(format!(
                "body length {len} exceeds maximum of {MAX_BODY_LENGTH}"
            )));
        }
        (len, BODY_LENGTH_OFFSET + BODY_LENGTH_LEN)
    } else {
        (0, BODY_INCLUDED_OFFSET + BODY_INCLUDED_LEN)
    };

    let body_start = header_len;
    let body_end = body_start + body_length as usize;
    let frame_end_offset = body_end;
    need!(frame_end_offset + FRAME_END_LEN);

    if buf[frame_end_offset..frame_end_offset + FRAME_END_LEN] != end_marker {
        return Err(CodecError::Malformed(format!(
            "invalid frame end {:02X?}",
            &buf[frame_end_offset..frame_end_offset + FRAME_END_LEN]
        )));
    }

    let kind = CommandKind::lookup(head0, head1, head2, body_included, body_length, raw_point_count)
        .ok_or_else(|| {
            CodecError::Malformed(format!(
                "unknown command (head0=0x{head0:02X}, head1=0x{head1:02X}, head2=0x{head2:02X}, bodyIncluded={body_included}, bodyLength={body_length})"
            ))
        })?;

    let body = buf[body_start..body_end].to_vec();
    let consumed = frame_end_offset + FRAME_END_LEN;

    Ok(DecodeOutcome::Complete(DecodedFrame { kind, body, consumed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{encode_start_stream, encode_stop_stream};

    fn vib_demod_frame(body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x33, 0x55, 0x0C, 0x00, 0x00, 0x00, 0x80, 0x11, 0x00, 0xDA];
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0x33, 0xAA]);
        frame
    }

    #[test]
    fn s1_codec_happy_path() {
        let frame = vib_demod_frame(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let outcome = decode_frame(&frame, Direction::Recv, 2).expect("decodes");
        let DecodeOutcome::Complete(decoded) = outcome else {
            panic!("expected Complete, got NeedMore");
        };
        assert_eq!(decoded.kind, CommandKind::VibDemod);
        assert_eq!(decoded.body, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(decoded.consumed, 22);
    }

    #[test]
    fn s2_two_frames_concatenated() {
        let mut bytes = vib_demod_frame(&[1, 2, 3, 4]);
        bytes.extend(vib_demod_frame(&[5, 6, 7, 8]));

        let first = decode_frame(&bytes, Direction::Recv, 2).expect("decodes");
        let DecodeOutcome::Complete(first) = first else {
            panic!("expected Complete")
        };
        assert_eq!(first.body, vec![1, 2, 3, 4]);

        let rest = &bytes[first.consumed..];
        let second = decode_frame(rest, Direction::Recv, 2).expect("decodes");
        let DecodeOutcome::Complete(second) = second else {
            panic!("expected Complete")
        };
        assert_eq!(second.body, vec![5, 6, 7, 8]);
    }

    #[test]
    fn s3_body_too_long_is_malformed() {
        let mut frame = vec![0x33, 0x55, 0x0C, 0x00, 0x00, 0x00, 0x80, 0x11, 0x00, 0xDA];
        frame.extend_from_slice(&10_000u32.to_le_bytes());
        let err = decode_frame(&frame, Direction::Recv, 2).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn body_length_zero_with_body_included_is_rejected() {
        // VibDemod fixes bodyLength = raw_point_count*2 != 0, so a zero-length
        // body with bodyIncluded=true is an unrecognized command.
        let frame = vib_demod_frame(&[]);
        let err = decode_frame(&frame, Direction::Recv, 2).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn body_length_5000_is_accepted_5001_is_not() {
        let mut ok = vec![0x33, 0x55, 0x0C, 0x00, 0x00, 0x00, 0x80, 0x11, 0x00, 0xDA];
        ok.extend_from_slice(&5000u32.to_le_bytes());
        ok.extend(vec![0u8; 5000]);
        ok.extend_from_slice(&[0x33, 0xAA]);
        let outcome = decode_frame(&ok, Direction::Recv, 2500).expect("decodes");
        assert!(matches!(outcome, DecodeOutcome::Complete(_)));

        let mut too_long = vec![0x33, 0x55, 0x0C, 0x00, 0x00, 0x00, 0x80, 0x11, 0x00, 0xDA];
        too_long.extend_from_slice(&5001u32.to_le_bytes());
        let err = decode_frame(&too_long, Direction::Recv, 2500).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn partial_tail_is_need_more_not_malformed() {
        let frame = vib_demod_frame(&[1, 2, 3, 4]);
        for cut in 1..frame.len() {
            let outcome = decode_frame(&frame[..cut], Direction::Recv, 2).expect("never malformed");
            assert_eq!(outcome, DecodeOutcome::NeedMore, "prefix of len {cut} should be NeedMore");
        }
    }

    #[test]
    fn send_command_round_trips() {
        let start = encode_start_stream();
        let outcome = decode_frame(&start, Direction::Send, 0).expect("decodes");
        let DecodeOutcome::Complete(decoded) = outcome else {
            panic!("expected Complete")
        };
        assert_eq!(decoded.kind, CommandKind::StartStream);
        assert_eq!(decoded.consumed, start.len());

        let stop = encode_stop_stream();
        let outcome = decode_frame(&stop, Direction::Send, 0).expect("decodes");
        let DecodeOutcome::Complete(decoded) = outcome else {
            panic!("expected Complete")
        };
        assert_eq!(decoded.kind, CommandKind::StopStream);
    }

    #[test]
    fn byte_at_a_time_matches_all_at_once() {
        let frame = vib_demod_frame(&[9, 9, 9, 9]);
        let all_at_once = decode_frame(&frame, Direction::Recv, 2).expect("decodes");
        // Feeding fewer bytes must never produce a different decoded command,
        // only NeedMore, until the full frame is present.
        for cut in 1..frame.len() {
            let partial = decode_frame(&frame[..cut], Direction::Recv, 2).expect("decodes");
            assert_eq!(partial, DecodeOutcome::NeedMore);
        }
        let full = decode_frame(&frame[..frame.len()], Direction::Recv, 2).expect("decodes");
        assert_eq!(full, all_at_once);
    }
}
