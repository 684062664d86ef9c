//! Wire codec for the BattlEye RCON frame format.
//!
//! Every datagram exchanged with the server is a single frame:
//!
//! ```text
//! 'B' 'E' | crc32 (little-endian) | 0xFF | kind | body...
//!  2 bytes       4 bytes            1 B    1 B
//! ```
//!
//! The CRC-32 (IEEE polynomial) is computed over everything from the `0xFF`
//! separator through the end of the frame, and stored little-endian right
//! after the two-byte prefix. Bodies depend on the kind:
//!
//! - **Login** (`0x00`): the raw password bytes outbound, a single status
//!   byte (`0x01` accepted / `0x00` rejected) inbound.
//! - **Command** (`0x01`): a sequence byte, then either the payload, or a
//!   3-byte multi-part subheader `{0x00, total, index}` followed by one
//!   fragment of the payload.
//! - **Server message** (`0x02`): a sequence byte and the message payload;
//!   the client acknowledges with an empty-payload frame of the same kind
//!   and sequence.
//!
//! This module is purely functional: [`decode`] classifies inbound bytes
//! into [`RconFrame`] variants and the `encode_*` functions seal outbound
//! frames. Both directions are provided so tools and tests can speak either
//! side of the protocol.

use crate::error::DecodeError;

/// The two-byte frame prefix.
pub const FRAME_PREFIX: [u8; 2] = *b"BE";

/// Length of the fixed envelope: prefix, checksum, separator and kind.
pub const HEADER_LEN: usize = 8;

/// Separator byte between the checksum and the checksummed region.
const SEPARATOR: u8 = 0xFF;

/// Frame kind byte for login frames.
const KIND_LOGIN: u8 = 0x00;
/// Frame kind byte for command frames.
const KIND_COMMAND: u8 = 0x01;
/// Frame kind byte for server-message frames (and their acks).
const KIND_SERVER_MESSAGE: u8 = 0x02;

/// A decoded frame, classified by kind and multi-part structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RconFrame {
    /// A login frame. Outbound this carries the password; inbound it
    /// carries a single status byte. Interpretation is left to the
    /// session, so encode/decode round-trips are exact.
    Login {
        /// The raw login body.
        payload: Vec<u8>,
    },
    /// A complete command frame (request or single-part response).
    CommandWhole {
        /// The sequence tying this frame to its request.
        sequence: u8,
        /// The command payload.
        data: Vec<u8>,
    },
    /// One fragment of a multi-part command response.
    CommandPart {
        /// The sequence tying this fragment to its request.
        sequence: u8,
        /// Total number of fragments in the response.
        total: u8,
        /// Position of this fragment, `0..total`.
        index: u8,
        /// The fragment bytes.
        data: Vec<u8>,
    },
    /// A server-originated message that must be acknowledged.
    ServerMessage {
        /// The sequence the ack must echo.
        sequence: u8,
        /// The message payload.
        data: Vec<u8>,
    },
}

/// Computes the frame checksum over the region starting at the separator.
#[inline]
#[must_use]
pub fn checksum(region: &[u8]) -> u32 {
    crc32fast::hash(region)
}

/// Seals a body into a complete frame of the given kind.
fn seal(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&FRAME_PREFIX);
    frame.extend_from_slice(&[0; 4]);
    frame.push(SEPARATOR);
    frame.push(kind);
    frame.extend_from_slice(body);
    let crc = checksum(&frame[6..]);
    frame[2..6].copy_from_slice(&crc.to_le_bytes());
    frame
}

/// Encodes a login frame carrying the given password bytes.
///
/// The body is raw bytes; BattlEye expects ASCII for wire compatibility.
#[must_use]
pub fn encode_login(password: &[u8]) -> Vec<u8> {
    seal(KIND_LOGIN, password)
}

/// Encodes a command frame with the given sequence and payload.
#[must_use]
pub fn encode_command(sequence: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(sequence);
    body.extend_from_slice(payload);
    seal(KIND_COMMAND, &body)
}

/// Encodes the empty-payload command used as a keep-alive.
#[must_use]
pub fn encode_heartbeat(sequence: u8) -> Vec<u8> {
    encode_command(sequence, &[])
}

/// Encodes the acknowledgement for a server message with the given
/// sequence.
#[must_use]
pub fn encode_ack(sequence: u8) -> Vec<u8> {
    seal(KIND_SERVER_MESSAGE, &[sequence])
}

/// Encodes a server-message frame. The client never sends these (beyond
/// acks); this exists so tools and tests can produce server-side traffic.
#[must_use]
pub fn encode_server_message(sequence: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(sequence);
    body.extend_from_slice(payload);
    seal(KIND_SERVER_MESSAGE, &body)
}

/// Encodes one fragment of a multi-part command response. Server-side
/// traffic, provided for tools and tests.
#[must_use]
pub fn encode_command_part(sequence: u8, total: u8, index: u8, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + data.len());
    body.push(sequence);
    body.push(0x00);
    body.push(total);
    body.push(index);
    body.extend_from_slice(data);
    seal(KIND_COMMAND, &body)
}

/// Decodes and classifies a received datagram.
///
/// # Errors
///
/// - [`DecodeError::TooShort`] if the datagram cannot hold the envelope
///   (or a command/server-message body is missing its sequence byte).
/// - [`DecodeError::BadPrefix`] if the `"BE"` prefix or the `0xFF`
///   separator is absent.
/// - [`DecodeError::BadChecksum`] if the stored CRC-32 does not match the
///   bytes on the wire.
/// - [`DecodeError::UnknownKind`] for unrecognized kind bytes.
pub fn decode(bytes: &[u8]) -> Result<RconFrame, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }
    if bytes[0..2] != FRAME_PREFIX || bytes[6] != SEPARATOR {
        return Err(DecodeError::BadPrefix);
    }

    let stored = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let computed = checksum(&bytes[6..]);
    if stored != computed {
        return Err(DecodeError::BadChecksum {
            expected: stored,
            actual: computed,
        });
    }

    let kind = bytes[7];
    let body = &bytes[HEADER_LEN..];
    match kind {
        KIND_LOGIN => Ok(RconFrame::Login {
            payload: body.to_vec(),
        }),
        KIND_COMMAND => {
            let (&sequence, rest) = body
                .split_first()
                .ok_or(DecodeError::TooShort { len: bytes.len() })?;
            // The multi-part subheader is {0x00, total, index}; all three
            // bytes must be present for the fragment to name its slot.
            if rest.len() >= 3 && rest[0] == 0x00 {
                Ok(RconFrame::CommandPart {
                    sequence,
                    total: rest[1],
                    index: rest[2],
                    data: rest[3..].to_vec(),
                })
            } else {
                Ok(RconFrame::CommandWhole {
                    sequence,
                    data: rest.to_vec(),
                })
            }
        },
        KIND_SERVER_MESSAGE => {
            let (&sequence, rest) = body
                .split_first()
                .ok_or(DecodeError::TooShort { len: bytes.len() })?;
            Ok(RconFrame::ServerMessage {
                sequence,
                data: rest.to_vec(),
            })
        },
        kind => Err(DecodeError::UnknownKind { kind }),
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn login_roundtrip() {
        let frame = encode_login(b"secret");
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::Login {
                payload: b"secret".to_vec()
            }
        );
    }

    #[test]
    fn login_status_roundtrip() {
        // A server login reply is the same kind with a one-byte body.
        let frame = encode_login(&[0x01]);
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::Login {
                payload: vec![0x01]
            }
        );
    }

    #[test]
    fn command_roundtrip() {
        let frame = encode_command(42, b"players");
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::CommandWhole {
                sequence: 42,
                data: b"players".to_vec()
            }
        );
    }

    #[test]
    fn heartbeat_is_empty_command() {
        let frame = encode_heartbeat(7);
        assert_eq!(frame, encode_command(7, &[]));
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::CommandWhole {
                sequence: 7,
                data: Vec::new()
            }
        );
    }

    #[test]
    fn ack_roundtrip() {
        let frame = encode_ack(200);
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::ServerMessage {
                sequence: 200,
                data: Vec::new()
            }
        );
    }

    #[test]
    fn server_message_roundtrip() {
        let frame = encode_server_message(9, b"Player #3 Alice disconnected");
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::ServerMessage {
                sequence: 9,
                data: b"Player #3 Alice disconnected".to_vec()
            }
        );
    }

    #[test]
    fn command_part_roundtrip() {
        let frame = encode_command_part(7, 2, 1, b" world");
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::CommandPart {
                sequence: 7,
                total: 2,
                index: 1,
                data: b" world".to_vec()
            }
        );
    }

    #[test]
    fn part_with_empty_fragment_still_classifies() {
        let frame = encode_command_part(3, 1, 0, &[]);
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::CommandPart {
                sequence: 3,
                total: 1,
                index: 0,
                data: Vec::new()
            }
        );
    }

    #[test]
    fn nonzero_second_byte_is_whole_command() {
        // body[1] != 0x00 means the payload simply starts with that byte.
        let frame = encode_command(5, &[0x01, 0x02, 0x03]);
        assert_eq!(
            decode(&frame).unwrap(),
            RconFrame::CommandWhole {
                sequence: 5,
                data: vec![0x01, 0x02, 0x03]
            }
        );
    }

    #[test]
    fn short_datagrams_rejected() {
        for len in 0..HEADER_LEN {
            let bytes = vec![0u8; len];
            assert_eq!(decode(&bytes), Err(DecodeError::TooShort { len }));
        }
    }

    #[test]
    fn wrong_prefix_rejected() {
        let mut frame = encode_login(b"pw");
        frame[0] = b'X';
        assert_eq!(decode(&frame), Err(DecodeError::BadPrefix));
    }

    #[test]
    fn wrong_separator_rejected() {
        let mut frame = encode_login(b"pw");
        frame[6] = 0x00;
        assert_eq!(decode(&frame), Err(DecodeError::BadPrefix));
    }

    #[test]
    fn corruption_anywhere_in_body_is_bad_checksum() {
        let frame = encode_command(1, b"say -1 hello");
        for i in 7..frame.len() {
            let mut corrupted = frame.clone();
            corrupted[i] ^= 0x40;
            assert!(
                matches!(decode(&corrupted), Err(DecodeError::BadChecksum { .. })),
                "corruption at offset {i} was not caught"
            );
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        let frame = seal(0x07, &[0x01]);
        assert_eq!(decode(&frame), Err(DecodeError::UnknownKind { kind: 0x07 }));
    }

    #[test]
    fn command_without_sequence_rejected() {
        let frame = seal(KIND_COMMAND, &[]);
        assert!(matches!(decode(&frame), Err(DecodeError::TooShort { .. })));
    }

    #[test]
    fn crc_is_ieee() {
        // Known CRC-32 (IEEE, reflected) test vector.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn checksum_stored_little_endian() {
        let frame = encode_login(b"");
        let crc = checksum(&frame[6..]);
        assert_eq!(frame[2..6], crc.to_le_bytes());
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Encode/decode round-trips are exact for any sequence and payload.
        #[test]
        fn prop_command_roundtrip(sequence in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            // A payload starting with 0x00 would collide with the
            // multi-part subheader; command payloads are ASCII text in
            // practice, so restrict the first byte accordingly.
            prop_assume!(payload.first() != Some(&0x00) || payload.len() < 3);
            let frame = encode_command(sequence, &payload);
            let decoded = decode(&frame).unwrap();
            prop_assert_eq!(decoded, RconFrame::CommandWhole { sequence, data: payload });
        }

        /// Server-message frames round-trip for any payload.
        #[test]
        fn prop_server_message_roundtrip(sequence in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let frame = encode_server_message(sequence, &payload);
            let decoded = decode(&frame).unwrap();
            prop_assert_eq!(decoded, RconFrame::ServerMessage { sequence, data: payload });
        }

        /// Multi-part fragments round-trip for any subheader values.
        #[test]
        fn prop_part_roundtrip(
            sequence in any::<u8>(),
            total in any::<u8>(),
            index in any::<u8>(),
            data in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let frame = encode_command_part(sequence, total, index, &data);
            let decoded = decode(&frame).unwrap();
            prop_assert_eq!(decoded, RconFrame::CommandPart { sequence, total, index, data });
        }

        /// Any single-byte corruption in the checksummed region is caught.
        #[test]
        fn prop_single_byte_corruption_detected(
            payload in proptest::collection::vec(any::<u8>(), 0..128),
            offset in any::<proptest::sample::Index>(),
            flip in 1..=255u8,
        ) {
            let frame = encode_login(&payload);
            let region = 6..frame.len();
            let i = region.start + offset.index(region.len());
            let mut corrupted = frame;
            corrupted[i] ^= flip;
            let is_detected = matches!(
                decode(&corrupted),
                Err(DecodeError::BadChecksum { .. }) | Err(DecodeError::BadPrefix)
            );
            prop_assert!(is_detected);
        }
    }
}
