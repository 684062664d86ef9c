use std::error::Error;
use std::fmt;
use std::fmt::Display;

// =============================================================================
// Structured Error Types for the Datagram Path
// =============================================================================
// Inbound datagrams are untrusted; decode failures are routine and must be
// cheap to construct. These types store the offending data as fields and
// format lazily in their Display impls.

/// Why an inbound datagram could not be decoded into a frame.
///
/// Decode failures are non-fatal: the datagram is dropped, an
/// [`RconEvent::Error`](crate::RconEvent::Error) is emitted and processing
/// continues with the next datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DecodeError {
    /// The datagram is shorter than the 8-byte frame envelope.
    TooShort {
        /// The actual datagram length.
        len: usize,
    },
    /// The datagram does not begin with the `"BE"` prefix, or the separator
    /// byte after the checksum is not `0xFF`.
    BadPrefix,
    /// The stored CRC-32 does not match the checksum computed over the
    /// frame's payload region.
    BadChecksum {
        /// The checksum stored in the frame header.
        expected: u32,
        /// The checksum computed over the received bytes.
        actual: u32,
    },
    /// The frame kind byte is not a known packet type.
    UnknownKind {
        /// The kind byte found in the frame.
        kind: u8,
    },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => {
                write!(f, "datagram too short to be a frame ({len} bytes)")
            },
            Self::BadPrefix => write!(f, "datagram does not carry the BE frame envelope"),
            Self::BadChecksum { expected, actual } => {
                write!(
                    f,
                    "frame checksum mismatch (stored {expected:#010x}, computed {actual:#010x})"
                )
            },
            Self::UnknownKind { kind } => write!(f, "unknown frame kind {kind:#04x}"),
        }
    }
}

/// Which server-message rule was being applied when a capture failed.
///
/// A [`RconError::Parse`] names the rule whose structural literals matched
/// while one of its captured fields did not parse (an out-of-range id, a
/// malformed address, a chat line naming no known player).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ParseRule {
    /// `Player #N <name> (ip:port) connected`
    PlayerConnecting,
    /// `Player #N <name> BE GUID: <hex32>`
    GuidCalculated,
    /// `Verified GUID (<hex32>) of player #N <name>`
    GuidVerified,
    /// `Player #N <name> disconnected`
    PlayerDisconnected,
    /// `Player #N <name> (<hex32>) has been kicked by BattlEye: <reason>`
    PlayerKicked,
    /// `<Type> Log: #N <name> (<hex32>) - #F <body>`
    BeLog,
    /// `(<channel>) <name>: <text>`
    PlayerMessage,
    /// `RCon admin #N: (<channel>) <text>`
    AdminMessage,
    /// A row of the tabular `players` reply.
    PlayerList,
}

impl ParseRule {
    /// Returns the rule name used in diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerConnecting => "playerConnecting",
            Self::GuidCalculated => "guidCalculated",
            Self::GuidVerified => "guidVerified",
            Self::PlayerDisconnected => "playerDisconnected",
            Self::PlayerKicked => "playerKicked",
            Self::BeLog => "beLog",
            Self::PlayerMessage => "playerMessage",
            Self::AdminMessage => "adminMessage",
            Self::PlayerList => "players",
        }
    }
}

impl Display for ParseRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Main Error Enum
// =============================================================================

/// All error conditions this library can surface.
///
/// Recoverable errors arrive through [`RconEvent::Error`] and processing
/// continues; fatal errors additionally close the session, emitting a
/// [`RconEvent::Disconnected`] whose `aborted` flag tells whether a
/// reconnect will follow. Use [`RconError::is_fatal`] to distinguish the
/// two without enumerating variants.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`; always include a wildcard arm
/// when matching.
///
/// [`RconEvent::Error`]: crate::RconEvent::Error
/// [`RconEvent::Disconnected`]: crate::RconEvent::Disconnected
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RconError {
    /// An inbound datagram failed frame validation and was dropped.
    Decode(DecodeError),
    /// The server rejected the login password. Fatal; automatic
    /// reconnection is disabled because retrying cannot succeed.
    InvalidPassword,
    /// No login reply arrived within the login deadline.
    LoginTimeout,
    /// No inbound frame arrived within the configured idle limit.
    IdleTimeout,
    /// An in-flight command exhausted its resend budget without any
    /// response.
    CommandTimeout {
        /// The command text that was abandoned.
        command: String,
    },
    /// The underlying datagram endpoint failed.
    Transport {
        /// A description of the endpoint failure.
        context: String,
    },
    /// A recognized server-message rule matched but a capture failed.
    /// Non-fatal; no state was changed.
    Parse {
        /// The rule that was being applied.
        rule: ParseRule,
        /// The raw payload that failed to parse.
        raw: String,
    },
    /// A non-empty server message matched no known rule. Non-fatal;
    /// useful for diagnosing server builds with unexpected message
    /// formats.
    UnknownServerMessage {
        /// The raw payload.
        raw: String,
    },
    /// A recognized benign advisory from the server (BE Master and ban
    /// service notices). Non-fatal.
    ServerAdvisory {
        /// The raw advisory text.
        raw: String,
    },
    /// The supplied configuration failed validation.
    InvalidConfig {
        /// Further specifies what was invalid.
        info: String,
    },
}

impl RconError {
    /// Returns `true` if this error closes the session when it occurs.
    ///
    /// Fatal errors are followed by a `Disconnected` event; whether a
    /// reconnect is attempted depends on the error ([`InvalidPassword`]
    /// always aborts) and the session's auto-reconnect setting.
    ///
    /// [`InvalidPassword`]: RconError::InvalidPassword
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidPassword
                | Self::LoginTimeout
                | Self::IdleTimeout
                | Self::CommandTimeout { .. }
                | Self::Transport { .. }
        )
    }
}

impl Display for RconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "frame decode failed: {err}"),
            Self::InvalidPassword => write!(f, "server rejected the RCon password"),
            Self::LoginTimeout => write!(f, "no login reply within the login deadline"),
            Self::IdleTimeout => write!(f, "no inbound traffic within the idle limit"),
            Self::CommandTimeout { command } => {
                write!(f, "command {command:?} received no response and was abandoned")
            },
            Self::Transport { context } => write!(f, "transport failure: {context}"),
            Self::Parse { rule, raw } => {
                write!(f, "message matched rule {rule} but failed to parse: {raw:?}")
            },
            Self::UnknownServerMessage { raw } => {
                write!(f, "unrecognized server message: {raw:?}")
            },
            Self::ServerAdvisory { raw } => write!(f, "server advisory: {raw}"),
            Self::InvalidConfig { info } => write!(f, "invalid configuration: {info}"),
        }
    }
}

impl Error for RconError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        // Context is stored as structured fields, not wrapped errors, so
        // the type stays Clone + PartialEq.
        None
    }
}

impl From<DecodeError> for RconError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err = DecodeError::TooShort { len: 3 };
        assert!(err.to_string().contains("too short"));
        assert!(err.to_string().contains('3'));

        let err = DecodeError::BadChecksum {
            expected: 0xDEAD_BEEF,
            actual: 0x1234_5678,
        };
        let msg = err.to_string();
        assert!(msg.contains("checksum mismatch"));
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("0x12345678"));

        let err = DecodeError::UnknownKind { kind: 7 };
        assert!(err.to_string().contains("0x07"));
    }

    #[test]
    fn parse_rule_names() {
        assert_eq!(ParseRule::PlayerConnecting.as_str(), "playerConnecting");
        assert_eq!(ParseRule::PlayerList.as_str(), "players");
        assert_eq!(format!("{}", ParseRule::BeLog), "beLog");
    }

    #[test]
    fn fatal_classification() {
        assert!(RconError::InvalidPassword.is_fatal());
        assert!(RconError::LoginTimeout.is_fatal());
        assert!(RconError::IdleTimeout.is_fatal());
        assert!(RconError::CommandTimeout {
            command: "players".to_string()
        }
        .is_fatal());
        assert!(RconError::Transport {
            context: "socket closed".to_string()
        }
        .is_fatal());

        assert!(!RconError::Decode(DecodeError::BadPrefix).is_fatal());
        assert!(!RconError::UnknownServerMessage {
            raw: "hello".to_string()
        }
        .is_fatal());
        assert!(!RconError::Parse {
            rule: ParseRule::PlayerMessage,
            raw: "(Side) ghost: hi".to_string()
        }
        .is_fatal());
        assert!(!RconError::ServerAdvisory {
            raw: "Connected to BE Master".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn rcon_error_display() {
        let err = RconError::CommandTimeout {
            command: "players".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("players"));
        assert!(msg.contains("abandoned"));

        let err = RconError::Parse {
            rule: ParseRule::AdminMessage,
            raw: "RCon admin #x: bad".to_string(),
        };
        assert!(err.to_string().contains("adminMessage"));
    }

    #[test]
    fn decode_error_converts() {
        let err: RconError = DecodeError::BadPrefix.into();
        assert_eq!(err, RconError::Decode(DecodeError::BadPrefix));
    }

    #[test]
    fn error_implements_std_error() {
        let err: Box<dyn Error> = Box::new(RconError::IdleTimeout);
        assert!(err.source().is_none());
    }
}
