//! The session state machine.
//!
//! # State Machine Diagram
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                     RCON Session State Machine                     │
//! │                                                                    │
//! │  ┌────────┐  connect()   ┌────────────┐  login sent  ┌──────────┐  │
//! │  │ Closed │ ───────────► │ Connecting │ ───────────► │ Authen-  │  │
//! │  └────────┘              └────────────┘              │ ticating │  │
//! │      ▲                                               └────┬─────┘  │
//! │      │ reconnect delay                 Login(0x01) accept │        │
//! │      │ (unless aborted)                                   ▼        │
//! │      │                                              ┌───────────┐  │
//! │      │                                              │ Connected │  │
//! │      │                                              └────┬──────┘  │
//! │      │          watchdog / transport error / close()     │         │
//! │      │                                                   ▼         │
//! │      │                                             ┌─────────┐     │
//! │      └──────────────────────────────────────────── │ Closing │     │
//! │                                                    └─────────┘     │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State Transitions
//!
//! | From           | To             | Trigger                              |
//! |----------------|----------------|--------------------------------------|
//! | Closed         | Connecting     | `connect()` (or reconnect delay)     |
//! | Connecting     | Authenticating | Association opened, login sent       |
//! | Authenticating | Connected      | `Login` reply with status `0x01`     |
//! | Authenticating | Closing        | Status `0x00` or login deadline      |
//! | Connected      | Closing        | Watchdog, transport error, give-up   |
//! | any            | Closing        | `close()`                            |
//! | Closing        | Closed         | Cleanup complete                     |

/// Where a session currently is in its lifecycle.
///
/// Transitions are driven by [`RconClient::connect`], [`RconClient::poll`]
/// and [`RconClient::close`]; see the module documentation for the full
/// diagram.
///
/// [`RconClient::connect`]: crate::RconClient::connect
/// [`RconClient::poll`]: crate::RconClient::poll
/// [`RconClient::close`]: crate::RconClient::close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No association exists. `connect()` (or the reconnect timer) moves
    /// to `Connecting`.
    Closed,
    /// The datagram association is being established.
    Connecting,
    /// The login frame has been sent; awaiting the status reply.
    Authenticating,
    /// Logged in; commands flow and the roster is maintained.
    Connected,
    /// Tearing down: volatile state is discarded and the final
    /// `Disconnected` event is emitted before reaching `Closed`.
    Closing,
}

impl SessionState {
    /// Returns a label suitable for logs and diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
