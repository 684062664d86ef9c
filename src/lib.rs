//! # bercon
//!
//! A BattlEye RCON client: a stateful UDP protocol engine that logs in,
//! exchanges CRC-32-framed packets, reassembles fragmented replies, keeps
//! the connection alive, and maintains a live roster of connected players
//! from the server's notification stream and periodic `players` polls.
//!
//! The crate is transport-agnostic at its seam ([`DatagramSocket`]) and
//! poll-driven: the owner calls [`RconClient::poll`] in a loop and drains
//! typed [`RconEvent`]s. No threads, no locks, no async runtime; state
//! mutation happens exclusively on the caller's thread, which makes event
//! ordering exactly frame-arrival order.
//!
//! ```no_run
//! use bercon::{RconClient, RconConfig, RconEvent};
//!
//! # fn main() -> Result<(), bercon::RconError> {
//! let mut client = RconClient::new(RconConfig::new("127.0.0.1", 2302, "secret"))?;
//! client.connect();
//! loop {
//!     client.poll();
//!     for event in client.events() {
//!         if let RconEvent::Players { players } = event {
//!             println!("{} players online", players.len());
//!         }
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(250));
//! }
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![warn(rustdoc::invalid_html_tags)]
#![warn(rustdoc::bare_urls)]

pub use error::{DecodeError, ParseRule, RconError};
pub use network::udp_socket::UdpDatagramSocket;
pub use roster::{BeLogRecord, Player, PlayerChanges};
pub use session::config::{
    RconConfig, MAX_PLAYER_UPDATE_INTERVAL, MIN_PLAYER_UPDATE_INTERVAL,
};
pub use session::event_drain::EventDrain;
pub use session::state::SessionState;
pub use session::RconClient;

/// A specialized `Result` type for RCON operations.
///
/// Named `RconResult` rather than `Result` so glob imports cannot shadow
/// `std::result::Result`. The second type parameter overrides the error
/// type when needed.
///
/// # Examples
///
/// ```
/// use bercon::{RconResult, RconError};
///
/// fn check() -> RconResult<()> {
///     Ok(())
/// }
/// ```
pub type RconResult<T, E = RconError> = std::result::Result<T, E>;

#[doc(hidden)]
pub mod error;
pub mod telemetry;
#[doc(hidden)]
pub mod roster;
mod scheduler;
#[doc(hidden)]
pub mod session;
#[doc(hidden)]
pub mod network {
    /// Wire codec for the BattlEye RCON frame format.
    pub mod codec;
    pub(crate) mod reassembly;
    #[doc(hidden)]
    pub mod udp_socket;
}

/// The transport seam: a non-blocking, connected datagram endpoint.
///
/// [`UdpDatagramSocket`] is the production implementation. Supplying a
/// custom implementation via [`RconClient::with_socket`] lets the protocol
/// run over other datagram carriers, or deterministically in tests.
///
/// All methods are non-blocking; `receive_all` returns whatever datagrams
/// arrived since the previous call.
pub trait DatagramSocket {
    /// (Re-)establishes the association with the server. Called once per
    /// session, including before every reconnect attempt.
    fn open(&mut self) -> std::io::Result<()>;

    /// Sends one datagram to the server.
    fn send(&mut self, datagram: &[u8]) -> std::io::Result<()>;

    /// Returns every datagram received since the last call, without
    /// blocking.
    fn receive_all(&mut self) -> std::io::Result<Vec<Vec<u8>>>;

    /// Tears the association down. Must be idempotent.
    fn close(&mut self);
}

/// Everything a session reports to its owner.
///
/// Events are buffered inside the session and drained through
/// [`RconClient::events`]; within one session their order matches frame
/// arrival order. Player payloads are immutable snapshots.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RconEvent {
    /// The login handshake completed.
    Connected,
    /// The session closed.
    Disconnected {
        /// Why the session closed (e.g. `"Invalid password"`).
        reason: String,
        /// `true` when no reconnect will be attempted.
        aborted: bool,
    },
    /// A recoverable or fatal error occurred. Fatal errors are followed
    /// by [`RconEvent::Disconnected`].
    Error {
        /// The error that occurred.
        error: RconError,
    },
    /// A roster dump was processed; a full snapshot of the roster.
    Players {
        /// Every player currently on the authoritative roster.
        players: Vec<Player>,
    },
    /// A player completed GUID verification (or was found by the initial
    /// roster dump).
    PlayerJoin {
        /// The new roster entry.
        player: Player,
    },
    /// A player disconnected or was kicked.
    PlayerLeave {
        /// The entry that was removed.
        player: Player,
        /// `"disconnected"`, or the kick reason reported by the server.
        reason: String,
    },
    /// A roster dump changed one or more fields of a player.
    PlayerUpdated {
        /// The entry after the mutation.
        player: Player,
        /// Which fields changed.
        changes: PlayerChanges,
    },
    /// The server reported a BattlEye filter log line.
    BeLog {
        /// The parsed log record.
        record: BeLogRecord,
    },
    /// A player wrote in chat.
    PlayerMessage {
        /// The speaking player.
        player: Player,
        /// The chat channel (`Side`, `Global`, ...).
        channel: String,
        /// The message text, with the speaker prefix removed.
        text: String,
    },
    /// Another RCON admin wrote in chat.
    AdminMessage {
        /// The server-assigned admin id.
        admin_id: u32,
        /// The chat channel.
        channel: String,
        /// The message text.
        text: String,
    },
    /// The reply to a command issued via [`RconClient::send_command`].
    CommandResponse {
        /// The command that was sent.
        command: String,
        /// The server's reply, reassembled if it was fragmented.
        response: String,
    },
}
