//! The session: transport ownership, the connection state machine, frame
//! routing and liveness timers.
//!
//! [`RconClient`] is poll-driven. The owner calls [`RconClient::poll`]
//! regularly (a few times per second is plenty; the protocol's own cadence
//! is one second); each call drains the socket, routes decoded frames,
//! runs the deadline timers and lets the scheduler put outbound frames on
//! the wire. Everything happens on the caller's thread, so event order is
//! exactly frame-arrival order and no locking exists anywhere.

pub mod config;
pub mod event_drain;
pub mod state;

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, trace, warn};

use crate::error::RconError;
use crate::network::codec::{self, RconFrame};
use crate::network::reassembly::Reassembler;
use crate::network::udp_socket::UdpDatagramSocket;
use crate::report_violation;
use crate::roster::parser;
use crate::roster::{Player, RosterEngine};
use crate::scheduler::{CommandInFlight, CommandKind, CommandScheduler, SchedulerAction};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{DatagramSocket, RconEvent, RconResult};
use config::{RconConfig, HEARTBEAT_INTERVAL, LOGIN_DEADLINE, RECONNECT_DELAY};
use event_drain::EventDrain;
use state::SessionState;

/// Size of the server-message dedup window.
const ACK_WINDOW: usize = 256;

/// Remembers recently accepted server-message sequences so retransmits are
/// acknowledged without being re-delivered.
#[derive(Debug, Default)]
struct AckWindow {
    recent: VecDeque<u8>,
}

impl AckWindow {
    /// Records a sighting. Returns `true` the first time a sequence is
    /// seen within the window.
    fn observe(&mut self, sequence: u8) -> bool {
        if self.recent.contains(&sequence) {
            return false;
        }
        if self.recent.len() == ACK_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence);
        true
    }

    fn reset(&mut self) {
        self.recent.clear();
    }
}

/// A long-lived RCON session against one BattlEye server.
///
/// # Example
///
/// ```no_run
/// use bercon::{RconClient, RconConfig, RconEvent};
///
/// # fn main() -> Result<(), bercon::RconError> {
/// let config = RconConfig::new("192.168.1.10", 2302, "secret");
/// let mut client = RconClient::new(config)?;
/// client.connect();
///
/// loop {
///     client.poll();
///     for event in client.events() {
///         match event {
///             RconEvent::PlayerJoin { player } => println!("+ {}", player.name),
///             RconEvent::PlayerLeave { player, reason } => {
///                 println!("- {} ({reason})", player.name);
///             },
///             _ => {},
///         }
///     }
///     std::thread::sleep(std::time::Duration::from_millis(250));
/// }
/// # }
/// ```
pub struct RconClient {
    config: RconConfig,
    socket: Box<dyn DatagramSocket>,
    state: SessionState,
    scheduler: CommandScheduler,
    reassembler: Reassembler,
    roster: RosterEngine,
    ack_window: AckWindow,
    event_queue: VecDeque<RconEvent>,

    // Timers. All are plain deadlines owned by the session; closing the
    // session clears them, so nothing can fire after `Closed`.
    login_deadline: Option<Instant>,
    last_recv_at: Instant,
    keepalive_basis: Instant,
    next_roster_poll_at: Option<Instant>,
    reconnect_at: Option<Instant>,

    heartbeat_interval: Duration,
    login_deadline_interval: Duration,
    reconnect_delay: Duration,
}

impl RconClient {
    /// Creates a session that will talk UDP to the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`RconError::InvalidConfig`] when the configuration fails
    /// validation.
    pub fn new(config: RconConfig) -> RconResult<Self> {
        let socket = UdpDatagramSocket::new(config.host.clone(), config.port);
        Self::with_socket(config, Box::new(socket))
    }

    /// Creates a session over a caller-supplied transport.
    ///
    /// This is the seam for custom transports and for driving the protocol
    /// deterministically in tests.
    ///
    /// # Errors
    ///
    /// Returns [`RconError::InvalidConfig`] when the configuration fails
    /// validation.
    pub fn with_socket(config: RconConfig, socket: Box<dyn DatagramSocket>) -> RconResult<Self> {
        config.validate()?;
        let now = Instant::now();
        Ok(Self {
            config,
            socket,
            state: SessionState::Closed,
            scheduler: CommandScheduler::new(),
            reassembler: Reassembler::new(),
            roster: RosterEngine::new(),
            ack_window: AckWindow::default(),
            event_queue: VecDeque::new(),
            login_deadline: None,
            last_recv_at: now,
            keepalive_basis: now,
            next_roster_poll_at: None,
            reconnect_at: None,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            login_deadline_interval: LOGIN_DEADLINE,
            reconnect_delay: RECONNECT_DELAY,
        })
    }

    /// Overrides protocol timers. Not part of the stable API; exists so
    /// tests can compress time.
    #[doc(hidden)]
    pub fn override_timing(
        &mut self,
        heartbeat_interval: Duration,
        login_deadline: Duration,
        reconnect_delay: Duration,
    ) {
        self.heartbeat_interval = heartbeat_interval;
        self.login_deadline_interval = login_deadline;
        self.reconnect_delay = reconnect_delay;
    }

    /// Overrides the command resend policy. Not part of the stable API;
    /// exists so tests can compress time.
    #[doc(hidden)]
    pub fn override_resend_policy(
        &mut self,
        resend_interval: Duration,
        part_quiet_interval: Duration,
        max_attempts: u32,
    ) {
        self.scheduler =
            CommandScheduler::with_policy(resend_interval, part_quiet_interval, max_attempts);
    }

    /// The session's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// An immutable snapshot of the authoritative roster.
    #[must_use]
    pub fn players(&self) -> Vec<Player> {
        self.roster.players()
    }

    /// Whether the first complete roster dump has been processed.
    #[must_use]
    pub fn roster_ready(&self) -> bool {
        self.roster.roster_ready()
    }

    /// Drains the buffered events.
    pub fn events(&mut self) -> EventDrain<'_> {
        EventDrain::from_drain(self.event_queue.drain(..))
    }

    /// Opens the association and starts the login handshake.
    ///
    /// Returns `true` if the session left `Closed`; `false` when a session
    /// is already underway.
    pub fn connect(&mut self) -> bool {
        if self.state != SessionState::Closed {
            return false;
        }
        self.reconnect_at = None;
        self.state = SessionState::Connecting;
        debug!(host = %self.config.host, port = self.config.port, "connecting");

        if let Err(err) = self.socket.open() {
            self.fail(RconError::Transport {
                context: err.to_string(),
            });
            return true;
        }

        let login = codec::encode_login(self.config.password.as_bytes());
        if !self.send_frame(&login) {
            return true;
        }

        let now = Instant::now();
        self.state = SessionState::Authenticating;
        self.login_deadline = Some(now + self.login_deadline_interval);
        self.last_recv_at = now;
        true
    }

    /// Closes the session.
    ///
    /// `abort_reconnect` defaults to the inverse of the configured
    /// auto-reconnect, so a plain `close(None, None)` on an auto-reconnect
    /// session schedules a reconnect. Returns `true` if an open session
    /// was closed. Idempotent: closing a closed session only cancels any
    /// pending reconnect (when `abort_reconnect` is `Some(true)`).
    pub fn close(&mut self, reason: Option<&str>, abort_reconnect: Option<bool>) -> bool {
        if self.state == SessionState::Closed {
            if abort_reconnect == Some(true) {
                self.reconnect_at = None;
            }
            return false;
        }
        let aborted = abort_reconnect.unwrap_or(!self.config.auto_reconnect);
        self.finish_close(reason.unwrap_or("Closed").to_string(), aborted);
        true
    }

    /// Enqueues a command for transmission.
    ///
    /// Commands go out one at a time, in order, each under a fresh
    /// sequence; the response arrives later as
    /// [`RconEvent::CommandResponse`].
    pub fn send_command(&mut self, command: &str) {
        trace!(command, "user command enqueued");
        self.keepalive_basis = Instant::now();
        self.scheduler.enqueue_user(command.as_bytes().to_vec());
    }

    /// Drives the session: drains the socket, routes frames, runs timers
    /// and transmits whatever the scheduler releases.
    pub fn poll(&mut self) {
        let now = Instant::now();
        match self.state {
            SessionState::Closed => {
                if self.reconnect_at.is_some_and(|at| now >= at) {
                    debug!("reconnect delay elapsed");
                    self.reconnect_at = None;
                    self.connect();
                }
                return;
            },
            // Closing never persists across calls; guard regardless.
            SessionState::Closing => return,
            _ => {},
        }

        match self.socket.receive_all() {
            Ok(datagrams) => {
                for datagram in datagrams {
                    self.handle_datagram(&datagram, now);
                    if self.state == SessionState::Closed {
                        return;
                    }
                }
            },
            Err(err) => {
                self.fail(RconError::Transport {
                    context: err.to_string(),
                });
                return;
            },
        }

        self.run_timers(now);
    }

    // =========================================================================
    // Inbound routing
    // =========================================================================

    fn handle_datagram(&mut self, bytes: &[u8], now: Instant) {
        let frame = match codec::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                trace!(len = bytes.len(), error = %err, "datagram dropped");
                self.event_queue.push_back(RconEvent::Error {
                    error: RconError::Decode(err),
                });
                return;
            },
        };
        self.last_recv_at = now;

        match frame {
            RconFrame::Login { payload } => self.on_login_reply(payload.first().copied()),
            RconFrame::CommandWhole { sequence, data } => {
                if self.scheduler.in_flight_sequence() == Some(sequence) {
                    if let Some(flight) = self.scheduler.retire(sequence) {
                        self.dispatch_response(flight, data);
                    }
                } else {
                    // Replies to stale sequences; nothing awaits them.
                    trace!(sequence, "response without a matching command ignored");
                }
            },
            RconFrame::CommandPart {
                sequence,
                total,
                index,
                data,
            } => {
                self.scheduler.note_part(sequence, now);
                if let Some(payload) = self.reassembler.insert(sequence, total, index, data, now)
                {
                    if let Some(flight) = self.scheduler.retire(sequence) {
                        self.dispatch_response(flight, payload);
                    }
                }
            },
            RconFrame::ServerMessage { sequence, data } => self.on_server_message(sequence, data),
        }
    }

    fn on_login_reply(&mut self, status: Option<u8>) {
        if self.state != SessionState::Authenticating {
            trace!(state = %self.state, "login frame outside authentication ignored");
            return;
        }
        match status {
            Some(0x01) => {
                let now = Instant::now();
                debug!("login accepted");
                self.state = SessionState::Connected;
                self.login_deadline = None;
                self.keepalive_basis = now;
                self.event_queue.push_back(RconEvent::Connected);
                // Seed the roster immediately; the scheduler sends it on
                // this same poll pass.
                self.scheduler.enqueue_roster_poll();
                self.next_roster_poll_at =
                    Some(now + self.config.clamped_player_update_interval());
            },
            Some(0x00) => self.fail(RconError::InvalidPassword),
            _ => report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Framing,
                "login reply with a malformed status byte"
            ),
        }
    }

    fn on_server_message(&mut self, sequence: u8, data: Vec<u8>) {
        // Every server-message frame is acknowledged, duplicates included;
        // the server retransmits until it sees the ack.
        if !self.send_frame(&codec::encode_ack(sequence)) {
            return;
        }
        if !self.ack_window.observe(sequence) {
            trace!(sequence, "duplicate server message acked and dropped");
            return;
        }
        if self.state != SessionState::Connected || !self.roster.roster_ready() {
            trace!(sequence, "server message withheld until the roster is seeded");
            return;
        }
        if data.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&data).into_owned();
        let events = self.roster.handle_server_message(&text, SystemTime::now());
        self.event_queue.extend(events);
    }

    fn dispatch_response(&mut self, flight: CommandInFlight, data: Vec<u8>) {
        self.reassembler.clear(flight.sequence);
        let response = String::from_utf8_lossy(&data).into_owned();
        match flight.kind {
            CommandKind::Heartbeat => trace!("keep-alive answered"),
            CommandKind::RosterPoll => {
                if parser::is_player_list(&response) {
                    let events = self.roster.apply_player_list(&response, SystemTime::now());
                    self.event_queue.extend(events);
                } else {
                    report_violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::RosterConsistency,
                        "roster poll answered with a non-roster payload"
                    );
                }
            },
            CommandKind::User => {
                // A manually issued `players` keeps the roster fresh too.
                if parser::is_player_list(&response) {
                    let events = self.roster.apply_player_list(&response, SystemTime::now());
                    self.event_queue.extend(events);
                }
                let command = String::from_utf8_lossy(&flight.payload).into_owned();
                self.event_queue
                    .push_back(RconEvent::CommandResponse { command, response });
            },
        }
    }

    // =========================================================================
    // Timers and outbound
    // =========================================================================

    fn run_timers(&mut self, now: Instant) {
        if self.state == SessionState::Authenticating {
            if self.login_deadline.is_some_and(|at| now >= at) {
                self.fail(RconError::LoginTimeout);
            }
            return;
        }
        if self.state != SessionState::Connected {
            return;
        }

        if now.duration_since(self.last_recv_at) >= self.config.idle_limit {
            self.fail(RconError::IdleTimeout);
            return;
        }

        if let Some(at) = self.next_roster_poll_at {
            if now >= at {
                self.scheduler.enqueue_roster_poll();
                self.next_roster_poll_at =
                    Some(now + self.config.clamped_player_update_interval());
            }
        }

        // Keep-alives track user-command idleness; the periodic roster
        // poll neither feeds nor starves them.
        if now.duration_since(self.keepalive_basis) >= self.heartbeat_interval {
            self.scheduler.enqueue_heartbeat();
            self.keepalive_basis = now;
        }

        match self.scheduler.tick(now) {
            Some(SchedulerAction::Transmit {
                sequence,
                frame,
                fresh,
            }) => {
                if fresh {
                    // The sequence may be reclaiming a slot whose previous
                    // occupant left a stale partial response behind.
                    self.reassembler.clear(sequence);
                }
                if !self.send_frame(&frame) {
                    return;
                }
            },
            Some(SchedulerAction::GiveUp { payload, .. }) => {
                let command = String::from_utf8_lossy(&payload).into_owned();
                self.fail(RconError::CommandTimeout { command });
                return;
            },
            None => {},
        }

        self.reassembler.collect_garbage(now);
    }

    fn send_frame(&mut self, frame: &[u8]) -> bool {
        match self.socket.send(frame) {
            Ok(()) => true,
            Err(err) => {
                self.fail(RconError::Transport {
                    context: err.to_string(),
                });
                false
            },
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    fn fail(&mut self, error: RconError) {
        let aborted =
            matches!(error, RconError::InvalidPassword) || !self.config.auto_reconnect;
        let reason = close_reason(&error);
        warn!(error = %error, "session failing");
        self.event_queue.push_back(RconEvent::Error { error });
        self.finish_close(reason, aborted);
    }

    fn finish_close(&mut self, reason: String, aborted: bool) {
        if matches!(self.state, SessionState::Closed | SessionState::Closing) {
            return;
        }
        self.state = SessionState::Closing;
        debug!(reason = %reason, aborted, "session closing");

        self.socket.close();
        self.scheduler.reset();
        self.reassembler.reset();
        self.roster.reset();
        self.ack_window.reset();
        self.login_deadline = None;
        self.next_roster_poll_at = None;

        self.event_queue
            .push_back(RconEvent::Disconnected { reason, aborted });
        self.state = SessionState::Closed;
        self.reconnect_at = (!aborted).then(|| Instant::now() + self.reconnect_delay);
    }
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .field("roster_ready", &self.roster.roster_ready())
            .field("pending_events", &self.event_queue.len())
            .finish_non_exhaustive()
    }
}

fn close_reason(error: &RconError) -> String {
    match error {
        RconError::InvalidPassword => "Invalid password".to_string(),
        RconError::LoginTimeout => "Login timed out".to_string(),
        RconError::IdleTimeout => "Connection timed out".to_string(),
        RconError::CommandTimeout { .. } => "Command timed out".to_string(),
        RconError::Transport { context } => format!("Transport failure: {context}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ack_window_dedups_within_capacity() {
        let mut window = AckWindow::default();
        assert!(window.observe(7));
        assert!(!window.observe(7));
        assert!(window.observe(8));
        assert!(!window.observe(8));
        assert!(!window.observe(7));
    }

    #[test]
    fn ack_window_evicts_oldest() {
        let mut window = AckWindow::default();
        // Fill the window, wrapping the sequence space once.
        for seq in 0..=255u8 {
            assert!(window.observe(seq));
        }
        // All 256 values are now in the window.
        assert!(!window.observe(0));
        // The failed observe did not evict; 1 is also still present.
        assert!(!window.observe(1));
    }

    #[test]
    fn ack_window_reset() {
        let mut window = AckWindow::default();
        assert!(window.observe(3));
        window.reset();
        assert!(window.observe(3));
    }

    #[test]
    fn close_reason_strings() {
        assert_eq!(close_reason(&RconError::InvalidPassword), "Invalid password");
        assert_eq!(close_reason(&RconError::LoginTimeout), "Login timed out");
        assert_eq!(close_reason(&RconError::IdleTimeout), "Connection timed out");
        assert_eq!(
            close_reason(&RconError::CommandTimeout {
                command: "players".to_string()
            }),
            "Command timed out"
        );
        assert!(close_reason(&RconError::Transport {
            context: "refused".to_string()
        })
        .contains("refused"));
    }
}
