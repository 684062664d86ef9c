//! The player roster: authoritative state derived from two independent
//! inputs.
//!
//! The server reports population two ways that race freely over UDP:
//! asynchronous notifications (connect, GUID verification, disconnect,
//! kick) and the periodic tabular reply to `players`. The engine owns two
//! id-keyed tables (verified [`Player`]s and transient connecting
//! players) and folds both inputs into them, emitting join/leave/update
//! events. The tables are disjoint on id at every transition point.
//!
//! Until the first complete roster dump has been applied (`roster_ready`)
//! the engine is considered unseeded: the session withholds inline
//! notifications entirely and the dump itself creates the initial
//! population. After that, joins arrive only through the inline
//! verification cycle.

pub(crate) mod parser;

use std::collections::BTreeMap;
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::error::{ParseRule, RconError};
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::RconEvent;
use parser::{PlayerRow, ServerMessage};

/// An authoritative roster entry.
///
/// Snapshots handed to subscribers are clones; mutating them has no effect
/// on the session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Player {
    /// The server-assigned player id; the roster identity key.
    pub id: u32,
    /// The player's display name.
    pub name: String,
    /// The remote address, when any source has reported it.
    pub ip: Option<String>,
    /// The 32-hex BattlEye GUID, once calculated.
    pub guid: Option<String>,
    /// Last reported ping in milliseconds; `-1` until a dump reports one.
    pub ping: i32,
    /// Whether the player is still in the lobby.
    pub lobby: bool,
    /// Whether the GUID has been verified. Transitions at most once, from
    /// `false` to `true`.
    pub verified: bool,
    /// When this entry was created.
    pub connected_at: SystemTime,
}

/// Which [`Player`] fields a roster dump changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct PlayerChanges {
    /// The ping value changed.
    pub ping: bool,
    /// The player became verified.
    pub verified: bool,
    /// The lobby flag flipped.
    pub lobby: bool,
    /// A previously unknown address was filled in.
    pub ip: bool,
}

impl PlayerChanges {
    /// Whether any field changed.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.ping || self.verified || self.lobby || self.ip
    }
}

/// A BattlEye filter log line (`RemoteExec Log`, `Script Log`, ...).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BeLogRecord {
    /// The log type, e.g. `RemoteExec` or `Script`.
    pub kind: String,
    /// The id of the player that triggered the filter.
    pub player_id: u32,
    /// The player's GUID as reported in the log line.
    pub guid: String,
    /// The filter line number that matched.
    pub filter: u32,
    /// The logged content; may span multiple lines.
    pub body: String,
    /// The roster entry for `player_id`, when one exists.
    pub player: Option<Player>,
}

/// A player between the connect notification and GUID verification.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectingPlayer {
    id: u32,
    name: String,
    ip: String,
    guid: Option<String>,
}

/// Owns the roster tables and folds both input streams into them.
#[derive(Debug, Default)]
pub(crate) struct RosterEngine {
    players: BTreeMap<u32, Player>,
    connecting: BTreeMap<u32, ConnectingPlayer>,
    roster_ready: bool,
}

impl RosterEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether the first complete roster dump has been applied.
    pub(crate) fn roster_ready(&self) -> bool {
        self.roster_ready
    }

    /// An immutable snapshot of the authoritative roster.
    pub(crate) fn players(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    /// Discards all state. Called when the session closes.
    pub(crate) fn reset(&mut self) {
        self.players.clear();
        self.connecting.clear();
        self.roster_ready = false;
    }

    /// Folds one asynchronous server notification into the tables.
    pub(crate) fn handle_server_message(
        &mut self,
        raw: &str,
        now: SystemTime,
    ) -> Vec<RconEvent> {
        let message = match parser::parse_server_message(raw) {
            Ok(Some(message)) => message,
            Ok(None) => {
                return vec![RconEvent::Error {
                    error: RconError::UnknownServerMessage {
                        raw: raw.to_string(),
                    },
                }];
            },
            Err(rule) => {
                return vec![RconEvent::Error {
                    error: RconError::Parse {
                        rule,
                        raw: raw.to_string(),
                    },
                }];
            },
        };

        match message {
            ServerMessage::Connecting { id, name, ip } => self.on_connecting(id, name, ip),
            ServerMessage::GuidCalculated { id, guid } => self.on_guid_calculated(id, guid),
            ServerMessage::GuidVerified { id, name, guid } => {
                self.on_guid_verified(id, name, guid, now)
            },
            ServerMessage::Disconnected { id } => self.on_leave(id, "disconnected".to_string()),
            ServerMessage::Kicked { id, reason } => self.on_leave(id, reason),
            ServerMessage::BeLog {
                kind,
                id,
                name: _,
                guid,
                filter,
                body,
            } => vec![RconEvent::BeLog {
                record: BeLogRecord {
                    kind,
                    player_id: id,
                    guid,
                    filter,
                    body,
                    player: self.players.get(&id).cloned(),
                },
            }],
            ServerMessage::Chat { channel, rest } => self.on_chat(channel, rest, raw),
            ServerMessage::Admin {
                admin_id,
                channel,
                text,
            } => vec![RconEvent::AdminMessage {
                admin_id,
                channel,
                text,
            }],
            ServerMessage::Advisory => vec![RconEvent::Error {
                error: RconError::ServerAdvisory {
                    raw: raw.to_string(),
                },
            }],
        }
    }

    fn on_connecting(&mut self, id: u32, name: String, ip: String) -> Vec<RconEvent> {
        if self.players.contains_key(&id) {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::RosterConsistency,
                "connect notification for id {} which is already on the roster",
                id
            );
            return Vec::new();
        }
        trace!(id, name = %name, "player connecting");
        self.connecting.insert(
            id,
            ConnectingPlayer {
                id,
                name,
                ip,
                guid: None,
            },
        );
        Vec::new()
    }

    fn on_guid_calculated(&mut self, id: u32, guid: String) -> Vec<RconEvent> {
        if let Some(pending) = self.connecting.get_mut(&id) {
            pending.guid = Some(guid);
        } else {
            match self.players.get(&id) {
                // A late duplicate of an already completed verification.
                Some(player)
                    if player.verified && player.guid.as_deref() == Some(guid.as_str()) => {},
                _ => trace!(id, "GUID notification for unknown player ignored"),
            }
        }
        Vec::new()
    }

    fn on_guid_verified(
        &mut self,
        id: u32,
        name: String,
        guid: String,
        now: SystemTime,
    ) -> Vec<RconEvent> {
        if let Some(player) = self.players.get_mut(&id) {
            if player.verified {
                // Verification transitions at most once; a repeat usually
                // means the roster dump won the race. A repeat carrying a
                // DIFFERENT identity is a protocol anomaly and must not
                // rewrite the entry.
                if player.guid.as_deref() != Some(guid.as_str()) {
                    report_violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::RosterConsistency,
                        "repeat verification for id {} carries a different GUID",
                        id
                    );
                }
                self.connecting.remove(&id);
                return Vec::new();
            }
            // An unverified entry (seeded by a dump) completes here.
            player.guid = Some(guid);
            player.verified = true;
            player.lobby = true;
            player.connected_at = now;
            let player = player.clone();
            self.connecting.remove(&id);
            debug!(id, name = %player.name, "player verified");
            return vec![RconEvent::PlayerJoin { player }];
        }

        let player = match self.connecting.remove(&id) {
            Some(pending) => {
                if pending.guid.as_deref().is_some_and(|g| g != guid) {
                    report_violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::RosterConsistency,
                        "verified GUID for id {} differs from the calculated GUID",
                        pending.id
                    );
                }
                Player {
                    id,
                    name: pending.name,
                    ip: Some(pending.ip),
                    guid: Some(guid),
                    ping: -1,
                    lobby: true,
                    verified: true,
                    connected_at: now,
                }
            },
            // The connect notification was missed; the verification
            // message itself carries enough to build the entry.
            None => Player {
                id,
                name,
                ip: None,
                guid: Some(guid),
                ping: -1,
                lobby: true,
                verified: true,
                connected_at: now,
            },
        };
        debug!(id, name = %player.name, "player joined");
        self.players.insert(id, player.clone());
        vec![RconEvent::PlayerJoin { player }]
    }

    fn on_leave(&mut self, id: u32, reason: String) -> Vec<RconEvent> {
        if let Some(player) = self.players.remove(&id) {
            debug!(id, name = %player.name, reason = %reason, "player left");
            return vec![RconEvent::PlayerLeave { player, reason }];
        }
        // A player that never finished verifying vanishes silently.
        self.connecting.remove(&id);
        Vec::new()
    }

    fn on_chat(&mut self, channel: String, rest: String, raw: &str) -> Vec<RconEvent> {
        // The text still starts with the speaker's name; resolve it by the
        // longest matching roster name, since names may contain anything.
        let speaker = self
            .players
            .values()
            .filter(|p| rest.starts_with(&p.name))
            .max_by_key(|p| p.name.len())
            .cloned();
        let Some(player) = speaker else {
            return vec![RconEvent::Error {
                error: RconError::Parse {
                    rule: ParseRule::PlayerMessage,
                    raw: raw.to_string(),
                },
            }];
        };
        // Skip the "<name>: " prefix.
        let Some(text) = rest.get(player.name.len() + 2..) else {
            return vec![RconEvent::Error {
                error: RconError::Parse {
                    rule: ParseRule::PlayerMessage,
                    raw: raw.to_string(),
                },
            }];
        };
        vec![RconEvent::PlayerMessage {
            player,
            channel,
            text: text.to_string(),
        }]
    }

    /// Applies a complete roster dump and latches `roster_ready`.
    pub(crate) fn apply_player_list(&mut self, payload: &str, now: SystemTime) -> Vec<RconEvent> {
        let rows = match parser::parse_player_list(payload) {
            Ok(rows) => rows,
            Err(rule) => {
                return vec![RconEvent::Error {
                    error: RconError::Parse {
                        rule,
                        raw: payload.to_string(),
                    },
                }];
            },
        };

        let mut events = Vec::new();
        for row in rows {
            match row {
                Ok(row) => self.apply_row(row, now, &mut events),
                Err(rule) => events.push(RconEvent::Error {
                    error: RconError::Parse {
                        rule,
                        raw: payload.to_string(),
                    },
                }),
            }
        }

        self.roster_ready = true;
        events.push(RconEvent::Players {
            players: self.players(),
        });
        events
    }

    fn apply_row(&mut self, row: PlayerRow, now: SystemTime, events: &mut Vec<RconEvent>) {
        if let Some(player) = self.players.get_mut(&row.id) {
            let mut changes = PlayerChanges::default();
            if player.ping != row.ping {
                player.ping = row.ping;
                changes.ping = true;
            }
            // Verification only ever completes; a dump cannot revoke it.
            if row.verified && !player.verified {
                player.verified = true;
                changes.verified = true;
            }
            if player.lobby != row.lobby {
                player.lobby = row.lobby;
                changes.lobby = true;
            }
            if player.ip.is_none() {
                player.ip = Some(row.ip);
                changes.ip = true;
            }
            if player.guid.is_none() {
                player.guid = row.guid;
            }
            if changes.any() {
                events.push(RconEvent::PlayerUpdated {
                    player: player.clone(),
                    changes,
                });
            }
            return;
        }

        let Some(guid) = row.guid else {
            // GUID not computed yet: mirror the row into the pending table
            // so the inline verification can complete it.
            self.connecting.entry(row.id).or_insert(ConnectingPlayer {
                id: row.id,
                name: row.name,
                ip: row.ip,
                guid: None,
            });
            return;
        };

        if self.roster_ready {
            // A join notification was evidently missed. Creating the entry
            // here would race the inline cycle, so wait for it instead.
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::RosterConsistency,
                "dump reports unknown player id {} after roster is ready",
                row.id
            );
            return;
        }

        // Initial population: the first dump creates entries directly.
        self.connecting.remove(&row.id);
        let player = Player {
            id: row.id,
            name: row.name,
            ip: Some(row.ip),
            guid: Some(guid),
            ping: row.ping,
            lobby: row.lobby,
            verified: row.verified,
            connected_at: now,
        };
        self.players.insert(row.id, player.clone());
        events.push(RconEvent::PlayerJoin { player });
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

    const GUID: &str = "0123456789abcdef0123456789abcdef";
    const GUID2: &str = "fedcba9876543210fedcba9876543210";

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH
    }

    fn dump(rows: &[&str]) -> String {
        let mut text = String::from(
            "Players on server:\n\
             [#] [IP Address]:[Port] [Ping] [GUID] [Name]\n\
             --------------------------------------------------\n\
             \n",
        );
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text.push_str(&format!("({} players in total)", rows.len()));
        text
    }

    fn seeded_engine() -> RosterEngine {
        let mut engine = RosterEngine::new();
        let events = engine.apply_player_list(&dump(&[]), now());
        assert!(matches!(events.last(), Some(RconEvent::Players { .. })));
        engine
    }

    fn join_inline(engine: &mut RosterEngine, id: u32, name: &str, ip: &str, guid: &str) {
        engine.handle_server_message(
            &format!("Player #{id} {name} ({ip}:2304) connected"),
            now(),
        );
        engine.handle_server_message(&format!("Player #{id} {name} BE GUID: {guid}"), now());
        let events = engine.handle_server_message(
            &format!("Verified GUID ({guid}) of player #{id} {name}"),
            now(),
        );
        assert!(matches!(events.as_slice(), [RconEvent::PlayerJoin { .. }]));
    }

    #[test]
    fn inline_join_path_emits_one_join() {
        let mut engine = seeded_engine();
        engine.handle_server_message("Player #3 Alice (10.0.0.5:27016) connected", now());
        engine.handle_server_message(&format!("Player #3 Alice BE GUID: {GUID}"), now());
        let events = engine.handle_server_message(
            &format!("Verified GUID ({GUID}) of player #3 Alice"),
            now(),
        );

        match events.as_slice() {
            [RconEvent::PlayerJoin { player }] => {
                assert_eq!(player.id, 3);
                assert_eq!(player.name, "Alice");
                assert_eq!(player.ip.as_deref(), Some("10.0.0.5"));
                assert_eq!(player.guid.as_deref(), Some(GUID));
                assert!(player.verified);
                assert!(player.lobby);
            },
            other => panic!("expected a single join, got {other:?}"),
        }
        assert_eq!(engine.players().len(), 1);
    }

    #[test]
    fn disconnect_emits_leave_with_reason() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 3, "Alice", "10.0.0.5", GUID);

        let events = engine.handle_server_message("Player #3 Alice disconnected", now());
        match events.as_slice() {
            [RconEvent::PlayerLeave { player, reason }] => {
                assert_eq!(player.id, 3);
                assert_eq!(reason, "disconnected");
            },
            other => panic!("expected a single leave, got {other:?}"),
        }
        assert!(engine.players().is_empty());
    }

    #[test]
    fn kick_carries_the_kick_reason() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 7, "Mallory", "10.0.0.9", GUID);

        let events = engine.handle_server_message(
            &format!("Player #7 Mallory ({GUID}) has been kicked by BattlEye: Global Ban #ab12"),
            now(),
        );
        match events.as_slice() {
            [RconEvent::PlayerLeave { reason, .. }] => {
                assert_eq!(reason, "Global Ban #ab12");
            },
            other => panic!("expected a single leave, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_of_connecting_player_is_silent() {
        let mut engine = seeded_engine();
        engine.handle_server_message("Player #5 Ghost (10.0.0.2:2304) connected", now());
        let events = engine.handle_server_message("Player #5 Ghost disconnected", now());
        assert!(events.is_empty());
        assert!(engine.connecting.is_empty());
    }

    #[test]
    fn first_dump_seeds_roster_and_latches_ready() {
        let mut engine = RosterEngine::new();
        assert!(!engine.roster_ready());

        let line = format!("4   10.0.0.7:2304     20   {GUID}(OK) Dana (Lobby)");
        let events = engine.apply_player_list(&dump(&[&line]), now());

        assert!(engine.roster_ready());
        match events.as_slice() {
            [RconEvent::PlayerJoin { player }, RconEvent::Players { players }] => {
                assert_eq!(player.id, 4);
                assert!(player.lobby);
                assert!(player.verified);
                assert_eq!(players.len(), 1);
            },
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn dump_updates_emit_change_sets() {
        let mut engine = RosterEngine::new();
        let line = format!("4   10.0.0.7:2304     20   {GUID}(OK) Dana (Lobby)");
        engine.apply_player_list(&dump(&[&line]), now());

        // Same id, new ping, lobby flag dropped, still verified.
        let line = format!("4   10.0.0.7:2304     55   {GUID}(?) Dana");
        let events = engine.apply_player_list(&dump(&[&line]), now());

        match events.as_slice() {
            [RconEvent::PlayerUpdated { player, changes }, RconEvent::Players { .. }] => {
                assert_eq!(player.ping, 55);
                assert!(!player.lobby);
                assert!(player.verified, "verification is never revoked");
                assert_eq!(
                    *changes,
                    PlayerChanges {
                        ping: true,
                        verified: false,
                        lobby: true,
                        ip: false,
                    }
                );
            },
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn unchanged_dump_row_emits_nothing() {
        let mut engine = RosterEngine::new();
        let line = format!("4   10.0.0.7:2304     20   {GUID}(OK) Dana");
        engine.apply_player_list(&dump(&[&line]), now());
        let events = engine.apply_player_list(&dump(&[&line]), now());
        assert!(matches!(events.as_slice(), [RconEvent::Players { .. }]));
    }

    #[test]
    fn dump_backfills_missing_ip() {
        let mut engine = seeded_engine();
        // Verification without a preceding connect: no address known.
        let events = engine.handle_server_message(
            &format!("Verified GUID ({GUID}) of player #9 Nomad"),
            now(),
        );
        assert!(matches!(events.as_slice(), [RconEvent::PlayerJoin { .. }]));

        let line = format!("9   172.16.3.3:2316   44   {GUID}(OK) Nomad (Lobby)");
        let events = engine.apply_player_list(&dump(&[&line]), now());
        match events.as_slice() {
            [RconEvent::PlayerUpdated { player, changes }, RconEvent::Players { .. }] => {
                assert_eq!(player.ip.as_deref(), Some("172.16.3.3"));
                assert!(changes.ip);
            },
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn dump_row_without_guid_creates_pending_entry() {
        let mut engine = seeded_engine();
        let line = "6   10.0.0.3:2304     12   -  Newcomer";
        let events = engine.apply_player_list(&dump(&[line]), now());
        assert!(matches!(events.as_slice(), [RconEvent::Players { .. }]));
        assert_eq!(engine.connecting.len(), 1);

        // The inline cycle completes the join with the pending data.
        let events = engine.handle_server_message(
            &format!("Verified GUID ({GUID}) of player #6 Newcomer"),
            now(),
        );
        match events.as_slice() {
            [RconEvent::PlayerJoin { player }] => {
                assert_eq!(player.ip.as_deref(), Some("10.0.0.3"));
            },
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(engine.connecting.is_empty());
    }

    #[test]
    fn unknown_verified_row_after_ready_is_not_synthesized() {
        let mut engine = seeded_engine();
        let line = format!("8   10.0.0.8:2304     30   {GUID}(OK) Latecomer");
        let events = engine.apply_player_list(&dump(&[&line]), now());
        assert!(matches!(events.as_slice(), [RconEvent::Players { players }] if players.is_empty()));
        assert!(engine.players().is_empty());
    }

    #[test]
    fn duplicate_verification_does_not_rejoin() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 3, "Alice", "10.0.0.5", GUID);

        let events = engine.handle_server_message(
            &format!("Verified GUID ({GUID}) of player #3 Alice"),
            now(),
        );
        assert!(events.is_empty(), "verified player must not re-join");
    }

    #[test]
    fn conflicting_verification_does_not_rewrite_identity() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 3, "Alice", "10.0.0.5", GUID);

        // A repeat verification with a different GUID must not transition
        // the entry a second time.
        let events = engine.handle_server_message(
            &format!("Verified GUID ({GUID2}) of player #3 Alice"),
            now(),
        );
        assert!(events.is_empty(), "no second join for a verified player");

        let players = engine.players();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].guid.as_deref(), Some(GUID));
        assert!(players[0].verified);
    }

    #[test]
    fn stale_guid_notification_for_verified_player_is_ignored() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 3, "Alice", "10.0.0.5", GUID);
        let events =
            engine.handle_server_message(&format!("Player #3 Alice BE GUID: {GUID}"), now());
        assert!(events.is_empty());
        assert!(engine.connecting.is_empty(), "tables stay disjoint");
    }

    #[test]
    fn chat_resolves_longest_name_prefix() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 1, "Ann", "10.0.0.1", GUID);
        join_inline(&mut engine, 2, "Ann Marie", "10.0.0.2", GUID2);

        let events = engine.handle_server_message("(Side) Ann Marie: flanking left", now());
        match events.as_slice() {
            [RconEvent::PlayerMessage {
                player,
                channel,
                text,
            }] => {
                assert_eq!(player.id, 2);
                assert_eq!(channel, "Side");
                assert_eq!(text, "flanking left");
            },
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn chat_from_unknown_speaker_is_a_parse_error() {
        let mut engine = seeded_engine();
        let events = engine.handle_server_message("(Side) Stranger: hello", now());
        match events.as_slice() {
            [RconEvent::Error {
                error: RconError::Parse { rule, .. },
            }] => assert_eq!(*rule, ParseRule::PlayerMessage),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn be_log_resolves_player() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 5, "Alice", "10.0.0.5", GUID);

        let events = engine.handle_server_message(
            &format!("RemoteExec Log: #5 Alice ({GUID}) - #47 fn_x [1]"),
            now(),
        );
        match events.as_slice() {
            [RconEvent::BeLog { record }] => {
                assert_eq!(record.kind, "RemoteExec");
                assert_eq!(record.filter, 47);
                assert_eq!(record.player.as_ref().map(|p| p.id), Some(5));
            },
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn unknown_message_surfaces_diagnostic() {
        let mut engine = seeded_engine();
        let events = engine.handle_server_message("Something new happened", now());
        assert!(matches!(
            events.as_slice(),
            [RconEvent::Error {
                error: RconError::UnknownServerMessage { .. }
            }]
        ));
    }

    #[test]
    fn advisory_surfaces_as_non_fatal_error() {
        let mut engine = seeded_engine();
        let events = engine.handle_server_message("Connected to BE Master", now());
        assert!(matches!(
            events.as_slice(),
            [RconEvent::Error {
                error: RconError::ServerAdvisory { .. }
            }]
        ));
    }

    #[test]
    fn reset_clears_everything() {
        let mut engine = seeded_engine();
        join_inline(&mut engine, 3, "Alice", "10.0.0.5", GUID);
        engine.reset();
        assert!(engine.players().is_empty());
        assert!(!engine.roster_ready());
    }

    #[test]
    fn tables_stay_disjoint_through_promotion() {
        let mut engine = seeded_engine();
        engine.handle_server_message("Player #3 Alice (10.0.0.5:27016) connected", now());
        assert!(engine.connecting.contains_key(&3));
        assert!(!engine.players.contains_key(&3));

        engine.handle_server_message(
            &format!("Verified GUID ({GUID}) of player #3 Alice"),
            now(),
        );
        assert!(!engine.connecting.contains_key(&3));
        assert!(engine.players.contains_key(&3));
    }
}
