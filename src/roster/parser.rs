//! Parsers for the two textual inputs of the roster engine: asynchronous
//! server notifications and the tabular `players` reply.
//!
//! The notification grammar is a fixed set of anchored patterns. Player
//! names may contain spaces, parentheses and digits, so captures that sit
//! before a trailing literal (`(ip:port) connected`, `(guid) - #filter`)
//! are resolved from the right, which reproduces what a greedy anchored
//! regex would capture. All parsing is pure; the engine decides what the
//! captures mean.

use crate::error::ParseRule;

/// First line of every roster dump.
pub(crate) const PLAYER_LIST_HEADER: &str = "Players on server:";

/// Header lines between [`PLAYER_LIST_HEADER`] and the first row.
const PLAYER_LIST_HEADER_LINES: usize = 3;

/// A structurally recognized server notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ServerMessage {
    /// `Player #N <name> (<ip>:<port>) connected`
    Connecting { id: u32, name: String, ip: String },
    /// `Player #N <name> BE GUID: <hex32>`
    GuidCalculated { id: u32, guid: String },
    /// `Verified GUID (<hex32>) of player #N <name>`
    GuidVerified {
        id: u32,
        name: String,
        guid: String,
    },
    /// `Player #N <name> disconnected`
    Disconnected { id: u32 },
    /// `Player #N <name> (<hex32>) has been kicked by BattlEye: <reason>`
    Kicked { id: u32, reason: String },
    /// `<Type> Log: #N <name> (<hex32>) - #F <body>`
    BeLog {
        kind: String,
        id: u32,
        name: String,
        guid: String,
        filter: u32,
        body: String,
    },
    /// `(<channel>) <text>`. The text still embeds the speaking player's
    /// name; resolution against the roster happens in the engine.
    Chat { channel: String, rest: String },
    /// `RCon admin #N: (<channel>) <text>`
    Admin {
        admin_id: u32,
        channel: String,
        text: String,
    },
    /// A known benign notice from the BE Master / ban services.
    Advisory,
}

/// Benign notices the server emits about its own backends.
const ADVISORY_PREFIXES: &[&str] = &[
    "Connected to BE Master",
    "Disconnected from BE Master",
    "Could not connect to BE Master",
    "Failed to resolve BE Master DNS name",
    "Ban check timed out",
    "Master query timed out",
    "Failed to check ban list",
];

/// Classifies a server-message payload.
///
/// Returns `Ok(Some(..))` for a recognized message, `Ok(None)` when no
/// rule matches (the caller surfaces `UnknownServerMessage`), and
/// `Err(rule)` when a rule's structure matched but a captured field did
/// not parse.
pub(crate) fn parse_server_message(raw: &str) -> Result<Option<ServerMessage>, ParseRule> {
    if let Some(rest) = raw.strip_prefix("RCon admin #") {
        return parse_admin(rest).map(Some);
    }
    if let Some(rest) = raw.strip_prefix("Verified GUID (") {
        return parse_guid_verified(rest).map(Some);
    }
    if let Some(rest) = raw.strip_prefix("Player #") {
        return parse_player_prefixed(raw, rest);
    }
    if let Some(msg) = parse_be_log(raw)? {
        return Ok(Some(msg));
    }
    if let Some(msg) = parse_chat(raw) {
        return Ok(Some(msg));
    }
    if ADVISORY_PREFIXES.iter().any(|p| raw.starts_with(p)) {
        return Ok(Some(ServerMessage::Advisory));
    }
    Ok(None)
}

/// Dispatches the four `Player #N ...` shapes, in specification order.
fn parse_player_prefixed(
    raw: &str,
    rest: &str,
) -> Result<Option<ServerMessage>, ParseRule> {
    let Some((id_digits, after_id)) = take_digits(rest) else {
        return Ok(None);
    };

    if raw.ends_with(") connected") {
        let id = id_digits.parse().map_err(|_| ParseRule::PlayerConnecting)?;
        return parse_connecting(id, after_id).map(Some);
    }
    if after_id.contains(" BE GUID: ") {
        let id = id_digits.parse().map_err(|_| ParseRule::GuidCalculated)?;
        return parse_guid_calculated(id, after_id).map(Some);
    }
    if raw.ends_with(" disconnected") {
        let id = id_digits.parse().map_err(|_| ParseRule::PlayerDisconnected)?;
        // The name between id and the trailing literal must be non-empty.
        let middle = after_id
            .strip_prefix(' ')
            .and_then(|s| s.strip_suffix(" disconnected"));
        return match middle {
            Some(name) if !name.is_empty() => Ok(Some(ServerMessage::Disconnected { id })),
            _ => Err(ParseRule::PlayerDisconnected),
        };
    }
    if after_id.contains(" has been kicked by BattlEye: ") {
        let id = id_digits.parse().map_err(|_| ParseRule::PlayerKicked)?;
        return parse_kicked(id, after_id).map(Some);
    }
    Ok(None)
}

fn parse_connecting(id: u32, after_id: &str) -> Result<ServerMessage, ParseRule> {
    const RULE: ParseRule = ParseRule::PlayerConnecting;
    let body = after_id
        .strip_prefix(' ')
        .and_then(|s| s.strip_suffix(" connected"))
        .and_then(|s| s.strip_suffix(')'))
        .ok_or(RULE)?;

    // The name is greedy, so the address is the rightmost " (ip:port"
    // candidate that validates.
    for (idx, _) in body.rmatch_indices(" (") {
        let name = &body[..idx];
        let addr = &body[idx + 2..];
        let Some((ip, port)) = addr.split_once(':') else {
            continue;
        };
        if !name.is_empty() && is_dotted_quad(ip) && is_digits(port) {
            return Ok(ServerMessage::Connecting {
                id,
                name: name.to_string(),
                ip: ip.to_string(),
            });
        }
    }
    Err(RULE)
}

fn parse_guid_calculated(id: u32, after_id: &str) -> Result<ServerMessage, ParseRule> {
    // Greedy name: take the rightmost marker whose tail is a full GUID.
    for (idx, _) in after_id.rmatch_indices(" BE GUID: ") {
        let name = &after_id[..idx];
        let guid = &after_id[idx + " BE GUID: ".len()..];
        if name.starts_with(' ') && name.len() > 1 && is_guid(guid) {
            return Ok(ServerMessage::GuidCalculated {
                id,
                guid: guid.to_string(),
            });
        }
    }
    Err(ParseRule::GuidCalculated)
}

fn parse_guid_verified(rest: &str) -> Result<ServerMessage, ParseRule> {
    const RULE: ParseRule = ParseRule::GuidVerified;
    let (guid, rest) = rest.split_once(") of player #").ok_or(RULE)?;
    if !is_guid(guid) {
        return Err(RULE);
    }
    let (id_digits, after_id) = take_digits(rest).ok_or(RULE)?;
    let id = id_digits.parse().map_err(|_| RULE)?;
    let name = after_id.strip_prefix(' ').ok_or(RULE)?;
    if name.is_empty() {
        return Err(RULE);
    }
    Ok(ServerMessage::GuidVerified {
        id,
        name: name.to_string(),
        guid: guid.to_string(),
    })
}

fn parse_kicked(id: u32, after_id: &str) -> Result<ServerMessage, ParseRule> {
    const RULE: ParseRule = ParseRule::PlayerKicked;
    const MARKER: &str = ") has been kicked by BattlEye: ";
    for (idx, _) in after_id.rmatch_indices(MARKER) {
        let before = &after_id[..idx];
        let reason = &after_id[idx + MARKER.len()..];
        // `before` must end with "(<guid32>" preceded by the player name.
        let Some(open) = before.rfind('(') else {
            continue;
        };
        let guid = &before[open + 1..];
        let name = before[..open].strip_prefix(' ').unwrap_or("");
        if is_guid(guid) && name.ends_with(' ') && !reason.is_empty() {
            return Ok(ServerMessage::Kicked {
                id,
                reason: reason.to_string(),
            });
        }
    }
    Err(RULE)
}

fn parse_be_log(raw: &str) -> Result<Option<ServerMessage>, ParseRule> {
    const MARKER: &str = " Log: #";
    let Some(log_idx) = raw.find(MARKER) else {
        return Ok(None);
    };
    let kind = &raw[..log_idx];
    if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') {
        return Ok(None);
    }

    const RULE: ParseRule = ParseRule::BeLog;
    let rest = &raw[log_idx + MARKER.len()..];
    let (id_digits, after_id) = take_digits(rest).ok_or(RULE)?;
    let id = id_digits.parse().map_err(|_| RULE)?;
    let after_id = after_id.strip_prefix(' ').ok_or(RULE)?;

    // The body is greedy (and may span lines), so scan for the rightmost
    // ") - #" whose left side ends in "(<guid32>" and whose right side is
    // "<filter> <body>".
    for (idx, _) in after_id.rmatch_indices(") - #") {
        let before = &after_id[..idx];
        let after = &after_id[idx + ") - #".len()..];
        let Some(open) = before.rfind(" (") else {
            continue;
        };
        let name = &before[..open];
        let guid = &before[open + 2..];
        let Some((filter_digits, body)) = take_digits(after) else {
            continue;
        };
        let Some(body) = body.strip_prefix(' ') else {
            continue;
        };
        if name.is_empty() || body.is_empty() || !is_guid(guid) {
            continue;
        }
        let filter = filter_digits.parse().map_err(|_| RULE)?;
        return Ok(Some(ServerMessage::BeLog {
            kind: kind.to_string(),
            id,
            name: name.to_string(),
            guid: guid.to_string(),
            filter,
            body: body.to_string(),
        }));
    }
    Err(RULE)
}

fn parse_chat(raw: &str) -> Option<ServerMessage> {
    let rest = raw.strip_prefix('(')?;
    let (channel, text) = rest.split_once(") ")?;
    if channel.is_empty() || !channel.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if text.is_empty() {
        return None;
    }
    Some(ServerMessage::Chat {
        channel: channel.to_string(),
        rest: text.to_string(),
    })
}

fn parse_admin(rest: &str) -> Result<ServerMessage, ParseRule> {
    const RULE: ParseRule = ParseRule::AdminMessage;
    let (id_digits, after_id) = take_digits(rest).ok_or(RULE)?;
    let admin_id = id_digits.parse().map_err(|_| RULE)?;
    let rest = after_id.strip_prefix(": (").ok_or(RULE)?;
    // The channel capture is lazy: the first ") " ends it.
    let (channel, text) = rest.split_once(") ").ok_or(RULE)?;
    if channel.is_empty() || text.is_empty() {
        return Err(RULE);
    }
    Ok(ServerMessage::Admin {
        admin_id,
        channel: channel.to_string(),
        text: text.to_string(),
    })
}

// =============================================================================
// Tabular roster dump
// =============================================================================

/// One parsed row of the `players` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlayerRow {
    pub id: u32,
    pub ip: String,
    pub ping: i32,
    /// `None` when the row shows `-` (GUID not yet computed).
    pub guid: Option<String>,
    pub verified: bool,
    pub name: String,
    pub lobby: bool,
}

/// Whether a command response payload is a roster dump.
pub(crate) fn is_player_list(payload: &str) -> bool {
    payload.starts_with(PLAYER_LIST_HEADER)
}

/// Parses a complete roster dump into rows.
///
/// Returns `Err` when the dump header is missing entirely. Individual
/// malformed rows are surfaced as `Err(ParseRule::PlayerList)` entries so
/// one bad line does not discard the rest of the dump.
pub(crate) fn parse_player_list(
    payload: &str,
) -> Result<Vec<Result<PlayerRow, ParseRule>>, ParseRule> {
    let mut lines = payload.lines();
    if lines.next().map(str::trim_end) != Some(PLAYER_LIST_HEADER) {
        return Err(ParseRule::PlayerList);
    }
    for _ in 0..PLAYER_LIST_HEADER_LINES {
        let _ = lines.next();
    }

    let mut rows = Vec::new();
    for line in lines {
        let line = line.trim_end();
        // The trailer line `(N players in total)` ends the table.
        if line.is_empty() || line.starts_with('(') {
            break;
        }
        rows.push(parse_player_row(line));
    }
    Ok(rows)
}

fn parse_player_row(line: &str) -> Result<PlayerRow, ParseRule> {
    const RULE: ParseRule = ParseRule::PlayerList;
    let mut rest = line;
    let id_tok = next_token(&mut rest).ok_or(RULE)?;
    let addr_tok = next_token(&mut rest).ok_or(RULE)?;
    let ping_tok = next_token(&mut rest).ok_or(RULE)?;
    let guid_tok = next_token(&mut rest).ok_or(RULE)?;
    let name_field = rest.trim_start();

    let id = id_tok.parse().map_err(|_| RULE)?;
    let (ip, port) = addr_tok.split_once(':').ok_or(RULE)?;
    if !is_dotted_quad(ip) || !is_digits(port) {
        return Err(RULE);
    }
    let ping = ping_tok.parse().map_err(|_| RULE)?;

    let (guid, verified) = match guid_tok {
        "-" => (None, false),
        tok => {
            let (hex, verified) = if let Some(hex) = tok.strip_suffix("(OK)") {
                (hex, true)
            } else if let Some(hex) = tok.strip_suffix("(?)") {
                (hex, false)
            } else {
                (tok, false)
            };
            if !is_guid(hex) {
                return Err(RULE);
            }
            (Some(hex.to_string()), verified)
        },
    };

    if name_field.is_empty() {
        return Err(RULE);
    }
    let (name, lobby) = match name_field.strip_suffix(" (Lobby)") {
        Some(name) if !name.is_empty() => (name, true),
        _ => (name_field, false),
    };

    Ok(PlayerRow {
        id,
        ip: ip.to_string(),
        ping,
        guid,
        verified,
        name: name.to_string(),
        lobby,
    })
}

// =============================================================================
// Lexical helpers
// =============================================================================

/// Pops the next whitespace-delimited token, leaving the tail (with its
/// leading whitespace) in `rest` so the final name field keeps its spaces.
fn next_token<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = rest.trim_start();
    if s.is_empty() {
        *rest = s;
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (token, tail) = s.split_at(end);
    *rest = tail;
    Some(token)
}

/// Splits a leading run of ASCII digits off the input.
fn take_digits(s: &str) -> Option<(&str, &str)> {
    let end = s.bytes().take_while(u8::is_ascii_digit).count();
    if end == 0 {
        None
    } else {
        Some((&s[..end], &s[end..]))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// A 32-character lowercase hex GUID.
fn is_guid(s: &str) -> bool {
    s.len() == 32
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Matches the address capture `\d+\.\d+\.\d+\.\d+`.
fn is_dotted_quad(s: &str) -> bool {
    let mut groups = 0;
    for group in s.split('.') {
        if !is_digits(group) {
            return false;
        }
        groups += 1;
    }
    groups == 4
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

    fn parsed(raw: &str) -> ServerMessage {
        parse_server_message(raw)
            .unwrap_or_else(|rule| panic!("{raw:?} failed rule {rule}"))
            .unwrap_or_else(|| panic!("{raw:?} was not recognized"))
    }

    #[test]
    fn connecting_message() {
        assert_eq!(
            parsed("Player #3 Alice (10.0.0.5:27016) connected"),
            ServerMessage::Connecting {
                id: 3,
                name: "Alice".to_string(),
                ip: "10.0.0.5".to_string(),
            }
        );
    }

    #[test]
    fn connecting_name_with_spaces_and_parens() {
        assert_eq!(
            parsed("Player #12 [TAG] Bob (junior) (192.168.1.20:2304) connected"),
            ServerMessage::Connecting {
                id: 12,
                name: "[TAG] Bob (junior)".to_string(),
                ip: "192.168.1.20".to_string(),
            }
        );
    }

    #[test]
    fn connecting_name_embedding_an_address() {
        // The rightmost address candidate wins, like a greedy regex.
        assert_eq!(
            parsed("Player #1 Eve (1.2.3.4:5) connected (9.9.9.9:1) connected"),
            ServerMessage::Connecting {
                id: 1,
                name: "Eve (1.2.3.4:5) connected".to_string(),
                ip: "9.9.9.9".to_string(),
            }
        );
    }

    #[test]
    fn guid_calculated_message() {
        assert_eq!(
            parsed(&format!("Player #3 Alice BE GUID: {GUID}")),
            ServerMessage::GuidCalculated {
                id: 3,
                guid: GUID.to_string(),
            }
        );
    }

    #[test]
    fn guid_must_be_lowercase_hex32() {
        let upper = GUID.to_uppercase();
        assert_eq!(
            parse_server_message(&format!("Player #3 Alice BE GUID: {upper}")),
            Err(ParseRule::GuidCalculated)
        );
        assert_eq!(
            parse_server_message("Player #3 Alice BE GUID: abc123"),
            Err(ParseRule::GuidCalculated)
        );
    }

    #[test]
    fn guid_verified_message() {
        assert_eq!(
            parsed(&format!("Verified GUID ({GUID}) of player #3 Alice")),
            ServerMessage::GuidVerified {
                id: 3,
                name: "Alice".to_string(),
                guid: GUID.to_string(),
            }
        );
    }

    #[test]
    fn disconnected_message() {
        assert_eq!(
            parsed("Player #3 Alice disconnected"),
            ServerMessage::Disconnected { id: 3 }
        );
    }

    #[test]
    fn disconnected_requires_a_name() {
        assert_eq!(
            parse_server_message("Player #3   disconnected"),
            Ok(Some(ServerMessage::Disconnected { id: 3 })),
            "a lone space is a valid name capture"
        );
        assert_eq!(
            parse_server_message("Player #3 disconnected"),
            Err(ParseRule::PlayerDisconnected)
        );
    }

    #[test]
    fn kicked_message() {
        assert_eq!(
            parsed(&format!(
                "Player #7 Mallory ({GUID}) has been kicked by BattlEye: Global Ban #abcd"
            )),
            ServerMessage::Kicked {
                id: 7,
                reason: "Global Ban #abcd".to_string(),
            }
        );
    }

    #[test]
    fn be_log_message() {
        assert_eq!(
            parsed(&format!(
                "RemoteExec Log: #5 Alice ({GUID}) - #47 fn_something [value]"
            )),
            ServerMessage::BeLog {
                kind: "RemoteExec".to_string(),
                id: 5,
                name: "Alice".to_string(),
                guid: GUID.to_string(),
                filter: 47,
                body: "fn_something [value]".to_string(),
            }
        );
    }

    #[test]
    fn be_log_body_spans_lines() {
        let raw = format!("Script Log: #2 Bob ({GUID}) - #0 line one\nline two");
        assert_eq!(
            parsed(&raw),
            ServerMessage::BeLog {
                kind: "Script".to_string(),
                id: 2,
                name: "Bob".to_string(),
                guid: GUID.to_string(),
                filter: 0,
                body: "line one\nline two".to_string(),
            }
        );
    }

    #[test]
    fn chat_message() {
        assert_eq!(
            parsed("(Side) Alice: hello there"),
            ServerMessage::Chat {
                channel: "Side".to_string(),
                rest: "Alice: hello there".to_string(),
            }
        );
    }

    #[test]
    fn chat_channel_must_be_alphabetic() {
        assert_eq!(parse_server_message("(Side 2) Alice: hi"), Ok(None));
    }

    #[test]
    fn admin_message() {
        assert_eq!(
            parsed("RCon admin #2: (Global) restart in 5"),
            ServerMessage::Admin {
                admin_id: 2,
                channel: "Global".to_string(),
                text: "restart in 5".to_string(),
            }
        );
    }

    #[test]
    fn admin_channel_capture_is_lazy() {
        assert_eq!(
            parsed("RCon admin #2: (Global) (not a channel) hi"),
            ServerMessage::Admin {
                admin_id: 2,
                channel: "Global".to_string(),
                text: "(not a channel) hi".to_string(),
            }
        );
    }

    #[test]
    fn advisories_recognized() {
        assert_eq!(parsed("Connected to BE Master"), ServerMessage::Advisory);
        assert_eq!(parsed("Ban check timed out"), ServerMessage::Advisory);
    }

    #[test]
    fn unknown_messages_fall_through() {
        assert_eq!(parse_server_message("Restart warning in 5 minutes"), Ok(None));
        assert_eq!(parse_server_message("Player count: 12"), Ok(None));
    }

    #[test]
    fn id_overflow_is_a_capture_failure() {
        assert_eq!(
            parse_server_message("Player #99999999999 Alice disconnected"),
            Err(ParseRule::PlayerDisconnected)
        );
    }

    // =========================================================================
    // Roster dump
    // =========================================================================

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

    #[test]
    fn header_detection() {
        assert!(is_player_list("Players on server:\nrest"));
        assert!(!is_player_list("Say hello"));
    }

    #[test]
    fn missing_header_is_an_error() {
        assert_eq!(parse_player_list("nonsense"), Err(ParseRule::PlayerList));
    }

    #[test]
    fn empty_dump_parses() {
        let rows = parse_player_list(&dump(&[])).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn full_row_parses() {
        let line = format!("0   10.0.0.5:2304     32   {GUID}(OK) Alice");
        let rows = parse_player_list(&dump(&[&line])).unwrap();
        assert_eq!(
            rows,
            vec![Ok(PlayerRow {
                id: 0,
                ip: "10.0.0.5".to_string(),
                ping: 32,
                guid: Some(GUID.to_string()),
                verified: true,
                name: "Alice".to_string(),
                lobby: false,
            })]
        );
    }

    #[test]
    fn lobby_suffix_and_spaced_names() {
        let line = format!("4   10.0.0.9:2304     15   {GUID}(?) [TAG] Bob Jr (Lobby)");
        let rows = parse_player_list(&dump(&[&line])).unwrap();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.name, "[TAG] Bob Jr");
        assert!(row.lobby);
        assert!(!row.verified);
    }

    #[test]
    fn missing_guid_row() {
        let line = "2   172.16.0.4:2316   210  -  Carol";
        let rows = parse_player_list(&dump(&[line])).unwrap();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.guid, None);
        assert!(!row.verified);
        assert_eq!(row.name, "Carol");
    }

    #[test]
    fn negative_ping_parses() {
        let line = format!("9   10.1.1.1:2304     -1   {GUID}(OK) Laggy");
        let rows = parse_player_list(&dump(&[&line])).unwrap();
        assert_eq!(rows[0].as_ref().unwrap().ping, -1);
    }

    #[test]
    fn malformed_row_does_not_poison_the_dump() {
        let good = format!("1   10.0.0.5:2304     32   {GUID}(OK) Alice");
        let rows = parse_player_list(&dump(&["garbage row", &good])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], Err(ParseRule::PlayerList));
        assert!(rows[1].is_ok());
    }

    #[test]
    fn bare_guid_without_status_suffix() {
        let line = format!("3   10.0.0.6:2304     55   {GUID} Dave");
        let rows = parse_player_list(&dump(&[&line])).unwrap();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.guid.as_deref(), Some(GUID));
        assert!(!row.verified);
    }
}
