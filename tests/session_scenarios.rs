//! End-to-end protocol scenarios driven through a scripted socket.

mod common;

use std::time::Duration;

use bercon::network::codec;
use bercon::{DecodeError, RconError, RconEvent, SessionState};

use common::{
    connected_client, drain, dump, inject, poll_until, sent_acks, sent_commands, stub_client,
    test_config,
};

const GUID: &str = "0123456789abcdef0123456789abcdef";

// =============================================================================
// Login lifecycle
// =============================================================================

#[test]
fn login_success_connects_and_polls_roster() {
    let (mut client, state) = stub_client(test_config());
    assert!(client.connect());
    assert_eq!(client.state(), SessionState::Authenticating);

    // The first outbound datagram is the password login.
    let first = state.lock().sent[0].clone();
    assert_eq!(first, codec::encode_login(b"secret"));

    inject(&state, codec::encode_login(&[0x01]));
    client.poll();

    assert_eq!(client.state(), SessionState::Connected);
    let events = drain(&mut client);
    assert!(events.contains(&RconEvent::Connected), "events: {events:?}");

    // One `players` command must already be on the wire.
    let commands = sent_commands(&state);
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].1, b"players");
}

#[test]
fn login_failure_aborts_without_reconnect() {
    let (mut client, state) = stub_client(test_config());
    client.connect();

    inject(&state, codec::encode_login(&[0x00]));
    client.poll();

    assert_eq!(client.state(), SessionState::Closed);
    let events = drain(&mut client);
    assert_eq!(
        events,
        vec![
            RconEvent::Error {
                error: RconError::InvalidPassword
            },
            RconEvent::Disconnected {
                reason: "Invalid password".to_string(),
                aborted: true,
            },
        ]
    );

    // No reconnect attempt, ever.
    std::thread::sleep(Duration::from_millis(30));
    for _ in 0..5 {
        client.poll();
    }
    assert!(drain(&mut client).is_empty());
    assert_eq!(state.lock().open_count, 1);
}

#[test]
fn login_timeout_closes_with_reconnect_honored() {
    let (mut client, state) = stub_client(test_config());
    client.override_timing(
        Duration::from_secs(20),
        Duration::from_millis(40),
        Duration::from_millis(30),
    );
    client.connect();

    let events = poll_until(&mut client, Duration::from_secs(2), |seen| {
        seen.iter()
            .any(|e| matches!(e, RconEvent::Disconnected { .. }))
    });
    assert!(events.contains(&RconEvent::Error {
        error: RconError::LoginTimeout
    }));
    assert!(matches!(
        events.iter().find(|e| matches!(e, RconEvent::Disconnected { .. })),
        Some(RconEvent::Disconnected { aborted: false, .. })
    ));

    // The reconnect delay elapses and a fresh association opens.
    poll_until(&mut client, Duration::from_secs(2), |_| {
        state.lock().open_count == 2
    });
    assert_eq!(client.state(), SessionState::Authenticating);
}

// =============================================================================
// Heartbeats and the watchdog
// =============================================================================

#[test]
fn idle_session_emits_exactly_one_heartbeat_per_interval() {
    let mut config = test_config();
    // Park the roster poll far away so only heartbeats generate traffic.
    config.player_update_interval = Duration::from_secs(40);
    config.idle_limit = Duration::from_secs(10);
    let (mut client, state, _) = connected_client(config, &[]);
    client.override_timing(
        Duration::from_millis(60),
        Duration::from_secs(5),
        Duration::from_secs(2),
    );

    let heartbeat_count = |state: &std::sync::Arc<parking_lot::Mutex<common::StubState>>| {
        sent_commands(state)
            .iter()
            .filter(|(_, payload)| payload.is_empty())
            .count()
    };

    // One heartbeat after the idle interval...
    poll_until(&mut client, Duration::from_secs(2), |_| {
        heartbeat_count(&state) == 1
    });

    // ...and no second one while the first is unanswered.
    std::thread::sleep(Duration::from_millis(90));
    client.poll();
    assert_eq!(heartbeat_count(&state), 1);

    // Answer it; the next idle interval produces exactly one more, under
    // a fresh sequence.
    let sequence = sent_commands(&state)
        .iter()
        .find(|(_, payload)| payload.is_empty())
        .map(|(sequence, _)| *sequence)
        .expect("heartbeat frame");
    inject(&state, codec::encode_command(sequence, &[]));
    client.poll();

    poll_until(&mut client, Duration::from_secs(2), |_| {
        heartbeat_count(&state) == 2
    });
    let heartbeats: Vec<u8> = sent_commands(&state)
        .iter()
        .filter(|(_, payload)| payload.is_empty())
        .map(|(sequence, _)| *sequence)
        .collect();
    assert_eq!(heartbeats.len(), 2);
    assert_ne!(heartbeats[0], heartbeats[1]);
}

#[test]
fn watchdog_closes_a_silent_session() {
    let mut config = test_config();
    config.idle_limit = Duration::from_millis(80);
    config.player_update_interval = Duration::from_secs(40);
    let (mut client, _state, _) = connected_client(config, &[]);

    let events = poll_until(&mut client, Duration::from_secs(2), |seen| {
        seen.iter()
            .any(|e| matches!(e, RconEvent::Disconnected { .. }))
    });
    assert!(events.contains(&RconEvent::Error {
        error: RconError::IdleTimeout
    }));
    assert_eq!(client.state(), SessionState::Closed);
}

#[test]
fn reconnect_resets_volatile_state() {
    let mut config = test_config();
    config.idle_limit = Duration::from_millis(60);
    config.player_update_interval = Duration::from_secs(40);
    let (mut client, state, _) = connected_client(config, &[]);
    client.override_timing(
        Duration::from_secs(20),
        Duration::from_secs(5),
        Duration::from_millis(30),
    );
    assert!(!client.players().is_empty() || client.roster_ready());

    // Starve the watchdog, then let the reconnect fire.
    poll_until(&mut client, Duration::from_secs(2), |seen| {
        seen.iter()
            .any(|e| matches!(e, RconEvent::Disconnected { aborted: false, .. }))
    });
    poll_until(&mut client, Duration::from_secs(2), |_| {
        state.lock().open_count == 2
    });

    // The roster and the ready latch are gone.
    assert!(client.players().is_empty());
    assert!(!client.roster_ready());

    // A fresh login accepted: the sequence space restarts at zero.
    state.lock().sent.clear();
    inject(&state, codec::encode_login(&[0x01]));
    client.poll();
    let commands = sent_commands(&state);
    assert_eq!(commands.first().map(|(s, _)| *s), Some(0));
}

// =============================================================================
// Commands and multi-part responses
// =============================================================================

#[test]
fn fragmented_response_reassembles_out_of_order() {
    let (mut client, state, _) = connected_client(test_config(), &[]);

    client.send_command("hello");
    client.poll();
    let (sequence, payload) = sent_commands(&state)
        .last()
        .cloned()
        .expect("command must be dispatched");
    assert_eq!(payload, b"hello");

    // Index 1 lands before index 0.
    inject(&state, codec::encode_command_part(sequence, 2, 1, b" world"));
    inject(&state, codec::encode_command_part(sequence, 2, 0, b"hello"));
    client.poll();

    let events = drain(&mut client);
    assert_eq!(
        events,
        vec![RconEvent::CommandResponse {
            command: "hello".to_string(),
            response: "hello world".to_string(),
        }]
    );
}

#[test]
fn duplicate_fragments_do_not_break_reassembly() {
    let (mut client, state, _) = connected_client(test_config(), &[]);

    client.send_command("status");
    client.poll();
    let sequence = sent_commands(&state)
        .last()
        .map(|(sequence, _)| *sequence)
        .expect("command dispatched");

    inject(&state, codec::encode_command_part(sequence, 3, 0, b"a"));
    inject(&state, codec::encode_command_part(sequence, 3, 0, b"a"));
    inject(&state, codec::encode_command_part(sequence, 3, 2, b"c"));
    inject(&state, codec::encode_command_part(sequence, 3, 1, b"b"));
    client.poll();

    let events = drain(&mut client);
    assert_eq!(
        events,
        vec![RconEvent::CommandResponse {
            command: "status".to_string(),
            response: "abc".to_string(),
        }]
    );
}

#[test]
fn unanswered_command_times_out_and_closes() {
    let (mut client, _state, _) = connected_client(test_config(), &[]);
    client.override_resend_policy(Duration::from_millis(30), Duration::from_millis(10), 2);

    client.send_command("lost");
    let events = poll_until(&mut client, Duration::from_secs(2), |seen| {
        seen.iter()
            .any(|e| matches!(e, RconEvent::Disconnected { .. }))
    });
    assert!(events.contains(&RconEvent::Error {
        error: RconError::CommandTimeout {
            command: "lost".to_string()
        }
    }));
    assert!(matches!(
        events.iter().find(|e| matches!(e, RconEvent::Disconnected { .. })),
        Some(RconEvent::Disconnected { aborted: false, .. })
    ));
}

#[test]
fn responses_for_unknown_sequences_are_ignored() {
    let (mut client, state, _) = connected_client(test_config(), &[]);

    inject(&state, codec::encode_command(200, b"stray reply"));
    client.poll();
    assert!(drain(&mut client).is_empty());
    assert_eq!(client.state(), SessionState::Connected);
}

// =============================================================================
// Inline roster path
// =============================================================================

#[test]
fn inline_join_and_leave_emit_once() {
    let (mut client, state, _) = connected_client(test_config(), &[]);

    inject(
        &state,
        codec::encode_server_message(0, b"Player #3 Alice (10.0.0.5:27016) connected"),
    );
    inject(
        &state,
        codec::encode_server_message(
            1,
            format!("Player #3 Alice BE GUID: {GUID}").as_bytes(),
        ),
    );
    inject(
        &state,
        codec::encode_server_message(
            2,
            format!("Verified GUID ({GUID}) of player #3 Alice").as_bytes(),
        ),
    );
    client.poll();

    let events = drain(&mut client);
    let joins: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RconEvent::PlayerJoin { player } => Some(player),
            _ => None,
        })
        .collect();
    assert_eq!(joins.len(), 1, "events: {events:?}");
    let player = joins[0];
    assert_eq!(player.id, 3);
    assert_eq!(player.name, "Alice");
    assert_eq!(player.ip.as_deref(), Some("10.0.0.5"));
    assert_eq!(player.guid.as_deref(), Some(GUID));
    assert!(player.verified);
    assert!(player.lobby);

    // All three messages were acknowledged.
    assert_eq!(sent_acks(&state), vec![0, 1, 2]);

    inject(
        &state,
        codec::encode_server_message(3, b"Player #3 Alice disconnected"),
    );
    client.poll();
    let events = drain(&mut client);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        RconEvent::PlayerLeave { player, reason }
            if player.id == 3 && reason == "disconnected"
    ));
}

#[test]
fn duplicate_server_messages_are_acked_but_delivered_once() {
    let (mut client, state, _) = connected_client(test_config(), &[]);

    let frame = codec::encode_server_message(9, b"Some unrecognized notice");
    inject(&state, frame.clone());
    inject(&state, frame);
    client.poll();

    // Two acks, one delivery.
    assert_eq!(sent_acks(&state), vec![9, 9]);
    let events = drain(&mut client);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        RconEvent::Error {
            error: RconError::UnknownServerMessage { .. }
        }
    ));
}

#[test]
fn server_messages_before_roster_ready_are_acked_not_processed() {
    let (mut client, state) = stub_client(test_config());
    client.connect();
    inject(&state, codec::encode_login(&[0x01]));
    // A join cycle races ahead of the first roster dump.
    inject(
        &state,
        codec::encode_server_message(
            0,
            format!("Verified GUID ({GUID}) of player #3 Alice").as_bytes(),
        ),
    );
    client.poll();

    assert_eq!(sent_acks(&state), vec![0], "withheld messages still ack");
    let events = drain(&mut client);
    assert!(
        !events.iter().any(|e| matches!(e, RconEvent::PlayerJoin { .. })),
        "no roster semantics before the first dump: {events:?}"
    );
    assert!(client.players().is_empty());
}

// =============================================================================
// Roster dump path
// =============================================================================

#[test]
fn roster_dump_seeds_and_updates() {
    let row = format!("4   10.0.0.7:2304     20   {GUID}(OK) Dana (Lobby)");
    let (mut client, state, events) = connected_client(test_config(), &[&row]);

    // Seeding emitted a join and a snapshot.
    assert!(events.iter().any(|e| matches!(
        e,
        RconEvent::PlayerJoin { player } if player.id == 4
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RconEvent::Players { players } if players.len() == 1
    )));

    // A manual `players` applies the dump and surfaces the raw reply.
    client.send_command("players");
    client.poll();
    let sequence = sent_commands(&state)
        .last()
        .map(|(sequence, _)| *sequence)
        .expect("players dispatched");
    let second = dump(&[&format!("4   10.0.0.7:2304     55   {GUID}(?) Dana")]);
    inject(&state, codec::encode_command(sequence, second.as_bytes()));
    client.poll();

    let events = drain(&mut client);
    let updated = events
        .iter()
        .find_map(|e| match e {
            RconEvent::PlayerUpdated { player, changes } => Some((player, changes)),
            _ => None,
        })
        .expect("an update must be emitted");
    assert_eq!(updated.0.ping, 55);
    assert!(!updated.0.lobby);
    assert!(updated.0.verified, "verification is never revoked");
    assert!(updated.1.ping);
    assert!(updated.1.lobby);
    assert!(!updated.1.verified);
    assert!(!updated.1.ip);
    assert!(events
        .iter()
        .any(|e| matches!(e, RconEvent::CommandResponse { .. })));
}

#[test]
fn coalesced_roster_polls_never_stack() {
    let mut config = test_config();
    config.player_update_interval = Duration::from_secs(1);
    let (mut client, state, _) = connected_client(config, &[]);

    // Let several poll deadlines pass without answering the first poll.
    std::thread::sleep(Duration::from_millis(1100));
    client.poll();
    std::thread::sleep(Duration::from_millis(1100));
    client.poll();

    let polls = sent_commands(&state)
        .iter()
        .filter(|(_, payload)| payload == b"players")
        .count();
    assert_eq!(polls, 2, "one seed poll plus one outstanding poll");
}

// =============================================================================
// Error surface
// =============================================================================

#[test]
fn corrupted_datagrams_surface_and_are_dropped() {
    let (mut client, state, _) = connected_client(test_config(), &[]);

    let mut frame = codec::encode_server_message(5, b"Player #1 X disconnected");
    frame[10] ^= 0xFF;
    inject(&state, frame);
    inject(&state, vec![0x42; 3]);
    client.poll();

    let events = drain(&mut client);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        RconEvent::Error {
            error: RconError::Decode(DecodeError::BadChecksum { .. })
        }
    ));
    assert!(matches!(
        &events[1],
        RconEvent::Error {
            error: RconError::Decode(DecodeError::TooShort { len: 3 })
        }
    ));
    assert_eq!(client.state(), SessionState::Connected);
}

#[test]
fn transport_failure_closes_with_reconnect_policy() {
    let (mut client, state, _) = connected_client(test_config(), &[]);
    state.lock().fail_receives = true;
    client.poll();

    let events = drain(&mut client);
    assert!(events.iter().any(|e| matches!(
        e,
        RconEvent::Error {
            error: RconError::Transport { .. }
        }
    )));
    assert!(matches!(
        events.iter().find(|e| matches!(e, RconEvent::Disconnected { .. })),
        Some(RconEvent::Disconnected { aborted: false, .. })
    ));
    assert_eq!(client.state(), SessionState::Closed);
}

// =============================================================================
// Close semantics
// =============================================================================

#[test]
fn aborted_close_is_final_and_silent() {
    let (mut client, state, _) = connected_client(test_config(), &[]);

    assert!(client.close(Some("operator shutdown"), Some(true)));
    let events = drain(&mut client);
    assert_eq!(
        events,
        vec![RconEvent::Disconnected {
            reason: "operator shutdown".to_string(),
            aborted: true,
        }]
    );
    assert_eq!(state.lock().close_count, 1);

    // Idempotent, and nothing ever fires again.
    assert!(!client.close(None, Some(true)));
    std::thread::sleep(Duration::from_millis(50));
    for _ in 0..10 {
        client.poll();
    }
    assert!(drain(&mut client).is_empty());
    assert_eq!(state.lock().open_count, 1);
    assert!(client.players().is_empty());
}

#[test]
fn plain_close_on_auto_reconnect_session_schedules_reconnect() {
    let (mut client, state, _) = connected_client(test_config(), &[]);
    client.override_timing(
        Duration::from_secs(20),
        Duration::from_secs(5),
        Duration::from_millis(20),
    );
    // override_timing replaces the reconnect delay for future closes.
    assert!(client.close(None, None));
    let events = drain(&mut client);
    assert!(matches!(
        events.as_slice(),
        [RconEvent::Disconnected { aborted: false, .. }]
    ));

    poll_until(&mut client, Duration::from_secs(2), |_| {
        state.lock().open_count == 2
    });
}
