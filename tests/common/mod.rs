//! Shared test helpers: a scripted in-memory datagram socket and frame
//! builders for driving a session deterministically.

// Each integration test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use bercon::network::codec::{self, RconFrame};
use bercon::{DatagramSocket, RconClient, RconConfig, RconEvent};

/// Shared state behind a [`StubSocket`]; tests hold a handle to script
/// traffic and inspect what the session sent.
#[derive(Debug, Default)]
pub struct StubState {
    /// Datagrams the next `receive_all` will deliver.
    pub incoming: VecDeque<Vec<u8>>,
    /// Every datagram the session sent, in order.
    pub sent: Vec<Vec<u8>>,
    /// How many times the association was opened.
    pub open_count: usize,
    /// How many times the association was closed.
    pub close_count: usize,
    /// When set, `send` fails with `BrokenPipe`.
    pub fail_sends: bool,
    /// When set, `receive_all` fails with `ConnectionAborted`.
    pub fail_receives: bool,
}

/// An in-memory [`DatagramSocket`] driven by a [`StubState`] script.
#[derive(Debug, Clone)]
pub struct StubSocket {
    state: Arc<Mutex<StubState>>,
}

impl StubSocket {
    pub fn new() -> (Self, Arc<Mutex<StubState>>) {
        let state = Arc::new(Mutex::new(StubState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl DatagramSocket for StubSocket {
    fn open(&mut self) -> std::io::Result<()> {
        self.state.lock().open_count += 1;
        Ok(())
    }

    fn send(&mut self, datagram: &[u8]) -> std::io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "scripted failure"));
        }
        state.sent.push(datagram.to_vec());
        Ok(())
    }

    fn receive_all(&mut self) -> std::io::Result<Vec<Vec<u8>>> {
        let mut state = self.state.lock();
        if state.fail_receives {
            return Err(std::io::Error::new(
                ErrorKind::ConnectionAborted,
                "scripted failure",
            ));
        }
        Ok(state.incoming.drain(..).collect())
    }

    fn close(&mut self) {
        self.state.lock().close_count += 1;
    }
}

/// Queues a datagram for the session's next poll.
pub fn inject(state: &Arc<Mutex<StubState>>, datagram: Vec<u8>) {
    state.lock().incoming.push_back(datagram);
}

/// Collects the session's buffered events into a vector.
pub fn drain(client: &mut RconClient) -> Vec<RconEvent> {
    client.events().collect()
}

/// Every outbound command frame decoded as `(sequence, payload)`.
pub fn sent_commands(state: &Arc<Mutex<StubState>>) -> Vec<(u8, Vec<u8>)> {
    state
        .lock()
        .sent
        .iter()
        .filter_map(|frame| match codec::decode(frame) {
            Ok(RconFrame::CommandWhole { sequence, data }) => Some((sequence, data)),
            _ => None,
        })
        .collect()
}

/// Every outbound ack decoded as its sequence.
pub fn sent_acks(state: &Arc<Mutex<StubState>>) -> Vec<u8> {
    state
        .lock()
        .sent
        .iter()
        .filter_map(|frame| match codec::decode(frame) {
            Ok(RconFrame::ServerMessage { sequence, data }) if data.is_empty() => Some(sequence),
            _ => None,
        })
        .collect()
}

/// Builds a roster dump payload from raw table rows.
pub fn dump(rows: &[&str]) -> String {
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

/// A default configuration for stub-driven sessions.
pub fn test_config() -> RconConfig {
    RconConfig::new("203.0.113.9", 2302, "secret")
}

/// Builds a session over a stub socket.
pub fn stub_client(config: RconConfig) -> (RconClient, Arc<Mutex<StubState>>) {
    let (socket, state) = StubSocket::new();
    let client = RconClient::with_socket(config, Box::new(socket))
        .expect("test configuration must validate");
    (client, state)
}

/// Connects, completes the login handshake and answers the initial roster
/// poll with the given rows, leaving the session `Connected` with
/// `roster_ready` set. Buffered events are drained and returned.
pub fn connected_client(
    config: RconConfig,
    initial_rows: &[&str],
) -> (RconClient, Arc<Mutex<StubState>>, Vec<RconEvent>) {
    let (mut client, state) = stub_client(config);
    assert!(client.connect(), "connect must leave Closed");

    // The login frame goes out synchronously.
    let login = codec::decode(&state.lock().sent[0]).expect("login frame must decode");
    assert!(matches!(login, RconFrame::Login { .. }));

    // Accept the login; the session must poll the roster immediately.
    inject(&state, codec::encode_login(&[0x01]));
    client.poll();
    let (sequence, payload) = sent_commands(&state)
        .first()
        .cloned()
        .expect("a roster poll must follow the login");
    assert_eq!(payload, b"players");

    // Answer it so the roster seeds and inline messages flow.
    inject(&state, codec::encode_command(sequence, dump(initial_rows).as_bytes()));
    client.poll();
    assert!(client.roster_ready(), "first dump must latch roster_ready");

    let events = drain(&mut client);
    (client, state, events)
}

/// Polls repeatedly with short sleeps until `predicate` passes or the
/// deadline expires, collecting every event seen along the way.
pub fn poll_until(
    client: &mut RconClient,
    deadline: Duration,
    mut predicate: impl FnMut(&[RconEvent]) -> bool,
) -> Vec<RconEvent> {
    let start = std::time::Instant::now();
    let mut seen = Vec::new();
    loop {
        client.poll();
        seen.extend(drain(client));
        if predicate(&seen) {
            return seen;
        }
        assert!(
            start.elapsed() < deadline,
            "condition not reached before deadline; events so far: {seen:?}"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}
