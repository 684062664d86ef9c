//! Outbound command scheduling: sequence allocation, the single in-flight
//! slot, and the resend/give-up policy.
//!
//! BattlEye answers one command at a time, so the scheduler keeps a FIFO of
//! pending commands and releases the next only when the current one is
//! retired. Sequences are allocated from a wrapping 8-bit counter at
//! dequeue time; with a single in-flight slot a live sequence can never be
//! reallocated before it is retired.
//!
//! The scheduler never touches the socket. [`CommandScheduler::tick`]
//! returns actions (transmit, resend, give up) for the session to execute,
//! which keeps the policy deterministic and testable with fabricated
//! clocks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::network::codec;
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};

/// Wait this long for the first response before considering a resend.
const RESEND_INTERVAL: Duration = Duration::from_secs(2);
/// A resend additionally requires this much silence since the last
/// fragment, so a slowly arriving multi-part reply is not duplicated.
const PART_QUIET_INTERVAL: Duration = Duration::from_millis(750);
/// Consecutive resends tolerated before a command is abandoned.
const MAX_ATTEMPTS: u32 = 5;

/// What a queued command is for. User commands surface their responses;
/// system commands are consumed internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandKind {
    /// Issued through `send_command`; the response is surfaced as an event.
    User,
    /// The periodic `players` roster poll.
    RosterPoll,
    /// The empty keep-alive command.
    Heartbeat,
}

#[derive(Debug)]
struct QueuedCommand {
    kind: CommandKind,
    payload: Vec<u8>,
}

/// A command that has been sent and awaits its response.
#[derive(Debug)]
pub(crate) struct CommandInFlight {
    pub(crate) sequence: u8,
    pub(crate) kind: CommandKind,
    /// The command text, kept for timeout diagnostics and response events.
    pub(crate) payload: Vec<u8>,
    /// The sealed frame bytes; resends repeat these exactly.
    frame: Vec<u8>,
    first_sent_at: Instant,
    last_sent_at: Instant,
    last_part_at: Option<Instant>,
    attempts: u32,
}

impl CommandInFlight {
    /// The most recent moment anything happened for this command, used to
    /// judge quietness before a resend.
    fn last_activity(&self) -> Instant {
        match self.last_part_at {
            Some(part) => part.max(self.last_sent_at),
            None => self.last_sent_at,
        }
    }
}

/// An action for the session to carry out after a tick.
#[derive(Debug)]
pub(crate) enum SchedulerAction {
    /// Put these frame bytes on the wire. `fresh` is true for the first
    /// send of a newly dequeued command (whose sequence may be reclaiming
    /// a stale reassembly buffer).
    Transmit {
        sequence: u8,
        frame: Vec<u8>,
        fresh: bool,
    },
    /// The in-flight command exhausted its attempts and was abandoned.
    GiveUp { kind: CommandKind, payload: Vec<u8> },
}

/// Owns the outbound queue, the sequence counter and the in-flight slot.
#[derive(Debug)]
pub(crate) struct CommandScheduler {
    next_sequence: u8,
    queue: VecDeque<QueuedCommand>,
    in_flight: Option<CommandInFlight>,
    resend_interval: Duration,
    part_quiet_interval: Duration,
    max_attempts: u32,
}

impl CommandScheduler {
    pub(crate) fn new() -> Self {
        Self::with_policy(RESEND_INTERVAL, PART_QUIET_INTERVAL, MAX_ATTEMPTS)
    }

    /// Overrides the resend policy; used by tests to compress time.
    pub(crate) fn with_policy(
        resend_interval: Duration,
        part_quiet_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            next_sequence: 0,
            queue: VecDeque::new(),
            in_flight: None,
            resend_interval,
            part_quiet_interval,
            max_attempts,
        }
    }

    /// Enqueues a user command.
    pub(crate) fn enqueue_user(&mut self, payload: Vec<u8>) {
        self.queue.push_back(QueuedCommand {
            kind: CommandKind::User,
            payload,
        });
    }

    /// Enqueues a roster poll unless one is already queued or in flight.
    /// Returns whether the poll was actually enqueued.
    pub(crate) fn enqueue_roster_poll(&mut self) -> bool {
        if self.is_pending(CommandKind::RosterPoll) {
            trace!("roster poll coalesced with pending poll");
            return false;
        }
        self.queue.push_back(QueuedCommand {
            kind: CommandKind::RosterPoll,
            payload: b"players".to_vec(),
        });
        true
    }

    /// Enqueues a keep-alive unless one is already queued or in flight.
    pub(crate) fn enqueue_heartbeat(&mut self) -> bool {
        if self.is_pending(CommandKind::Heartbeat) {
            return false;
        }
        self.queue.push_back(QueuedCommand {
            kind: CommandKind::Heartbeat,
            payload: Vec::new(),
        });
        true
    }

    fn is_pending(&self, kind: CommandKind) -> bool {
        self.in_flight.as_ref().is_some_and(|f| f.kind == kind)
            || self.queue.iter().any(|c| c.kind == kind)
    }

    /// The sequence currently awaiting a response, if any.
    pub(crate) fn in_flight_sequence(&self) -> Option<u8> {
        self.in_flight.as_ref().map(|f| f.sequence)
    }

    /// Records response activity (a fragment arrived) for the in-flight
    /// sequence, pushing back the resend deadline.
    pub(crate) fn note_part(&mut self, sequence: u8, now: Instant) {
        if let Some(flight) = self.in_flight.as_mut() {
            if flight.sequence == sequence {
                flight.last_part_at = Some(now);
            }
        }
    }

    /// Retires the in-flight command if it carries the given sequence,
    /// returning it so the session can dispatch the response.
    pub(crate) fn retire(&mut self, sequence: u8) -> Option<CommandInFlight> {
        match self.in_flight.as_ref() {
            Some(flight) if flight.sequence == sequence => self.in_flight.take(),
            _ => None,
        }
    }

    /// Runs one maintenance pass: dispatches the queue head when the slot
    /// is free, resends a quiet in-flight command, abandons one that has
    /// used up its attempts.
    pub(crate) fn tick(&mut self, now: Instant) -> Option<SchedulerAction> {
        if let Some(flight) = self.in_flight.as_mut() {
            let due = now.duration_since(flight.last_sent_at) >= self.resend_interval
                && now.duration_since(flight.last_activity()) >= self.part_quiet_interval;
            if !due {
                return None;
            }
            if flight.attempts > self.max_attempts {
                let flight = self.in_flight.take()?;
                trace!(
                    sequence = flight.sequence,
                    attempts = flight.attempts,
                    "command abandoned"
                );
                return Some(SchedulerAction::GiveUp {
                    kind: flight.kind,
                    payload: flight.payload,
                });
            }
            flight.attempts += 1;
            flight.last_sent_at = now;
            trace!(
                sequence = flight.sequence,
                attempt = flight.attempts,
                "resending command"
            );
            return Some(SchedulerAction::Transmit {
                sequence: flight.sequence,
                frame: flight.frame.clone(),
                fresh: false,
            });
        }

        let command = self.queue.pop_front()?;
        let sequence = self.allocate_sequence()?;
        let frame = codec::encode_command(sequence, &command.payload);
        self.in_flight = Some(CommandInFlight {
            sequence,
            kind: command.kind,
            payload: command.payload,
            frame: frame.clone(),
            first_sent_at: now,
            last_sent_at: now,
            last_part_at: None,
            attempts: 1,
        });
        trace!(sequence, kind = ?command.kind, "command dispatched");
        Some(SchedulerAction::Transmit {
            sequence,
            frame,
            fresh: true,
        })
    }

    fn allocate_sequence(&mut self) -> Option<u8> {
        let sequence = self.next_sequence;
        // With one in-flight slot the counter cannot catch up to a live
        // sequence; guard the invariant anyway.
        if self.in_flight_sequence() == Some(sequence) {
            report_violation!(
                ViolationSeverity::Critical,
                ViolationKind::Sequencing,
                "sequence {} is still in flight at allocation time",
                sequence
            );
            return None;
        }
        self.next_sequence = sequence.wrapping_add(1);
        Some(sequence)
    }

    /// How long the current in-flight command has been waiting in total.
    #[allow(dead_code)]
    pub(crate) fn in_flight_age(&self, now: Instant) -> Option<Duration> {
        self.in_flight
            .as_ref()
            .map(|f| now.duration_since(f.first_sent_at))
    }

    /// Discards all volatile state. Called when the session closes; the
    /// next session starts from sequence zero with an empty queue.
    pub(crate) fn reset(&mut self) {
        self.next_sequence = 0;
        self.queue.clear();
        self.in_flight = None;
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

    fn scheduler() -> CommandScheduler {
        CommandScheduler::new()
    }

    fn transmit(action: Option<SchedulerAction>) -> (u8, Vec<u8>, bool) {
        match action {
            Some(SchedulerAction::Transmit {
                sequence,
                frame,
                fresh,
            }) => (sequence, frame, fresh),
            other => panic!("expected Transmit, got {other:?}"),
        }
    }

    #[test]
    fn dispatches_head_when_idle() {
        let mut s = scheduler();
        let now = Instant::now();
        s.enqueue_user(b"say -1 hi".to_vec());

        let (sequence, frame, fresh) = transmit(s.tick(now));
        assert_eq!(sequence, 0);
        assert!(fresh);
        assert_eq!(frame, codec::encode_command(0, b"say -1 hi"));
        assert_eq!(s.in_flight_sequence(), Some(0));
    }

    #[test]
    fn only_one_command_in_flight() {
        let mut s = scheduler();
        let now = Instant::now();
        s.enqueue_user(b"first".to_vec());
        s.enqueue_user(b"second".to_vec());

        let (seq1, _, _) = transmit(s.tick(now));
        assert!(s.tick(now).is_none(), "second command must wait");

        assert!(s.retire(seq1).is_some());
        let (seq2, _, _) = transmit(s.tick(now));
        assert_eq!(seq2, seq1.wrapping_add(1));
    }

    #[test]
    fn sequence_allocator_wraps_through_the_full_cycle() {
        let mut s = scheduler();
        let now = Instant::now();
        for expected in (0..=255u8).chain(0..=1) {
            s.enqueue_user(b"n".to_vec());
            let (sequence, _, _) = transmit(s.tick(now));
            assert_eq!(sequence, expected);
            assert!(s.retire(sequence).is_some());
        }
    }

    #[test]
    fn retire_ignores_foreign_sequences() {
        let mut s = scheduler();
        let now = Instant::now();
        s.enqueue_user(b"cmd".to_vec());
        let (sequence, _, _) = transmit(s.tick(now));

        assert!(s.retire(sequence.wrapping_add(1)).is_none());
        assert_eq!(s.in_flight_sequence(), Some(sequence));
        assert!(s.retire(sequence).is_some());
        assert_eq!(s.in_flight_sequence(), None);
    }

    #[test]
    fn resends_after_quiet_interval_with_same_bytes() {
        let mut s = scheduler();
        let start = Instant::now();
        s.enqueue_user(b"players".to_vec());
        let (sequence, first_frame, _) = transmit(s.tick(start));

        // Too early: nothing happens.
        assert!(s.tick(start + Duration::from_millis(1500)).is_none());

        let (reseq, frame, fresh) = transmit(s.tick(start + Duration::from_millis(2100)));
        assert_eq!(reseq, sequence);
        assert_eq!(frame, first_frame, "resend must repeat the exact bytes");
        assert!(!fresh);
    }

    #[test]
    fn fragment_activity_defers_resend() {
        let mut s = scheduler();
        let start = Instant::now();
        s.enqueue_user(b"players".to_vec());
        let (sequence, _, _) = transmit(s.tick(start));

        // A fragment lands right before the resend deadline.
        s.note_part(sequence, start + Duration::from_millis(1900));
        assert!(
            s.tick(start + Duration::from_millis(2100)).is_none(),
            "recent fragment activity must suppress the resend"
        );

        // Once the reply goes quiet the resend fires.
        let (reseq, _, _) = transmit(s.tick(start + Duration::from_millis(2700)));
        assert_eq!(reseq, sequence);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut s = CommandScheduler::with_policy(Duration::from_secs(2), Duration::from_millis(750), 5);
        let start = Instant::now();
        s.enqueue_user(b"lost".to_vec());
        let (_, _, _) = transmit(s.tick(start));

        // Five consecutive resends are tolerated...
        let mut now = start;
        for _ in 0..5 {
            now += Duration::from_secs(3);
            let (_, _, fresh) = transmit(s.tick(now));
            assert!(!fresh);
        }

        now += Duration::from_secs(3);
        match s.tick(now) {
            Some(SchedulerAction::GiveUp { kind, payload }) => {
                assert_eq!(kind, CommandKind::User);
                assert_eq!(payload, b"lost".to_vec());
            },
            other => panic!("expected GiveUp, got {other:?}"),
        }
        assert_eq!(s.in_flight_sequence(), None);
    }

    #[test]
    fn roster_polls_coalesce() {
        let mut s = scheduler();
        let now = Instant::now();
        assert!(s.enqueue_roster_poll());
        assert!(!s.enqueue_roster_poll(), "queued poll coalesces");

        let (sequence, _, _) = transmit(s.tick(now));
        assert!(!s.enqueue_roster_poll(), "in-flight poll coalesces");

        assert!(s.retire(sequence).is_some());
        assert!(s.enqueue_roster_poll(), "retired poll frees the slot");
    }

    #[test]
    fn heartbeats_coalesce() {
        let mut s = scheduler();
        assert!(s.enqueue_heartbeat());
        assert!(!s.enqueue_heartbeat());
    }

    #[test]
    fn user_commands_do_not_coalesce() {
        let mut s = scheduler();
        s.enqueue_user(b"players".to_vec());
        s.enqueue_user(b"players".to_vec());
        let now = Instant::now();
        let (seq, _, _) = transmit(s.tick(now));
        assert!(s.retire(seq).is_some());
        let (seq2, _, _) = transmit(s.tick(now));
        assert_eq!(seq2, 1, "both user commands dispatch");
    }

    #[test]
    fn reset_restarts_the_sequence_space() {
        let mut s = scheduler();
        let now = Instant::now();
        for _ in 0..3 {
            s.enqueue_user(b"x".to_vec());
            let (seq, _, _) = transmit(s.tick(now));
            s.retire(seq);
        }
        s.enqueue_user(b"pending".to_vec());

        s.reset();
        assert_eq!(s.in_flight_sequence(), None);
        s.enqueue_user(b"fresh".to_vec());
        let (sequence, _, _) = transmit(s.tick(now));
        assert_eq!(sequence, 0);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The allocator emits 0,1,...,255,0,... and never a sequence that
        /// is currently in flight.
        #[test]
        fn prop_allocator_cycles_without_collisions(count in 1usize..600) {
            let mut s = CommandScheduler::new();
            let now = Instant::now();
            for i in 0..count {
                s.enqueue_user(vec![b'x']);
                let action = s.tick(now);
                let sequence = match action {
                    Some(SchedulerAction::Transmit { sequence, .. }) => sequence,
                    other => panic!("expected Transmit, got {other:?}"),
                };
                prop_assert_eq!(sequence, (i % 256) as u8);
                prop_assert_eq!(s.in_flight_sequence(), Some(sequence));
                prop_assert!(s.retire(sequence).is_some());
            }
        }
    }
}
