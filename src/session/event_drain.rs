//! The opaque event iterator handed out by [`RconClient::events`].
//!
//! [`RconClient::events`]: crate::RconClient::events

use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::RconEvent;

/// An opaque iterator that drains buffered events from a session.
///
/// Wraps the internal queue drain so the public API does not expose
/// `std::collections::vec_deque::Drain` directly. Obtained from
/// [`RconClient::events`](crate::RconClient::events); any events not
/// consumed before the drain is dropped are discarded.
///
/// # Examples
///
/// ```ignore
/// for event in client.events() {
///     match event {
///         RconEvent::PlayerJoin { player } => println!("{} joined", player.name),
///         _ => {}
///     }
/// }
/// ```
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a> {
    inner: Drain<'a, RconEvent>,
}

impl<'a> EventDrain<'a> {
    pub(crate) fn from_drain(inner: Drain<'a, RconEvent>) -> Self {
        Self { inner }
    }
}

impl Iterator for EventDrain<'_> {
    type Item = RconEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain<'_> {}

impl std::fmt::Debug for EventDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::iter_with_drain
)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn make_event(admin_id: u32) -> RconEvent {
        RconEvent::AdminMessage {
            admin_id,
            channel: "Global".to_string(),
            text: "restart in 5".to_string(),
        }
    }

    fn queue(count: u32) -> VecDeque<RconEvent> {
        (0..count).map(make_event).collect()
    }

    #[test]
    fn drain_yields_all_events_in_order() {
        let mut buffered = queue(3);
        let drain = EventDrain::from_drain(buffered.drain(..));
        let events: Vec<_> = drain.collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], make_event(0));
        assert_eq!(events[1], make_event(1));
        assert_eq!(events[2], make_event(2));
        assert!(buffered.is_empty());
    }

    #[test]
    fn drain_is_fused() {
        let mut buffered = queue(1);
        let mut drain = EventDrain::from_drain(buffered.drain(..));
        assert!(drain.next().is_some());
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }

    #[test]
    fn double_ended_iteration() {
        let mut buffered = queue(3);
        let mut drain = EventDrain::from_drain(buffered.drain(..));
        assert_eq!(drain.next_back(), Some(make_event(2)));
        assert_eq!(drain.next(), Some(make_event(0)));
        assert_eq!(drain.next_back(), Some(make_event(1)));
        assert!(drain.next().is_none());
    }

    #[test]
    fn reverse_iteration() {
        let mut buffered = queue(3);
        let drain = EventDrain::from_drain(buffered.drain(..));
        let reversed: Vec<_> = drain.rev().collect();
        assert_eq!(
            reversed,
            vec![make_event(2), make_event(1), make_event(0)]
        );
    }

    #[test]
    fn exact_size_is_accurate() {
        let mut buffered = queue(2);
        let mut drain = EventDrain::from_drain(buffered.drain(..));
        assert_eq!(drain.len(), 2);
        let _ = drain.next();
        assert_eq!(drain.len(), 1);
        let _ = drain.next();
        assert_eq!(drain.len(), 0);
    }

    #[test]
    fn size_hint_matches_len() {
        let mut buffered = queue(3);
        let drain = EventDrain::from_drain(buffered.drain(..));
        assert_eq!(drain.size_hint(), (3, Some(3)));

        let mut buffered = queue(0);
        let drain = EventDrain::from_drain(buffered.drain(..));
        assert_eq!(drain.size_hint(), (0, Some(0)));
    }

    #[test]
    fn empty_drain_returns_none() {
        let mut buffered = queue(0);
        let mut drain = EventDrain::from_drain(buffered.drain(..));
        assert!(drain.next().is_none());
        assert!(drain.next_back().is_none());
    }

    #[test]
    fn debug_format_shows_remaining_count() {
        let mut buffered = queue(2);
        let drain = EventDrain::from_drain(buffered.drain(..));
        assert_eq!(format!("{drain:?}"), "EventDrain { remaining: 2 }");
    }

    #[test]
    fn debug_format_empty_drain() {
        let mut buffered = queue(0);
        let drain = EventDrain::from_drain(buffered.drain(..));
        assert_eq!(format!("{drain:?}"), "EventDrain { remaining: 0 }");
    }

    #[test]
    fn dropping_an_unconsumed_drain_discards_events() {
        let mut buffered = queue(3);
        drop(EventDrain::from_drain(buffered.drain(..)));
        assert!(buffered.is_empty());
    }
}
