//! Reassembly of multi-part command responses.
//!
//! Long command replies (the `players` table on a busy server) arrive as
//! several fragments sharing one sequence, each carrying a `{total, index}`
//! subheader. UDP may reorder, duplicate or drop fragments; this module
//! buffers what arrives and emits the concatenated payload once every slot
//! is filled. Incomplete buffers are garbage-collected so a lost fragment
//! cannot pin memory: the originating command times out and resends under
//! a fresh sequence.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};

/// How long an incomplete buffer may wait for its remaining fragments.
const ENTRY_TTL: Duration = Duration::from_secs(10);

/// One partially received multi-part response.
#[derive(Debug)]
struct PartialResponse {
    parts: Vec<Option<Vec<u8>>>,
    filled: usize,
    created_at: Instant,
}

impl PartialResponse {
    fn new(total: u8, created_at: Instant) -> Self {
        Self {
            parts: vec![None; usize::from(total)],
            filled: 0,
            created_at,
        }
    }

    fn total(&self) -> u8 {
        self.parts.len() as u8
    }

    fn is_complete(&self) -> bool {
        self.filled == self.parts.len()
    }

    fn assemble(self) -> Vec<u8> {
        let mut payload = Vec::new();
        for part in self.parts.into_iter().flatten() {
            payload.extend_from_slice(&part);
        }
        payload
    }
}

/// Buffers multi-part command responses keyed by sequence.
#[derive(Debug, Default)]
pub(crate) struct Reassembler {
    entries: BTreeMap<u8, PartialResponse>,
}

impl Reassembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores one fragment. Returns the assembled payload once all
    /// fragments of the sequence are present.
    ///
    /// Duplicate deliveries of a `(sequence, index)` slot retain the first
    /// write. A fragment whose `total` disagrees with the stored buffer is
    /// a protocol violation: the buffer is dropped and the fragment is
    /// ignored, leaving recovery to the command resend path.
    pub(crate) fn insert(
        &mut self,
        sequence: u8,
        total: u8,
        index: u8,
        data: Vec<u8>,
        now: Instant,
    ) -> Option<Vec<u8>> {
        if total == 0 || index >= total {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Reassembly,
                "fragment {}/{} of sequence {} is out of range",
                index,
                total,
                sequence
            );
            return None;
        }

        let entry = self
            .entries
            .entry(sequence)
            .or_insert_with(|| PartialResponse::new(total, now));
        if entry.total() != total {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Reassembly,
                "part count changed for sequence {} ({} -> {}); dropping buffer",
                sequence,
                entry.total(),
                total
            );
            self.entries.remove(&sequence);
            return None;
        }

        let slot = &mut entry.parts[usize::from(index)];
        if slot.is_some() {
            trace!(sequence, index, "duplicate fragment ignored");
        } else {
            *slot = Some(data);
            entry.filled += 1;
        }

        if entry.is_complete() {
            let entry = self.entries.remove(&sequence)?;
            trace!(sequence, parts = entry.total(), "response reassembled");
            Some(entry.assemble())
        } else {
            None
        }
    }

    /// Drops any buffer held for the given sequence. Called when the
    /// sequence is retired or reallocated to a new command.
    pub(crate) fn clear(&mut self, sequence: u8) {
        if self.entries.remove(&sequence).is_some() {
            trace!(sequence, "reassembly buffer cleared");
        }
    }

    /// Drops every buffer. Called when the session resets.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
    }

    /// Drops buffers that have waited longer than the entry TTL.
    pub(crate) fn collect_garbage(&mut self, now: Instant) {
        self.entries.retain(|sequence, entry| {
            let expired = now.duration_since(entry.created_at) >= ENTRY_TTL;
            if expired {
                trace!(
                    sequence,
                    filled = entry.filled,
                    total = entry.total(),
                    "incomplete response expired"
                );
            }
            !expired
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
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

    fn now() -> Instant {
        Instant::now()
    }

    #[test]
    fn single_part_passes_through_unchanged() {
        let mut r = Reassembler::new();
        let assembled = r.insert(1, 1, 0, b"hello".to_vec(), now());
        assert_eq!(assembled, Some(b"hello".to_vec()));
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn in_order_assembly() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(7, 2, 0, b"hello".to_vec(), now()), None);
        assert_eq!(
            r.insert(7, 2, 1, b" world".to_vec(), now()),
            Some(b"hello world".to_vec())
        );
    }

    #[test]
    fn out_of_order_assembly() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(7, 2, 1, b" world".to_vec(), now()), None);
        assert_eq!(
            r.insert(7, 2, 0, b"hello".to_vec(), now()),
            Some(b"hello world".to_vec())
        );
    }

    #[test]
    fn duplicate_fragment_retains_first() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(3, 2, 0, b"first".to_vec(), now()), None);
        assert_eq!(r.insert(3, 2, 0, b"first".to_vec(), now()), None);
        assert_eq!(
            r.insert(3, 2, 1, b"!".to_vec(), now()),
            Some(b"first!".to_vec())
        );
    }

    #[test]
    fn conflicting_total_drops_buffer_and_fragment() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(9, 3, 0, b"a".to_vec(), now()), None);
        assert_eq!(r.insert(9, 2, 1, b"b".to_vec(), now()), None);
        assert_eq!(r.len(), 0, "conflicting buffer should be dropped");
        // The sequence starts fresh afterwards.
        assert_eq!(r.insert(9, 2, 0, b"x".to_vec(), now()), None);
        assert_eq!(r.insert(9, 2, 1, b"y".to_vec(), now()), Some(b"xy".to_vec()));
    }

    #[test]
    fn out_of_range_index_ignored() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(4, 2, 2, b"junk".to_vec(), now()), None);
        assert_eq!(r.insert(4, 0, 0, b"junk".to_vec(), now()), None);
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn distinct_sequences_do_not_interfere() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(1, 2, 0, b"a".to_vec(), now()), None);
        assert_eq!(r.insert(2, 2, 0, b"c".to_vec(), now()), None);
        assert_eq!(r.insert(1, 2, 1, b"b".to_vec(), now()), Some(b"ab".to_vec()));
        assert_eq!(r.insert(2, 2, 1, b"d".to_vec(), now()), Some(b"cd".to_vec()));
    }

    #[test]
    fn clear_discards_partial_state() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(5, 2, 0, b"old".to_vec(), now()), None);
        r.clear(5);
        assert_eq!(r.insert(5, 2, 1, b"new".to_vec(), now()), None);
        assert_eq!(r.len(), 1, "cleared sequence restarts from scratch");
    }

    #[test]
    fn garbage_collection_expires_stale_entries() {
        let mut r = Reassembler::new();
        let start = now();
        assert_eq!(r.insert(6, 2, 0, b"stale".to_vec(), start), None);

        r.collect_garbage(start + Duration::from_secs(5));
        assert_eq!(r.len(), 1, "young entries survive");

        r.collect_garbage(start + Duration::from_secs(11));
        assert_eq!(r.len(), 0, "stale entries expire");
    }

    #[test]
    fn empty_fragments_are_valid() {
        let mut r = Reassembler::new();
        assert_eq!(r.insert(8, 2, 0, Vec::new(), now()), None);
        assert_eq!(r.insert(8, 2, 1, b"tail".to_vec(), now()), Some(b"tail".to_vec()));
    }
}
