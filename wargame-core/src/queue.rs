//! Pending interactions for the current ledger position.
//!
//! The queue is anchored to one node. Submissions made against any other node
//! are stale and rejected, and the queue is only cleared once a round has
//! been committed (or the session has moved away by rollback).

use crate::hash::ContentHash;
use crate::state::{Interaction, InteractionKind};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    #[error("Submission targets {submitted} but the queue is anchored at {anchor}")]
    StaleAnchor {
        anchor: ContentHash,
        submitted: ContentHash,
    },

    #[error("Interaction text is empty")]
    EmptyText,
}

/// What the front-end sees after each submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueState {
    pub anchor: ContentHash,
    pub pending: usize,
    pub info: usize,
    pub feeds: usize,
    pub actions: usize,
}

#[derive(Debug, Clone)]
pub struct InteractionQueue {
    anchor: ContentHash,
    pending: Vec<Interaction>,
}

impl InteractionQueue {
    pub fn new(anchor: ContentHash) -> Self {
        Self {
            anchor,
            pending: Vec::new(),
        }
    }

    pub fn anchor(&self) -> ContentHash {
        self.anchor
    }

    /// Append `interaction` if `anchor` is the node the queue belongs to.
    pub fn enqueue(
        &mut self,
        anchor: &ContentHash,
        interaction: Interaction,
    ) -> Result<QueueState, QueueError> {
        if *anchor != self.anchor {
            return Err(QueueError::StaleAnchor {
                anchor: self.anchor,
                submitted: *anchor,
            });
        }
        if interaction.text.trim().is_empty() {
            return Err(QueueError::EmptyText);
        }

        debug!(
            kind = interaction.kind.label(),
            actor = %interaction.actor,
            "interaction queued"
        );
        self.pending.push(interaction);
        Ok(self.state())
    }

    /// A copy of the pending batch. The queue itself is left untouched.
    pub fn take_snapshot(&self) -> Vec<Interaction> {
        self.pending.clone()
    }

    pub fn pending(&self) -> &[Interaction] {
        &self.pending
    }

    /// Drop everything pending and re-anchor. Returns what was dropped.
    pub fn clear_for(&mut self, anchor: ContentHash) -> Vec<Interaction> {
        self.anchor = anchor;
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn state(&self) -> QueueState {
        let count = |kind: InteractionKind| self.pending.iter().filter(|i| i.kind == kind).count();
        QueueState {
            anchor: self.anchor,
            pending: self.pending.len(),
            info: count(InteractionKind::Info),
            feeds: count(InteractionKind::Feed),
            actions: count(InteractionKind::Action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PlayerRef;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::from_bytes([byte; 32])
    }

    fn alice() -> PlayerRef {
        PlayerRef::new(1, "Alice", "Blue")
    }

    #[test]
    fn test_enqueue_counts_by_kind() {
        let mut queue = InteractionQueue::new(hash(1));
        queue.enqueue(&hash(1), Interaction::feed(alice(), "fog")).unwrap();
        queue.enqueue(&hash(1), Interaction::action(alice(), "advance")).unwrap();
        let state = queue
            .enqueue(&hash(1), Interaction::action(alice(), "dig in"))
            .unwrap();

        assert_eq!(state.pending, 3);
        assert_eq!(state.feeds, 1);
        assert_eq!(state.actions, 2);
        assert_eq!(state.info, 0);
    }

    #[test]
    fn test_stale_anchor_is_rejected() {
        let mut queue = InteractionQueue::new(hash(1));
        let err = queue
            .enqueue(&hash(2), Interaction::info(alice(), "what do I see?"))
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::StaleAnchor {
                anchor: hash(1),
                submitted: hash(2)
            }
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let mut queue = InteractionQueue::new(hash(1));
        let err = queue
            .enqueue(&hash(1), Interaction::action(alice(), "   "))
            .unwrap_err();
        assert_eq!(err, QueueError::EmptyText);
    }

    #[test]
    fn test_snapshot_does_not_clear() {
        let mut queue = InteractionQueue::new(hash(1));
        queue.enqueue(&hash(1), Interaction::action(alice(), "advance")).unwrap();
        let batch = queue.take_snapshot();
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_for_reanchors() {
        let mut queue = InteractionQueue::new(hash(1));
        queue.enqueue(&hash(1), Interaction::action(alice(), "advance")).unwrap();

        let dropped = queue.clear_for(hash(2));
        assert_eq!(dropped.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.anchor(), hash(2));
        assert!(queue.enqueue(&hash(1), Interaction::action(alice(), "x")).is_err());
        assert!(queue.enqueue(&hash(2), Interaction::action(alice(), "x")).is_ok());
    }
}
