//! Per-conversation message collections.
//!
//! Each conversation holds one ordered, deduplicated message sequence.
//! Ordering is by `sent_at`, with ties broken by arrival order; a message is
//! never re-sorted after initial placement, so the rendered list does not
//! jump when equal timestamps arrive.

use classline_shared::{DeliveryState, Message};

/// Result of reconciling an optimistic record against its confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfirmOutcome {
    /// The temp record was rewritten to the server id.
    Replaced,
    /// The push echo already delivered the confirmed id; the temp record
    /// was removed instead of duplicated.
    Collapsed,
    /// No record with the temp id exists (conversation torn down mid-send).
    Missing,
}

/// Messages for a single conversation.
#[derive(Debug, Default, Clone)]
pub(crate) struct ConversationMessages {
    messages: Vec<Message>,
}

impl ConversationMessages {
    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Insert in sorted position. Returns false on a duplicate id, leaving
    /// the collection untouched.
    pub(crate) fn add(&mut self, msg: Message) -> bool {
        if self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }
        // Upper bound keeps equal timestamps in arrival order.
        let pos = self.messages.partition_point(|m| m.sent_at <= msg.sent_at);
        self.messages.insert(pos, msg);
        true
    }

    /// Replace the history with the authoritative server list, re-merging
    /// any locally-pending (Sending or Failed) records the server does not
    /// know about yet so an in-flight send is not lost by a refresh.
    pub(crate) fn set_history(&mut self, mut history: Vec<Message>) {
        history.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        let pending: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| {
                matches!(m.delivery, DeliveryState::Sending | DeliveryState::Failed)
                    && !history.iter().any(|h| h.id == m.id)
            })
            .cloned()
            .collect();
        self.messages = history;
        for msg in pending {
            self.add(msg);
        }
    }

    /// Reconcile the optimistic record `temp_id` with the server-confirmed
    /// message. Exactly one final record remains regardless of whether the
    /// push echo of the same send arrived first.
    pub(crate) fn confirm(&mut self, temp_id: &str, confirmed: Message) -> ConfirmOutcome {
        let Some(idx) = self.messages.iter().position(|m| m.id == temp_id) else {
            return ConfirmOutcome::Missing;
        };
        if self.messages.iter().any(|m| m.id == confirmed.id) {
            self.messages.remove(idx);
            return ConfirmOutcome::Collapsed;
        }
        // The server timestamp may differ from the echo's; remove and
        // re-insert so the record lands in its canonical position.
        self.messages.remove(idx);
        self.add(confirmed);
        ConfirmOutcome::Replaced
    }

    /// Mark the optimistic record as failed. It stays visible with the
    /// failure marker; retrying is the caller's decision.
    pub(crate) fn fail(&mut self, temp_id: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == temp_id) {
            Some(msg) => {
                msg.delivery = DeliveryState::Failed;
                true
            }
            None => false,
        }
    }

    /// Flip every settled message to `Read`. Pending and failed records are
    /// not part of the read-state ladder.
    pub(crate) fn mark_read(&mut self) -> bool {
        let mut changed = false;
        for msg in &mut self.messages {
            if matches!(msg.delivery, DeliveryState::Sent | DeliveryState::Delivered) {
                msg.delivery = DeliveryState::Read;
                changed = true;
            }
        }
        changed
    }
}
