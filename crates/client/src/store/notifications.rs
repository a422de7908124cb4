//! The notification collection.
//!
//! Held newest-first. Identity is the server id when present; push frames
//! without one carry a client fallback id, and those are additionally
//! deduplicated by `(title, created_at)` so a fallback entry and the later
//! server-identified copy of the same logical notification never display
//! twice.

use classline_shared::Notification;

#[derive(Debug, Default, Clone)]
pub(crate) struct NotificationList {
    items: Vec<Notification>,
}

impl NotificationList {
    pub(crate) fn items(&self) -> &[Notification] {
        &self.items
    }

    pub(crate) fn unread(&self) -> u32 {
        self.items.iter().filter(|n| !n.is_read).count() as u32
    }

    /// Insert a push notification at the head. Idempotent on duplicate
    /// delivery: a known id is a no-op, and fallback-id entries collide by
    /// content. A server id arriving for a logical notification we already
    /// hold under a fallback id rewrites the id in place, keeping the
    /// entry's read state.
    pub(crate) fn insert_event(&mut self, incoming: Notification) -> bool {
        if self.items.iter().any(|n| n.id == incoming.id) {
            return false;
        }
        if incoming.has_fallback_id() {
            if self.items.iter().any(|n| Self::same_logical(n, &incoming)) {
                return false;
            }
        } else if let Some(existing) = self
            .items
            .iter_mut()
            .find(|n| n.has_fallback_id() && Self::same_logical(n, &incoming))
        {
            existing.id = incoming.id;
            return true;
        }
        self.items.insert(0, incoming);
        true
    }

    /// Replace with the authoritative server list, newest first. Fallback
    /// entries the server list does not account for are re-merged so a push
    /// notification is not dropped by a refresh that has not caught up yet.
    pub(crate) fn set_history(&mut self, mut history: Vec<Notification>) {
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let unmatched: Vec<Notification> = self
            .items
            .iter()
            .filter(|n| {
                n.has_fallback_id() && !history.iter().any(|h| Self::same_logical(h, n))
            })
            .cloned()
            .collect();
        self.items = history;
        for n in unmatched {
            let pos = self
                .items
                .partition_point(|existing| existing.created_at > n.created_at);
            self.items.insert(pos, n);
        }
    }

    /// The only automatic path that flips `is_read`, and it only ever moves
    /// false to true.
    pub(crate) fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id && !n.is_read) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    /// Explicit, intentional reversal. Never invoked by the real-time layer
    /// itself.
    pub(crate) fn mark_unread(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id && n.is_read) {
            Some(n) => {
                n.is_read = false;
                true
            }
            None => false,
        }
    }

    fn same_logical(a: &Notification, b: &Notification) -> bool {
        a.title == b.title && a.created_at == b.created_at
    }
}
