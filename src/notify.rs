use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

/// Lifecycle event emitted to the external notification/messaging service.
/// Delivery is fire-and-forget: a full or missing channel never rolls back
/// the reservation state that produced the notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleNotice {
    pub reservation_id: Ulid,
    pub resource_id: Ulid,
    /// Human-readable reference for message templating.
    pub reference: String,
    pub kind: NoticeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Requested,
    Confirmed,
    Cancelled,
    Completed,
    Expired,
    Disputed,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Requested => "reservation_requested",
            NoticeKind::Confirmed => "reservation_confirmed",
            NoticeKind::Cancelled => "reservation_cancelled",
            NoticeKind::Completed => "reservation_completed",
            NoticeKind::Expired => "reservation_expired",
            NoticeKind::Disputed => "reservation_disputed",
        }
    }
}

/// Broadcast hub for lifecycle notices, one channel per resource.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<LifecycleNotice>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notices for a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<LifecycleNotice> {
        let sender = self
            .channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notice. No-op if nobody is listening.
    pub fn send(&self, notice: LifecycleNotice) {
        if let Some(sender) = self.channels.get(&notice.resource_id) {
            let _ = sender.send(notice);
        }
    }

    /// Remove a channel (e.g. when a resource is retired).
    pub fn remove(&self, resource_id: &Ulid) {
        self.channels.remove(resource_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(resource_id: Ulid, kind: NoticeKind) -> LifecycleNotice {
        let reservation_id = Ulid::new();
        LifecycleNotice {
            reservation_id,
            resource_id,
            reference: crate::model::Reservation::reference_code(&reservation_id),
            kind,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);

        let sent = notice(rid, NoticeKind::Requested);
        hub.send(sent.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — must not panic or block
        hub.send(notice(Ulid::new(), NoticeKind::Cancelled));
    }

    #[test]
    fn notice_kinds_name_lifecycle_events() {
        assert_eq!(NoticeKind::Requested.as_str(), "reservation_requested");
        assert_eq!(NoticeKind::Completed.as_str(), "reservation_completed");
    }
}
