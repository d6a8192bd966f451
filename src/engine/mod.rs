mod availability;
mod error;
mod lifecycle;
mod pricing;
mod queries;
mod refund;
mod store;

pub use availability::{
    find_conflicts, free_windows, merge_overlapping, subtract_intervals, ConflictMode,
};
pub use error::EngineError;
pub use lifecycle::{ListResource, RequestReservation, SweepReport, UpdateResource};
pub use pricing::{base_amount, quote};
pub use refund::{compute_refund, refund_for_fraction, RefundBreakdown};
pub use store::{MemStore, ReservationStore, WalStore};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::fees::FeeSchedule;
use crate::model::*;
use crate::notify::{LifecycleNotice, NoticeKind, NotifyHub};
use crate::payment::PaymentGateway;

pub type SharedBook = Arc<RwLock<Book>>;

/// The reservation engine. Owns one book per resource and orchestrates the
/// pricing, availability, and refund components against the injected
/// store/gateway/fee-schedule collaborators.
pub struct Engine {
    books: DashMap<Ulid, SharedBook>,
    /// Reverse lookup: reservation id → resource id.
    reservation_to_resource: DashMap<Ulid, Ulid>,
    store: Arc<dyn ReservationStore>,
    gateway: Arc<dyn PaymentGateway>,
    fees: Arc<dyn FeeSchedule>,
    pub notify: Arc<NotifyHub>,
    config: EngineConfig,
}

/// Apply an event directly to a Book (no locking — caller holds the lock).
fn apply_to_book(book: &mut Book, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationRequested { reservation } => {
            index.insert(reservation.id, reservation.resource_id);
            book.insert(reservation.clone());
        }
        Event::ReservationApproved { id, at } => {
            if let Some(r) = book.get_mut(id) {
                r.status = ReservationStatus::Confirmed;
                r.confirmed_at.get_or_insert(*at);
                r.payment.state = PaymentState::Paid;
            }
        }
        Event::ReservationRejected { id, at } => {
            if let Some(r) = book.get_mut(id) {
                r.status = ReservationStatus::Cancelled;
                r.cancelled_at.get_or_insert(*at);
            }
        }
        Event::ReservationCancelled { id, at, refund, .. } => {
            if let Some(r) = book.get_mut(id) {
                r.status = ReservationStatus::Cancelled;
                r.cancelled_at.get_or_insert(*at);
                apply_refund(r, refund);
            }
        }
        Event::ReservationExpired { id, at } => {
            if let Some(r) = book.get_mut(id) {
                r.status = ReservationStatus::Expired;
                // The cancelled-at-equivalent timestamp for expiry
                r.cancelled_at.get_or_insert(*at);
            }
        }
        Event::ReservationStarted { id } => {
            if let Some(r) = book.get_mut(id) {
                r.status = ReservationStatus::Active;
            }
        }
        Event::ReservationCompleted { id, at } => {
            if let Some(r) = book.get_mut(id) {
                r.status = ReservationStatus::Completed;
                r.completed_at.get_or_insert(*at);
            }
        }
        Event::ReservationDisputed { id } => {
            if let Some(r) = book.get_mut(id) {
                r.status = ReservationStatus::Disputed;
            }
        }
        Event::DisputeResolved {
            id,
            outcome,
            at,
            refund,
        } => {
            if let Some(r) = book.get_mut(id) {
                match outcome {
                    ResolvedOutcome::Completed => {
                        r.status = ReservationStatus::Completed;
                        r.completed_at.get_or_insert(*at);
                    }
                    ResolvedOutcome::Cancelled => {
                        r.status = ReservationStatus::Cancelled;
                        r.cancelled_at.get_or_insert(*at);
                    }
                }
                apply_refund(r, refund);
            }
        }
        Event::PaymentFailed { id, .. } => {
            if let Some(r) = book.get_mut(id) {
                r.payment.state = PaymentState::Failed;
            }
        }
        Event::ResourceUpdated {
            title,
            tiers,
            delivery,
            policy,
            ..
        } => {
            book.resource.title = title.clone();
            book.resource.tiers = tiers.clone();
            book.resource.delivery = delivery.clone();
            book.resource.policy = policy.clone();
        }
        Event::ResourceRetired { .. } => {
            book.resource.retired = true;
        }
        // Handled at the books-map level, not here
        Event::ResourceListed { .. } => {}
    }
}

fn apply_refund(r: &mut Reservation, refund: &Option<RefundRecord>) {
    if let Some(record) = refund {
        r.payment.state = if record.amount >= r.pricing.total {
            PaymentState::Refunded
        } else {
            PaymentState::PartiallyRefunded
        };
        r.payment.refund = Some(record.clone());
    }
}

impl Engine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        gateway: Arc<dyn PaymentGateway>,
        fees: Arc<dyn FeeSchedule>,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> Self {
        let engine = Self {
            books: DashMap::new(),
            reservation_to_resource: DashMap::new(),
            store,
            gateway,
            fees,
            notify,
            config,
        };

        // Replay — we are the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because construction may run inside an async context.
        for event in engine.store.recorded() {
            match &event {
                Event::ResourceListed {
                    id,
                    owner,
                    title,
                    tiers,
                    delivery,
                    policy,
                } => {
                    let book = Book::new(Resource {
                        id: *id,
                        owner: *owner,
                        title: title.clone(),
                        tiers: tiers.clone(),
                        delivery: delivery.clone(),
                        policy: policy.clone(),
                        retired: false,
                    });
                    engine.books.insert(*id, Arc::new(RwLock::new(book)));
                }
                other => {
                    let resource_id = match other {
                        Event::ResourceUpdated { id, .. } | Event::ResourceRetired { id } => {
                            Some(*id)
                        }
                        Event::ReservationRequested { reservation } => {
                            Some(reservation.resource_id)
                        }
                        _ => other
                            .reservation_id()
                            .and_then(|rid| engine.reservation_to_resource.get(&rid).map(|e| *e)),
                    };
                    if let Some(resource_id) = resource_id
                        && let Some(entry) = engine.books.get(&resource_id) {
                            let book = entry.value().clone();
                            let mut guard =
                                book.try_write().expect("replay: uncontended write");
                            apply_to_book(&mut guard, other, &engine.reservation_to_resource);
                        }
                }
            }
        }
        metrics::gauge!(crate::observability::RESOURCES_ACTIVE)
            .set(engine.books.len() as f64);

        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn book(&self, id: &Ulid) -> Option<SharedBook> {
        self.books.get(id).map(|e| e.value().clone())
    }

    pub fn resource_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_resource
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// Record + apply + notify in one call. The store must acknowledge the
    /// event before it mutates the book or reaches any subscriber.
    pub(super) async fn persist_and_apply(
        &self,
        book: &mut Book,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.store.record(event).await?;
        apply_to_book(book, event, &self.reservation_to_resource);
        if let Some(notice) = notice_for(book, event) {
            self.notify.send(notice);
        }
        Ok(())
    }

    /// Lookup reservation → resource, fetch the book, acquire the write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<Book>), EngineError> {
        let resource_id = self
            .resource_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let book = self
            .book(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = book.write_owned().await;
        Ok((resource_id, guard))
    }

    /// Compact the journal down to the events needed to recreate the books.
    /// Reservation snapshots carry their full current state, so one
    /// `ReservationRequested` per reservation suffices.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let book_arcs: Vec<SharedBook> =
            self.books.iter().map(|e| e.value().clone()).collect();
        for book in book_arcs {
            let guard = book.read().await;
            let r = &guard.resource;
            events.push(Event::ResourceListed {
                id: r.id,
                owner: r.owner,
                title: r.title.clone(),
                tiers: r.tiers.clone(),
                delivery: r.delivery.clone(),
                policy: r.policy.clone(),
            });
            if r.retired {
                events.push(Event::ResourceRetired { id: r.id });
            }
            for reservation in &guard.reservations {
                events.push(Event::ReservationRequested {
                    reservation: reservation.clone(),
                });
            }
        }
        self.store.compact(events).await
    }

    pub async fn records_since_compact(&self) -> u64 {
        self.store.records_since_compact().await
    }
}

/// Which external notice a just-applied event produces, if any.
fn notice_for(book: &Book, event: &Event) -> Option<LifecycleNotice> {
    let kind = match event {
        Event::ReservationRequested { .. } => NoticeKind::Requested,
        Event::ReservationApproved { .. } => NoticeKind::Confirmed,
        Event::ReservationRejected { .. } | Event::ReservationCancelled { .. } => {
            NoticeKind::Cancelled
        }
        Event::ReservationExpired { .. } => NoticeKind::Expired,
        Event::ReservationCompleted { .. } => NoticeKind::Completed,
        Event::ReservationDisputed { .. } => NoticeKind::Disputed,
        Event::DisputeResolved { outcome, .. } => match outcome {
            ResolvedOutcome::Completed => NoticeKind::Completed,
            ResolvedOutcome::Cancelled => NoticeKind::Cancelled,
        },
        Event::ReservationStarted { .. }
        | Event::PaymentFailed { .. }
        | Event::ResourceListed { .. }
        | Event::ResourceUpdated { .. }
        | Event::ResourceRetired { .. } => return None,
    };
    let id = event.reservation_id()?;
    let reservation = book.get(&id)?;
    Some(LifecycleNotice {
        reservation_id: id,
        resource_id: book.resource.id,
        reference: reservation.reference.clone(),
        kind,
    })
}
