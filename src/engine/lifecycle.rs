use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::warn;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::payment::GatewayError;

use super::availability::{check_creation_conflict, check_no_conflict, now_ms, validate_span};
use super::pricing::quote;
use super::refund::{compute_refund, refund_for_fraction};
use super::{Engine, EngineError};

/// Command objects, one per transition — each carries only the fields its
/// transition legitimately changes.
#[derive(Debug, Clone)]
pub struct ListResource {
    pub id: Ulid,
    pub owner: Ulid,
    pub title: Option<String>,
    pub tiers: PricingTiers,
    pub delivery: DeliveryTerms,
    pub policy: BookingPolicy,
}

#[derive(Debug, Clone)]
pub struct UpdateResource {
    pub id: Ulid,
    pub actor: Ulid,
    pub title: Option<String>,
    pub tiers: PricingTiers,
    pub delivery: DeliveryTerms,
    pub policy: BookingPolicy,
}

#[derive(Debug, Clone)]
pub struct RequestReservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub renter: Ulid,
    pub start: Ms,
    pub end: Ms,
    /// Whether the renter asked for delivery.
    pub delivery: bool,
}

/// What a single sweep pass applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub started: usize,
    pub completed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired + self.started + self.completed
    }
}

#[derive(Debug, Clone, Copy)]
enum DueTransition {
    Expire,
    Start,
    Complete,
}

fn record_command(command: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "err" };
    metrics::counter!(observability::COMMANDS_TOTAL, "command" => command, "status" => status)
        .increment(1);
}

impl Engine {
    // ── Resource commands ────────────────────────────────────────

    pub async fn list_resource(&self, cmd: ListResource) -> Result<(), EngineError> {
        if self.books.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if let Some(ref t) = cmd.title
            && t.len() > MAX_TITLE_LEN {
                return Err(EngineError::LimitExceeded("resource title too long"));
            }
        if cmd.tiers.currency.len() != CURRENCY_CODE_LEN {
            return Err(EngineError::Validation("currency must be an ISO 4217 alpha-3 code"));
        }
        if self.books.contains_key(&cmd.id) {
            return Err(EngineError::Validation("resource already listed"));
        }

        let event = Event::ResourceListed {
            id: cmd.id,
            owner: cmd.owner,
            title: cmd.title.clone(),
            tiers: cmd.tiers.clone(),
            delivery: cmd.delivery.clone(),
            policy: cmd.policy.clone(),
        };
        self.store.record(&event).await?;
        let book = Book::new(Resource {
            id: cmd.id,
            owner: cmd.owner,
            title: cmd.title,
            tiers: cmd.tiers,
            delivery: cmd.delivery,
            policy: cmd.policy,
            retired: false,
        });
        self.books.insert(cmd.id, Arc::new(RwLock::new(book)));
        metrics::gauge!(observability::RESOURCES_ACTIVE).increment(1.0);
        Ok(())
    }

    /// Pricing, delivery terms, and policy are owner-mutable. Existing
    /// reservations keep their snapshot; only future quotes change.
    pub async fn update_resource(&self, cmd: UpdateResource) -> Result<(), EngineError> {
        if let Some(ref t) = cmd.title
            && t.len() > MAX_TITLE_LEN {
                return Err(EngineError::LimitExceeded("resource title too long"));
            }
        if cmd.tiers.currency.len() != CURRENCY_CODE_LEN {
            return Err(EngineError::Validation("currency must be an ISO 4217 alpha-3 code"));
        }
        let book = self.book(&cmd.id).ok_or(EngineError::NotFound(cmd.id))?;
        let mut guard = book.write_owned().await;
        if cmd.actor != guard.resource.owner {
            return Err(EngineError::Authorization("only the owner may update a resource"));
        }
        if guard.resource.retired {
            return Err(EngineError::Validation("resource is retired"));
        }

        let event = Event::ResourceUpdated {
            id: cmd.id,
            title: cmd.title,
            tiers: cmd.tiers,
            delivery: cmd.delivery,
            policy: cmd.policy,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Soft delete: the book and its reservations stay (in-flight lifecycles
    /// continue, history is retained) but no new requests are accepted.
    pub async fn retire_resource(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let book = self.book(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = book.write_owned().await;
        if actor != guard.resource.owner {
            return Err(EngineError::Authorization("only the owner may retire a resource"));
        }
        if guard.resource.retired {
            return Ok(()); // idempotent
        }

        let event = Event::ResourceRetired { id };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Reservation commands ─────────────────────────────────────

    /// Create a reservation request. On success the returned snapshot is
    /// `Pending` (or already `Confirmed` for instant-book resources; if the
    /// instant capture failed, the snapshot shows `Pending` with payment
    /// state `Failed` and the owner-side `approve` can retry).
    pub async fn request(&self, cmd: RequestReservation) -> Result<Reservation, EngineError> {
        let result = self.request_inner(cmd).await;
        record_command("request", result.is_ok());
        result
    }

    async fn request_inner(&self, cmd: RequestReservation) -> Result<Reservation, EngineError> {
        let now = now_ms();
        if cmd.end <= cmd.start {
            return Err(EngineError::Validation("end must be after start"));
        }
        if cmd.start < now {
            return Err(EngineError::Validation("start is in the past"));
        }
        let span = Span::new(cmd.start, cmd.end);
        validate_span(&span)?;

        let book = self
            .book(&cmd.resource_id)
            .ok_or(EngineError::NotFound(cmd.resource_id))?;
        let mut guard = book.write_owned().await;

        if guard.resource.retired {
            // Soft-deleted resources accept no new reservations
            return Err(EngineError::NotFound(cmd.resource_id));
        }
        if cmd.renter == guard.resource.owner {
            return Err(EngineError::Validation("renter cannot book their own resource"));
        }
        let policy = &guard.resource.policy;
        if let Some(min) = policy.min_period
            && span.duration_ms() < min {
                return Err(EngineError::Validation("interval shorter than the minimum rental period"));
            }
        if let Some(max) = policy.max_period
            && span.duration_ms() > max {
                return Err(EngineError::Validation("interval longer than the maximum rental period"));
            }
        if let Some(window) = policy.advance_window
            && span.start - now > window {
                return Err(EngineError::Validation("start is beyond the advance booking window"));
            }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }

        if let Err(e) = check_creation_conflict(
            &guard,
            &span,
            now,
            self.config.approval_window,
            self.config.conflict_mode,
        ) {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let pricing = quote(&guard.resource, &span, cmd.delivery, self.fees.as_ref())?;
        let payment_ref = self
            .pay(
                self.gateway
                    .authorize(pricing.total, &pricing.currency, cmd.renter),
                "authorize",
            )
            .await
            .map_err(EngineError::Payment)?;

        let instant = guard.resource.policy.instant_book;
        let reservation = Reservation {
            id: cmd.id,
            reference: Reservation::reference_code(&cmd.id),
            resource_id: cmd.resource_id,
            renter: cmd.renter,
            owner: guard.resource.owner,
            span,
            status: ReservationStatus::Pending,
            pricing,
            payment: PaymentRecord::authorized(payment_ref),
            requested_at: now,
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
        };
        let event = Event::ReservationRequested { reservation };
        self.persist_and_apply(&mut guard, &event).await?;

        if instant
            && let Err(e) = self.confirm_pending(&mut guard, cmd.id, now).await {
                // The request itself stands; the capture failure is recorded
                // on the reservation and approve can retry.
                warn!("instant-book capture failed for {}: {e}", cmd.id);
            }

        Ok(guard
            .get(&cmd.id)
            .cloned()
            .expect("reservation just inserted"))
    }

    /// Owner approves a pending request. Idempotent when already confirmed.
    pub async fn approve(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let result = self.approve_inner(id, actor).await;
        record_command("approve", result.is_ok());
        result
    }

    async fn approve_inner(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let (_resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let owner = guard.get(&id).ok_or(EngineError::NotFound(id))?.owner;
        if actor != owner {
            return Err(EngineError::Authorization("only the owner may approve"));
        }
        self.confirm_pending(&mut guard, id, now_ms()).await.map(|_| ())
    }

    /// Shared pending→confirmed step: re-check conflicts (another overlapping
    /// reservation may have been confirmed since creation), then capture.
    async fn confirm_pending(
        &self,
        book: &mut Book,
        id: Ulid,
        now: Ms,
    ) -> Result<bool, EngineError> {
        let r = book.get(&id).ok_or(EngineError::NotFound(id))?;
        match r.status {
            ReservationStatus::Confirmed => return Ok(false), // idempotent
            ReservationStatus::Pending => {}
            from => return Err(EngineError::StateTransition { from, event: "approve" }),
        }
        let span = r.span;
        let payment_ref = r
            .payment
            .reference
            .clone()
            .ok_or_else(|| EngineError::Payment("missing payment authorization".into()))?;

        check_no_conflict(book, &span, Some(id), self.config.conflict_mode)?;

        match self.pay(self.gateway.capture(&payment_ref), "capture").await {
            Ok(()) => {
                self.persist_and_apply(book, &Event::ReservationApproved { id, at: now })
                    .await?;
                Ok(true)
            }
            Err(reason) => {
                // Keep the failure in the audit trail; status stays pending
                // so the transition has no partial effect.
                self.persist_and_apply(
                    book,
                    &Event::PaymentFailed {
                        id,
                        reason: reason.clone(),
                    },
                )
                .await?;
                Err(EngineError::Payment(reason))
            }
        }
    }

    /// Owner declines a pending request. Nothing was captured, so nothing is
    /// refunded. Idempotent when already cancelled.
    pub async fn reject(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let result = self.reject_inner(id, actor).await;
        record_command("reject", result.is_ok());
        result
    }

    async fn reject_inner(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let (_resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let r = guard.get(&id).ok_or(EngineError::NotFound(id))?;
        if actor != r.owner {
            return Err(EngineError::Authorization("only the owner may reject"));
        }
        match r.status {
            ReservationStatus::Cancelled => Ok(()), // idempotent
            ReservationStatus::Pending => {
                let event = Event::ReservationRejected { id, at: now_ms() };
                self.persist_and_apply(&mut guard, &event).await
            }
            from => Err(EngineError::StateTransition { from, event: "reject" }),
        }
    }

    /// Cancel by the renter or the owner. Pending reservations cancel free of
    /// charge (nothing captured yet); confirmed/active ones are refunded per
    /// the policy in `engine::refund`. Idempotent when already cancelled.
    pub async fn cancel(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let result = self.cancel_inner(id, actor).await;
        record_command("cancel", result.is_ok());
        result
    }

    async fn cancel_inner(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let (_resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let r = guard.get(&id).ok_or(EngineError::NotFound(id))?;
        let by = if actor == r.renter {
            CancelParty::Renter
        } else if actor == r.owner {
            CancelParty::Owner
        } else {
            return Err(EngineError::Authorization("only the renter or owner may cancel"));
        };
        let now = now_ms();

        match r.status {
            ReservationStatus::Cancelled => Ok(()), // idempotent
            ReservationStatus::Pending => {
                let event = Event::ReservationCancelled {
                    id,
                    at: now,
                    by,
                    refund: None,
                };
                self.persist_and_apply(&mut guard, &event).await
            }
            ReservationStatus::Confirmed | ReservationStatus::Active => {
                let pricing = r.pricing.clone();
                let start = r.span.start;
                let payment_ref = r.payment.reference.clone();

                let breakdown = compute_refund(&pricing, start, by, now);
                let refund = if breakdown.is_zero() {
                    None
                } else {
                    let reason = match by {
                        CancelParty::Renter => "renter_cancellation",
                        CancelParty::Owner => "owner_cancellation",
                    };
                    Some(
                        self.issue_refund(payment_ref, breakdown.amount, breakdown.service_fee_refund, reason, now)
                            .await?,
                    )
                };
                let event = Event::ReservationCancelled {
                    id,
                    at: now,
                    by,
                    refund,
                };
                self.persist_and_apply(&mut guard, &event).await
            }
            from => Err(EngineError::StateTransition { from, event: "cancel" }),
        }
    }

    /// Raise a dispute, freezing automatic transitions until resolution.
    /// Idempotent when already disputed.
    pub async fn dispute(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let result = self.dispute_inner(id, actor).await;
        record_command("dispute", result.is_ok());
        result
    }

    async fn dispute_inner(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let (_resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let r = guard.get(&id).ok_or(EngineError::NotFound(id))?;
        if actor != r.renter && actor != r.owner {
            return Err(EngineError::Authorization("only the renter or owner may dispute"));
        }
        match r.status {
            ReservationStatus::Disputed => Ok(()), // idempotent
            ReservationStatus::Confirmed | ReservationStatus::Active => {
                self.persist_and_apply(&mut guard, &Event::ReservationDisputed { id })
                    .await
            }
            from => Err(EngineError::StateTransition { from, event: "dispute" }),
        }
    }

    /// Apply an external dispute-resolution decision. The resolution policy
    /// and its actor are out of scope; the engine trusts the caller.
    pub async fn resolve_dispute(
        &self,
        id: Ulid,
        resolution: Resolution,
    ) -> Result<(), EngineError> {
        let result = self.resolve_dispute_inner(id, resolution).await;
        record_command("resolve_dispute", result.is_ok());
        result
    }

    async fn resolve_dispute_inner(
        &self,
        id: Ulid,
        resolution: Resolution,
    ) -> Result<(), EngineError> {
        let (_resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let r = guard.get(&id).ok_or(EngineError::NotFound(id))?;
        if r.status != ReservationStatus::Disputed {
            return Err(EngineError::StateTransition {
                from: r.status,
                event: "resolve",
            });
        }
        let now = now_ms();

        let event = match resolution {
            Resolution::Complete => Event::DisputeResolved {
                id,
                outcome: ResolvedOutcome::Completed,
                at: now,
                refund: None,
            },
            Resolution::Cancel { refund_fraction } => {
                if refund_fraction < Decimal::ZERO || refund_fraction > Decimal::ONE {
                    return Err(EngineError::Validation("refund fraction must be between 0 and 1"));
                }
                let pricing = r.pricing.clone();
                let payment_ref = r.payment.reference.clone();
                let breakdown = refund_for_fraction(&pricing, refund_fraction);
                let refund = if breakdown.is_zero() {
                    None
                } else {
                    Some(
                        self.issue_refund(
                            payment_ref,
                            breakdown.amount,
                            breakdown.service_fee_refund,
                            "dispute_resolution",
                            now,
                        )
                        .await?,
                    )
                };
                Event::DisputeResolved {
                    id,
                    outcome: ResolvedOutcome::Cancelled,
                    at: now,
                    refund,
                }
            }
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    async fn issue_refund(
        &self,
        payment_ref: Option<PaymentRef>,
        amount: Decimal,
        service_fee_refund: Decimal,
        reason: &str,
        now: Ms,
    ) -> Result<RefundRecord, EngineError> {
        let payment_ref =
            payment_ref.ok_or_else(|| EngineError::Payment("missing payment reference".into()))?;
        let reference = self
            .pay(self.gateway.refund(&payment_ref, amount), "refund")
            .await
            .map_err(EngineError::Payment)?;
        Ok(RefundRecord {
            reason: reason.into(),
            amount,
            service_fee_refund,
            processed_at: now,
            reference: Some(reference),
        })
    }

    /// Run a gateway call under the configured timeout, reducing both
    /// failure shapes to a message.
    async fn pay<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
        what: &str,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.config.payment_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                metrics::counter!(observability::PAYMENT_FAILURES_TOTAL).increment(1);
                Err(format!("{what}: {e}"))
            }
            Err(_) => {
                metrics::counter!(observability::PAYMENT_FAILURES_TOTAL).increment(1);
                Err(format!("{what} timed out"))
            }
        }
    }

    // ── Time-driven transitions ──────────────────────────────────

    /// One sweep pass at `now`: expire pending reservations whose approval
    /// window elapsed, activate confirmed ones whose start has been reached,
    /// complete active ones whose end has passed. Deterministic — the
    /// background task in `sweep` just calls this on an interval, which
    /// bounds how stale these transitions can be.
    pub async fn sweep_once(&self, now: Ms) -> SweepReport {
        let mut due: Vec<(Ulid, DueTransition)> = Vec::new();
        for entry in self.books.iter() {
            let book = entry.value().clone();
            if let Ok(guard) = book.try_read() {
                for r in &guard.reservations {
                    match r.status {
                        ReservationStatus::Pending
                            if now >= r.requested_at + self.config.approval_window =>
                        {
                            due.push((r.id, DueTransition::Expire))
                        }
                        ReservationStatus::Confirmed if now >= r.span.start => {
                            due.push((r.id, DueTransition::Start))
                        }
                        ReservationStatus::Active if now >= r.span.end => {
                            due.push((r.id, DueTransition::Complete))
                        }
                        _ => {}
                    }
                }
            }
        }

        let mut report = SweepReport::default();
        for (id, transition) in due {
            match self.apply_due(id, transition, now).await {
                Ok(true) => {
                    let label = match transition {
                        DueTransition::Expire => {
                            report.expired += 1;
                            "expire"
                        }
                        DueTransition::Start => {
                            report.started += 1;
                            "start"
                        }
                        DueTransition::Complete => {
                            report.completed += 1;
                            "complete"
                        }
                    };
                    metrics::counter!(
                        observability::SWEEP_TRANSITIONS_TOTAL,
                        "transition" => label
                    )
                    .increment(1);
                }
                Ok(false) => {} // state moved on between collect and apply
                Err(e) => tracing::debug!("sweep skip {id}: {e}"),
            }
        }
        metrics::counter!(observability::SWEEP_RUNS_TOTAL).increment(1);
        report
    }

    /// Re-validate under the write lock, then apply. The collect phase ran
    /// on a read snapshot and may be stale.
    async fn apply_due(
        &self,
        id: Ulid,
        transition: DueTransition,
        now: Ms,
    ) -> Result<bool, EngineError> {
        let (_resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let r = guard.get(&id).ok_or(EngineError::NotFound(id))?;
        let (status, requested_at, span) = (r.status, r.requested_at, r.span);

        let event = match (transition, status) {
            (DueTransition::Expire, ReservationStatus::Pending)
                if now >= requested_at + self.config.approval_window =>
            {
                Event::ReservationExpired { id, at: now }
            }
            (DueTransition::Start, ReservationStatus::Confirmed) if now >= span.start => {
                Event::ReservationStarted { id }
            }
            (DueTransition::Complete, ReservationStatus::Active) if now >= span.end => {
                Event::ReservationCompleted { id, at: now }
            }
            _ => return Ok(false),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(true)
    }
}
