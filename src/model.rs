use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Resource ─────────────────────────────────────────────────────

/// Unit rates by rental duration bucket, plus the fixed deposit.
/// A resource is bookable only if at least one rate is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTiers {
    pub hourly: Option<Decimal>,
    pub daily: Option<Decimal>,
    pub weekly: Option<Decimal>,
    pub monthly: Option<Decimal>,
    pub deposit: Decimal,
    pub currency: String,
}

impl PricingTiers {
    pub fn bookable(&self) -> bool {
        self.hourly.is_some()
            || self.daily.is_some()
            || self.weekly.is_some()
            || self.monthly.is_some()
    }
}

impl Default for PricingTiers {
    fn default() -> Self {
        Self {
            hourly: None,
            daily: None,
            weekly: None,
            monthly: None,
            deposit: Decimal::ZERO,
            currency: "USD".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTerms {
    pub available: bool,
    pub fee: Decimal,
}

/// Owner-set constraints on what requests the resource accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingPolicy {
    /// Shortest accepted rental duration.
    pub min_period: Option<Ms>,
    /// Longest accepted rental duration.
    pub max_period: Option<Ms>,
    /// How far ahead of `now` the start instant may lie.
    pub advance_window: Option<Ms>,
    /// Skip owner approval: requests are confirmed (and captured) immediately.
    pub instant_book: bool,
}

/// A shareable item owned by exactly one user. Never physically deleted while
/// reservations reference it — `retired` is the soft-delete flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub owner: Ulid,
    pub title: Option<String>,
    pub tiers: PricingTiers,
    pub delivery: DeliveryTerms,
    pub policy: BookingPolicy,
    pub retired: bool,
}

// ── Reservation ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
    Disputed,
    Expired,
}

impl ReservationStatus {
    /// Terminal states accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    /// Whether this status makes the interval unavailable to others.
    pub fn holds_interval(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState {
    Pending,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

/// Opaque gateway handle for an authorized payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRef(pub String);

/// Opaque gateway handle for an issued refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRef(pub String);

/// Which party requested a cancellation. Drives the refund policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelParty {
    Renter,
    Owner,
}

/// Monetary snapshot taken once at creation. Protects the renter from later
/// price changes on the resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base: Decimal,
    pub deposit: Decimal,
    pub service_fee: Decimal,
    pub delivery_fee: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
    pub currency: String,
}

/// Present only after a refund has been issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub reason: String,
    pub amount: Decimal,
    pub service_fee_refund: Decimal,
    pub processed_at: Ms,
    pub reference: Option<RefundRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub reference: Option<PaymentRef>,
    pub state: PaymentState,
    pub refund: Option<RefundRecord>,
}

impl PaymentRecord {
    pub fn authorized(reference: PaymentRef) -> Self {
        Self {
            reference: Some(reference),
            state: PaymentState::Pending,
            refund: None,
        }
    }
}

/// The unit the engine allocates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    /// Human-readable reference code, derived from `id` so replay reproduces it.
    pub reference: String,
    pub resource_id: Ulid,
    pub renter: Ulid,
    /// Denormalized from the resource at creation time; never equals `renter`.
    pub owner: Ulid,
    pub span: Span,
    pub status: ReservationStatus,
    pub pricing: PriceBreakdown,
    pub payment: PaymentRecord,
    pub requested_at: Ms,
    pub confirmed_at: Option<Ms>,
    pub cancelled_at: Option<Ms>,
    pub completed_at: Option<Ms>,
}

impl Reservation {
    /// "BK" + the random tail of the ulid. Stable across journal replay.
    pub fn reference_code(id: &Ulid) -> String {
        let s = id.to_string();
        format!("BK{}", &s[s.len() - 8..])
    }
}

// ── Book ─────────────────────────────────────────────────────────

/// Per-resource unit of locking: the resource plus every reservation ever
/// made against it, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct Book {
    pub resource: Resource,
    pub reservations: Vec<Reservation>,
}

impl Book {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| &r.id == id)
    }

    pub fn get_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| &r.id == id)
    }

    /// Reservations whose span overlaps the query window, regardless of status.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

// ── Dispute resolution ───────────────────────────────────────────

/// External dispute-resolution decision handed to the engine. The resolution
/// policy itself is out of scope; the engine only applies the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    /// Close out as completed; the owner keeps the payment.
    Complete,
    /// Cancel, refunding the given fraction of the total (`0..=1`).
    Cancel { refund_fraction: Decimal },
}

/// Where a resolved dispute landed. Recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedOutcome {
    Completed,
    Cancelled,
}

// ── Journal events ───────────────────────────────────────────────

/// The event types — flat, no nesting beyond value structs. This is the
/// journal record format; replaying from empty state rebuilds every book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ResourceListed {
        id: Ulid,
        owner: Ulid,
        title: Option<String>,
        tiers: PricingTiers,
        delivery: DeliveryTerms,
        policy: BookingPolicy,
    },
    ResourceUpdated {
        id: Ulid,
        title: Option<String>,
        tiers: PricingTiers,
        delivery: DeliveryTerms,
        policy: BookingPolicy,
    },
    ResourceRetired {
        id: Ulid,
    },
    /// Full snapshot: the pricing breakdown is computed exactly once, here.
    ReservationRequested {
        reservation: Reservation,
    },
    ReservationApproved {
        id: Ulid,
        at: Ms,
    },
    ReservationRejected {
        id: Ulid,
        at: Ms,
    },
    ReservationCancelled {
        id: Ulid,
        at: Ms,
        by: CancelParty,
        refund: Option<RefundRecord>,
    },
    ReservationExpired {
        id: Ulid,
        at: Ms,
    },
    ReservationStarted {
        id: Ulid,
    },
    ReservationCompleted {
        id: Ulid,
        at: Ms,
    },
    ReservationDisputed {
        id: Ulid,
    },
    DisputeResolved {
        id: Ulid,
        outcome: ResolvedOutcome,
        at: Ms,
        refund: Option<RefundRecord>,
    },
    PaymentFailed {
        id: Ulid,
        reason: String,
    },
}

impl Event {
    /// The reservation a lifecycle event refers to, if any.
    pub fn reservation_id(&self) -> Option<Ulid> {
        match self {
            Event::ReservationRequested { reservation } => Some(reservation.id),
            Event::ReservationApproved { id, .. }
            | Event::ReservationRejected { id, .. }
            | Event::ReservationCancelled { id, .. }
            | Event::ReservationExpired { id, .. }
            | Event::ReservationStarted { id }
            | Event::ReservationCompleted { id, .. }
            | Event::ReservationDisputed { id }
            | Event::DisputeResolved { id, .. }
            | Event::PaymentFailed { id, .. } => Some(*id),
            Event::ResourceListed { .. }
            | Event::ResourceUpdated { .. }
            | Event::ResourceRetired { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tiers_daily(rate: Decimal) -> PricingTiers {
        PricingTiers {
            daily: Some(rate),
            ..Default::default()
        }
    }

    fn resource(owner: Ulid) -> Resource {
        Resource {
            id: Ulid::new(),
            owner,
            title: Some("Ladder".into()),
            tiers: tiers_daily(dec!(25)),
            delivery: DeliveryTerms::default(),
            policy: BookingPolicy::default(),
            retired: false,
        }
    }

    fn reservation(start: Ms, end: Ms, status: ReservationStatus) -> Reservation {
        let id = Ulid::new();
        Reservation {
            id,
            reference: Reservation::reference_code(&id),
            resource_id: Ulid::new(),
            renter: Ulid::new(),
            owner: Ulid::new(),
            span: Span::new(start, end),
            status,
            pricing: PriceBreakdown {
                base: dec!(25),
                deposit: Decimal::ZERO,
                service_fee: Decimal::ZERO,
                delivery_fee: Decimal::ZERO,
                taxes: Decimal::ZERO,
                total: dec!(25),
                currency: "USD".into(),
            },
            payment: PaymentRecord {
                reference: None,
                state: PaymentState::Pending,
                refund: None,
            },
            requested_at: 0,
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn status_classification() {
        use ReservationStatus::*;
        for s in [Completed, Cancelled, Expired] {
            assert!(s.is_terminal());
            assert!(!s.holds_interval());
        }
        for s in [Confirmed, Active] {
            assert!(s.holds_interval());
            assert!(!s.is_terminal());
        }
        assert!(!Pending.holds_interval());
        assert!(!Disputed.is_terminal());
    }

    #[test]
    fn tiers_bookable_requires_any_rate() {
        assert!(!PricingTiers::default().bookable());
        assert!(tiers_daily(dec!(10)).bookable());
        let hourly_only = PricingTiers {
            hourly: Some(dec!(2)),
            ..Default::default()
        };
        assert!(hourly_only.bookable());
    }

    #[test]
    fn reference_code_is_stable() {
        let id = Ulid::new();
        let a = Reservation::reference_code(&id);
        let b = Reservation::reference_code(&id);
        assert_eq!(a, b);
        assert!(a.starts_with("BK"));
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn book_insert_keeps_order() {
        let mut book = Book::new(resource(Ulid::new()));
        book.insert(reservation(300, 400, ReservationStatus::Pending));
        book.insert(reservation(100, 200, ReservationStatus::Confirmed));
        book.insert(reservation(200, 300, ReservationStatus::Active));
        let starts: Vec<Ms> = book.reservations.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn book_overlapping_skips_disjoint() {
        let mut book = Book::new(resource(Ulid::new()));
        book.insert(reservation(100, 200, ReservationStatus::Confirmed));
        book.insert(reservation(450, 600, ReservationStatus::Confirmed));
        book.insert(reservation(1000, 1100, ReservationStatus::Confirmed));

        let hits: Vec<_> = book.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn book_overlapping_adjacent_not_included() {
        let mut book = Book::new(resource(Ulid::new()));
        book.insert(reservation(100, 200, ReservationStatus::Confirmed));
        let hits: Vec<_> = book.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn book_get_mut_finds_by_id() {
        let mut book = Book::new(resource(Ulid::new()));
        let r = reservation(100, 200, ReservationStatus::Pending);
        let id = r.id;
        book.insert(r);
        book.get_mut(&id).unwrap().status = ReservationStatus::Confirmed;
        assert_eq!(book.get(&id).unwrap().status, ReservationStatus::Confirmed);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationRequested {
            reservation: reservation(1000, 2000, ReservationStatus::Pending),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn event_reservation_id_extraction() {
        let r = reservation(0, 10, ReservationStatus::Pending);
        let rid = r.id;
        assert_eq!(
            Event::ReservationRequested { reservation: r }.reservation_id(),
            Some(rid)
        );
        assert_eq!(
            Event::ResourceRetired { id: Ulid::new() }.reservation_id(),
            None
        );
    }
}
