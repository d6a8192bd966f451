//! berth — a reservation engine for shared physical resources.
//!
//! The engine decides whether a time-bound request against a resource can be
//! granted, what it costs, and how the reservation evolves from request to
//! completion or cancellation. No two confirmed/active reservations on one
//! resource ever overlap; pricing is snapshotted at creation; cancellations
//! are refunded by a time-based policy.
//!
//! Everything external is injected: a [`engine::ReservationStore`] for
//! durability, a [`payment::PaymentGateway`] for money movement, a
//! [`fees::FeeSchedule`] for platform fees, and a [`notify::NotifyHub`] that
//! fans lifecycle notices out to subscribers. Time-driven transitions
//! (expiry, activation, completion) are advanced by [`sweep::run_sweep`] or
//! directly via [`engine::Engine::sweep_once`].

pub mod config;
pub mod engine;
pub mod fees;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod payment;
pub mod sweep;

pub use config::EngineConfig;
pub use engine::{
    ConflictMode, Engine, EngineError, ListResource, MemStore, RequestReservation,
    ReservationStore, SweepReport, UpdateResource, WalStore,
};
pub use model::{Reservation, ReservationStatus, Resource};
