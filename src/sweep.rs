use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::Engine;

/// Background task that advances time-driven transitions. Runs
/// `Engine::sweep_once` every `EngineConfig::sweep_interval`, which bounds
/// how long a due expiry/activation/completion can go unapplied.
pub async fn run_sweep(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(engine.config().sweep_interval);
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let report = engine.sweep_once(now).await;
        if report.total() > 0 {
            info!(
                "sweep: {} expired, {} started, {} completed",
                report.expired, report.started, report.completed
            );
        }
    }
}

/// Background task that compacts the journal once enough records accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        interval.tick().await;
        let records = engine.records_since_compact().await;
        if records < threshold {
            continue;
        }
        debug!("compacting journal after {records} records");
        match engine.compact().await {
            Ok(()) => info!("journal compacted"),
            Err(e) => tracing::warn!("journal compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rust_decimal_macros::dec;
    use ulid::Ulid;

    use crate::config::EngineConfig;
    use crate::engine::{ListResource, MemStore, RequestReservation};
    use crate::fees::NoFees;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::payment::NoopGateway;

    const H: Ms = 3_600_000;

    fn now() -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as Ms
    }

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(
            Arc::new(MemStore::new()),
            Arc::new(NoopGateway),
            Arc::new(NoFees),
            Arc::new(NotifyHub::new()),
            EngineConfig {
                sweep_interval: Duration::from_millis(20),
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn background_sweep_activates_confirmed_reservation() {
        let engine = engine();
        let owner = Ulid::new();
        let renter = Ulid::new();
        let resource_id = Ulid::new();
        engine
            .list_resource(ListResource {
                id: resource_id,
                owner,
                title: None,
                tiers: PricingTiers {
                    hourly: Some(dec!(5)),
                    ..Default::default()
                },
                delivery: DeliveryTerms::default(),
                policy: BookingPolicy::default(),
            })
            .await
            .unwrap();

        // Starts almost immediately so the sweep picks it up fast
        let start = now() + 300;
        let reservation_id = Ulid::new();
        engine
            .request(RequestReservation {
                id: reservation_id,
                resource_id,
                renter,
                start,
                end: start + H,
                delivery: false,
            })
            .await
            .unwrap();
        engine.approve(reservation_id, owner).await.unwrap();

        let handle = tokio::spawn(run_sweep(engine.clone()));

        // Within a few sweep intervals the reservation must go active.
        let mut status = ReservationStatus::Confirmed;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            status = engine.reservation(&reservation_id).await.unwrap().status;
            if status == ReservationStatus::Active {
                break;
            }
        }
        handle.abort();
        assert_eq!(status, ReservationStatus::Active);
    }
}
