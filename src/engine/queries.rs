use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability;
use super::{Engine, EngineError};

impl Engine {
    /// Current snapshot of a reservation.
    pub async fn reservation(&self, id: &Ulid) -> Option<Reservation> {
        let resource_id = self.resource_for_reservation(id)?;
        let book = self.book(&resource_id)?;
        let guard = book.read().await;
        guard.get(id).cloned()
    }

    /// §4.1 contract: holding reservations that collide with the candidate
    /// interval. `exclude` lets an update-in-place flow ignore its own prior
    /// record. Read-only; unknown resources surface `NotFound`.
    pub async fn find_conflicts(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Reservation>, EngineError> {
        if end <= start {
            return Err(EngineError::Validation("end must be after start"));
        }
        let book = self
            .book(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = book.read().await;
        let span = Span::new(start, end);
        Ok(
            availability::find_conflicts(&guard, &span, exclude, self.config.conflict_mode)
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    /// The parts of the query window not held by any confirmed/active
    /// reservation, optionally dropping windows shorter than `min_duration`.
    pub async fn free_windows(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        min_duration: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        if end <= start {
            return Err(EngineError::Validation("end must be after start"));
        }
        if end - start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let book = self
            .book(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = book.read().await;
        let mut free = availability::free_windows(&guard, &Span::new(start, end));
        if let Some(min) = min_duration {
            free.retain(|span| span.duration_ms() >= min);
        }
        Ok(free)
    }

    /// Every reservation ever made on a resource, in span order.
    pub async fn reservations_for_resource(
        &self,
        resource_id: Ulid,
    ) -> Result<Vec<Reservation>, EngineError> {
        let book = self
            .book(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = book.read().await;
        Ok(guard.reservations.clone())
    }

    pub async fn reservations_for_renter(&self, renter: Ulid) -> Vec<Reservation> {
        self.collect_reservations(|r| r.renter == renter).await
    }

    pub async fn reservations_for_owner(&self, owner: Ulid) -> Vec<Reservation> {
        self.collect_reservations(|r| r.owner == owner).await
    }

    async fn collect_reservations(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let books: Vec<_> = self.books.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for book in books {
            let guard = book.read().await;
            out.extend(guard.reservations.iter().filter(|r| keep(r)).cloned());
        }
        out
    }

    /// All resources, retired ones included.
    pub async fn list_resources(&self) -> Vec<Resource> {
        let books: Vec<_> = self.books.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(books.len());
        for book in books {
            let guard = book.read().await;
            out.push(guard.resource.clone());
        }
        out
    }
}
