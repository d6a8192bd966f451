use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("interval too wide"));
    }
    Ok(())
}

/// How two intervals are tested for collision.
///
/// `HalfOpen` is the intended contract: `[a,b)` vs `[c,d)` collide iff
/// `a < d && c < b`, so back-to-back reservations sharing a boundary instant
/// do not conflict. `Inclusive` reproduces the source system's `<=`/`>=`
/// test, which rejects touching boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictMode {
    #[default]
    HalfOpen,
    Inclusive,
}

impl ConflictMode {
    pub fn collides(&self, a: &Span, b: &Span) -> bool {
        match self {
            ConflictMode::HalfOpen => a.overlaps(b),
            ConflictMode::Inclusive => a.start <= b.end && b.start <= a.end,
        }
    }
}

/// Inclusive bounds also collide with records that merely touch the
/// candidate, which the half-open book scan would skip — widen by 1ms.
fn scan_window(candidate: &Span, mode: ConflictMode) -> Span {
    match mode {
        ConflictMode::HalfOpen => *candidate,
        ConflictMode::Inclusive => Span::new(
            candidate.start.saturating_sub(1),
            candidate.end.saturating_add(1),
        ),
    }
}

/// All reservations holding their interval (`confirmed`/`active`) that
/// collide with `candidate` under `mode`. `exclude` lets an update-in-place
/// operation ignore its own prior record. Read-only.
pub fn find_conflicts<'a>(
    book: &'a Book,
    candidate: &Span,
    exclude: Option<Ulid>,
    mode: ConflictMode,
) -> Vec<&'a Reservation> {
    let scan = scan_window(candidate, mode);
    book.overlapping(&scan)
        .filter(|r| r.status.holds_interval())
        .filter(|r| exclude != Some(r.id))
        .filter(|r| mode.collides(&r.span, candidate))
        .collect()
}

/// Fail with `Conflict` naming the first colliding reservation, if any.
pub(crate) fn check_no_conflict(
    book: &Book,
    candidate: &Span,
    exclude: Option<Ulid>,
    mode: ConflictMode,
) -> Result<(), EngineError> {
    match find_conflicts(book, candidate, exclude, mode).first() {
        Some(hit) => Err(EngineError::Conflict(hit.id)),
        None => Ok(()),
    }
}

/// Creation-time check. A pending request holds its slot until its approval
/// window lapses, then stops counting even before the sweep expires it —
/// two concurrent overlapping requests must not both be accepted.
pub(crate) fn check_creation_conflict(
    book: &Book,
    candidate: &Span,
    now: Ms,
    approval_window: Ms,
    mode: ConflictMode,
) -> Result<(), EngineError> {
    let scan = scan_window(candidate, mode);
    for r in book.overlapping(&scan) {
        let blocks = match r.status {
            ReservationStatus::Confirmed | ReservationStatus::Active => true,
            ReservationStatus::Pending => now < r.requested_at + approval_window,
            _ => false,
        };
        if blocks && mode.collides(&r.span, candidate) {
            return Err(EngineError::Conflict(r.id));
        }
    }
    Ok(())
}

// ── Free-window computation ──────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Subtract sorted `to_remove` intervals from sorted `base` intervals.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

/// The parts of `query` not held by any confirmed/active reservation.
pub fn free_windows(book: &Book, query: &Span) -> Vec<Span> {
    let mut held: Vec<Span> = book
        .overlapping(query)
        .filter(|r| r.status.holds_interval())
        .map(|r| {
            Span::new(
                r.span.start.max(query.start),
                r.span.end.min(query.end),
            )
        })
        .collect();
    held.sort_by_key(|s| s.start);
    let held = merge_overlapping(&held);
    subtract_intervals(&[*query], &held)
}
