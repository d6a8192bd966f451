//! Hard input bounds. Requests outside these are rejected up front with
//! `EngineError::LimitExceeded` rather than clamped.

use crate::model::Ms;

/// Earliest accepted instant (1970-01-01). Negative timestamps are malformed.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest accepted instant (~year 3000). Catches second/nanosecond mixups.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 32_503_680_000_000;

/// Widest single reservation interval: 366 days.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

/// Widest availability query window: 2 years.
pub const MAX_QUERY_WINDOW_MS: Ms = 2 * 366 * 24 * 3_600_000;

/// Reservations retained per resource book (audit log included).
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 50_000;

/// Resources a single engine will track.
pub const MAX_RESOURCES: usize = 100_000;

/// Resource title length in bytes.
pub const MAX_TITLE_LEN: usize = 256;

/// Currency codes are ISO 4217 alpha-3.
pub const CURRENCY_CODE_LEN: usize = 3;
