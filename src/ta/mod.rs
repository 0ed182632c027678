//! The streaming technical-analysis engine (C6, §4.6) — the hardest
//! subsystem in the crate. Every indicator here shares the dynamic-length
//! discipline described in §4.6: a window length that changes bar to bar
//! must either trigger an O(N) rebuild or be detected and handled
//! specially, never silently corrupt the O(1) incremental path.

pub mod derived;
pub mod ema;
pub mod extrema;
pub mod sma;
pub mod variance;
pub mod wma;

/// History ring buffers never grow past this before being trimmed back
/// down to `length + TRIM_MARGIN` (§4.6.1, §5's memory discipline).
pub(crate) const MAX_HISTORY: usize = 5000;
pub(crate) const TRIM_MARGIN: usize = 500;

/// Full-recompute interval for sum-based aggregates (SMA, WMA): cancels
/// linearly-accumulated floating-point drift (§4.6.1, §9).
pub(crate) const HEAL_INTERVAL_SUM: u32 = 200;
/// Variance accumulates drift faster than a plain sum, so it heals on a
/// shorter cadence (§4.6.2).
pub(crate) const HEAL_INTERVAL_VARIANCE: u32 = 50;

pub use derived::*;
pub use ema::EmaState;
pub use extrema::ExtremaState;
pub use sma::SmaState;
pub use variance::VarianceState;
pub use wma::WmaState;
