use thiserror::Error;

use crate::span::Span;

/// A fatal runtime error (§7). Unlike compile diagnostics these abort a
/// running bar loop; they only occur when the persistent-state contract
/// between C4, C5, and C6 (§5) has been violated by the host or by a
/// pathological call-site reordering.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("persistent state slot {slot} at bar {bar_index} was allocated for a different indicator than the one calling it now (call site {call_site:?})")]
    SlotTypeMismatch {
        slot: usize,
        bar_index: i64,
        call_site: Span,
    },
    #[error("undefined stdlib operation '{name}' reached the runtime (call site {call_site:?})")]
    UnknownBuiltin { name: String, call_site: Span },
}
