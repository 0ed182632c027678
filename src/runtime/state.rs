use std::any::Any;

use crate::span::Span;

use super::error::RuntimeError;

/// Per-call-site persistent state (§3, §4.5). Slots are allocated the
/// first time a call site is visited and reused for its lifetime; a
/// monotone counter keyed to visitation order — not to lexical identity —
/// is what lets the same table back an arbitrary tree-walk.
#[derive(Default)]
pub struct PersistentStateTable {
    slots: Vec<Box<dyn Any>>,
    counter: usize,
}

impl PersistentStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the call counter at the start of a bar (§4.4's pre-step).
    /// Slots themselves are never cleared; only the cursor into them.
    pub fn reset_call_counter(&mut self) {
        self.counter = 0;
    }

    /// Fetch (creating via `factory` on first visit) the slot for the
    /// call site at the current counter position, then advance the
    /// counter. A type mismatch against a previously-allocated slot means
    /// the call-site visitation order diverged between bars — a fatal
    /// desynchronization (§7), not something this table defends against
    /// beyond reporting it.
    pub fn get_or_init_slot<T: Default + 'static>(
        &mut self,
        bar_index: i64,
        call_site: Span,
    ) -> Result<&mut T, RuntimeError> {
        let idx = self.counter;
        self.counter += 1;
        if idx == self.slots.len() {
            tracing::trace!(slot = idx, bar_index, "allocating persistent state slot");
            self.slots.push(Box::new(T::default()));
        }
        self.slots[idx]
            .downcast_mut::<T>()
            .ok_or(RuntimeError::SlotTypeMismatch {
                slot: idx,
                bar_index,
                call_site,
            })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;

    fn span() -> Span {
        Span::new(SourceId(0), 0, 0, 1, 0)
    }

    #[derive(Default)]
    struct Counter(i32);

    #[test]
    fn slots_allocated_in_first_seen_order_and_reused() {
        let mut table = PersistentStateTable::new();
        table.reset_call_counter();
        {
            let a = table.get_or_init_slot::<Counter>(0, span()).unwrap();
            a.0 += 1;
        }
        {
            let b = table.get_or_init_slot::<Counter>(0, span()).unwrap();
            b.0 += 10;
        }
        assert_eq!(table.slot_count(), 2);

        table.reset_call_counter();
        let a = table.get_or_init_slot::<Counter>(1, span()).unwrap();
        assert_eq!(a.0, 1);
        let b = table.get_or_init_slot::<Counter>(1, span()).unwrap();
        assert_eq!(b.0, 10);
        assert_eq!(table.slot_count(), 2);
    }

    #[test]
    fn type_mismatch_is_fatal() {
        let mut table = PersistentStateTable::new();
        table.reset_call_counter();
        let _ = table.get_or_init_slot::<Counter>(0, span()).unwrap();
        table.reset_call_counter();
        let err = table.get_or_init_slot::<f64>(1, span());
        assert!(matches!(err, Err(RuntimeError::SlotTypeMismatch { .. })));
    }
}
