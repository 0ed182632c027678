use super::plot::PlotRegistry;
use super::state::PersistentStateTable;
use super::strategy::Strategy;

/// One OHLCV row (§6's external row feed).
#[derive(Clone, Copy, Debug, Default)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Market state plus every piece of mutable engine state a running script
/// touches (§3). Owned by the caller of `feed` and threaded by reference
/// into the tokenizer's downstream consumers — there is exactly one of
/// these per run (§5).
pub struct Context {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub time: i64,
    pub bar_index: i64,
    pub state: PersistentStateTable,
    pub plots: PlotRegistry,
    pub strategy: Strategy,
}

impl Context {
    pub fn new() -> Self {
        Self {
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
            time: 0,
            bar_index: 0,
            state: PersistentStateTable::new(),
            plots: PlotRegistry::new(),
            strategy: Strategy::new(0.0),
        }
    }

    pub fn with_initial_cash(initial_cash: f64) -> Self {
        let mut ctx = Self::new();
        ctx.strategy = Strategy::new(initial_cash);
        ctx
    }

    pub(crate) fn apply_bar(&mut self, bar: Bar) {
        self.time = bar.time;
        self.open = bar.open;
        self.high = bar.high;
        self.low = bar.low;
        self.close = bar.close;
        self.volume = bar.volume;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
