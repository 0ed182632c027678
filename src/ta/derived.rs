use std::collections::VecDeque;

use crate::runtime::error::RuntimeError;
use crate::runtime::state::PersistentStateTable;
use crate::span::Span;

use super::ema::EmaState;
use super::sma::SmaState;
use super::{MAX_HISTORY, TRIM_MARGIN};

/// Volume-weighted moving average: `sma(source * volume) / sma(volume)`.
/// Implemented as two literal nested `sma` calls so each sub-average
/// consumes its own persistent-state slot, exactly as a script author
/// nesting two `sma()` calls would (§4.6.5).
pub fn vwma(
    table: &mut PersistentStateTable,
    bar_index: i64,
    call_site: Span,
    source: f64,
    volume: f64,
    length: i64,
) -> Result<f64, RuntimeError> {
    let num = table
        .get_or_init_slot::<SmaState>(bar_index, call_site)?
        .update(source * volume, length);
    let den = table
        .get_or_init_slot::<SmaState>(bar_index, call_site)?
        .update(volume, length);
    Ok(num / den)
}

/// MACD line, signal line, and histogram (§4.6.5). The fast and slow EMAs
/// and the signal EMA over their difference each occupy their own slot,
/// in call order: fast, slow, signal.
pub fn macd(
    table: &mut PersistentStateTable,
    bar_index: i64,
    call_site: Span,
    source: f64,
    fast_length: i64,
    slow_length: i64,
    signal_length: i64,
) -> Result<(f64, f64, f64), RuntimeError> {
    let fast = table
        .get_or_init_slot::<EmaState>(bar_index, call_site)?
        .update(source, fast_length);
    let slow = table
        .get_or_init_slot::<EmaState>(bar_index, call_site)?
        .update(source, slow_length);
    let macd_line = fast - slow;
    let signal = table
        .get_or_init_slot::<EmaState>(bar_index, call_site)?
        .update(macd_line, signal_length);
    Ok((macd_line, signal, macd_line - signal))
}

/// Stochastic %K and %D. %K is computed against a self-contained rolling
/// high/low window; %D nests a `sma` call over %K, consuming its own slot
/// (§4.6.5).
#[derive(Default)]
pub struct StochKState {
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
}

impl StochKState {
    fn percent_k(&mut self, close: f64, high: f64, low: f64, length: i64) -> f64 {
        if length <= 0 {
            return f64::NAN;
        }
        let length_u = length as usize;
        self.highs.push_back(high);
        self.lows.push_back(low);
        if self.highs.len() > MAX_HISTORY {
            let keep = length_u + TRIM_MARGIN;
            while self.highs.len() > keep {
                self.highs.pop_front();
                self.lows.pop_front();
            }
        }
        if self.highs.len() < length_u {
            return f64::NAN;
        }
        let start = self.highs.len() - length_u;
        let hh = self.highs.iter().skip(start).fold(f64::MIN, |a, &b| a.max(b));
        let ll = self.lows.iter().skip(start).fold(f64::MAX, |a, &b| a.min(b));
        if hh == ll {
            0.0
        } else {
            100.0 * (close - ll) / (hh - ll)
        }
    }
}

pub fn stoch(
    table: &mut PersistentStateTable,
    bar_index: i64,
    call_site: Span,
    close: f64,
    high: f64,
    low: f64,
    length: i64,
    smooth_d_length: i64,
) -> Result<(f64, f64), RuntimeError> {
    let k = table
        .get_or_init_slot::<StochKState>(bar_index, call_site)?
        .percent_k(close, high, low, length);
    let d = table
        .get_or_init_slot::<SmaState>(bar_index, call_site)?
        .update(k, smooth_d_length);
    Ok((k, d))
}

/// Wilder's relative strength index (§4.6.5). Self-contained: the two
/// Wilder-smoothed averages of gains and losses live inside one slot
/// rather than as two nested `rma` calls, since the spec does not expose
/// gain/loss smoothing as independently callable.
#[derive(Default)]
pub struct RsiState {
    prev_source: Option<f64>,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
    seed_gain_sum: f64,
    seed_loss_sum: f64,
    seed_count: i64,
    prev_length: Option<i64>,
}

impl RsiState {
    pub fn update(&mut self, source: f64, length: i64) -> f64 {
        if length <= 0 {
            self.prev_source = Some(source);
            return f64::NAN;
        }
        if self.prev_length != Some(length) {
            self.avg_gain = None;
            self.avg_loss = None;
            self.seed_gain_sum = 0.0;
            self.seed_loss_sum = 0.0;
            self.seed_count = 0;
            self.prev_length = Some(length);
        }

        let prev = match self.prev_source {
            Some(p) => p,
            None => {
                self.prev_source = Some(source);
                return f64::NAN;
            }
        };
        self.prev_source = Some(source);

        let change = source - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        let result = match (self.avg_gain, self.avg_loss) {
            (Some(ag), Some(al)) => {
                let alpha = 1.0 / length as f64;
                let next_gain = alpha * gain + (1.0 - alpha) * ag;
                let next_loss = alpha * loss + (1.0 - alpha) * al;
                self.avg_gain = Some(next_gain);
                self.avg_loss = Some(next_loss);
                rsi_from_averages(next_gain, next_loss)
            }
            _ => {
                self.seed_gain_sum += gain;
                self.seed_loss_sum += loss;
                self.seed_count += 1;
                if self.seed_count >= length {
                    let ag = self.seed_gain_sum / length as f64;
                    let al = self.seed_loss_sum / length as f64;
                    self.avg_gain = Some(ag);
                    self.avg_loss = Some(al);
                    rsi_from_averages(ag, al)
                } else {
                    f64::NAN
                }
            }
        };
        result
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Momentum: `source - source[length bars ago]` (§4.6.5).
#[derive(Default)]
pub struct MomState {
    history: VecDeque<f64>,
}

impl MomState {
    pub fn update(&mut self, source: f64, length: i64) -> f64 {
        if length <= 0 {
            return f64::NAN;
        }
        let length_u = length as usize;
        self.history.push_back(source);
        if self.history.len() > MAX_HISTORY {
            let keep = length_u + TRIM_MARGIN + 1;
            while self.history.len() > keep {
                self.history.pop_front();
            }
        }
        if self.history.len() <= length_u {
            return f64::NAN;
        }
        let len = self.history.len();
        source - self.history[len - 1 - length_u]
    }
}

/// Commodity channel index over `source` (typically the typical price),
/// self-contained per bar: a rolling SMA and mean-absolute-deviation
/// computed from the same window (§4.6.5).
#[derive(Default)]
pub struct CciState {
    history: VecDeque<f64>,
}

impl CciState {
    pub fn update(&mut self, source: f64, length: i64) -> f64 {
        if length <= 0 {
            return f64::NAN;
        }
        let length_u = length as usize;
        self.history.push_back(source);
        if self.history.len() > MAX_HISTORY {
            let keep = length_u + TRIM_MARGIN;
            while self.history.len() > keep {
                self.history.pop_front();
            }
        }
        if self.history.len() < length_u {
            return f64::NAN;
        }
        let len = self.history.len();
        let start = len - length_u;
        let window = self.history.iter().skip(start);
        let mean: f64 = window.clone().sum::<f64>() / length_u as f64;
        let mean_dev: f64 =
            window.map(|v| (v - mean).abs()).sum::<f64>() / length_u as f64;
        (source - mean) / (0.015 * mean_dev)
    }
}

/// Fixed four-bar symmetrically-weighted moving average, weights
/// `[1, 2, 2, 1] / 6` — length is not parameterized (§4.6.5).
#[derive(Default)]
pub struct SwmaState {
    history: VecDeque<f64>,
}

impl SwmaState {
    pub fn update(&mut self, source: f64) -> f64 {
        self.history.push_back(source);
        while self.history.len() > 4 {
            self.history.pop_front();
        }
        if self.history.len() < 4 {
            return f64::NAN;
        }
        let w = [1.0, 2.0, 2.0, 1.0];
        self.history
            .iter()
            .zip(w.iter())
            .map(|(v, w)| v * w)
            .sum::<f64>()
            / 6.0
    }
}

/// Shared state for the `cross`/`crossover`/`crossunder` family: each
/// tracks the previous pair of values for one `(a, b)` call site (§4.6.5).
#[derive(Default)]
pub struct CrossState {
    prev: Option<(f64, f64)>,
}

impl CrossState {
    fn transition(&mut self, a: f64, b: f64) -> Option<(f64, f64)> {
        let prev = self.prev;
        self.prev = Some((a, b));
        prev
    }

    pub fn crossover(&mut self, a: f64, b: f64) -> bool {
        match self.transition(a, b) {
            Some((pa, pb)) => pa <= pb && a > b,
            None => false,
        }
    }

    pub fn crossunder(&mut self, a: f64, b: f64) -> bool {
        match self.transition(a, b) {
            Some((pa, pb)) => pa >= pb && a < b,
            None => false,
        }
    }

    pub fn cross(&mut self, a: f64, b: f64) -> bool {
        match self.transition(a, b) {
            Some((pa, pb)) => (pa <= pb && a > b) || (pa >= pb && a < b),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;

    fn span() -> Span {
        Span::new(SourceId(0), 0, 0, 1, 0)
    }

    #[test]
    fn vwma_consumes_two_slots() {
        let mut table = PersistentStateTable::new();
        for bar in 0..10 {
            table.reset_call_counter();
            let _ = vwma(&mut table, bar, span(), 10.0 + bar as f64, 100.0, 3).unwrap();
        }
        assert_eq!(table.slot_count(), 2);
    }

    #[test]
    fn macd_consumes_three_slots() {
        let mut table = PersistentStateTable::new();
        for bar in 0..40 {
            table.reset_call_counter();
            let _ = macd(&mut table, bar, span(), 10.0 + bar as f64, 12, 26, 9).unwrap();
        }
        assert_eq!(table.slot_count(), 3);
    }

    #[test]
    fn rsi_is_bounded_0_to_100() {
        let mut r = RsiState::default();
        let mut seed = 1u64;
        let mut price = 100.0;
        let mut last = f64::NAN;
        for _ in 0..500 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            price += ((seed >> 33) as f64 / u32::MAX as f64) - 0.5;
            last = r.update(price, 14);
        }
        assert!(last >= 0.0 && last <= 100.0);
    }

    #[test]
    fn mom_matches_naive_difference() {
        let values: Vec<f64> = (1..=20).map(|i| i as f64 * 1.5).collect();
        let mut m = MomState::default();
        for (i, &v) in values.iter().enumerate() {
            let out = m.update(v, 5);
            if i >= 5 {
                assert!((out - (v - values[i - 5])).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn swma_is_nan_until_four_bars() {
        let mut s = SwmaState::default();
        assert!(s.update(1.0).is_nan());
        assert!(s.update(2.0).is_nan());
        assert!(s.update(3.0).is_nan());
        let out = s.update(4.0);
        assert!((out - (1.0 + 2.0 * 2.0 + 2.0 * 3.0 + 4.0) / 6.0).abs() < 1e-9);
    }

    #[test]
    fn crossover_detects_upward_cross_only() {
        let mut c = CrossState::default();
        assert!(!c.crossover(1.0, 2.0));
        assert!(!c.crossover(2.0, 2.0));
        assert!(c.crossover(3.0, 2.0));
        assert!(!c.crossover(4.0, 2.0));
    }

    #[test]
    fn crossunder_detects_downward_cross_only() {
        let mut c = CrossState::default();
        c.crossunder(5.0, 2.0);
        assert!(c.crossunder(1.0, 2.0));
        assert!(!c.crossunder(0.5, 2.0));
    }
}
