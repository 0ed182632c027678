use std::collections::VecDeque;

use super::{HEAL_INTERVAL_SUM, MAX_HISTORY, TRIM_MARGIN};

/// O(1)-amortized simple moving average with healing and dynamic-length
/// rebuild (§4.6.1).
#[derive(Default)]
pub struct SmaState {
    history: VecDeque<f64>,
    sum: f64,
    prev_length: Option<i64>,
    updates_since_heal: u32,
}

impl SmaState {
    pub fn update(&mut self, source: f64, length: i64) -> f64 {
        if length <= 0 {
            return f64::NAN;
        }
        let length_u = length as usize;
        self.history.push_back(source);

        if self.prev_length != Some(length) {
            self.recompute(length_u);
            self.prev_length = Some(length);
            self.updates_since_heal = 0;
        } else {
            self.sum += source;
            let len = self.history.len();
            if len > length_u {
                self.sum -= self.history[len - 1 - length_u];
            }
            self.updates_since_heal += 1;
            if self.updates_since_heal >= HEAL_INTERVAL_SUM {
                tracing::trace!(length, "sma healing: recomputing sum from history");
                self.recompute(length_u);
                self.updates_since_heal = 0;
            }
        }

        self.trim(length_u);

        if self.history.len() < length_u {
            f64::NAN
        } else {
            self.sum / length as f64
        }
    }

    fn recompute(&mut self, length: usize) {
        let len = self.history.len();
        let start = len.saturating_sub(length);
        self.sum = self.history.iter().skip(start).sum();
    }

    fn trim(&mut self, length: usize) {
        if self.history.len() > MAX_HISTORY {
            let keep = length + TRIM_MARGIN;
            while self.history.len() > keep {
                self.history.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_sma(values: &[f64], length: usize) -> f64 {
        let window = &values[values.len() - length..];
        window.iter().sum::<f64>() / length as f64
    }

    #[test]
    fn warm_up_returns_nan_until_enough_samples() {
        let mut s = SmaState::default();
        assert!(s.update(1.0, 3).is_nan());
        assert!(s.update(2.0, 3).is_nan());
        assert!((s.update(3.0, 3) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn constant_series_matches_naive_mean() {
        let mut s = SmaState::default();
        let mut out = f64::NAN;
        for _ in 0..200 {
            out = s.update(100.0, 14);
        }
        assert!((out - 100.0).abs() < 1e-9);
    }

    #[test]
    fn streaming_matches_naive_over_random_walk() {
        let mut values = Vec::new();
        let mut seed = 12345u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as f64 / u32::MAX as f64) - 0.5
        };
        let mut price = 100.0;
        for _ in 0..2000 {
            price += next();
            values.push(price);
        }

        let mut s = SmaState::default();
        for (i, &v) in values.iter().enumerate() {
            let out = s.update(v, 20);
            if i + 1 >= 20 {
                let expected = naive_sma(&values[..=i], 20);
                assert!((out - expected).abs() < 1e-6, "at {i}: {out} vs {expected}");
            }
        }
    }

    #[test]
    fn dynamic_length_schedule_matches_naive() {
        let mut values = Vec::new();
        let mut seed = 99u64;
        let mut next_price = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as f64 / u32::MAX as f64) - 0.5
        };
        let mut price = 50.0;
        for _ in 0..5000 {
            price += next_price();
            values.push(price);
        }

        let mut s = SmaState::default();
        let mut seed2 = 7u64;
        for (i, &v) in values.iter().enumerate() {
            seed2 = seed2.wrapping_mul(6364136223846793005).wrapping_add(1);
            let length = 2 + ((seed2 >> 40) % 44) as i64;
            let out = s.update(v, length);
            if i >= 100 && (i as i64) + 1 >= length {
                let expected = naive_sma(&values[..=i], length as usize);
                assert!(
                    (out - expected).abs() < 1e-6,
                    "at {i} length {length}: {out} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn nonpositive_length_returns_nan() {
        let mut s = SmaState::default();
        assert!(s.update(1.0, 0).is_nan());
        assert!(s.update(1.0, -5).is_nan());
    }
}
