use std::collections::VecDeque;

use super::{HEAL_INTERVAL_SUM, MAX_HISTORY, TRIM_MARGIN};

/// Linearly-weighted moving average (§4.6.1). The O(1) recurrence for a
/// weighted sum only holds when the window was already full on the
/// previous bar and `length` hasn't changed; any other transition falls
/// back to an O(N) rebuild from trailing history.
#[derive(Default)]
pub struct WmaState {
    history: VecDeque<f64>,
    weighted_sum: f64,
    plain_sum: f64,
    prev_length: Option<i64>,
    updates_since_heal: u32,
}

impl WmaState {
    pub fn update(&mut self, source: f64, length: i64) -> f64 {
        if length <= 0 {
            return f64::NAN;
        }
        let length_u = length as usize;
        let was_full = self.history.len() >= length_u;
        let length_unchanged = self.prev_length == Some(length);

        self.history.push_back(source);

        if length_unchanged && was_full {
            let len = self.history.len();
            let exiting = self.history[len - 1 - length_u];
            self.weighted_sum += length as f64 * source - self.plain_sum;
            self.plain_sum += source - exiting;
            self.updates_since_heal += 1;
            if self.updates_since_heal >= HEAL_INTERVAL_SUM {
                tracing::trace!(length, "wma healing: recomputing weighted sum from history");
                self.rebuild(length_u);
                self.updates_since_heal = 0;
            }
        } else {
            self.rebuild(length_u);
            self.updates_since_heal = 0;
        }

        self.prev_length = Some(length);
        self.trim(length_u);

        if self.history.len() < length_u {
            f64::NAN
        } else {
            let denom = (length_u * (length_u + 1) / 2) as f64;
            self.weighted_sum / denom
        }
    }

    fn rebuild(&mut self, length: usize) {
        let len = self.history.len();
        let start = len.saturating_sub(length);
        self.plain_sum = 0.0;
        self.weighted_sum = 0.0;
        for (i, &v) in self.history.iter().skip(start).enumerate() {
            let weight = (i + 1) as f64;
            self.plain_sum += v;
            self.weighted_sum += weight * v;
        }
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

    fn naive_wma(values: &[f64], length: usize) -> f64 {
        let window = &values[values.len() - length..];
        let denom = (length * (length + 1) / 2) as f64;
        let num: f64 = window
            .iter()
            .enumerate()
            .map(|(i, &v)| (i + 1) as f64 * v)
            .sum();
        num / denom
    }

    #[test]
    fn warm_up_returns_nan_until_enough_samples() {
        let mut w = WmaState::default();
        assert!(w.update(1.0, 3).is_nan());
        assert!(w.update(2.0, 3).is_nan());
        assert!(!w.update(3.0, 3).is_nan());
    }

    #[test]
    fn matches_naive_over_fixed_length() {
        let values: Vec<f64> = (1..=50).map(|i| i as f64).collect();
        let mut w = WmaState::default();
        for (i, &v) in values.iter().enumerate() {
            let out = w.update(v, 9);
            if i + 1 >= 9 {
                let expected = naive_wma(&values[..=i], 9);
                assert!((out - expected).abs() < 1e-9, "at {i}: {out} vs {expected}");
            }
        }
    }

    #[test]
    fn dynamic_length_rebuild_matches_naive() {
        let mut values = Vec::new();
        let mut seed = 4242u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as f64 / u32::MAX as f64) - 0.5
        };
        let mut price = 100.0;
        for _ in 0..3000 {
            price += next();
            values.push(price);
        }

        let mut w = WmaState::default();
        let mut seed2 = 13u64;
        for (i, &v) in values.iter().enumerate() {
            seed2 = seed2.wrapping_mul(6364136223846793005).wrapping_add(1);
            let length = 2 + ((seed2 >> 40) % 30) as i64;
            let out = w.update(v, length);
            if i >= 50 && (i as i64) + 1 >= length {
                let expected = naive_wma(&values[..=i], length as usize);
                assert!(
                    (out - expected).abs() < 1e-6,
                    "at {i} length {length}: {out} vs {expected}"
                );
            }
        }
    }
}
