use std::collections::VecDeque;

use super::{HEAL_INTERVAL_VARIANCE, MAX_HISTORY, TRIM_MARGIN};

/// Streaming mean + population standard deviation, used directly by
/// Bollinger Bands (§4.6.3). Tracks sum and sum-of-squares so both the
/// basis and the band width fall out of the same pass over history.
#[derive(Default)]
pub struct VarianceState {
    history: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
    prev_length: Option<i64>,
    updates_since_heal: u32,
}

/// Mean and population standard deviation over the trailing `length` bars.
pub struct MeanStdev {
    pub mean: f64,
    pub stdev: f64,
}

impl VarianceState {
    pub fn update(&mut self, source: f64, length: i64) -> MeanStdev {
        if length <= 0 {
            return MeanStdev {
                mean: f64::NAN,
                stdev: f64::NAN,
            };
        }
        let length_u = length as usize;
        self.history.push_back(source);

        if self.prev_length != Some(length) {
            self.recompute(length_u);
            self.prev_length = Some(length);
            self.updates_since_heal = 0;
        } else {
            self.sum += source;
            self.sum_sq += source * source;
            let len = self.history.len();
            if len > length_u {
                let leaving = self.history[len - 1 - length_u];
                self.sum -= leaving;
                self.sum_sq -= leaving * leaving;
            }
            self.updates_since_heal += 1;
            if self.updates_since_heal >= HEAL_INTERVAL_VARIANCE {
                tracing::trace!(length, "variance healing: recomputing sum/sum_sq from history");
                self.recompute(length_u);
                self.updates_since_heal = 0;
            }
        }

        self.trim(length_u);

        if self.history.len() < length_u {
            return MeanStdev {
                mean: f64::NAN,
                stdev: f64::NAN,
            };
        }

        let n = length as f64;
        let mean = self.sum / n;
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        MeanStdev {
            mean,
            stdev: variance.sqrt(),
        }
    }

    fn recompute(&mut self, length: usize) {
        let len = self.history.len();
        let start = len.saturating_sub(length);
        self.sum = 0.0;
        self.sum_sq = 0.0;
        for &v in self.history.iter().skip(start) {
            self.sum += v;
            self.sum_sq += v * v;
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

    #[test]
    fn constant_series_has_zero_stdev() {
        let mut v = VarianceState::default();
        let mut last = MeanStdev {
            mean: f64::NAN,
            stdev: f64::NAN,
        };
        for _ in 0..50 {
            last = v.update(42.0, 10);
        }
        assert!((last.mean - 42.0).abs() < 1e-9);
        assert!(last.stdev.abs() < 1e-9);
    }

    #[test]
    fn known_sequence_matches_naive_population_stdev() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut v = VarianceState::default();
        let mut out = MeanStdev {
            mean: f64::NAN,
            stdev: f64::NAN,
        };
        for &x in &data {
            out = v.update(x, 5);
        }
        assert!((out.mean - 3.0).abs() < 1e-9);
        assert!((out.stdev - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn length_change_triggers_rebuild_not_corruption() {
        let mut v = VarianceState::default();
        for _ in 0..30 {
            v.update(10.0, 5);
        }
        let out = v.update(10.0, 20);
        assert!(out.stdev.abs() < 1e-9);
    }
}
