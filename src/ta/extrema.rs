use std::collections::VecDeque;

use super::{MAX_HISTORY, TRIM_MARGIN};

/// Rolling max/min over a trailing window via monotonic deque (§4.6.4).
/// Stores `(global_bar_index, value)` pairs so a length change can simply
/// discard the deque and rebuild it from trailing history without losing
/// track of how many bars back each surviving extremum sits.
#[derive(Default)]
pub struct ExtremaState {
    history: VecDeque<f64>,
    bar_index: i64,
    max_deque: VecDeque<(i64, f64)>,
    min_deque: VecDeque<(i64, f64)>,
    prev_length: Option<i64>,
}

/// Value and distance (in bars, 0 = current bar) back to the extremum.
pub struct Extremum {
    pub value: f64,
    pub bars_ago: i64,
}

impl ExtremaState {
    pub fn update(&mut self, source: f64, length: i64) -> (Extremum, Extremum) {
        let nan_extremum = || Extremum {
            value: f64::NAN,
            bars_ago: 0,
        };
        if length <= 0 {
            return (nan_extremum(), nan_extremum());
        }
        let length_u = length as usize;

        self.history.push_back(source);
        let idx = self.bar_index;

        if self.prev_length != Some(length) {
            self.rebuild(length_u);
            self.prev_length = Some(length);
        } else {
            while matches!(self.max_deque.back(), Some(&(_, v)) if v <= source) {
                self.max_deque.pop_back();
            }
            self.max_deque.push_back((idx, source));
            while matches!(self.min_deque.back(), Some(&(_, v)) if v >= source) {
                self.min_deque.pop_back();
            }
            self.min_deque.push_back((idx, source));

            let cutoff = idx - length as i64 + 1;
            while matches!(self.max_deque.front(), Some(&(i, _)) if i < cutoff) {
                self.max_deque.pop_front();
            }
            while matches!(self.min_deque.front(), Some(&(i, _)) if i < cutoff) {
                self.min_deque.pop_front();
            }
        }

        self.bar_index += 1;
        self.trim(length_u);

        if (self.history.len() as i64) < length {
            return (nan_extremum(), nan_extremum());
        }

        let (max_idx, max_val) = *self.max_deque.front().unwrap();
        let (min_idx, min_val) = *self.min_deque.front().unwrap();
        (
            Extremum {
                value: max_val,
                bars_ago: idx - max_idx,
            },
            Extremum {
                value: min_val,
                bars_ago: idx - min_idx,
            },
        )
    }

    /// Rebuild both deques from the trailing `length` bars of history.
    /// `global_idx(k)` maps a position `k` within `history` back to the
    /// absolute bar index it was observed at — this stays correct even
    /// after `history` has been trimmed, since `bar_index` always tracks
    /// the true count of bars seen.
    fn rebuild(&mut self, length: usize) {
        self.max_deque.clear();
        self.min_deque.clear();
        let len = self.history.len();
        let start = len.saturating_sub(length);
        let global_idx = |k: usize| self.bar_index - (len as i64 - 1 - k as i64);

        for k in start..len {
            let v = self.history[k];
            let gi = global_idx(k);
            while matches!(self.max_deque.back(), Some(&(_, mv)) if mv <= v) {
                self.max_deque.pop_back();
            }
            self.max_deque.push_back((gi, v));
            while matches!(self.min_deque.back(), Some(&(_, mv)) if mv >= v) {
                self.min_deque.pop_back();
            }
            self.min_deque.push_back((gi, v));
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

    fn naive_extrema(values: &[f64], length: usize) -> (f64, i64, f64, i64) {
        let window = &values[values.len() - length..];
        let mut max_v = f64::MIN;
        let mut max_i = 0;
        let mut min_v = f64::MAX;
        let mut min_i = 0;
        for (i, &v) in window.iter().enumerate() {
            if v > max_v {
                max_v = v;
                max_i = i;
            }
            if v < min_v {
                min_v = v;
                min_i = i;
            }
        }
        let bars_ago_max = (window.len() - 1 - max_i) as i64;
        let bars_ago_min = (window.len() - 1 - min_i) as i64;
        (max_v, bars_ago_max, min_v, bars_ago_min)
    }

    #[test]
    fn warm_up_returns_nan_until_enough_samples() {
        let mut e = ExtremaState::default();
        let (hi, lo) = e.update(1.0, 3);
        assert!(hi.value.is_nan());
        assert!(lo.value.is_nan());
        e.update(2.0, 3);
        let (hi, _) = e.update(3.0, 3);
        assert!(!hi.value.is_nan());
    }

    #[test]
    fn matches_naive_over_fixed_length() {
        let values: Vec<f64> = vec![
            3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0, 5.0, 3.0, 5.0, 8.0, 9.0, 7.0, 9.0, 3.0,
        ];
        let mut e = ExtremaState::default();
        for (i, &v) in values.iter().enumerate() {
            let (hi, lo) = e.update(v, 5);
            if i + 1 >= 5 {
                let (mv, ma, lv, la) = naive_extrema(&values[..=i], 5);
                assert_eq!(hi.value, mv);
                assert_eq!(hi.bars_ago, ma);
                assert_eq!(lo.value, lv);
                assert_eq!(lo.bars_ago, la);
            }
        }
    }

    #[test]
    fn length_change_rebuilds_correctly() {
        let values: Vec<f64> = vec![5.0, 3.0, 8.0, 1.0, 9.0, 2.0, 7.0, 4.0, 6.0, 0.0];
        let mut e = ExtremaState::default();
        for &v in &values[..8] {
            e.update(v, 3);
        }
        let (hi, lo) = e.update(values[8], 8);
        let (mv, ma, lv, la) = naive_extrema(&values[..9], 8);
        assert_eq!(hi.value, mv);
        assert_eq!(hi.bars_ago, ma);
        assert_eq!(lo.value, lv);
        assert_eq!(lo.bars_ago, la);
    }

    #[test]
    fn length_change_below_history_is_nan_until_refilled() {
        let mut e = ExtremaState::default();
        for v in [1.0, 2.0, 3.0] {
            e.update(v, 3);
        }
        let (hi, lo) = e.update(4.0, 10);
        assert!(hi.value.is_nan());
        assert!(lo.value.is_nan());
    }
}
