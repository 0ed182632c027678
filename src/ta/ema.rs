/// Exponential moving average and its RMA (Wilder) variant (§4.6.1). Both
/// share the same recurrence; only the smoothing factor differs, so one
/// state struct serves both — `is_rma` just picks the alpha formula.
#[derive(Default)]
pub struct EmaState {
    value: Option<f64>,
    prev_length: Option<i64>,
}

impl EmaState {
    fn alpha(length: i64, is_rma: bool) -> f64 {
        let n = length as f64;
        if is_rma {
            1.0 / n
        } else {
            2.0 / (n + 1.0)
        }
    }

    /// `length` changing mid-series restarts the state: there is no sound
    /// way to reuse an EMA accumulated under a different alpha, so the
    /// next sample reseeds from this bar forward (§4.6.1).
    fn update_inner(&mut self, source: f64, length: i64, is_rma: bool) -> f64 {
        if length <= 0 {
            return f64::NAN;
        }

        if self.prev_length != Some(length) {
            self.value = None;
            self.prev_length = Some(length);
        }

        match self.value {
            Some(prev) => {
                let alpha = Self::alpha(length, is_rma);
                let next = alpha * source + (1.0 - alpha) * prev;
                self.value = Some(next);
                next
            }
            None => {
                self.value = Some(source);
                source
            }
        }
    }

    pub fn update(&mut self, source: f64, length: i64) -> f64 {
        self.update_inner(source, length, false)
    }

    pub fn update_rma(&mut self, source: f64, length: i64) -> f64 {
        self.update_inner(source, length, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_value_unchanged_then_recurrence_applies() {
        let mut e = EmaState::default();
        let seeded = e.update(1.0, 3);
        assert!((seeded - 1.0).abs() < 1e-9);
        let alpha = 2.0 / 4.0;
        let next = e.update(2.0, 3);
        assert!((next - (alpha * 2.0 + (1.0 - alpha) * 1.0)).abs() < 1e-9);
        let next = e.update(3.0, 3);
        let prev = alpha * 2.0 + (1.0 - alpha) * 1.0;
        assert!((next - (alpha * 3.0 + (1.0 - alpha) * prev)).abs() < 1e-9);
    }

    #[test]
    fn rma_uses_wilder_alpha() {
        let mut e = EmaState::default();
        e.update_rma(1.0, 2);
        let seeded = e.update_rma(3.0, 2);
        assert!((seeded - 2.0).abs() < 1e-9);
        let next = e.update_rma(5.0, 2);
        assert!((next - (0.5 * 5.0 + 0.5 * 2.0)).abs() < 1e-9);
    }

    #[test]
    fn length_change_reseeds_from_the_next_sample() {
        let mut e = EmaState::default();
        e.update(1.0, 2);
        e.update(2.0, 2);
        let reseeded = e.update(3.0, 5);
        assert!((reseeded - 3.0).abs() < 1e-9);
    }

    #[test]
    fn nonpositive_length_is_nan() {
        let mut e = EmaState::default();
        assert!(e.update(1.0, 0).is_nan());
    }
}
