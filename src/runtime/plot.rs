use std::collections::HashMap;

/// Plot series registry (§4.7). Each title gets a dense, NaN-backfilled
/// series so every series ends up the same length after `finalize_bar`
/// regardless of when its title was first plotted (§9's open question:
/// this implementation back-fills from bar 0).
#[derive(Default)]
pub struct PlotRegistry {
    series: HashMap<String, Vec<f64>>,
    order: Vec<String>,
    bar_index: i64,
}

impl PlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value for `title` at the current bar. Overwrites if the
    /// title already has a value for this bar; otherwise appends.
    pub fn register(&mut self, title: &str, value: f64) {
        let bar_index = self.bar_index;
        if !self.series.contains_key(title) {
            self.order.push(title.to_string());
            self.series
                .insert(title.to_string(), vec![f64::NAN; bar_index as usize]);
        }
        let series = self.series.get_mut(title).unwrap();
        let idx = bar_index as usize;
        if idx < series.len() {
            series[idx] = value;
        } else {
            series.push(value);
        }
    }

    /// Pad every series that hasn't been written this bar with NaN, then
    /// advance `bar_index`. Invariant: after this call every series has
    /// length exactly `bar_index`.
    pub fn finalize_bar(&mut self) {
        for title in &self.order {
            let series = self.series.get_mut(title).unwrap();
            if series.len() as i64 <= self.bar_index {
                series.push(f64::NAN);
            }
        }
        self.bar_index += 1;
    }

    pub fn bar_index(&self) -> i64 {
        self.bar_index
    }

    pub fn series(&self, title: &str) -> Option<&[f64]> {
        self.series.get(title).map(|v| v.as_slice())
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.order
            .iter()
            .map(move |t| (t.as_str(), self.series[t].as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_plot_backfills_from_bar_zero() {
        let mut reg = PlotRegistry::new();
        reg.finalize_bar();
        reg.finalize_bar();
        reg.finalize_bar();
        reg.register("late", 1.0);
        reg.finalize_bar();
        let series = reg.series("late").unwrap();
        assert_eq!(series.len(), 4);
        assert!(series[0].is_nan());
        assert!(series[1].is_nan());
        assert!(series[2].is_nan());
        assert_eq!(series[3], 1.0);
    }

    #[test]
    fn every_series_reaches_bar_index_after_finalize() {
        let mut reg = PlotRegistry::new();
        for bar in 0..5 {
            if bar % 2 == 0 {
                reg.register("even", bar as f64);
            }
            reg.finalize_bar();
        }
        assert_eq!(reg.series("even").unwrap().len(), 5);
        assert_eq!(reg.bar_index(), 5);
    }

    #[test]
    fn overwrite_within_same_bar() {
        let mut reg = PlotRegistry::new();
        reg.register("x", 1.0);
        reg.register("x", 2.0);
        reg.finalize_bar();
        assert_eq!(reg.series("x").unwrap(), &[2.0]);
    }
}
