/// Incremental mean of a scalar observed once per iteration.
///
/// The divisor basis is the caller's iteration index rather than an internal
/// counter, so both players' averages stay aligned to the same step even if
/// one of them was created late.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct RunningStat {
    value: f64,
    count: usize,
}

impl RunningStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `observation` in at position `index` (0-based).
    ///
    /// `value' = (value * index + observation) / (index + 1)`; at `index == 0`
    /// this is just `observation`.
    pub fn update(self, observation: f64, index: usize) -> Self {
        let n = index as f64;
        RunningStat {
            value: (self.value * n + observation) / (n + 1.0),
            count: self.count + 1,
        }
    }

    /// Current mean.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Number of observations folded in so far.
    pub fn count(&self) -> usize {
        self.count
    }
}
