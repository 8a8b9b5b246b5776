// Grid ladder construction and fill averaging
use crate::execution::Fill;

/// Buy levels spaced `step_percent` below a reference price
#[derive(Debug, Clone, PartialEq)]
pub struct GridLadder {
    levels: Vec<f64>,
}

impl GridLadder {
    /// Levels `reference * (1 - k * step / 100)` for k = 1..=count, highest first
    pub fn new(reference: f64, count: usize, step_percent: f64) -> Self {
        let levels = (1..=count)
            .map(|k| reference * (1.0 - k as f64 * step_percent / 100.0))
            .collect();
        Self { levels }
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn lowest(&self) -> Option<f64> {
        self.levels.last().copied()
    }

    /// Levels touched by a candle whose low is `low`
    pub fn triggered(&self, low: f64) -> impl Iterator<Item = f64> + '_ {
        self.levels.iter().copied().filter(move |&level| low <= level)
    }

    /// Invalidation price below the lowest level
    pub fn invalidation(&self, invalidation_percent: f64) -> Option<f64> {
        self.lowest()
            .map(|lowest| lowest * (1.0 - invalidation_percent / 100.0))
    }
}

/// Notional-weighted average price of a set of level fills
pub fn weighted_entry(fills: &[Fill]) -> Option<f64> {
    let total: f64 = fills.iter().map(Fill::value).sum();
    if total <= 0.0 {
        return None;
    }
    Some(fills.iter().map(|f| f.value() * f.price).sum::<f64>() / total)
}
