//! Accuracy and statistics helpers for evaluation and gate reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A ratio displayed as a percentage with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percent(pub f64);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0 * 100.0)
    }
}

/// Running top-1 / top-5 accuracy counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopKAccuracy {
    /// Samples whose label was the highest logit
    pub top1_hits: usize,
    /// Samples whose label was within the five highest logits
    pub top5_hits: usize,
    /// Samples counted
    pub total: usize,
}

impl TopKAccuracy {
    /// Creates empty counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the hits of one batch
    pub fn update(&mut self, top1_hits: usize, top5_hits: usize, count: usize) {
        self.top1_hits += top1_hits;
        self.top5_hits += top5_hits;
        self.total += count;
    }

    /// Top-1 accuracy so far
    pub fn top1(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.top1_hits as f64 / self.total as f64
        }
    }

    /// Top-5 accuracy so far
    pub fn top5(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.top5_hits as f64 / self.total as f64
        }
    }
}

/// Whether `label` is among the `k` largest entries of `logits`.
///
/// Ties with the label's logit count in its favour.
pub fn in_top_k(logits: &[f32], label: usize, k: usize) -> bool {
    let Some(&target) = logits.get(label) else {
        return false;
    };
    if target.is_nan() {
        return false;
    }
    let greater = logits.iter().filter(|&&value| value > target).count();
    greater < k
}

/// Population mean and standard deviation; `(0, 0)` for no values.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
