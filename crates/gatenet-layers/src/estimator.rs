//! Gate statistics collection and reporting.
//!
//! Layers hand a [`GateReport`] to the estimator after every forward pass.
//! Values are kept per `(name, layer)` history; formatters turn the
//! collected histories into one-line summaries such as
//! `gate.loss: 0.01234±5.00%` and `gate: 50.00%`.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use gatenet_core::{mean_std, Error, Percent, Result};
use tracing::error;

use crate::conv::GateReport;
use crate::density::mask_density;

/// History key of predicted gate values
pub const GATE_OUTPUT: &str = "gate.output";
/// History key of active gate masks
pub const GATE_ACTIVE: &str = "gate.active";
/// History key of gate regularization losses
pub const GATE_LOSS: &str = "gate.loss";

/// Default number of values kept per history while training
pub const DEFAULT_WINDOW: usize = 100;

/// A recorded value
#[derive(Debug, Clone, PartialEq)]
pub enum GateValue {
    Scalar(f64),
    Tensor(Vec<f32>),
    Mask(Vec<bool>),
}

impl GateValue {
    /// The scalar, if this is one
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            GateValue::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    /// The mask, if this is one
    pub fn as_mask(&self) -> Option<&[bool]> {
        match self {
            GateValue::Mask(mask) => Some(mask),
            _ => None,
        }
    }
}

/// How many values a history keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Only the most recent `n` values
    Window(usize),
    /// Every value
    Infinite,
}

/// Summary line producer
pub type Formatter = Box<dyn Fn(&GateEstimator) -> String + Send + Sync>;

/// Collects gate statistics across layers
pub struct GateEstimator {
    histories: BTreeMap<String, BTreeMap<String, VecDeque<GateValue>>>,
    formatters: Vec<Formatter>,
    gate_formatters_registered: bool,
    window: usize,
}

impl Default for GateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GateEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateEstimator")
            .field("histories", &self.histories.keys().collect::<Vec<_>>())
            .field("formatters", &self.formatters.len())
            .field("window", &self.window)
            .finish()
    }
}

impl GateEstimator {
    /// Creates an estimator keeping [`DEFAULT_WINDOW`] values while training
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Creates an estimator with a custom training window
    pub fn with_window(window: usize) -> Self {
        Self {
            histories: BTreeMap::new(),
            formatters: Vec::new(),
            gate_formatters_registered: false,
            window: window.max(1),
        }
    }

    /// Appends a value to the `(name, layer)` history
    pub fn register(&mut self, name: &str, layer: &str, value: GateValue, history: HistoryPolicy) {
        let values = self
            .histories
            .entry(name.to_string())
            .or_default()
            .entry(layer.to_string())
            .or_default();
        values.push_back(value);
        if let HistoryPolicy::Window(size) = history {
            while values.len() > size {
                values.pop_front();
            }
        }
    }

    /// Records one layer's forward pass
    ///
    /// Training keeps a sliding window; evaluation keeps everything.
    pub fn record(&mut self, report: &GateReport, is_training: bool) {
        self.register_gate_formatters();

        let history = if is_training {
            HistoryPolicy::Window(self.window)
        } else {
            HistoryPolicy::Infinite
        };
        self.register(
            GATE_OUTPUT,
            &report.layer,
            GateValue::Tensor(report.gate.clone()),
            history,
        );
        if let Some(active) = &report.active {
            self.register(GATE_ACTIVE, &report.layer, GateValue::Mask(active.clone()), history);
        }
        if let Some(loss) = report.loss {
            self.register(
                GATE_LOSS,
                &report.layer,
                GateValue::Scalar(loss),
                HistoryPolicy::Window(self.window),
            );
        }
    }

    /// History of one layer
    pub fn get_history(&self, name: &str, layer: &str) -> Result<&VecDeque<GateValue>> {
        self.histories
            .get(name)
            .and_then(|layers| layers.get(layer))
            .ok_or_else(|| Error::NotFound(format!("no {name} history for layer {layer}")))
    }

    /// Histories of every layer for `name`
    pub fn get_histories(&self, name: &str) -> BTreeMap<&str, &VecDeque<GateValue>> {
        self.histories
            .get(name)
            .map(|layers| {
                layers
                    .iter()
                    .map(|(layer, values)| (layer.as_str(), values))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent value of every layer for `name`
    pub fn get_values(&self, name: &str) -> BTreeMap<&str, &GateValue> {
        self.get_histories(name)
            .into_iter()
            .filter_map(|(layer, values)| values.back().map(|value| (layer, value)))
            .collect()
    }

    /// Density of every mask recorded for a layer, `None` without masks
    pub fn history_density(&self, layer: &str) -> Option<f64> {
        let history = self.get_history(GATE_ACTIVE, layer).ok()?;
        let (valid, total) = history
            .iter()
            .filter_map(GateValue::as_mask)
            .fold((0usize, 0usize), |(valid, total), mask| {
                (
                    valid + mask.iter().filter(|&&active| active).count(),
                    total + mask.len(),
                )
            });
        (total > 0).then(|| valid as f64 / total as f64)
    }

    /// Adds a summary formatter
    pub fn register_formatter<F>(&mut self, formatter: F)
    where
        F: Fn(&GateEstimator) -> String + Send + Sync + 'static,
    {
        self.formatters.push(Box::new(formatter));
    }

    /// Runs every formatter and joins their output
    pub fn format(&self) -> String {
        self.formatters
            .iter()
            .map(|formatter| formatter(self))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Drops all histories, keeping formatters
    pub fn clear(&mut self) {
        self.histories.clear();
    }

    fn register_gate_formatters(&mut self) {
        if self.gate_formatters_registered {
            return;
        }
        self.register_formatter(gate_loss_formatter);
        self.register_formatter(gate_density_formatter);
        self.gate_formatters_registered = true;
    }
}

/// Mean and relative spread of the gate loss summed over layers
pub fn gate_loss_formatter(estimator: &GateEstimator) -> String {
    let mut total_losses: Option<Vec<f64>> = None;
    for history in estimator.get_histories(GATE_LOSS).values() {
        let losses: Vec<f64> = history.iter().filter_map(GateValue::as_scalar).collect();
        total_losses = Some(match total_losses {
            None => losses,
            Some(totals) => totals.iter().zip(&losses).map(|(a, b)| a + b).collect(),
        });
    }

    let (loss_mean, loss_std) = match &total_losses {
        Some(totals) => mean_std(totals),
        None => (0.0, 0.0),
    };
    if loss_mean.is_nan() {
        error!("Gating loss is NaN. Please check your regularizer weight.");
    }
    let spread = if loss_mean > 0.0 {
        Percent(loss_std / loss_mean).to_string()
    } else {
        "?%".to_string()
    };
    format!("gate.loss: {loss_mean:.5}±{spread}")
}

/// Fraction of active gates over every layer's latest mask
pub fn gate_density_formatter(estimator: &GateEstimator) -> String {
    let masks: Vec<&[bool]> = estimator
        .get_values(GATE_ACTIVE)
        .into_values()
        .filter_map(GateValue::as_mask)
        .collect();
    let total: usize = masks.iter().map(|mask| mask.len()).sum();
    if total == 0 {
        return "gate: off".to_string();
    }
    let valid: f64 = masks
        .iter()
        .map(|mask| mask_density(mask) * mask.len() as f64)
        .sum();
    format!("gate: {}", Percent(valid / total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(layer: &str, active: Option<Vec<bool>>, loss: Option<f64>) -> GateReport {
        GateReport {
            layer: layer.to_string(),
            gate: vec![0.5; active.as_ref().map_or(2, Vec::len)],
            active,
            loss,
        }
    }

    #[test]
    fn test_window_history() {
        let mut estimator = GateEstimator::new();
        for step in 0..5 {
            estimator.register(
                GATE_LOSS,
                "conv1",
                GateValue::Scalar(step as f64),
                HistoryPolicy::Window(3),
            );
        }
        let history = estimator.get_history(GATE_LOSS, "conv1").unwrap();
        let values: Vec<f64> = history.iter().filter_map(GateValue::as_scalar).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_evaluation_history_is_unbounded() {
        let mut estimator = GateEstimator::with_window(2);
        for _ in 0..10 {
            estimator.record(&report("conv1", Some(vec![true, false]), None), false);
        }
        assert_eq!(estimator.get_history(GATE_ACTIVE, "conv1").unwrap().len(), 10);
        assert_eq!(estimator.get_history(GATE_OUTPUT, "conv1").unwrap().len(), 10);
    }

    #[test]
    fn test_missing_history() {
        let estimator = GateEstimator::new();
        assert!(matches!(
            estimator.get_history(GATE_ACTIVE, "conv1"),
            Err(Error::NotFound(_))
        ));
        assert!(estimator.get_values(GATE_ACTIVE).is_empty());
    }

    #[test]
    fn test_formatters_registered_once() {
        let mut estimator = GateEstimator::new();
        estimator.record(&report("conv1", Some(vec![true, false]), Some(0.1)), true);
        estimator.record(&report("conv2", Some(vec![true, true]), Some(0.1)), true);
        assert_eq!(estimator.formatters.len(), 2);
        assert_eq!(estimator.format(), "gate.loss: 0.20000±0.00%, gate: 75.00%");
    }

    #[test]
    fn test_loss_formatter_sums_layers_per_step() {
        let mut estimator = GateEstimator::new();
        for loss in [1.0, 3.0] {
            estimator.record(&report("conv1", None, Some(loss)), true);
            estimator.record(&report("conv2", None, Some(loss)), true);
        }
        // per-step totals are 2 and 6: mean 4, std 2
        assert_eq!(gate_loss_formatter(&estimator), "gate.loss: 4.00000±50.00%");
    }

    #[test]
    fn test_loss_formatter_without_losses() {
        let estimator = GateEstimator::new();
        assert_eq!(gate_loss_formatter(&estimator), "gate.loss: 0.00000±?%");
    }

    #[test]
    fn test_density_formatter_off_without_gates() {
        let mut estimator = GateEstimator::new();
        estimator.record(&report("conv1", None, Some(0.1)), true);
        assert_eq!(gate_density_formatter(&estimator), "gate: off");
    }

    #[test]
    fn test_density_uses_latest_masks() {
        let mut estimator = GateEstimator::new();
        estimator.record(&report("conv1", Some(vec![false, false]), None), true);
        estimator.record(&report("conv1", Some(vec![true, true]), None), true);
        assert_eq!(gate_density_formatter(&estimator), "gate: 100.00%");
    }

    #[test]
    fn test_history_density_spans_all_masks() {
        let mut estimator = GateEstimator::new();
        estimator.record(&report("conv1", Some(vec![false, false]), None), false);
        estimator.record(&report("conv1", Some(vec![true, true]), None), false);
        assert_eq!(estimator.history_density("conv1"), Some(0.5));
        assert_eq!(estimator.history_density("conv2"), None);
    }

    #[test]
    fn test_custom_formatter() {
        let mut estimator = GateEstimator::new();
        estimator.register_formatter(|e| format!("layers: {}", e.get_histories(GATE_LOSS).len()));
        assert_eq!(estimator.format(), "layers: 0");
    }
}
