//! Configuration structures for gated convolution networks.
//!
//! Everything here is deserialized from TOML (see [`crate::cli::load_toml_config`]).
//! Gate parameters are validated while parsing, so a constructed
//! [`GateParams`] always carries a usable policy, granularity and density.

use crate::error::{Error, GateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Gating strategy of a gated convolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "String", into = "String")]
pub enum GatePolicy {
    /// Gate network regresses the subsampled convolution output
    Naive,
    /// Gate output is used as the batch-norm scale (gamma)
    #[default]
    Parametric,
    /// Squeeze-and-excitation style gate scaling the output
    Squeeze,
}

impl FromStr for GatePolicy {
    type Err = GateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "naive" => Ok(GatePolicy::Naive),
            "parametric" | "parametric_gamma" => Ok(GatePolicy::Parametric),
            "squeeze" => Ok(GatePolicy::Squeeze),
            other => Err(GateError::PolicyType(format!(
                "{other:?}, we accept one of naive, parametric, squeeze"
            ))),
        }
    }
}

impl TryFrom<String> for GatePolicy {
    type Error = GateError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GatePolicy> for String {
    fn from(policy: GatePolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatePolicy::Naive => write!(f, "naive"),
            GatePolicy::Parametric => write!(f, "parametric"),
            GatePolicy::Squeeze => write!(f, "squeeze"),
        }
    }
}

/// What a single gate value controls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    /// One gate per output channel
    #[default]
    Channel,
    /// One gate per output row of each channel
    Vector,
}

impl FromStr for Granularity {
    type Err = GateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "channel" => Ok(Granularity::Channel),
            "vector" => Ok(Granularity::Vector),
            other => Err(GateError::Granularity(other.to_string())),
        }
    }
}

impl TryFrom<String> for Granularity {
    type Error = GateError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(granularity: Granularity) -> Self {
        granularity.to_string()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Channel => write!(f, "channel"),
            Granularity::Vector => write!(f, "vector"),
        }
    }
}

/// Feature extraction used when subsampling a feature map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolMethod {
    /// Maximum (hardware-friendlier)
    #[default]
    Max,
    /// Mean of absolute values
    L1,
    /// Mean of squares
    L2,
    /// Mean
    Avg,
}

impl FromStr for PoolMethod {
    type Err = GateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "max" => Ok(PoolMethod::Max),
            "l1" => Ok(PoolMethod::L1),
            "l2" => Ok(PoolMethod::L2),
            "avg" => Ok(PoolMethod::Avg),
            other => Err(GateError::ParameterValue(format!(
                "feature extract type {other:?} not supported"
            ))),
        }
    }
}

impl fmt::Display for PoolMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolMethod::Max => write!(f, "max"),
            PoolMethod::L1 => write!(f, "l1"),
            PoolMethod::L2 => write!(f, "l2"),
            PoolMethod::Avg => write!(f, "avg"),
        }
    }
}

/// Target fraction of active gates, always in `(0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct Density(f64);

impl Density {
    /// Creates a density, rejecting values outside `(0, 1]`
    pub fn new(value: f64) -> std::result::Result<Self, GateError> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(GateError::ParameterValue(format!(
                "Gate density value {value} is out of range (0, 1]."
            )))
        }
    }

    /// The raw fraction
    pub fn value(self) -> f64 {
        self.0
    }

    /// Number of active elements out of `num_elements`
    pub fn num_active(self, num_elements: usize) -> usize {
        ((num_elements as f64) * self.0).ceil() as usize
    }
}

impl TryFrom<f64> for Density {
    type Error = GateError;

    fn try_from(value: f64) -> std::result::Result<Self, Self::Error> {
        Density::new(value)
    }
}

impl From<Density> for f64 {
    fn from(density: Density) -> Self {
        density.0
    }
}

/// Convolution zero padding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "PaddingRepr", into = "PaddingRepr")]
pub enum Padding {
    /// Keep spatial size (for stride 1)
    #[default]
    Same,
    /// No padding
    Valid,
    /// Explicit symmetric padding
    Explicit(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PaddingRepr {
    Name(String),
    Size(usize),
}

impl TryFrom<PaddingRepr> for Padding {
    type Error = GateError;

    fn try_from(repr: PaddingRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            PaddingRepr::Size(size) => Ok(Padding::Explicit(size)),
            PaddingRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "same" => Ok(Padding::Same),
                "valid" => Ok(Padding::Valid),
                _ => Err(GateError::ParameterValue(format!(
                    "Unrecognized padding {name:?}."
                ))),
            },
        }
    }
}

impl From<Padding> for PaddingRepr {
    fn from(padding: Padding) -> Self {
        match padding {
            Padding::Same => PaddingRepr::Name("same".to_string()),
            Padding::Valid => PaddingRepr::Name("valid".to_string()),
            Padding::Explicit(size) => PaddingRepr::Size(size),
        }
    }
}

impl Padding {
    /// Padding applied on each side for the given kernel extent
    pub fn resolve(self, kernel: usize) -> usize {
        match self {
            Padding::Same => kernel.saturating_sub(1) / 2,
            Padding::Valid => 0,
            Padding::Explicit(size) => size,
        }
    }
}

/// Activation applied after normalization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified linear unit
    #[default]
    Relu,
    /// Identity
    None,
}

/// Gate parameters of a gated convolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateParams {
    /// Gating policy
    #[serde(default)]
    pub policy: GatePolicy,
    /// Target density of active gates
    pub density: Density,
    /// Gate granularity
    #[serde(default)]
    pub granularity: Granularity,
    /// Subsampling method
    #[serde(default)]
    pub pool: PoolMethod,
    /// Weight of the gate regularizer loss
    #[serde(default = "default_gate_weight")]
    pub weight: f64,
    /// Whether the output is masked by the active gates
    #[serde(default = "default_true", alias = "should_gate")]
    pub enable: bool,
    /// Bottleneck reduction factor of the squeeze gate (0 disables it)
    #[serde(default)]
    pub factor: usize,
}

fn default_gate_weight() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

impl GateParams {
    /// Creates gate parameters with default settings for the given density
    pub fn new(density: Density) -> Self {
        Self {
            policy: GatePolicy::default(),
            density,
            granularity: Granularity::default(),
            pool: PoolMethod::default(),
            weight: default_gate_weight(),
            enable: true,
            factor: 0,
        }
    }

    /// Sets the policy
    pub fn with_policy(mut self, policy: GatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the granularity
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Sets the pooling method
    pub fn with_pool(mut self, pool: PoolMethod) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the regularizer weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Enables or disables output masking
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// Sets the squeeze bottleneck factor
    pub fn with_factor(mut self, factor: usize) -> Self {
        self.factor = factor;
        self
    }
}

/// Configuration of one gated convolution layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatedConvConfig {
    /// Layer name, used as the key for gate statistics
    #[serde(default)]
    pub name: String,
    /// Input channels
    pub in_channels: usize,
    /// Output channels
    pub out_channels: usize,
    /// Square kernel size
    pub kernel_size: usize,
    /// Stride
    #[serde(default = "default_stride")]
    pub stride: usize,
    /// Zero padding
    #[serde(default)]
    pub padding: Padding,
    /// Whether batch normalization follows the convolution
    #[serde(default = "default_true")]
    pub batch_norm: bool,
    /// Activation after normalization
    #[serde(default)]
    pub activation: Activation,
    /// Gate parameters
    pub gate: GateParams,
}

fn default_stride() -> usize {
    1
}

impl GatedConvConfig {
    /// Creates a layer config with stride 1, same padding, batch norm and ReLU
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        gate: GateParams,
    ) -> Self {
        Self {
            name: name.into(),
            in_channels,
            out_channels,
            kernel_size,
            stride: default_stride(),
            padding: Padding::default(),
            batch_norm: true,
            activation: Activation::default(),
            gate,
        }
    }

    /// Sets the stride
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Sets the padding
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Enables or disables batch normalization
    pub fn with_batch_norm(mut self, batch_norm: bool) -> Self {
        self.batch_norm = batch_norm;
        self
    }

    /// Sets the activation
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Padding applied on each side
    pub fn resolved_padding(&self) -> usize {
        self.padding.resolve(self.kernel_size)
    }

    /// Output spatial size for an input of `height` x `width`
    ///
    /// Fails when the kernel does not fit into the padded input.
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let pad = self.resolved_padding();
        let out = |extent: usize| {
            (extent + 2 * pad)
                .checked_sub(self.kernel_size)
                .map(|span| span / self.stride + 1)
        };
        match (out(height), out(width)) {
            (Some(out_height), Some(out_width)) => Ok((out_height, out_width)),
            _ => Err(GateError::ParameterValue(format!(
                "Layer {} with kernel size {} produces an empty output for a {}x{} input.",
                self.name, self.kernel_size, height, width
            ))
            .into()),
        }
    }

    /// Validates sizes and the policy/normalizer pairing
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(GateError::ParameterValue(format!(
                "Layer {} must have non-zero channels.",
                self.name
            ))
            .into());
        }
        if self.kernel_size == 0 || self.stride == 0 {
            return Err(GateError::ParameterValue(format!(
                "Layer {} must have non-zero kernel size and stride.",
                self.name
            ))
            .into());
        }
        if self.gate.policy == GatePolicy::Parametric && !self.batch_norm {
            return Err(GateError::Policy(format!(
                "Policy \"{}\" is used, we expect batch normalization to be used \
                 but it is absent in {}.",
                self.gate.policy, self.name
            ))
            .into());
        }
        if self.gate.weight.is_nan() || self.gate.weight < 0.0 {
            return Err(GateError::ParameterValue(format!(
                "Gate regularizer weight {} of layer {} must be non-negative.",
                self.gate.weight, self.name
            ))
            .into());
        }
        Ok(())
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Number of input channels
    #[serde(default = "default_in_channels")]
    pub in_channels: usize,
    /// Square input image size
    pub image_size: usize,
    /// Number of output classes
    pub num_classes: usize,
    /// Gated convolution stages, in order
    pub layers: Vec<GatedConvConfig>,
}

fn default_in_channels() -> usize {
    3
}

impl NetworkConfig {
    /// Validates every stage and the channel and spatial chaining between them
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::Config("network must have at least one layer".to_string()));
        }
        if self.num_classes == 0 {
            return Err(Error::Config("num_classes must be greater than 0".to_string()));
        }
        if self.image_size == 0 {
            return Err(
                GateError::ParameterValue("image_size must be greater than 0".to_string()).into(),
            );
        }
        let mut channels = self.in_channels;
        let mut shape = (self.image_size, self.image_size);
        for layer in &self.layers {
            layer.validate()?;
            if layer.in_channels != channels {
                return Err(Error::Config(format!(
                    "layer {} expects {} input channels but receives {}",
                    layer.name, layer.in_channels, channels
                )));
            }
            channels = layer.out_channels;
            shape = layer.output_size(shape.0, shape.1)?;
        }
        Ok(())
    }
}

/// Checkpoint locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Model record to load before evaluating
    pub load: Option<PathBuf>,
    /// Where to save model records
    pub save: Option<PathBuf>,
}

/// Evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Validation dataset root (one sub-directory per class)
    pub dataset_dir: PathBuf,
    /// Validation examples per epoch; defaults to what is found on disk
    #[serde(default)]
    pub num_examples: Option<usize>,
    /// Batch size
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Background data feeding threads
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Prepared batches buffered ahead of the evaluation loop
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Minimum seconds between progress log lines
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: f64,
    /// Checkpoint locations
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

fn default_batch_size() -> usize {
    64
}

fn default_num_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    8
}

fn default_progress_interval() -> f64 {
    1.0
}

impl EvalConfig {
    /// Creates an evaluation config with defaults for a dataset directory
    pub fn new(dataset_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            num_examples: None,
            batch_size: default_batch_size(),
            num_workers: default_num_workers(),
            queue_capacity: default_queue_capacity(),
            progress_interval_secs: default_progress_interval(),
            checkpoint: CheckpointConfig::default(),
        }
    }

    /// Validates batch and worker settings
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }
        if self.num_workers == 0 {
            return Err(Error::Config("num_workers must be greater than 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model name, used for checkpoint naming
    pub name: String,
    /// Network definition
    pub network: NetworkConfig,
    /// Evaluation settings
    pub eval: EvalConfig,
}

impl Config {
    /// Loads and validates a TOML configuration file
    ///
    /// Unknown gate policies and granularities fail with their [`GateError`].
    pub fn load(path: &Path) -> Result<Self> {
        let table = crate::cli::read_toml_table(path)?;
        check_gate_names(&table)?;
        let config: Config = crate::cli::parse_toml_table(table, path)?;
        config.network.validate()?;
        config.eval.validate()?;
        Ok(config)
    }
}

fn check_gate_names(table: &toml::Table) -> Result<()> {
    let layers = table
        .get("network")
        .and_then(|network| network.get("layers"))
        .and_then(toml::Value::as_array);
    for gate in layers.into_iter().flatten().filter_map(|layer| layer.get("gate")) {
        if let Some(policy) = gate.get("policy").and_then(toml::Value::as_str) {
            policy.parse::<GatePolicy>()?;
        }
        if let Some(granularity) = gate.get("granularity").and_then(toml::Value::as_str) {
            granularity.parse::<Granularity>()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn density(value: f64) -> Density {
        Density::new(value).unwrap()
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("naive".parse::<GatePolicy>().unwrap(), GatePolicy::Naive);
        assert_eq!(
            "parametric_gamma".parse::<GatePolicy>().unwrap(),
            GatePolicy::Parametric
        );
        assert!(matches!(
            "lottery".parse::<GatePolicy>(),
            Err(GateError::PolicyType(_))
        ));
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("vector".parse::<Granularity>().unwrap(), Granularity::Vector);
        assert!(matches!(
            "height".parse::<Granularity>(),
            Err(GateError::Granularity(_))
        ));
    }

    #[test]
    fn test_density_range() {
        assert!(Density::new(1.0).is_ok());
        assert!(Density::new(0.5).is_ok());
        assert!(Density::new(0.0).is_err());
        assert!(Density::new(1.5).is_err());
        assert!(Density::new(f64::NAN).is_err());
    }

    #[test]
    fn test_density_num_active() {
        assert_eq!(density(0.5).num_active(10), 5);
        assert_eq!(density(0.25).num_active(10), 3);
        assert_eq!(density(1.0).num_active(7), 7);
    }

    #[test]
    fn test_padding_resolve() {
        assert_eq!(Padding::Same.resolve(3), 1);
        assert_eq!(Padding::Same.resolve(5), 2);
        assert_eq!(Padding::Valid.resolve(3), 0);
        assert_eq!(Padding::Explicit(2).resolve(3), 2);
    }

    #[test]
    fn test_output_size() {
        let gate = GateParams::new(density(0.5));
        let config = GatedConvConfig::new("conv", 3, 8, 3, gate.clone()).with_stride(2);
        assert_eq!(config.output_size(32, 32).unwrap(), (16, 16));

        let config = GatedConvConfig::new("conv", 3, 8, 3, gate).with_padding(Padding::Valid);
        assert_eq!(config.output_size(32, 30).unwrap(), (30, 28));
        assert!(matches!(
            config.output_size(2, 2),
            Err(Error::Gate(GateError::ParameterValue(_)))
        ));
    }

    #[test]
    fn test_parametric_requires_batch_norm() {
        let gate = GateParams::new(density(0.5)).with_policy(GatePolicy::Parametric);
        let config = GatedConvConfig::new("conv1", 3, 8, 3, gate).with_batch_norm(false);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Gate(GateError::Policy(_))));
    }

    #[test]
    fn test_parse_gate_params_from_toml() {
        let params: GateParams = toml::from_str(
            r#"
            policy = "parametric_gamma"
            density = 0.4
            granularity = "vector"
            pool = "l1"
            should_gate = false
            "#,
        )
        .unwrap();
        assert_eq!(params.policy, GatePolicy::Parametric);
        assert_eq!(params.density.value(), 0.4);
        assert_eq!(params.granularity, Granularity::Vector);
        assert_eq!(params.pool, PoolMethod::L1);
        assert!(!params.enable);
        assert_eq!(params.weight, 0.01);
    }

    #[test]
    fn test_parse_rejects_bad_density() {
        let parsed: std::result::Result<GateParams, _> = toml::from_str("density = 1.5");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_policy() {
        let parsed: std::result::Result<GateParams, _> =
            toml::from_str("policy = \"lottery\"\ndensity = 0.5");
        let err = parsed.unwrap_err();
        assert!(err.to_string().contains("Unrecognized gated convolution policy"));
    }

    fn write_network_config(dir: &Path, gate: &str) -> PathBuf {
        let path = dir.join("net.toml");
        let content = format!(
            r#"
name = "net"

[network]
image_size = 8
num_classes = 2

[[network.layers]]
name = "conv1"
in_channels = 3
out_channels = 4
kernel_size = 3
gate = {{ {gate} }}

[eval]
dataset_dir = "data/val"
"#
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_rejects_unknown_policy_with_gate_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_network_config(dir.path(), "policy = \"lottery\", density = 0.5");
        let result = Config::load(&path);
        assert!(matches!(result, Err(Error::Gate(GateError::PolicyType(_)))));
    }

    #[test]
    fn test_load_rejects_unknown_granularity_with_gate_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_network_config(dir.path(), "granularity = \"height\", density = 0.5");
        let result = Config::load(&path);
        assert!(matches!(result, Err(Error::Gate(GateError::Granularity(_)))));
    }

    #[test]
    fn test_load_accepts_policy_alias() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_network_config(dir.path(), "policy = \"parametric_gamma\", density = 0.5");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.network.layers[0].gate.policy, GatePolicy::Parametric);
    }

    #[test]
    fn test_network_validate_rejects_collapsing_stages() {
        let gate = GateParams::new(density(0.5));
        let network = NetworkConfig {
            in_channels: 3,
            image_size: 4,
            num_classes: 10,
            layers: vec![
                GatedConvConfig::new("conv1", 3, 8, 3, gate.clone()).with_padding(Padding::Valid),
                GatedConvConfig::new("conv2", 8, 8, 3, gate.clone()).with_padding(Padding::Valid),
                GatedConvConfig::new("conv3", 8, 8, 3, gate).with_padding(Padding::Valid),
            ],
        };
        assert!(matches!(
            network.validate(),
            Err(Error::Gate(GateError::ParameterValue(_)))
        ));
    }

    #[test]
    fn test_parse_padding() {
        let config: GatedConvConfig = toml::from_str(
            r#"
            in_channels = 3
            out_channels = 16
            kernel_size = 3
            padding = 1
            [gate]
            density = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.padding, Padding::Explicit(1));
        assert_eq!(config.stride, 1);
        assert!(config.batch_norm);
    }

    #[test]
    fn test_network_validate_channel_chain() {
        let gate = GateParams::new(density(0.5));
        let network = NetworkConfig {
            in_channels: 3,
            image_size: 32,
            num_classes: 10,
            layers: vec![
                GatedConvConfig::new("conv1", 3, 8, 3, gate.clone()),
                GatedConvConfig::new("conv2", 4, 16, 3, gate),
            ],
        };
        assert!(matches!(network.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_eval_config_validate() {
        let mut config = EvalConfig::new("data/val");
        assert!(config.validate().is_ok());
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
