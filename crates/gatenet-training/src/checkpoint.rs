//! Model checkpointing.
//!
//! Model records are written with burn's `CompactRecorder` (which appends
//! `.mpk`) next to a JSON metadata file:
//!
//! ```text
//! checkpoints/
//! ├── checkpoint_epoch_3.mpk
//! ├── checkpoint_epoch_3.json
//! └── latest.json
//! ```
//!
//! A load path may name a record (with or without `.mpk`) or a checkpoint
//! directory, in which case its most recent epoch is used.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use gatenet_core::{CheckpointConfig, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const RECORD_EXTENSION: &str = "mpk";

/// Metadata stored alongside a model record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Model name
    pub name: String,
    /// Dataset the model was trained on
    pub dataset: String,
    pub epoch: usize,
    pub timestamp: String,
    /// Validation top-1 accuracy at save time, if known
    pub top1: Option<f64>,
}

impl Checkpoint {
    /// Creates metadata stamped with the current time
    pub fn new(name: impl Into<String>, dataset: impl Into<String>, epoch: usize) -> Self {
        use chrono::Utc;
        Self {
            name: name.into(),
            dataset: dataset.into(),
            epoch,
            timestamp: Utc::now().to_rfc3339(),
            top1: None,
        }
    }

    /// Save checkpoint metadata to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize checkpoint: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load checkpoint metadata from file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Serialization(format!("Failed to deserialize checkpoint: {}", e)))
    }
}

/// Resolves checkpoint paths and moves model records in and out
#[derive(Debug, Clone)]
pub struct CheckpointHandler {
    name: String,
    dataset: String,
    load: Option<PathBuf>,
    save: Option<PathBuf>,
}

impl CheckpointHandler {
    pub fn new(name: impl Into<String>, dataset: impl Into<String>, config: &CheckpointConfig) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            load: config.load.clone(),
            save: config.save.clone(),
        }
    }

    /// Record path to load, without the `.mpk` extension
    ///
    /// `Ok(None)` when no load path is configured.
    pub fn load_path(&self) -> Result<Option<PathBuf>> {
        let Some(path) = &self.load else {
            return Ok(None);
        };

        if path.is_dir() {
            return latest_epoch(path)
                .map(|epoch| Some(path.join(record_stem(epoch))))
                .ok_or_else(|| {
                    Error::NotFound(format!("No checkpoint found in {}", path.display()))
                });
        }
        if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) && path.is_file() {
            return Ok(Some(path.with_extension("")));
        }
        if path.with_extension(RECORD_EXTENSION).is_file() {
            return Ok(Some(path.clone()));
        }
        Err(Error::NotFound(format!(
            "Checkpoint not found: {}",
            path.display()
        )))
    }

    /// Loads the configured record into `model`
    ///
    /// Without a configured load path the model keeps its fresh initialization.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model: M,
        device: &B::Device,
    ) -> Result<(M, Option<Checkpoint>)> {
        let Some(path) = self.load_path()? else {
            warn!("No checkpoint to load, using freshly initialized parameters");
            return Ok((model, None));
        };

        info!("Loading checkpoint from {}", path.display());
        let recorder = CompactRecorder::new();
        let model = model
            .load_file(&path, &recorder, device)
            .map_err(|e| Error::Checkpoint(format!("Failed to load {}: {:?}", path.display(), e)))?;

        let metadata_path = path.with_extension("json");
        let metadata = if metadata_path.is_file() {
            let checkpoint = Checkpoint::load(&metadata_path)?;
            if checkpoint.dataset != self.dataset {
                warn!(
                    "Checkpoint was trained on {} but is loaded for {}",
                    checkpoint.dataset, self.dataset
                );
            }
            Some(checkpoint)
        } else {
            None
        };

        Ok((model, metadata))
    }

    /// Saves `model` as `epoch` into the save directory, returning the record path
    pub fn save<B: Backend, M: Module<B>>(
        &self,
        model: M,
        epoch: usize,
        top1: Option<f64>,
    ) -> Result<PathBuf> {
        let dir = self
            .save
            .as_ref()
            .ok_or_else(|| Error::Checkpoint("No save path configured".to_string()))?;
        fs::create_dir_all(dir)?;

        let path = dir.join(record_stem(epoch));
        let recorder = CompactRecorder::new();
        model
            .save_file(&path, &recorder)
            .map_err(|e| Error::Checkpoint(format!("Failed to save {}: {:?}", path.display(), e)))?;

        let mut checkpoint = Checkpoint::new(&self.name, &self.dataset, epoch);
        checkpoint.top1 = top1;
        checkpoint.save(&path.with_extension("json"))?;
        checkpoint.save(&dir.join("latest.json"))?;

        info!("Checkpoint saved to {}", path.display());
        Ok(path)
    }
}

fn record_stem(epoch: usize) -> String {
    format!("checkpoint_epoch_{epoch}")
}

/// Extracts the epoch from a `checkpoint_epoch_<n>.mpk` filename
pub fn extract_epoch_from_filename(filename: &str) -> Option<usize> {
    filename
        .strip_prefix("checkpoint_epoch_")
        .and_then(|s| s.strip_suffix(".mpk"))
        .and_then(|s| s.parse().ok())
}

fn latest_epoch(dir: &Path) -> Option<usize> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(extract_epoch_from_filename)
        })
        .max()
}
