//! Image folder scanning.
//!
//! The expected layout is one sub-directory per class:
//!
//! ```text
//! root/
//! ├── class_a/
//! │   ├── 0001.jpg
//! │   └── 0002.png
//! └── class_b/
//!     └── ...
//! ```
//!
//! Class names are sorted, and a sample's label is its class index.

use std::path::{Path, PathBuf};

use gatenet_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single labelled image on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class index
    pub label: usize,
}

/// Labelled images found under a root directory
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root_dir: PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scans `root_dir` for class directories and their images
    pub fn scan(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning image folder {}", root_dir.display());

        if !root_dir.exists() {
            return Err(Error::NotFound(format!(
                "Dataset directory not found: {}",
                root_dir.display()
            )));
        }
        if !root_dir.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "Path is not a directory: {}",
                root_dir.display()
            )));
        }

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let mut paths: Vec<PathBuf> = WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|path| path.is_file() && is_image(path))
                .collect();
            paths.sort();

            debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());
            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
        }

        if samples.is_empty() {
            return Err(Error::Dataset(format!(
                "No images found under {}",
                root_dir.display()
            )));
        }
        info!("Found {} images in {} classes", samples.len(), classes.len());

        Ok(Self {
            root_dir,
            classes,
            samples,
        })
    }

    /// Root directory
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Sorted class names
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// All samples, grouped by class
    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Keeps only the first `num_examples` samples
    pub fn truncate(&mut self, num_examples: usize) {
        self.samples.truncate(num_examples);
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
