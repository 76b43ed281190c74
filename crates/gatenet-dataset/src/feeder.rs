//! Background batch feeding.
//!
//! A `Feeder` owns worker threads that load and preprocess batches ahead of
//! the consumer. Worker `w` prepares batches `w, w + workers, w + 2 * workers, ...`
//! into its own bounded channel and the consumer reads the channels round-robin,
//! so batches arrive in order regardless of which worker finishes first.
//!
//! The dataset is cycled endlessly; the consumer decides how many batches to
//! take. A shared stop flag ends the workers early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use burn::prelude::*;
use gatenet_core::{EvalConfig, Error, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::loader::ImageSample;
use crate::preprocess::ImagePreprocessor;

/// Batch feeding settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeederConfig {
    pub batch_size: usize,
    pub num_workers: usize,
    /// Prepared batches buffered ahead of the consumer
    pub queue_capacity: usize,
}

impl From<&EvalConfig> for FeederConfig {
    fn from(config: &EvalConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            num_workers: config.num_workers,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// A preprocessed batch
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of the batch in the feeding order
    pub index: usize,
    /// Images, `[batch_size, channels, height, width]` flattened
    pub images: Vec<f32>,
    pub labels: Vec<usize>,
    /// Samples taken before the dataset wrapped around
    pub len: usize,
    /// `[channels, height, width]` of one image
    pub image_shape: [usize; 3],
}

impl Batch {
    /// Number of images, wrapped samples included
    pub fn batch_size(&self) -> usize {
        self.labels.len()
    }

    /// Builds image and label tensors on `device`
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 4>, Tensor<B, 1, Int>) {
        let [channels, height, width] = self.image_shape;
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(
                self.images.clone(),
                [self.batch_size(), channels, height, width],
            ),
            device,
        );
        let labels: Vec<i64> = self.labels.iter().map(|&label| label as i64).collect();
        let labels =
            Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [self.batch_size()]), device);
        (images, labels)
    }
}

/// Prepares batches on background threads
pub struct Feeder {
    receivers: Vec<Receiver<Result<Batch>>>,
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    next: usize,
}

impl Feeder {
    /// Starts the workers over `samples`
    pub fn spawn(
        samples: Vec<ImageSample>,
        preprocessor: ImagePreprocessor,
        config: FeederConfig,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::Dataset("Cannot feed an empty dataset".to_string()));
        }
        if config.batch_size == 0 || config.num_workers == 0 {
            return Err(Error::InvalidArgument(
                "batch_size and num_workers must be greater than 0".to_string(),
            ));
        }

        let samples: Arc<[ImageSample]> = samples.into();
        let preprocessor = Arc::new(preprocessor);
        let capacity = config.queue_capacity.div_ceil(config.num_workers).max(1);

        let mut receivers = Vec::with_capacity(config.num_workers);
        let mut workers = Vec::with_capacity(config.num_workers);
        for worker in 0..config.num_workers {
            let (sender, receiver) = sync_channel(capacity);
            let samples = Arc::clone(&samples);
            let preprocessor = Arc::clone(&preprocessor);
            let stop = Arc::clone(&stop);
            let handle = std::thread::Builder::new()
                .name(format!("feeder-{worker}"))
                .spawn(move || {
                    feed(worker, &samples, &preprocessor, config, &stop, sender);
                })?;
            receivers.push(receiver);
            workers.push(handle);
        }
        debug!(
            "Started {} feeder workers (batch size {}, {} batches buffered each)",
            config.num_workers, config.batch_size, capacity
        );

        Ok(Self {
            receivers,
            workers,
            stop,
            next: 0,
        })
    }

    /// Shared stop flag
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Next batch in order, `None` once stopped
    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.stop.load(Ordering::Relaxed) || self.receivers.is_empty() {
            return None;
        }
        let receiver = &self.receivers[self.next % self.receivers.len()];
        self.next += 1;
        receiver.recv().ok()
    }

    /// Requests stop and joins the workers
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // unblocks workers waiting on a full channel
        self.receivers.clear();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("A feeder worker panicked");
            }
        }
    }
}

impl Iterator for Feeder {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn feed(
    worker: usize,
    samples: &[ImageSample],
    preprocessor: &ImagePreprocessor,
    config: FeederConfig,
    stop: &AtomicBool,
    sender: SyncSender<Result<Batch>>,
) {
    let mut index = worker;
    while !stop.load(Ordering::Relaxed) {
        let batch = load_batch(samples, preprocessor, config.batch_size, index);
        let failed = batch.is_err();
        if sender.send(batch).is_err() || failed {
            break;
        }
        index += config.num_workers;
    }
    debug!("Feeder worker {} finished", worker);
}

fn load_batch(
    samples: &[ImageSample],
    preprocessor: &ImagePreprocessor,
    batch_size: usize,
    index: usize,
) -> Result<Batch> {
    let num_samples = samples.len();
    let start = (index * batch_size) % num_samples;
    let picked: Vec<&ImageSample> = (0..batch_size)
        .map(|offset| &samples[(start + offset) % num_samples])
        .collect();

    let images = picked
        .par_iter()
        .map(|sample| preprocessor.preprocess_from_path(&sample.path))
        .collect::<Result<Vec<_>>>()?;

    Ok(Batch {
        index,
        images: images.concat(),
        labels: picked.iter().map(|sample| sample.label).collect(),
        len: (num_samples - start).min(batch_size),
        image_shape: preprocessor.output_shape(),
    })
}
