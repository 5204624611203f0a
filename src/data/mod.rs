//! Batch sources for the training loop: a restartable, finite sequence of
//! fixed-size batches, re-iterated once per epoch.

mod images;
#[cfg(feature = "mnist")]
pub mod mnist;
mod synthetic;

use burn::prelude::*;

pub use images::InMemoryImages;
pub use synthetic::{synthetic_blobs, SyntheticConfig};

use crate::config::{DataConfig, DatasetKind};
use crate::error::DataError;

/// Finite, restartable sequence of batches.
///
/// Every call to [`DataSource::batches`] starts a fresh pass; the loop asks for
/// a new iterator at the start of each epoch.
pub trait DataSource {
    type Batch;

    fn batches(&self) -> Box<dyn Iterator<Item = Self::Batch> + '_>;

    /// Number of batches in one pass, when known up front.
    fn batches_per_epoch(&self) -> Option<usize> {
        None
    }
}

impl<T: Clone> DataSource for Vec<T> {
    type Batch = T;

    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_> {
        Box::new(self.iter().cloned())
    }

    fn batches_per_epoch(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// Build the image source selected by `config`.
pub fn load_images<B: Backend>(
    config: &DataConfig,
    batch_size: usize,
    device: &B::Device,
) -> Result<InMemoryImages<B>, DataError> {
    match config.source {
        DatasetKind::Synthetic => {
            let images = synthetic_blobs(&config.synthetic, batch_size, device)?;
            tracing::info!(
                images = images.num_images(),
                width = config.synthetic.width,
                height = config.synthetic.height,
                "Generated synthetic blobs"
            );
            Ok(images)
        }
        #[cfg(feature = "mnist")]
        DatasetKind::Mnist => mnist::mnist_train(batch_size, device),
        #[cfg(not(feature = "mnist"))]
        DatasetKind::Mnist => Err(DataError::FeatureDisabled("mnist")),
    }
}
