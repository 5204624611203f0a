//! MNIST through burn's dataset layer (download and decoding happen there).

use burn::data::dataset::vision::MnistDataset;
use burn::data::dataset::Dataset;
use burn::prelude::*;

use crate::error::DataError;

use super::InMemoryImages;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;

/// MNIST training split, pixels scaled from `0..=255` to `[0, 1]`.
pub fn mnist_train<B: Backend>(
    batch_size: usize,
    device: &B::Device,
) -> Result<InMemoryImages<B>, DataError> {
    let dataset = MnistDataset::train();
    let mut pixels = Vec::with_capacity(dataset.len() * WIDTH * HEIGHT);
    for item in dataset.iter() {
        for row in item.image.iter() {
            pixels.extend(row.iter().map(|p| p / 255.0));
        }
    }
    tracing::info!(images = dataset.len(), "Loaded MNIST training split");
    InMemoryImages::new(pixels, WIDTH * HEIGHT, batch_size, device)
}
