//! One-hot label layout shared by the criterion and both players.
//!
//! Column [`FAKE`] scores "generated", column [`REAL`] scores "drawn from the
//! dataset". The generator is trained against the `REAL` column.

use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::TensorData;

pub const NUM_CLASSES: usize = 2;
pub const FAKE: usize = 0;
pub const REAL: usize = 1;

/// `[batch, NUM_CLASSES]` one-hot rows with a 1 in column `class`.
pub fn one_hot<B: Backend>(batch: usize, class: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut data = vec![0.0f32; batch * NUM_CLASSES];
    for row in data.chunks_exact_mut(NUM_CLASSES) {
        row[class] = 1.0;
    }
    Tensor::from_data(TensorData::new(data, [batch, NUM_CLASSES]), device)
}

/// Matching fake/real label batches for one step.
#[derive(Debug, Clone)]
pub struct LabelPair<B: Backend> {
    pub fake: Tensor<B, 2>,
    pub real: Tensor<B, 2>,
}

impl<B: Backend> LabelPair<B> {
    pub fn new(batch: usize, device: &B::Device) -> Self {
        LabelPair {
            fake: one_hot(batch, FAKE, device),
            real: one_hot(batch, REAL, device),
        }
    }
}

/// Mean cross-entropy between logits and one-hot (or soft) targets.
pub fn one_hot_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    -(targets * log_probs).sum_dim(1).mean()
}
