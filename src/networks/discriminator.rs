use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;

use super::{ImageDiscriminator, Mode};
use crate::gan::labels::NUM_CLASSES;

const LEAKY_SLOPE: f64 = 0.2;

/// Feed-forward two-class discriminator.
///
/// ```text
/// Input:  [batch, image_dim]
/// FC1:    image_dim -> 2*hidden, LeakyReLU(0.2), Dropout (train only)
/// FC2:    2*hidden -> hidden,    LeakyReLU(0.2), Dropout (train only)
/// Out:    hidden -> 2            (logits: fake, real)
/// ```
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
    dropout: Dropout,
}

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    pub image_dim: usize,
    #[config(default = 256)]
    pub hidden_dim: usize,
    #[config(default = 0.3)]
    pub dropout: f64,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let h = self.hidden_dim;
        Discriminator {
            fc1: LinearConfig::new(self.image_dim, 2 * h).init(device),
            fc2: LinearConfig::new(2 * h, h).init(device),
            out: LinearConfig::new(h, NUM_CLASSES).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

impl<B: Backend> Discriminator<B> {
    /// Forward pass: images [batch, image_dim] -> logits [batch, 2].
    pub fn forward(&self, images: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2> {
        let x = leaky_relu(self.fc1.forward(images), LEAKY_SLOPE);
        let x = self.regularize(x, mode);
        let x = leaky_relu(self.fc2.forward(x), LEAKY_SLOPE);
        let x = self.regularize(x, mode);
        self.out.forward(x)
    }

    fn regularize(&self, x: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2> {
        match mode {
            Mode::Train => self.dropout.forward(x),
            Mode::Inference => x,
        }
    }
}

impl<B: Backend> ImageDiscriminator<B> for Discriminator<B> {
    fn classify(&self, images: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2> {
        self.forward(images, mode)
    }
}
