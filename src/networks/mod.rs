mod discriminator;
mod generator;

use burn::prelude::*;

pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig};

/// Forward-pass behaviour requested by the caller. Passed explicitly at every
/// call site; nothing in the models toggles it implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Training-time behaviour (dropout active).
    Train,
    /// Inference-time behaviour (deterministic).
    Inference,
}

/// Maps latent noise `[batch, latent_dim]` to flattened images
/// `[batch, image_dim]` in `[0, 1]`.
pub trait ImageGenerator<B: Backend> {
    fn generate(&self, noise: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2>;
}

/// Scores flattened images `[batch, image_dim]` with two-class logits
/// `[batch, 2]` (see [`crate::gan::labels`] for the column meaning).
pub trait ImageDiscriminator<B: Backend> {
    fn classify(&self, images: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2>;
}
