use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::labels::{one_hot_cross_entropy, LabelPair, NUM_CLASSES};
use super::{Player, TrainState};
use crate::error::StepError;
use crate::networks::{ImageDiscriminator, ImageGenerator, Mode};

/// Loss between `[n, 2]` logits and `[n, 2]` targets, mean-reduced to `[1]`.
pub type Criterion<B> = fn(Tensor<B, 2>, Tensor<B, 2>) -> Tensor<B, 1>;

/// Hyperparameters of one alternating update.
#[derive(Debug, Clone)]
pub struct GanStepConfig {
    pub latent_dim: usize,
    pub image_dim: usize,
    pub generator_lr: f64,
    pub discriminator_lr: f64,
    /// Base seed for per-iteration noise.
    pub seed: u64,
    pub check_finite: bool,
}

impl Default for GanStepConfig {
    fn default() -> Self {
        GanStepConfig {
            latent_dim: 100,
            image_dim: 784,
            generator_lr: 2e-3,
            discriminator_lr: 2e-3,
            seed: 42,
            check_finite: true,
        }
    }
}

/// Alternating GAN update: discriminator first, then the generator against
/// the freshly updated discriminator.
pub struct GanStep<B: AutodiffBackend> {
    config: GanStepConfig,
    criterion: Criterion<B>,
    device: B::Device,
}

impl<B: AutodiffBackend> GanStep<B> {
    pub fn new(config: GanStepConfig, device: &B::Device) -> Self {
        GanStep {
            config,
            criterion: one_hot_cross_entropy::<B>,
            device: device.clone(),
        }
    }

    /// Replace the default one-hot cross-entropy.
    pub fn with_criterion(mut self, criterion: Criterion<B>) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn config(&self) -> &GanStepConfig {
        &self.config
    }

    /// Standard-normal noise `[batch, latent_dim]` for `iteration`. Derived
    /// from the base seed and the iteration only, so replaying a step draws
    /// the same noise.
    pub fn sample_noise(&self, iteration: usize, batch: usize) -> Tensor<B, 2> {
        let mut rng = StdRng::seed_from_u64(noise_seed(self.config.seed, iteration));
        let data: Vec<f32> = (0..batch * self.config.latent_dim)
            .map(|_| rng.sample(StandardNormal))
            .collect();
        Tensor::from_data(
            TensorData::new(data, [batch, self.config.latent_dim]),
            &self.device,
        )
    }

    /// Process one batch of real images `[batch, image_dim]`.
    pub fn step<G, D, OG, OD>(
        &self,
        state: TrainState<G, D, OG, OD>,
        real: Tensor<B, 2>,
    ) -> Result<TrainState<G, D, OG, OD>, StepError>
    where
        G: AutodiffModule<B> + ImageGenerator<B>,
        D: AutodiffModule<B> + ImageDiscriminator<B>,
        OG: Optimizer<G, B>,
        OD: Optimizer<D, B>,
    {
        let [batch, _] = real.dims();
        let noise = self.sample_noise(state.iteration, batch);
        self.step_with_noise(state, real, noise)
    }

    /// [`GanStep::step`] with pinned noise.
    pub fn step_with_noise<G, D, OG, OD>(
        &self,
        state: TrainState<G, D, OG, OD>,
        real: Tensor<B, 2>,
        noise: Tensor<B, 2>,
    ) -> Result<TrainState<G, D, OG, OD>, StepError>
    where
        G: AutodiffModule<B> + ImageGenerator<B>,
        D: AutodiffModule<B> + ImageDiscriminator<B>,
        OG: Optimizer<G, B>,
        OD: Optimizer<D, B>,
    {
        let [batch, image_dim] = real.dims();
        if batch == 0 || image_dim != self.config.image_dim {
            return Err(StepError::ShapeMismatch {
                what: "real batch",
                expected: vec![batch.max(1), self.config.image_dim],
                actual: vec![batch, image_dim],
            });
        }
        expect_shape("noise", noise.dims(), [batch, self.config.latent_dim])?;

        let criterion = self.criterion;
        let labels = LabelPair::<B>::new(batch, &self.device);
        let TrainState {
            iteration,
            discriminator,
            generator,
        } = state;

        // Discriminator sub-step. Detaching the fakes keeps the generator out
        // of the gradient.
        let fake = generator.model.generate(noise.clone(), Mode::Train).detach();
        expect_shape("generated batch", fake.dims(), [batch, image_dim])?;
        let images = Tensor::cat(vec![fake, real], 0);
        let targets = Tensor::cat(vec![labels.fake, labels.real.clone()], 0);

        let discriminator = discriminator.update(
            Player::Discriminator,
            self.config.discriminator_lr,
            iteration,
            self.config.check_finite,
            |d| {
                let logits = d.classify(images, Mode::Train);
                expect_shape("discriminator logits", logits.dims(), [2 * batch, NUM_CLASSES])?;
                Ok(criterion(logits, targets))
            },
        )?;

        // Generator sub-step against the updated discriminator, frozen.
        let frozen = discriminator.model.clone().no_grad();
        let generator = generator.update(
            Player::Generator,
            self.config.generator_lr,
            iteration,
            self.config.check_finite,
            |g| {
                let logits = frozen.classify(g.generate(noise, Mode::Train), Mode::Inference);
                expect_shape("discriminator logits", logits.dims(), [batch, NUM_CLASSES])?;
                Ok(criterion(logits, labels.real))
            },
        )?;

        Ok(TrainState {
            iteration: iteration + 1,
            discriminator,
            generator,
        })
    }
}

pub(crate) fn noise_seed(seed: u64, iteration: usize) -> u64 {
    seed ^ (iteration as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn expect_shape(
    what: &'static str,
    actual: [usize; 2],
    expected: [usize; 2],
) -> Result<(), StepError> {
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
