use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, sigmoid};

use super::{ImageGenerator, Mode};

const LEAKY_SLOPE: f64 = 0.2;

/// Feed-forward generator.
///
/// ```text
/// Input:  [batch, latent_dim]
/// FC1:    latent_dim -> hidden,     LeakyReLU(0.2)
/// FC2:    hidden -> 2*hidden,       LeakyReLU(0.2)
/// FC3:    2*hidden -> 4*hidden,     LeakyReLU(0.2)
/// Out:    4*hidden -> image_dim,    Sigmoid
/// ```
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    out: Linear<B>,
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    pub latent_dim: usize,
    pub image_dim: usize,
    #[config(default = 256)]
    pub hidden_dim: usize,
}

impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let h = self.hidden_dim;
        Generator {
            fc1: LinearConfig::new(self.latent_dim, h).init(device),
            fc2: LinearConfig::new(h, 2 * h).init(device),
            fc3: LinearConfig::new(2 * h, 4 * h).init(device),
            out: LinearConfig::new(4 * h, self.image_dim).init(device),
        }
    }
}

impl<B: Backend> Generator<B> {
    /// Forward pass: noise [batch, latent_dim] -> images [batch, image_dim].
    pub fn forward(&self, noise: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = leaky_relu(self.fc1.forward(noise), LEAKY_SLOPE);
        let x = leaky_relu(self.fc2.forward(x), LEAKY_SLOPE);
        let x = leaky_relu(self.fc3.forward(x), LEAKY_SLOPE);
        sigmoid(self.out.forward(x))
    }
}

impl<B: Backend> ImageGenerator<B> for Generator<B> {
    // No mode-dependent layers.
    fn generate(&self, noise: Tensor<B, 2>, _mode: Mode) -> Tensor<B, 2> {
        self.forward(noise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_generator_output_shape() {
        let device = Default::default();
        let generator = GeneratorConfig::new(16, 64)
            .with_hidden_dim(8)
            .init::<TestBackend>(&device);

        let noise = Tensor::zeros([3, 16], &device);
        let images = generator.generate(noise, Mode::Train);
        assert_eq!(images.dims(), [3, 64]);
    }

    #[test]
    fn test_generator_output_in_unit_range() {
        let device = Default::default();
        let generator = GeneratorConfig::new(4, 9)
            .with_hidden_dim(8)
            .init::<TestBackend>(&device);

        let noise = Tensor::<TestBackend, 2>::ones([5, 4], &device).mul_scalar(3.0);
        let pixels: Vec<f32> = generator
            .generate(noise, Mode::Inference)
            .into_data()
            .to_vec()
            .unwrap();
        assert!(pixels.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
