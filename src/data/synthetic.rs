use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::DataError;

use super::InMemoryImages;

/// Shape of the synthetic image set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub num_images: usize,
    pub width: usize,
    pub height: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            num_images: 2048,
            width: 28,
            height: 28,
            seed: 7,
        }
    }
}

/// Images of a single Gaussian blob with random centre and spread, scaled to
/// `[0, 1]`. Stands in for a real dataset when none is available.
pub fn synthetic_blobs<B: Backend>(
    config: &SyntheticConfig,
    batch_size: usize,
    device: &B::Device,
) -> Result<InMemoryImages<B>, DataError> {
    let (w, h) = (config.width, config.height);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut pixels = Vec::with_capacity(config.num_images * w * h);

    for _ in 0..config.num_images {
        let cx = rng.random_range(0.25..0.75) * w as f32;
        let cy = rng.random_range(0.25..0.75) * h as f32;
        let sigma = rng.random_range(0.08..0.2) * w.min(h) as f32;
        let denom = 2.0 * sigma * sigma;

        for y in 0..h {
            for x in 0..w {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                pixels.push((-(dx * dx + dy * dy) / denom).exp());
            }
        }
    }

    InMemoryImages::new(pixels, w * h, batch_size, device)
}
