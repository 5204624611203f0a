use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::DataError;

use super::DataSource;

/// Flattened images held in host memory, served as `[batch_size, image_dim]`
/// tensors. Pixels must already be scaled to `[0, 1]`. A trailing partial
/// batch is dropped so every batch has the same shape.
pub struct InMemoryImages<B: Backend> {
    pixels: Vec<f32>,
    image_dim: usize,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> InMemoryImages<B> {
    pub fn new(
        pixels: Vec<f32>,
        image_dim: usize,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<Self, DataError> {
        if batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        if image_dim == 0 || pixels.len() % image_dim != 0 {
            return Err(DataError::RaggedImages {
                len: pixels.len(),
                image_dim,
            });
        }
        if let Some((index, &value)) = pixels
            .iter()
            .enumerate()
            .find(|(_, p)| !(0.0..=1.0).contains(*p))
        {
            return Err(DataError::PixelOutOfRange { index, value });
        }

        Ok(InMemoryImages {
            pixels,
            image_dim,
            batch_size,
            device: device.clone(),
        })
    }

    pub fn image_dim(&self) -> usize {
        self.image_dim
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_images(&self) -> usize {
        self.pixels.len() / self.image_dim
    }

    /// Full batches served per epoch.
    pub fn num_batches(&self) -> usize {
        self.num_images() / self.batch_size
    }

    /// Raw pixels of image `index`.
    pub fn image(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.image_dim)?;
        self.pixels.get(start..start + self.image_dim)
    }
}

impl<B: Backend> DataSource for InMemoryImages<B> {
    type Batch = Tensor<B, 2>;

    fn batches(&self) -> Box<dyn Iterator<Item = Tensor<B, 2>> + '_> {
        let shape = [self.batch_size, self.image_dim];
        Box::new(
            self.pixels
                .chunks_exact(self.batch_size * self.image_dim)
                .map(move |chunk| {
                    Tensor::<B, 2>::from_data(TensorData::new(chunk.to_vec(), shape), &self.device)
                }),
        )
    }

    fn batches_per_epoch(&self) -> Option<usize> {
        Some(self.num_batches())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batches_have_fixed_shape() {
        let device = Default::default();
        // 5 images of 4 pixels, batch 2 -> 2 batches, 1 image dropped.
        let pixels: Vec<f32> = (0..20).map(|i| i as f32 / 20.0).collect();
        let source = InMemoryImages::<TestBackend>::new(pixels, 4, 2, &device).unwrap();

        assert_eq!(source.num_images(), 5);
        assert_eq!(source.num_batches(), 2);
        assert_eq!(source.batches_per_epoch(), Some(2));

        let batches: Vec<Tensor<TestBackend, 2>> = source.batches().collect();
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert_eq!(batch.dims(), [2, 4]);
        }

        let second: Vec<f32> = batches[1].clone().into_data().to_vec().unwrap();
        assert!((second[0] - 8.0 / 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_restartable() {
        let device = Default::default();
        let source =
            InMemoryImages::<TestBackend>::new(vec![0.5; 12], 3, 2, &device).unwrap();
        assert_eq!(source.batches().count(), 2);
        assert_eq!(source.batches().count(), 2);
    }

    #[test]
    fn test_rejects_ragged_buffer() {
        let device = Default::default();
        let err = InMemoryImages::<TestBackend>::new(vec![0.0; 10], 4, 2, &device);
        assert!(matches!(
            err,
            Err(DataError::RaggedImages { len: 10, image_dim: 4 })
        ));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let device = Default::default();
        let err = InMemoryImages::<TestBackend>::new(vec![0.0; 8], 4, 0, &device);
        assert!(matches!(err, Err(DataError::ZeroBatchSize)));
    }

    #[test]
    fn test_rejects_unnormalized_pixels() {
        let device = Default::default();
        let mut pixels = vec![0.0; 8];
        pixels[5] = 255.0;
        let err = InMemoryImages::<TestBackend>::new(pixels, 4, 1, &device);
        assert!(matches!(
            err,
            Err(DataError::PixelOutOfRange { index: 5, .. })
        ));
    }

    #[test]
    fn test_image_lookup() {
        let device = Default::default();
        let pixels = vec![0.1, 0.2, 0.3, 0.4];
        let source = InMemoryImages::<TestBackend>::new(pixels, 2, 1, &device).unwrap();
        assert_eq!(source.image(1), Some(&[0.3, 0.4][..]));
        assert_eq!(source.image(2), None);
    }
}
