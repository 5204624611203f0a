//! Training infrastructure: the GAN trainer, loop observers and rolling
//! metrics.

pub mod metrics;
pub mod observers;
pub mod trainer;
