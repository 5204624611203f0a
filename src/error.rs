use std::path::PathBuf;

use crate::engine::Event;
use crate::gan::Player;

/// Errors raised inside a single GAN step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{what} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{player} loss became non-finite ({value}) at iteration {iteration}")]
    NonFiniteLoss {
        player: Player,
        iteration: usize,
        value: f32,
    },
}

/// Errors raised while building a data source.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("batch size must be > 0")]
    ZeroBatchSize,

    #[error("pixel buffer of length {len} does not split into images of {image_dim} pixels")]
    RaggedImages { len: usize, image_dim: usize },

    #[error("pixel {index} has value {value}, expected a value in [0, 1]")]
    PixelOutOfRange { index: usize, value: f32 },

    #[error("dataset `{0}` requires building with the `{0}` feature")]
    FeatureDisabled(&'static str),
}

/// Errors raised by run observers (loggers, samplers, sinks).
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sample sink rejected batch: {0}")]
    Sink(String),

    #[error("could not read generated samples: {0}")]
    Readback(String),
}

/// Errors that can occur during GAN training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("step failed: {0}")]
    Step(#[from] StepError),

    #[error("observer failed: {0}")]
    Observer(#[from] ObserverError),
}

/// Errors surfaced by [`crate::engine::Loop::run`].
#[derive(Debug, thiserror::Error)]
pub enum LoopError<E> {
    #[error("initializer failed: {0}")]
    Init(#[source] E),

    #[error("step failed at epoch {epoch}, iteration {iteration}: {source}")]
    Step {
        epoch: usize,
        iteration: usize,
        #[source]
        source: E,
    },

    #[error("handler `{handler}` failed on {event}: {source}")]
    Handler {
        event: Event,
        handler: String,
        #[source]
        source: E,
    },
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
