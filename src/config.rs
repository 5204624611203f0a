use std::path::Path;

use crate::data::SyntheticConfig;
use crate::error::ConfigError;
use crate::training::trainer::TrainerConfig;

/// Network sizes. Images are flattened to `image_width * image_height`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub latent_dim: usize,
    pub hidden_dim: usize,
    pub image_width: usize,
    pub image_height: usize,
    pub discriminator_dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            latent_dim: 100,
            hidden_dim: 256,
            image_width: 28,
            image_height: 28,
            discriminator_dropout: 0.3,
        }
    }
}

impl ModelConfig {
    pub fn image_dim(&self) -> usize {
        self.image_width * self.image_height
    }
}

/// Adam settings for both players.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OptimConfig {
    pub generator_lr: f64,
    pub discriminator_lr: f64,
    pub beta_1: f32,
    pub beta_2: f32,
}

impl Default for OptimConfig {
    fn default() -> Self {
        OptimConfig {
            generator_lr: 2e-3,
            discriminator_lr: 2e-3,
            beta_1: 0.5,
            beta_2: 0.999,
        }
    }
}

/// Where real images come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    #[default]
    Synthetic,
    /// Requires the `mnist` feature.
    Mnist,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source: DatasetKind,
    pub synthetic: SyntheticConfig,
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub optim: OptimConfig,
    pub training: TrainerConfig,
    pub data: DataConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = &self.model;
        if model.latent_dim == 0 {
            return Err(ConfigError::Validation(
                "model.latent_dim must be > 0".into(),
            ));
        }
        if model.hidden_dim == 0 {
            return Err(ConfigError::Validation(
                "model.hidden_dim must be > 0".into(),
            ));
        }
        if model.image_dim() == 0 {
            return Err(ConfigError::Validation(
                "model.image_width and model.image_height must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&model.discriminator_dropout) {
            return Err(ConfigError::Validation(
                "model.discriminator_dropout must be in [0, 1)".into(),
            ));
        }

        let optim = &self.optim;
        if optim.generator_lr <= 0.0 {
            return Err(ConfigError::Validation(
                "optim.generator_lr must be > 0".into(),
            ));
        }
        if optim.discriminator_lr <= 0.0 {
            return Err(ConfigError::Validation(
                "optim.discriminator_lr must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&optim.beta_1) {
            return Err(ConfigError::Validation(
                "optim.beta_1 must be in [0, 1)".into(),
            ));
        }
        if !(0.0..1.0).contains(&optim.beta_2) {
            return Err(ConfigError::Validation(
                "optim.beta_2 must be in [0, 1)".into(),
            ));
        }

        let training = &self.training;
        if training.epochs == 0 {
            return Err(ConfigError::Validation(
                "training.epochs must be > 0".into(),
            ));
        }
        if training.batch_size == 0 {
            return Err(ConfigError::Validation(
                "training.batch_size must be > 0".into(),
            ));
        }
        if training.log_interval == 0 {
            return Err(ConfigError::Validation(
                "training.log_interval must be > 0".into(),
            ));
        }
        if training.sample_count == 0 {
            return Err(ConfigError::Validation(
                "training.sample_count must be > 0".into(),
            ));
        }
        if training.history_window == 0 {
            return Err(ConfigError::Validation(
                "training.history_window must be > 0".into(),
            ));
        }
        if training.max_iterations == Some(0) {
            return Err(ConfigError::Validation(
                "training.max_iterations must be > 0 when set".into(),
            ));
        }

        match self.data.source {
            DatasetKind::Synthetic => {
                let synthetic = &self.data.synthetic;
                if synthetic.width != model.image_width || synthetic.height != model.image_height {
                    return Err(ConfigError::Validation(format!(
                        "data.synthetic is {}x{} but the model expects {}x{}",
                        synthetic.width, synthetic.height, model.image_width, model.image_height
                    )));
                }
                if synthetic.num_images < training.batch_size {
                    return Err(ConfigError::Validation(
                        "data.synthetic.num_images must be >= training.batch_size".into(),
                    ));
                }
            }
            DatasetKind::Mnist => {
                if model.image_width != 28 || model.image_height != 28 {
                    return Err(ConfigError::Validation(
                        "mnist images are 28x28; set model.image_width/height to 28".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[optim]
generator_lr = 0.0001
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!((config.optim.generator_lr - 1e-4).abs() < 1e-12);
        // Other fields should be defaults
        assert!((config.optim.discriminator_lr - 2e-3).abs() < 1e-12);
        assert_eq!(config.model.latent_dim, 100);
        assert_eq!(config.training.epochs, 10);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        let default = AppConfig::default();
        assert_eq!(config.training.batch_size, default.training.batch_size);
        assert_eq!(config.data.source, DatasetKind::Synthetic);
        assert_eq!(config.training.max_iterations, None);
    }

    #[test]
    fn test_dataset_kind_parses_lowercase() {
        let config: AppConfig = toml::from_str("[data]\nsource = \"mnist\"\n").unwrap();
        assert_eq!(config.data.source, DatasetKind::Mnist);
        assert!(toml::from_str::<AppConfig>("[data]\nsource = \"cifar\"\n").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("nonexistent_config.toml")).unwrap();
        assert_eq!(config.training.epochs, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[training]
epochs = 3
max_iterations = 500
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.max_iterations, Some(500));
        // Others are defaults
        assert_eq!(config.training.batch_size, 64);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[training]\nepochs = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = AppConfig::load(Path::new("definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml();
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
    }

    #[test]
    fn test_validation_rejects_zero_epochs() {
        let mut config = AppConfig::default();
        config.training.epochs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_batch_size() {
        let mut config = AppConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_lr() {
        let mut config = AppConfig::default();
        config.optim.discriminator_lr = -0.001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_beta_out_of_range() {
        let mut config = AppConfig::default();
        config.optim.beta_2 = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_dropout_of_one() {
        let mut config = AppConfig::default();
        config.model.discriminator_dropout = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_latent_dim() {
        let mut config = AppConfig::default();
        config.model.latent_dim = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_log_interval() {
        let mut config = AppConfig::default();
        config.training.log_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_max_iterations() {
        let mut config = AppConfig::default();
        config.training.max_iterations = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_synthetic_size_mismatch() {
        let mut config = AppConfig::default();
        config.data.synthetic.width = 16;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "config validation error: data.synthetic is 16x28 but the model expects 28x28"
        );
    }

    #[test]
    fn test_validation_rejects_too_few_synthetic_images() {
        let mut config = AppConfig::default();
        config.data.synthetic.num_images = 10;
        config.training.batch_size = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_mnist_with_wrong_size() {
        let mut config = AppConfig::default();
        config.data.source = DatasetKind::Mnist;
        config.model.image_width = 32;
        assert!(config.validate().is_err());
    }
}
