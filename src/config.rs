//! Training configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::real;

/// Which update rule the trainer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    /// Faster; slightly better accuracy for frequent words.
    Cbow,
    /// Slower; better for infrequent words.
    SkipGram,
}

impl ModelType {
    /// Learning rate used when the configuration does not override it.
    pub fn default_learning_rate(self) -> real {
        match self {
            ModelType::Cbow => 0.05,
            ModelType::SkipGram => 0.025,
        }
    }
}

/// Fixed configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub model: ModelType,
    /// Words with a corpus count below this are dropped from the vocabulary.
    pub min_frequency: u64,
    /// Number of worker threads requested; capped at the number of cores.
    pub threads: usize,
    /// Maximum half-width of the context window.
    pub window: usize,
    pub hierarchical_softmax: bool,
    /// Embedding dimensionality.
    pub layer_size: usize,
    /// Noise words drawn per positive example; 0 disables negative sampling.
    pub negative_samples: u32,
    /// Subsampling threshold; 0 disables subsampling.
    pub down_sample_rate: real,
    /// Full passes over the corpus.
    pub iterations: u32,
    /// Overrides the type-specific default learning rate.
    pub learning_rate: Option<real>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            model: ModelType::Cbow,
            min_frequency: 5,
            threads: 12,
            window: 5,
            hierarchical_softmax: false,
            layer_size: 100,
            negative_samples: 5,
            down_sample_rate: 1e-3,
            iterations: 5,
            learning_rate: None,
        }
    }
}

impl TrainingConfig {
    pub fn starting_alpha(&self) -> real {
        self.learning_rate
            .unwrap_or_else(|| self.model.default_learning_rate())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.hierarchical_softmax && self.negative_samples == 0 {
            return Err(Error::invalid_config(
                "at least one of hierarchical softmax and negative sampling must be enabled",
            ));
        }
        if self.iterations == 0 {
            return Err(Error::invalid_config("iterations must be at least 1"));
        }
        if self.layer_size == 0 {
            return Err(Error::invalid_config("layer size must be at least 1"));
        }
        if self.window == 0 {
            return Err(Error::invalid_config("window size must be at least 1"));
        }
        if self.threads == 0 {
            return Err(Error::invalid_config("thread count must be at least 1"));
        }
        if self.down_sample_rate < 0.0 {
            return Err(Error::invalid_config("down-sample rate must be non-negative"));
        }
        if let Some(alpha) = self.learning_rate {
            if alpha <= 0.0 {
                return Err(Error::invalid_config("learning rate must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TrainingConfig::default().validate().is_ok());
    }

    #[test]
    fn both_objectives_disabled_is_rejected() {
        let config = TrainingConfig {
            hierarchical_softmax: false,
            negative_samples: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let config = TrainingConfig {
            iterations: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn learning_rate_defaults_depend_on_model_type() {
        let cbow = TrainingConfig {
            model: ModelType::Cbow,
            ..TrainingConfig::default()
        };
        let sg = TrainingConfig {
            model: ModelType::SkipGram,
            ..TrainingConfig::default()
        };
        assert_eq!(cbow.starting_alpha(), 0.05);
        assert_eq!(sg.starting_alpha(), 0.025);
        let fixed = TrainingConfig {
            learning_rate: Some(0.1),
            ..sg
        };
        assert_eq!(fixed.starting_alpha(), 0.1);
    }
}
