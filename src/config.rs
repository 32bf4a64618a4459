use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub model: ModelConfig,
    pub init: InitConfig,
    pub output: OutputConfig,
}

/// Road network parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Location identifier passed to the geographic data provider.
    pub place: String,
}

/// Disease model parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Probability of transmission per infected-susceptible contact and tick.
    pub infection_prob: f64,
    /// Contact radius, in the units of the node coordinates.
    pub distance_threshold: f64,
    /// Ticks spent exposed before becoming infectious.
    pub latent_period: usize,
    /// Ticks spent infectious before recovering or dying.
    pub recovery_period: usize,
    /// Probability of dying at the end of the infectious period.
    pub death_rate: f64,
}

/// Initial condition parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Number of agents created at the start.
    pub num_agents: usize,
    /// Random seed. Drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of ticks between snapshot saves.
    pub steps_per_save: usize,
    /// Number of saves written per trajectory file.
    pub saves_per_file: usize,
    /// Maximum run length in days (24 ticks each).
    #[serde(default)]
    pub total_days: Option<usize>,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Maximum number of ticks a run may advance, if bounded.
    pub fn max_ticks(&self) -> Option<usize> {
        self.output.total_days.map(|days| days * 24)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.place.trim().is_empty() {
            bail!("place must not be empty");
        }

        check_num(self.model.infection_prob, 0.0..=1.0).context("invalid infection probability")?;
        check_num(self.model.distance_threshold, 0.0..f64::INFINITY)
            .context("invalid distance threshold")?;
        check_num(self.model.latent_period, 0..100_000).context("invalid latent period")?;
        check_num(self.model.recovery_period, 0..100_000).context("invalid recovery period")?;
        check_num(self.model.death_rate, 0.0..=1.0).context("invalid death rate")?;

        check_num(self.init.num_agents, 1..1_000_000).context("invalid number of agents")?;

        check_num(self.output.steps_per_save, 1..100_000)
            .context("invalid number of steps per save")?;
        check_num(self.output.saves_per_file, 1..100_000)
            .context("invalid number of saves per file")?;
        if let Some(total_days) = self.output.total_days {
            check_num(total_days, 1..100_000).context("invalid total number of days")?;
        }

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    // NaN fails every range check.
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        Config {
            network: NetworkConfig {
                place: "grid:6x6".to_string(),
            },
            model: ModelConfig {
                infection_prob: 0.2,
                distance_threshold: 0.001,
                latent_period: 5,
                recovery_period: 10,
                death_rate: 0.01,
            },
            init: InitConfig {
                num_agents: 50,
                seed: Some(7),
            },
            output: OutputConfig {
                steps_per_save: 4,
                saves_per_file: 6,
                total_days: None,
            },
        }
    }

    #[test]
    fn parses_sectioned_toml() {
        let config = Config::from_toml(
            r#"
[network]
place = "grid:10x10"

[model]
infection_prob = 0.2
distance_threshold = 0.5
latent_period = 120
recovery_period = 168
death_rate = 0.01

[init]
num_agents = 50

[output]
steps_per_save = 24
saves_per_file = 7
total_days = 30
"#,
        )
        .unwrap();

        assert_eq!(config.network.place, "grid:10x10");
        assert_eq!(config.model.latent_period, 120);
        assert_eq!(config.init.seed, None);
        assert_eq!(config.max_ticks(), Some(720));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = test_config();
        config.model.infection_prob = 1.5;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.model.distance_threshold = -1.0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.model.distance_threshold = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.model.death_rate = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.init.num_agents = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.network.place = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_infinite_threshold_in_toml() {
        let contents = r#"
[network]
place = "grid:4x4"

[model]
infection_prob = 1.0
distance_threshold = inf
latent_period = 5
recovery_period = 10
death_rate = 0.0

[init]
num_agents = 10

[output]
steps_per_save = 1
saves_per_file = 1
"#;
        assert!(Config::from_toml(contents).is_err());
    }

    #[test]
    fn accepts_zero_distance_threshold() {
        let mut config = test_config();
        config.model.distance_threshold = 0.0;
        config.model.latent_period = 0;
        config.model.recovery_period = 0;
        assert!(config.validate().is_ok());
    }
}
