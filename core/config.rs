/*!
This module defines the `Config` struct, which is used to configure a training run with [`train`](../train/fn.train.html). Every field is optional. A config file is written in YAML:

```yaml
label_column: SepsisLabel
test_fraction: 0.2
split_seed: 42
resample_seed: 7
cv_folds: 5
artifact_base_path: model-run-20240101-120000
tracking:
  dir: runs
  experiment: sepsis
storage:
  root: /data/blobs
grid:
  logistic_regression:
    c: [0.1, 1, 10]
    solver: [newton]
```
*/

use anyhow::{Context, Result};
use sepsis_linear::Solver;
use sepsis_storage::StorageConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_LABEL_COLUMN: &str = "SepsisLabel";
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SPLIT_SEED: u64 = 42;
pub const DEFAULT_CV_FOLDS: usize = 5;
pub const DEFAULT_TRACKING_DIR: &str = "runs";
pub const DEFAULT_EXPERIMENT: &str = "sepsis";

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
	pub label_column: Option<String>,
	/// The fraction of the resampled pool held out for validation.
	pub test_fraction: Option<f64>,
	pub split_seed: Option<u64>,
	/// If set, the majority class is undersampled reproducibly. Otherwise every run draws a different subsample.
	pub resample_seed: Option<u64>,
	pub cv_folds: Option<usize>,
	pub artifact_base_path: Option<PathBuf>,
	pub tracking: Option<TrackingConfig>,
	pub storage: Option<StorageConfig>,
	pub grid: Option<GridConfig>,
}

#[derive(Debug, serde::Deserialize)]
pub struct TrackingConfig {
	pub dir: PathBuf,
	pub experiment: Option<String>,
}

/// Overrides for the hyperparameter grid of each model family. A family or value list that is not given keeps its default.
#[derive(Debug, Default, serde::Deserialize)]
pub struct GridConfig {
	pub random_forest: Option<RandomForestGridConfig>,
	pub gradient_boosted_trees: Option<GbtGridConfig>,
	pub logistic_regression: Option<LogisticRegressionGridConfig>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RandomForestGridConfig {
	pub n_estimators: Option<Vec<usize>>,
	/// `null` grows trees without a depth limit.
	pub max_depth: Option<Vec<Option<usize>>>,
	pub min_samples_split: Option<Vec<usize>>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct GbtGridConfig {
	pub n_estimators: Option<Vec<usize>>,
	pub max_depth: Option<Vec<usize>>,
	pub learning_rate: Option<Vec<f32>>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct LogisticRegressionGridConfig {
	pub c: Option<Vec<f32>>,
	pub solver: Option<Vec<Solver>>,
}

impl Config {
	/// Load the config from the file at `path`, or use the defaults if no path is given.
	pub fn load(path: Option<&Path>) -> Result<Config> {
		let path = match path {
			Some(path) => path,
			None => return Ok(Config::default()),
		};
		let config = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read config file {}", path.display()))?;
		let config = serde_yaml::from_str(&config)
			.with_context(|| format!("failed to parse config file {}", path.display()))?;
		Ok(config)
	}

	pub fn label_column(&self) -> &str {
		self.label_column.as_deref().unwrap_or(DEFAULT_LABEL_COLUMN)
	}

	pub fn test_fraction(&self) -> f64 {
		self.test_fraction.unwrap_or(DEFAULT_TEST_FRACTION)
	}

	pub fn split_seed(&self) -> u64 {
		self.split_seed.unwrap_or(DEFAULT_SPLIT_SEED)
	}

	pub fn cv_folds(&self) -> usize {
		self.cv_folds.unwrap_or(DEFAULT_CV_FOLDS)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_parse_config() {
		let config: Config = serde_yaml::from_str(
			r#"
label_column: label
resample_seed: 7
tracking:
  dir: /tmp/runs
storage:
  endpoint: http://localhost:4443
  token_env: GCS_TOKEN
grid:
  random_forest:
    max_depth: [null, 4]
  logistic_regression:
    solver: [gradient_descent]
"#,
		)
		.unwrap();
		assert_eq!(config.label_column(), "label");
		assert_eq!(config.test_fraction(), 0.2);
		assert_eq!(config.split_seed(), 42);
		assert_eq!(config.resample_seed, Some(7));
		assert_eq!(config.cv_folds(), 5);
		assert!(config.tracking.unwrap().experiment.is_none());
		assert!(matches!(config.storage, Some(StorageConfig::Http { .. })));
		let grid = config.grid.unwrap();
		assert_eq!(
			grid.random_forest.unwrap().max_depth,
			Some(vec![None, Some(4)])
		);
		assert!(grid.gradient_boosted_trees.is_none());
		assert_eq!(
			grid.logistic_regression.unwrap().solver,
			Some(vec![Solver::GradientDescent])
		);
	}

	#[test]
	fn test_load_missing_file() {
		assert!(Config::load(Some(Path::new("/nonexistent/config.yaml"))).is_err());
		assert_eq!(Config::load(None).unwrap().label_column(), "SepsisLabel");
	}
}
