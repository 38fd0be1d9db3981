use crate::config;
use itertools::iproduct;
use sepsis_linear::Solver;
use std::collections::BTreeMap;

/// The model families searched, in the order they are searched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
	RandomForest,
	GradientBoostedTrees,
	LogisticRegression,
}

impl ModelFamily {
	pub const ALL: [ModelFamily; 3] = [
		ModelFamily::RandomForest,
		ModelFamily::GradientBoostedTrees,
		ModelFamily::LogisticRegression,
	];

	pub fn name(self) -> &'static str {
		match self {
			ModelFamily::RandomForest => "random_forest",
			ModelFamily::GradientBoostedTrees => "gradient_boosted_trees",
			ModelFamily::LogisticRegression => "logistic_regression",
		}
	}
}

impl std::fmt::Display for ModelFamily {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// A `Params` is a single entry in a hyperparameter grid.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Params {
	RandomForest(RandomForestParams),
	GradientBoostedTrees(GbtParams),
	LogisticRegression(LogisticRegressionParams),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RandomForestParams {
	pub n_estimators: usize,
	pub max_depth: Option<usize>,
	pub min_samples_split: usize,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GbtParams {
	pub n_estimators: usize,
	pub max_depth: usize,
	pub learning_rate: f32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogisticRegressionParams {
	pub c: f32,
	pub solver: Solver,
	pub max_iter: usize,
}

impl Params {
	pub fn family(&self) -> ModelFamily {
		match self {
			Params::RandomForest(_) => ModelFamily::RandomForest,
			Params::GradientBoostedTrees(_) => ModelFamily::GradientBoostedTrees,
			Params::LogisticRegression(_) => ModelFamily::LogisticRegression,
		}
	}

	/// The hyperparameters as strings, for logging to a tracking run.
	pub fn to_map(&self) -> BTreeMap<String, String> {
		let entries: Vec<(&str, String)> = match self {
			Params::RandomForest(params) => vec![
				("n_estimators", params.n_estimators.to_string()),
				(
					"max_depth",
					params
						.max_depth
						.map(|max_depth| max_depth.to_string())
						.unwrap_or_else(|| "none".to_owned()),
				),
				("min_samples_split", params.min_samples_split.to_string()),
			],
			Params::GradientBoostedTrees(params) => vec![
				("n_estimators", params.n_estimators.to_string()),
				("max_depth", params.max_depth.to_string()),
				("learning_rate", params.learning_rate.to_string()),
			],
			Params::LogisticRegression(params) => vec![
				("c", params.c.to_string()),
				("solver", params.solver.to_string()),
				("max_iter", params.max_iter.to_string()),
			],
		};
		entries
			.into_iter()
			.map(|(key, value)| (key.to_owned(), value))
			.collect()
	}
}

impl std::fmt::Display for Params {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let entries: Vec<String> = self
			.to_map()
			.into_iter()
			.map(|(key, value)| format!("{}={}", key, value))
			.collect();
		write!(f, "{}", entries.join(" "))
	}
}

const DEFAULT_RANDOM_FOREST_N_ESTIMATORS_VALUES: [usize; 3] = [50, 100, 200];
const DEFAULT_RANDOM_FOREST_MAX_DEPTH_VALUES: [Option<usize>; 3] = [None, Some(10), Some(20)];
const DEFAULT_RANDOM_FOREST_MIN_SAMPLES_SPLIT_VALUES: [usize; 3] = [2, 5, 10];
const DEFAULT_GBT_N_ESTIMATORS_VALUES: [usize; 3] = [50, 100, 200];
const DEFAULT_GBT_MAX_DEPTH_VALUES: [usize; 3] = [3, 6, 9];
const DEFAULT_GBT_LEARNING_RATE_VALUES: [f32; 3] = [0.01, 0.1, 0.2];
const DEFAULT_LOGISTIC_REGRESSION_C_VALUES: [f32; 3] = [0.1, 1.0, 10.0];
const DEFAULT_LOGISTIC_REGRESSION_SOLVER_VALUES: [Solver; 2] =
	[Solver::GradientDescent, Solver::Newton];
const LOGISTIC_REGRESSION_MAX_ITER: usize = 200;

/// Compute the hyperparameter grid for `family`, replacing the default values with any given in `grid_config`.
pub fn compute_hyperparameter_grid(
	family: ModelFamily,
	grid_config: Option<&config::GridConfig>,
) -> Vec<Params> {
	match family {
		ModelFamily::RandomForest => {
			let item = grid_config.and_then(|grid_config| grid_config.random_forest.as_ref());
			let n_estimators_values = values(
				item.and_then(|item| item.n_estimators.as_ref()),
				&DEFAULT_RANDOM_FOREST_N_ESTIMATORS_VALUES,
			);
			let max_depth_values = values(
				item.and_then(|item| item.max_depth.as_ref()),
				&DEFAULT_RANDOM_FOREST_MAX_DEPTH_VALUES,
			);
			let min_samples_split_values = values(
				item.and_then(|item| item.min_samples_split.as_ref()),
				&DEFAULT_RANDOM_FOREST_MIN_SAMPLES_SPLIT_VALUES,
			);
			iproduct!(
				n_estimators_values.iter(),
				max_depth_values.iter(),
				min_samples_split_values.iter()
			)
			.map(|(&n_estimators, &max_depth, &min_samples_split)| {
				Params::RandomForest(RandomForestParams {
					n_estimators,
					max_depth,
					min_samples_split,
				})
			})
			.collect()
		}
		ModelFamily::GradientBoostedTrees => {
			let item =
				grid_config.and_then(|grid_config| grid_config.gradient_boosted_trees.as_ref());
			let n_estimators_values = values(
				item.and_then(|item| item.n_estimators.as_ref()),
				&DEFAULT_GBT_N_ESTIMATORS_VALUES,
			);
			let max_depth_values = values(
				item.and_then(|item| item.max_depth.as_ref()),
				&DEFAULT_GBT_MAX_DEPTH_VALUES,
			);
			let learning_rate_values = values(
				item.and_then(|item| item.learning_rate.as_ref()),
				&DEFAULT_GBT_LEARNING_RATE_VALUES,
			);
			iproduct!(
				n_estimators_values.iter(),
				max_depth_values.iter(),
				learning_rate_values.iter()
			)
			.map(|(&n_estimators, &max_depth, &learning_rate)| {
				Params::GradientBoostedTrees(GbtParams {
					n_estimators,
					max_depth,
					learning_rate,
				})
			})
			.collect()
		}
		ModelFamily::LogisticRegression => {
			let item = grid_config.and_then(|grid_config| grid_config.logistic_regression.as_ref());
			let c_values = values(
				item.and_then(|item| item.c.as_ref()),
				&DEFAULT_LOGISTIC_REGRESSION_C_VALUES,
			);
			let solver_values = values(
				item.and_then(|item| item.solver.as_ref()),
				&DEFAULT_LOGISTIC_REGRESSION_SOLVER_VALUES,
			);
			iproduct!(c_values.iter(), solver_values.iter())
				.map(|(&c, &solver)| {
					Params::LogisticRegression(LogisticRegressionParams {
						c,
						solver,
						max_iter: LOGISTIC_REGRESSION_MAX_ITER,
					})
				})
				.collect()
		}
	}
}

fn values<T: Clone>(configured: Option<&Vec<T>>, defaults: &[T]) -> Vec<T> {
	match configured {
		Some(configured) if !configured.is_empty() => configured.clone(),
		_ => defaults.to_vec(),
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_default_grid() {
		let grid = compute_hyperparameter_grid(ModelFamily::RandomForest, None);
		assert_eq!(grid.len(), 27);
		assert_eq!(
			grid[0],
			Params::RandomForest(RandomForestParams {
				n_estimators: 50,
				max_depth: None,
				min_samples_split: 2,
			})
		);
		assert_eq!(
			compute_hyperparameter_grid(ModelFamily::GradientBoostedTrees, None).len(),
			27
		);
		let grid = compute_hyperparameter_grid(ModelFamily::LogisticRegression, None);
		assert_eq!(grid.len(), 6);
		assert_eq!(grid[1].to_string(), "c=0.1 max_iter=200 solver=newton");
		assert!(grid
			.iter()
			.all(|params| params.family() == ModelFamily::LogisticRegression));
	}

	#[test]
	fn test_grid_config() {
		let grid_config = config::GridConfig {
			gradient_boosted_trees: Some(config::GbtGridConfig {
				n_estimators: Some(vec![5]),
				max_depth: Some(vec![2, 3]),
				learning_rate: None,
			}),
			..Default::default()
		};
		let grid =
			compute_hyperparameter_grid(ModelFamily::GradientBoostedTrees, Some(&grid_config));
		assert_eq!(grid.len(), 6);
		assert_eq!(
			grid.last().unwrap().to_map().get("learning_rate").unwrap(),
			"0.2"
		);
		assert_eq!(
			compute_hyperparameter_grid(ModelFamily::RandomForest, Some(&grid_config)).len(),
			27
		);
	}

	#[test]
	fn test_params_map() {
		let params = Params::RandomForest(RandomForestParams {
			n_estimators: 100,
			max_depth: None,
			min_samples_split: 5,
		});
		let map = params.to_map();
		assert_eq!(map["max_depth"], "none");
		assert_eq!(map["n_estimators"], "100");
		assert_eq!(params.family().name(), "random_forest");
	}
}
