use crate::{
	grid::{ModelFamily, Params},
	model::{Estimator, Model},
	resample::Split,
};
use anyhow::{bail, format_err, Context, Result};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rayon::prelude::*;
use sepsis_metrics::{
	ClassificationMetrics, ClassificationMetricsInput, StreamingMetric,
};
use sepsis_tracking::{RunId, RunStatus, Tracker};
use std::{collections::BTreeMap, time::Instant};
use tracing::{info, warn};

/// The best model found for one model family.
#[derive(Clone, Debug)]
pub struct BestCandidate {
	pub model: Model,
	pub params: Params,
	/// The mean cross validated f1 score of `params`.
	pub cv_score: f32,
	/// The weighted f1 score on the validation split.
	pub f1_score: f32,
	/// The wall clock time in seconds taken by cross validation and refitting.
	pub training_time: f64,
}

impl BestCandidate {
	pub fn family(&self) -> ModelFamily {
		self.model.family()
	}
}

/// The output of [`grid_search`](fn.grid_search.html).
#[derive(Debug)]
pub struct GridSearchOutput {
	pub best_params: Params,
	pub best_score: f32,
	/// The mean fold score of each entry in the grid.
	pub scores: Vec<f32>,
	/// An estimator trained with `best_params` on all the training data.
	pub estimator: Estimator,
}

/**
Split the examples into `n_folds` folds that each hold about the same fraction of every class. Each class's examples are assigned in order, the first fold receiving the first chunk and the folds that come first receiving one extra example when the class does not divide evenly. Each returned fold lists the indexes of its examples in ascending order.
*/
pub fn stratified_folds(labels: ArrayView1<usize>, n_folds: usize) -> Result<Vec<Vec<usize>>> {
	if n_folds < 2 {
		bail!("the number of folds must be at least 2, found {}", n_folds);
	}
	if labels.len() < n_folds {
		bail!(
			"cannot split {} examples into {} folds",
			labels.len(),
			n_folds
		);
	}
	let mut class_indexes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
	for (index, label) in labels.iter().enumerate() {
		class_indexes.entry(*label).or_default().push(index);
	}
	let mut folds = vec![Vec::new(); n_folds];
	for indexes in class_indexes.values() {
		let fold_size = indexes.len() / n_folds;
		let remainder = indexes.len() % n_folds;
		let mut start = 0;
		for (fold_index, fold) in folds.iter_mut().enumerate() {
			let size = if fold_index < remainder {
				fold_size + 1
			} else {
				fold_size
			};
			fold.extend_from_slice(&indexes[start..start + size]);
			start += size;
		}
	}
	for fold in folds.iter_mut() {
		fold.sort_unstable();
	}
	Ok(folds)
}

/**
Run an exhaustive search over `grid` with stratified k fold cross validation. Each entry is scored by the mean binary f1 score of the positive class over the folds. The entry with the highest mean score wins, with ties going to the entry that comes first in the grid, and is refit on all of `features`. Every fold of every entry is fit in parallel.
*/
pub fn grid_search(
	grid: &[Params],
	features: ArrayView2<f32>,
	labels: ArrayView1<usize>,
	n_folds: usize,
) -> Result<GridSearchOutput> {
	if grid.is_empty() {
		bail!("the hyperparameter grid is empty");
	}
	let folds = stratified_folds(labels, n_folds)?;
	let jobs: Vec<(usize, usize)> = (0..grid.len())
		.flat_map(|grid_index| (0..folds.len()).map(move |fold_index| (grid_index, fold_index)))
		.collect();
	let fold_scores: Vec<f32> = jobs
		.into_par_iter()
		.map(|(grid_index, fold_index)| {
			let test_indexes = &folds[fold_index];
			let train_indexes: Vec<usize> = folds
				.iter()
				.enumerate()
				.filter(|(index, _)| *index != fold_index)
				.flat_map(|(_, fold)| fold.iter().copied())
				.collect();
			let estimator = Estimator::train(
				&grid[grid_index],
				features.select(Axis(0), &train_indexes).view(),
				labels.select(Axis(0), &train_indexes).view(),
			)
			.with_context(|| format!("failed to fit {}", grid[grid_index]))?;
			let predictions = estimator.predict(features.select(Axis(0), test_indexes).view());
			Ok(sepsis_metrics::f1_score(
				labels.select(Axis(0), test_indexes).view(),
				predictions.view(),
			))
		})
		.collect::<Result<_>>()?;
	let n_folds = folds.len().to_f32().unwrap();
	let scores: Vec<f32> = fold_scores
		.chunks(folds.len())
		.map(|chunk| chunk.iter().sum::<f32>() / n_folds)
		.collect();
	let best_index = best_position(&scores).ok_or_else(|| format_err!("no scores"))?;
	let best_params = grid[best_index].clone();
	let estimator = Estimator::train(&best_params, features, labels)
		.with_context(|| format!("failed to refit {}", best_params))?;
	Ok(GridSearchOutput {
		best_params,
		best_score: scores[best_index],
		scores,
		estimator,
	})
}

/// The index of the greatest score. Ties go to the earliest index and NaN scores never win.
pub fn best_position(scores: &[f32]) -> Option<usize> {
	let mut best: Option<(usize, f32)> = None;
	for (index, score) in scores.iter().enumerate() {
		let is_better = match best {
			None => !score.is_nan(),
			Some((_, best_score)) => *score > best_score,
		};
		if is_better {
			best = Some((index, *score));
		}
	}
	best.map(|(index, _)| index)
}

/// Compute the weighted f1 score of `predictions`.
pub fn weighted_f1_score(labels: ArrayView1<usize>, predictions: ArrayView1<usize>) -> f32 {
	let mut metrics = ClassificationMetrics::new(2);
	metrics.update(ClassificationMetricsInput {
		predictions,
		labels,
	});
	metrics.finalize().f1_score_weighted
}

/**
Search each model family's grid in order and evaluate the winner of each on the validation split. One tracking run is recorded per family with the chosen parameters, the cross validated score, the validation f1 score, and the training time. A failed fit ends the run as failed and aborts the search.
*/
pub fn search_models(
	grids: Vec<(ModelFamily, Vec<Params>)>,
	split: &Split,
	n_folds: usize,
	tracker: &mut dyn Tracker,
) -> Result<Vec<BestCandidate>> {
	let x_train = split
		.x_train
		.to_array()
		.context("the training features must be numeric")?;
	let x_validation = split
		.x_validation
		.to_array()
		.context("the validation features must be numeric")?;
	let feature_names: Vec<String> = split
		.x_train
		.column_names()
		.into_iter()
		.map(ToOwned::to_owned)
		.collect();
	let mut candidates = Vec::with_capacity(grids.len());
	for (family, grid) in grids {
		let run_id = tracker.start_run(Some(family.name()))?;
		let start = Instant::now();
		let output = match grid_search(&grid, x_train.view(), split.y_train.view(), n_folds) {
			Ok(output) => output,
			Err(error) => {
				end_failed_run(tracker, run_id);
				return Err(error.context(format!("the search over {} failed", family)));
			}
		};
		let training_time = start.elapsed().as_secs_f64();
		let predictions = output.estimator.predict(x_validation.view());
		let f1_score = weighted_f1_score(split.y_validation.view(), predictions.view());
		info!(
			%family,
			best_params = %output.best_params,
			cv_score = output.best_score,
			f1_score,
			training_time,
			"searched model family"
		);
		let mut metrics = BTreeMap::new();
		metrics.insert("cv_score".to_owned(), f64::from(output.best_score));
		metrics.insert("f1_score".to_owned(), f64::from(f1_score));
		metrics.insert("training_time".to_owned(), training_time);
		let result = (|| -> Result<()> {
			tracker.log_params(run_id, &output.best_params.to_map())?;
			tracker.log_metrics(run_id, &metrics)?;
			Ok(())
		})();
		if let Err(error) = result {
			end_failed_run(tracker, run_id);
			return Err(error.context(format!(
				"failed to record the search over {}",
				family
			)));
		}
		tracker
			.end_run(run_id, RunStatus::Finished)
			.with_context(|| format!("failed to end the run for {}", family))?;
		candidates.push(BestCandidate {
			model: Model::new(
				output.best_params.clone(),
				feature_names.clone(),
				output.estimator,
			),
			params: output.best_params,
			cv_score: output.best_score,
			f1_score,
			training_time,
		});
	}
	Ok(candidates)
}

/// End a run as failed. A failure to do so is logged so the error that caused it is the one returned.
pub(crate) fn end_failed_run(tracker: &mut dyn Tracker, run_id: RunId) {
	if let Err(error) = tracker.end_run(run_id, RunStatus::Failed) {
		warn!(%run_id, %error, "failed to end the run as failed");
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::grid::{compute_hyperparameter_grid, LogisticRegressionParams};
	use rand::{Rng, SeedableRng};
	use rand_xoshiro::Xoshiro256Plus;
	use sepsis_dataframe::{Column, DataFrame, NumberColumn};
	use sepsis_linear::Solver;
	use sepsis_tracking::MemoryTracker;

	#[test]
	fn test_stratified_folds() {
		let labels = arr1(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 0]);
		let folds = stratified_folds(labels.view(), 3).unwrap();
		assert_eq!(folds, vec![vec![0, 1, 2, 7, 8], vec![3, 4, 5, 9], vec![6, 10, 11]]);
		assert!(stratified_folds(labels.view(), 1).is_err());
		assert!(stratified_folds(arr1(&[0, 1]).view(), 5).is_err());
	}

	#[test]
	fn test_best_position() {
		assert_eq!(best_position(&[0.5, 0.7, 0.7, 0.1]), Some(1));
		assert_eq!(best_position(&[std::f32::NAN, 0.2]), Some(1));
		assert_eq!(best_position(&[]), None);
	}

	fn dataset(n: usize, seed: u64) -> (Array2<f32>, Array1<usize>) {
		let mut rng = Xoshiro256Plus::seed_from_u64(seed);
		let features = Array2::from_shape_fn((n, 2), |_| rng.gen::<f32>());
		let labels = features
			.axis_iter(Axis(0))
			.map(|row| if row[0] + 0.5 * row[1] > 0.8 { 1 } else { 0 })
			.collect();
		(features, labels)
	}

	#[test]
	fn test_grid_search() {
		let (features, labels) = dataset(100, 1);
		let grid = vec![
			Params::LogisticRegression(LogisticRegressionParams {
				c: 1e-6,
				solver: Solver::Newton,
				max_iter: 200,
			}),
			Params::LogisticRegression(LogisticRegressionParams {
				c: 10.0,
				solver: Solver::Newton,
				max_iter: 200,
			}),
		];
		let output = grid_search(&grid, features.view(), labels.view(), 5).unwrap();
		assert_eq!(output.scores.len(), 2);
		assert!(output.scores.iter().all(|score| (0.0..=1.0).contains(score)));
		assert_eq!(output.best_params, grid[1]);
		assert_eq!(output.best_score, output.scores[1]);
		assert!(grid_search(&[], features.view(), labels.view(), 5).is_err());
	}

	fn search_inputs() -> (Vec<(ModelFamily, Vec<Params>)>, Split) {
		let (features, labels) = dataset(120, 2);
		let to_dataframe = |features: ArrayView2<f32>| {
			DataFrame::new(
				features
					.axis_iter(Axis(1))
					.enumerate()
					.map(|(index, column)| {
						Column::Number(NumberColumn::new(format!("x{}", index), column.to_vec()))
					})
					.collect(),
			)
			.unwrap()
		};
		let split = Split {
			x_train: to_dataframe(features.slice(s![..96, ..])),
			x_validation: to_dataframe(features.slice(s![96.., ..])),
			y_train: labels.slice(s![..96]).to_owned(),
			y_validation: labels.slice(s![96..]).to_owned(),
		};
		let grid_config = crate::config::GridConfig {
			logistic_regression: Some(crate::config::LogisticRegressionGridConfig {
				c: Some(vec![1.0]),
				solver: None,
			}),
			..Default::default()
		};
		let grids = vec![(
			ModelFamily::LogisticRegression,
			compute_hyperparameter_grid(ModelFamily::LogisticRegression, Some(&grid_config)),
		)];
		(grids, split)
	}

	#[test]
	fn test_search_models() {
		let (grids, split) = search_inputs();
		let mut tracker = MemoryTracker::new("test");
		let candidates = search_models(grids, &split, 3, &mut tracker).unwrap();
		assert_eq!(candidates.len(), 1);
		let candidate = &candidates[0];
		assert_eq!(candidate.family(), ModelFamily::LogisticRegression);
		assert_eq!(candidate.model.feature_names, vec!["x0", "x1"]);
		assert!((0.0..=1.0).contains(&candidate.f1_score));
		assert!(candidate.training_time >= 0.0);
		let run = &tracker.runs()[0];
		assert_eq!(run.name.as_deref(), Some("logistic_regression"));
		assert_eq!(run.status, RunStatus::Finished);
		assert!(run.params.contains_key("solver"));
		assert!(run.metrics.contains_key("cv_score"));
	}

	/// Fails every call to log_metrics.
	struct MetricsRejectingTracker(MemoryTracker);

	impl Tracker for MetricsRejectingTracker {
		fn start_run(&mut self, name: Option<&str>) -> sepsis_tracking::Result<RunId> {
			self.0.start_run(name)
		}
		fn log_param(
			&mut self,
			run_id: RunId,
			key: &str,
			value: &str,
		) -> sepsis_tracking::Result<()> {
			self.0.log_param(run_id, key, value)
		}
		fn log_metrics(
			&mut self,
			_run_id: RunId,
			_metrics: &BTreeMap<String, f64>,
		) -> sepsis_tracking::Result<()> {
			Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
		}
		fn log_artifact(
			&mut self,
			run_id: RunId,
			name: &str,
			data: &[u8],
		) -> sepsis_tracking::Result<()> {
			self.0.log_artifact(run_id, name, data)
		}
		fn end_run(&mut self, run_id: RunId, status: RunStatus) -> sepsis_tracking::Result<()> {
			self.0.end_run(run_id, status)
		}
		fn get_run(&self, run_id: RunId) -> sepsis_tracking::Result<sepsis_tracking::Run> {
			self.0.get_run(run_id)
		}
	}

	#[test]
	fn test_search_models_logging_failure() {
		let (grids, split) = search_inputs();
		let mut tracker = MetricsRejectingTracker(MemoryTracker::new("test"));
		let error = search_models(grids, &split, 3, &mut tracker).unwrap_err();
		assert!(format!("{:#}", error).contains("disk full"));
		let runs = tracker.0.runs();
		assert_eq!(runs.len(), 1);
		assert_eq!(runs[0].status, RunStatus::Failed);
	}
}
