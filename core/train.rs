use crate::{
	config::{Config, DEFAULT_EXPERIMENT, DEFAULT_TRACKING_DIR},
	evaluate::{evaluate, Evaluation},
	grid::{compute_hyperparameter_grid, ModelFamily},
	load::{load_datasets, DatasetUrls},
	publish::{publish, PublishOutput},
	resample::{train_validation_split, undersample},
	search::{search_models, BestCandidate},
	select::select,
};
use anyhow::{Context, Result};
use sepsis_storage::{ObjectStore, ObjectUrl};
use sepsis_tracking::{FileTracker, Tracker};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where the training data comes from and where the winning model goes.
#[derive(Clone, Debug)]
pub struct TrainArgs<'a> {
	/// The bucket path holding `X_train.csv`, `X_test.csv`, `y_train.csv`, and `y_test.csv`, with or without the `gs://` prefix.
	pub gcs_bucket_path: &'a str,
	/// The remote directory the artifacts are uploaded to. `None` or an empty string keeps them local.
	pub model_dir: Option<&'a str>,
	/// The local directory the artifacts are written to. Defaults to `model-run-<YYYYMMDD-HHMMSS>`.
	pub artifact_base_path: Option<&'a Path>,
}

#[derive(Debug)]
pub struct TrainOutput {
	/// The number of examples in the resampled pool.
	pub n_examples: usize,
	pub n_candidates: usize,
	pub best: BestCandidate,
	pub evaluation: Evaluation,
	pub publish: PublishOutput,
}

/**
Run the training pipeline: load the four datasets, undersample the majority class and split off a validation set, search every model family's grid, select the family with the best validation f1 score, evaluate it, and publish the model and its metrics.
*/
pub fn train(
	args: &TrainArgs,
	config: &Config,
	store: &dyn ObjectStore,
	tracker: &mut dyn Tracker,
) -> Result<TrainOutput> {
	let model_dir = match args.model_dir.filter(|model_dir| !model_dir.is_empty()) {
		Some(model_dir) => Some(
			ObjectUrl::parse(model_dir)
				.with_context(|| format!("invalid model directory {}", model_dir))?,
		),
		None => None,
	};
	let artifact_base_path = args
		.artifact_base_path
		.map(ToOwned::to_owned)
		.or_else(|| config.artifact_base_path.clone())
		.unwrap_or_else(default_artifact_base_path);

	// Load.
	let urls = DatasetUrls::new(args.gcs_bucket_path)?;
	let datasets = load_datasets(store, &urls)?;

	// Resample and split.
	let pool = undersample(datasets, config.label_column(), config.resample_seed)?;
	let n_examples = pool.labels.len();
	let split = train_validation_split(pool, config.test_fraction(), config.split_seed())?;

	// Search each family, then select the winner.
	let grids = ModelFamily::ALL
		.iter()
		.map(|family| {
			(
				*family,
				compute_hyperparameter_grid(*family, config.grid.as_ref()),
			)
		})
		.collect();
	let candidates = search_models(grids, &split, config.cv_folds(), tracker)?;
	let n_candidates = candidates.len();
	let best = select(candidates)?;

	// Evaluate and publish.
	let x_validation = split.x_validation.to_array()?;
	let evaluation = evaluate(
		&best,
		x_validation.view(),
		split.y_validation.view(),
		tracker,
	)?;
	let publish = publish(
		&best.model,
		&evaluation.metrics,
		&artifact_base_path,
		model_dir.as_ref(),
		store,
	)?;
	info!(
		family = %best.family(),
		f1_score = evaluation.metrics.f1_score,
		artifact_base_path = %artifact_base_path.display(),
		"training finished"
	);

	Ok(TrainOutput {
		n_examples,
		n_candidates,
		best,
		evaluation,
		publish,
	})
}

/// `model-run-<YYYYMMDD-HHMMSS>` in local time.
pub fn default_artifact_base_path() -> PathBuf {
	PathBuf::from(
		chrono::Local::now()
			.format("model-run-%Y%m%d-%H%M%S")
			.to_string(),
	)
}

/// Open the object store named in the config, or the http backend with its defaults.
pub fn open_store(config: &Config) -> Result<Box<dyn ObjectStore>> {
	let storage = config.storage.clone().unwrap_or_default();
	let store = sepsis_storage::open(&storage).context("failed to open the object store")?;
	Ok(store)
}

/// Open the file tracker named in the config, or `runs/sepsis`.
pub fn open_tracker(config: &Config) -> Result<FileTracker> {
	let (dir, experiment) = match &config.tracking {
		Some(tracking) => (
			tracking.dir.clone(),
			tracking
				.experiment
				.as_deref()
				.unwrap_or(DEFAULT_EXPERIMENT)
				.to_owned(),
		),
		None => (
			PathBuf::from(DEFAULT_TRACKING_DIR),
			DEFAULT_EXPERIMENT.to_owned(),
		),
	};
	let tracker = FileTracker::new(&dir, &experiment)
		.with_context(|| format!("failed to open the tracking directory {}", dir.display()))?;
	Ok(tracker)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_default_artifact_base_path() {
		let path = default_artifact_base_path();
		let name = path.to_str().unwrap();
		assert!(name.starts_with("model-run-"));
		assert_eq!(name.len(), "model-run-20240101-120000".len());
		let key = format!("models/{}/model.bin", name);
		assert_eq!(
			sepsis_storage::latest_model_folder(vec![key.as_str()]).as_deref(),
			Some(name)
		);
	}

	#[test]
	fn test_open_tracker() {
		let dir = tempfile::tempdir().unwrap();
		let config: Config = serde_yaml::from_str(&format!(
			"tracking:\n  dir: {}\n  experiment: test\n",
			dir.path().display()
		))
		.unwrap();
		let tracker = open_tracker(&config).unwrap();
		assert!(tracker.list_runs().unwrap().is_empty());
	}
}
