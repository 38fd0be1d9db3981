use crate::{evaluate::Metrics, model::Model};
use anyhow::{format_err, Context, Result};
use sepsis_storage::{ObjectStore, ObjectUrl};
use std::{
	io::Write,
	path::{Component, Path, PathBuf},
};
use tracing::info;

pub const MODEL_FILE_NAME: &str = "model.bin";
pub const METRICS_FILE_NAME: &str = "metrics.json";

#[derive(Debug)]
pub struct PublishOutput {
	pub model_path: PathBuf,
	pub metrics_path: PathBuf,
	/// The urls the two files were uploaded to, empty if no model directory was given.
	pub uploaded: Vec<ObjectUrl>,
}

/**
Write `model.bin` and `metrics.json` under `artifact_base_path`. If `model_dir` is given, each file is then uploaded to `model_dir` joined with its local path.
*/
pub fn publish(
	model: &Model,
	metrics: &Metrics,
	artifact_base_path: &Path,
	model_dir: Option<&ObjectUrl>,
	store: &dyn ObjectStore,
) -> Result<PublishOutput> {
	std::fs::create_dir_all(artifact_base_path).with_context(|| {
		format!(
			"failed to create the artifact directory {}",
			artifact_base_path.display()
		)
	})?;
	let model_path = artifact_base_path.join(MODEL_FILE_NAME);
	model
		.to_file(&model_path)
		.with_context(|| format!("failed to write {}", model_path.display()))?;
	let metrics_path = artifact_base_path.join(METRICS_FILE_NAME);
	write_metrics(metrics, &metrics_path)
		.with_context(|| format!("failed to write {}", metrics_path.display()))?;
	info!(
		model_path = %model_path.display(),
		metrics_path = %metrics_path.display(),
		"saved the model and metrics"
	);

	let model_dir = match model_dir {
		Some(model_dir) => model_dir,
		None => {
			info!("no model directory was given, the artifacts were only saved locally");
			return Ok(PublishOutput {
				model_path,
				metrics_path,
				uploaded: Vec::new(),
			});
		}
	};
	let mut uploaded = Vec::with_capacity(2);
	for path in &[&model_path, &metrics_path] {
		let url = model_dir.join(&relative_key(path)?);
		store
			.upload_file(&url, path)
			.with_context(|| format!("failed to upload {} to {}", path.display(), url))?;
		info!(path = %path.display(), %url, "uploaded artifact");
		uploaded.push(url);
	}
	Ok(PublishOutput {
		model_path,
		metrics_path,
		uploaded,
	})
}

/// Write the metrics as json indented with four spaces.
pub fn write_metrics(metrics: &Metrics, path: &Path) -> Result<()> {
	let mut bytes = Vec::new();
	let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
	let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
	serde::Serialize::serialize(metrics, &mut serializer)?;
	let mut file = std::fs::File::create(path)?;
	file.write_all(&bytes)?;
	Ok(())
}

/// The object key for a local path, made of its normal components joined with `/`.
fn relative_key(path: &Path) -> Result<String> {
	let segments = path
		.components()
		.filter_map(|component| match component {
			Component::Normal(segment) => Some(segment),
			_ => None,
		})
		.map(|segment| {
			segment
				.to_str()
				.ok_or_else(|| format_err!("the path {} is not valid utf-8", path.display()))
		})
		.collect::<Result<Vec<_>>>()?;
	Ok(segments.join("/"))
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		grid::{LogisticRegressionParams, Params},
		model::Estimator,
	};
	use ndarray::prelude::*;
	use sepsis_linear::Solver;
	use sepsis_storage::MemoryObjectStore;

	fn model() -> Model {
		let params = Params::LogisticRegression(LogisticRegressionParams {
			c: 1.0,
			solver: Solver::Newton,
			max_iter: 200,
		});
		let features = arr2(&[[0.0], [1.0], [0.1], [0.9]]);
		let labels = arr1(&[0, 1, 0, 1]);
		let estimator = Estimator::train(&params, features.view(), labels.view()).unwrap();
		Model::new(params, vec!["HR".to_owned()], estimator)
	}

	fn metrics() -> Metrics {
		Metrics {
			training_time: 2.5,
			accuracy: 0.75,
			precision: 0.5,
			recall: 0.25,
			f1_score: 0.125,
		}
	}

	#[test]
	fn test_write_metrics() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("metrics.json");
		write_metrics(&metrics(), &path).unwrap();
		insta::assert_snapshot!(std::fs::read_to_string(&path).unwrap(), @r###"
 {
     "training_time": 2.5,
     "accuracy": 0.75,
     "precision": 0.5,
     "recall": 0.25,
     "f1_score": 0.125
 }
 "###);
	}

	#[test]
	fn test_publish_local_only() {
		let dir = tempfile::tempdir().unwrap();
		let base = dir.path().join("model-run-20240101-120000");
		let store = MemoryObjectStore::new();
		let output = publish(&model(), &metrics(), &base, None, &store).unwrap();
		assert!(output.model_path.exists());
		assert!(output.metrics_path.exists());
		assert!(output.uploaded.is_empty());
		assert!(store.urls().unwrap().is_empty());
	}

	#[test]
	fn test_publish_uploads() {
		let dir = tempfile::tempdir().unwrap();
		let base = dir.path().join("model-run-20240101-120000");
		let store = MemoryObjectStore::new();
		let model_dir = ObjectUrl::parse("gs://models-bucket/models").unwrap();
		let model = model();
		let output = publish(&model, &metrics(), &base, Some(&model_dir), &store).unwrap();
		let prefix = relative_key(&base).unwrap();
		assert_eq!(
			output.uploaded,
			vec![
				model_dir.join(&format!("{}/model.bin", prefix)),
				model_dir.join(&format!("{}/metrics.json", prefix)),
			]
		);
		let bytes = store.get(&output.uploaded[0]).unwrap();
		assert_eq!(Model::from_slice(&bytes).unwrap(), model);
	}

	#[test]
	fn test_relative_key() {
		assert_eq!(
			relative_key(Path::new("model-run-20240101-120000/model.bin")).unwrap(),
			"model-run-20240101-120000/model.bin"
		);
		assert_eq!(
			relative_key(Path::new("/tmp/./runs/metrics.json")).unwrap(),
			"tmp/runs/metrics.json"
		);
	}
}
