use crate::search::{end_failed_run, BestCandidate};
use anyhow::{Context, Result};
use ndarray::prelude::*;
use sepsis_metrics::{
	classification_report, confusion_matrix_text, ClassificationMetrics,
	ClassificationMetricsInput, StreamingMetric,
};
use sepsis_tracking::{RunId, RunStatus, Tracker};
use std::collections::BTreeMap;
use tracing::info;

pub const CLASS_NAMES: [&str; 2] = ["0", "1"];

/// The metrics written to `metrics.json`. Precision, recall and f1 score are averaged over the classes weighted by support.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Metrics {
	pub training_time: f64,
	pub accuracy: f32,
	pub precision: f32,
	pub recall: f32,
	pub f1_score: f32,
}

impl Metrics {
	fn to_map(&self) -> BTreeMap<String, f64> {
		let mut map = BTreeMap::new();
		map.insert("training_time".to_owned(), self.training_time);
		map.insert("accuracy".to_owned(), f64::from(self.accuracy));
		map.insert("precision".to_owned(), f64::from(self.precision));
		map.insert("recall".to_owned(), f64::from(self.recall));
		map.insert("f1_score".to_owned(), f64::from(self.f1_score));
		map
	}
}

#[derive(Clone, Debug)]
pub struct Evaluation {
	pub run_id: RunId,
	pub metrics: Metrics,
	pub confusion_matrix: Array2<u64>,
	pub classification_report: String,
}

/**
Evaluate the selected model on the validation split and record a tracking run named after its family holding its parameters, metrics, serialized model, confusion matrix, and classification report.
*/
pub fn evaluate(
	best: &BestCandidate,
	x_validation: ArrayView2<f32>,
	y_validation: ArrayView1<usize>,
	tracker: &mut dyn Tracker,
) -> Result<Evaluation> {
	let predictions = best.model.predict(x_validation)?;
	let mut classification_metrics = ClassificationMetrics::new(CLASS_NAMES.len());
	classification_metrics.update(ClassificationMetricsInput {
		predictions: predictions.view(),
		labels: y_validation,
	});
	let output = classification_metrics.finalize();
	let metrics = Metrics {
		training_time: best.training_time,
		accuracy: output.accuracy,
		precision: output.precision_weighted,
		recall: output.recall_weighted,
		f1_score: output.f1_score_weighted,
	};
	let confusion_matrix = confusion_matrix_text(output.confusion_matrix.view());
	let report = classification_report(&output, &CLASS_NAMES);
	info!(
		accuracy = metrics.accuracy,
		precision = metrics.precision,
		recall = metrics.recall,
		f1_score = metrics.f1_score,
		"evaluated the best model"
	);
	info!("confusion matrix\n{}", confusion_matrix);
	info!("classification report\n{}", report);

	let family = best.family();
	let run_id = tracker.start_run(Some(family.name()))?;
	let model_bytes = best.model.to_bytes()?;
	let result = (|| -> Result<()> {
		tracker.log_param(run_id, "model_name", family.name())?;
		tracker.log_params(run_id, &best.params.to_map())?;
		tracker.log_metrics(run_id, &metrics.to_map())?;
		tracker.log_model(run_id, &model_bytes, family.name())?;
		tracker.log_text(run_id, "confusion_matrix.txt", &confusion_matrix)?;
		tracker.log_text(run_id, "classification_report.txt", &report)?;
		Ok(())
	})();
	if let Err(error) = result {
		end_failed_run(tracker, run_id);
		return Err(error.context("failed to record the evaluation"));
	}
	tracker
		.end_run(run_id, RunStatus::Finished)
		.context("failed to end the evaluation run")?;

	Ok(Evaluation {
		run_id,
		metrics,
		confusion_matrix: output.confusion_matrix,
		classification_report: report,
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		grid::{GbtParams, Params},
		model::{Estimator, Model},
	};
	use sepsis_tracking::MemoryTracker;

	#[test]
	fn test_evaluate() {
		let features = Array::from_shape_fn((12, 1), |(row, _)| {
			if row < 6 {
				0.05 * row as f32
			} else {
				0.75 + 0.05 * (row - 6) as f32
			}
		});
		let labels = Array::from_shape_fn(12, |row| if row < 6 { 0 } else { 1 });
		let params = Params::GradientBoostedTrees(GbtParams {
			n_estimators: 20,
			max_depth: 2,
			learning_rate: 0.3,
		});
		let estimator = Estimator::train(&params, features.view(), labels.view()).unwrap();
		let best = BestCandidate {
			model: Model::new(params.clone(), vec!["HR".to_owned()], estimator),
			params,
			cv_score: 1.0,
			f1_score: 1.0,
			training_time: 1.5,
		};
		let mut tracker = MemoryTracker::new("sepsis");
		let evaluation = evaluate(&best, features.view(), labels.view(), &mut tracker).unwrap();
		assert_eq!(evaluation.metrics.training_time, 1.5);
		assert_eq!(evaluation.metrics.accuracy, 1.0);
		assert_eq!(evaluation.metrics.f1_score, 1.0);
		assert_eq!(evaluation.confusion_matrix, arr2(&[[6, 0], [0, 6]]));
		let run = tracker.get_run(evaluation.run_id).unwrap();
		assert_eq!(run.name.as_deref(), Some("gradient_boosted_trees"));
		assert_eq!(run.status, RunStatus::Finished);
		assert_eq!(run.params["model_name"], "gradient_boosted_trees");
		assert_eq!(run.params["n_estimators"], "20");
		assert_eq!(run.metrics["accuracy"], 1.0);
		assert_eq!(
			run.artifacts,
			vec![
				"gradient_boosted_trees/model.bin",
				"confusion_matrix.txt",
				"classification_report.txt",
			]
		);
		let model = tracker
			.artifact(evaluation.run_id, "gradient_boosted_trees/model.bin")
			.unwrap();
		assert_eq!(Model::from_slice(model).unwrap(), best.model);
	}
}
