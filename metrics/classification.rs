use super::StreamingMetric;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// ClassificationMetrics accumulates a confusion matrix and computes per class and averaged precision, recall and f1 score from it.
pub struct ClassificationMetrics {
	/// The shape of the confusion matrix is (n_classes x n_classes).
	confusion_matrix: Array2<u64>,
}

pub struct ClassificationMetricsInput<'a, 'b> {
	/// (n_examples), 0-indexed
	pub predictions: ArrayView1<'a, usize>,
	/// (n_examples), 0-indexed
	pub labels: ArrayView1<'b, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetricsOutput {
	/// Rows are the true class, columns are the predicted class.
	pub confusion_matrix: Array2<u64>,
	pub class_metrics: Vec<ClassMetrics>,
	pub accuracy: f32,
	pub precision_macro: f32,
	pub recall_macro: f32,
	pub f1_score_macro: f32,
	pub precision_weighted: f32,
	pub recall_weighted: f32,
	pub f1_score_weighted: f32,
	pub support: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
	pub true_positives: u64,
	pub false_positives: u64,
	pub false_negatives: u64,
	pub precision: f32,
	pub recall: f32,
	pub f1_score: f32,
	/// The number of examples whose label is this class.
	pub support: u64,
}

impl ClassificationMetrics {
	pub fn new(n_classes: usize) -> Self {
		//                                            label     prediction
		//                                              |           |
		//                                              v           v
		let confusion_matrix = <Array2<u64>>::zeros((n_classes, n_classes));
		Self { confusion_matrix }
	}
}

impl<'a, 'b> StreamingMetric<'a, 'b> for ClassificationMetrics {
	type Input = ClassificationMetricsInput<'a, 'b>;
	type Output = ClassificationMetricsOutput;

	fn update(&mut self, value: ClassificationMetricsInput) {
		for (label, prediction) in value.labels.iter().zip(value.predictions.iter()) {
			self.confusion_matrix[(*label, *prediction)] += 1;
		}
	}

	fn merge(&mut self, other: Self) {
		self.confusion_matrix += &other.confusion_matrix;
	}

	fn finalize(self) -> ClassificationMetricsOutput {
		let n_classes = self.confusion_matrix.nrows();
		let n_examples = self.confusion_matrix.sum();
		let confusion_matrix = self.confusion_matrix;
		let class_metrics: Vec<ClassMetrics> = (0..n_classes)
			.map(|class_index| {
				let true_positives = confusion_matrix[(class_index, class_index)];
				let support = confusion_matrix.row(class_index).sum();
				let predicted = confusion_matrix.column(class_index).sum();
				let false_negatives = support - true_positives;
				let false_positives = predicted - true_positives;
				let precision = divide(true_positives, predicted);
				let recall = divide(true_positives, support);
				let f1_score = if precision + recall > 0.0 {
					2.0 * (precision * recall) / (precision + recall)
				} else {
					0.0
				};
				ClassMetrics {
					true_positives,
					false_positives,
					false_negatives,
					precision,
					recall,
					f1_score,
					support,
				}
			})
			.collect();
		let n_correct: u64 = confusion_matrix.diag().sum();
		let accuracy = divide(n_correct, n_examples);
		let macro_average = |value: fn(&ClassMetrics) -> f32| {
			if n_classes == 0 {
				0.0
			} else {
				class_metrics.iter().map(value).sum::<f32>() / n_classes.to_f32().unwrap()
			}
		};
		let weighted_average = |value: fn(&ClassMetrics) -> f32| {
			if n_examples == 0 {
				0.0
			} else {
				class_metrics
					.iter()
					.map(|class| value(class) * class.support.to_f32().unwrap())
					.sum::<f32>()
					/ n_examples.to_f32().unwrap()
			}
		};
		let precision_macro = macro_average(|class| class.precision);
		let recall_macro = macro_average(|class| class.recall);
		let f1_score_macro = macro_average(|class| class.f1_score);
		let precision_weighted = weighted_average(|class| class.precision);
		let recall_weighted = weighted_average(|class| class.recall);
		let f1_score_weighted = weighted_average(|class| class.f1_score);
		ClassificationMetricsOutput {
			confusion_matrix,
			class_metrics,
			accuracy,
			precision_macro,
			recall_macro,
			f1_score_macro,
			precision_weighted,
			recall_weighted,
			f1_score_weighted,
			support: n_examples,
		}
	}
}

impl ClassificationMetricsOutput {
	/// The f1 score of the positive class, class 1.
	pub fn f1_score_binary(&self) -> f32 {
		self.class_metrics
			.get(1)
			.map(|class| class.f1_score)
			.unwrap_or(0.0)
	}
}

/// Compute the binary f1 score of the positive class for 0/1 labels and predictions.
pub fn f1_score(labels: ArrayView1<usize>, predictions: ArrayView1<usize>) -> f32 {
	let mut metrics = ClassificationMetrics::new(2);
	metrics.update(ClassificationMetricsInput {
		predictions,
		labels,
	});
	metrics.finalize().f1_score_binary()
}

/// Zero division scores 0.
fn divide(numerator: u64, denominator: u64) -> f32 {
	if denominator == 0 {
		0.0
	} else {
		numerator.to_f32().unwrap() / denominator.to_f32().unwrap()
	}
}
