/*!
This crate defines the [`StreamingMetric`](trait.StreamingMetric.html) trait and the metrics the sepsis pipeline scores its models with: [`BinaryCrossEntropy`](struct.BinaryCrossEntropy.html) and [`ClassificationMetrics`](struct.ClassificationMetrics.html), which produces the confusion matrix, per class precision, recall and f1 score, and a text report.

Class labels are 0-indexed `usize`s. For binary problems class 0 is the negative class and class 1 is the positive class.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod binary_cross_entropy;
mod classification;
mod mean;
mod report;

pub use self::binary_cross_entropy::{BinaryCrossEntropy, BinaryCrossEntropyInput};
pub use self::classification::{
	f1_score, ClassMetrics, ClassificationMetrics, ClassificationMetricsInput,
	ClassificationMetricsOutput,
};
pub use self::mean::Mean;
pub use self::report::{classification_report, confusion_matrix_text};

/**
The `StreamingMetric` trait defines a common interface to metrics that can be computed in a streaming manner, where the input is available in chunks.

After being initialized, a value of type `T` implementing the `StreamingMetric` trait can have `update()` called on it with values of the associated type `Input`. Multiple values of `T` can be merged together by calling `merge()`. When finished aggregating, call `finalize()` on the metric to produce the associated type `Output`.

# Examples

```
use sepsis_metrics::StreamingMetric;

struct Min(f32);

impl StreamingMetric<'_, '_> for Min {
	type Input = f32;
	type Output = f32;
	fn update(&mut self, input: Self::Input) {
		self.0 = self.0.min(input)
	}
	fn merge(&mut self, other: Self) { self.0 = self.0.min(other.0) }
	fn finalize(self) -> Self::Output { self.0 }
}
```
*/
pub trait StreamingMetric<'a, 'b> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	/// Update this streaming metric with the `Input` `input`.
	fn update(&mut self, input: Self::Input);
	/// Merge multiple independently computed streaming metrics.
	fn merge(&mut self, other: Self);
	/// When you are done aggregating `Input`s, call `finalize()` to produce an `Output`.
	fn finalize(self) -> Self::Output;
}
