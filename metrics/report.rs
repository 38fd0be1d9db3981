use crate::ClassificationMetricsOutput;
use ndarray::prelude::*;
use std::fmt::Write;

const HEADERS: [&str; 4] = ["precision", "recall", "f1-score", "support"];

/// Render a per class text report with precision, recall, f1-score and support for each class, followed by the accuracy and the macro and weighted averages. Values are printed with two digits.
pub fn classification_report(metrics: &ClassificationMetricsOutput, class_names: &[&str]) -> String {
	let width = class_names
		.iter()
		.map(|name| name.len())
		.chain(std::iter::once("weighted avg".len()))
		.max()
		.unwrap_or(0);
	let mut report = String::new();
	write!(report, "{:>width$} ", "", width = width).unwrap();
	for header in HEADERS.iter() {
		write!(report, " {:>9}", header).unwrap();
	}
	report.push_str("\n\n");
	for (class_metrics, name) in metrics.class_metrics.iter().zip(class_names.iter()) {
		write_row(
			&mut report,
			width,
			name,
			class_metrics.precision,
			class_metrics.recall,
			class_metrics.f1_score,
			class_metrics.support,
		);
	}
	report.push('\n');
	writeln!(
		report,
		"{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
		"accuracy",
		"",
		"",
		metrics.accuracy,
		metrics.support,
		width = width,
	)
	.unwrap();
	write_row(
		&mut report,
		width,
		"macro avg",
		metrics.precision_macro,
		metrics.recall_macro,
		metrics.f1_score_macro,
		metrics.support,
	);
	write_row(
		&mut report,
		width,
		"weighted avg",
		metrics.precision_weighted,
		metrics.recall_weighted,
		metrics.f1_score_weighted,
		metrics.support,
	);
	report
}

fn write_row(
	report: &mut String,
	width: usize,
	name: &str,
	precision: f32,
	recall: f32,
	f1_score: f32,
	support: u64,
) {
	writeln!(
		report,
		"{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
		name,
		precision,
		recall,
		f1_score,
		support,
		width = width,
	)
	.unwrap();
}

/// Render a confusion matrix as a bracketed grid with right aligned counts, for example `[[4 2]\n [1 3]]`.
pub fn confusion_matrix_text(confusion_matrix: ArrayView2<u64>) -> String {
	let width = confusion_matrix
		.iter()
		.map(|value| value.to_string().len())
		.max()
		.unwrap_or(1);
	let rows: Vec<String> = confusion_matrix
		.axis_iter(Axis(0))
		.map(|row| {
			let values: Vec<String> = row
				.iter()
				.map(|value| format!("{:>width$}", value, width = width))
				.collect();
			format!("[{}]", values.join(" "))
		})
		.collect();
	format!("[{}]", rows.join("\n "))
}
