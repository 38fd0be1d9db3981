use super::{early_stopping::EarlyStoppingMonitor, Solver, TrainError, TrainOptions};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use sepsis_metrics::{BinaryCrossEntropy, BinaryCrossEntropyInput, StreamingMetric};
use serde::{Deserialize, Serialize};
use std::ops::Neg;

/// The maximum number of times a Newton step is halved while searching for a step that does not increase the loss.
const MAX_STEP_HALVINGS: usize = 20;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
	/// The weights on the original feature scale.
	pub weights: Array1<f32>,
	pub bias: f32,
	/// The training loss after each iteration.
	pub losses: Vec<f32>,
}

/// The model parameters on the standardized feature scale.
struct Parameters {
	weights: Array1<f64>,
	bias: f64,
}

impl LogisticRegression {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		options: &TrainOptions,
	) -> Result<LogisticRegression, TrainError> {
		if features.nrows() != labels.len() {
			return Err(TrainError::LengthMismatch {
				features: features.nrows(),
				labels: labels.len(),
			});
		}
		if features.nrows() == 0 {
			return Err(TrainError::Empty);
		}
		if let Some(label) = labels.iter().find(|label| **label > 1) {
			return Err(TrainError::InvalidLabel(*label));
		}
		if !(options.c > 0.0) {
			return Err(TrainError::InvalidC(options.c));
		}
		let (means, stds) = compute_means_and_stds(features);
		let standardized = standardize(features, &means, &stds);
		let labels: Array1<f64> = labels.mapv(|label| label.to_f64().unwrap());
		let (parameters, losses) = match options.solver {
			Solver::GradientDescent => {
				train_gradient_descent(standardized.view(), labels.view(), options)?
			}
			Solver::Newton => train_newton(standardized.view(), labels.view(), options)?,
		};
		// Map the weights back to the original feature scale.
		let weights: Array1<f64> = izip!(parameters.weights.iter(), stds.iter())
			.map(|(weight, std)| weight / std)
			.collect();
		let bias = parameters.bias
			- izip!(weights.iter(), means.iter())
				.map(|(weight, mean)| weight * mean)
				.sum::<f64>();
		Ok(LogisticRegression {
			weights: weights.mapv(|weight| weight as f32),
			bias: bias as f32,
			losses,
		})
	}

	/// Compute the probability of the positive class for each row of `features`.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array1<f32> {
		let mut probabilities = Array1::from_elem(features.nrows(), self.bias);
		ndarray::linalg::general_mat_vec_mul(
			1.0,
			&features,
			&self.weights,
			1.0,
			&mut probabilities,
		);
		probabilities.mapv_inplace(|logit| 1.0 / (logit.neg().exp() + 1.0));
		probabilities
	}

	/// Predict the class of each row of `features` with a threshold of 0.5.
	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<usize> {
		self.predict_proba(features)
			.mapv(|probability| if probability >= 0.5 { 1 } else { 0 })
	}
}

fn train_gradient_descent(
	features: ArrayView2<f64>,
	labels: ArrayView1<f64>,
	options: &TrainOptions,
) -> Result<(Parameters, Vec<f32>), TrainError> {
	let n_examples = features.nrows().to_f64().unwrap();
	let penalty = 1.0 / (options.c as f64 * n_examples);
	let learning_rate = options.learning_rate as f64;
	let mut parameters = Parameters {
		weights: Array1::zeros(features.ncols()),
		bias: 0.0,
	};
	let mut losses = Vec::new();
	let mut early_stopping_monitor =
		EarlyStoppingMonitor::new(options.tolerance, options.n_rounds_no_improve);
	for _ in 0..options.max_iter {
		let probabilities = compute_probabilities(features, &parameters);
		let loss = compute_loss(&probabilities, labels, &parameters, penalty);
		if !loss.is_finite() {
			return Err(TrainError::Diverged);
		}
		losses.push(loss);
		if early_stopping_monitor.update(loss) {
			break;
		}
		let residuals = &probabilities - &labels;
		let weight_gradients =
			features.t().dot(&residuals) / n_examples + &parameters.weights * penalty;
		let bias_gradient = residuals.mean().unwrap_or(0.0);
		parameters.weights.scaled_add(-learning_rate, &weight_gradients);
		parameters.bias -= learning_rate * bias_gradient;
	}
	Ok((parameters, losses))
}

fn train_newton(
	features: ArrayView2<f64>,
	labels: ArrayView1<f64>,
	options: &TrainOptions,
) -> Result<(Parameters, Vec<f32>), TrainError> {
	let n_features = features.ncols();
	let n_examples = features.nrows().to_f64().unwrap();
	let penalty = 1.0 / (options.c as f64 * n_examples);
	let mut parameters = Parameters {
		weights: Array1::zeros(n_features),
		bias: 0.0,
	};
	let mut probabilities = compute_probabilities(features, &parameters);
	let mut loss = compute_loss(&probabilities, labels, &parameters, penalty);
	let mut losses = vec![loss];
	let mut early_stopping_monitor =
		EarlyStoppingMonitor::new(options.tolerance, options.n_rounds_no_improve);
	early_stopping_monitor.update(loss);
	for _ in 0..options.max_iter {
		let residuals = &probabilities - &labels;
		let variances = probabilities.mapv(|p| p * (1.0 - p));
		// The last row and column of the hessian hold the bias terms.
		let mut gradient = Array1::<f64>::zeros(n_features + 1);
		gradient
			.slice_mut(s![..n_features])
			.assign(&(features.t().dot(&residuals) / n_examples + &parameters.weights * penalty));
		gradient[n_features] = residuals.mean().unwrap_or(0.0);
		let weighted_features = &features * &variances.view().insert_axis(Axis(1));
		let mut hessian = Array2::<f64>::zeros((n_features + 1, n_features + 1));
		hessian
			.slice_mut(s![..n_features, ..n_features])
			.assign(&(features.t().dot(&weighted_features) / n_examples));
		let cross = weighted_features.sum_axis(Axis(0)) / n_examples;
		hessian
			.slice_mut(s![..n_features, n_features])
			.assign(&cross);
		hessian
			.slice_mut(s![n_features, ..n_features])
			.assign(&cross);
		hessian[(n_features, n_features)] = variances.mean().unwrap_or(0.0);
		for index in 0..n_features {
			hessian[(index, index)] += penalty;
		}
		let step = cholesky_solve(hessian.view(), gradient.view())
			.ok_or(TrainError::SingularHessian)?;
		// Halve the step until it does not increase the loss.
		let mut scale = 1.0;
		let mut candidate = None;
		for _ in 0..MAX_STEP_HALVINGS {
			let next = Parameters {
				weights: &parameters.weights - &(&step.slice(s![..n_features]) * scale),
				bias: parameters.bias - step[n_features] * scale,
			};
			let next_probabilities = compute_probabilities(features, &next);
			let next_loss = compute_loss(&next_probabilities, labels, &next, penalty);
			if next_loss.is_finite() && next_loss <= loss {
				candidate = Some((next, next_probabilities, next_loss));
				break;
			}
			scale *= 0.5;
		}
		let (next, next_probabilities, next_loss) = match candidate {
			Some(candidate) => candidate,
			// No step decreases the loss, so the current parameters are a minimum.
			None => break,
		};
		parameters = next;
		probabilities = next_probabilities;
		loss = next_loss;
		losses.push(loss);
		if early_stopping_monitor.update(loss) {
			break;
		}
	}
	Ok((parameters, losses))
}

fn compute_probabilities(features: ArrayView2<f64>, parameters: &Parameters) -> Array1<f64> {
	let mut logits = features.dot(&parameters.weights);
	logits.mapv_inplace(|logit| 1.0 / ((logit + parameters.bias).neg().exp() + 1.0));
	logits
}

/// The mean binary cross entropy plus the L2 penalty on the weights.
fn compute_loss(
	probabilities: &Array1<f64>,
	labels: ArrayView1<f64>,
	parameters: &Parameters,
	penalty: f64,
) -> f32 {
	let mut metric = BinaryCrossEntropy::new();
	for (probability, label) in izip!(probabilities.iter(), labels.iter()) {
		metric.update(BinaryCrossEntropyInput {
			probability: *probability as f32,
			label: if *label > 0.5 { 1 } else { 0 },
		});
	}
	let cross_entropy = metric.finalize().unwrap_or(0.0);
	let l2 = 0.5 * penalty * parameters.weights.dot(&parameters.weights);
	cross_entropy + l2 as f32
}

fn compute_means_and_stds(features: ArrayView2<f32>) -> (Vec<f64>, Vec<f64>) {
	features
		.axis_iter(Axis(1))
		.map(|column| {
			let column = column.mapv(|value| value as f64);
			let mean = column.mean().unwrap_or(0.0);
			let std = column.std(0.0);
			// Constant columns are left unscaled.
			let std = if std > 0.0 && std.is_finite() { std } else { 1.0 };
			(mean, std)
		})
		.unzip()
}

fn standardize(features: ArrayView2<f32>, means: &[f64], stds: &[f64]) -> Array2<f64> {
	let mut standardized = features.mapv(|value| value as f64);
	for (mut column, mean, std) in izip!(standardized.axis_iter_mut(Axis(1)), means, stds) {
		column.mapv_inplace(|value| (value - mean) / std);
	}
	standardized
}

/// Solve `a x = b` for a symmetric positive definite `a`. Returns `None` if `a` is not positive definite.
fn cholesky_solve(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Option<Array1<f64>> {
	let n = a.nrows();
	let mut l = Array2::<f64>::zeros((n, n));
	for i in 0..n {
		for j in 0..=i {
			let sum: f64 = (0..j).map(|k| l[(i, k)] * l[(j, k)]).sum();
			if i == j {
				let diagonal = a[(i, i)] - sum;
				if !(diagonal > 1e-12) {
					return None;
				}
				l[(i, i)] = diagonal.sqrt();
			} else {
				l[(i, j)] = (a[(i, j)] - sum) / l[(j, j)];
			}
		}
	}
	// Forward substitution: l y = b.
	let mut y = Array1::<f64>::zeros(n);
	for i in 0..n {
		let sum: f64 = (0..i).map(|k| l[(i, k)] * y[k]).sum();
		y[i] = (b[i] - sum) / l[(i, i)];
	}
	// Back substitution: l^T x = y.
	let mut x = Array1::<f64>::zeros(n);
	for i in (0..n).rev() {
		let sum: f64 = (i + 1..n).map(|k| l[(k, i)] * x[k]).sum();
		x[i] = (y[i] - sum) / l[(i, i)];
	}
	Some(x)
}

#[cfg(test)]
mod test {
	use super::*;

	/// Two features where the label is 1 when the first feature is large. The second feature is noise on a much larger scale.
	fn dataset() -> (Array2<f32>, Array1<usize>) {
		let features = arr2(&[
			[0.1, 200.0],
			[0.4, 150.0],
			[0.3, 260.0],
			[0.2, 180.0],
			[0.5, 220.0],
			[1.6, 210.0],
			[1.9, 170.0],
			[2.1, 240.0],
			[1.4, 190.0],
			[1.8, 230.0],
		]);
		let labels = arr1(&[0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
		(features, labels)
	}

	#[test]
	fn test_newton() {
		let (features, labels) = dataset();
		let model = LogisticRegression::train(
			features.view(),
			labels.view(),
			&TrainOptions {
				solver: Solver::Newton,
				..Default::default()
			},
		)
		.unwrap();
		assert_eq!(model.predict(features.view()), labels);
		assert!(model.weights[0] > 0.0);
		// Each accepted step does not increase the loss.
		for pair in model.losses.windows(2) {
			assert!(pair[1] <= pair[0]);
		}
	}

	#[test]
	fn test_gradient_descent() {
		let (features, labels) = dataset();
		let model = LogisticRegression::train(
			features.view(),
			labels.view(),
			&TrainOptions {
				solver: Solver::GradientDescent,
				..Default::default()
			},
		)
		.unwrap();
		assert_eq!(model.predict(features.view()), labels);
		assert!(model.losses.len() <= 200);
		assert!(model.losses.last().unwrap() < model.losses.first().unwrap());
	}

	#[test]
	fn test_stronger_regularization_shrinks_weights() {
		let (features, labels) = dataset();
		let train = |c| {
			LogisticRegression::train(
				features.view(),
				labels.view(),
				&TrainOptions {
					c,
					..Default::default()
				},
			)
			.unwrap()
		};
		assert!(train(0.1).weights[0].abs() < train(10.0).weights[0].abs());
	}

	#[test]
	fn test_invalid_inputs() {
		let (features, labels) = dataset();
		let options = TrainOptions::default();
		assert!(matches!(
			LogisticRegression::train(features.view(), labels.slice(s![..3]), &options),
			Err(TrainError::LengthMismatch { .. })
		));
		let bad_labels = arr1(&[0, 0, 0, 0, 0, 1, 1, 1, 1, 2]);
		assert!(matches!(
			LogisticRegression::train(features.view(), bad_labels.view(), &options),
			Err(TrainError::InvalidLabel(2))
		));
		assert!(matches!(
			LogisticRegression::train(
				features.view(),
				labels.view(),
				&TrainOptions {
					c: 0.0,
					..Default::default()
				}
			),
			Err(TrainError::InvalidC(_))
		));
	}

	#[test]
	fn test_cholesky_solve() {
		let a = arr2(&[[4.0, 2.0], [2.0, 3.0]]);
		let b = arr1(&[2.0, 1.0]);
		let x = cholesky_solve(a.view(), b.view()).unwrap();
		assert!((x[0] - 0.5).abs() < 1e-12);
		assert!(x[1].abs() < 1e-12);
		let singular = arr2(&[[1.0, 1.0], [1.0, 1.0]]);
		assert!(cholesky_solve(singular.view(), b.view()).is_none());
	}
}
