use crate::{
	binning::{bin_features, compute_binning_instructions},
	train_tree::{train_tree, TrainTreeOptions},
	validate, Node, TrainError, Tree,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::ops::Neg;

/// These are the options passed to `GbtClassifier::train`.
#[derive(Clone, Debug)]
pub struct GbtOptions {
	/// The number of boosting rounds. One tree is trained per round.
	pub n_estimators: usize,
	pub max_depth: usize,
	/// The learning rate scales the leaf values to control the effect each tree has on the output.
	pub learning_rate: f32,
	pub l2_regularization: f32,
	/// A split is only valid if the sum of hessians in each child is at least this value.
	pub min_sum_hessians_per_child: f32,
}

impl Default for GbtOptions {
	fn default() -> Self {
		Self {
			n_estimators: 100,
			max_depth: 6,
			learning_rate: 0.3,
			l2_regularization: 1.0,
			min_sum_hessians_per_child: 1.0,
		}
	}
}

/// A gradient boosted trees binary classifier. The logit of the positive class is `bias` plus the sum of the trees' outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbtClassifier {
	pub bias: f32,
	pub trees: Vec<Tree>,
	/// The training loss after each round.
	pub losses: Vec<f32>,
}

impl GbtClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		options: &GbtOptions,
	) -> Result<GbtClassifier, TrainError> {
		validate(features, labels)?;
		if options.n_estimators == 0 {
			return Err(TrainError::InvalidOption("n_estimators"));
		}
		let binning_instructions = compute_binning_instructions(features);
		let binned_features = bin_features(features, &binning_instructions);
		let labels: Vec<f32> = labels.iter().map(|label| label.to_f32().unwrap()).collect();
		let n_examples = labels.len();
		// The bias is the log odds of the positive class, clamped so a single class dataset still has a finite bias.
		let mean = labels.iter().sum::<f32>() / n_examples.to_f32().unwrap();
		let mean = mean.max(1e-6).min(1.0 - 1e-6);
		let bias = (mean / (1.0 - mean)).ln();
		let tree_options = TrainTreeOptions {
			max_depth: Some(options.max_depth),
			min_examples_to_split: 2,
			min_examples_per_child: 1,
			min_sum_hessians_per_child: options.min_sum_hessians_per_child as f64,
			min_gain_to_split: 0.0,
			l2_regularization: options.l2_regularization as f64,
			max_features: None,
		};
		// Every feature is considered at every split, so the rng is never drawn from.
		let mut rng = Xoshiro256Plus::seed_from_u64(0);
		let mut logits = vec![bias; n_examples];
		let mut gradients = vec![0.0; n_examples];
		let mut hessians = vec![0.0; n_examples];
		let mut trees = Vec::with_capacity(options.n_estimators);
		let mut losses = Vec::with_capacity(options.n_estimators);
		for _ in 0..options.n_estimators {
			for (gradient, hessian, logit, label) in itertools::izip!(
				gradients.iter_mut(),
				hessians.iter_mut(),
				logits.iter(),
				labels.iter()
			) {
				let probability = sigmoid(*logit);
				*gradient = probability - label;
				*hessian = probability * (1.0 - probability);
			}
			let mut tree = train_tree(
				binned_features.view(),
				&binning_instructions,
				&gradients,
				&hessians,
				(0..n_examples).collect(),
				&tree_options,
				&mut rng,
			);
			for node in tree.nodes.iter_mut() {
				if let Node::Leaf(leaf) = node {
					leaf.value *= options.learning_rate;
				}
			}
			for (logit, row) in logits.iter_mut().zip(features.axis_iter(Axis(0))) {
				*logit += tree.predict(row);
			}
			trees.push(tree);
			losses.push(compute_loss(&logits, &labels));
		}
		Ok(GbtClassifier {
			bias,
			trees,
			losses,
		})
	}

	/// Compute the probability of the positive class for each row of `features`.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array1<f32> {
		features
			.axis_iter(Axis(0))
			.map(|row| {
				let logit = self.bias + self.trees.iter().map(|tree| tree.predict(row)).sum::<f32>();
				sigmoid(logit)
			})
			.collect()
	}

	/// Predict the class of each row of `features` with a threshold of 0.5.
	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<usize> {
		self.predict_proba(features)
			.mapv(|probability| if probability >= 0.5 { 1 } else { 0 })
	}
}

fn sigmoid(logit: f32) -> f32 {
	1.0 / (logit.neg().exp() + 1.0)
}

/// The mean binary cross entropy of the current logits.
fn compute_loss(logits: &[f32], labels: &[f32]) -> f32 {
	let total: f32 = logits
		.iter()
		.zip(labels.iter())
		.map(|(logit, label)| {
			let probability = sigmoid(*logit).max(std::f32::EPSILON).min(1.0 - std::f32::EPSILON);
			-label * probability.ln() - (1.0 - label) * (1.0 - probability).ln()
		})
		.sum();
	total / logits.len().to_f32().unwrap()
}

#[cfg(test)]
mod test {
	use super::*;
	use rand::Rng;

	#[test]
	fn test_gbt() {
		let mut rng = Xoshiro256Plus::seed_from_u64(3);
		let n = 200;
		let features = Array2::from_shape_fn((n, 2), |_| rng.gen::<f32>());
		let labels: Array1<usize> = features
			.axis_iter(Axis(0))
			.map(|row| if row[0] > 0.6 || row[1] < 0.2 { 1 } else { 0 })
			.collect();
		let model = GbtClassifier::train(
			features.view(),
			labels.view(),
			&GbtOptions {
				n_estimators: 50,
				max_depth: 3,
				learning_rate: 0.2,
				..Default::default()
			},
		)
		.unwrap();
		assert_eq!(model.trees.len(), 50);
		assert!(model.losses.last().unwrap() < model.losses.first().unwrap());
		let predictions = model.predict(features.view());
		let n_correct = predictions
			.iter()
			.zip(labels.iter())
			.filter(|(prediction, label)| prediction == label)
			.count();
		assert!(n_correct >= 190);
	}

	#[test]
	fn test_single_class_bias() {
		let features = arr2(&[[1.0], [2.0], [3.0]]);
		let labels = arr1(&[1, 1, 1]);
		let model = GbtClassifier::train(
			features.view(),
			labels.view(),
			&GbtOptions {
				n_estimators: 1,
				..Default::default()
			},
		)
		.unwrap();
		assert!(model.bias.is_finite());
		assert!(model.predict(features.view()).iter().all(|p| *p == 1));
	}
}
