use crate::{
	binning::{bin_features, compute_binning_instructions},
	train_tree::{train_tree, TrainTreeOptions},
	validate, TrainError, Tree,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// These are the options passed to `RandomForestClassifier::train`.
#[derive(Clone, Debug)]
pub struct RandomForestOptions {
	pub n_estimators: usize,
	/// If `None`, trees are grown until their leaves are pure or smaller than `min_samples_split`.
	pub max_depth: Option<usize>,
	/// A node is only split if it holds at least this many examples.
	pub min_samples_split: usize,
	/// Tree `i` is trained with a random number generator seeded with `seed + i`.
	pub seed: u64,
}

impl Default for RandomForestOptions {
	fn default() -> Self {
		Self {
			n_estimators: 100,
			max_depth: None,
			min_samples_split: 2,
			seed: 0,
		}
	}
}

/// A random forest of trees, each grown on a bootstrap sample of the training examples with a random subset of `sqrt(n_features)` features considered at every split. The predicted probability is the mean of the trees' leaf values, which are the fractions of positive examples in each leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
	pub trees: Vec<Tree>,
}

impl RandomForestClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		options: &RandomForestOptions,
	) -> Result<RandomForestClassifier, TrainError> {
		validate(features, labels)?;
		if options.n_estimators == 0 {
			return Err(TrainError::InvalidOption("n_estimators"));
		}
		let binning_instructions = compute_binning_instructions(features);
		let binned_features = bin_features(features, &binning_instructions);
		// With unit hessians and no regularization, each leaf value is the mean label of the examples in the leaf.
		let gradients: Vec<f32> = labels.iter().map(|label| -label.to_f32().unwrap()).collect();
		let hessians = vec![1.0; labels.len()];
		let n_examples = features.nrows();
		let n_features = features.ncols();
		let max_features = (n_features.to_f32().unwrap().sqrt().floor().to_usize().unwrap()).max(1);
		let tree_options = TrainTreeOptions {
			max_depth: options.max_depth,
			min_examples_to_split: options.min_samples_split.max(2),
			max_features: Some(max_features),
			..Default::default()
		};
		let trees = (0..options.n_estimators)
			.into_par_iter()
			.map(|tree_index| {
				let mut rng = Xoshiro256Plus::seed_from_u64(
					options.seed.wrapping_add(tree_index.to_u64().unwrap()),
				);
				let examples: Vec<usize> = (0..n_examples)
					.map(|_| rng.gen_range(0..n_examples))
					.collect();
				train_tree(
					binned_features.view(),
					&binning_instructions,
					&gradients,
					&hessians,
					examples,
					&tree_options,
					&mut rng,
				)
			})
			.collect();
		Ok(RandomForestClassifier { trees })
	}

	/// Compute the probability of the positive class for each row of `features`.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array1<f32> {
		let n_trees = self.trees.len().to_f32().unwrap();
		features
			.axis_iter(Axis(0))
			.map(|row| {
				let sum: f32 = self.trees.iter().map(|tree| tree.predict(row)).sum();
				(sum / n_trees).max(0.0).min(1.0)
			})
			.collect()
	}

	/// Predict the class of each row of `features` with a threshold of 0.5.
	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<usize> {
		self.predict_proba(features)
			.mapv(|probability| if probability >= 0.5 { 1 } else { 0 })
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn dataset() -> (Array2<f32>, Array1<usize>) {
		// The label is 1 when the sum of the first two features is greater than 1.
		let mut rng = Xoshiro256Plus::seed_from_u64(7);
		let n = 200;
		let features = Array2::from_shape_fn((n, 3), |_| rng.gen::<f32>());
		let labels = features
			.axis_iter(Axis(0))
			.map(|row| if row[0] + row[1] > 1.0 { 1 } else { 0 })
			.collect();
		(features, labels)
	}

	#[test]
	fn test_random_forest() {
		let (features, labels) = dataset();
		let options = RandomForestOptions {
			n_estimators: 20,
			max_depth: Some(6),
			min_samples_split: 2,
			seed: 42,
		};
		let model = RandomForestClassifier::train(features.view(), labels.view(), &options).unwrap();
		assert_eq!(model.trees.len(), 20);
		assert!(model.trees.iter().all(|tree| tree.depth() <= 6));
		let predictions = model.predict(features.view());
		let n_correct = predictions
			.iter()
			.zip(labels.iter())
			.filter(|(prediction, label)| prediction == label)
			.count();
		assert!(n_correct >= 180);
		let probabilities = model.predict_proba(features.view());
		assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
		// Training is deterministic for a fixed seed.
		let again = RandomForestClassifier::train(features.view(), labels.view(), &options).unwrap();
		assert_eq!(model, again);
	}

	#[test]
	fn test_invalid() {
		let (features, labels) = dataset();
		let options = RandomForestOptions {
			n_estimators: 0,
			..Default::default()
		};
		assert!(matches!(
			RandomForestClassifier::train(features.view(), labels.view(), &options),
			Err(TrainError::InvalidOption("n_estimators"))
		));
		assert!(matches!(
			RandomForestClassifier::train(
				features.slice(s![..0, ..]),
				labels.slice(s![..0]),
				&Default::default()
			),
			Err(TrainError::Empty)
		));
	}
}
