use crate::{
	binning::BinningInstruction, BranchNode, LeafNode, Node, SplitDirection, Tree,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::Rng;

/// These are the options that control how a single tree is grown.
#[derive(Clone, Debug)]
pub struct TrainTreeOptions {
	/// The depth of the tree will never exceed this value. If it is `None`, nodes are split until they are pure or too small.
	pub max_depth: Option<usize>,
	/// A node is only split if it holds at least this many examples.
	pub min_examples_to_split: usize,
	/// A split is only valid if each child receives at least this many examples.
	pub min_examples_per_child: usize,
	/// A split is only valid if the sum of hessians in each child is at least this value.
	pub min_sum_hessians_per_child: f64,
	/// A node is only split if the best split achieves more than this gain.
	pub min_gain_to_split: f64,
	pub l2_regularization: f64,
	/// If set, each split considers a random subset of this many features.
	pub max_features: Option<usize>,
}

impl Default for TrainTreeOptions {
	fn default() -> Self {
		Self {
			max_depth: None,
			min_examples_to_split: 2,
			min_examples_per_child: 1,
			min_sum_hessians_per_child: 0.0,
			min_gain_to_split: 0.0,
			l2_regularization: 0.0,
			max_features: None,
		}
	}
}

/// The sums of gradients and hessians and the number of examples in one bin.
#[derive(Clone, Copy, Debug, Default)]
struct BinStatsEntry {
	sum_gradients: f64,
	sum_hessians: f64,
	count: usize,
}

impl std::ops::AddAssign for BinStatsEntry {
	fn add_assign(&mut self, other: Self) {
		self.sum_gradients += other.sum_gradients;
		self.sum_hessians += other.sum_hessians;
		self.count += other.count;
	}
}

impl std::ops::Sub for BinStatsEntry {
	type Output = Self;
	fn sub(self, other: Self) -> Self {
		Self {
			sum_gradients: self.sum_gradients - other.sum_gradients,
			sum_hessians: self.sum_hessians - other.sum_hessians,
			count: self.count - other.count,
		}
	}
}

struct Split {
	feature_index: usize,
	/// Examples with a valid bin <= this bin are sent left.
	bin: usize,
	invalid_values_direction: SplitDirection,
	gain: f64,
}

struct QueueItem {
	node_index: usize,
	depth: usize,
	examples: Vec<usize>,
}

/**
Grow a tree on the examples in `examples`, which index rows of `binned_features` and may contain repeats. `gradients` and `hessians` are indexed by row. Leaves hold `-G / (H + l2)` computed from the examples that reach them.
*/
pub fn train_tree(
	binned_features: ArrayView2<u8>,
	binning_instructions: &[BinningInstruction],
	gradients: &[f32],
	hessians: &[f32],
	examples: Vec<usize>,
	options: &TrainTreeOptions,
	rng: &mut impl Rng,
) -> Tree {
	let mut nodes = vec![Node::Leaf(LeafNode { value: 0.0 })];
	let mut queue = vec![QueueItem {
		node_index: 0,
		depth: 0,
		examples,
	}];
	while let Some(QueueItem {
		node_index,
		depth,
		examples,
	}) = queue.pop()
	{
		let mut totals = BinStatsEntry::default();
		for example in examples.iter() {
			totals += BinStatsEntry {
				sum_gradients: gradients[*example] as f64,
				sum_hessians: hessians[*example] as f64,
				count: 1,
			};
		}
		let can_split = options.max_depth.map(|max_depth| depth < max_depth).unwrap_or(true)
			&& examples.len() >= options.min_examples_to_split
			&& examples.len() >= 2 * options.min_examples_per_child;
		let split = if can_split {
			choose_best_split(
				binned_features,
				binning_instructions,
				gradients,
				hessians,
				&examples,
				totals,
				options,
				rng,
			)
		} else {
			None
		};
		let split = match split {
			Some(split) => split,
			None => {
				let value = -totals.sum_gradients / (totals.sum_hessians + options.l2_regularization);
				nodes[node_index] = Node::Leaf(LeafNode {
					value: value.to_f32().unwrap_or(0.0),
				});
				continue;
			}
		};
		let (left_examples, right_examples): (Vec<usize>, Vec<usize>) =
			examples.into_iter().partition(|example| {
				match binned_features[(*example, split.feature_index)] as usize {
					0 => split.invalid_values_direction == SplitDirection::Left,
					bin => bin <= split.bin,
				}
			});
		let left_child_index = nodes.len();
		let right_child_index = nodes.len() + 1;
		nodes.push(Node::Leaf(LeafNode { value: 0.0 }));
		nodes.push(Node::Leaf(LeafNode { value: 0.0 }));
		nodes[node_index] = Node::Branch(BranchNode {
			left_child_index,
			right_child_index,
			feature_index: split.feature_index,
			split_value: binning_instructions[split.feature_index].thresholds[split.bin - 1],
			invalid_values_direction: split.invalid_values_direction,
		});
		queue.push(QueueItem {
			node_index: right_child_index,
			depth: depth + 1,
			examples: right_examples,
		});
		queue.push(QueueItem {
			node_index: left_child_index,
			depth: depth + 1,
			examples: left_examples,
		});
	}
	Tree { nodes }
}

#[allow(clippy::too_many_arguments)]
fn choose_best_split(
	binned_features: ArrayView2<u8>,
	binning_instructions: &[BinningInstruction],
	gradients: &[f32],
	hessians: &[f32],
	examples: &[usize],
	totals: BinStatsEntry,
	options: &TrainTreeOptions,
	rng: &mut impl Rng,
) -> Option<Split> {
	let n_features = binned_features.ncols();
	let feature_indexes: Vec<usize> = match options.max_features {
		Some(max_features) if max_features < n_features => {
			let mut feature_indexes =
				rand::seq::index::sample(rng, n_features, max_features.max(1)).into_vec();
			feature_indexes.sort_unstable();
			feature_indexes
		}
		_ => (0..n_features).collect(),
	};
	let parent_score = compute_score(totals, options.l2_regularization);
	let mut best_split: Option<Split> = None;
	for feature_index in feature_indexes {
		let binning_instruction = &binning_instructions[feature_index];
		// Features with a single valid bin cannot be split.
		if binning_instruction.thresholds.is_empty() {
			continue;
		}
		let mut bin_stats = vec![BinStatsEntry::default(); binning_instruction.n_bins()];
		for example in examples.iter() {
			let bin = binned_features[(*example, feature_index)] as usize;
			bin_stats[bin] += BinStatsEntry {
				sum_gradients: gradients[*example] as f64,
				sum_hessians: hessians[*example] as f64,
				count: 1,
			};
		}
		let invalid = bin_stats[0];
		let directions: &[SplitDirection] = if invalid.count > 0 {
			&[SplitDirection::Left, SplitDirection::Right]
		} else {
			&[SplitDirection::Right]
		};
		for invalid_values_direction in directions.iter() {
			let mut left = match invalid_values_direction {
				SplitDirection::Left => invalid,
				SplitDirection::Right => BinStatsEntry::default(),
			};
			// The last valid bin can not be the left side of a split.
			for bin in 1..binning_instruction.n_valid_bins() {
				left += bin_stats[bin];
				let right = totals - left;
				if left.count < options.min_examples_per_child
					|| right.count < options.min_examples_per_child
					|| left.sum_hessians < options.min_sum_hessians_per_child
					|| right.sum_hessians < options.min_sum_hessians_per_child
				{
					continue;
				}
				let gain = compute_score(left, options.l2_regularization)
					+ compute_score(right, options.l2_regularization)
					- parent_score;
				let is_better = best_split
					.as_ref()
					.map(|best_split| gain > best_split.gain)
					.unwrap_or(true);
				if gain > options.min_gain_to_split && is_better {
					best_split = Some(Split {
						feature_index,
						bin,
						invalid_values_direction: *invalid_values_direction,
						gain,
					});
				}
			}
		}
	}
	best_split
}

/// The negative loss of a node whose value is chosen optimally, `G^2 / (H + l2)`.
fn compute_score(entry: BinStatsEntry, l2_regularization: f64) -> f64 {
	let denominator = entry.sum_hessians + l2_regularization;
	if denominator <= 0.0 {
		0.0
	} else {
		entry.sum_gradients * entry.sum_gradients / denominator
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::binning::{bin_features, compute_binning_instructions};
	use rand::SeedableRng;
	use rand_xoshiro::Xoshiro256Plus;

	#[test]
	fn test_train_tree_fits_step() {
		// The label is 1 when the second feature is greater than 2.
		let features = arr2(&[
			[5.0, 1.0],
			[3.0, 2.0],
			[4.0, 3.0],
			[1.0, 4.0],
			[2.0, std::f32::NAN],
			[6.0, 0.0],
		]);
		let labels = [0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
		let instructions = compute_binning_instructions(features.view());
		let binned = bin_features(features.view(), &instructions);
		let gradients: Vec<f32> = labels.iter().map(|label| -label).collect();
		let hessians = vec![1.0; labels.len()];
		let mut rng = Xoshiro256Plus::seed_from_u64(0);
		let tree = train_tree(
			binned.view(),
			&instructions,
			&gradients,
			&hessians,
			(0..labels.len()).collect(),
			&TrainTreeOptions::default(),
			&mut rng,
		);
		for (row, label) in features.axis_iter(Axis(0)).zip(labels.iter()) {
			assert_eq!(tree.predict(row), *label);
		}
		assert_eq!(tree.depth(), 1);
		match &tree.nodes[0] {
			Node::Branch(branch) => {
				assert_eq!(branch.feature_index, 1);
				assert_eq!(branch.split_value, 2.5);
				assert_eq!(branch.invalid_values_direction, SplitDirection::Right);
			}
			_ => panic!("expected the root to be a branch"),
		}
	}

	#[test]
	fn test_max_depth_and_min_examples() {
		let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
		let instructions = compute_binning_instructions(features.view());
		let binned = bin_features(features.view(), &instructions);
		let gradients = vec![-0.0, -1.0, -0.0, -1.0];
		let hessians = vec![1.0; 4];
		let mut rng = Xoshiro256Plus::seed_from_u64(0);
		let stump = train_tree(
			binned.view(),
			&instructions,
			&gradients,
			&hessians,
			(0..4).collect(),
			&TrainTreeOptions {
				max_depth: Some(0),
				..Default::default()
			},
			&mut rng,
		);
		assert_eq!(stump.nodes, vec![Node::Leaf(LeafNode { value: 0.5 })]);
		let tree = train_tree(
			binned.view(),
			&instructions,
			&gradients,
			&hessians,
			(0..4).collect(),
			&TrainTreeOptions {
				min_examples_to_split: 5,
				..Default::default()
			},
			&mut rng,
		);
		assert_eq!(tree.n_leaves(), 1);
	}
}
