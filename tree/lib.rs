/*!
This crate implements the tree ensembles the sepsis pipeline searches over: a [`RandomForestClassifier`](struct.RandomForestClassifier.html) of bootstrap sampled trees and a [`GbtClassifier`](struct.GbtClassifier.html) trained by gradient boosting with the logistic loss.

Both ensembles share one tree learner. Number features are first binned into at most 255 valid bins, with bin 0 reserved for invalid values. Each tree is then grown from the sums of gradients and hessians in each bin, choosing at every node the split that maximizes the gain `G_L^2 / (H_L + l2) + G_R^2 / (H_R + l2) - G^2 / (H + l2)`.
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod binning;
mod gbt;
mod random_forest;
mod train_tree;

pub use self::binning::{bin_features, compute_binning_instructions, BinningInstruction};
pub use self::gbt::{GbtClassifier, GbtOptions};
pub use self::random_forest::{RandomForestClassifier, RandomForestOptions};
pub use self::train_tree::{train_tree, TrainTreeOptions};

#[derive(Debug, Error)]
pub enum TrainError {
	#[error("cannot train on an empty dataset")]
	Empty,
	#[error("there are {features} rows of features but {labels} labels")]
	LengthMismatch { features: usize, labels: usize },
	#[error("labels must be 0 or 1, found {0}")]
	InvalidLabel(usize),
	#[error("{0} must be at least 1")]
	InvalidOption(&'static str),
}

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children. The root is at index 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// A branch compares the value of a single feature with `split_value`. If the value is <= `split_value` the example is sent left, otherwise it is sent right. Invalid values are sent in `invalid_values_direction`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchNode {
	pub left_child_index: usize,
	pub right_child_index: usize,
	pub feature_index: usize,
	pub split_value: f32,
	pub invalid_values_direction: SplitDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplitDirection {
	Left,
	Right,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
	pub value: f32,
}

impl Tree {
	/// Make a prediction for a single example.
	pub fn predict(&self, features: ArrayView1<f32>) -> f32 {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					left_child_index,
					right_child_index,
					feature_index,
					split_value,
					invalid_values_direction,
				}) => {
					let value = features[*feature_index];
					let direction = if !value.is_finite() {
						*invalid_values_direction
					} else if value <= *split_value {
						SplitDirection::Left
					} else {
						SplitDirection::Right
					};
					node_index = match direction {
						SplitDirection::Left => *left_child_index,
						SplitDirection::Right => *right_child_index,
					};
				}
				Node::Leaf(LeafNode { value }) => return *value,
			}
		}
	}

	pub fn n_leaves(&self) -> usize {
		self.nodes
			.iter()
			.filter(|node| matches!(node, Node::Leaf(_)))
			.count()
	}

	pub fn depth(&self) -> usize {
		fn depth(nodes: &[Node], index: usize) -> usize {
			match &nodes[index] {
				Node::Leaf(_) => 0,
				Node::Branch(branch) => {
					1 + depth(nodes, branch.left_child_index)
						.max(depth(nodes, branch.right_child_index))
				}
			}
		}
		depth(&self.nodes, 0)
	}
}

/// Check that the features and labels can be trained on.
fn validate(features: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<(), TrainError> {
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
	Ok(())
}

#[test]
fn test_predict() {
	let tree = Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				left_child_index: 1,
				right_child_index: 2,
				feature_index: 1,
				split_value: 0.5,
				invalid_values_direction: SplitDirection::Right,
			}),
			Node::Leaf(LeafNode { value: -1.0 }),
			Node::Leaf(LeafNode { value: 1.0 }),
		],
	};
	assert_eq!(tree.predict(arr1(&[9.0, 0.5]).view()), -1.0);
	assert_eq!(tree.predict(arr1(&[9.0, 0.6]).view()), 1.0);
	assert_eq!(tree.predict(arr1(&[9.0, std::f32::NAN]).view()), 1.0);
	assert_eq!(tree.n_leaves(), 2);
	assert_eq!(tree.depth(), 1);
}
