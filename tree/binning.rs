use itertools::Itertools;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rayon::prelude::*;
use sepsis_util::finite::Finite;
use std::{cmp::Ordering, collections::BTreeMap};

/// The maximum number of bins for valid values. Bin 0 is reserved for invalid values, so every bin index fits in a `u8`.
pub const MAX_VALID_BINS: usize = 255;

/*
This struct specifies how to bin a number feature. The first bin is reserved for invalid values, and after that feature values are binned by comparing them with a set of thresholds. For example, given the thresholds `[0.5, 1.5, 2]`, the bins will be:
0. invalid values
1. (-infinity, 0.5]
2. (0.5, 1.5]
3. (1.5, 2]
4. (2, infinity)
*/
#[derive(Clone, Debug, PartialEq)]
pub struct BinningInstruction {
	pub thresholds: Vec<f32>,
}

impl BinningInstruction {
	pub fn n_bins(&self) -> usize {
		1 + self.n_valid_bins()
	}

	pub fn n_valid_bins(&self) -> usize {
		self.thresholds.len() + 1
	}

	pub fn bin(&self, value: f32) -> u8 {
		if !value.is_finite() {
			return 0;
		}
		let bin = 1 + self.thresholds.partition_point(|threshold| *threshold < value);
		bin.to_u8().unwrap_or(u8::MAX)
	}
}

/// Compute the binning instructions for each column in `features`.
pub fn compute_binning_instructions(features: ArrayView2<f32>) -> Vec<BinningInstruction> {
	let columns: Vec<ArrayView1<f32>> = features.axis_iter(Axis(1)).collect();
	columns
		.into_par_iter()
		.map(compute_binning_instruction_for_feature)
		.collect()
}

fn compute_binning_instruction_for_feature(column: ArrayView1<f32>) -> BinningInstruction {
	// Create a histogram of values in the feature.
	let mut histogram: BTreeMap<Finite<f32>, usize> = BTreeMap::new();
	let mut histogram_values_count = 0;
	for value in column.iter() {
		if let Ok(value) = Finite::new(*value) {
			*histogram.entry(value).or_insert(0) += 1;
			histogram_values_count += 1;
		}
	}
	// If the number of unique values is less than `MAX_VALID_BINS`, then create one bin per unique value. Otherwise, create bins at quantiles.
	let thresholds = if histogram.len() < MAX_VALID_BINS {
		histogram
			.keys()
			.tuple_windows()
			.map(|(a, b)| (a.get() + b.get()) / 2.0)
			.collect()
	} else {
		compute_thresholds_as_quantiles(histogram, histogram_values_count)
	};
	BinningInstruction { thresholds }
}

/// Compute the thresholds for a feature as quantiles from the histogram of its values.
fn compute_thresholds_as_quantiles(
	histogram: BTreeMap<Finite<f32>, usize>,
	histogram_values_count: usize,
) -> Vec<f32> {
	let total_values_count = histogram_values_count.to_f32().unwrap();
	let quantiles: Vec<f32> = (1..MAX_VALID_BINS)
		.map(|i| i.to_f32().unwrap() / MAX_VALID_BINS.to_f32().unwrap())
		.collect();
	let quantile_indexes: Vec<usize> = quantiles
		.iter()
		.map(|q| ((total_values_count - 1.0) * q).trunc().to_usize().unwrap())
		.collect();
	let quantile_fracts: Vec<f32> = quantiles
		.iter()
		.map(|q| ((total_values_count - 1.0) * q).fract())
		.collect();
	let mut quantiles: Vec<Option<f32>> = vec![None; quantiles.len()];
	let mut current_count: usize = 0;
	let mut iter = histogram.iter().peekable();
	while let Some((value, count)) = iter.next() {
		let value = value.get();
		current_count += count;
		let next_value = iter.peek().map(|(next_value, _)| next_value.get());
		let quantiles_iter = quantiles
			.iter_mut()
			.zip(quantile_indexes.iter().zip(quantile_fracts.iter()))
			.filter(|(q, (_, _))| q.is_none());
		for (quantile, (index, fract)) in quantiles_iter {
			match (current_count - 1).cmp(index) {
				Ordering::Equal => match next_value {
					Some(next_value) if *fract > 0.0 => {
						*quantile = Some(value * (1.0 - fract) + next_value * fract);
					}
					_ => *quantile = Some(value),
				},
				Ordering::Greater => *quantile = Some(value),
				Ordering::Less => {}
			}
		}
	}
	// Repeated values produce repeated quantiles, which would create empty bins.
	quantiles.into_iter().flatten().dedup().collect()
}

/// Bin every feature value. The result has shape (n_examples, n_features).
pub fn bin_features(
	features: ArrayView2<f32>,
	binning_instructions: &[BinningInstruction],
) -> Array2<u8> {
	let mut binned = Array2::zeros(features.raw_dim());
	ndarray::Zip::from(binned.axis_iter_mut(Axis(1)))
		.and(features.axis_iter(Axis(1)))
		.and(binning_instructions)
		.par_for_each(|mut binned_column, column, binning_instruction| {
			for (binned_value, value) in binned_column.iter_mut().zip(column.iter()) {
				*binned_value = binning_instruction.bin(*value);
			}
		});
	binned
}
