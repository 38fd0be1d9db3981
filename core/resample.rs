use crate::load::Datasets;
use anyhow::{bail, format_err, Context, Result};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use sepsis_dataframe::{Column, DataFrame};
use tracing::info;

/// The pool of examples left after undersampling the majority class.
#[derive(Debug)]
pub struct ResampledPool {
	pub features: DataFrame,
	pub labels: Array1<usize>,
	pub n_majority: usize,
	pub n_minority: usize,
}

/// The features and labels of the train and validation splits.
#[derive(Debug)]
pub struct Split {
	pub x_train: DataFrame,
	pub x_validation: DataFrame,
	pub y_train: Array1<usize>,
	pub y_validation: Array1<usize>,
}

/**
Merge the train and test datasets and undersample the majority class so it has twice as many examples as the minority class.

The features of the train and test datasets are concatenated row wise, as are the labels, and the two are joined by row position. The majority class (label 0) is sampled without replacement, with a random number generator seeded with `seed` if given and from entropy otherwise. The sampled majority rows come first, in sampled order, followed by every minority row in their original order.
*/
pub fn undersample(
	datasets: Datasets,
	label_column: &str,
	seed: Option<u64>,
) -> Result<ResampledPool> {
	let Datasets {
		x_train,
		x_test,
		y_train,
		y_test,
	} = datasets;
	let x =
		DataFrame::concat_rows(&[&x_train, &x_test]).context("failed to merge the features")?;
	let mut y =
		DataFrame::concat_rows(&[&y_train, &y_test]).context("failed to merge the labels")?;
	let label = y.remove_column(label_column)?;
	let dataframe = x
		.hconcat(DataFrame::new(vec![label])?)
		.context("the features and labels have different numbers of rows")?;
	let labels = labels_from_column(dataframe.column(label_column)?)?;
	let (mut majority, minority): (Vec<usize>, Vec<usize>) =
		(0..labels.len()).partition(|index| labels[*index] == 0);
	if minority.is_empty() {
		bail!("there are no examples of the minority class");
	}
	let n_samples = 2 * minority.len();
	if majority.len() < n_samples {
		bail!(
			"cannot sample {} majority examples without replacement from {}",
			n_samples,
			majority.len()
		);
	}
	let mut rng = Xoshiro256Plus::seed_from_u64(seed.unwrap_or_else(rand::random::<u64>));
	let (sampled, _) = majority.partial_shuffle(&mut rng, n_samples);
	let rows: Vec<usize> = sampled.iter().chain(minority.iter()).copied().collect();
	let mut features = dataframe.take_rows(&rows);
	let label = features.remove_column(label_column)?;
	let labels = labels_from_column(&label)?;
	info!(
		n_examples = labels.len(),
		n_majority = n_samples,
		n_minority = minority.len(),
		"undersampled the majority class"
	);
	Ok(ResampledPool {
		features,
		labels,
		n_majority: n_samples,
		n_minority: minority.len(),
	})
}

/**
Split the pool into train and validation sets. The rows are shuffled with a random number generator seeded with `seed`, the first `ceil(test_fraction * n)` shuffled rows form the validation set, and the remaining rows form the train set.
*/
pub fn train_validation_split(
	pool: ResampledPool,
	test_fraction: f64,
	seed: u64,
) -> Result<Split> {
	if !(test_fraction > 0.0 && test_fraction < 1.0) {
		bail!(
			"the test fraction must be between 0 and 1, found {}",
			test_fraction
		);
	}
	let n_examples = pool.labels.len();
	let n_validation = (test_fraction * n_examples.to_f64().unwrap())
		.ceil()
		.to_usize()
		.unwrap();
	if n_validation == 0 || n_validation >= n_examples {
		bail!(
			"cannot split {} examples with a test fraction of {}",
			n_examples,
			test_fraction
		);
	}
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	let mut indices: Vec<usize> = (0..n_examples).collect();
	indices.shuffle(&mut rng);
	let (validation_indices, train_indices) = indices.split_at(n_validation);
	let split = Split {
		x_train: pool.features.take_rows(train_indices),
		x_validation: pool.features.take_rows(validation_indices),
		y_train: pool.labels.select(Axis(0), train_indices),
		y_validation: pool.labels.select(Axis(0), validation_indices),
	};
	info!(
		n_train = split.y_train.len(),
		n_validation = split.y_validation.len(),
		"split the pool"
	);
	Ok(split)
}

/// Read a label column of 0s and 1s.
pub fn labels_from_column(column: &Column) -> Result<Array1<usize>> {
	let column = column
		.as_number()
		.ok_or_else(|| format_err!("the label column {} must be numeric", column.name()))?;
	column
		.data
		.iter()
		.map(|value| {
			if *value == 0.0 {
				Ok(0)
			} else if *value == 1.0 {
				Ok(1)
			} else {
				Err(format_err!(
					"the label column {} must hold 0 or 1, found {}",
					column.name,
					value
				))
			}
		})
		.collect()
}

#[cfg(test)]
mod test {
	use super::*;
	use sepsis_dataframe::NumberColumn;

	fn datasets(n_negative: usize, n_positive: usize) -> Datasets {
		let n = n_negative + n_positive;
		// Every `step`th example is positive.
		let step = n / n_positive;
		let labels: Vec<f32> = (0..n)
			.map(|index| {
				if index % step == 0 && index / step < n_positive {
					1.0
				} else {
					0.0
				}
			})
			.collect();
		let features: Vec<f32> = (0..n).map(|index| index as f32).collect();
		let x = DataFrame::new(vec![Column::Number(NumberColumn::new("HR", features))]).unwrap();
		let y = DataFrame::new(vec![Column::Number(NumberColumn::new(
			"SepsisLabel",
			labels,
		))])
		.unwrap();
		let half: Vec<usize> = (0..n / 2).collect();
		let rest: Vec<usize> = (n / 2..n).collect();
		Datasets {
			x_train: x.take_rows(&half),
			x_test: x.take_rows(&rest),
			y_train: y.take_rows(&half),
			y_test: y.take_rows(&rest),
		}
	}

	#[test]
	fn test_undersample() {
		for (n_negative, n_positive) in &[(30, 10), (50, 5), (21, 7)] {
			let pool =
				undersample(datasets(*n_negative, *n_positive), "SepsisLabel", None).unwrap();
			assert_eq!(pool.n_minority, *n_positive);
			assert_eq!(pool.n_majority, 2 * n_positive);
			assert_eq!(pool.labels.len(), 3 * n_positive);
			assert_eq!(pool.features.nrows(), 3 * n_positive);
			assert_eq!(
				pool.labels.iter().filter(|label| **label == 1).count(),
				*n_positive
			);
			assert_eq!(pool.features.column_names(), vec!["HR"]);
		}
	}

	#[test]
	fn test_undersample_seeded() {
		let a = undersample(datasets(30, 10), "SepsisLabel", Some(3)).unwrap();
		let b = undersample(datasets(30, 10), "SepsisLabel", Some(3)).unwrap();
		assert_eq!(a.features, b.features);
	}

	#[test]
	fn test_undersample_errors() {
		assert!(undersample(datasets(10, 10), "SepsisLabel", None).is_err());
		assert!(undersample(datasets(30, 10), "Label", None).is_err());
	}

	#[test]
	fn test_train_validation_split() {
		let split = |seed| {
			let pool = undersample(datasets(30, 10), "SepsisLabel", Some(1)).unwrap();
			train_validation_split(pool, 0.2, seed).unwrap()
		};
		let a = split(42);
		assert_eq!(a.y_validation.len(), 6);
		assert_eq!(a.y_train.len(), 24);
		assert_eq!(a.x_train.nrows(), 24);
		assert_eq!(a.x_validation.nrows(), 6);
		let b = split(42);
		assert_eq!(a.x_train, b.x_train);
		assert_eq!(a.y_validation, b.y_validation);
	}

	#[test]
	fn test_labels_from_column() {
		let column = Column::Number(NumberColumn::new("y", vec![0.0, 1.0, 1.0]));
		assert_eq!(labels_from_column(&column).unwrap(), arr1(&[0, 1, 1]));
		let column = Column::Number(NumberColumn::new("y", vec![0.0, 2.0]));
		assert!(labels_from_column(&column).is_err());
		let column = Column::Number(NumberColumn::new("y", vec![std::f32::NAN]));
		assert!(labels_from_column(&column).is_err());
	}
}
