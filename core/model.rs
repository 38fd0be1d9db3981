use crate::grid::{ModelFamily, Params};
use anyhow::{bail, format_err, Result};
use ndarray::prelude::*;
use sepsis_linear::LogisticRegression;
use sepsis_tree::{GbtClassifier, GbtOptions, RandomForestClassifier, RandomForestOptions};
use sepsis_util::id::Id;
use std::{
	io::{Read, Write},
	path::Path,
};

/// The current major version of the model file format. A model file is this byte followed by the model as a MessagePack document.
const MAJOR_VERSION: u8 = 0;

/// The seed of the random number generators used to train random forests.
const RANDOM_FOREST_SEED: u64 = 0;

/// A trained classifier together with the hyperparameters and feature names it was trained with.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Model {
	pub id: Id,
	pub params: Params,
	/// The names of the feature columns, in the order `predict` expects them.
	pub feature_names: Vec<String>,
	pub estimator: Estimator,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
	RandomForest(RandomForestClassifier),
	GradientBoostedTrees(GbtClassifier),
	LogisticRegression(LogisticRegression),
}

impl Estimator {
	/// Train an estimator with the hyperparameters in `params`.
	pub fn train(
		params: &Params,
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
	) -> Result<Estimator> {
		let estimator = match params {
			Params::RandomForest(params) => {
				let options = RandomForestOptions {
					n_estimators: params.n_estimators,
					max_depth: params.max_depth,
					min_samples_split: params.min_samples_split,
					seed: RANDOM_FOREST_SEED,
				};
				Estimator::RandomForest(RandomForestClassifier::train(features, labels, &options)?)
			}
			Params::GradientBoostedTrees(params) => {
				let options = GbtOptions {
					n_estimators: params.n_estimators,
					max_depth: params.max_depth,
					learning_rate: params.learning_rate,
					..Default::default()
				};
				Estimator::GradientBoostedTrees(GbtClassifier::train(features, labels, &options)?)
			}
			Params::LogisticRegression(params) => {
				let options = sepsis_linear::TrainOptions {
					c: params.c,
					solver: params.solver,
					max_iter: params.max_iter,
					..Default::default()
				};
				Estimator::LogisticRegression(LogisticRegression::train(features, labels, &options)?)
			}
		};
		Ok(estimator)
	}

	pub fn family(&self) -> ModelFamily {
		match self {
			Estimator::RandomForest(_) => ModelFamily::RandomForest,
			Estimator::GradientBoostedTrees(_) => ModelFamily::GradientBoostedTrees,
			Estimator::LogisticRegression(_) => ModelFamily::LogisticRegression,
		}
	}

	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array1<f32> {
		match self {
			Estimator::RandomForest(model) => model.predict_proba(features),
			Estimator::GradientBoostedTrees(model) => model.predict_proba(features),
			Estimator::LogisticRegression(model) => model.predict_proba(features),
		}
	}

	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<usize> {
		match self {
			Estimator::RandomForest(model) => model.predict(features),
			Estimator::GradientBoostedTrees(model) => model.predict(features),
			Estimator::LogisticRegression(model) => model.predict(features),
		}
	}
}

impl Model {
	pub fn new(params: Params, feature_names: Vec<String>, estimator: Estimator) -> Model {
		Model {
			id: Id::new(),
			params,
			feature_names,
			estimator,
		}
	}

	pub fn family(&self) -> ModelFamily {
		self.estimator.family()
	}

	pub fn n_features(&self) -> usize {
		self.feature_names.len()
	}

	/// Predict the class of each row of `features`, which must have one column per feature.
	pub fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<usize>> {
		self.check_shape(features)?;
		Ok(self.estimator.predict(features))
	}

	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		self.check_shape(features)?;
		Ok(self.estimator.predict_proba(features))
	}

	fn check_shape(&self, features: ArrayView2<f32>) -> Result<()> {
		if features.ncols() != self.n_features() {
			bail!(
				"the model expects {} features but {} were given",
				self.n_features(),
				features.ncols()
			);
		}
		Ok(())
	}

	/// Deserialize a `Model` from a slice.
	pub fn from_slice(slice: &[u8]) -> Result<Model> {
		let (major_version, slice) = slice
			.split_first()
			.ok_or_else(|| format_err!("the model is empty"))?;
		if *major_version != MAJOR_VERSION {
			bail!("unknown major version {}", major_version);
		}
		let model: Model = rmp_serde::from_slice(slice)?;
		Ok(model)
	}

	/// Deserialize a `Model` by reading the file at `path`.
	pub fn from_path(path: &Path) -> Result<Model> {
		let file = std::fs::File::open(path)?;
		let mut reader = std::io::BufReader::new(file);
		let mut major_version = [0u8; 1];
		reader.read_exact(&mut major_version)?;
		let major_version = major_version[0];
		if major_version != MAJOR_VERSION {
			bail!("unknown major version {}", major_version);
		}
		let model: Model = rmp_serde::from_read(&mut reader)?;
		Ok(model)
	}

	/// Serialize this model into the model file format.
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		let mut bytes = vec![MAJOR_VERSION];
		rmp_serde::encode::write_named(&mut bytes, self)?;
		Ok(bytes)
	}

	/// Write this model to the file at `path`.
	pub fn to_file(&self, path: &Path) -> Result<()> {
		let file = std::fs::File::create(path)?;
		let mut writer = std::io::BufWriter::new(file);
		writer.write_all(&[MAJOR_VERSION])?;
		rmp_serde::encode::write_named(&mut writer, self)?;
		writer.flush()?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::grid::LogisticRegressionParams;
	use sepsis_linear::Solver;

	fn model() -> Model {
		let features = arr2(&[[0.0, 1.0], [1.0, 0.0], [0.2, 0.9], [0.9, 0.1]]);
		let labels = arr1(&[0, 1, 0, 1]);
		let params = Params::LogisticRegression(LogisticRegressionParams {
			c: 1.0,
			solver: Solver::Newton,
			max_iter: 200,
		});
		let estimator = Estimator::train(&params, features.view(), labels.view()).unwrap();
		Model::new(params, vec!["HR".to_owned(), "MAP".to_owned()], estimator)
	}

	#[test]
	fn test_model_file() {
		let model = model();
		let bytes = model.to_bytes().unwrap();
		assert_eq!(bytes[0], MAJOR_VERSION);
		assert_eq!(Model::from_slice(&bytes).unwrap(), model);
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bin");
		model.to_file(&path).unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), bytes);
		assert_eq!(Model::from_path(&path).unwrap(), model);
		let mut unknown_version = bytes;
		unknown_version[0] = 1;
		assert!(Model::from_slice(&unknown_version).is_err());
		assert!(Model::from_slice(&[]).is_err());
	}

	#[test]
	fn test_predict_checks_shape() {
		let model = model();
		assert_eq!(model.family(), ModelFamily::LogisticRegression);
		let predictions = model
			.predict(arr2(&[[0.0, 1.0], [1.0, 0.0]]).view())
			.unwrap();
		assert_eq!(predictions, arr1(&[0, 1]));
		assert!(model.predict(arr2(&[[0.0, 1.0, 2.0]]).view()).is_err());
	}
}
