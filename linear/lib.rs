/*!
This crate implements L2 regularized logistic regression for binary classification. The model is trained with one of two solvers: full batch gradient descent, which stops early once the training loss stabilizes, or Newton's method (iteratively reweighted least squares).

Features are standardized with the training set means and standard deviations before fitting and the learned weights are mapped back to the original feature scale, so `predict_proba` takes raw features.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod early_stopping;
mod logistic_regression;

pub use self::early_stopping::EarlyStoppingMonitor;
pub use self::logistic_regression::LogisticRegression;

/// The optimization algorithm used to fit the weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
	GradientDescent,
	Newton,
}

impl std::fmt::Display for Solver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Solver::GradientDescent => write!(f, "gradient_descent"),
			Solver::Newton => write!(f, "newton"),
		}
	}
}

/// These are the options passed to `LogisticRegression::train`.
#[derive(Clone, Debug)]
pub struct TrainOptions {
	/// The inverse of the L2 regularization strength. Smaller values regularize more.
	pub c: f32,
	pub solver: Solver,
	/// The maximum number of iterations of the solver.
	pub max_iter: usize,
	/// The step size for the gradient descent solver.
	pub learning_rate: f32,
	/// Training stops when the loss changes by less than this for `n_rounds_no_improve` consecutive iterations.
	pub tolerance: f32,
	pub n_rounds_no_improve: usize,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			c: 1.0,
			solver: Solver::Newton,
			max_iter: 200,
			learning_rate: 0.5,
			tolerance: 1e-5,
			n_rounds_no_improve: 5,
		}
	}
}

#[derive(Debug, Error)]
pub enum TrainError {
	#[error("cannot train on an empty dataset")]
	Empty,
	#[error("there are {features} rows of features but {labels} labels")]
	LengthMismatch { features: usize, labels: usize },
	#[error("labels must be 0 or 1, found {0}")]
	InvalidLabel(usize),
	#[error("c must be positive, found {0}")]
	InvalidC(f32),
	#[error("the hessian is singular")]
	SingularHessian,
	#[error("the training loss diverged")]
	Diverged,
}
