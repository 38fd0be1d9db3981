use num_traits::Float;
use std::cmp::Ordering;
use thiserror::Error;

/// A float that is known not to be NaN or infinite, so it can be totally ordered and used as a `BTreeMap` key.
#[derive(Clone, Copy, Debug)]
pub struct Finite<T>(T)
where
	T: Float;

#[derive(Debug, Error)]
#[error("not finite")]
pub struct NotFiniteError;

impl<T> Finite<T>
where
	T: Float,
{
	pub fn new(value: T) -> Result<Self, NotFiniteError> {
		if value.is_finite() {
			Ok(Self(value))
		} else {
			Err(NotFiniteError)
		}
	}

	pub fn get(self) -> T {
		self.0
	}
}

impl<T> std::fmt::Display for Finite<T>
where
	T: Float + std::fmt::Display,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl<T> PartialEq for Finite<T>
where
	T: Float,
{
	fn eq(&self, other: &Self) -> bool {
		self.0.eq(&other.0)
	}
}

impl<T> Eq for Finite<T> where T: Float {}

impl<T> PartialOrd for Finite<T>
where
	T: Float,
{
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<T> Ord for Finite<T>
where
	T: Float,
{
	fn cmp(&self, other: &Self) -> Ordering {
		// Neither value can be NaN, so the comparison always succeeds.
		self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
	}
}

#[test]
fn test_finite() {
	assert!(Finite::new(f32::NAN).is_err());
	assert!(Finite::new(f32::INFINITY).is_err());
	let mut values: Vec<Finite<f32>> = [3.0, -1.0, 2.5]
		.iter()
		.map(|value| Finite::new(*value).unwrap())
		.collect();
	values.sort();
	let values: Vec<f32> = values.into_iter().map(|value| value.get()).collect();
	assert_eq!(values, vec![-1.0, 2.5, 3.0]);
}
