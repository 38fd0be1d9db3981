use super::StreamingMetric;
use num_traits::ToPrimitive;

/// The arithmetic mean of a stream of values, accumulated in f64.
#[derive(Debug, Default, Clone)]
pub struct Mean {
	n: u64,
	mean: f64,
}

impl Mean {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StreamingMetric<'_, '_> for Mean {
	type Input = f32;
	type Output = Option<f32>;

	fn update(&mut self, value: f32) {
		self.n += 1;
		let n = self.n.to_f64().unwrap();
		self.mean += (value as f64 - self.mean) / n;
	}

	fn merge(&mut self, other: Self) {
		let n = self.n + other.n;
		if n == 0 {
			return;
		}
		let n_a = self.n.to_f64().unwrap();
		let n_b = other.n.to_f64().unwrap();
		self.mean = (n_a * self.mean + n_b * other.mean) / (n_a + n_b);
		self.n = n;
	}

	fn finalize(self) -> Option<f32> {
		match self.n {
			0 => None,
			_ => self.mean.to_f32(),
		}
	}
}

#[test]
fn test_mean() {
	let mut a = Mean::new();
	a.update(1.0);
	a.update(2.0);
	let mut b = Mean::new();
	b.update(6.0);
	a.merge(b);
	assert_eq!(a.finalize(), Some(3.0));
	assert_eq!(Mean::new().finalize(), None);
}
