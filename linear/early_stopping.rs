/**
The `EarlyStoppingMonitor` keeps track of the training loss after each iteration. If `n_rounds` iterations pass without the loss decreasing by at least `tolerance`, `update()` returns `true` to indicate that training should stop.
*/
#[derive(Clone, Debug)]
pub struct EarlyStoppingMonitor {
	tolerance: f32,
	n_rounds: usize,
	previous_loss: Option<f32>,
	n_rounds_no_improve: usize,
}

impl EarlyStoppingMonitor {
	pub fn new(tolerance: f32, n_rounds: usize) -> Self {
		EarlyStoppingMonitor {
			tolerance,
			n_rounds,
			previous_loss: None,
			n_rounds_no_improve: 0,
		}
	}

	/// Update with the loss after the latest iteration. Returns true if training should stop.
	pub fn update(&mut self, loss: f32) -> bool {
		let result = if let Some(previous_loss) = self.previous_loss {
			if loss > previous_loss || f32::abs(loss - previous_loss) < self.tolerance {
				self.n_rounds_no_improve += 1;
				self.n_rounds_no_improve >= self.n_rounds
			} else {
				self.n_rounds_no_improve = 0;
				false
			}
		} else {
			false
		};
		self.previous_loss = Some(loss);
		result
	}
}

#[test]
fn test_early_stopping_monitor() {
	let mut monitor = EarlyStoppingMonitor::new(0.01, 2);
	assert!(!monitor.update(1.0));
	assert!(!monitor.update(0.5));
	assert!(!monitor.update(0.499));
	assert!(!monitor.update(0.3));
	assert!(!monitor.update(0.31));
	assert!(monitor.update(0.305));
}
