use crate::{validate_artifact_name, Result, Run, RunId, RunStatus, Tracker, TrackingError};
use std::collections::BTreeMap;

/// A tracker that keeps runs and artifacts in memory.
#[derive(Debug, Default)]
pub struct MemoryTracker {
	experiment: String,
	runs: Vec<Run>,
	artifacts: BTreeMap<(RunId, String), Vec<u8>>,
}

impl MemoryTracker {
	pub fn new(experiment: &str) -> MemoryTracker {
		MemoryTracker {
			experiment: experiment.to_owned(),
			..Default::default()
		}
	}

	/// All runs in the order they were started.
	pub fn runs(&self) -> &[Run] {
		&self.runs
	}

	pub fn artifact(&self, run_id: RunId, name: &str) -> Option<&[u8]> {
		self.artifacts
			.get(&(run_id, name.to_owned()))
			.map(|data| data.as_slice())
	}

	fn active_run(&mut self, run_id: RunId) -> Result<&mut Run> {
		let run = self
			.runs
			.iter_mut()
			.find(|run| run.id == run_id)
			.ok_or(TrackingError::RunNotFound(run_id))?;
		run.ensure_active()?;
		Ok(run)
	}
}

impl Tracker for MemoryTracker {
	fn start_run(&mut self, name: Option<&str>) -> Result<RunId> {
		let run = Run::new(&self.experiment, name);
		let run_id = run.id;
		self.runs.push(run);
		Ok(run_id)
	}

	fn log_param(&mut self, run_id: RunId, key: &str, value: &str) -> Result<()> {
		self.active_run(run_id)?
			.params
			.insert(key.to_owned(), value.to_owned());
		Ok(())
	}

	fn log_metrics(&mut self, run_id: RunId, metrics: &BTreeMap<String, f64>) -> Result<()> {
		let run = self.active_run(run_id)?;
		for (key, value) in metrics.iter() {
			run.metrics.insert(key.clone(), *value);
		}
		Ok(())
	}

	fn log_artifact(&mut self, run_id: RunId, name: &str, data: &[u8]) -> Result<()> {
		validate_artifact_name(name)?;
		self.active_run(run_id)?.add_artifact(name);
		self.artifacts
			.insert((run_id, name.to_owned()), data.to_owned());
		Ok(())
	}

	fn end_run(&mut self, run_id: RunId, status: RunStatus) -> Result<()> {
		self.active_run(run_id)?.end(status);
		Ok(())
	}

	fn get_run(&self, run_id: RunId) -> Result<Run> {
		self.runs
			.iter()
			.find(|run| run.id == run_id)
			.cloned()
			.ok_or(TrackingError::RunNotFound(run_id))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_memory_tracker() {
		let mut tracker = MemoryTracker::new("sepsis");
		let first = tracker.start_run(None).unwrap();
		let second = tracker.start_run(Some("gradient_boosted_trees")).unwrap();
		tracker.log_param(second, "max_depth", "3").unwrap();
		tracker.log_model(second, b"model", "gradient_boosted_trees").unwrap();
		tracker.end_run(second, RunStatus::Finished).unwrap();
		tracker.end_run(first, RunStatus::Failed).unwrap();
		assert_eq!(
			tracker.artifact(second, "gradient_boosted_trees/model.bin"),
			Some(&b"model"[..])
		);
		assert_eq!(tracker.runs().len(), 2);
		assert_eq!(tracker.runs()[0].status, RunStatus::Failed);
		assert_eq!(tracker.runs()[1].params["max_depth"], "3");
		assert!(matches!(
			tracker.end_run(second, RunStatus::Finished),
			Err(TrackingError::RunNotActive(_))
		));
	}
}
