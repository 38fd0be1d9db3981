use crate::{validate_artifact_name, Result, Run, RunId, RunStatus, Tracker, TrackingError};
use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};
use tracing::debug;

/**
A tracker that writes each run to its own directory:

```text
<dir>/<experiment>/<run id>/run.json
<dir>/<experiment>/<run id>/artifacts/<artifact name>
```

`run.json` is rewritten after every call, so the directory always reflects the latest state of the run.
*/
#[derive(Debug)]
pub struct FileTracker {
	experiment_dir: PathBuf,
	experiment: String,
}

impl FileTracker {
	pub fn new(dir: impl AsRef<Path>, experiment: &str) -> Result<FileTracker> {
		let experiment_dir = dir.as_ref().join(experiment);
		std::fs::create_dir_all(&experiment_dir)?;
		Ok(FileTracker {
			experiment_dir,
			experiment: experiment.to_owned(),
		})
	}

	pub fn run_dir(&self, run_id: RunId) -> PathBuf {
		self.experiment_dir.join(run_id.to_string())
	}

	fn run_path(&self, run_id: RunId) -> PathBuf {
		self.run_dir(run_id).join("run.json")
	}

	fn read_run(&self, run_id: RunId) -> Result<Run> {
		let path = self.run_path(run_id);
		if !path.is_file() {
			return Err(TrackingError::RunNotFound(run_id));
		}
		let data = std::fs::read(path)?;
		Ok(serde_json::from_slice(&data)?)
	}

	fn write_run(&self, run: &Run) -> Result<()> {
		let data = serde_json::to_vec_pretty(run)?;
		std::fs::write(self.run_path(run.id), data)?;
		Ok(())
	}

	/// Apply `f` to an active run and persist the result.
	fn update_run(&self, run_id: RunId, f: impl FnOnce(&mut Run)) -> Result<()> {
		let mut run = self.read_run(run_id)?;
		run.ensure_active()?;
		f(&mut run);
		self.write_run(&run)
	}

	/// List all runs of the experiment, ordered by start time.
	pub fn list_runs(&self) -> Result<Vec<Run>> {
		let mut runs = Vec::new();
		for entry in std::fs::read_dir(&self.experiment_dir)? {
			let entry = entry?;
			let path = entry.path().join("run.json");
			if path.is_file() {
				let data = std::fs::read(path)?;
				runs.push(serde_json::from_slice::<Run>(&data)?);
			}
		}
		runs.sort_by_key(|run| run.start_time);
		Ok(runs)
	}
}

impl Tracker for FileTracker {
	fn start_run(&mut self, name: Option<&str>) -> Result<RunId> {
		let run = Run::new(&self.experiment, name);
		std::fs::create_dir_all(self.run_dir(run.id).join("artifacts"))?;
		self.write_run(&run)?;
		debug!(run_id = %run.id, name = ?run.name, "started run");
		Ok(run.id)
	}

	fn log_param(&mut self, run_id: RunId, key: &str, value: &str) -> Result<()> {
		self.update_run(run_id, |run| {
			run.params.insert(key.to_owned(), value.to_owned());
		})
	}

	fn log_params(&mut self, run_id: RunId, params: &BTreeMap<String, String>) -> Result<()> {
		self.update_run(run_id, |run| {
			run.params
				.extend(params.iter().map(|(key, value)| (key.clone(), value.clone())));
		})
	}

	fn log_metrics(&mut self, run_id: RunId, metrics: &BTreeMap<String, f64>) -> Result<()> {
		self.update_run(run_id, |run| {
			run.metrics
				.extend(metrics.iter().map(|(key, value)| (key.clone(), *value)));
		})
	}

	fn log_artifact(&mut self, run_id: RunId, name: &str, data: &[u8]) -> Result<()> {
		validate_artifact_name(name)?;
		let mut run = self.read_run(run_id)?;
		run.ensure_active()?;
		let path = self.run_dir(run_id).join("artifacts").join(name);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&path, data)?;
		run.add_artifact(name);
		self.write_run(&run)
	}

	fn end_run(&mut self, run_id: RunId, status: RunStatus) -> Result<()> {
		self.update_run(run_id, |run| run.end(status))?;
		debug!(run_id = %run_id, ?status, "ended run");
		Ok(())
	}

	fn get_run(&self, run_id: RunId) -> Result<Run> {
		self.read_run(run_id)
	}
}
