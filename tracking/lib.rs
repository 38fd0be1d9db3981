/*!
This crate records experiment runs. A run belongs to an experiment, has an optional name, and collects string parameters, scalar metrics, and named artifacts such as text reports and serialized models. Runs are recorded through the [`Tracker`](trait.Tracker.html) trait, which is implemented by [`FileTracker`](struct.FileTracker.html), writing one directory per run, and [`MemoryTracker`](struct.MemoryTracker.html), used in tests.

```
use sepsis_tracking::{MemoryTracker, RunStatus, Tracker};

let mut tracker = MemoryTracker::new("sepsis");
let run_id = tracker.start_run(Some("logistic_regression")).unwrap();
tracker.log_param(run_id, "c", "1").unwrap();
tracker.log_text(run_id, "confusion_matrix.txt", "[[4 2]\n [1 3]]").unwrap();
tracker.end_run(run_id, RunStatus::Finished).unwrap();
assert_eq!(tracker.get_run(run_id).unwrap().params["c"], "1");
```
*/

#![allow(clippy::tabs_in_doc_comments)]

use chrono::{DateTime, Utc};
use sepsis_util::id::Id;
use std::collections::BTreeMap;
use thiserror::Error;

mod file;
mod memory;

pub use self::file::FileTracker;
pub use self::memory::MemoryTracker;

pub type RunId = Id;

#[derive(Debug, Error)]
pub enum TrackingError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to serialize run: {0}")]
	Json(#[from] serde_json::Error),
	#[error("run {0} not found")]
	RunNotFound(RunId),
	#[error("run {0} has already ended")]
	RunNotActive(RunId),
	#[error("invalid artifact name {0:?}")]
	InvalidArtifactName(String),
}

pub type Result<T, E = TrackingError> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	Running,
	Finished,
	Failed,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Run {
	pub id: RunId,
	pub name: Option<String>,
	pub experiment: String,
	pub status: RunStatus,
	pub params: BTreeMap<String, String>,
	pub metrics: BTreeMap<String, f64>,
	/// The names of the artifacts logged to this run, in the order they were logged.
	pub artifacts: Vec<String>,
	pub start_time: DateTime<Utc>,
	pub end_time: Option<DateTime<Utc>>,
}

impl Run {
	pub fn new(experiment: &str, name: Option<&str>) -> Run {
		Run {
			id: Id::new(),
			name: name.map(ToOwned::to_owned),
			experiment: experiment.to_owned(),
			status: RunStatus::Running,
			params: BTreeMap::new(),
			metrics: BTreeMap::new(),
			artifacts: Vec::new(),
			start_time: Utc::now(),
			end_time: None,
		}
	}

	fn ensure_active(&self) -> Result<()> {
		if self.status == RunStatus::Running {
			Ok(())
		} else {
			Err(TrackingError::RunNotActive(self.id))
		}
	}

	fn add_artifact(&mut self, name: &str) {
		if !self.artifacts.iter().any(|artifact| artifact == name) {
			self.artifacts.push(name.to_owned());
		}
	}

	fn end(&mut self, status: RunStatus) {
		self.status = status;
		self.end_time = Some(Utc::now());
	}
}

/// An artifact name is a relative path made of plain segments, like `confusion_matrix.txt` or `random_forest/model.bin`.
pub fn validate_artifact_name(name: &str) -> Result<()> {
	let is_valid = !name.is_empty()
		&& name
			.split('/')
			.all(|segment| !segment.is_empty() && segment != "." && segment != "..")
		&& !name.contains('\\');
	if is_valid {
		Ok(())
	} else {
		Err(TrackingError::InvalidArtifactName(name.to_owned()))
	}
}

/**
A `Tracker` records runs. Every logging call must name a run returned by `start_run` that has not yet been passed to `end_run`.
*/
pub trait Tracker {
	fn start_run(&mut self, name: Option<&str>) -> Result<RunId>;

	fn log_param(&mut self, run_id: RunId, key: &str, value: &str) -> Result<()>;

	fn log_metrics(&mut self, run_id: RunId, metrics: &BTreeMap<String, f64>) -> Result<()>;

	/// Store `data` as the artifact `name` of the run.
	fn log_artifact(&mut self, run_id: RunId, name: &str, data: &[u8]) -> Result<()>;

	fn end_run(&mut self, run_id: RunId, status: RunStatus) -> Result<()>;

	fn get_run(&self, run_id: RunId) -> Result<Run>;

	fn log_params(&mut self, run_id: RunId, params: &BTreeMap<String, String>) -> Result<()> {
		for (key, value) in params.iter() {
			self.log_param(run_id, key, value)?;
		}
		Ok(())
	}

	fn log_text(&mut self, run_id: RunId, name: &str, content: &str) -> Result<()> {
		self.log_artifact(run_id, name, content.as_bytes())
	}

	/// The model is stored as the artifact `<name>/model.bin`.
	fn log_model(&mut self, run_id: RunId, model: &[u8], name: &str) -> Result<()> {
		self.log_artifact(run_id, &format!("{}/model.bin", name), model)
	}
}
