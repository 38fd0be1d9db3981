/*!
This crate reads and writes the blobs the pipeline exchanges with object storage: the four training datasets, the published model and metrics, and the model loaded by the server. Objects are addressed with `gs://<bucket>/<key>` urls, see [`ObjectUrl`](struct.ObjectUrl.html).

There are three implementations of [`ObjectStore`](trait.ObjectStore.html):

- [`LocalObjectStore`](struct.LocalObjectStore.html) maps `gs://bucket/key` to `<root>/bucket/key`.
- [`MemoryObjectStore`](struct.MemoryObjectStore.html) holds objects in a map and is used in tests.
- [`HttpObjectStore`](struct.HttpObjectStore.html) speaks the Google Cloud Storage JSON API.
*/

#![allow(clippy::tabs_in_doc_comments)]

use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod http;
mod local;
mod memory;

pub use self::http::HttpObjectStore;
pub use self::local::LocalObjectStore;
pub use self::memory::MemoryObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("object not found: {0}")]
	NotFound(String),
	#[error("invalid object url {url:?}: {reason}")]
	InvalidUrl { url: String, reason: String },
	#[error("configuration error: {0}")]
	Config(String),
	#[error("request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("{method} {url} returned status {status}")]
	Status {
		method: &'static str,
		url: String,
		status: u16,
	},
	#[error("failed to parse response: {0}")]
	Json(#[from] serde_json::Error),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// The location of an object, written `gs://<bucket>/<key>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectUrl {
	pub bucket: String,
	pub key: String,
}

impl ObjectUrl {
	pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> ObjectUrl {
		ObjectUrl {
			bucket: bucket.into(),
			key: key.into(),
		}
	}

	pub fn parse(s: &str) -> Result<ObjectUrl> {
		let invalid = |reason: &str| StorageError::InvalidUrl {
			url: s.to_owned(),
			reason: reason.to_owned(),
		};
		let url = url::Url::parse(s).map_err(|error| invalid(&error.to_string()))?;
		if url.scheme() != "gs" {
			return Err(invalid("the scheme must be gs"));
		}
		let bucket = url
			.host_str()
			.filter(|bucket| !bucket.is_empty())
			.ok_or_else(|| invalid("the bucket is missing"))?;
		let key = url.path().trim_start_matches('/');
		Ok(ObjectUrl::new(bucket, key))
	}

	/// Append a relative path to the key, inserting a `/` unless the key is empty or already ends with one.
	pub fn join(&self, relative_path: &str) -> ObjectUrl {
		let relative_path = relative_path.trim_start_matches('/');
		let key = if self.key.is_empty() || self.key.ends_with('/') {
			format!("{}{}", self.key, relative_path)
		} else {
			format!("{}/{}", self.key, relative_path)
		};
		ObjectUrl::new(self.bucket.clone(), key)
	}
}

impl std::fmt::Display for ObjectUrl {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "gs://{}/{}", self.bucket, self.key)
	}
}

impl std::str::FromStr for ObjectUrl {
	type Err = StorageError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ObjectUrl::parse(s)
	}
}

/// A blob store. Every call is a single blocking round trip.
pub trait ObjectStore: Send + Sync {
	fn get(&self, url: &ObjectUrl) -> Result<Vec<u8>>;

	fn put(&self, url: &ObjectUrl, data: &[u8]) -> Result<()>;

	/// List the keys of all objects in `prefix.bucket` whose key starts with `prefix.key`, in ascending order.
	fn list(&self, prefix: &ObjectUrl) -> Result<Vec<String>>;

	fn backend_type(&self) -> &'static str;

	fn upload_file(&self, url: &ObjectUrl, path: &Path) -> Result<()> {
		let data = std::fs::read(path)?;
		self.put(url, &data)
	}
}

/// The storage section of the configuration file. A `root` selects the local backend, an `endpoint` selects the http backend.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum StorageConfig {
	Local {
		root: PathBuf,
	},
	Http {
		endpoint: String,
		/// The name of the environment variable holding the bearer token.
		token_env: String,
	},
}

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

impl Default for StorageConfig {
	fn default() -> Self {
		StorageConfig::Http {
			endpoint: DEFAULT_ENDPOINT.to_owned(),
			token_env: DEFAULT_TOKEN_ENV.to_owned(),
		}
	}
}

/// Create the object store described by `config`.
pub fn open(config: &StorageConfig) -> Result<Box<dyn ObjectStore>> {
	let store: Box<dyn ObjectStore> = match config {
		StorageConfig::Local { root } => Box::new(LocalObjectStore::new(root.clone())),
		StorageConfig::Http {
			endpoint,
			token_env,
		} => Box::new(HttpObjectStore::from_env(endpoint, token_env)?),
	};
	tracing::debug!(backend = store.backend_type(), "opened object store");
	Ok(store)
}

/**
Find the most recent model folder among `keys`, which are object keys like `models/model-run-20240101-120000/model.bin`. A key takes part if it matches `model-run-(\d+)-(\d+)`: its timestamp is the two digit groups concatenated and its folder is its second path segment. The folder with the greatest timestamp is returned.
*/
pub fn latest_model_folder<'a>(keys: impl IntoIterator<Item = &'a str>) -> Option<String> {
	let pattern = Regex::new(r"model-run-(\d+)-(\d+)").ok()?;
	keys.into_iter()
		.filter_map(|key| {
			let captures = pattern.captures(key)?;
			let timestamp: u128 = format!("{}{}", &captures[1], &captures[2]).parse().ok()?;
			let folder = key.split('/').nth(1)?;
			Some((timestamp, folder))
		})
		.max_by_key(|(timestamp, _)| *timestamp)
		.map(|(_, folder)| folder.to_owned())
}
