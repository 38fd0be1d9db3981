use crate::{ObjectStore, ObjectUrl, Result, StorageError};
use std::path::{Path, PathBuf};

/// An object store backed by a local directory. The object `gs://bucket/key` lives at `<root>/bucket/key`.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
	root: PathBuf,
}

impl LocalObjectStore {
	pub fn new(root: impl Into<PathBuf>) -> LocalObjectStore {
		LocalObjectStore { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// The path of `url` under the root. Buckets and key segments that could leave the root, like `..`, are rejected.
	pub fn path(&self, url: &ObjectUrl) -> Result<PathBuf> {
		let invalid = |reason: &str| StorageError::InvalidUrl {
			url: url.to_string(),
			reason: reason.to_owned(),
		};
		if !is_plain_segment(&url.bucket) {
			return Err(invalid("the bucket must be a single path segment"));
		}
		let mut path = self.root.join(&url.bucket);
		for segment in url.key.split('/').filter(|segment| !segment.is_empty()) {
			if !is_plain_segment(segment) {
				return Err(invalid("the key must not contain . or .. segments"));
			}
			path.push(segment);
		}
		Ok(path)
	}
}

fn is_plain_segment(segment: &str) -> bool {
	!segment.is_empty()
		&& segment != "."
		&& segment != ".."
		&& !segment.contains('/')
		&& !segment.contains('\\')
}

impl ObjectStore for LocalObjectStore {
	fn get(&self, url: &ObjectUrl) -> Result<Vec<u8>> {
		let path = self.path(url)?;
		if !path.is_file() {
			return Err(StorageError::NotFound(url.to_string()));
		}
		Ok(std::fs::read(path)?)
	}

	fn put(&self, url: &ObjectUrl, data: &[u8]) -> Result<()> {
		let path = self.path(url)?;
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, data)?;
		Ok(())
	}

	fn list(&self, prefix: &ObjectUrl) -> Result<Vec<String>> {
		let bucket_dir = self.path(&ObjectUrl::new(prefix.bucket.as_str(), ""))?;
		let mut keys = Vec::new();
		if bucket_dir.is_dir() {
			collect_keys(&bucket_dir, "", &mut keys)?;
		}
		keys.retain(|key| key.starts_with(&prefix.key));
		keys.sort();
		Ok(keys)
	}

	fn backend_type(&self) -> &'static str {
		"local"
	}
}

fn collect_keys(dir: &Path, key_prefix: &str, keys: &mut Vec<String>) -> Result<()> {
	for entry in std::fs::read_dir(dir)? {
		let entry = entry?;
		let name = entry.file_name().to_string_lossy().into_owned();
		let key = format!("{}{}", key_prefix, name);
		if entry.file_type()?.is_dir() {
			collect_keys(&entry.path(), &format!("{}/", key), keys)?;
		} else {
			keys.push(key);
		}
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_local_object_store() {
		let dir = tempfile::tempdir().unwrap();
		let store = LocalObjectStore::new(dir.path());
		let url = ObjectUrl::parse("gs://bucket/models/model-run-20240101-000000/model.bin").unwrap();
		store.put(&url, b"model").unwrap();
		assert!(dir
			.path()
			.join("bucket/models/model-run-20240101-000000/model.bin")
			.is_file());
		assert_eq!(store.get(&url).unwrap(), b"model");
		store
			.put(&ObjectUrl::new("bucket", "splits/X_train.csv"), b"a\n1\n")
			.unwrap();
		assert_eq!(
			store.list(&ObjectUrl::new("bucket", "models")).unwrap(),
			vec!["models/model-run-20240101-000000/model.bin"]
		);
		assert_eq!(store.list(&ObjectUrl::new("bucket", "")).unwrap().len(), 2);
		assert!(store.list(&ObjectUrl::new("other", "")).unwrap().is_empty());
		assert!(matches!(
			store.get(&ObjectUrl::new("bucket", "missing.csv")),
			Err(StorageError::NotFound(_))
		));
	}

	#[test]
	fn test_keys_stay_under_root() {
		let dir = tempfile::tempdir().unwrap();
		let store = LocalObjectStore::new(dir.path().join("root"));
		assert_eq!(
			store.path(&ObjectUrl::new("bucket", "a//b.csv")).unwrap(),
			dir.path().join("root/bucket/a/b.csv")
		);
		for url in &[
			ObjectUrl::new("bucket", "../../escaped.txt"),
			ObjectUrl::new("bucket", "models/./model.bin"),
			ObjectUrl::new("bucket", "models\\..\\model.bin"),
			ObjectUrl::new("..", "escaped.txt"),
			ObjectUrl::new("", "escaped.txt"),
		] {
			assert!(
				matches!(store.put(url, b"data"), Err(StorageError::InvalidUrl { .. })),
				"{}",
				url
			);
			assert!(store.get(url).is_err(), "{}", url);
		}
		assert!(!dir.path().join("escaped.txt").exists());
		assert!(store.list(&ObjectUrl::new("..", "")).is_err());
	}

	#[test]
	fn test_upload_file() {
		let dir = tempfile::tempdir().unwrap();
		let local_path = dir.path().join("metrics.json");
		std::fs::write(&local_path, "{}").unwrap();
		let store = LocalObjectStore::new(dir.path().join("remote"));
		let url = ObjectUrl::new("bucket", "run/metrics.json");
		store.upload_file(&url, &local_path).unwrap();
		assert_eq!(store.get(&url).unwrap(), b"{}");
		assert!(store
			.upload_file(&url, &dir.path().join("missing.json"))
			.is_err());
	}
}
