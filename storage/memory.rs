use crate::{ObjectStore, ObjectUrl, Result, StorageError};
use std::{
	collections::BTreeMap,
	sync::{Arc, RwLock},
};

/// An object store that keeps every object in memory. Clones share the same objects.
#[derive(Clone, Debug, Default)]
pub struct MemoryObjectStore {
	objects: Arc<RwLock<BTreeMap<ObjectUrlKey, Vec<u8>>>>,
}

type ObjectUrlKey = (String, String);

impl MemoryObjectStore {
	pub fn new() -> MemoryObjectStore {
		MemoryObjectStore::default()
	}

	/// All stored urls, in order.
	pub fn urls(&self) -> Result<Vec<ObjectUrl>> {
		Ok(self
			.objects
			.read()
			.map_err(|error| StorageError::Config(error.to_string()))?
			.keys()
			.map(|(bucket, key)| ObjectUrl::new(bucket.clone(), key.clone()))
			.collect())
	}
}

impl ObjectStore for MemoryObjectStore {
	fn get(&self, url: &ObjectUrl) -> Result<Vec<u8>> {
		self.objects
			.read()
			.map_err(|error| StorageError::Config(error.to_string()))?
			.get(&(url.bucket.clone(), url.key.clone()))
			.cloned()
			.ok_or_else(|| StorageError::NotFound(url.to_string()))
	}

	fn put(&self, url: &ObjectUrl, data: &[u8]) -> Result<()> {
		self.objects
			.write()
			.map_err(|error| StorageError::Config(error.to_string()))?
			.insert((url.bucket.clone(), url.key.clone()), data.to_owned());
		Ok(())
	}

	fn list(&self, prefix: &ObjectUrl) -> Result<Vec<String>> {
		Ok(self
			.objects
			.read()
			.map_err(|error| StorageError::Config(error.to_string()))?
			.keys()
			.filter(|(bucket, key)| *bucket == prefix.bucket && key.starts_with(&prefix.key))
			.map(|(_, key)| key.clone())
			.collect())
	}

	fn backend_type(&self) -> &'static str {
		"memory"
	}
}
