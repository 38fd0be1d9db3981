use anyhow::{Context, Result};
use sepsis_dataframe::DataFrame;
use sepsis_storage::{ObjectStore, ObjectUrl};
use tracing::info;

/// The urls of the four pre split datasets.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetUrls {
	pub x_train: ObjectUrl,
	pub x_test: ObjectUrl,
	pub y_train: ObjectUrl,
	pub y_test: ObjectUrl,
}

impl DatasetUrls {
	/// The datasets are stored as `gs://<bucket path>/X_train.csv`, `X_test.csv`, `y_train.csv`, and `y_test.csv`. The bucket path may be given with or without the `gs://` prefix.
	pub fn new(gcs_bucket_path: &str) -> Result<DatasetUrls> {
		let gcs_bucket_path = gcs_bucket_path
			.trim_start_matches("gs://")
			.trim_end_matches('/');
		let url = |name: &str| -> Result<ObjectUrl> {
			let url = format!("gs://{}/{}", gcs_bucket_path, name);
			ObjectUrl::parse(&url).with_context(|| format!("invalid dataset url {}", url))
		};
		Ok(DatasetUrls {
			x_train: url("X_train.csv")?,
			x_test: url("X_test.csv")?,
			y_train: url("y_train.csv")?,
			y_test: url("y_test.csv")?,
		})
	}
}

/// The four datasets, as loaded.
#[derive(Debug)]
pub struct Datasets {
	pub x_train: DataFrame,
	pub x_test: DataFrame,
	pub y_train: DataFrame,
	pub y_test: DataFrame,
}

/// Fetch and parse each dataset. Any failure aborts the load.
pub fn load_datasets(store: &dyn ObjectStore, urls: &DatasetUrls) -> Result<Datasets> {
	let load = |name: &str, url: &ObjectUrl| -> Result<DataFrame> {
		let bytes = store
			.get(url)
			.with_context(|| format!("failed to fetch {} from {}", name, url))?;
		let dataframe = DataFrame::from_bytes(&bytes)
			.with_context(|| format!("failed to parse {} from {}", name, url))?;
		info!(
			dataset = name,
			%url,
			n_rows = dataframe.nrows(),
			n_columns = dataframe.ncols(),
			"loaded dataset"
		);
		Ok(dataframe)
	};
	Ok(Datasets {
		x_train: load("X_train", &urls.x_train)?,
		x_test: load("X_test", &urls.x_test)?,
		y_train: load("y_train", &urls.y_train)?,
		y_test: load("y_test", &urls.y_test)?,
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use sepsis_storage::MemoryObjectStore;

	#[test]
	fn test_dataset_urls() {
		let urls = DatasetUrls::new("sepsis-data/splits").unwrap();
		assert_eq!(urls.x_train.to_string(), "gs://sepsis-data/splits/X_train.csv");
		assert_eq!(urls.y_test.key, "splits/y_test.csv");
		assert_eq!(
			DatasetUrls::new("gs://sepsis-data/splits/").unwrap(),
			urls
		);
	}

	#[test]
	fn test_load_datasets() {
		let store = MemoryObjectStore::new();
		let urls = DatasetUrls::new("bucket").unwrap();
		store.put(&urls.x_train, b"HR,MAP\n80,4.2\n90,4.4\n").unwrap();
		store.put(&urls.x_test, b"HR,MAP\n70,4.1\n").unwrap();
		store.put(&urls.y_train, b"SepsisLabel\n0\n1\n").unwrap();
		assert!(load_datasets(&store, &urls).is_err());
		store.put(&urls.y_test, b"SepsisLabel\n0\n").unwrap();
		let datasets = load_datasets(&store, &urls).unwrap();
		assert_eq!(datasets.x_train.nrows(), 2);
		assert_eq!(datasets.x_test.column_names(), vec!["HR", "MAP"]);
		assert_eq!(datasets.y_test.nrows(), 1);
	}
}
