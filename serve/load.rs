use anyhow::{format_err, Context, Result};
use sepsis_core::{publish::MODEL_FILE_NAME, Model};
use sepsis_storage::{latest_model_folder, ObjectStore, ObjectUrl};
use tracing::info;

/// Models are published under this prefix of the bucket.
pub const MODELS_PREFIX: &str = "models";

/// Load the most recent model in `bucket`. The most recent model is the one under the `models/model-run-<date>-<time>` folder with the greatest timestamp.
pub fn load_latest_model(store: &dyn ObjectStore, bucket: &str) -> Result<Model> {
	let prefix = ObjectUrl::new(bucket, MODELS_PREFIX);
	let keys = store
		.list(&prefix)
		.with_context(|| format!("failed to list the models in {}", prefix))?;
	let folder = latest_model_folder(keys.iter().map(String::as_str))
		.ok_or_else(|| format_err!("no model folder was found in {}", prefix))?;
	let url = ObjectUrl::new(
		bucket,
		format!("{}/{}/{}", MODELS_PREFIX, folder, MODEL_FILE_NAME),
	);
	let bytes = store
		.get(&url)
		.with_context(|| format!("failed to fetch the model from {}", url))?;
	let model = Model::from_slice(&bytes)
		.with_context(|| format!("failed to deserialize the model from {}", url))?;
	info!(%url, family = %model.family(), "loaded model");
	Ok(model)
}
