use crate::{ObjectStore, ObjectUrl, Result, StorageError};
use url::Url;

/// An object store that speaks the Google Cloud Storage JSON API. Requests are authorized with a bearer token.
pub struct HttpObjectStore {
	client: reqwest::blocking::Client,
	endpoint: Url,
	token: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
	#[serde(default)]
	items: Vec<ListItem>,
	next_page_token: Option<String>,
}

#[derive(serde::Deserialize)]
struct ListItem {
	name: String,
}

impl HttpObjectStore {
	pub fn new(endpoint: &str, token: String) -> Result<HttpObjectStore> {
		let endpoint = Url::parse(endpoint).map_err(|error| {
			StorageError::Config(format!("invalid endpoint {:?}: {}", endpoint, error))
		})?;
		if endpoint.cannot_be_a_base() {
			return Err(StorageError::Config(format!(
				"invalid endpoint {:?}",
				endpoint.as_str()
			)));
		}
		Ok(HttpObjectStore {
			client: reqwest::blocking::Client::new(),
			endpoint,
			token,
		})
	}

	/// Create a store whose token is read from the environment variable `token_env`.
	pub fn from_env(endpoint: &str, token_env: &str) -> Result<HttpObjectStore> {
		let token = std::env::var(token_env).map_err(|_| {
			StorageError::Config(format!(
				"the environment variable {} must hold an access token",
				token_env
			))
		})?;
		HttpObjectStore::new(endpoint, token)
	}

	fn url(&self, segments: &[&str]) -> Url {
		let mut url = self.endpoint.clone();
		if let Ok(mut path_segments) = url.path_segments_mut() {
			path_segments.pop_if_empty().extend(segments);
		}
		url
	}

	/// `GET /storage/v1/b/<bucket>/o/<key>?alt=media`
	fn download_url(&self, url: &ObjectUrl) -> Url {
		let mut download_url = self.url(&[
			"storage",
			"v1",
			"b",
			url.bucket.as_str(),
			"o",
			url.key.as_str(),
		]);
		download_url.query_pairs_mut().append_pair("alt", "media");
		download_url
	}

	/// `POST /upload/storage/v1/b/<bucket>/o?uploadType=media&name=<key>`
	fn upload_url(&self, url: &ObjectUrl) -> Url {
		let mut upload_url =
			self.url(&["upload", "storage", "v1", "b", url.bucket.as_str(), "o"]);
		upload_url
			.query_pairs_mut()
			.append_pair("uploadType", "media")
			.append_pair("name", &url.key);
		upload_url
	}

	/// `GET /storage/v1/b/<bucket>/o?prefix=<key>&pageToken=<token>`
	fn list_url(&self, prefix: &ObjectUrl, page_token: Option<&str>) -> Url {
		let mut list_url = self.url(&["storage", "v1", "b", prefix.bucket.as_str(), "o"]);
		{
			let mut query = list_url.query_pairs_mut();
			query.append_pair("prefix", &prefix.key);
			if let Some(page_token) = page_token {
				query.append_pair("pageToken", page_token);
			}
		}
		list_url
	}
}

fn check_status(
	method: &'static str,
	url: &ObjectUrl,
	response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response> {
	let status = response.status();
	if status == reqwest::StatusCode::NOT_FOUND {
		return Err(StorageError::NotFound(url.to_string()));
	}
	if !status.is_success() {
		return Err(StorageError::Status {
			method,
			url: url.to_string(),
			status: status.as_u16(),
		});
	}
	Ok(response)
}

impl ObjectStore for HttpObjectStore {
	fn get(&self, url: &ObjectUrl) -> Result<Vec<u8>> {
		let response = self
			.client
			.get(self.download_url(url))
			.bearer_auth(&self.token)
			.send()?;
		let response = check_status("GET", url, response)?;
		Ok(response.bytes()?.to_vec())
	}

	fn put(&self, url: &ObjectUrl, data: &[u8]) -> Result<()> {
		let response = self
			.client
			.post(self.upload_url(url))
			.bearer_auth(&self.token)
			.header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
			.body(data.to_owned())
			.send()?;
		check_status("POST", url, response)?;
		tracing::debug!(%url, n_bytes = data.len(), "uploaded object");
		Ok(())
	}

	fn list(&self, prefix: &ObjectUrl) -> Result<Vec<String>> {
		let mut keys = Vec::new();
		let mut page_token: Option<String> = None;
		loop {
			let response = self
				.client
				.get(self.list_url(prefix, page_token.as_deref()))
				.bearer_auth(&self.token)
				.send()?;
			let response = check_status("GET", prefix, response)?;
			let page: ListResponse = serde_json::from_slice(&response.bytes()?)?;
			keys.extend(page.items.into_iter().map(|item| item.name));
			match page.next_page_token {
				Some(next_page_token) => page_token = Some(next_page_token),
				None => break,
			}
		}
		keys.sort();
		Ok(keys)
	}

	fn backend_type(&self) -> &'static str {
		"http"
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_request_urls() {
		let store =
			HttpObjectStore::new("https://storage.googleapis.com", "token".to_owned()).unwrap();
		let url = ObjectUrl::new("sepsis", "models/model-run-1-2/model.bin");
		assert_eq!(
			store.download_url(&url).as_str(),
			"https://storage.googleapis.com/storage/v1/b/sepsis/o/models%2Fmodel-run-1-2%2Fmodel.bin?alt=media"
		);
		assert_eq!(
			store.upload_url(&url).as_str(),
			"https://storage.googleapis.com/upload/storage/v1/b/sepsis/o?uploadType=media&name=models%2Fmodel-run-1-2%2Fmodel.bin"
		);
		assert_eq!(
			store
				.list_url(&ObjectUrl::new("sepsis", "models"), Some("abc"))
				.as_str(),
			"https://storage.googleapis.com/storage/v1/b/sepsis/o?prefix=models&pageToken=abc"
		);
	}

	#[test]
	fn test_list_response() {
		let page: ListResponse = serde_json::from_str(
			r#"{"kind":"storage#objects","items":[{"name":"models/a"}],"nextPageToken":"next"}"#,
		)
		.unwrap();
		assert_eq!(page.items[0].name, "models/a");
		assert_eq!(page.next_page_token.as_deref(), Some("next"));
		let page: ListResponse = serde_json::from_str(r#"{"kind":"storage#objects"}"#).unwrap();
		assert!(page.items.is_empty());
		assert!(page.next_page_token.is_none());
	}

	#[test]
	fn test_missing_token() {
		assert!(matches!(
			HttpObjectStore::from_env(
				"https://storage.googleapis.com",
				"SEPSIS_TEST_TOKEN_THAT_IS_NEVER_SET"
			),
			Err(StorageError::Config(_))
		));
	}
}
