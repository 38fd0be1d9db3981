use crate::{json_response, Context};
use hyper::{body::to_bytes, Body, Request, Response, StatusCode};
use ndarray::prelude::*;
use serde_json::{json, Value};
use tracing::error;

const NO_PAYLOAD_MESSAGE: &str = "Invalid input, no JSON payload provided";
const MISSING_DATA_MESSAGE: &str = "Invalid input, 'data' field is missing";
const INVALID_SHAPE_MESSAGE: &str = "Invalid input shape";

#[derive(Debug, PartialEq)]
enum PredictError {
	NoPayload,
	MissingData,
	InvalidShape,
}

impl PredictError {
	fn message(&self) -> &'static str {
		match self {
			PredictError::NoPayload => NO_PAYLOAD_MESSAGE,
			PredictError::MissingData => MISSING_DATA_MESSAGE,
			PredictError::InvalidShape => INVALID_SHAPE_MESSAGE,
		}
	}
}

pub(crate) async fn post(context: &Context, mut request: Request<Body>) -> Response<Body> {
	let body = match to_bytes(request.body_mut()).await {
		Ok(body) => body,
		Err(_) => return bad_request(PredictError::NoPayload),
	};
	let features = match parse_features(&body, context.model.n_features()) {
		Ok(features) => features,
		Err(e) => return bad_request(e),
	};
	match context.model.predict(features.view()) {
		Ok(predictions) => json_response(
			StatusCode::OK,
			&json!({ "predictions": predictions.to_vec() }),
		),
		Err(e) => {
			error!(error = %e, "prediction failed");
			json_response(
				StatusCode::INTERNAL_SERVER_ERROR,
				&json!({ "error": e.to_string() }),
			)
		}
	}
}

fn bad_request(error: PredictError) -> Response<Body> {
	json_response(StatusCode::BAD_REQUEST, &json!({ "error": error.message() }))
}

/// Parse the `data` field of a request body into a matrix with one row per example. A flat list of numbers is a single row. An empty object counts as no payload and a null `data` counts as missing.
fn parse_features(body: &[u8], n_features: usize) -> Result<Array2<f32>, PredictError> {
	let payload: Value = serde_json::from_slice(body).map_err(|_| PredictError::NoPayload)?;
	let data = match &payload {
		Value::Object(object) if !object.is_empty() => match object.get("data") {
			None | Some(Value::Null) => return Err(PredictError::MissingData),
			Some(data) => data,
		},
		_ => return Err(PredictError::NoPayload),
	};
	let items = data.as_array().ok_or(PredictError::InvalidShape)?;
	let rows: Vec<Vec<f32>> = if items.iter().all(Value::is_array) && !items.is_empty() {
		items
			.iter()
			.map(parse_row)
			.collect::<Result<_, _>>()?
	} else {
		vec![parse_row(data)?]
	};
	if rows.iter().any(|row| row.len() != n_features) {
		return Err(PredictError::InvalidShape);
	}
	let values: Vec<f32> = rows.into_iter().flatten().collect();
	Array2::from_shape_vec((values.len() / n_features.max(1), n_features), values)
		.map_err(|_| PredictError::InvalidShape)
}

fn parse_row(row: &Value) -> Result<Vec<f32>, PredictError> {
	row.as_array()
		.ok_or(PredictError::InvalidShape)?
		.iter()
		.map(|value| {
			value
				.as_f64()
				.map(|value| value as f32)
				.ok_or(PredictError::InvalidShape)
		})
		.collect()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test::call;
	use hyper::Method;

	#[test]
	fn test_parse_features() {
		assert_eq!(
			parse_features(br#"{"data": [80, 37.2]}"#, 2).unwrap(),
			arr2(&[[80.0, 37.2]])
		);
		assert_eq!(
			parse_features(br#"{"data": [[80, 37.2], [120, 39]]}"#, 2).unwrap(),
			arr2(&[[80.0, 37.2], [120.0, 39.0]])
		);
		assert_eq!(parse_features(b"", 2), Err(PredictError::NoPayload));
		assert_eq!(parse_features(b"[1, 2]", 2), Err(PredictError::NoPayload));
		assert_eq!(parse_features(b"{}", 2), Err(PredictError::NoPayload));
		assert_eq!(
			parse_features(br#"{"data": null}"#, 2),
			Err(PredictError::MissingData)
		);
		assert_eq!(
			parse_features(br#"{"rows": [1, 2]}"#, 2),
			Err(PredictError::MissingData)
		);
		for body in &[
			r#"{"data": [1, 2, 3]}"#,
			r#"{"data": [[1, 2], [3]]}"#,
			r#"{"data": []}"#,
			r#"{"data": ["a", 2]}"#,
			r#"{"data": 4}"#,
		] {
			assert_eq!(
				parse_features(body.as_bytes(), 2),
				Err(PredictError::InvalidShape)
			);
		}
	}

	#[tokio::test]
	async fn test_predict() {
		let (status, body) = call(
			Method::POST,
			"/predict",
			r#"{"data": [[70, 36.5], [118, 39.2]]}"#,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, r#"{"predictions":[0,1]}"#);
		let (status, body) = call(Method::POST, "/predict", r#"{"data": [118, 39.2]}"#).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, r#"{"predictions":[1]}"#);
	}

	#[tokio::test]
	async fn test_predict_errors() {
		let (status, body) = call(Method::POST, "/predict", "").await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body, r#"{"error":"Invalid input, no JSON payload provided"}"#);
		let (status, body) = call(Method::POST, "/predict", "{}").await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body, r#"{"error":"Invalid input, no JSON payload provided"}"#);
		let (status, body) = call(Method::POST, "/predict", r#"{"data": null}"#).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body, r#"{"error":"Invalid input, 'data' field is missing"}"#);
		let (status, body) = call(Method::POST, "/predict", r#"{"rows": [1, 2]}"#).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body, r#"{"error":"Invalid input, 'data' field is missing"}"#);
		let (status, body) = call(Method::POST, "/predict", r#"{"data": [1, 2, 3]}"#).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body, r#"{"error":"Invalid input shape"}"#);
	}
}
