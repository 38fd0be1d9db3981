/*!
This crate serves predictions from a trained sepsis model over http. The server answers two routes, both configurable:

- `GET <health route>` responds with `{"status": "The app is healthy"}`.
- `POST <predict route>` takes `{"data": [...]}`, either a single row of feature values or a list of rows, and responds with `{"predictions": [...]}`, one 0 or 1 per row.

The model is loaded once at startup, usually with [`load_latest_model`](fn.load_latest_model.html), and shared by every request.
*/

#![allow(clippy::tabs_in_doc_comments)]

use anyhow::Result;
use futures::FutureExt;
use hyper::{
	header,
	service::{make_service_fn, service_fn},
	Body, Method, Request, Response, StatusCode,
};
use sepsis_core::Model;
use std::{convert::Infallible, panic::AssertUnwindSafe, sync::Arc};
use tracing::{error, info};

mod load;
mod predict;

pub use self::load::{load_latest_model, MODELS_PREFIX};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HEALTH_ROUTE: &str = "/health";
pub const DEFAULT_PREDICT_ROUTE: &str = "/predict";

pub struct Options {
	pub host: std::net::IpAddr,
	pub port: u16,
	pub health_route: String,
	pub predict_route: String,
}

/// The state shared by every request. It is built once at startup and never mutated.
pub struct Context {
	pub model: Model,
	pub health_route: String,
	pub predict_route: String,
}

async fn handle(request: Request<Body>, context: Arc<Context>) -> Response<Body> {
	let method = request.method().clone();
	let path = request.uri().path().to_owned();
	let response = if path == context.health_route && method == Method::GET {
		json_response(
			StatusCode::OK,
			&serde_json::json!({ "status": "The app is healthy" }),
		)
	} else if path == context.predict_route && method == Method::POST {
		self::predict::post(&context, request).await
	} else {
		Response::builder()
			.status(StatusCode::NOT_FOUND)
			.body(Body::from("not found"))
			.unwrap()
	};
	info!(%method, %path, status = response.status().as_u16(), "request");
	response
}

pub(crate) fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Body> {
	Response::builder()
		.status(status)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(value.to_string()))
		.unwrap()
}

/// Serve `model` until the process is stopped.
pub fn run(options: Options, model: Model) -> Result<()> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(run_impl(options, model))
}

async fn run_impl(options: Options, model: Model) -> Result<()> {
	let context = Arc::new(Context {
		model,
		health_route: options.health_route,
		predict_route: options.predict_route,
	});
	let service = make_service_fn(|_| {
		let context = context.clone();
		async move {
			Ok::<_, Infallible>(service_fn(move |request| {
				let method = request.method().to_owned();
				let path = request.uri().path().to_owned();
				let context = context.clone();
				async move {
					let response = AssertUnwindSafe(handle(request, context))
						.catch_unwind()
						.await
						.unwrap_or_else(|_| {
							error!(%method, %path, "the request handler panicked");
							Response::builder()
								.status(StatusCode::INTERNAL_SERVER_ERROR)
								.body(Body::from("internal server error"))
								.unwrap()
						});
					Ok::<_, Infallible>(response)
				}
			}))
		}
	});
	let addr = std::net::SocketAddr::new(options.host, options.port);
	let listener = std::net::TcpListener::bind(&addr)?;
	info!(port = options.port, "serving");
	hyper::Server::from_tcp(listener)?.serve(service).await?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use ndarray::prelude::*;
	use sepsis_core::{
		grid::{LogisticRegressionParams, Params},
		model::Estimator,
	};
	use sepsis_linear::Solver;

	pub(crate) fn context() -> Arc<Context> {
		let params = Params::LogisticRegression(LogisticRegressionParams {
			c: 1.0,
			solver: Solver::Newton,
			max_iter: 200,
		});
		let features = arr2(&[[70.0, 36.6], [72.0, 36.8], [112.0, 38.9], [115.0, 39.1]]);
		let labels = arr1(&[0, 0, 1, 1]);
		let estimator = Estimator::train(&params, features.view(), labels.view()).unwrap();
		Arc::new(Context {
			model: Model::new(params, vec!["HR".to_owned(), "Temp".to_owned()], estimator),
			health_route: DEFAULT_HEALTH_ROUTE.to_owned(),
			predict_route: DEFAULT_PREDICT_ROUTE.to_owned(),
		})
	}

	pub(crate) async fn call(method: Method, path: &str, body: &str) -> (StatusCode, String) {
		let request = Request::builder()
			.method(method)
			.uri(path)
			.body(Body::from(body.to_owned()))
			.unwrap();
		let response = handle(request, context()).await;
		let status = response.status();
		let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
		(status, String::from_utf8(body.to_vec()).unwrap())
	}

	#[tokio::test]
	async fn test_health() {
		let (status, body) = call(Method::GET, "/health", "").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, r#"{"status":"The app is healthy"}"#);
	}

	#[tokio::test]
	async fn test_not_found() {
		let (status, _) = call(Method::GET, "/models", "").await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, _) = call(Method::GET, "/predict", "").await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}
}
