use std::any::Any;

use axum::{
	Form, Json, Router,
	body::Body,
	extract::{FromRequest, Query, Request, State},
	http::{Method, StatusCode, header::CONTENT_TYPE},
	response::{IntoResponse, Response},
	routing::get,
};
use serde::Serialize;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use sel_service::{Error as ServiceError, SearchRequest, SearchResponse};

use crate::state::AppState;

pub const GENERIC_ERROR: &str = "An error occurred while processing your request.";

pub fn router(state: AppState) -> Router {
	let search_path = state.service.cfg.http.search_path();
	let middleware = state.service.cfg.http.middleware.clone();
	let route_name = state.route_name.clone();
	let mut router = Router::new()
		.route("/health", get(health))
		.route(&search_path, get(search).post(search))
		.with_state(state);

	for name in &middleware {
		match name.as_str() {
			"trace" => {
				let route_name = route_name.clone();

				router = router.layer(TraceLayer::new_for_http().make_span_with(
					move |req: &Request<Body>| {
						tracing::info_span!(
							"http_request",
							route = %route_name,
							method = %req.method(),
							uri = %req.uri(),
						)
					},
				));
			},
			"cors" => router = router.layer(CorsLayer::permissive()),
			other => tracing::warn!(middleware = %other, "Unknown middleware ignored."),
		}
	}

	router.layer(CatchPanicLayer::custom(handle_panic))
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	SearchParams(payload): SearchParams,
) -> Result<Json<SearchResponse>, ApiError> {
	tracing::debug!(
		route = %state.route_name,
		query = payload.query.as_deref().unwrap_or_default(),
		"Lookup requested."
	);

	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

/// Select2 parameters from the query string, overlaid with a JSON or form body when present.
pub struct SearchParams(pub SearchRequest);

impl<S> FromRequest<S> for SearchParams
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let Query(mut params) = Query::<SearchRequest>::try_from_uri(req.uri())
			.map_err(|rejection| ApiError::malformed(rejection.body_text()))?;

		if req.method() == Method::GET {
			return Ok(Self(params));
		}

		let content_type = req
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
			.to_ascii_lowercase();
		let body = if content_type.starts_with("application/json") {
			let Json(body) = Json::<SearchRequest>::from_request(req, state)
				.await
				.map_err(|rejection| ApiError::malformed(rejection.body_text()))?;

			Some(body)
		} else if content_type.starts_with("application/x-www-form-urlencoded") {
			let Form(body) = Form::<SearchRequest>::from_request(req, state)
				.await
				.map_err(|rejection| ApiError::malformed(rejection.body_text()))?;

			Some(body)
		} else {
			None
		};

		if let Some(body) = body {
			if body.q.is_some() {
				params.q = body.q;
			}
			if body.query.is_some() {
				params.query = body.query;
			}
		}

		Ok(Self(params))
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(status: StatusCode, error: impl Into<String>, fields: Option<Vec<String>>) -> Self {
		Self { status, error: error.into(), fields }
	}

	fn malformed(detail: String) -> Self {
		Self::new(
			StatusCode::UNPROCESSABLE_ENTITY,
			format!("The request parameters are invalid: {detail}"),
			Some(Vec::new()),
		)
	}

	fn internal() -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR, None)
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::Validation { field, message } =>
				Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, Some(vec![field.to_string()])),
			ServiceError::UnknownQuery { .. } =>
				Self::new(StatusCode::BAD_REQUEST, err.to_string(), None),
			ServiceError::MissingDescriptor { .. } =>
				Self::new(StatusCode::NOT_FOUND, err.to_string(), None),
			ServiceError::MisconfiguredDescriptor { name, message } => {
				tracing::error!(query = %name, error = %message, "Query descriptor is misconfigured.");

				Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, None)
			},
			ServiceError::QueryExecution { .. }
			| ServiceError::InvalidRegistry { .. }
			| ServiceError::Storage { .. } => {
				tracing::error!(error = %err, "Lookup request failed.");

				Self::internal()
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error: self.error, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
	let detail = err
		.downcast_ref::<String>()
		.map(String::as_str)
		.or_else(|| err.downcast_ref::<&str>().copied())
		.unwrap_or("non-string panic payload");

	tracing::error!(panic = %detail, "Request handler panicked.");

	ApiError::internal().into_response()
}
