use std::{path::Path, sync::Arc};

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use sel_api::{routes, state::AppState};
use sel_domain::{LookupPlan, ResultItem};
use sel_service::{
	Backends, BoxFuture, RowSource, SelectService,
	memory::{MemoryCache, MemoryRowSource},
};
use sel_testkit::TestDatabase;

const CONFIG: &str = r#"
[service]
http_bind = "127.0.0.1:0"

[storage.postgres]
dsn = "postgres://localhost/unused"
pool_max_conns = 1

[query."App\\Models\\User"]
table = "users"
id = "id"
text = "name"
searchable = ["name", "email"]

[query."App\\Models\\Ghost"]

[query."App\\Models\\Broken"]
table = "broken"
text = "label"
searchable = ["label"]
"#;

struct PanickingRows;
impl RowSource for PanickingRows {
	fn fetch<'a>(
		&'a self,
		_plan: &'a LookupPlan<'a>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ResultItem>>> {
		panic!("row source exploded");
	}
}

fn users() -> MemoryRowSource {
	MemoryRowSource::new().with_table(
		"users",
		vec![
			json!({ "id": 1, "name": "Ann", "email": "ann@example.com" }),
			json!({ "id": 2, "name": "Bob", "email": "bob@example.com" }),
		],
	)
}

fn app_with(extra: &str, rows: Arc<dyn RowSource>) -> Router {
	let raw = format!("{extra}\n{CONFIG}");
	let mut cfg =
		sel_config::parse(Path::new("http.toml"), &raw).expect("Failed to parse test config.");

	sel_config::apply_env_overrides(&mut cfg, |_| None).expect("No overrides to apply.");
	sel_config::validate(&cfg).expect("Test config must be valid.");

	let service = SelectService::with_backends(cfg, Backends::new(rows, Arc::new(MemoryCache::new())))
		.expect("Failed to build service.");

	routes::router(AppState::with_service(service))
}

fn app() -> Router {
	app_with("", Arc::new(users()))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
	let response = app.oneshot(request).await.expect("Failed to call router.");
	let status = response.status();
	let bytes =
		body::to_bytes(response.into_body(), usize::MAX).await.expect("Failed to read body.");
	let value = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).expect("Response must be JSON.")
	};

	(status, value)
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).expect("Failed to build request.")
}

#[tokio::test]
async fn health_ok() {
	let (status, _) = send(app(), get("/health")).await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn get_returns_matching_items() {
	let (status, body) = send(app(), get("/api/select2/search?q=an&query=User")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({ "data": [{ "id": 1, "text": "Ann" }] }));
}

#[tokio::test]
async fn get_without_term_lists_ordered_items() {
	let (status, body) = send(app(), get("/api/select2/search?q=&query=User")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({ "data": [{ "id": 1, "text": "Ann" }, { "id": 2, "text": "Bob" }] }));
}

#[tokio::test]
async fn post_accepts_json_and_form_bodies() {
	let request = Request::builder()
		.method("POST")
		.uri("/api/select2/search")
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(json!({ "q": "bob", "query": "User" }).to_string()))
		.expect("Failed to build request.");
	let (status, body) = send(app(), request).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({ "data": [{ "id": 2, "text": "Bob" }] }));

	let request = Request::builder()
		.method("POST")
		.uri("/api/select2/search?query=User")
		.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
		.body(Body::from("q=ann"))
		.expect("Failed to build request.");
	let (status, body) = send(app(), request).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({ "data": [{ "id": 1, "text": "Ann" }] }));
}

#[tokio::test]
async fn unknown_query_is_a_bad_request() {
	let (status, body) = send(app(), get("/api/select2/search?query=doesnotexist")).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body, json!({ "error": "Invalid query type provided." }));
}

#[tokio::test]
async fn descriptor_problems_map_to_status_codes() {
	let (status, body) = send(app(), get("/api/select2/search?query=Ghost")).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body, json!({ "error": "Query configuration for Ghost not found." }));

	let (status, body) = send(app(), get("/api/select2/search?query=Broken")).await;

	assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(
		body,
		json!({ "error": "ID and text fields for Broken are not properly configured." })
	);
}

#[tokio::test]
async fn invalid_parameters_are_unprocessable() {
	let (status, body) = send(app(), get("/api/select2/search?q=an")).await;

	assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(body, json!({ "error": "The query field is required.", "fields": ["query"] }));

	let uri = format!("/api/select2/search?query=User&q={}", "x".repeat(51));
	let (status, body) = send(app(), get(&uri)).await;

	assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(body["fields"], json!(["q"]));

	let request = Request::builder()
		.method("POST")
		.uri("/api/select2/search")
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(r#"{"q": 5, "query": "User"}"#))
		.expect("Failed to build request.");
	let (status, body) = send(app(), request).await;

	assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(body["fields"], json!([]));
}

#[tokio::test]
async fn failing_source_returns_empty_data_by_default() {
	let rows = users();

	rows.set_failing(true);

	let (status, body) =
		send(app_with("", Arc::new(rows)), get("/api/select2/search?q=an&query=User")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({ "data": [] }));
}

#[tokio::test]
async fn failing_source_is_a_generic_error_without_fail_soft() {
	let rows = users();

	rows.set_failing(true);

	let app = app_with("[search]\nfail_soft = false\n", Arc::new(rows));
	let (status, body) = send(app, get("/api/select2/search?query=User")).await;

	assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(body, json!({ "error": routes::GENERIC_ERROR }));
}

#[tokio::test]
async fn panics_become_generic_errors() {
	let (status, body) =
		send(app_with("", Arc::new(PanickingRows)), get("/api/select2/search?query=User")).await;

	assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(body, json!({ "error": routes::GENERIC_ERROR }));
}

#[tokio::test]
async fn search_url_and_middleware_are_configurable() {
	let extra = "[http]\nsearch_url = \"/lookup/\"\nmiddleware = [\"trace\", \"cors\"]\n";
	let app = app_with(extra, Arc::new(users()));
	let request = Request::builder()
		.uri("/api/lookup?query=User")
		.header(header::ORIGIN, "https://example.com")
		.body(Body::empty())
		.expect("Failed to build request.");
	let response = app.clone().oneshot(request).await.expect("Failed to call router.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response
			.headers()
			.get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
			.and_then(|value| value.to_str().ok()),
		Some("*")
	);

	let (status, _) = send(app, get("/api/select2/search?query=User")).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_method_is_rejected() {
	let request = Request::builder()
		.method("PUT")
		.uri("/api/select2/search?query=User")
		.body(Body::empty())
		.expect("Failed to build request.");
	let (status, _) = send(app(), request).await;

	assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SEL_PG_DSN to run."]
async fn postgres_backed_lookup_end_to_end() {
	let Some(base_dsn) = sel_testkit::env_dsn() else {
		eprintln!("Skipping postgres_backed_lookup_end_to_end; set SEL_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let pool = sqlx::PgPool::connect(test_db.dsn()).await.expect("Failed to connect.");

	sqlx::query("CREATE TABLE users (id bigint PRIMARY KEY, name text, email text)")
		.execute(&pool)
		.await
		.expect("Failed to create users table.");
	sqlx::query(
		"INSERT INTO users (id, name, email) VALUES (1, 'Ann', 'ann@example.com'), (2, 'Bob', 'bob@example.com')",
	)
	.execute(&pool)
	.await
	.expect("Failed to seed users.");
	pool.close().await;

	let raw = CONFIG.replace("postgres://localhost/unused", test_db.dsn());
	let raw = format!("[search]\ncache_ttl_minutes = 5\n{raw}");
	let cfg = sel_config::parse(Path::new("http.toml"), &raw).expect("Failed to parse config.");
	let state = AppState::new(cfg).await.expect("Failed to build app state.");
	let app = routes::router(state);

	for _ in 0..2 {
		let (status, body) =
			send(app.clone(), get("/api/select2/search?q=an&query=User")).await;

		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, json!({ "data": [{ "id": 1, "text": "Ann" }] }));
	}

	drop(app);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
