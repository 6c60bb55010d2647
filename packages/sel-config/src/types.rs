use std::{collections::BTreeMap, fmt};

use serde::{
	Deserialize, Deserializer,
	de::{MapAccess, Visitor},
};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub http: Http,
	#[serde(default)]
	pub search: Search,
	/// Registry keys are fully-qualified names such as `App\Models\User`; clients address an
	/// entry by its last path segment.
	#[serde(default)]
	pub query: BTreeMap<String, QueryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Http {
	pub search_url: String,
	pub route_name: String,
	pub middleware: Vec<String>,
}
impl Http {
	/// Mounted path of the search endpoint, always under `/api`.
	pub fn search_path(&self) -> String {
		let trimmed = self.search_url.trim().trim_matches('/');

		if trimmed.is_empty() { "/api".to_string() } else { format!("/api/{trimmed}") }
	}
}
impl Default for Http {
	fn default() -> Self {
		Self {
			search_url: "/select2/search".to_string(),
			route_name: "select2.search".to_string(),
			middleware: vec!["trace".to_string()],
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub result_limit: u32,
	/// Zero disables result caching.
	pub cache_ttl_minutes: i64,
	pub cache_max_payload_bytes: Option<u64>,
	/// When set, a failing data source degrades to an empty result instead of an error.
	pub fail_soft: bool,
}
impl Search {
	pub fn cache_ttl_seconds(&self) -> i64 {
		self.cache_ttl_minutes.saturating_mul(60)
	}
}
impl Default for Search {
	fn default() -> Self {
		Self {
			result_limit: 10,
			cache_ttl_minutes: 0,
			cache_max_payload_bytes: None,
			fail_soft: true,
		}
	}
}

/// Raw registry entry. Content is checked when the entry is looked up, so every field stays
/// optional here.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct QueryConfig {
	pub table: Option<String>,
	pub id: Option<String>,
	pub text: Option<String>,
	pub searchable: Option<Vec<String>>,
	#[serde(default, deserialize_with = "deserialize_order_by")]
	pub order_by: Option<Vec<OrderTerm>>,
	#[serde(rename = "where")]
	pub filter: Option<Value>,
}
impl QueryConfig {
	pub fn is_empty(&self) -> bool {
		self == &Self::default()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
	pub field: String,
	pub direction: String,
}

fn default_log_level() -> String {
	"info".to_string()
}

// `order_by = { name = "asc", created_at = "desc" }` keeps document order.
fn deserialize_order_by<'de, D>(deserializer: D) -> Result<Option<Vec<OrderTerm>>, D::Error>
where
	D: Deserializer<'de>,
{
	struct OrderByVisitor;
	impl<'de> Visitor<'de> for OrderByVisitor {
		type Value = Vec<OrderTerm>;

		fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			f.write_str("a table of field = \"asc\" | \"desc\" pairs")
		}

		fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
		where
			A: MapAccess<'de>,
		{
			let mut terms = Vec::with_capacity(map.size_hint().unwrap_or(0));

			while let Some((field, direction)) = map.next_entry::<String, String>()? {
				terms.push(OrderTerm { field, direction });
			}

			Ok(terms)
		}
	}

	deserializer.deserialize_map(OrderByVisitor).map(Some)
}
