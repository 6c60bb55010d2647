use serde_json::Value;

use sel_domain::Descriptor;

use crate::{Error, Result};

pub const CACHE_KIND: &str = "select2_lookup";
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Key for one cached lookup result. Any change to the descriptor yields a new key, so edited
/// configuration never serves stale rows.
pub fn build_cache_key(
	query: &str,
	descriptor: &Descriptor,
	term: Option<&str>,
	limit: u32,
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": CACHE_KIND,
		"schema_version": CACHE_SCHEMA_VERSION,
		"query": query,
		"descriptor": descriptor,
		"term": term,
		"limit": limit,
	});

	hash_cache_key(&payload)
}

pub(crate) fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}
