use std::backtrace::Backtrace;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use sel_domain::{LookupPlan, MAX_QUERY_NAME_CHARS, ResultItem};

use crate::{Error, Result, SelectService, cache};

pub const MAX_TERM_CHARS: usize = 50;

/// Select2 AJAX parameters: `q` is the typed term, `query` the logical data source name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
	#[serde(default)]
	pub q: Option<String>,
	#[serde(default)]
	pub query: Option<String>,
}
impl SearchRequest {
	pub fn validate(&self) -> Result<ValidatedSearch> {
		let term = blank_to_none(self.q.as_deref());

		if let Some(term) = term
			&& term.chars().count() > MAX_TERM_CHARS
		{
			return Err(Error::Validation {
				field: "q",
				message: format!("The q field must not be greater than {MAX_TERM_CHARS} characters."),
			});
		}

		let Some(query) = blank_to_none(self.query.as_deref()) else {
			return Err(Error::Validation {
				field: "query",
				message: "The query field is required.".to_string(),
			});
		};

		if query.chars().count() > MAX_QUERY_NAME_CHARS {
			return Err(Error::Validation {
				field: "query",
				message: format!(
					"The query field must not be greater than {MAX_QUERY_NAME_CHARS} characters."
				),
			});
		}

		Ok(ValidatedSearch { term: term.map(str::to_string), query: query.to_string() })
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSearch {
	pub term: Option<String>,
	pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
	pub data: Vec<ResultItem>,
}

impl SelectService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let input = req.validate()?;
		let data = self.build_results(&input.query, input.term.as_deref()).await?;

		Ok(SearchResponse { data })
	}

	/// Resolves `query`, then returns at most `search.result_limit` items for `term`, served from
	/// the result cache when one is configured.
	pub async fn build_results(&self, query: &str, term: Option<&str>) -> Result<Vec<ResultItem>> {
		let descriptor = self.registry.resolve(query)?;
		let limit = self.cfg.search.result_limit;
		let plan = LookupPlan::build(descriptor, term, limit);
		let ttl = self.cfg.search.cache_ttl_seconds();

		if ttl <= 0 {
			return self.fetch_items(&plan).await.or_else(|err| self.degrade(query, &plan, err));
		}

		let key =
			cache::build_cache_key(query, descriptor, plan.search.map(|search| search.term), limit)?;
		let now = OffsetDateTime::now_utc();

		match self.backends.cache.get(&key, now).await {
			Ok(Some(payload)) => match serde_json::from_value::<Vec<ResultItem>>(payload) {
				Ok(items) => {
					tracing::debug!(
						query = %query,
						cache_key_prefix = cache::cache_key_prefix(&key),
						hits = items.len(),
						"Lookup cache hit."
					);

					return Ok(items);
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						query = %query,
						cache_key_prefix = cache::cache_key_prefix(&key),
						"Lookup cache payload decode failed. Recomputing."
					);
				},
			},
			Ok(None) => {
				tracing::debug!(
					query = %query,
					cache_key_prefix = cache::cache_key_prefix(&key),
					"Lookup cache miss."
				);
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					query = %query,
					cache_key_prefix = cache::cache_key_prefix(&key),
					"Lookup cache read failed. Treating as miss."
				);
			},
		}

		// Failed lookups are never cached.
		let items = match self.fetch_items(&plan).await {
			Ok(items) => items,
			Err(err) => return self.degrade(query, &plan, err),
		};

		match now.checked_add(Duration::seconds(ttl)) {
			Some(expires_at) => self.store_items(query, &key, &items, now, expires_at).await,
			None => tracing::warn!(
				query = %query,
				cache_ttl_seconds = ttl,
				"Lookup cache expiry is out of range. Skipping store."
			),
		}

		Ok(items)
	}

	async fn fetch_items(&self, plan: &LookupPlan<'_>) -> color_eyre::Result<Vec<ResultItem>> {
		let mut items = self.backends.rows.fetch(plan).await?;

		items.truncate(plan.limit as usize);

		Ok(items)
	}

	fn degrade(
		&self,
		query: &str,
		plan: &LookupPlan<'_>,
		err: color_eyre::Report,
	) -> Result<Vec<ResultItem>> {
		let backtrace = Backtrace::capture();

		tracing::error!(
			error = %err,
			query = %query,
			table = %plan.table,
			backtrace = %backtrace,
			"Lookup query failed."
		);

		if self.cfg.search.fail_soft {
			Ok(Vec::new())
		} else {
			Err(Error::QueryExecution { name: query.to_string(), message: err.to_string() })
		}
	}

	async fn store_items(
		&self,
		query: &str,
		key: &str,
		items: &[ResultItem],
		now: OffsetDateTime,
		expires_at: OffsetDateTime,
	) {
		let payload = match serde_json::to_value(items) {
			Ok(payload) => payload,
			Err(err) => {
				tracing::warn!(error = %err, query = %query, "Lookup cache payload encode failed.");

				return;
			},
		};

		if let Some(max) = self.cfg.search.cache_max_payload_bytes {
			let size = serde_json::to_vec(&payload).map(|raw| raw.len()).unwrap_or(usize::MAX);

			if size as u64 > max {
				tracing::debug!(
					query = %query,
					payload_size = size,
					max_payload_bytes = max,
					"Lookup cache payload too large. Skipping store."
				);

				return;
			}
		}

		if let Err(err) = self.backends.cache.put(key, query, &payload, now, expires_at).await {
			tracing::warn!(
				error = %err,
				query = %query,
				cache_key_prefix = cache::cache_key_prefix(key),
				"Lookup cache write failed."
			);
		}
	}
}

fn blank_to_none(raw: Option<&str>) -> Option<&str> {
	raw.map(str::trim).filter(|value| !value.is_empty())
}
