pub mod cache;
pub mod memory;
pub mod search;

mod error;

pub use error::{Error, Result};
pub use search::{SearchRequest, SearchResponse, ValidatedSearch};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use time::OffsetDateTime;

use sel_config::Config;
use sel_domain::{LookupPlan, Registry, ResultItem};
use sel_storage::{cache as cache_store, db::Db, lookup};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes a lookup plan against a data source. Implementations must honor the plan's filter,
/// search, ordering and limit.
pub trait RowSource
where
	Self: Send + Sync,
{
	fn fetch<'a>(
		&'a self,
		plan: &'a LookupPlan<'a>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ResultItem>>>;
}

/// Key/value store for serialized lookup results with absolute expiry.
pub trait ResultCache
where
	Self: Send + Sync,
{
	fn get<'a>(
		&'a self,
		key: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<Option<Value>>>;

	fn put<'a>(
		&'a self,
		key: &'a str,
		query_name: &'a str,
		payload: &'a Value,
		now: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<()>>;

	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, color_eyre::Result<u64>>;
}

#[derive(Clone)]
pub struct Backends {
	pub rows: Arc<dyn RowSource>,
	pub cache: Arc<dyn ResultCache>,
}
impl Backends {
	pub fn new(rows: Arc<dyn RowSource>, cache: Arc<dyn ResultCache>) -> Self {
		Self { rows, cache }
	}

	pub fn postgres(db: Db) -> Self {
		let backend = Arc::new(PgBackend { db });

		Self { rows: backend.clone(), cache: backend }
	}
}

pub struct SelectService {
	pub cfg: Config,
	pub registry: Registry,
	pub backends: Backends,
}
impl SelectService {
	pub fn new(cfg: Config, db: Db) -> Result<Self> {
		Self::with_backends(cfg, Backends::postgres(db))
	}

	pub fn with_backends(cfg: Config, backends: Backends) -> Result<Self> {
		let registry = Registry::from_config(&cfg.query)
			.map_err(|err| Error::InvalidRegistry { message: err.to_string() })?;

		Ok(Self { cfg, registry, backends })
	}

	pub async fn purge_expired_cache(&self) -> Result<u64> {
		self.backends
			.cache
			.purge_expired(OffsetDateTime::now_utc())
			.await
			.map_err(|err| Error::Storage { message: err.to_string() })
	}
}

struct PgBackend {
	db: Db,
}

impl RowSource for PgBackend {
	fn fetch<'a>(
		&'a self,
		plan: &'a LookupPlan<'a>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ResultItem>>> {
		Box::pin(async move { Ok(lookup::fetch_items(&self.db.pool, plan).await?) })
	}
}

impl ResultCache for PgBackend {
	fn get<'a>(
		&'a self,
		key: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<Option<Value>>> {
		Box::pin(async move { Ok(cache_store::fetch_cache_payload(&self.db.pool, key, now).await?) })
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		query_name: &'a str,
		payload: &'a Value,
		now: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			cache_store::store_cache_payload(
				&self.db.pool,
				key,
				query_name,
				payload,
				now,
				expires_at,
			)
			.await?;

			Ok(())
		})
	}

	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, color_eyre::Result<u64>> {
		Box::pin(async move { Ok(cache_store::purge_expired(&self.db.pool, now).await?) })
	}
}
