use std::sync::Arc;

use sel_service::SelectService;
use sel_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<SelectService>,
	/// Name attached to request spans for the lookup route.
	pub route_name: Arc<str>,
}
impl AppState {
	pub async fn new(config: sel_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let service = SelectService::new(config, db)?;

		for entry in service.registry.entries() {
			if let Err(err) = &entry.descriptor {
				tracing::warn!(
					query = %entry.short_name,
					key = %entry.key,
					error = %err,
					"Query descriptor is invalid. Lookups for it will fail."
				);
			}
		}

		if service.cfg.search.cache_ttl_minutes > 0 {
			match service.purge_expired_cache().await {
				Ok(purged) => tracing::info!(purged, "Expired lookup cache entries removed."),
				Err(err) => tracing::warn!(error = %err, "Lookup cache purge failed."),
			}
		}

		tracing::info!(queries = service.registry.len(), "Query registry loaded.");

		Ok(Self::with_service(service))
	}

	pub fn with_service(service: SelectService) -> Self {
		let route_name = Arc::from(service.cfg.http.route_name.as_str());

		Self { service: Arc::new(service), route_name }
	}
}
