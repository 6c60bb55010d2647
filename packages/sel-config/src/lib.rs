mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Http, OrderTerm, Postgres, QueryConfig, Search, Service, Storage};

use std::{env, fs, path::Path};

pub const ENV_SEARCH_URL: &str = "SELECT2_SEARCH_URL";
pub const ENV_SEARCH_ROUTE_NAME: &str = "SELECT2_SEARCH_ROUTE_NAME";
pub const ENV_RESULT_LIMIT: &str = "SELECT2_RESULT_LIMIT";
/// Ten years.
pub const MAX_CACHE_TTL_MINUTES: i64 = 10 * 365 * 24 * 60;

const KNOWN_MIDDLEWARE: [&str; 2] = ["trace", "cors"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg = parse(path, &raw)?;

	apply_env_overrides(&mut cfg, |name| env::var(name).ok())?;
	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn parse(path: &Path, raw: &str) -> Result<Config> {
	toml::from_str(raw).map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })
}

/// Applies the `SELECT2_*` environment overrides. The lookup is injected so callers can supply
/// values without touching the process environment.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	if let Some(search_url) = lookup(ENV_SEARCH_URL) {
		cfg.http.search_url = search_url;
	}
	if let Some(route_name) = lookup(ENV_SEARCH_ROUTE_NAME) {
		cfg.http.route_name = route_name;
	}
	if let Some(limit) = lookup(ENV_RESULT_LIMIT) {
		cfg.search.result_limit = limit.trim().parse().map_err(|_| Error::EnvOverride {
			name: ENV_RESULT_LIMIT.to_string(),
			message: format!("expected a non-negative integer, got {limit:?}."),
		})?;
	}

	Ok(())
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.http.route_name.trim().is_empty() {
		return Err(Error::Validation {
			message: "http.route_name must be non-empty.".to_string(),
		});
	}

	for name in &cfg.http.middleware {
		if !KNOWN_MIDDLEWARE.contains(&name.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"http.middleware entry {name:?} is not supported; expected one of {}.",
					KNOWN_MIDDLEWARE.join(", ")
				),
			});
		}
	}

	if cfg.search.result_limit == 0 {
		return Err(Error::Validation {
			message: "search.result_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.cache_ttl_minutes < 0 {
		return Err(Error::Validation {
			message: "search.cache_ttl_minutes must be zero or greater.".to_string(),
		});
	}
	if cfg.search.cache_ttl_minutes > MAX_CACHE_TTL_MINUTES {
		return Err(Error::Validation {
			message: format!("search.cache_ttl_minutes must be at most {MAX_CACHE_TTL_MINUTES}."),
		});
	}

	if let Some(max) = cfg.search.cache_max_payload_bytes
		&& max == 0
	{
		return Err(Error::Validation {
			message: "search.cache_max_payload_bytes must be greater than zero.".to_string(),
		});
	}

	for key in cfg.query.keys() {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: "query keys must be non-empty.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.http.search_url = cfg.http.search_url.trim().to_string();
	cfg.http.route_name = cfg.http.route_name.trim().to_string();

	for name in cfg.http.middleware.iter_mut() {
		*name = name.trim().to_ascii_lowercase();
	}

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
