use serde_json::Value;
use sqlx::{PgExecutor, Row};
use time::OffsetDateTime;

use crate::Result;

/// Returns the live payload stored under `key` and records the hit.
pub async fn fetch_cache_payload<'e, E>(
	executor: E,
	key: &str,
	now: OffsetDateTime,
) -> Result<Option<Value>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query(
		"UPDATE lookup_cache \
		 SET last_accessed_at = $1, hit_count = hit_count + 1 \
		 WHERE cache_key = $2 AND expires_at > $1 \
		 RETURNING payload",
	)
	.bind(now)
	.bind(key)
	.fetch_optional(executor)
	.await?;
	let Some(row) = row else {
		return Ok(None);
	};
	let payload: Value = row.try_get("payload")?;

	Ok(Some(payload))
}

pub async fn store_cache_payload<'e, E>(
	executor: E,
	key: &str,
	query_name: &str,
	payload: &Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"INSERT INTO lookup_cache \
		 (cache_key, query_name, payload, created_at, last_accessed_at, expires_at, hit_count) \
		 VALUES ($1, $2, $3, $4, $4, $5, 0) \
		 ON CONFLICT (cache_key) DO UPDATE SET \
		 query_name = EXCLUDED.query_name, \
		 payload = EXCLUDED.payload, \
		 created_at = EXCLUDED.created_at, \
		 last_accessed_at = EXCLUDED.last_accessed_at, \
		 expires_at = EXCLUDED.expires_at, \
		 hit_count = 0",
	)
	.bind(key)
	.bind(query_name)
	.bind(payload)
	.bind(now)
	.bind(expires_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Deletes every entry that expired at or before `now` and returns how many were removed.
pub async fn purge_expired<'e, E>(executor: E, now: OffsetDateTime) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM lookup_cache WHERE expires_at <= $1")
		.bind(now)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}
