//! In-process backends for embedding the service without Postgres, and for tests.

use std::{
	cmp::Ordering,
	collections::HashMap,
	sync::{
		Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering},
	},
};

use color_eyre::eyre;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use sel_domain::{Direction, LookupPlan, ResultItem};

use crate::{BoxFuture, ResultCache, RowSource};

pub type Row = Map<String, Value>;

/// Tables of JSON rows evaluated with the same semantics as the SQL backend.
#[derive(Debug, Default)]
pub struct MemoryRowSource {
	tables: HashMap<String, Vec<Row>>,
	calls: AtomicUsize,
	failing: AtomicBool,
}
impl MemoryRowSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a table; every element of `rows` must be a JSON object.
	pub fn with_table(mut self, name: &str, rows: Vec<Value>) -> Self {
		let rows = rows
			.into_iter()
			.filter_map(|row| match row {
				Value::Object(map) => Some(map),
				_ => None,
			})
			.collect();

		self.tables.insert(name.to_string(), rows);

		self
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, AtomicOrdering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(AtomicOrdering::SeqCst)
	}

	fn evaluate(&self, plan: &LookupPlan<'_>) -> color_eyre::Result<Vec<ResultItem>> {
		self.calls.fetch_add(1, AtomicOrdering::SeqCst);

		if self.failing.load(AtomicOrdering::SeqCst) {
			return Err(eyre::eyre!("Row source for {} is unavailable.", plan.table));
		}

		let rows = self
			.tables
			.get(plan.table)
			.ok_or_else(|| eyre::eyre!("relation \"{}\" does not exist", plan.table))?;
		let mut matched = rows.iter().filter(|row| plan.admits(row)).collect::<Vec<_>>();

		matched.sort_by(|a, b| {
			for term in plan.order_by {
				let ordering = compare_columns(a.get(&term.field), b.get(&term.field));
				let ordering = match term.direction {
					Direction::Asc => ordering,
					Direction::Desc => ordering.reverse(),
				};

				if ordering != Ordering::Equal {
					return ordering;
				}
			}

			Ordering::Equal
		});

		Ok(matched.into_iter().take(plan.limit as usize).map(|row| plan.project(row)).collect())
	}
}

impl RowSource for MemoryRowSource {
	fn fetch<'a>(
		&'a self,
		plan: &'a LookupPlan<'a>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ResultItem>>> {
		Box::pin(async move { self.evaluate(plan) })
	}
}

#[derive(Debug, Default)]
pub struct MemoryCache {
	entries: Mutex<HashMap<String, (Value, OffsetDateTime)>>,
	gets: AtomicUsize,
	puts: AtomicUsize,
	failing: AtomicBool,
}
impl MemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, AtomicOrdering::SeqCst);
	}

	pub fn gets(&self) -> usize {
		self.gets.load(AtomicOrdering::SeqCst)
	}

	pub fn puts(&self) -> usize {
		self.puts.load(AtomicOrdering::SeqCst)
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Moves every entry's expiry into the past.
	pub fn expire_all(&self) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		for (_, expires_at) in entries.values_mut() {
			*expires_at = OffsetDateTime::UNIX_EPOCH;
		}
	}

	fn check(&self) -> color_eyre::Result<()> {
		if self.failing.load(AtomicOrdering::SeqCst) {
			return Err(eyre::eyre!("Result cache is unavailable."));
		}

		Ok(())
	}
}

impl ResultCache for MemoryCache {
	fn get<'a>(
		&'a self,
		key: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<Option<Value>>> {
		Box::pin(async move {
			self.gets.fetch_add(1, AtomicOrdering::SeqCst);
			self.check()?;

			let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

			Ok(entries
				.get(key)
				.filter(|(_, expires_at)| *expires_at > now)
				.map(|(payload, _)| payload.clone()))
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		_query_name: &'a str,
		payload: &'a Value,
		_now: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			self.puts.fetch_add(1, AtomicOrdering::SeqCst);
			self.check()?;
			self.entries
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.insert(key.to_string(), (payload.clone(), expires_at));

			Ok(())
		})
	}

	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, color_eyre::Result<u64>> {
		Box::pin(async move {
			self.check()?;

			let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
			let before = entries.len();

			entries.retain(|_, (_, expires_at)| *expires_at > now);

			Ok((before - entries.len()) as u64)
		})
	}
}

// Nulls sort after every value, as Postgres does for ascending order.
fn compare_columns(a: Option<&Value>, b: Option<&Value>) -> Ordering {
	let a = a.filter(|value| !value.is_null());
	let b = b.filter(|value| !value.is_null());

	match (a, b) {
		(None, None) => Ordering::Equal,
		(None, Some(_)) => Ordering::Greater,
		(Some(_), None) => Ordering::Less,
		(Some(a), Some(b)) => compare_values(a, b),
	}
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
	match (a, b) {
		(Value::Number(a), Value::Number(b)) => a
			.as_f64()
			.zip(b.as_f64())
			.and_then(|(a, b)| a.partial_cmp(&b))
			.unwrap_or(Ordering::Equal),
		(Value::String(a), Value::String(b)) => a.cmp(b),
		(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
		_ => a.to_string().cmp(&b.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::memory::compare_columns;

	#[test]
	fn nulls_sort_last() {
		let mut values = vec![json!(null), json!(3), json!(1)];

		values.sort_by(|a, b| compare_columns(Some(a), Some(b)));

		assert_eq!(values, vec![json!(1), json!(3), json!(null)]);
	}
}
