use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
	descriptor::{Descriptor, OrderTerm},
	predicate::{self, Predicate},
};

/// One Select2 option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
	pub id: Value,
	pub text: String,
}

/// Case-insensitive substring match of `term` against any of `fields`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSearch<'a> {
	pub term: &'a str,
	pub fields: &'a [String],
}
impl TextSearch<'_> {
	pub fn matches(&self, row: &Map<String, Value>) -> bool {
		let needle = self.term.to_lowercase();

		self.fields.iter().any(|field| {
			row.get(field)
				.and_then(predicate::row_text)
				.is_some_and(|text| text.to_lowercase().contains(&needle))
		})
	}
}

/// Backend-neutral description of a single lookup: projection, filters, ordering, and a limit
/// that the backend must enforce itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupPlan<'a> {
	pub table: &'a str,
	pub id_field: &'a str,
	pub text_field: &'a str,
	/// Extra columns needed to evaluate the search; the searchable fields.
	pub projection: Vec<&'a str>,
	pub filter: Option<&'a Predicate>,
	pub search: Option<TextSearch<'a>>,
	pub order_by: &'a [OrderTerm],
	pub limit: u32,
}
impl<'a> LookupPlan<'a> {
	pub fn build(descriptor: &'a Descriptor, term: Option<&'a str>, limit: u32) -> Self {
		let search = normalize_term(term)
			.map(|term| TextSearch { term, fields: descriptor.searchable.as_slice() });

		Self {
			table: descriptor.table.as_str(),
			id_field: descriptor.id_field.as_str(),
			text_field: descriptor.text_field.as_str(),
			projection: descriptor.searchable.iter().map(String::as_str).collect(),
			filter: descriptor.filter.as_ref(),
			search,
			order_by: descriptor.order_by.as_slice(),
			limit,
		}
	}

	/// Whether a raw row passes both the configured filter and the search term.
	pub fn admits(&self, row: &Map<String, Value>) -> bool {
		self.filter.is_none_or(|filter| filter.matches(row))
			&& self.search.is_none_or(|search| search.matches(row))
	}

	/// Projects a raw row into a result item; null labels become empty strings.
	pub fn project(&self, row: &Map<String, Value>) -> ResultItem {
		ResultItem {
			id: row.get(self.id_field).cloned().unwrap_or(Value::Null),
			text: row.get(self.text_field).and_then(predicate::row_text).unwrap_or_default(),
		}
	}
}

pub fn normalize_term(term: Option<&str>) -> Option<&str> {
	term.map(str::trim).filter(|term| !term.is_empty())
}
