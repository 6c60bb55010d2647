use std::fmt::{Display, Formatter};

use regex::Regex;
use serde::Serialize;

use sel_config::QueryConfig;

use crate::predicate::{Predicate, PredicateParseError};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
const TABLE_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	Asc,
	Desc,
}
impl Direction {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"asc" => Some(Self::Asc),
			"desc" => Some(Self::Desc),
			_ => None,
		}
	}

	pub fn as_sql(&self) -> &'static str {
		match self {
			Self::Asc => "ASC",
			Self::Desc => "DESC",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTerm {
	pub field: String,
	pub direction: Direction,
}

/// A validated data source: where rows come from and how they become `{id, text}` pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
	pub table: String,
	pub id_field: String,
	pub text_field: String,
	pub searchable: Vec<String>,
	/// Never empty; falls back to the text field ascending.
	pub order_by: Vec<OrderTerm>,
	pub filter: Option<Predicate>,
}
impl Descriptor {
	pub fn from_config(cfg: &QueryConfig) -> Result<Self, DescriptorError> {
		if cfg.is_empty() {
			return Err(DescriptorError::Empty);
		}

		let (Some(id_field), Some(text_field)) = (non_empty(&cfg.id), non_empty(&cfg.text)) else {
			return Err(DescriptorError::MissingIdOrText);
		};
		let searchable = match cfg.searchable.as_ref() {
			Some(fields)
				if !fields.is_empty() && fields.iter().all(|field| !field.trim().is_empty()) =>
				fields.iter().map(|field| field.trim().to_string()).collect::<Vec<_>>(),
			_ => return Err(DescriptorError::MissingSearchable),
		};
		let Some(table) = non_empty(&cfg.table) else {
			return Err(DescriptorError::MissingTable);
		};

		if !is_table_name(table) {
			return Err(DescriptorError::InvalidIdentifier {
				setting: "table",
				value: table.to_string(),
			});
		}

		for (setting, value) in [("id", id_field), ("text", text_field)] {
			if !is_identifier(value) {
				return Err(DescriptorError::InvalidIdentifier {
					setting,
					value: value.to_string(),
				});
			}
		}
		for field in &searchable {
			if !is_identifier(field) {
				return Err(DescriptorError::InvalidIdentifier {
					setting: "searchable",
					value: field.clone(),
				});
			}
		}

		let mut order_by = Vec::new();

		for term in cfg.order_by.iter().flatten() {
			let field = term.field.trim();

			if !is_identifier(field) {
				return Err(DescriptorError::InvalidIdentifier {
					setting: "order_by",
					value: term.field.clone(),
				});
			}

			let direction =
				Direction::parse(&term.direction).ok_or_else(|| DescriptorError::InvalidDirection {
					field: field.to_string(),
					direction: term.direction.clone(),
				})?;

			order_by.push(OrderTerm { field: field.to_string(), direction });
		}

		if order_by.is_empty() {
			order_by.push(OrderTerm { field: text_field.to_string(), direction: Direction::Asc });
		}

		let filter = cfg
			.filter
			.as_ref()
			.map(Predicate::parse)
			.transpose()
			.map_err(DescriptorError::InvalidPredicate)?;

		Ok(Self {
			table: table.to_string(),
			id_field: id_field.to_string(),
			text_field: text_field.to_string(),
			searchable,
			order_by,
			filter,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
	/// The registry key exists but carries no settings at all.
	Empty,
	MissingIdOrText,
	MissingSearchable,
	MissingTable,
	InvalidIdentifier { setting: &'static str, value: String },
	InvalidDirection { field: String, direction: String },
	InvalidPredicate(PredicateParseError),
}
impl DescriptorError {
	/// Client-facing message for the data source addressed as `query`.
	pub fn message(&self, query: &str) -> String {
		match self {
			Self::Empty => format!("Query configuration for {query} not found."),
			Self::MissingIdOrText =>
				format!("ID and text fields for {query} are not properly configured."),
			Self::MissingSearchable =>
				format!("Searchable fields for {query} are not properly configured."),
			Self::MissingTable => format!("Table for {query} is not properly configured."),
			Self::InvalidIdentifier { setting, value } =>
				format!("Query configuration for {query} has an invalid {setting} value {value:?}."),
			Self::InvalidDirection { field, direction } => format!(
				"Order direction for {query} field {field} must be asc or desc, got {direction:?}."
			),
			Self::InvalidPredicate(err) => format!("Filter for {query} is invalid: {err}"),
		}
	}
}
impl Display for DescriptorError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Empty => write!(f, "descriptor has no settings"),
			Self::MissingIdOrText => write!(f, "id and text must be non-empty"),
			Self::MissingSearchable => write!(f, "searchable must be a non-empty list"),
			Self::MissingTable => write!(f, "table must be non-empty"),
			Self::InvalidIdentifier { setting, value } =>
				write!(f, "{setting} value {value:?} is not a valid identifier"),
			Self::InvalidDirection { field, direction } =>
				write!(f, "order_by.{field} direction {direction:?} must be asc or desc"),
			Self::InvalidPredicate(err) => write!(f, "where {err}"),
		}
	}
}
impl std::error::Error for DescriptorError {}

pub fn is_identifier(value: &str) -> bool {
	Regex::new(IDENTIFIER_PATTERN).map(|re| re.is_match(value)).unwrap_or(false)
}

fn is_table_name(value: &str) -> bool {
	Regex::new(TABLE_PATTERN).map(|re| re.is_match(value)).unwrap_or(false)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
	value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
	use sel_config::{OrderTerm as RawOrderTerm, QueryConfig};

	use crate::descriptor::{Descriptor, DescriptorError, Direction, OrderTerm};

	fn users() -> QueryConfig {
		QueryConfig {
			table: Some("users".to_string()),
			id: Some("id".to_string()),
			text: Some("name".to_string()),
			searchable: Some(vec!["name".to_string(), "email".to_string()]),
			order_by: None,
			filter: None,
		}
	}

	#[test]
	fn defaults_order_to_text_ascending() {
		let descriptor = Descriptor::from_config(&users()).expect("valid descriptor");

		assert_eq!(
			descriptor.order_by,
			vec![OrderTerm { field: "name".to_string(), direction: Direction::Asc }]
		);
	}

	#[test]
	fn keeps_configured_order_and_parses_direction_case_insensitively() {
		let cfg = QueryConfig {
			order_by: Some(vec![
				RawOrderTerm { field: "name".to_string(), direction: "DESC".to_string() },
				RawOrderTerm { field: "id".to_string(), direction: "asc".to_string() },
			]),
			..users()
		};
		let descriptor = Descriptor::from_config(&cfg).expect("valid descriptor");

		assert_eq!(
			descriptor.order_by,
			vec![
				OrderTerm { field: "name".to_string(), direction: Direction::Desc },
				OrderTerm { field: "id".to_string(), direction: Direction::Asc },
			]
		);
	}

	#[test]
	fn rejects_missing_id_or_text() {
		let cfg = QueryConfig { id: Some("  ".to_string()), ..users() };

		assert_eq!(Descriptor::from_config(&cfg), Err(DescriptorError::MissingIdOrText));

		let cfg = QueryConfig { text: None, ..users() };

		assert_eq!(Descriptor::from_config(&cfg), Err(DescriptorError::MissingIdOrText));
	}

	#[test]
	fn rejects_empty_searchable() {
		let cfg = QueryConfig { searchable: Some(Vec::new()), ..users() };

		assert_eq!(Descriptor::from_config(&cfg), Err(DescriptorError::MissingSearchable));

		let cfg = QueryConfig { searchable: None, ..users() };

		assert_eq!(Descriptor::from_config(&cfg), Err(DescriptorError::MissingSearchable));
	}

	#[test]
	fn rejects_unsafe_identifiers() {
		let cfg = QueryConfig { text: Some("name\" --".to_string()), ..users() };

		assert!(matches!(
			Descriptor::from_config(&cfg),
			Err(DescriptorError::InvalidIdentifier { setting: "text", .. })
		));

		let cfg = QueryConfig { table: Some("public.users".to_string()), ..users() };

		assert!(Descriptor::from_config(&cfg).is_ok());
	}

	#[test]
	fn rejects_unknown_direction() {
		let cfg = QueryConfig {
			order_by: Some(vec![RawOrderTerm {
				field: "name".to_string(),
				direction: "sideways".to_string(),
			}]),
			..users()
		};

		assert!(matches!(
			Descriptor::from_config(&cfg),
			Err(DescriptorError::InvalidDirection { .. })
		));
	}

	#[test]
	fn empty_entry_is_distinct_from_misconfiguration() {
		assert_eq!(Descriptor::from_config(&QueryConfig::default()), Err(DescriptorError::Empty));
		assert_eq!(
			DescriptorError::MissingSearchable.message("User"),
			"Searchable fields for User are not properly configured."
		);
	}
}
