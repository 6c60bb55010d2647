use std::{
	cmp::Ordering,
	fmt::{Display, Formatter},
	mem,
};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::descriptor;

pub(crate) const MAX_PREDICATE_DEPTH: usize = 8;
pub(crate) const MAX_PREDICATE_NODES: usize = 64;
pub(crate) const MAX_IN_LIST_ITEMS: usize = 128;
pub(crate) const MAX_STRING_BYTES: usize = 512;

const ROOT_PATH: &str = "$.where";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateParseError {
	path: String,
	message: String,
}
impl PredicateParseError {
	fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self { path: path.into(), message: message.into() }
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}
impl Display for PredicateParseError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.path, self.message)
	}
}
impl std::error::Error for PredicateParseError {}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
	String(String),
	Number(f64),
	Bool(bool),
}
impl Scalar {
	fn parse(raw: &Value, path: &str) -> Result<Self, PredicateParseError> {
		match raw {
			Value::String(value) => {
				if value.len() > MAX_STRING_BYTES {
					return Err(PredicateParseError::new(
						path,
						format!("string values must be at most {MAX_STRING_BYTES} bytes."),
					));
				}

				Ok(Self::String(value.clone()))
			},
			Value::Number(value) => value
				.as_f64()
				.filter(|number| number.is_finite())
				.map(Self::Number)
				.ok_or_else(|| PredicateParseError::new(path, "number must be finite.")),
			Value::Bool(value) => Ok(Self::Bool(*value)),
			_ => Err(PredicateParseError::new(path, "value must be a string, number, or bool.")),
		}
	}

	fn to_value(&self) -> Value {
		match self {
			Self::String(value) => Value::String(value.clone()),
			Self::Number(value) => serde_json::json!(value),
			Self::Bool(value) => Value::Bool(*value),
		}
	}

	fn compare_row(&self, row_value: &Value) -> Option<Ordering> {
		match self {
			Self::String(value) => row_text(row_value).map(|text| text.as_str().cmp(value.as_str())),
			Self::Number(value) => row_value.as_f64().and_then(|number| number.partial_cmp(value)),
			Self::Bool(value) => row_value.as_bool().map(|flag| flag.cmp(value)),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
	Eq,
	Neq,
	Gt,
	Gte,
	Lt,
	Lte,
}
impl CompareOp {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Eq => "eq",
			Self::Neq => "neq",
			Self::Gt => "gt",
			Self::Gte => "gte",
			Self::Lt => "lt",
			Self::Lte => "lte",
		}
	}

	pub fn as_sql(&self) -> &'static str {
		match self {
			Self::Eq => "=",
			Self::Neq => "<>",
			Self::Gt => ">",
			Self::Gte => ">=",
			Self::Lt => "<",
			Self::Lte => "<=",
		}
	}

	fn is_ordering(&self) -> bool {
		!matches!(self, Self::Eq | Self::Neq)
	}

	fn accepts(&self, ordering: Ordering) -> bool {
		match self {
			Self::Eq => ordering == Ordering::Equal,
			Self::Neq => ordering != Ordering::Equal,
			Self::Gt => ordering == Ordering::Greater,
			Self::Gte => ordering != Ordering::Less,
			Self::Lt => ordering == Ordering::Less,
			Self::Lte => ordering != Ordering::Greater,
		}
	}
}

/// Row filter applied unconditionally to a data source, before any search term.
///
/// Null columns never satisfy a comparison, and negating one stays unsatisfied, mirroring SQL
/// three-valued logic; use `is_null` or `not_null` to test for them.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
	And(Vec<Predicate>),
	Or(Vec<Predicate>),
	Not(Box<Predicate>),
	Compare { field: String, op: CompareOp, value: Scalar },
	In { field: String, values: Vec<Scalar> },
	Contains { field: String, value: String },
	IsNull { field: String },
	NotNull { field: String },
}
impl Predicate {
	pub fn parse(raw: &Value) -> Result<Self, PredicateParseError> {
		let mut state = ParseState::default();

		parse_expr(raw, ROOT_PATH, 1, &mut state)
	}

	pub fn matches(&self, row: &Map<String, Value>) -> bool {
		self.eval(row) == Some(true)
	}

	// `None` is SQL `NULL`: unknown, and neither admitted nor negated into a match.
	fn eval(&self, row: &Map<String, Value>) -> Option<bool> {
		match self {
			Self::And(nodes) => {
				let mut unknown = false;

				for node in nodes {
					match node.eval(row) {
						Some(false) => return Some(false),
						None => unknown = true,
						Some(true) => {},
					}
				}

				if unknown { None } else { Some(true) }
			},
			Self::Or(nodes) => {
				let mut unknown = false;

				for node in nodes {
					match node.eval(row) {
						Some(true) => return Some(true),
						None => unknown = true,
						Some(false) => {},
					}
				}

				if unknown { None } else { Some(false) }
			},
			Self::Not(node) => node.eval(row).map(|matched| !matched),
			Self::Compare { field, op, value } => lookup(row, field).map(|row_value| {
				value.compare_row(row_value).is_some_and(|ordering| op.accepts(ordering))
			}),
			Self::In { field, values } => lookup(row, field).map(|row_value| {
				values.iter().any(|value| value.compare_row(row_value) == Some(Ordering::Equal))
			}),
			Self::Contains { field, value } => lookup(row, field)
				.and_then(row_text)
				.map(|text| text.contains(value.as_str())),
			Self::IsNull { field } => Some(lookup(row, field).is_none()),
			Self::NotNull { field } => Some(lookup(row, field).is_some()),
		}
	}

	pub fn to_value(&self) -> Value {
		match self {
			Self::And(nodes) => serde_json::json!({
				"op": "and",
				"args": Value::Array(nodes.iter().map(Self::to_value).collect()),
			}),
			Self::Or(nodes) => serde_json::json!({
				"op": "or",
				"args": Value::Array(nodes.iter().map(Self::to_value).collect()),
			}),
			Self::Not(node) => serde_json::json!({ "op": "not", "expr": node.to_value() }),
			Self::Compare { field, op, value } =>
				serde_json::json!({ "op": op.as_str(), "field": field, "value": value.to_value() }),
			Self::In { field, values } => serde_json::json!({
				"op": "in",
				"field": field,
				"value": Value::Array(values.iter().map(Scalar::to_value).collect()),
			}),
			Self::Contains { field, value } =>
				serde_json::json!({ "op": "contains", "field": field, "value": value }),
			Self::IsNull { field } => serde_json::json!({ "op": "is_null", "field": field }),
			Self::NotNull { field } => serde_json::json!({ "op": "not_null", "field": field }),
		}
	}
}
impl Serialize for Predicate {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		self.to_value().serialize(serializer)
	}
}

#[derive(Default)]
struct ParseState {
	nodes: usize,
}

fn parse_expr(
	raw: &Value,
	path: &str,
	depth: usize,
	state: &mut ParseState,
) -> Result<Predicate, PredicateParseError> {
	if depth > MAX_PREDICATE_DEPTH {
		return Err(PredicateParseError::new(
			path,
			format!("expression depth must be at most {MAX_PREDICATE_DEPTH}."),
		));
	}

	state.nodes += 1;

	if state.nodes > MAX_PREDICATE_NODES {
		return Err(PredicateParseError::new(
			path,
			format!("expression must contain at most {MAX_PREDICATE_NODES} nodes."),
		));
	}

	let obj = raw
		.as_object()
		.ok_or_else(|| PredicateParseError::new(path, "expression must be an object."))?;
	let op = obj
		.get("op")
		.and_then(Value::as_str)
		.ok_or_else(|| PredicateParseError::new(format!("{path}.op"), "op must be a string."))?
		.to_ascii_lowercase();

	match op.as_str() {
		"and" | "or" => {
			let args_path = format!("{path}.args");
			let args = obj
				.get("args")
				.and_then(Value::as_array)
				.ok_or_else(|| PredicateParseError::new(&args_path, "args must be an array."))?;

			if args.is_empty() {
				return Err(PredicateParseError::new(
					&args_path,
					"args must contain at least one expression.",
				));
			}

			let mut nodes = Vec::with_capacity(args.len());

			for (idx, arg) in args.iter().enumerate() {
				nodes.push(parse_expr(arg, &format!("{args_path}[{idx}]"), depth + 1, state)?);
			}

			Ok(if op == "and" { Predicate::And(nodes) } else { Predicate::Or(nodes) })
		},
		"not" => {
			let expr_path = format!("{path}.expr");
			let expr = obj
				.get("expr")
				.ok_or_else(|| PredicateParseError::new(&expr_path, "expr is required."))?;

			Ok(Predicate::Not(Box::new(parse_expr(expr, &expr_path, depth + 1, state)?)))
		},
		"eq" | "neq" | "gt" | "gte" | "lt" | "lte" => {
			let op = match op.as_str() {
				"eq" => CompareOp::Eq,
				"neq" => CompareOp::Neq,
				"gt" => CompareOp::Gt,
				"gte" => CompareOp::Gte,
				"lt" => CompareOp::Lt,
				_ => CompareOp::Lte,
			};
			let field = parse_field(obj, path)?;
			let value_path = format!("{path}.value");
			let value = Scalar::parse(required_value(obj, &value_path)?, &value_path)?;

			if op.is_ordering() && matches!(value, Scalar::Bool(_)) {
				return Err(PredicateParseError::new(
					value_path,
					"ordering comparisons need a number or string value.",
				));
			}

			Ok(Predicate::Compare { field, op, value })
		},
		"in" => {
			let field = parse_field(obj, path)?;
			let value_path = format!("{path}.value");
			let items = required_value(obj, &value_path)?
				.as_array()
				.ok_or_else(|| PredicateParseError::new(&value_path, "value must be an array."))?;

			if items.is_empty() || items.len() > MAX_IN_LIST_ITEMS {
				return Err(PredicateParseError::new(
					value_path,
					format!("value must contain between 1 and {MAX_IN_LIST_ITEMS} items."),
				));
			}

			let mut values: Vec<Scalar> = Vec::with_capacity(items.len());

			for (idx, item) in items.iter().enumerate() {
				let item_path = format!("{value_path}[{idx}]");
				let value = Scalar::parse(item, &item_path)?;

				if let Some(first) = values.first()
					&& mem::discriminant(first) != mem::discriminant(&value)
				{
					return Err(PredicateParseError::new(
						item_path,
						"in values must all be strings, all numbers, or all bools.",
					));
				}

				values.push(value);
			}

			Ok(Predicate::In { field, values })
		},
		"contains" => {
			let field = parse_field(obj, path)?;
			let value_path = format!("{path}.value");

			match Scalar::parse(required_value(obj, &value_path)?, &value_path)? {
				Scalar::String(value) => Ok(Predicate::Contains { field, value }),
				_ => Err(PredicateParseError::new(value_path, "contains needs a string value.")),
			}
		},
		"is_null" => Ok(Predicate::IsNull { field: parse_field(obj, path)? }),
		"not_null" => Ok(Predicate::NotNull { field: parse_field(obj, path)? }),
		other => Err(PredicateParseError::new(
			format!("{path}.op"),
			format!(
				"unsupported op '{other}'; expected one of and, or, not, eq, neq, gt, gte, lt, lte, in, contains, is_null, not_null."
			),
		)),
	}
}

fn parse_field(obj: &Map<String, Value>, path: &str) -> Result<String, PredicateParseError> {
	let field_path = format!("{path}.field");
	let field = obj
		.get("field")
		.and_then(Value::as_str)
		.ok_or_else(|| PredicateParseError::new(&field_path, "field must be a string."))?;

	if !descriptor::is_identifier(field) {
		return Err(PredicateParseError::new(
			field_path,
			format!("field '{field}' is not a valid column name."),
		));
	}

	Ok(field.to_string())
}

fn required_value<'a>(
	obj: &'a Map<String, Value>,
	path: &str,
) -> Result<&'a Value, PredicateParseError> {
	obj.get("value").ok_or_else(|| PredicateParseError::new(path, "value is required."))
}

fn lookup<'a>(row: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
	row.get(field).filter(|value| !value.is_null())
}

// Text rendering of a column, as `CAST(column AS TEXT)` would produce it.
pub(crate) fn row_text(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		other => Some(other.to_string()),
	}
}
