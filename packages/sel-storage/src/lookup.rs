use serde_json::Value;
use sqlx::{Executor, Postgres, QueryBuilder, Row};

use sel_domain::{CompareOp, LookupPlan, Predicate, ResultItem, Scalar};

use crate::{Error, Result};

const TABLE_ALIAS: &str = "t";

pub async fn fetch_items<'e, E>(executor: E, plan: &LookupPlan<'_>) -> Result<Vec<ResultItem>>
where
	E: Executor<'e, Database = Postgres>,
{
	if plan.limit == 0 {
		return Err(Error::InvalidArgument("lookup limit must be greater than zero.".to_string()));
	}

	let mut builder = build_lookup_query(plan);
	let rows = builder.build().fetch_all(executor).await?;
	let mut items = Vec::with_capacity(rows.len());

	for row in rows {
		let id: Option<Value> = row.try_get("id")?;
		let text: Option<String> = row.try_get("text")?;

		items.push(ResultItem { id: id.unwrap_or(Value::Null), text: text.unwrap_or_default() });
	}

	Ok(items)
}

/// Compiles a plan into one parameterized statement. Identifiers were validated when the
/// descriptor was built and are quoted here; every value is bound.
pub fn build_lookup_query(plan: &LookupPlan<'_>) -> QueryBuilder<'static, Postgres> {
	let mut builder = QueryBuilder::new("SELECT to_jsonb(");

	builder.push(column(plan.id_field));
	builder.push(") AS id, CAST(");
	builder.push(column(plan.text_field));
	builder.push(" AS TEXT) AS text FROM ");
	builder.push(quote_table(plan.table));
	builder.push(" AS ");
	builder.push(TABLE_ALIAS);

	let mut has_where = false;

	if let Some(filter) = plan.filter {
		builder.push(" WHERE ");
		push_predicate(&mut builder, filter);

		has_where = true;
	}
	if let Some(search) = plan.search {
		builder.push(if has_where { " AND (" } else { " WHERE (" });

		let pattern = format!("%{}%", escape_like(search.term));

		for (idx, field) in search.fields.iter().enumerate() {
			if idx > 0 {
				builder.push(" OR ");
			}

			builder.push(text_column(field));
			builder.push(" ILIKE ");
			builder.push_bind(pattern.clone());
		}

		builder.push(")");
	}

	for (idx, term) in plan.order_by.iter().enumerate() {
		builder.push(if idx == 0 { " ORDER BY " } else { ", " });
		builder.push(column(&term.field));
		builder.push(" ");
		builder.push(term.direction.as_sql());
	}

	builder.push(" LIMIT ");
	builder.push_bind(i64::from(plan.limit));

	builder
}

fn push_predicate(builder: &mut QueryBuilder<'static, Postgres>, predicate: &Predicate) {
	match predicate {
		Predicate::And(nodes) => push_group(builder, nodes, " AND "),
		Predicate::Or(nodes) => push_group(builder, nodes, " OR "),
		Predicate::Not(node) => {
			builder.push("NOT (");
			push_predicate(builder, node);
			builder.push(")");
		},
		Predicate::Compare { field, op, value } => push_comparison(builder, field, *op, value),
		Predicate::In { field, values } => {
			builder.push("(");

			for (idx, value) in values.iter().enumerate() {
				if idx > 0 {
					builder.push(" OR ");
				}

				push_comparison(builder, field, CompareOp::Eq, value);
			}

			builder.push(")");
		},
		Predicate::Contains { field, value } => {
			builder.push("strpos(");
			builder.push(text_column(field));
			builder.push(", ");
			builder.push_bind(value.clone());
			builder.push(") > 0");
		},
		Predicate::IsNull { field } => {
			builder.push(column(field));
			builder.push(" IS NULL");
		},
		Predicate::NotNull { field } => {
			builder.push(column(field));
			builder.push(" IS NOT NULL");
		},
	}
}

fn push_group(builder: &mut QueryBuilder<'static, Postgres>, nodes: &[Predicate], joiner: &str) {
	builder.push("(");

	for (idx, node) in nodes.iter().enumerate() {
		if idx > 0 {
			builder.push(joiner);
		}

		push_predicate(builder, node);
	}

	builder.push(")");
}

fn push_comparison(
	builder: &mut QueryBuilder<'static, Postgres>,
	field: &str,
	op: CompareOp,
	value: &Scalar,
) {
	match value {
		Scalar::String(value) => {
			builder.push(text_column(field));
			builder.push(format!(" {} ", op.as_sql()));
			builder.push_bind(value.clone());
		},
		Scalar::Number(value) => {
			builder.push(format!("CAST({} AS DOUBLE PRECISION)", column(field)));
			builder.push(format!(" {} ", op.as_sql()));
			builder.push_bind(*value);
		},
		Scalar::Bool(value) => {
			builder.push(column(field));
			builder.push(format!(" {} ", op.as_sql()));
			builder.push_bind(*value);
		},
	}
}

fn column(field: &str) -> String {
	format!("{TABLE_ALIAS}.{}", quote_ident(field))
}

fn text_column(field: &str) -> String {
	format!("CAST({} AS TEXT)", column(field))
}

fn quote_table(table: &str) -> String {
	table.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

fn quote_ident(ident: &str) -> String {
	format!("\"{}\"", ident.replace('"', "\"\""))
}

fn escape_like(term: &str) -> String {
	let mut out = String::with_capacity(term.len());

	for ch in term.chars() {
		if matches!(ch, '\\' | '%' | '_') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}

#[cfg(test)]
mod tests {
	use sel_config::{OrderTerm, QueryConfig};
	use sel_domain::{Descriptor, LookupPlan};

	use crate::lookup::{build_lookup_query, escape_like};

	fn descriptor(filter: Option<serde_json::Value>) -> Descriptor {
		Descriptor::from_config(&QueryConfig {
			table: Some("public.users".to_string()),
			id: Some("id".to_string()),
			text: Some("name".to_string()),
			searchable: Some(vec!["name".to_string(), "email".to_string()]),
			order_by: Some(vec![
				OrderTerm { field: "name".to_string(), direction: "asc".to_string() },
				OrderTerm { field: "id".to_string(), direction: "desc".to_string() },
			]),
			filter,
		})
		.expect("valid descriptor")
	}

	#[test]
	fn unfiltered_plan_orders_and_limits_in_sql() {
		let descriptor = descriptor(None);
		let plan = LookupPlan::build(&descriptor, None, 10);
		let builder = build_lookup_query(&plan);

		assert_eq!(
			builder.sql(),
			"SELECT to_jsonb(t.\"id\") AS id, CAST(t.\"name\" AS TEXT) AS text \
			 FROM \"public\".\"users\" AS t ORDER BY t.\"name\" ASC, t.\"id\" DESC LIMIT $1"
		);
	}

	#[test]
	fn search_term_matches_any_searchable_field() {
		let descriptor = descriptor(None);
		let plan = LookupPlan::build(&descriptor, Some("an"), 10);
		let builder = build_lookup_query(&plan);

		assert_eq!(
			builder.sql(),
			"SELECT to_jsonb(t.\"id\") AS id, CAST(t.\"name\" AS TEXT) AS text \
			 FROM \"public\".\"users\" AS t \
			 WHERE (CAST(t.\"name\" AS TEXT) ILIKE $1 OR CAST(t.\"email\" AS TEXT) ILIKE $2) \
			 ORDER BY t.\"name\" ASC, t.\"id\" DESC LIMIT $3"
		);
	}

	#[test]
	fn filter_is_combined_with_search() {
		let descriptor = descriptor(Some(serde_json::json!({
			"op": "and",
			"args": [
				{ "op": "not_null", "field": "email_verified_at" },
				{ "op": "in", "field": "role", "value": ["admin", "staff"] },
				{ "op": "gte", "field": "age", "value": 18 },
				{ "op": "not", "expr": { "op": "eq", "field": "banned", "value": true } },
			],
		})));
		let plan = LookupPlan::build(&descriptor, Some("an"), 5);
		let builder = build_lookup_query(&plan);

		assert_eq!(
			builder.sql(),
			"SELECT to_jsonb(t.\"id\") AS id, CAST(t.\"name\" AS TEXT) AS text \
			 FROM \"public\".\"users\" AS t \
			 WHERE (t.\"email_verified_at\" IS NOT NULL \
			 AND (CAST(t.\"role\" AS TEXT) = $1 OR CAST(t.\"role\" AS TEXT) = $2) \
			 AND CAST(t.\"age\" AS DOUBLE PRECISION) >= $3 \
			 AND NOT (t.\"banned\" = $4)) \
			 AND (CAST(t.\"name\" AS TEXT) ILIKE $5 OR CAST(t.\"email\" AS TEXT) ILIKE $6) \
			 ORDER BY t.\"name\" ASC, t.\"id\" DESC LIMIT $7"
		);
	}

	#[test]
	fn like_metacharacters_are_escaped() {
		assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
	}
}
