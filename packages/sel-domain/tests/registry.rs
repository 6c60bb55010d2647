use std::collections::BTreeMap;

use sel_config::QueryConfig;
use sel_domain::{DescriptorError, LookupError, Registry, RegistryError};

fn entry(table: &str, id: &str, text: &str, searchable: &[&str]) -> QueryConfig {
	QueryConfig {
		table: Some(table.to_string()),
		id: Some(id.to_string()),
		text: Some(text.to_string()),
		searchable: Some(searchable.iter().map(|field| field.to_string()).collect()),
		order_by: None,
		filter: None,
	}
}

fn registry() -> Registry {
	let mut queries = BTreeMap::new();

	queries.insert("App\\Models\\User".to_string(), entry("users", "id", "name", &["name", "email"]));
	queries.insert("catalog::Country".to_string(), entry("countries", "code", "name", &["name"]));
	queries.insert("App\\Models\\Ghost".to_string(), QueryConfig::default());
	queries.insert(
		"App\\Models\\Broken".to_string(),
		QueryConfig { id: None, ..entry("broken", "id", "label", &["label"]) },
	);
	queries.insert(
		"App\\Models\\Unsearchable".to_string(),
		QueryConfig { searchable: Some(Vec::new()), ..entry("things", "id", "label", &[]) },
	);

	Registry::from_config(&queries).expect("Registry must build.")
}

#[test]
fn resolves_every_registered_short_name() {
	let registry = registry();

	assert_eq!(registry.len(), 5);
	assert_eq!(registry.resolve("User").expect("User must resolve.").table, "users");
	assert_eq!(registry.resolve("Country").expect("Country must resolve.").id_field, "code");
}

#[test]
fn short_name_match_is_exact_and_case_sensitive() {
	let registry = registry();

	for name in ["user", "App\\Models\\User", "Use", "doesnotexist"] {
		assert_eq!(
			registry.resolve(name),
			Err(LookupError::UnknownQuery { name: name.to_string() }),
			"{name} must not resolve"
		);
	}
}

#[test]
fn empty_entry_reports_missing_descriptor() {
	let err = registry().resolve("Ghost").expect_err("Ghost must not resolve.");

	assert_eq!(err, LookupError::MissingDescriptor { name: "Ghost".to_string() });
	assert_eq!(err.to_string(), "Query configuration for Ghost not found.");
}

#[test]
fn misconfigured_entries_fail_at_lookup() {
	let registry = registry();
	let err = registry.resolve("Broken").expect_err("Broken must not resolve.");

	assert!(matches!(
		&err,
		LookupError::Misconfigured { error: DescriptorError::MissingIdOrText, .. }
	));
	assert_eq!(err.to_string(), "ID and text fields for Broken are not properly configured.");

	let err = registry.resolve("Unsearchable").expect_err("Unsearchable must not resolve.");

	assert_eq!(
		err.to_string(),
		"Searchable fields for Unsearchable are not properly configured."
	);
}

#[test]
fn rejects_out_of_bounds_names() {
	let registry = registry();

	assert!(matches!(registry.resolve(""), Err(LookupError::InvalidName { .. })));
	assert!(matches!(registry.resolve(&"x".repeat(51)), Err(LookupError::InvalidName { .. })));
}

#[test]
fn duplicate_short_names_are_rejected() {
	let mut queries = BTreeMap::new();

	queries.insert("App\\Models\\User".to_string(), entry("users", "id", "name", &["name"]));
	queries.insert("Legacy\\User".to_string(), entry("old_users", "id", "name", &["name"]));

	let err = Registry::from_config(&queries).expect_err("Expected duplicate name error.");

	assert!(matches!(err, RegistryError::DuplicateShortName { ref short_name, .. } if short_name == "User"));
}

#[test]
fn key_without_trailing_name_is_rejected() {
	let mut queries = BTreeMap::new();

	queries.insert("App\\Models\\".to_string(), entry("users", "id", "name", &["name"]));

	assert!(matches!(
		Registry::from_config(&queries),
		Err(RegistryError::EmptyShortName { .. })
	));
}
