use std::{
	collections::{BTreeMap, HashMap},
	fmt::{Display, Formatter},
};

use sel_config::QueryConfig;

use crate::descriptor::{Descriptor, DescriptorError};

pub const MAX_QUERY_NAME_CHARS: usize = 50;

/// Last path segment of a registry key, e.g. `User` for `App\Models\User` or `app::models::User`.
pub fn short_name(key: &str) -> &str {
	key.rsplit(['\\', ':', '.', '/']).next().unwrap_or(key)
}

#[derive(Debug)]
pub struct RegistryEntry {
	pub key: String,
	pub short_name: String,
	pub descriptor: Result<Descriptor, DescriptorError>,
}

/// Read-only map from logical query names to data-source descriptors.
///
/// Descriptors are validated once while the registry is built; an invalid one stays registered
/// so that looking it up reports the configuration problem instead of an unknown name.
#[derive(Debug, Default)]
pub struct Registry {
	entries: Vec<RegistryEntry>,
	by_short_name: HashMap<String, usize>,
}
impl Registry {
	pub fn from_config(queries: &BTreeMap<String, QueryConfig>) -> Result<Self, RegistryError> {
		let mut registry = Self::default();

		for (key, cfg) in queries {
			let short = short_name(key.trim());

			if short.is_empty() {
				return Err(RegistryError::EmptyShortName { key: key.clone() });
			}
			if let Some(&idx) = registry.by_short_name.get(short) {
				return Err(RegistryError::DuplicateShortName {
					short_name: short.to_string(),
					first: registry.entries[idx].key.clone(),
					second: key.clone(),
				});
			}

			registry.by_short_name.insert(short.to_string(), registry.entries.len());
			registry.entries.push(RegistryEntry {
				key: key.clone(),
				short_name: short.to_string(),
				descriptor: Descriptor::from_config(cfg),
			});
		}

		Ok(registry)
	}

	pub fn resolve(&self, name: &str) -> Result<&Descriptor, LookupError> {
		let len = name.chars().count();

		if len == 0 || len > MAX_QUERY_NAME_CHARS {
			return Err(LookupError::InvalidName { name: name.to_string() });
		}

		let Some(&idx) = self.by_short_name.get(name) else {
			return Err(LookupError::UnknownQuery { name: name.to_string() });
		};

		match &self.entries[idx].descriptor {
			Ok(descriptor) => Ok(descriptor),
			Err(DescriptorError::Empty) =>
				Err(LookupError::MissingDescriptor { name: name.to_string() }),
			Err(err) =>
				Err(LookupError::Misconfigured { name: name.to_string(), error: err.clone() }),
		}
	}

	pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
		self.entries.iter()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
	EmptyShortName { key: String },
	DuplicateShortName { short_name: String, first: String, second: String },
}
impl Display for RegistryError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::EmptyShortName { key } =>
				write!(f, "Query key {key:?} does not end with a usable name."),
			Self::DuplicateShortName { short_name, first, second } => write!(
				f,
				"Query keys {first:?} and {second:?} share the name {short_name:?}; names must be unique."
			),
		}
	}
}
impl std::error::Error for RegistryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
	InvalidName { name: String },
	UnknownQuery { name: String },
	MissingDescriptor { name: String },
	Misconfigured { name: String, error: DescriptorError },
}
impl Display for LookupError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::InvalidName { .. } => write!(
				f,
				"The query field must be between 1 and {MAX_QUERY_NAME_CHARS} characters."
			),
			Self::UnknownQuery { .. } => write!(f, "Invalid query type provided."),
			Self::MissingDescriptor { name } =>
				write!(f, "Query configuration for {name} not found."),
			Self::Misconfigured { name, error } => f.write_str(&error.message(name)),
		}
	}
}
impl std::error::Error for LookupError {}
