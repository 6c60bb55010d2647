use sel_domain::LookupError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	Validation { field: &'static str, message: String },
	#[error("Invalid query type provided.")]
	UnknownQuery { name: String },
	#[error("Query configuration for {name} not found.")]
	MissingDescriptor { name: String },
	#[error("{message}")]
	MisconfiguredDescriptor { name: String, message: String },
	#[error("Lookup for {name} failed: {message}")]
	QueryExecution { name: String, message: String },
	#[error("Invalid query registry: {message}")]
	InvalidRegistry { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<LookupError> for Error {
	fn from(err: LookupError) -> Self {
		let message = err.to_string();

		match err {
			LookupError::InvalidName { .. } => Self::Validation { field: "query", message },
			LookupError::UnknownQuery { name } => Self::UnknownQuery { name },
			LookupError::MissingDescriptor { name } => Self::MissingDescriptor { name },
			LookupError::Misconfigured { name, .. } =>
				Self::MisconfiguredDescriptor { name, message },
		}
	}
}
