pub mod descriptor;
pub mod plan;
pub mod predicate;
pub mod registry;

pub use descriptor::{Descriptor, DescriptorError, Direction, OrderTerm};
pub use plan::{LookupPlan, ResultItem, TextSearch};
pub use predicate::{CompareOp, Predicate, PredicateParseError, Scalar};
pub use registry::{LookupError, MAX_QUERY_NAME_CHARS, Registry, RegistryError, short_name};
