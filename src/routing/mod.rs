mod matcher;
mod registry;

pub use matcher::{method_matches, PathPattern};
pub use registry::{RouteRegistry, Upserted};
