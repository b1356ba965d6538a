mod registry;
mod route;

pub use registry::Metrics;
pub use route::RouteMetrics;
