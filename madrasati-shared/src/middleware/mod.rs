mod auth_extractor;
mod internal_auth;
mod tracing_layer;
mod metrics_layer;

pub use auth_extractor::*;
pub use internal_auth::*;
pub use tracing_layer::*;
pub use metrics_layer::*;
