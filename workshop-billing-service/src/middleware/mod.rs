//! HTTP middleware and extractors for workshop-billing-service.

pub mod actor;
pub mod metrics;
pub mod validation;

pub use actor::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER, STORE_PERMISSIONS_HEADER};
pub use metrics::http_metrics_middleware;
pub use validation::ValidatedJson;
