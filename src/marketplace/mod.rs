//! Marketplace domain: account roles, status values, records and the rules
//! that govern a demanda's lifecycle.

pub mod lifecycle;
pub mod model;
pub mod status;
pub mod validate;

pub use lifecycle::LifecycleError;
pub use model::*;
pub use status::{DemandaStatus, OfferStatus, Role};
pub use validate::ValidationError;
