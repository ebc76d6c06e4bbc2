//! Typed service registry.
//!
//! Services are named singletons registered once during start-up and
//! resolved by name and concrete type afterwards. A lookup with the wrong
//! type is an error value, never a panic.

pub mod error;
pub mod registry;

pub use error::ServiceError;
pub use registry::{ServiceInfo, ServiceRegistry};
