//! Record types shared by storage backends and the tenant core.

mod ids;
mod metering;
mod plans;
mod subscriptions;
mod tenants;

pub use ids::*;
pub use metering::*;
pub use plans::*;
pub use subscriptions::*;
pub use tenants::*;
