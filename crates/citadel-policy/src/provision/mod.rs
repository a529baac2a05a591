//! Policy provisioning.

pub mod engine;
pub mod error;
pub mod options;
pub mod report;

pub use engine::{provision_on_startup, PolicyProvisioner};
pub use error::{is_missing_relation, ProvisionError};
pub use options::{ProvisionOptions, VectorOptions};
pub use report::ProvisionReport;
