//! Environment handling for Citadel.
//!
//! The deployment mode decides whether security objects are provisioned
//! automatically at startup (`development`) or arrive through reviewed
//! migrations (everything else).

pub mod env;
pub mod mode;

pub use env::*;
pub use mode::DeploymentMode;
