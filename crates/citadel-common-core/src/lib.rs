//! Citadel common core types.
//!
//! Identity types shared by the isolation layer: strongly typed ids and the
//! authenticated [`Principal`] handed from authentication to the tenant scope.

pub mod error;
pub mod id;
pub mod principal;

pub use error::{Error, Result};
pub use id::*;
pub use principal::{Principal, Role};
