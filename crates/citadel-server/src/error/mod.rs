//! Error handling for the Citadel API server.

pub mod response;
pub mod types;

pub use types::{ApiError, ApiResult};
