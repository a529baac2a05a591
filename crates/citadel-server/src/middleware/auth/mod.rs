//! Authentication middleware for the Citadel API server.

pub mod extractor;
pub mod jwt;
pub mod layer;
pub mod types;

pub use extractor::{require_tenant, AdminAuth, Auth};
pub use jwt::{decode_token, encode_token};
pub use layer::{AuthLayer, AuthMiddleware};
pub use types::{Claims, TokenType};
