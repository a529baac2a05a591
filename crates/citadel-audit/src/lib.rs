//! Audit trail for elevated support sessions.
//!
//! When a platform operator acts inside a tenant, the session and every
//! mutating request made under it are recorded here. Rows are written through
//! an elevated pool, carry no foreign keys into tenant data, and are never
//! deleted: there is an insert path, a single "end" update, and nothing else.

pub mod error;
pub mod model;
pub mod store;
pub mod token;

pub use error::{AuditError, AuditResult};
pub use model::{AccessMutation, AccessSession, EndOutcome, NewMutation};
pub use store::AccessSessionStore;
pub use token::{hash_token, SessionToken};
