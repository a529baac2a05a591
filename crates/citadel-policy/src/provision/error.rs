//! Provisioning errors.

use crate::catalog::CatalogError;
use crate::ident::IdentError;
use thiserror::Error;

/// SQLSTATE `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("policy catalog rejected: {0}")]
    Catalog(#[from] CatalogError),

    #[error("unsafe identifier: {0}")]
    Ident(#[from] IdentError),

    #[error("{purpose} failed: {source}")]
    Statement {
        purpose: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ProvisionError {
    pub fn statement(purpose: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Statement {
            purpose: purpose.into(),
            source,
        }
    }
}

/// Whether the error only means a table has not been created yet.
///
/// This is the one failure provisioning tolerates; it happens on a first run
/// when the schema is still being built. A missing column is not tolerated:
/// skipping its policy would leave a table with RLS forced but without the
/// isolation policy.
pub fn is_missing_relation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNDEFINED_TABLE),
        _ => false,
    }
}
