//! Provisioning run summary.

use serde::Serialize;

/// What a provisioning run did.
///
/// Two consecutive runs against the same database differ only in the
/// `*_created` and `seeded_tables` counters, which drop to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub tables_secured: usize,
    pub policies_created: usize,
    pub policies_present: usize,
    pub grants_applied: usize,
    /// Tables (or columns) skipped because they do not exist yet.
    pub skipped: Vec<String>,
    pub vector_column_converted: bool,
    pub seeded_tables: Vec<String>,
    pub already_seeded: Vec<String>,
}

impl ProvisionReport {
    pub fn skip(&mut self, what: impl Into<String>) {
        self.skipped.push(what.into());
    }

    /// Nothing new was created; the database already matched the catalog.
    pub fn is_noop(&self) -> bool {
        self.policies_created == 0 && self.seeded_tables.is_empty() && !self.vector_column_converted
    }
}
