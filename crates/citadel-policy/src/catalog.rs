//! The policy catalog.
//!
//! An explicit list of every table the isolation layer knows about and how it
//! is protected. Nothing here is discovered by reflecting over the schema, so
//! the provisioning engine's behaviour can be reviewed by reading this file.

use crate::ident::{self, IdentError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// How rows of a table are confined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationKind {
    /// `tenant_id` must equal the bound tenant for every operation.
    Standard,
    /// Owner-only writes; reads widened by `visibility` and `allowed_tenants`.
    Visibility,
    /// Global reference data without row-level security.
    Exempt,
}

/// The single command an exception policy covers.
///
/// There is deliberately no `All` variant: an exception is always scoped to
/// one operation on one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionCommand {
    Select,
    Insert,
    Update,
}

impl ExceptionCommand {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Select)
    }
}

/// A narrow permissive policy for work that happens before a tenant is bound.
///
/// Every exception only matches while no tenant is bound to the transaction.
/// `require_column`, when set, additionally requires that column to be
/// non-null on the affected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionPolicy {
    /// Policy name prefix; the full name is `<purpose>_<table>`.
    pub purpose: String,
    pub command: ExceptionCommand,
    #[serde(default)]
    pub require_column: Option<String>,
}

impl ExceptionPolicy {
    pub fn new(purpose: impl Into<String>, command: ExceptionCommand) -> Self {
        Self {
            purpose: purpose.into(),
            command,
            require_column: None,
        }
    }

    pub fn requiring(mut self, column: impl Into<String>) -> Self {
        self.require_column = Some(column.into());
        self
    }
}

/// Parent of a dependent visibility table, e.g. the template a version
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub table: String,
    pub foreign_key: String,
}

/// One catalogued table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub table: String,
    pub isolation: IsolationKind,
    #[serde(default)]
    pub read_exceptions: Vec<ExceptionPolicy>,
    #[serde(default)]
    pub write_exceptions: Vec<ExceptionPolicy>,
    /// Set on dependent visibility tables whose readability follows a parent.
    #[serde(default)]
    pub parent: Option<ParentLink>,
}

impl PolicyEntry {
    pub fn standard(table: impl Into<String>) -> Self {
        Self::new(table, IsolationKind::Standard)
    }

    pub fn visibility(table: impl Into<String>) -> Self {
        Self::new(table, IsolationKind::Visibility)
    }

    pub fn exempt(table: impl Into<String>) -> Self {
        Self::new(table, IsolationKind::Exempt)
    }

    fn new(table: impl Into<String>, isolation: IsolationKind) -> Self {
        Self {
            table: table.into(),
            isolation,
            read_exceptions: Vec::new(),
            write_exceptions: Vec::new(),
            parent: None,
        }
    }

    pub fn with_read_exception(mut self, exception: ExceptionPolicy) -> Self {
        self.read_exceptions.push(exception);
        self
    }

    pub fn with_write_exception(mut self, exception: ExceptionPolicy) -> Self {
        self.write_exceptions.push(exception);
        self
    }

    pub fn with_parent(mut self, table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.parent = Some(ParentLink {
            table: table.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Whether row-level security is enabled on this table at all.
    pub fn is_protected(&self) -> bool {
        self.isolation != IsolationKind::Exempt
    }

    pub fn exceptions(&self) -> impl Iterator<Item = &ExceptionPolicy> {
        self.read_exceptions.iter().chain(self.write_exceptions.iter())
    }
}

/// Catalog consistency errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("invalid identifier in catalog: {0}")]
    Ident(#[from] IdentError),

    #[error("table '{0}' is listed more than once")]
    DuplicateTable(String),

    #[error("read exception '{purpose}' on '{table}' must be a SELECT policy")]
    ReadExceptionNotSelect { table: String, purpose: String },

    #[error("write exception '{purpose}' on '{table}' must be an INSERT or UPDATE policy")]
    WriteExceptionIsRead { table: String, purpose: String },

    #[error("exempt table '{0}' cannot carry exception policies")]
    ExceptionOnExempt(String),

    #[error("table '{table}' has parent '{parent}' which is not a catalogued visibility table")]
    UnknownParent { table: String, parent: String },

    #[error("only visibility tables may declare a parent (table '{0}')")]
    ParentOnNonVisibility(String),
}

/// The full set of catalogued tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCatalog {
    pub entries: Vec<PolicyEntry>,
}

impl PolicyCatalog {
    pub fn new(entries: Vec<PolicyEntry>) -> Self {
        Self { entries }
    }

    /// The platform's tables.
    pub fn platform() -> Self {
        use ExceptionCommand::*;

        Self::new(vec![
            PolicyEntry::exempt("tenants"),
            PolicyEntry::standard("users")
                .with_read_exception(ExceptionPolicy::new("auth_login", Select))
                .with_write_exception(ExceptionPolicy::new("seed_insert", Insert)),
            PolicyEntry::standard("invitations")
                .with_read_exception(
                    ExceptionPolicy::new("invitation_token_read", Select).requiring("token"),
                )
                .with_write_exception(
                    ExceptionPolicy::new("invitation_accept", Update).requiring("token"),
                ),
            PolicyEntry::standard("folders"),
            PolicyEntry::standard("assets"),
            PolicyEntry::standard("knowledge_chunks"),
            PolicyEntry::standard("workflow_runs"),
            PolicyEntry::visibility("workflow_templates"),
            PolicyEntry::visibility("workflow_template_versions")
                .with_parent("workflow_templates", "template_id"),
            PolicyEntry::visibility("workflow_chains"),
            PolicyEntry::visibility("workflow_chain_versions")
                .with_parent("workflow_chains", "chain_id"),
            PolicyEntry::exempt("llm_providers"),
            PolicyEntry::exempt("llm_models"),
        ])
    }

    pub fn get(&self, table: &str) -> Option<&PolicyEntry> {
        self.entries.iter().find(|e| e.table == table)
    }

    pub fn protected(&self) -> impl Iterator<Item = &PolicyEntry> {
        self.entries.iter().filter(|e| e.is_protected())
    }

    /// Check the catalog before any statement is issued.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();

        for entry in &self.entries {
            ident::checked(&entry.table)?;
            if !seen.insert(entry.table.as_str()) {
                return Err(CatalogError::DuplicateTable(entry.table.clone()));
            }

            if entry.isolation == IsolationKind::Exempt && entry.exceptions().next().is_some() {
                return Err(CatalogError::ExceptionOnExempt(entry.table.clone()));
            }

            for exception in &entry.read_exceptions {
                if !exception.command.is_read() {
                    return Err(CatalogError::ReadExceptionNotSelect {
                        table: entry.table.clone(),
                        purpose: exception.purpose.clone(),
                    });
                }
            }
            for exception in &entry.write_exceptions {
                if exception.command.is_read() {
                    return Err(CatalogError::WriteExceptionIsRead {
                        table: entry.table.clone(),
                        purpose: exception.purpose.clone(),
                    });
                }
            }
            for exception in entry.exceptions() {
                ident::checked(&exception.purpose)?;
                if let Some(column) = &exception.require_column {
                    ident::checked(column)?;
                }
            }

            if let Some(parent) = &entry.parent {
                if entry.isolation != IsolationKind::Visibility {
                    return Err(CatalogError::ParentOnNonVisibility(entry.table.clone()));
                }
                ident::checked(&parent.foreign_key)?;
                let known = self
                    .get(&parent.table)
                    .map(|p| p.isolation == IsolationKind::Visibility && p.parent.is_none())
                    .unwrap_or(false);
                if !known {
                    return Err(CatalogError::UnknownParent {
                        table: entry.table.clone(),
                        parent: parent.table.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::platform()
    }
}
