//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures of identifiers, revisions and field schemas.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid revision stamp
    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    /// Invalid sub-element or entity identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Unknown environment name
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// The field schema text could not be parsed or failed validation
    #[error("Invalid field schema: {0}")]
    InvalidFieldSchema(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
