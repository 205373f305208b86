//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! sync engine. The engine depends on these traits; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteGateway`] - Entity CRUD and search against the remote platform
//! - [`IDeletionPrompt`] - Asks the developer whether a folder deletion should
//!   be propagated

pub mod deletion_prompt;
pub mod remote_gateway;

pub use deletion_prompt::{AutoConfirm, DeletionRequest, DeletionTarget, IDeletionPrompt};
pub use remote_gateway::IRemoteGateway;
