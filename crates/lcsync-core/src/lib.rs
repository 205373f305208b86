//! lcsync Core - Domain types and port definitions
//!
//! This crate contains the pieces every other lcsync crate shares:
//! - **Domain types** - identifiers, revisions, entity manifests, sync operations,
//!   the declarative field schema
//! - **Environment** - the deployment target resolved once at startup
//! - **Configuration** - YAML-backed settings with validation and a builder
//! - **Port definitions** - `IRemoteGateway` and `IDeletionPrompt`
//!
//! # Architecture
//!
//! The domain module is pure data and validation with no I/O. Ports define the
//! trait boundaries that the sync engine depends on and that adapter crates
//! (`lcsync-remote`, the CLI) implement.

pub mod config;
pub mod domain;
pub mod environment;
pub mod ports;
