//! schemaguard - schema reconciliation and safe writes for a Notion-style
//! document store
//!
//! - [`schema`]: declared collection schemas, loaded once
//! - [`cache`]: TTL cache of live remote schemas
//! - [`drift`]: drift scans, change log, run guard, migration drafts
//! - [`writer`]: validated writes, option extension, post-write checks
//! - [`remote`]: the remote store boundary and its implementations

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod drift;
pub mod engine;
pub mod errors;
pub mod notify;
pub mod observability;
pub mod remote;
pub mod schema;
pub mod writer;
