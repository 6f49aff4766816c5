//! Curata is the command-execution and entity-validation core of a
//! content-management backend.
//!
//! User-facing mutations are modeled as discrete jobs that declare
//! their own argument requirements and required privileges, and run
//! inside a transactional boundary; the user entity validates its own
//! invariants before anything is persisted. Persistence, session,
//! audit logging and file handling are consumed through the narrow
//! ports in [`ports`].

#![forbid(unsafe_code)]

pub mod args;
pub mod config;
pub mod error;
pub mod job;
pub mod ports;
pub mod privilege;
pub mod user;

pub use error::{CoreError, Result};
pub use job::{ExecutionContext, JobEnv, execute, run_multiple};
