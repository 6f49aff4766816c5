//! Collaborator ports consumed by the core.
//!
//! Persistence, session, audit and file handling are external services;
//! the core only ever talks to them through these narrow seams.

pub mod mem;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::privilege::{Privilege, Scope};
use crate::user::User;

/// The caller on whose behalf a job runs.
#[derive(Clone, Debug)]
pub struct Actor {
    /// Identity scope the caller acts under.
    pub scope: Scope,
    /// Privileges the caller holds.
    pub privileges: Vec<Privilege>,
}

impl Actor {
    pub fn new(scope: Scope, privileges: Vec<Privilege>) -> Self {
        Self { scope, privileges }
    }

    /// An unauthenticated caller holding nothing.
    pub fn anonymous() -> Self {
        Self {
            scope: Scope::Anonymous,
            privileges: Vec::new(),
        }
    }
}

/// Port for user persistence operations.
pub trait UserRepository {
    /// Find a persisted user by name.
    fn find_by_name(&self, name: &str) -> Result<Option<User>>;

    /// Find a persisted user holding this e-mail on either the
    /// unconfirmed or the confirmed field.
    fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist the entity, allocating an identifier on first save.
    fn save(&self, user: &mut User) -> Result<()>;

    /// Run `f` atomically: on `Err` every write made inside it is
    /// rolled back and the error re-raised.
    fn run_in_transaction(
        &self,
        f: &mut dyn FnMut() -> Result<()>,
    ) -> Result<()>;
}

/// Port for the current-session identity provider.
pub trait SessionProvider {
    fn current(&self) -> Actor;
}

/// Port for the audit log sink.
///
/// Fire-and-forget: the job runner never lets a failure here abort the
/// surrounding work.
pub trait AuditLog {
    fn log(
        &self,
        template: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Port for file and thumbnail operations used by avatar mutation.
pub trait FileStore {
    fn exists(&self, path: &str) -> bool;

    fn copy(&self, src: &str, dst: &str) -> Result<()>;

    fn remove(&self, path: &str) -> Result<()>;

    fn generate_thumbnail(
        &self,
        src: &str,
        dst: &str,
        width: u32,
        height: u32,
    ) -> Result<()>;
}
