//! In-memory collaborators.
//!
//! Used by the test suite and by embedders that want the core without a
//! real database or filesystem behind it.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, ToCollaborator};
use crate::ports::{Actor, AuditLog, FileStore, SessionProvider, UserRepository};
use crate::user::{User, UserRow};

/// In-memory user store with snapshot-based transactions.
#[derive(Default)]
pub struct MemoryRepository {
    rows: RefCell<Vec<UserRow>>,
    next_id: Cell<i64>,
    snapshot: RefCell<Option<(Vec<UserRow>, i64)>>,
    saves: Cell<usize>,
    transactions: Cell<usize>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            rows: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            snapshot: RefCell::new(None),
            saves: Cell::new(0),
            transactions: Cell::new(0),
        }
    }

    /// Number of persisted users.
    pub fn count(&self) -> usize {
        self.rows.borrow().len()
    }

    /// Number of `save` calls observed.
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }

    /// Number of transactions opened.
    pub fn transaction_count(&self) -> usize {
        self.transactions.get()
    }

    /// Seed a persisted user directly, bypassing validation.
    pub fn seed(&self, user: &mut User) {
        self.insert_or_replace(user);
    }

    fn insert_or_replace(&self, user: &mut User) {
        let mut rows = self.rows.borrow_mut();
        match user.id() {
            Some(id) => {
                if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
                    *row = user.to_row(id);
                } else {
                    rows.push(user.to_row(id));
                }
            },
            None => {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                user.set_id(id);
                rows.push(user.to_row(id));
            },
        }
    }
}

impl UserRepository for MemoryRepository {
    fn find_by_name(&self, name: &str) -> Result<Option<User>> {
        let needle = name.to_lowercase();
        Ok(self
            .rows
            .borrow()
            .iter()
            .find(|r| r.name.to_lowercase() == needle)
            .cloned()
            .map(User::fill_from_database))
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let needle = email.to_lowercase();
        let matches = |field: &Option<String>| {
            field.as_deref().is_some_and(|e| e == needle)
        };
        Ok(self
            .rows
            .borrow()
            .iter()
            .find(|r| {
                matches(&r.email_unconfirmed) || matches(&r.email_confirmed)
            })
            .cloned()
            .map(User::fill_from_database))
    }

    fn save(&self, user: &mut User) -> Result<()> {
        self.saves.set(self.saves.get() + 1);
        self.insert_or_replace(user);
        Ok(())
    }

    fn run_in_transaction(
        &self,
        f: &mut dyn FnMut() -> Result<()>,
    ) -> Result<()> {
        self.transactions.set(self.transactions.get() + 1);
        let outer = self.snapshot.borrow().is_some();
        if !outer {
            *self.snapshot.borrow_mut() =
                Some((self.rows.borrow().clone(), self.next_id.get()));
        }

        let result = f();

        if !outer {
            let snapshot = self.snapshot.borrow_mut().take();
            if result.is_err() {
                if let Some((rows, next_id)) = snapshot {
                    *self.rows.borrow_mut() = rows;
                    self.next_id.set(next_id);
                }
            }
        }
        result
    }
}

/// Session provider handing back one fixed actor.
pub struct StaticSession {
    actor: Actor,
}

impl StaticSession {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }
}

impl SessionProvider for StaticSession {
    fn current(&self) -> Actor {
        self.actor.clone()
    }
}

/// Audit sink keeping every record in memory.
#[derive(Default)]
pub struct RecordingAudit {
    records: RefCell<Vec<(String, BTreeMap<String, String>)>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn records(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.records.borrow().clone()
    }
}

impl AuditLog for RecordingAudit {
    fn log(
        &self,
        template: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.records
            .borrow_mut()
            .push((template.to_owned(), fields.clone()));
        Ok(())
    }
}

/// Audit sink forwarding records to `tracing`.
#[derive(Default)]
pub struct TracingAudit;

impl AuditLog for TracingAudit {
    fn log(
        &self,
        template: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<()> {
        tracing::info!(target: "audit", ?fields, "{template}");
        Ok(())
    }
}

/// In-memory file collaborator tracking paths only.
#[derive(Default)]
pub struct MemoryFiles {
    paths: RefCell<BTreeSet<String>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, as if something had been uploaded there.
    pub fn touch(&self, path: impl Into<String>) {
        self.paths.borrow_mut().insert(path.into());
    }

    fn require(&self, path: &str) -> Result<()> {
        if self.paths.borrow().contains(path) {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {path}"),
            ))
            .catch()
        }
    }
}

impl FileStore for MemoryFiles {
    fn exists(&self, path: &str) -> bool {
        self.paths.borrow().contains(path)
    }

    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.require(src)?;
        self.paths.borrow_mut().insert(dst.to_owned());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.require(path)?;
        self.paths.borrow_mut().remove(path);
        Ok(())
    }

    fn generate_thumbnail(
        &self,
        src: &str,
        dst: &str,
        _width: u32,
        _height: u32,
    ) -> Result<()> {
        self.require(src)?;
        self.paths.borrow_mut().insert(dst.to_owned());
        Ok(())
    }
}
