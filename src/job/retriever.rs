//! Target-entity resolution for jobs.

use crate::args::{ArgName, ArgumentBag, Requirement};
use crate::error::{CoreError, Result};
use crate::ports::UserRepository;
use crate::user::User;

/// Resolves the user a job operates on, contributing its own argument
/// requirement to the job's composed set.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserRetriever;

impl UserRetriever {
    pub fn new() -> Self {
        Self
    }

    pub fn requirement(&self) -> Requirement {
        Requirement::of([ArgName::UserName])
    }

    /// Look the target up by name.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no persisted user carries that name.
    pub fn retrieve(
        &self,
        repo: &dyn UserRepository,
        args: &ArgumentBag,
    ) -> Result<User> {
        let name = args.get(ArgName::UserName)?;
        repo.find_by_name(name)?
            .ok_or_else(|| CoreError::NotFound(name.to_owned()))
    }
}
