//! Declarative argument requirements for jobs.
//!
//! A job announces which named inputs it needs before anything runs;
//! the composed requirement is checked against the supplied bag ahead
//! of entity retrieval, so a missing argument can never leave partial
//! side effects behind.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{CoreError, Result};

/// Named argument identifiers understood by jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArgName {
    UserName,
    NewUserName,
    NewPassword,
    NewEmail,
    NewRank,
    NewAvatarStyle,
    AvatarSource,
}

impl ArgName {
    /// Stable identifier used in error messages and audit fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserName => "user-name",
            Self::NewUserName => "new-user-name",
            Self::NewPassword => "new-password",
            Self::NewEmail => "new-email",
            Self::NewRank => "new-rank",
            Self::NewAvatarStyle => "new-avatar-style",
            Self::AvatarSource => "avatar-source",
        }
    }
}

impl fmt::Display for ArgName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input accepted by [`Requirement::conjunction`]: either a bare
/// identifier or an already-composed requirement set.
pub enum Source {
    Arg(ArgName),
    Set(Requirement),
}

impl From<ArgName> for Source {
    fn from(arg: ArgName) -> Self {
        Self::Arg(arg)
    }
}

impl From<Requirement> for Source {
    fn from(set: Requirement) -> Self {
        Self::Set(set)
    }
}

/// De-duplicated set of argument identifiers a job needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Requirement(BTreeSet<ArgName>);

impl Requirement {
    /// Requirement with no arguments at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Requirement over a plain list of identifiers.
    pub fn of(args: impl IntoIterator<Item = ArgName>) -> Self {
        Self(args.into_iter().collect())
    }

    /// Flatten heterogeneous sources into one set union.
    ///
    /// Duplicates collapse by identity.
    pub fn conjunction(sources: impl IntoIterator<Item = Source>) -> Self {
        let mut set = BTreeSet::new();
        for source in sources {
            match source {
                Source::Arg(arg) => {
                    set.insert(arg);
                },
                Source::Set(nested) => set.extend(nested.0),
            }
        }
        Self(set)
    }

    pub fn contains(&self, arg: ArgName) -> bool {
        self.0.contains(&arg)
    }

    pub fn iter(&self) -> impl Iterator<Item = ArgName> + '_ {
        self.0.iter().copied()
    }

    /// Check every required identifier is present in the supplied bag.
    ///
    /// # Errors
    ///
    /// Returns `Err` naming the first missing identifier, in set order.
    pub fn verify(&self, bag: &ArgumentBag) -> Result<()> {
        for arg in self.iter() {
            if !bag.contains(arg) {
                return Err(CoreError::MissingArgument(arg));
            }
        }
        Ok(())
    }
}

/// Raw arguments supplied by the caller.
#[derive(Clone, Debug, Default)]
pub struct ArgumentBag(BTreeMap<ArgName, String>);

impl ArgumentBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: ArgName, value: impl Into<String>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    pub fn insert(&mut self, name: ArgName, value: impl Into<String>) {
        self.0.insert(name, value.into());
    }

    pub fn contains(&self, name: ArgName) -> bool {
        self.0.contains_key(&name)
    }

    /// Fetch a required argument.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the argument was not supplied.
    pub fn get(&self, name: ArgName) -> Result<&str> {
        self.0
            .get(&name)
            .map(String::as_str)
            .ok_or(CoreError::MissingArgument(name))
    }

    pub fn get_opt(&self, name: ArgName) -> Option<&str> {
        self.0.get(&name).map(String::as_str)
    }
}
