//! Privilege model: who may do what to whom.

use std::fmt;

/// Actions a caller may be allowed to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    RegisterAccount,
    ChangeUserName,
    ChangeUserPassword,
    ChangeUserEmail,
    ChangeUserRank,
    ChangeUserAvatar,
    BanUser,
    UnbanUser,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegisterAccount => "register-account",
            Self::ChangeUserName => "change-user-name",
            Self::ChangeUserPassword => "change-user-password",
            Self::ChangeUserEmail => "change-user-email",
            Self::ChangeUserRank => "change-user-rank",
            Self::ChangeUserAvatar => "change-user-avatar",
            Self::BanUser => "ban-user",
            Self::UnbanUser => "unban-user",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity a privilege is scoped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Unauthenticated caller, or a target that is nobody in particular.
    Anonymous,
    /// One specific user, referenced by name.
    Subject(String),
    /// Global staff scope, subsumes any target.
    Any,
}

impl Scope {
    /// Whether a held scope covers a required one.
    ///
    /// `Any` covers everything; `Subject` covers only the same subject.
    pub fn subsumes(&self, required: &Scope) -> bool {
        match (self, required) {
            (Scope::Any, _) => true,
            (Scope::Anonymous, Scope::Anonymous) => true,
            (Scope::Subject(held), Scope::Subject(wanted)) => held == wanted,
            _ => false,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Subject(name) => write!(f, "{name}"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// A (capability, identity-scope) pair.
///
/// Meaningless without both fields, so there is no partial constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Privilege {
    pub capability: Capability,
    pub scope: Scope,
}

impl Privilege {
    pub fn new(capability: Capability, scope: Scope) -> Self {
        Self { capability, scope }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.capability, self.scope)
    }
}

/// Pure predicate: does the held set cover the required privilege?
///
/// The capability must match exactly on some held privilege whose scope
/// equals or subsumes the required scope. Turning `false` into an
/// `AccessDenied` error is the job runner's business.
pub fn check_privilege(held: &[Privilege], required: &Privilege) -> bool {
    held.iter().any(|h| {
        h.capability == required.capability && h.scope.subsumes(&required.scope)
    })
}
