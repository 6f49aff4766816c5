//! User domain entity.

pub mod validate;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::{CoreError, Result};

const SALT_BYTES: usize = 16;

/// Access ranks, ordered from least to most privileged.
///
/// `Anonymous` is the in-memory birth state, `Nobody` is reserved;
/// neither may ever reach the persistence layer.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AccessRank {
    #[default]
    Anonymous,
    Nobody,
    Restricted,
    Regular,
    Power,
    Moderator,
    Administrator,
}

impl AccessRank {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Nobody => "nobody",
            Self::Restricted => "restricted",
            Self::Regular => "regular",
            Self::Power => "power",
            Self::Moderator => "moderator",
            Self::Administrator => "administrator",
        }
    }

    /// Converts a string into a valid [`AccessRank`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the string names no known rank.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "anonymous" => Ok(Self::Anonymous),
            "nobody" => Ok(Self::Nobody),
            "restricted" => Ok(Self::Restricted),
            "regular" => Ok(Self::Regular),
            "power" => Ok(Self::Power),
            "moderator" => Ok(Self::Moderator),
            "administrator" => Ok(Self::Administrator),
            other => Err(CoreError::validation(format!(
                "unknown access rank `{other}`"
            ))),
        }
    }

    /// Rank legality at persistence time, matched exhaustively.
    pub fn check_persistable(self) -> Result<()> {
        match self {
            Self::Anonymous => Err(CoreError::InvariantViolation(
                "no access rank detected",
            )),
            Self::Nobody => Err(CoreError::InvariantViolation(
                "reserved access rank used",
            )),
            Self::Restricted
            | Self::Regular
            | Self::Power
            | Self::Moderator
            | Self::Administrator => Ok(()),
        }
    }
}

impl fmt::Display for AccessRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a user's avatar is sourced.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AvatarStyle {
    #[default]
    None,
    Gravatar,
    Custom,
}

impl AvatarStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gravatar => "gravatar",
            Self::Custom => "custom",
        }
    }

    /// Converts a string into a valid [`AvatarStyle`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the string names no known style.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gravatar" => Ok(Self::Gravatar),
            "custom" => Ok(Self::Custom),
            other => Err(CoreError::validation(format!(
                "unknown avatar style `{other}`"
            ))),
        }
    }
}

impl fmt::Display for AvatarStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-user preferences.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings(BTreeMap<String, String>);

impl UserSettings {
    /// Largest accepted number of entries.
    pub const MAX_ENTRIES: usize = 64;
    /// Largest accepted value length.
    pub const MAX_VALUE_LENGTH: usize = 1024;

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Settings invariants: non-empty keys, bounded size.
    pub fn check(&self) -> Result<()> {
        if self.0.len() > Self::MAX_ENTRIES {
            return Err(CoreError::validation("too many settings entries"));
        }
        for (key, value) in &self.0 {
            if key.trim().is_empty() {
                return Err(CoreError::validation("empty settings key"));
            }
            if value.len() > Self::MAX_VALUE_LENGTH {
                return Err(CoreError::validation(format!(
                    "settings value for `{key}` is too long"
                )));
            }
        }
        Ok(())
    }
}

/// Persisted row shape, as the persistence collaborator hands it over.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub password_salt: String,
    pub password_hash: Option<String>,
    pub access_rank: AccessRank,
    pub banned: bool,
    pub email_unconfirmed: Option<String>,
    pub email_confirmed: Option<String>,
    pub staff_confirmed: bool,
    pub join_time: DateTime<Utc>,
    pub last_login_time: Option<DateTime<Utc>>,
    pub avatar_style: AvatarStyle,
    pub settings: UserSettings,
}

/// Represents a registered user within the system domain.
///
/// Fields are mutated exclusively through setters; validation is the
/// orchestrating job's duty and never happens implicitly here.
#[derive(Clone, PartialEq)]
pub struct User {
    id: Option<i64>,
    name: String,
    password_salt: String,
    password_hash: Option<String>,
    /// Plaintext of a just-changed password, kept only for policy checks.
    last_password: Option<String>,
    access_rank: AccessRank,
    banned: bool,
    email_unconfirmed: Option<String>,
    email_confirmed: Option<String>,
    staff_confirmed: bool,
    join_time: DateTime<Utc>,
    last_login_time: Option<DateTime<Utc>>,
    avatar_style: AvatarStyle,
    settings: UserSettings,
}

impl User {
    /// Create a fresh in-memory user: anonymous rank, random salt,
    /// default avatar and settings.
    pub fn fill_new() -> Self {
        let mut bytes = [0u8; SALT_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);

        Self {
            id: None,
            name: String::new(),
            password_salt: hex::encode(bytes),
            password_hash: None,
            last_password: None,
            access_rank: AccessRank::Anonymous,
            banned: false,
            email_unconfirmed: None,
            email_confirmed: None,
            staff_confirmed: false,
            join_time: Utc::now(),
            last_login_time: None,
            avatar_style: AvatarStyle::default(),
            settings: UserSettings::default(),
        }
    }

    /// Hydrate from a persisted row.
    pub fn fill_from_database(row: UserRow) -> Self {
        Self {
            id: Some(row.id),
            name: row.name,
            password_salt: row.password_salt,
            password_hash: row.password_hash,
            last_password: None,
            access_rank: row.access_rank,
            banned: row.banned,
            email_unconfirmed: row.email_unconfirmed,
            email_confirmed: row.email_confirmed,
            staff_confirmed: row.staff_confirmed,
            join_time: row.join_time,
            last_login_time: row.last_login_time,
            avatar_style: row.avatar_style,
            settings: row.settings,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password_salt(&self) -> &str {
        &self.password_salt
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    pub(crate) fn last_password(&self) -> Option<&str> {
        self.last_password.as_deref()
    }

    pub fn access_rank(&self) -> AccessRank {
        self.access_rank
    }

    pub fn banned(&self) -> bool {
        self.banned
    }

    pub fn email_unconfirmed(&self) -> Option<&str> {
        self.email_unconfirmed.as_deref()
    }

    pub fn email_confirmed(&self) -> Option<&str> {
        self.email_confirmed.as_deref()
    }

    pub fn staff_confirmed(&self) -> bool {
        self.staff_confirmed
    }

    pub fn join_time(&self) -> DateTime<Utc> {
        self.join_time
    }

    pub fn last_login_time(&self) -> Option<DateTime<Utc>> {
        self.last_login_time
    }

    pub fn avatar_style(&self) -> AvatarStyle {
        self.avatar_style
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    /// Whether `other` is the same persisted record as this entity.
    pub fn is_same_record(&self, other: &User) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Set the user name, trimmed.
    pub fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_owned();
    }

    /// Set a new password: derives the stored hash from salt and
    /// plaintext, and remembers the plaintext for policy validation.
    pub fn set_password(&mut self, plaintext: &str) {
        self.password_hash =
            Some(derive_password_hash(&self.password_salt, plaintext));
        self.last_password = Some(plaintext.to_owned());
    }

    /// Whether the given plaintext matches the stored hash.
    pub fn password_matches(&self, plaintext: &str) -> bool {
        let hash = derive_password_hash(&self.password_salt, plaintext);
        self.password_hash.as_deref() == Some(hash.as_str())
    }

    pub fn set_access_rank(&mut self, rank: AccessRank) {
        self.access_rank = rank;
    }

    pub fn set_banned(&mut self, banned: bool) {
        self.banned = banned;
    }

    /// Set the unconfirmed e-mail, trimmed and lowercased; an empty
    /// string clears the field.
    pub fn set_email_unconfirmed(&mut self, email: &str) {
        self.email_unconfirmed = normalize_email(email);
    }

    /// Set the confirmed e-mail, trimmed and lowercased; an empty
    /// string clears the field.
    pub fn set_email_confirmed(&mut self, email: &str) {
        self.email_confirmed = normalize_email(email);
    }

    pub fn set_staff_confirmed(&mut self, confirmed: bool) {
        self.staff_confirmed = confirmed;
    }

    pub fn set_last_login_time(&mut self, time: DateTime<Utc>) {
        self.last_login_time = Some(time);
    }

    pub fn set_avatar_style(&mut self, style: AvatarStyle) {
        self.avatar_style = style;
    }

    pub fn set_setting(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.settings.set(key, value);
    }

    /// Assign the identifier after the persistence layer allocated one.
    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Snapshot for the persistence collaborator.
    pub fn to_row(&self, id: i64) -> UserRow {
        UserRow {
            id,
            name: self.name.clone(),
            password_salt: self.password_salt.clone(),
            password_hash: self.password_hash.clone(),
            access_rank: self.access_rank,
            banned: self.banned,
            email_unconfirmed: self.email_unconfirmed.clone(),
            email_confirmed: self.email_confirmed.clone(),
            staff_confirmed: self.staff_confirmed,
            join_time: self.join_time,
            last_login_time: self.last_login_time,
            avatar_style: self.avatar_style,
            settings: self.settings.clone(),
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("password", &"[REDACTED]")
            .field("access_rank", &self.access_rank)
            .field("banned", &self.banned)
            .field("email_unconfirmed", &self.email_unconfirmed)
            .field("email_confirmed", &self.email_confirmed)
            .field("staff_confirmed", &self.staff_confirmed)
            .field("avatar_style", &self.avatar_style)
            .finish()
    }
}

fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() { None } else { Some(email) }
}

fn derive_password_hash(salt: &str, plaintext: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(salt.as_bytes());
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}
