//! User entity validation pipeline.
//!
//! Ordered, fail-fast invariant checks run by the orchestrating job
//! before any persistence. Validation only reads from the persistence
//! collaborator; it never writes.

use regex_lite::Regex;

use crate::config::Configuration;
use crate::error::{CoreError, Result};
use crate::ports::{FileStore, UserRepository};
use crate::user::{AccessRank, AvatarStyle, User};

/// Storage path of a user's custom avatar source image.
pub fn custom_avatar_path(config: &Configuration, name: &str) -> String {
    format!("{}/{}.png", config.avatar.directory, name.to_lowercase())
}

/// Run the full validation pipeline against the entity's current state.
///
/// The first failing check raises immediately; later checks are skipped.
pub fn validate_user(
    user: &User,
    repo: &dyn UserRepository,
    files: &dyn FileStore,
    config: &Configuration,
) -> Result<()> {
    validate_name(user, repo, config)?;
    validate_password(user, config)?;

    // Reserved rank is a caller bug; the anonymity sentinel is
    // cross-checked last so field errors surface first.
    if user.access_rank() != AccessRank::Anonymous {
        user.access_rank().check_persistable()?;
    }

    validate_email(user, repo, config, user.email_unconfirmed())?;
    validate_email(user, repo, config, user.email_confirmed())?;

    user.settings().check()?;
    validate_avatar(user, files, config)?;

    user.access_rank().check_persistable()
}

fn validate_name(
    user: &User,
    repo: &dyn UserRepository,
    config: &Configuration,
) -> Result<()> {
    let policy = &config.registration;
    let name = user.name();

    if name.chars().count() < policy.user_name_min_length {
        return Err(CoreError::validation(format!(
            "user name must have at least {} characters",
            policy.user_name_min_length
        )));
    }
    if name.chars().count() > policy.user_name_max_length {
        return Err(CoreError::validation(format!(
            "user name must have at most {} characters",
            policy.user_name_max_length
        )));
    }
    if !full_match(&policy.user_name_regex, name)? {
        return Err(CoreError::validation(
            "user name contains invalid characters",
        ));
    }

    if let Some(other) = repo.find_by_name(name)? {
        if !other.is_same_record(user) {
            return Err(duplicate_error("name", &other, config));
        }
    }

    Ok(())
}

fn validate_password(user: &User, config: &Configuration) -> Result<()> {
    if user.password_hash().is_none_or(str::is_empty) {
        return Err(CoreError::validation("no password set"));
    }

    // Policy checks apply to the plaintext, never the hash, so they can
    // only run when the password was just changed.
    if let Some(plaintext) = user.last_password() {
        let policy = &config.registration;
        if plaintext.chars().count() < policy.password_min_length {
            return Err(CoreError::validation(format!(
                "password must have at least {} characters",
                policy.password_min_length
            )));
        }
        if !full_match(&policy.password_regex, plaintext)? {
            return Err(CoreError::validation(
                "password contains invalid characters",
            ));
        }
    }

    Ok(())
}

fn validate_email(
    user: &User,
    repo: &dyn UserRepository,
    config: &Configuration,
    email: Option<&str>,
) -> Result<()> {
    let Some(email) = email else {
        return Ok(());
    };

    if !(email.contains('@') && email.split('@').count() == 2) {
        return Err(CoreError::validation(format!(
            "`{email}` is not a valid e-mail address"
        )));
    }

    if let Some(other) = repo.find_by_email(email)? {
        if !other.is_same_record(user) {
            return Err(duplicate_error("e-mail", &other, config));
        }
    }

    Ok(())
}

fn validate_avatar(
    user: &User,
    files: &dyn FileStore,
    config: &Configuration,
) -> Result<()> {
    match user.avatar_style() {
        AvatarStyle::None | AvatarStyle::Gravatar => Ok(()),
        AvatarStyle::Custom => {
            let path = custom_avatar_path(config, user.name());
            if files.exists(&path) {
                Ok(())
            } else {
                Err(CoreError::validation(
                    "custom avatar source image is missing",
                ))
            }
        },
    }
}

/// Duplicate-user policy: the message depends on the state of the
/// *other* (conflicting) record, most specific variant first. The
/// priority order is deliberate and must not be reshuffled.
fn duplicate_error(
    field: &str,
    other: &User,
    config: &Configuration,
) -> CoreError {
    let policy = &config.registration;

    if other.email_confirmed().is_none() && policy.need_email_activation {
        CoreError::validation(format!(
            "user with this {field} is awaiting e-mail confirmation"
        ))
    } else if !other.staff_confirmed() && policy.need_staff_activation {
        CoreError::validation(format!(
            "user with this {field} is awaiting staff confirmation"
        ))
    } else {
        CoreError::validation(format!(
            "user with this {field} is already registered"
        ))
    }
}

fn full_match(pattern: &str, value: &str) -> Result<bool> {
    let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|_| {
        CoreError::InvariantViolation("malformed pattern in configuration")
    })?;
    Ok(re.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mem::{MemoryFiles, MemoryRepository};

    fn valid_user(name: &str) -> User {
        let mut user = User::fill_new();
        user.set_name(name);
        user.set_password("sturdy-pass");
        user.set_access_rank(AccessRank::Regular);
        user
    }

    fn check(user: &User, repo: &MemoryRepository) -> Result<()> {
        let files = MemoryFiles::new();
        validate_user(user, repo, &files, &Configuration::default())
    }

    fn validation_message(err: CoreError) -> String {
        match err {
            CoreError::Validation(message) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_user_passes() {
        let repo = MemoryRepository::new();
        assert!(check(&valid_user("alice"), &repo).is_ok());
    }

    #[test]
    fn test_name_length_and_pattern() {
        let repo = MemoryRepository::new();

        let short = valid_user("a");
        assert!(check(&short, &repo).is_err());

        let long = valid_user(&"a".repeat(64));
        assert!(check(&long, &repo).is_err());

        let odd = valid_user("al ice!");
        let message = validation_message(check(&odd, &repo).unwrap_err());
        assert!(message.contains("invalid characters"));
    }

    #[test]
    fn test_missing_password_hash_fails() {
        let repo = MemoryRepository::new();
        let mut user = User::fill_new();
        user.set_name("alice");
        user.set_access_rank(AccessRank::Regular);

        let message = validation_message(check(&user, &repo).unwrap_err());
        assert_eq!(message, "no password set");
    }

    #[test]
    fn test_short_plaintext_fails_only_when_just_changed() {
        let repo = MemoryRepository::new();
        let mut user = valid_user("alice");
        user.set_password("tiny");
        assert!(check(&user, &repo).is_err());

        // Hydrated entities carry no plaintext, so old short passwords
        // do not block unrelated edits.
        let store = MemoryRepository::new();
        let mut seeded = valid_user("alice");
        seeded.set_password("tiny");
        store.seed(&mut seeded);
        let hydrated = store.find_by_name("alice").unwrap().unwrap();
        assert!(check(&hydrated, &store).is_ok());
    }

    #[test]
    fn test_reserved_and_anonymous_ranks_fail() {
        let repo = MemoryRepository::new();

        let mut user = valid_user("alice");
        user.set_access_rank(AccessRank::Nobody);
        assert!(matches!(
            check(&user, &repo),
            Err(CoreError::InvariantViolation("reserved access rank used"))
        ));

        user.set_access_rank(AccessRank::Anonymous);
        assert!(matches!(
            check(&user, &repo),
            Err(CoreError::InvariantViolation("no access rank detected"))
        ));
    }

    #[test]
    fn test_anonymous_rank_is_checked_after_field_errors() {
        let repo = MemoryRepository::new();
        let mut user = valid_user("alice");
        user.set_access_rank(AccessRank::Anonymous);
        user.set_email_unconfirmed("not-an-email");

        // The malformed e-mail surfaces before the rank cross-check.
        assert!(matches!(
            check(&user, &repo),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_email_format() {
        let repo = MemoryRepository::new();
        let mut user = valid_user("alice");
        user.set_email_unconfirmed("alice@example.com");
        assert!(check(&user, &repo).is_ok());

        user.set_email_unconfirmed("alice@@example.com");
        assert!(check(&user, &repo).is_err());
    }

    #[test]
    fn test_duplicate_name_detected_against_other_record() {
        let repo = MemoryRepository::new();
        let mut existing = valid_user("alice");
        repo.seed(&mut existing);

        let intruder = valid_user("ALICE");
        let message =
            validation_message(check(&intruder, &repo).unwrap_err());
        assert_eq!(message, "user with this name is already registered");
    }

    #[test]
    fn test_own_record_is_not_a_duplicate() {
        let repo = MemoryRepository::new();
        let mut existing = valid_user("alice");
        existing.set_email_confirmed("alice@example.com");
        repo.seed(&mut existing);

        assert!(check(&existing, &repo).is_ok());
    }

    #[test]
    fn test_duplicate_message_priority_order() {
        let mut config = Configuration::default();
        config.registration.need_email_activation = true;
        config.registration.need_staff_activation = true;

        let repo = MemoryRepository::new();
        let mut other = valid_user("alice");
        repo.seed(&mut other);
        let files = MemoryFiles::new();

        // (a) unconfirmed e-mail wins over everything.
        let intruder = valid_user("alice");
        let err = validate_user(&intruder, &repo, &files, &config)
            .unwrap_err();
        assert_eq!(
            validation_message(err),
            "user with this name is awaiting e-mail confirmation"
        );

        // (b) staff confirmation comes next.
        other.set_email_confirmed("alice@example.com");
        repo.seed(&mut other);
        let err = validate_user(&intruder, &repo, &files, &config)
            .unwrap_err();
        assert_eq!(
            validation_message(err),
            "user with this name is awaiting staff confirmation"
        );

        // (c) generic message once the other record is fully confirmed.
        other.set_staff_confirmed(true);
        repo.seed(&mut other);
        let err = validate_user(&intruder, &repo, &files, &config)
            .unwrap_err();
        assert_eq!(
            validation_message(err),
            "user with this name is already registered"
        );
    }

    #[test]
    fn test_duplicate_email_uses_same_policy() {
        let repo = MemoryRepository::new();
        let mut other = valid_user("alice");
        other.set_email_confirmed("alice@example.com");
        other.set_staff_confirmed(true);
        repo.seed(&mut other);

        let mut intruder = valid_user("bob");
        intruder.set_email_unconfirmed("alice@example.com");
        let message =
            validation_message(check(&intruder, &repo).unwrap_err());
        assert_eq!(message, "user with this e-mail is already registered");
    }

    #[test]
    fn test_settings_invariants_enforced() {
        use crate::user::UserSettings;

        let repo = MemoryRepository::new();

        let mut user = valid_user("alice");
        user.set_setting("", "dark");
        let message = validation_message(check(&user, &repo).unwrap_err());
        assert_eq!(message, "empty settings key");

        let mut user = valid_user("alice");
        for i in 0..=UserSettings::MAX_ENTRIES {
            user.set_setting(format!("key-{i}"), "value");
        }
        let message = validation_message(check(&user, &repo).unwrap_err());
        assert_eq!(message, "too many settings entries");

        let mut user = valid_user("alice");
        user.set_setting(
            "theme",
            "x".repeat(UserSettings::MAX_VALUE_LENGTH + 1),
        );
        let message = validation_message(check(&user, &repo).unwrap_err());
        assert!(message.contains("too long"));
    }

    #[test]
    fn test_custom_avatar_requires_source_image() {
        let repo = MemoryRepository::new();
        let config = Configuration::default();
        let files = MemoryFiles::new();

        let mut user = valid_user("alice");
        user.set_avatar_style(AvatarStyle::Custom);
        assert!(validate_user(&user, &repo, &files, &config).is_err());

        files.touch(custom_avatar_path(&config, "alice"));
        assert!(validate_user(&user, &repo, &files, &config).is_ok());
    }
}
