//! Concrete user commands.
//!
//! One command per user-facing mutation; each declares its argument
//! requirement and a pure privilege table, and mutates the entity
//! through its setters only.

use crate::args::{ArgName, ArgumentBag, Requirement};
use crate::error::Result;
use crate::job::{ExecutionContext, JobEnv, Outcome, UserCommand};
use crate::privilege::{Capability, Privilege, Scope};
use crate::user::validate::custom_avatar_path;
use crate::user::{AccessRank, AvatarStyle, User};

/// Privilege table shared by the edit commands: a batch-add execution
/// stands for registration and demands the broader capability.
fn edit_privilege(
    capability: Capability,
    ctx: ExecutionContext,
    target: &User,
) -> Privilege {
    match ctx {
        ExecutionContext::BatchAdd => {
            Privilege::new(Capability::RegisterAccount, Scope::Anonymous)
        },
        ExecutionContext::Normal | ExecutionContext::Batch => Privilege::new(
            capability,
            Scope::Subject(target.name().to_owned()),
        ),
    }
}

/// Create a fresh account.
pub struct RegisterAccount;

impl UserCommand for RegisterAccount {
    fn name(&self) -> &'static str {
        "register-account"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} registered {user}"
    }

    fn requirement(&self) -> Requirement {
        Requirement::of([ArgName::NewUserName, ArgName::NewPassword])
    }

    fn privilege(&self, _ctx: ExecutionContext, _target: &User) -> Privilege {
        Privilege::new(Capability::RegisterAccount, Scope::Anonymous)
    }

    fn creates_target(&self) -> bool {
        true
    }

    fn apply(
        &self,
        user: &mut User,
        args: &ArgumentBag,
        _env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        user.set_name(args.get(ArgName::NewUserName)?);
        user.set_password(args.get(ArgName::NewPassword)?);
        user.set_access_rank(AccessRank::Regular);
        if let Some(email) = args.get_opt(ArgName::NewEmail) {
            user.set_email_unconfirmed(email);
        }

        Ok(Outcome::changed(&[("name", user.name())]))
    }
}

/// Rename an existing user.
pub struct ChangeUserName;

impl UserCommand for ChangeUserName {
    fn name(&self) -> &'static str {
        "change-user-name"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} renamed {old-name} to {new-name}"
    }

    fn requirement(&self) -> Requirement {
        Requirement::of([ArgName::NewUserName])
    }

    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege {
        edit_privilege(Capability::ChangeUserName, ctx, target)
    }

    fn apply(
        &self,
        user: &mut User,
        args: &ArgumentBag,
        _env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        let new_name = args.get(ArgName::NewUserName)?.trim();
        if new_name == user.name() {
            return Ok(Outcome::Unchanged);
        }

        let old_name = user.name().to_owned();
        user.set_name(new_name);
        Ok(Outcome::changed(&[
            ("old-name", old_name.as_str()),
            ("new-name", user.name()),
        ]))
    }
}

/// Change a user's password.
pub struct ChangeUserPassword;

impl UserCommand for ChangeUserPassword {
    fn name(&self) -> &'static str {
        "change-user-password"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} changed {user}'s password"
    }

    fn requirement(&self) -> Requirement {
        Requirement::of([ArgName::NewPassword])
    }

    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege {
        edit_privilege(Capability::ChangeUserPassword, ctx, target)
    }

    fn apply(
        &self,
        user: &mut User,
        args: &ArgumentBag,
        _env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        let plaintext = args.get(ArgName::NewPassword)?;
        if user.password_matches(plaintext) {
            return Ok(Outcome::Unchanged);
        }

        user.set_password(plaintext);
        // Plaintext and hash never reach the audit record.
        Ok(Outcome::changed(&[]))
    }
}

/// Change a user's e-mail address.
pub struct ChangeUserEmail;

impl UserCommand for ChangeUserEmail {
    fn name(&self) -> &'static str {
        "change-user-email"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} changed {user}'s e-mail to {new-email}"
    }

    fn requirement(&self) -> Requirement {
        Requirement::of([ArgName::NewEmail])
    }

    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege {
        edit_privilege(Capability::ChangeUserEmail, ctx, target)
    }

    fn apply(
        &self,
        user: &mut User,
        args: &ArgumentBag,
        _env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        let email = args.get(ArgName::NewEmail)?.trim().to_lowercase();
        let current = user
            .email_unconfirmed()
            .or(user.email_confirmed())
            .unwrap_or_default();
        if email == current {
            return Ok(Outcome::Unchanged);
        }

        // A changed address must be confirmed again.
        user.set_email_unconfirmed(&email);
        user.set_email_confirmed("");
        Ok(Outcome::changed(&[("new-email", email.as_str())]))
    }
}

/// Change a user's access rank.
pub struct ChangeUserRank;

impl UserCommand for ChangeUserRank {
    fn name(&self) -> &'static str {
        "change-user-rank"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} changed {user}'s rank from {old-rank} to {new-rank}"
    }

    fn requirement(&self) -> Requirement {
        Requirement::of([ArgName::NewRank])
    }

    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege {
        edit_privilege(Capability::ChangeUserRank, ctx, target)
    }

    fn apply(
        &self,
        user: &mut User,
        args: &ArgumentBag,
        _env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        let rank = AccessRank::parse(args.get(ArgName::NewRank)?)?;
        if rank == user.access_rank() {
            return Ok(Outcome::Unchanged);
        }

        let old_rank = user.access_rank();
        user.set_access_rank(rank);
        Ok(Outcome::changed(&[
            ("old-rank", old_rank.as_str()),
            ("new-rank", rank.as_str()),
        ]))
    }
}

/// Ban a user.
pub struct BanUser;

impl UserCommand for BanUser {
    fn name(&self) -> &'static str {
        "ban-user"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} banned {user}"
    }

    fn requirement(&self) -> Requirement {
        Requirement::none()
    }

    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege {
        edit_privilege(Capability::BanUser, ctx, target)
    }

    fn apply(
        &self,
        user: &mut User,
        _args: &ArgumentBag,
        _env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        if user.banned() {
            return Ok(Outcome::Unchanged);
        }
        user.set_banned(true);
        Ok(Outcome::changed(&[("banned", "true")]))
    }
}

/// Lift a user's ban.
pub struct UnbanUser;

impl UserCommand for UnbanUser {
    fn name(&self) -> &'static str {
        "unban-user"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} unbanned {user}"
    }

    fn requirement(&self) -> Requirement {
        Requirement::none()
    }

    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege {
        edit_privilege(Capability::UnbanUser, ctx, target)
    }

    fn apply(
        &self,
        user: &mut User,
        _args: &ArgumentBag,
        _env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        if !user.banned() {
            return Ok(Outcome::Unchanged);
        }
        user.set_banned(false);
        Ok(Outcome::changed(&[("banned", "false")]))
    }
}

/// Change a user's avatar style, importing the source image for the
/// custom style.
pub struct ChangeUserAvatar;

impl UserCommand for ChangeUserAvatar {
    fn name(&self) -> &'static str {
        "change-user-avatar"
    }

    fn audit_template(&self) -> &'static str {
        "{actor} changed {user}'s avatar style to {new-avatar-style}"
    }

    fn requirement(&self) -> Requirement {
        Requirement::of([ArgName::NewAvatarStyle])
    }

    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege {
        edit_privilege(Capability::ChangeUserAvatar, ctx, target)
    }

    fn apply(
        &self,
        user: &mut User,
        args: &ArgumentBag,
        env: &JobEnv<'_>,
    ) -> Result<Outcome> {
        let style = AvatarStyle::parse(args.get(ArgName::NewAvatarStyle)?)?;

        match style {
            AvatarStyle::Custom => {
                // A re-upload with the same style still counts as a
                // change, so no short circuit here.
                let source = args.get(ArgName::AvatarSource)?;
                let target = custom_avatar_path(env.config, user.name());
                env.files.copy(source, &target)?;
                env.files.generate_thumbnail(
                    &target,
                    &format!("{target}.thumb"),
                    env.config.avatar.thumbnail_width,
                    env.config.avatar.thumbnail_height,
                )?;
            },
            AvatarStyle::None | AvatarStyle::Gravatar => {
                if style == user.avatar_style() {
                    return Ok(Outcome::Unchanged);
                }
                // Leaving the custom style drops the stored image.
                if user.avatar_style() == AvatarStyle::Custom {
                    let path = custom_avatar_path(env.config, user.name());
                    if env.files.exists(&path) {
                        env.files.remove(&path)?;
                    }
                    let thumb = format!("{path}.thumb");
                    if env.files.exists(&thumb) {
                        env.files.remove(&thumb)?;
                    }
                }
            },
        }

        user.set_avatar_style(style);
        Ok(Outcome::changed(&[("new-avatar-style", style.as_str())]))
    }
}
