//! Job abstraction: self-describing, privilege-checked units of
//! mutation work, plus the batch wrapper running many of them inside
//! one transaction.

pub mod retriever;
pub mod users;

use std::collections::BTreeMap;

use crate::args::{ArgumentBag, Requirement};
use crate::config::Configuration;
use crate::error::{CoreError, Result};
use crate::job::retriever::UserRetriever;
use crate::ports::{
    AuditLog, FileStore, SessionProvider, UserRepository,
};
use crate::privilege::{Privilege, check_privilege};
use crate::user::User;
use crate::user::validate::validate_user;

/// Mode flag altering a job's persistence and privilege behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Ordinary single execution: validate, persist inline, audit.
    Normal,
    /// Execution inside a batch transaction; no audit records.
    Batch,
    /// Batch execution that stands for account registration, demanding
    /// the broader registration capability.
    BatchAdd,
}

/// What a command's mutation did to the entity.
pub enum Outcome {
    /// State changed; the fields feed the audit record.
    Changed(BTreeMap<String, String>),
    /// No-op relative to current state.
    Unchanged,
}

impl Outcome {
    /// Convenience for single-field audit records.
    pub fn changed(fields: &[(&str, &str)]) -> Self {
        Self::Changed(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }
}

/// Everything a job needs from the outside world.
pub struct JobEnv<'a> {
    pub repo: &'a dyn UserRepository,
    pub files: &'a dyn FileStore,
    pub audit: &'a dyn AuditLog,
    pub session: &'a dyn SessionProvider,
    pub config: &'a Configuration,
}

/// A self-describing, privilege-checked unit of mutation work.
///
/// Commands are single-use by construction: [`execute`] consumes the
/// value, so a second invocation is a compile error.
pub trait UserCommand {
    /// Stable name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Template of the audit record emitted on a state change.
    fn audit_template(&self) -> &'static str;

    /// Arguments this command needs beyond target resolution.
    fn requirement(&self) -> Requirement;

    /// Pure privilege table: execution context and target decide the
    /// required (capability, scope) pair.
    fn privilege(&self, ctx: ExecutionContext, target: &User) -> Privilege;

    /// Mutate the entity through its setters only.
    fn apply(
        &self,
        user: &mut User,
        args: &ArgumentBag,
        env: &JobEnv<'_>,
    ) -> Result<Outcome>;

    /// Whether this command creates its target instead of retrieving it.
    fn creates_target(&self) -> bool {
        false
    }
}

/// Execute one command to completion.
///
/// Order of operations: argument check, target resolution, privilege
/// check, mutation, no-op short circuit, validation, persistence,
/// audit. Any failure aborts with no partial writes.
pub fn execute<C: UserCommand>(
    cmd: C,
    env: &JobEnv<'_>,
    ctx: ExecutionContext,
    args: &ArgumentBag,
) -> Result<User> {
    let retriever = UserRetriever::new();
    let requirement = if cmd.creates_target() {
        cmd.requirement()
    } else {
        Requirement::conjunction([
            retriever.requirement().into(),
            cmd.requirement().into(),
        ])
    };
    // Checked before retrieval, so a missing argument never leaves
    // partial side effects.
    requirement.verify(args)?;

    let mut user = if cmd.creates_target() {
        User::fill_new()
    } else {
        retriever.retrieve(env.repo, args)?
    };

    let required = cmd.privilege(ctx, &user);
    let actor = env.session.current();
    if !check_privilege(&actor.privileges, &required) {
        return Err(CoreError::AccessDenied(required));
    }

    let fields = match cmd.apply(&mut user, args, env)? {
        Outcome::Unchanged => {
            tracing::debug!(command = cmd.name(), "no-op, nothing persisted");
            return Ok(user);
        },
        Outcome::Changed(fields) => fields,
    };

    // Validation precedes every write, in every context. Batch contexts
    // persist per item inside the transaction opened by the wrapper.
    validate_user(&user, env.repo, env.files, env.config)?;
    env.repo.save(&mut user)?;

    if ctx == ExecutionContext::Normal {
        let mut record = fields;
        record.insert("actor".to_owned(), actor.scope.to_string());
        record.insert("user".to_owned(), user.name().to_owned());
        if let Some(time) = user.last_login_time() {
            record.insert("last-login".to_owned(), time.to_rfc3339());
        }
        if let Err(err) = env.audit.log(cmd.audit_template(), &record) {
            tracing::warn!(
                command = cmd.name(),
                error = %err,
                "audit sink failed, record dropped"
            );
        }
    }

    Ok(user)
}

/// Run `count` command executions inside a single transaction.
///
/// Any failure rolls the whole batch back and propagates; results come
/// back in execution order. A zero count opens no transaction at all.
pub fn run_multiple<C, F>(
    env: &JobEnv<'_>,
    ctx: ExecutionContext,
    mut factory: F,
    count: usize,
) -> Result<Vec<User>>
where
    C: UserCommand,
    F: FnMut(usize) -> (C, ArgumentBag),
{
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut results = Vec::with_capacity(count);
    let mut index = 1;
    env.repo.run_in_transaction(&mut || {
        while index <= count {
            let (cmd, args) = factory(index);
            results.push(execute(cmd, env, ctx, &args)?);
            index += 1;
        }
        Ok(())
    })?;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::users::{ChangeUserName, RegisterAccount};
    use super::*;
    use crate::args::ArgName;
    use crate::ports::Actor;
    use crate::ports::mem::{
        MemoryFiles, MemoryRepository, RecordingAudit, StaticSession,
    };
    use crate::privilege::{Capability, Scope};
    use crate::user::AccessRank;

    struct FailingAudit;

    impl AuditLog for FailingAudit {
        fn log(
            &self,
            _template: &str,
            _fields: &BTreeMap<String, String>,
        ) -> Result<()> {
            Err(CoreError::validation("audit sink down"))
        }
    }

    struct Fixture {
        repo: MemoryRepository,
        files: MemoryFiles,
        audit: RecordingAudit,
        session: StaticSession,
        config: Configuration,
    }

    impl Fixture {
        fn staff() -> Self {
            let actor = Actor::new(
                Scope::Any,
                vec![
                    Privilege::new(Capability::ChangeUserName, Scope::Any),
                    Privilege::new(Capability::RegisterAccount, Scope::Any),
                ],
            );
            Self {
                repo: MemoryRepository::new(),
                files: MemoryFiles::new(),
                audit: RecordingAudit::new(),
                session: StaticSession::new(actor),
                config: Configuration::default(),
            }
        }

        fn env(&self) -> JobEnv<'_> {
            JobEnv {
                repo: &self.repo,
                files: &self.files,
                audit: &self.audit,
                session: &self.session,
                config: &self.config,
            }
        }

        fn seed(&self, name: &str) -> User {
            let mut user = User::fill_new();
            user.set_name(name);
            user.set_password("sturdy-pass");
            user.set_access_rank(AccessRank::Regular);
            self.repo.seed(&mut user);
            user
        }
    }

    fn rename_args(from: &str, to: &str) -> ArgumentBag {
        ArgumentBag::new()
            .with(ArgName::UserName, from)
            .with(ArgName::NewUserName, to)
    }

    #[test]
    fn test_missing_argument_causes_no_mutation() {
        let fx = Fixture::staff();
        fx.seed("alice");

        let args = ArgumentBag::new().with(ArgName::UserName, "alice");
        let err = execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Normal,
            &args,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CoreError::MissingArgument(ArgName::NewUserName)
        ));
        assert_eq!(fx.repo.save_count(), 0);
        assert!(fx.audit.is_empty());
    }

    #[test]
    fn test_rename_persists_and_audits() {
        let fx = Fixture::staff();
        fx.seed("alice");

        let user = execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Normal,
            &rename_args("alice", "alicia"),
        )
        .unwrap();

        assert_eq!(user.name(), "alicia");
        assert_eq!(fx.repo.save_count(), 1);
        assert_eq!(fx.audit.len(), 1);

        let (_, fields) = &fx.audit.records()[0];
        assert_eq!(fields.get("new-name").map(String::as_str), Some("alicia"));
        assert_eq!(fields.get("actor").map(String::as_str), Some("any"));
    }

    #[test]
    fn test_audit_record_carries_last_login_when_known() {
        let fx = Fixture::staff();
        let mut user = fx.seed("alice");
        user.set_last_login_time(chrono::Utc::now());
        fx.repo.seed(&mut user);

        execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Normal,
            &rename_args("alice", "alicia"),
        )
        .unwrap();

        let (_, fields) = &fx.audit.records()[0];
        assert!(fields.contains_key("last-login"));
    }

    #[test]
    fn test_rename_to_same_name_is_noop() {
        let fx = Fixture::staff();
        fx.seed("alice");

        let user = execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Normal,
            &rename_args("alice", " alice "),
        )
        .unwrap();

        assert_eq!(user.name(), "alice");
        assert_eq!(fx.repo.save_count(), 0);
        assert!(fx.audit.is_empty());
    }

    #[test]
    fn test_privilege_denied_before_mutation() {
        let mut fx = Fixture::staff();
        fx.session = StaticSession::new(Actor::new(
            Scope::Subject("bob".to_owned()),
            vec![Privilege::new(
                Capability::ChangeUserName,
                Scope::Subject("bob".to_owned()),
            )],
        ));
        fx.seed("alice");

        let err = execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Normal,
            &rename_args("alice", "alicia"),
        )
        .unwrap_err();

        assert!(matches!(err, CoreError::AccessDenied(_)));
        assert_eq!(fx.repo.save_count(), 0);
    }

    #[test]
    fn test_self_service_rename_allowed() {
        let mut fx = Fixture::staff();
        fx.session = StaticSession::new(Actor::new(
            Scope::Subject("alice".to_owned()),
            vec![Privilege::new(
                Capability::ChangeUserName,
                Scope::Subject("alice".to_owned()),
            )],
        ));
        fx.seed("alice");

        let user = execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Normal,
            &rename_args("alice", "alicia"),
        )
        .unwrap();
        assert_eq!(user.name(), "alicia");
    }

    #[test]
    fn test_batch_add_context_swaps_required_capability() {
        // Holding only the registration capability: renames pass under
        // BatchAdd but are denied in Normal context.
        let mut fx = Fixture::staff();
        fx.session = StaticSession::new(Actor::new(
            Scope::Any,
            vec![Privilege::new(
                Capability::RegisterAccount,
                Scope::Anonymous,
            )],
        ));
        fx.seed("alice");

        let err = execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Normal,
            &rename_args("alice", "alicia"),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied(_)));

        let user = execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::BatchAdd,
            &rename_args("alice", "alicia"),
        )
        .unwrap();
        assert_eq!(user.name(), "alicia");
    }

    #[test]
    fn test_batch_executions_do_not_audit() {
        let fx = Fixture::staff();
        fx.seed("alice");

        execute(
            ChangeUserName,
            &fx.env(),
            ExecutionContext::Batch,
            &rename_args("alice", "alicia"),
        )
        .unwrap();

        assert_eq!(fx.repo.save_count(), 1);
        assert!(fx.audit.is_empty());
    }

    #[test]
    fn test_audit_failure_does_not_abort() {
        let fx = Fixture::staff();
        fx.seed("alice");
        let audit = FailingAudit;
        let env = JobEnv { audit: &audit, ..fx.env() };

        let user = execute(
            ChangeUserName,
            &env,
            ExecutionContext::Normal,
            &rename_args("alice", "alicia"),
        )
        .unwrap();

        assert_eq!(user.name(), "alicia");
        assert_eq!(fx.repo.save_count(), 1);
    }

    #[test]
    fn test_run_multiple_rolls_back_whole_batch() {
        let fx = Fixture::staff();
        let env = fx.env();

        // The third registration reuses the first name and fails
        // validation; nothing at all may stay persisted.
        let err = run_multiple(
            &env,
            ExecutionContext::BatchAdd,
            |i| {
                let name =
                    if i == 3 { "user-1".to_owned() } else { format!("user-{i}") };
                let args = ArgumentBag::new()
                    .with(ArgName::NewUserName, name)
                    .with(ArgName::NewPassword, "sturdy-pass");
                (RegisterAccount, args)
            },
            5,
        )
        .unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(fx.repo.count(), 0);
        assert_eq!(fx.repo.transaction_count(), 1);
    }

    #[test]
    fn test_run_multiple_success_returns_in_order() {
        let fx = Fixture::staff();

        let users = run_multiple(
            &fx.env(),
            ExecutionContext::BatchAdd,
            |i| {
                let args = ArgumentBag::new()
                    .with(ArgName::NewUserName, format!("user-{i}"))
                    .with(ArgName::NewPassword, "sturdy-pass");
                (RegisterAccount, args)
            },
            3,
        )
        .unwrap();

        assert_eq!(
            users.iter().map(User::name).collect::<Vec<_>>(),
            ["user-1", "user-2", "user-3"]
        );
        assert_eq!(fx.repo.count(), 3);
        assert!(fx.audit.is_empty());
    }

    #[test]
    fn test_run_multiple_zero_skips_transaction() {
        let fx = Fixture::staff();

        let users = run_multiple(
            &fx.env(),
            ExecutionContext::Batch,
            |_| (ChangeUserName, ArgumentBag::new()),
            0,
        )
        .unwrap();

        assert!(users.is_empty());
        assert_eq!(fx.repo.transaction_count(), 0);
    }
}
