//! Run control: one CLI invocation end to end.
//!
//! Validates what the workflow needs, runs the database reset when asked,
//! resolves the account batch, gates on server readiness, then works the
//! batch strictly in order over one session per account. Per-account
//! failures are recorded and the batch keeps going; only environmental
//! failures abort the run.

use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::classify::{classify, AccountAction, Outcome};
use crate::errors::AdmError;
use crate::planner::{self, Account};
use crate::probe;
use crate::reset::{self, ResetPlan};
use crate::secrets::SecretStore;
use crate::services::{self, UnitAction, DEPENDENT_UNITS, IRCD_UNIT};
use crate::session::{AccountCommand, Pacing, Session, SessionOptions};

/// Readiness budget before a routine batch; the server is expected to be
/// up already.
pub const PRE_BATCH_READINESS: Duration = Duration::from_secs(10);

/// What a failed account-credential fetch does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CredentialPolicy {
    /// Abort the whole run.
    Abort,
    /// Record an error for that account and keep going.
    Skip,
}

/// The selected workflow, with its optional account filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAction {
    List { user: Option<String> },
    Register { user: Option<String> },
    Unregister { user: String },
    ResetAll { user: Option<String> },
}

impl RunAction {
    pub fn user(&self) -> Option<&str> {
        match self {
            Self::List { user } | Self::Register { user } | Self::ResetAll { user } => {
                user.as_deref()
            }
            Self::Unregister { user } => Some(user),
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::ResetAll { .. } => "reset",
        }
    }
}

/// Everything one invocation needs besides the action itself.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub project: String,
    /// Secret holding the operator password.
    pub oper_secret: String,
    pub session: SessionOptions,
    pub reset: ResetPlan,
    pub credential_policy: CredentialPolicy,
    pub dry_run: bool,
    pub skip_restart: bool,
}

/// Result of one account operation.
#[derive(Debug)]
pub struct OperationResult {
    pub username: String,
    pub outcome: Outcome,
    /// Failure detail when the session never produced a transcript.
    pub detail: Option<String>,
}

/// Ordered per-account outcomes for one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Usernames the planner resolved, in processing order.
    pub planned: Vec<String>,
    pub results: Vec<OperationResult>,
}

impl RunSummary {
    /// Log one `<user>: <outcome>` line per account, in plan order.
    pub fn report(&self) {
        for result in &self.results {
            match &result.detail {
                Some(detail) => info!("{}: {} ({})", result.username, result.outcome, detail),
                None => info!("{}: {}", result.username, result.outcome),
            }
        }
    }
}

/// Execute one invocation end to end.
pub async fn run(
    action: &RunAction,
    cfg: &RunConfig,
    store: &dyn SecretStore,
    pacing: &dyn Pacing,
) -> Result<RunSummary, AdmError> {
    if let RunAction::ResetAll { .. } = action {
        if cfg.dry_run {
            info!(
                "dry-run: would stop {} and {}, back up {}, run initdb, start {}",
                DEPENDENT_UNITS.join("/"),
                IRCD_UNIT,
                cfg.reset.database.display(),
                IRCD_UNIT
            );
        } else {
            info!("resetting the account database");
            reset::reset_all(&cfg.reset).await?;
        }
    }

    let accounts = planner::plan(store, &cfg.project, action.user()).await?;
    let mut summary = RunSummary {
        planned: accounts.iter().map(|a| a.username.clone()).collect(),
        results: Vec::new(),
    };
    info!(
        "will {} {} account(s): {}",
        action.verb(),
        accounts.len(),
        summary.planned.join(", ")
    );

    let mutation = match action {
        RunAction::List { .. } => return Ok(summary),
        RunAction::Register { .. } | RunAction::ResetAll { .. } => AccountAction::Register,
        RunAction::Unregister { .. } => AccountAction::Unregister,
    };

    if cfg.dry_run {
        info!("dry-run: stopping before any changes");
        return Ok(summary);
    }

    // The reset path has just verified readiness itself.
    if !matches!(action, RunAction::ResetAll { .. }) {
        probe::wait_for_port(&cfg.session.host, cfg.session.port, PRE_BATCH_READINESS).await?;
    }

    let oper_credential = store.access(&cfg.project, &cfg.oper_secret).await?;

    for account in &accounts {
        let result =
            run_account(account, mutation, &oper_credential, cfg, store, pacing).await?;
        summary.results.push(result);
    }

    summary.report();

    if cfg.skip_restart {
        debug!("skipping dependent unit restarts");
    } else {
        for unit in DEPENDENT_UNITS {
            services::systemctl_lenient(UnitAction::Restart, unit).await;
        }
    }

    Ok(summary)
}

/// One account through one session.
///
/// Returns `Err` only for failures the configured policy treats as fatal;
/// everything else becomes this account's result so the batch continues.
async fn run_account(
    account: &Account,
    action: AccountAction,
    oper_credential: &SecretString,
    cfg: &RunConfig,
    store: &dyn SecretStore,
    pacing: &dyn Pacing,
) -> Result<OperationResult, AdmError> {
    let command = match action {
        AccountAction::Register => {
            let password = match store.access(&cfg.project, &account.credential).await {
                Ok(password) => password,
                Err(e) => {
                    return match cfg.credential_policy {
                        CredentialPolicy::Abort => Err(e),
                        CredentialPolicy::Skip => {
                            warn!("{}: {}", account.username, e);
                            Ok(OperationResult {
                                username: account.username.clone(),
                                outcome: Outcome::Error,
                                detail: Some(e.to_string()),
                            })
                        }
                    }
                }
            };
            AccountCommand::Register {
                username: account.username.clone(),
                password,
            }
        }
        AccountAction::Unregister => AccountCommand::Drop {
            username: account.username.clone(),
        },
    };

    let session = match Session::open(&cfg.session).await {
        Ok(session) => session,
        Err(e) => {
            warn!("{}: {}", account.username, e);
            return Ok(OperationResult {
                username: account.username.clone(),
                outcome: Outcome::Error,
                detail: Some(e.to_string()),
            });
        }
    };

    let transcript = session.run(oper_credential, &command, pacing).await;
    debug!("{} transcript:\n{}", account.username, transcript);

    Ok(OperationResult {
        username: account.username.clone(),
        outcome: classify(&transcript, action),
        detail: None,
    })
}
