//! Command-line surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::reset::ResetPlan;
use crate::runner::{CredentialPolicy, RunAction, RunConfig};
use crate::services::IRCD_USER;
use crate::session::SessionOptions;

#[derive(Debug, Parser)]
#[command(name = "ircadm")]
#[command(about = "Account provisioning and database reset for an Ergo IRC network")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Google Cloud project holding the credential secrets
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    pub project: String,

    /// Secret holding the operator password
    #[arg(long, default_value = "oper-password")]
    pub oper_secret: String,

    /// IRC server host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// IRC server TLS port
    #[arg(long, default_value_t = 6697)]
    pub port: u16,

    /// Verify the server certificate against the platform trust store
    /// (self-hosted servers usually run self-signed, so this is off by
    /// default)
    #[arg(long)]
    pub verify_tls: bool,

    /// Per-session budget in seconds
    #[arg(long, default_value_t = 15)]
    pub timeout: u64,

    /// Ergo binary, used by reset-all to reinitialize the database
    #[arg(long, default_value = "/usr/local/bin/ergo")]
    pub ergo_bin: PathBuf,

    /// Ergo configuration file
    #[arg(long, default_value = "/etc/ergo/ircd.yaml")]
    pub ergo_conf: PathBuf,

    /// Ergo account database
    #[arg(long, default_value = "/var/lib/ergo/ircd.db")]
    pub ergo_db: PathBuf,

    /// What a failed account-credential fetch does to the run
    #[arg(long, value_enum, default_value_t = CredentialPolicy::Abort)]
    pub on_credential_error: CredentialPolicy,

    /// Plan and report only: no connections, no execs, no file changes
    #[arg(long)]
    pub dry_run: bool,

    /// Leave the dependent units alone after the run
    #[arg(long)]
    pub skip_restart: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the accounts the credential store resolves to
    List {
        /// Only this account
        #[arg(long)]
        user: Option<String>,
    },

    /// Register accounts through NickServ as an operator
    Register {
        /// Only this account (default: every discovered credential)
        #[arg(long)]
        user: Option<String>,
    },

    /// Drop one account through NickServ as an operator
    Unregister {
        /// The account to drop
        #[arg(long)]
        user: String,
    },

    /// Stop dependents, back up and reinitialize the account database,
    /// restart the server, then re-register accounts
    ResetAll {
        /// Only this account after the reset
        #[arg(long)]
        user: Option<String>,
    },
}

impl Cli {
    /// The runner-facing action.
    pub fn action(&self) -> RunAction {
        match &self.command {
            Command::List { user } => RunAction::List { user: user.clone() },
            Command::Register { user } => RunAction::Register { user: user.clone() },
            Command::Unregister { user } => RunAction::Unregister { user: user.clone() },
            Command::ResetAll { user } => RunAction::ResetAll { user: user.clone() },
        }
    }

    /// The runner-facing configuration.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            project: self.project.clone(),
            oper_secret: self.oper_secret.clone(),
            session: SessionOptions {
                host: self.host.clone(),
                port: self.port,
                verify_tls: self.verify_tls,
                timeout: Duration::from_secs(self.timeout),
            },
            reset: ResetPlan {
                ircd_bin: self.ergo_bin.clone(),
                ircd_conf: self.ergo_conf.clone(),
                database: self.ergo_db.clone(),
                host: self.host.clone(),
                port: self.port,
                run_as: Some(IRCD_USER.to_string()),
            },
            credential_policy: self.on_credential_error,
            dry_run: self.dry_run,
            skip_restart: self.skip_restart,
        }
    }
}
