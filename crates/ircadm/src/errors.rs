//! Error types shared across the crate.

use thiserror::Error;

/// Everything that can go wrong in one ircadm run.
#[derive(Error, Debug)]
pub enum AdmError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("secret {name}: {detail}")]
    Secret { name: String, detail: String },

    #[error("no account credentials found in project {project}")]
    NoAccounts { project: String },

    #[error("system user {user}: {detail}")]
    UserLookup { user: String, detail: String },

    #[error("initdb {status}: {output}")]
    Reinit { status: String, output: String },

    #[error("systemctl {action} {unit} failed: {detail}")]
    ServiceControl {
        action: String,
        unit: String,
        detail: String,
    },

    #[error("{addr} not reachable within {timeout_secs}s")]
    Unreachable { addr: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
