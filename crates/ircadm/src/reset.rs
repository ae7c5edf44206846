//! The destructive account-database reset.
//!
//! Strictly ordered: consumers and the ircd stop first, the database file
//! moves aside, the ircd's own initdb rebuilds it under the server's system
//! user, and only then does the unit start again and get probed for
//! readiness. Stop failures are warnings; everything after the stops is
//! fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::info;

use crate::errors::AdmError;
use crate::probe;
use crate::services::{self, UnitAction, DEPENDENT_UNITS, IRCD_UNIT};

/// Readiness budget after a fresh start. Longer than the routine pre-batch
/// probe because the process has to rebuild state and open its listeners
/// from cold.
pub const POST_RESET_READINESS: Duration = Duration::from_secs(30);

/// Paths, endpoint, and identity the reset operates on.
#[derive(Debug, Clone)]
pub struct ResetPlan {
    pub ircd_bin: PathBuf,
    pub ircd_conf: PathBuf,
    pub database: PathBuf,
    pub host: String,
    pub port: u16,
    /// System user the reinit runs as; `None` keeps the current user.
    pub run_as: Option<String>,
}

/// Execute the stop / backup / reinit / start / verify sequence.
pub async fn reset_all(plan: &ResetPlan) -> Result<(), AdmError> {
    for unit in DEPENDENT_UNITS {
        services::systemctl_lenient(UnitAction::Stop, unit).await;
    }
    services::systemctl_lenient(UnitAction::Stop, IRCD_UNIT).await;

    match backup_database(&plan.database).await? {
        Some(backup) => info!("database moved to {}", backup.display()),
        None => info!("no database at {}, nothing to back up", plan.database.display()),
    }

    reinit_database(&plan.ircd_bin, &plan.ircd_conf, plan.run_as.as_deref()).await?;

    services::systemctl(UnitAction::Start, IRCD_UNIT).await?;
    probe::wait_for_port(&plan.host, plan.port, POST_RESET_READINESS).await
}

/// Move the database aside, returning the backup path when a file existed.
///
/// The file is renamed, never copied, so a half-written database cannot be
/// left behind at the live path.
pub async fn backup_database(path: &Path) -> Result<Option<PathBuf>, AdmError> {
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AdmError::Io(e)),
    }

    let backup = backup_path(path, chrono::Utc::now().timestamp());
    tokio::fs::rename(path, &backup).await?;
    Ok(Some(backup))
}

/// `<path>.backup.<unix-seconds>`, alongside the original.
fn backup_path(path: &Path, unix_seconds: i64) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".backup.{}", unix_seconds));
    PathBuf::from(name)
}

/// Rebuild the database with the ircd's own initdb entry point.
///
/// `run_as` drops to that system user's uid and gid so the new files keep
/// the ownership the unit expects; `None` keeps the current user.
pub async fn reinit_database(
    bin: &Path,
    conf: &Path,
    run_as: Option<&str>,
) -> Result<(), AdmError> {
    let mut command = Command::new(bin);
    command.arg("initdb").arg("--conf").arg(conf);

    if let Some(user) = run_as {
        let account = nix::unistd::User::from_name(user)
            .map_err(|e| AdmError::UserLookup {
                user: user.to_string(),
                detail: e.to_string(),
            })?
            .ok_or_else(|| AdmError::UserLookup {
                user: user.to_string(),
                detail: "no such user".to_string(),
            })?;
        command.uid(account.uid.as_raw()).gid(account.gid.as_raw());
    }

    let output = command.output().await.map_err(|e| AdmError::Reinit {
        status: "did not start".to_string(),
        output: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(AdmError::Reinit {
            status: output.status.to_string(),
            output: services::combined_output(&output),
        });
    }

    info!("database reinitialized from {}", conf.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_appends_timestamp() {
        let path = backup_path(Path::new("/var/lib/ergo/ircd.db"), 1_700_000_000);
        assert_eq!(
            path,
            PathBuf::from("/var/lib/ergo/ircd.db.backup.1700000000")
        );
    }

    #[tokio::test]
    async fn backup_renames_the_live_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("ircd.db");
        tokio::fs::write(&db, b"account data").await.unwrap();

        let backup = backup_database(&db).await.unwrap().unwrap();

        assert!(!db.exists(), "live path should be gone");
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ircd.db.backup."));
        let moved = tokio::fs::read(&backup).await.unwrap();
        assert_eq!(moved, b"account data");

        // Exactly one file left in the directory.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn backup_of_a_missing_file_is_a_no_op() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("ircd.db");

        let backup = backup_database(&db).await.unwrap();

        assert!(backup.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn reinit_succeeds_when_the_binary_exits_zero() {
        reinit_database(Path::new("/bin/true"), Path::new("/dev/null"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reinit_failure_carries_status_and_output() {
        let err = reinit_database(Path::new("/bin/false"), Path::new("/dev/null"), None)
            .await
            .unwrap_err();
        match err {
            AdmError::Reinit { status, .. } => {
                assert!(status.contains("1"), "unexpected status: {}", status)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reinit_with_a_missing_binary_fails_to_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let bin = dir.path().join("no-such-ircd");
        let err = reinit_database(&bin, Path::new("/dev/null"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdmError::Reinit { .. }));
        assert!(err.to_string().contains("did not start"));
    }

    #[tokio::test]
    async fn reinit_as_an_unknown_user_is_a_lookup_error() {
        let err = reinit_database(
            Path::new("/bin/true"),
            Path::new("/dev/null"),
            Some("no-such-user-zz9"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdmError::UserLookup { .. }));
    }
}
