//! systemctl integration for the ircd and its dependent units.

use std::fmt;
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::AdmError;

/// The account server unit.
pub const IRCD_UNIT: &str = "ergo";

/// Units holding client connections to the ircd; they follow its lifecycle.
pub const DEPENDENT_UNITS: &[&str] = &["irccat", "thelounge"];

/// System user that owns the ircd's state directory.
pub const IRCD_USER: &str = "ergo";

/// The systemctl verbs this tool issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    Stop,
    Start,
    Restart,
}

impl UnitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run `systemctl <action> <unit>`, folding captured output into the error
/// on a non-zero exit.
pub async fn systemctl(action: UnitAction, unit: &str) -> Result<(), AdmError> {
    debug!("systemctl {} {}", action, unit);
    let output = Command::new("systemctl")
        .arg(action.as_str())
        .arg(unit)
        .output()
        .await
        .map_err(|e| AdmError::ServiceControl {
            action: action.to_string(),
            unit: unit.to_string(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(AdmError::ServiceControl {
            action: action.to_string(),
            unit: unit.to_string(),
            detail: combined_output(&output),
        });
    }
    Ok(())
}

/// Best-effort variant: a failure becomes a warning instead of an error.
pub async fn systemctl_lenient(action: UnitAction, unit: &str) {
    if let Err(e) = systemctl(action, unit).await {
        warn!("{}", e);
    }
}

/// Stdout and stderr of a finished process, joined and trimmed.
pub(crate) fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut text = String::new();
    if !stdout.trim().is_empty() {
        text.push_str(stdout.trim());
    }
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr.trim());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_action_wording() {
        assert_eq!(UnitAction::Stop.to_string(), "stop");
        assert_eq!(UnitAction::Start.to_string(), "start");
        assert_eq!(UnitAction::Restart.to_string(), "restart");
    }

    #[tokio::test]
    async fn combined_output_joins_both_streams() {
        let output = Command::new("/bin/sh")
            .args(["-c", "echo from-stdout; echo from-stderr 1>&2"])
            .output()
            .await
            .unwrap();
        assert_eq!(combined_output(&output), "from-stdout\nfrom-stderr");
    }

    #[tokio::test]
    async fn combined_output_skips_empty_streams() {
        let output = Command::new("/bin/sh")
            .args(["-c", "echo only-stdout"])
            .output()
            .await
            .unwrap();
        assert_eq!(combined_output(&output), "only-stdout");
    }
}
