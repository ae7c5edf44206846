//! Batch planning: which accounts a run operates on.

use tracing::debug;

use crate::errors::AdmError;
use crate::secrets::{account_for_secret, credential_name, SecretStore};

/// One managed account and the secret holding its password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    /// Short name of the credential secret, `<username>-credential`.
    pub credential: String,
}

impl Account {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            credential: credential_name(username),
        }
    }
}

/// Resolve the ordered, non-empty account set for a run.
///
/// An explicit username bypasses discovery entirely. Otherwise every secret
/// in the project carrying the account-credential suffix contributes one
/// account, sorted by name so repeated runs process the same order.
pub async fn plan(
    store: &dyn SecretStore,
    project: &str,
    specific_user: Option<&str>,
) -> Result<Vec<Account>, AdmError> {
    let accounts = match specific_user {
        Some(user) => vec![Account::new(user)],
        None => {
            let names = store.list(project).await?;
            let mut usernames: Vec<&str> = names
                .iter()
                .filter_map(|name| account_for_secret(name))
                .collect();
            usernames.sort_unstable();
            debug!(
                "discovered {} account(s) among {} secret(s)",
                usernames.len(),
                names.len()
            );
            usernames.into_iter().map(Account::new).collect()
        }
    };

    if accounts.is_empty() {
        return Err(AdmError::NoAccounts {
            project: project.to_string(),
        });
    }
    Ok(accounts)
}
