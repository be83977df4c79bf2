use crate::{BackupError, Result};
use core_runtime::logging::redact_if_sensitive;
use tokio::task::JoinSet;
use tracing::warn;

/// Wait for every account worker and report the first failure.
///
/// A failing account never cancels its siblings; all of them run to
/// completion before this returns.
pub(crate) async fn join_accounts(mut workers: JoinSet<(String, Result<()>)>) -> Result<()> {
    let mut first_error = None;

    while let Some(joined) = workers.join_next().await {
        let (account, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Account worker panicked or was aborted");
                first_error.get_or_insert(BackupError::Worker(e.to_string()));
                continue;
            }
        };

        if let Err(e) = result {
            warn!(
                account = %redact_if_sensitive("account", &account),
                error = %e,
                "Account run failed"
            );
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
