//! Time budgets for collaborator calls.

use std::future::Future;
use std::time::Duration;

use murmur_types::error::EngineError;

/// Run `fut` with a deadline. An elapsed budget becomes
/// `EngineError::Timeout`, any other error is converted into `EngineError`.
pub async fn with_timeout<T, E, F>(
    operation: &'static str,
    budget: Duration,
    fut: F,
) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<EngineError>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(operation, budget_secs = budget.as_secs(), "collaborator call timed out");
            Err(EngineError::Timeout {
                operation,
                after_secs: budget.as_secs(),
            })
        }
    }
}
