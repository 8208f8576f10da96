use std::fmt::Display;
use std::future::Future;

use tracing::debug;

/// Runs `attempt`, running it exactly once more if the first try fails.
///
/// The second error, if any, is returned unchanged.
pub async fn retry_once<F, Fut, T, E>(what: &str, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match attempt().await {
        Ok(value) => Ok(value),
        Err(err) => {
            debug!(what, %err, "Retrying after failure");

            attempt().await
        }
    }
}
