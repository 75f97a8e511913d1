//! Fail-open utilities for cosmetic operations
//!
//! Overlays, annotations, the recording throbber and video encoding are visual
//! polish. When they fail the test keeps running and the recording is simply
//! plainer. Use these helpers for that class of operation only.
//!
//! DO NOT use fail-open for:
//! - Interactions (click, type, focus) on elements the test depends on
//! - Navigation and explicit waits
//! - Assertions and element queries

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute a cosmetic operation, logging and discarding its error
///
/// Returns `None` on failure.
///
/// # Usage
///
/// ```no_run
/// use showreel_core::fail_open::fail_open;
/// use showreel_core::Result;
///
/// async fn inject_overlay() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let injected = fail_open("cursor_overlay", || inject_overlay()).await;
///     // injected is None if inject_overlay() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like fail_open but retries with a linear backoff of `100ms * attempt`
///
/// Used for page-side re-establishment right after a navigation, where the
/// new document may not have a body yet.
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_retries: usize,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_retries {
        match f().await {
            Ok(val) => return Some(val),
            Err(e) => {
                if attempt == max_retries {
                    warn!(
                        "{} failed after {} retries (fail-open): {}",
                        operation_name, max_retries, e
                    );
                    return None;
                }
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_retries, e
                );
                let delay_ms = 100 * attempt as u64;
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }
        }
    }
    None
}
