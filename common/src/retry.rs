// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Bounded retry helper for upstream calls.

use std::future::Future;
use tokio::time::sleep;
use tracing::error;

use crate::error::{Result, RrsError};
use crate::setting::{MAX_RETRIES, RETRY_DELAY};

/// Runs `op` up to [`MAX_RETRIES`] times with exponential backoff starting at
/// [`RETRY_DELAY`]. Exhaustion surfaces as `Transient`.
pub async fn with_retries<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = RETRY_DELAY;
    let mut last_err = None;
    for attempt in 1..=MAX_RETRIES {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                error!("Attempt {}: {} failed: {}", attempt, what, e);
                last_err = Some(e);
                if attempt < MAX_RETRIES {
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(RrsError::Transient(format!(
        "{} failed after {} attempts: {}",
        what,
        MAX_RETRIES,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retries("op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(RrsError::Transient("boom".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_transient() {
        let result: Result<()> =
            with_retries("op", || async { Err(RrsError::Transient("down".to_string())) }).await;
        assert!(matches!(result, Err(RrsError::Transient(_))));
    }
}
