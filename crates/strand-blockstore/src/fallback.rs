//! Ordered first-success composition of read strategies

use futures::future::BoxFuture;
use tracing::debug;

use crate::{BlockStoreError, Result};

/// One named way of obtaining a value
pub struct Attempt<'a, T> {
    name: &'static str,
    future: BoxFuture<'a, Result<T>>,
}

impl<'a, T> Attempt<'a, T> {
    /// Wrap a boxed future under a name used for logging
    pub fn new(name: &'static str, future: BoxFuture<'a, Result<T>>) -> Self {
        Self { name, future }
    }
}

/// Run attempts in order until one succeeds
///
/// Each attempt starts only after the previous one failed. When all fail the
/// last error is returned inside `StorageUnavailable`.
pub async fn first_success<T>(attempts: Vec<Attempt<'_, T>>) -> Result<T> {
    let total = attempts.len();
    let mut last = None;

    for attempt in attempts {
        match attempt.future.await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(attempt = attempt.name, error = %e, "read attempt failed");
                last = Some(e);
            }
        }
    }

    let last = last.unwrap_or_else(|| {
        BlockStoreError::Configuration("no read strategy configured".to_string())
    });
    Err(BlockStoreError::StorageUnavailable {
        attempts: total,
        last: Box::new(last),
    })
}
