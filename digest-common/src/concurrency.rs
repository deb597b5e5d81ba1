//! C2 Concurrency Gate: bounds the number of in-flight calls per LLM
//! provider so a burst of articles never exceeds a provider's rate limit.
//!
//! Grounded on `hook-worker`'s `Arc<tokio::sync::Semaphore>` gating around
//! `process_webhook_job`, generalized from a single global semaphore to a
//! map keyed by provider name, built once per batch invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::LlmError;

/// Owns one semaphore per provider. Acquisitions are FIFO within a
/// provider; callers from different providers never block each other.
pub struct ConcurrencyGate {
    semaphores: HashMap<String, Arc<Semaphore>>,
}

impl ConcurrencyGate {
    /// Build a gate from `(provider, max_concurrent)` pairs.
    pub fn new<I>(limits: I) -> Self
    where
        I: IntoIterator<Item = (String, usize)>,
    {
        let semaphores = limits
            .into_iter()
            .map(|(provider, limit)| (provider, Arc::new(Semaphore::new(limit.max(1)))))
            .collect();
        Self { semaphores }
    }

    /// Acquire a permit for `provider`, racing against `deadline`. A
    /// provider absent from the limit table is treated as unbounded (no gate
    /// configured for it) and returns immediately. If `deadline` elapses
    /// before a permit is available, returns `LlmError::Cancelled` without
    /// ever holding a permit.
    pub async fn acquire(
        &self,
        provider: &str,
        deadline: Duration,
    ) -> Result<Option<SemaphorePermit<'_>>, LlmError> {
        let Some(semaphore) = self.semaphores.get(provider) else {
            return Ok(None);
        };
        tokio::select! {
            permit = semaphore.acquire() => match permit {
                Ok(permit) => Ok(Some(permit)),
                Err(_closed) => Err(LlmError::Cancelled),
            },
            _ = tokio::time::sleep(deadline) => Err(LlmError::Cancelled),
        }
    }

    pub fn available_permits(&self, provider: &str) -> Option<usize> {
        self.semaphores.get(provider).map(|s| s.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounds_concurrency_per_provider() {
        let gate = ConcurrencyGate::new([("deepseek".to_string(), 1)]);
        let first = gate.acquire("deepseek", Duration::from_secs(5)).await.unwrap();
        assert!(first.is_some());
        assert_eq!(gate.available_permits("deepseek"), Some(0));
        drop(first);
        assert_eq!(gate.available_permits("deepseek"), Some(1));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_unbounded() {
        let gate = ConcurrencyGate::new([("deepseek".to_string(), 1)]);
        let permit = gate.acquire("openrouter", Duration::from_secs(5)).await.unwrap();
        assert!(permit.is_none());
    }

    #[tokio::test]
    async fn deadline_cancels_without_holding_a_permit() {
        let gate = ConcurrencyGate::new([("deepseek".to_string(), 1)]);
        let held = gate.acquire("deepseek", Duration::from_secs(5)).await.unwrap();
        assert!(held.is_some());

        let result = gate.acquire("deepseek", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
        assert_eq!(gate.available_permits("deepseek"), Some(0));

        drop(held);
        let next = gate.acquire("deepseek", Duration::from_secs(5)).await.unwrap();
        assert!(next.is_some());
    }
}
