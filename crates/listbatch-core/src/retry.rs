//! Transport-level retry around chunk execution
//!
//! `RetryingChunkRunner` re-runs a whole chunk (fresh context, fresh
//! registration) when its commit failed with a retryable transport error.
//! Per-operation failures are returned as-is: the backend may already have
//! applied sibling operations, so only a failed round trip is safe to repeat.

use crate::chunk::{ChunkReport, ChunkRunner};
use crate::config::RetryPolicy;
use crate::operation::Operation;

/// Chunk runner decorator applying a `RetryPolicy`
#[derive(Debug, Clone)]
pub struct RetryingChunkRunner<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: ChunkRunner> RetryingChunkRunner<R> {
    /// Wrap `inner` with `policy`
    #[inline]
    #[must_use]
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Get the policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn wants_retry(&self, report: &ChunkReport, retries_done: u32) -> bool {
        self.policy.enabled
            && retries_done < self.policy.max_retries
            && report
                .transport_error
                .as_ref()
                .is_some_and(|error| self.policy.should_retry(&error.message))
    }
}

#[async_trait::async_trait]
impl<R: ChunkRunner> ChunkRunner for RetryingChunkRunner<R> {
    async fn run_chunk(&self, index: usize, operations: &[Operation]) -> ChunkReport {
        let mut retries_done = 0u32;
        loop {
            let mut report = self.inner.run_chunk(index, operations).await;
            report.attempts = retries_done + 1;

            if !self.wants_retry(&report, retries_done) {
                if retries_done > 0 && report.transport_error.is_none() {
                    tracing::info!(chunk = index, attempts = report.attempts, "chunk succeeded after retry");
                }
                return report;
            }

            retries_done += 1;
            tracing::warn!(
                chunk = index,
                retry = retries_done,
                max_retries = self.policy.max_retries,
                delay_ms = self.policy.retry_delay_ms,
                error = report.transport_error.as_ref().map(|e| e.message.as_str()).unwrap_or_default(),
                "retrying chunk after transport failure"
            );
            tokio::time::sleep(self.policy.retry_delay()).await;
        }
    }
}
