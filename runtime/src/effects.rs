//! Best-effort execution of effect descriptions after commit.
//!
//! Each top-level effect runs in its own task. Failures are logged and counted
//! but never reach the caller of the mutation, which has already been
//! committed by the time effects start.

use crate::error::StoreError;
use crate::metrics::SideEffectMetrics;
use request_queue_core::{CirculationEnvironment, CollaboratorError, Effect};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle for tracking effect completion
///
/// Returned with every committed mutation. Dropping it does not cancel the
/// effects.
///
/// # Example
///
/// ```ignore
/// let committed = store.create(new_request).await?;
/// committed.effects.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Debug, Default)]
pub struct EffectHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl EffectHandle {
    /// Create a handle that's already complete
    #[must_use]
    pub const fn completed() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Number of effect tasks started
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no effect was started
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether every effect task has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Wait for all effects to complete
    pub async fn wait(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Effect task aborted");
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when
    /// `timeout` elapses.
    pub async fn wait_with_timeout(self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

/// Spawns effect tasks and keeps the counters the store reports on.
#[derive(Clone)]
pub(crate) struct EffectExecutor {
    environment: CirculationEnvironment,
    pending: Arc<AtomicUsize>,
    failed: Arc<AtomicU64>,
}

impl EffectExecutor {
    pub(crate) fn new(environment: CirculationEnvironment) -> Self {
        Self {
            environment,
            pending: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Effects started but not yet finished
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Effects that failed since the store was created
    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn spawn(&self, effects: SmallVec<[Effect; 4]>) -> EffectHandle {
        let mut tasks = Vec::with_capacity(effects.len());
        for effect in effects {
            if effect.is_none() {
                continue;
            }
            let executor = self.clone();
            executor.pending.fetch_add(1, Ordering::AcqRel);
            tasks.push(tokio::spawn(async move {
                let _guard = PendingGuard(Arc::clone(&executor.pending));
                executor.run(&effect);
            }));
        }
        EffectHandle { tasks }
    }

    /// Run one effect tree; returns whether every leaf succeeded
    fn run(&self, effect: &Effect) -> bool {
        match effect {
            Effect::None => true,
            Effect::Parallel(effects) => effects
                .iter()
                .fold(true, |all_ok, effect| self.run(effect) && all_ok),
            Effect::Sequential(effects) => effects.iter().all(|effect| self.run(effect)),
            Effect::RecalculateDueDate {
                loan,
                recall_request_id,
            } => {
                let kind = effect.name();
                SideEffectMetrics::record_started(kind);
                let result = self
                    .environment
                    .policies
                    .recall_policy(loan)
                    .and_then(|policy| self.environment.recalls.recalculate(loan, &policy));
                match result {
                    Ok(due_date) => {
                        tracing::info!(
                            loan_id = %loan.id,
                            recall_request_id = %recall_request_id,
                            %due_date,
                            "Recall due date recalculated"
                        );
                        true
                    },
                    Err(e) => self.record_failure(kind, &e),
                }
            },
            Effect::SendNotice(notice) => {
                let kind = effect.name();
                SideEffectMetrics::record_started(kind);
                match self.environment.notices.dispatch(notice) {
                    Ok(()) => {
                        tracing::debug!(
                            notice = notice.kind.as_str(),
                            request_id = %notice.request_id,
                            recipient_id = %notice.recipient_id,
                            "Patron notice dispatched"
                        );
                        true
                    },
                    Err(e) => self.record_failure(kind, &e),
                }
            },
        }
    }

    fn record_failure(&self, kind: &'static str, error: &CollaboratorError) -> bool {
        tracing::error!(effect = kind, error = %error, "Side effect failed");
        SideEffectMetrics::record_failure(kind);
        self.failed.fetch_add(1, Ordering::AcqRel);
        false
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
