//! Registry of running resolution tasks
//!
//! Tasks are keyed by the backend id they watch (thread or job id) and each
//! owns a [`CancellationToken`]. At most one research poll runs at a time.

use std::collections::HashMap;
use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::types::RequestId;

/// Which resolution strategy a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    SearchRetry,
    ResearchPoll,
}

struct ResolutionTask {
    kind: TaskKind,
    request_id: RequestId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Resolution tasks owned by one session
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, ResolutionTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` under `key`, handing it a fresh cancellation token
    ///
    /// A task already registered under `key` is cancelled. Starting a research
    /// poll also cancels any other poll.
    pub fn spawn<F, Fut>(&mut self, key: impl Into<String>, kind: TaskKind, request_id: RequestId, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();

        if kind == TaskKind::ResearchPoll {
            let polls: Vec<String> = self
                .tasks
                .iter()
                .filter(|(_, t)| t.kind == TaskKind::ResearchPoll)
                .map(|(k, _)| k.clone())
                .collect();
            for poll in polls {
                self.cancel(&poll);
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(cancel.clone()));

        tracing::debug!(key = %key, ?kind, %request_id, "Resolution task started");

        if let Some(previous) = self.tasks.insert(
            key.clone(),
            ResolutionTask {
                kind,
                request_id,
                cancel,
                handle,
            },
        ) {
            tracing::debug!(key = %key, "Replacing resolution task");
            previous.cancel.cancel();
        }
    }

    /// Forget tasks belonging to a request that has been resolved
    pub fn finish(&mut self, request_id: RequestId) {
        self.tasks.retain(|_, task| {
            if task.request_id == request_id {
                task.cancel.cancel();
                false
            } else {
                true
            }
        });
    }

    fn cancel(&mut self, key: &str) {
        if let Some(task) = self.tasks.remove(key) {
            tracing::debug!(key = %key, kind = ?task.kind, "Resolution task cancelled");
            task.cancel.cancel();
        }
    }

    /// Cancel every task
    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.cancel.cancel();
        }
    }

    /// Drop tasks whose futures have already returned
    pub fn prune_finished(&mut self) {
        self.tasks.retain(|_, task| !task.handle.is_finished());
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    impl TaskRegistry {
        fn is_active(&self, key: &str) -> bool {
            self.tasks.contains_key(key)
        }

        fn active_polls(&self) -> usize {
            self.tasks
                .values()
                .filter(|t| t.kind == TaskKind::ResearchPoll)
                .count()
        }
    }

    async fn wait_for_cancel(cancel: CancellationToken, done: tokio::sync::oneshot::Sender<()>) {
        cancel.cancelled().await;
        let _ = done.send(());
    }

    #[tokio::test]
    async fn test_new_poll_cancels_previous_poll() {
        let mut registry = TaskRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        registry.spawn("job-1", TaskKind::ResearchPoll, Uuid::new_v4(), |cancel| {
            wait_for_cancel(cancel, tx)
        });
        registry.spawn("job-2", TaskKind::ResearchPoll, Uuid::new_v4(), |cancel| async move {
            cancel.cancelled().await;
        });

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("first poll should be cancelled")
            .unwrap();
        assert!(!registry.is_active("job-1"));
        assert!(registry.is_active("job-2"));
        assert_eq!(registry.active_polls(), 1);
    }

    #[tokio::test]
    async fn test_search_tasks_run_side_by_side_with_polls() {
        let mut registry = TaskRegistry::new();
        registry.spawn("t-1", TaskKind::SearchRetry, Uuid::new_v4(), |cancel| async move {
            cancel.cancelled().await;
        });
        registry.spawn("job-1", TaskKind::ResearchPoll, Uuid::new_v4(), |cancel| async move {
            cancel.cancelled().await;
        });
        assert_eq!(registry.len(), 2);

        registry.cancel_all();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_finish_removes_only_matching_request() {
        let mut registry = TaskRegistry::new();
        let keep = Uuid::new_v4();
        let done = Uuid::new_v4();
        registry.spawn("t-1", TaskKind::SearchRetry, keep, |cancel| async move {
            cancel.cancelled().await;
        });
        registry.spawn("t-2", TaskKind::SearchRetry, done, |_| async {});

        registry.finish(done);
        assert!(registry.is_active("t-1"));
        assert!(!registry.is_active("t-2"));
    }

    #[tokio::test]
    async fn test_respawn_under_same_key_replaces_task() {
        let mut registry = TaskRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        registry.spawn("t-1", TaskKind::SearchRetry, Uuid::new_v4(), |cancel| {
            wait_for_cancel(cancel, tx)
        });
        registry.spawn("t-1", TaskKind::SearchRetry, Uuid::new_v4(), |cancel| async move {
            cancel.cancelled().await;
        });

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("replaced task should be cancelled")
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_polls(), 0);
    }

    #[tokio::test]
    async fn test_drop_cancels_tasks() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        {
            let mut registry = TaskRegistry::new();
            registry.spawn("t-1", TaskKind::SearchRetry, Uuid::new_v4(), |cancel| {
                wait_for_cancel(cancel, tx)
            });
        }
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("drop should cancel")
            .unwrap();
    }
}
