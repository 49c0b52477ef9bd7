//! Resolution strategies for pending replies
//!
//! Both run as spawned tasks that report back through the session's event
//! channel and never touch session state themselves:
//! - [`resolve_search`]: fetch the thread until it holds an answer, with a
//!   bounded number of attempts
//! - [`poll_research`]: poll job status on a fixed interval until the job
//!   reaches a terminal state

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, JobStatus};
use crate::config::Config;
use crate::types::RequestId;

use super::state::{Reply, ResearchOutcome, SessionEvent};

/// Timing and budget knobs for both strategies
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Thread fetch attempts for a search reply
    pub max_attempts: u32,
    /// Delay between thread fetch attempts
    pub retry_interval: Duration,
    /// Interval between research status polls
    pub poll_interval: Duration,
    /// Iteration budget sent when starting research
    pub iteration_limit: u32,
    /// Give up on research after this long; `None` polls until terminal
    pub max_poll: Option<Duration>,
}

impl From<&Config> for ResolverSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.search.max_attempts,
            retry_interval: config.search.retry_interval(),
            poll_interval: config.research.poll_interval(),
            iteration_limit: config.research.iteration_limit,
            max_poll: config.research.max_poll(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Run `fut` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Fetch `thread_id` until it holds an assistant reply or attempts run out
pub async fn resolve_search(
    backend: Arc<dyn Backend>,
    thread_id: String,
    request_id: RequestId,
    settings: ResolverSettings,
    events: UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    let max_attempts = settings.max_attempts.max(1);
    let mut last_failure = None;

    for attempt in 1..=max_attempts {
        let Some(fetched) = until_cancelled(&cancel, backend.thread(&thread_id)).await else {
            tracing::debug!(thread_id = %thread_id, "Search resolution cancelled");
            return;
        };

        match fetched {
            Ok(thread) => {
                if let Some(reply) = thread.latest_reply() {
                    tracing::info!(
                        thread_id = %thread_id,
                        attempt,
                        messages = thread.messages.len(),
                        "Search reply received"
                    );
                    let _ = events.send(SessionEvent::ThreadUpdate {
                        request_id,
                        reply: Reply {
                            content: reply.content.clone(),
                            tool_calls: reply.tool_calls.clone(),
                        },
                    });
                    return;
                }
                tracing::debug!(
                    thread_id = %thread_id,
                    attempt,
                    max_attempts,
                    messages = thread.messages.len(),
                    "No reply in thread yet"
                );
                last_failure = None;
            }
            Err(e) => {
                tracing::warn!(
                    thread_id = %thread_id,
                    attempt,
                    max_attempts,
                    transient = e.is_transient(),
                    error = %e,
                    "Thread fetch failed"
                );
                last_failure = Some(e.to_string());
            }
        }

        if attempt < max_attempts
            && until_cancelled(&cancel, tokio::time::sleep(settings.retry_interval))
                .await
                .is_none()
        {
            tracing::debug!(thread_id = %thread_id, "Search resolution cancelled");
            return;
        }
    }

    tracing::warn!(
        thread_id = %thread_id,
        max_attempts,
        last_failure = ?last_failure,
        "Search reply never arrived"
    );
    let _ = events.send(SessionEvent::RetryExhausted {
        request_id,
        last_failure,
    });
}

/// Poll research job `job_id` until it completes, fails, or the deadline passes
///
/// Network errors are logged and the next tick tries again; only a terminal
/// job state (or the deadline) stops the timer.
pub async fn poll_research(
    backend: Arc<dyn Backend>,
    job_id: String,
    request_id: RequestId,
    settings: ResolverSettings,
    events: UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(started + settings.poll_interval, settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if until_cancelled(&cancel, ticker.tick()).await.is_none() {
            tracing::debug!(research_id = %job_id, "Research polling cancelled");
            return;
        }

        if let Some(max_poll) = settings.max_poll {
            if started.elapsed() >= max_poll {
                tracing::warn!(research_id = %job_id, ?max_poll, "Research polling timed out");
                let _ = events.send(SessionEvent::PollTerminal {
                    request_id,
                    outcome: ResearchOutcome::TimedOut,
                });
                return;
            }
        }

        let Some(status) = until_cancelled(&cancel, backend.research_status(&job_id)).await else {
            return;
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(research_id = %job_id, error = %e, "Research status check failed");
                continue;
            }
        };

        match status.status {
            JobStatus::Completed => {
                let Some(result) = until_cancelled(&cancel, backend.research_result(&job_id)).await
                else {
                    return;
                };
                let result = match result {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(
                            research_id = %job_id,
                            error = %e,
                            "Research result fetch failed"
                        );
                        continue;
                    }
                };

                let outcome = match result.report() {
                    Some(report) => {
                        tracing::info!(
                            research_id = %job_id,
                            report_len = report.len(),
                            iterations = result.iterations,
                            "Research complete"
                        );
                        ResearchOutcome::Completed {
                            report: report.to_string(),
                            summary: result.summary(),
                        }
                    }
                    None => {
                        tracing::error!(research_id = %job_id, "Research completed without a report");
                        ResearchOutcome::MissingReport
                    }
                };
                let _ = events.send(SessionEvent::PollTerminal {
                    request_id,
                    outcome,
                });
                return;
            }
            JobStatus::Error => {
                tracing::warn!(research_id = %job_id, "Research job failed");
                let _ = events.send(SessionEvent::PollTerminal {
                    request_id,
                    outcome: ResearchOutcome::Failed,
                });
                return;
            }
            JobStatus::Queued | JobStatus::InProgress | JobStatus::Unknown => {
                tracing::debug!(
                    research_id = %job_id,
                    status = ?status.status,
                    progress = status.progress(),
                    total = status.total_iterations(),
                    "Research in progress"
                );
                if events
                    .send(SessionEvent::PollTick {
                        request_id,
                        progress: status.progress(),
                        total: status.total_iterations(),
                    })
                    .is_err()
                {
                    // Session is gone.
                    return;
                }
            }
        }
    }
}
