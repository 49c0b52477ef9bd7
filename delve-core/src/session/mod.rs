//! Chat session: the client-side conversation and its reconciliation with
//! the backend
//!
//! ## Flow
//!
//! ```text
//! send_message ─► UserSubmitted (user turn + placeholder)
//!              ─► dispatch ─► Dispatched ─► spawn resolver task
//!                          └► DispatchFailed (error turn)
//!
//! resolver task ─► events channel ─► next_update / wait_idle ─► SessionState::apply
//! ```
//!
//! Resolver tasks only send events; the session applies them when its owner
//! drains the channel, so state is never shared across tasks.
//!
//! ## Example
//!
//! ```rust,no_run
//! use delve_core::{ChatSession, Config, Mode};
//!
//! # async fn run() -> delve_core::Result<()> {
//! let config = Config::load()?;
//! let mut session = ChatSession::from_config(&config)?;
//! session.send_message("hello", Mode::Search).await?;
//! session.wait_idle().await;
//! println!("{}", session.state().conversation()[1].content);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod resolve;
pub mod state;
pub mod tasks;

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::backend::{Backend, BackendClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Mode, RequestId};

pub use resolve::ResolverSettings;
pub use state::{PendingReply, Reply, ResearchOutcome, SessionEvent, SessionState, Transition};
pub use tasks::{TaskKind, TaskRegistry};

/// A conversation with the research backend
///
/// Dropping the session cancels its resolver tasks.
pub struct ChatSession {
    backend: Arc<dyn Backend>,
    settings: ResolverSettings,
    state: SessionState,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    tasks: TaskRegistry,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn Backend>, settings: ResolverSettings) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            settings,
            state: SessionState::new(),
            events_tx,
            events_rx,
            tasks: TaskRegistry::new(),
        }
    }

    /// Session talking to the backend named in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = BackendClient::new(&config.backend)?;
        Ok(Self::new(Arc::new(client), ResolverSettings::from(config)))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Number of resolver tasks still registered
    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Submit user text in `mode`
    ///
    /// Appends the user turn and a loading placeholder, dispatches the request,
    /// and starts the matching resolver. Backend failures end up as an error
    /// turn rather than an `Err`; only invalid submissions are rejected.
    pub async fn send_message(&mut self, content: &str, mode: Mode) -> Result<RequestId> {
        if content.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        if self.state.is_loading() {
            return Err(Error::Busy);
        }

        let request_id = Uuid::new_v4();
        let outbound = dispatch::plan(mode, content, self.settings.iteration_limit);

        self.state.apply(SessionEvent::UserSubmitted {
            request_id,
            content: content.to_string(),
            mode,
        });
        tracing::info!(%request_id, %mode, "Message submitted");

        match outbound.send(self.backend.as_ref()).await {
            Ok(accepted) => {
                let backend_id = accepted.backend_id.clone();
                self.state.apply(SessionEvent::Dispatched {
                    request_id,
                    backend_id: accepted.backend_id,
                    acknowledgement: accepted.acknowledgement,
                });
                self.start_resolver(mode, backend_id, request_id);
            }
            Err(e) => {
                tracing::warn!(%request_id, %mode, error = %e, "Dispatch failed");
                self.state.apply(SessionEvent::DispatchFailed {
                    request_id,
                    reason: e.to_string(),
                });
            }
        }

        Ok(request_id)
    }

    fn start_resolver(&mut self, mode: Mode, backend_id: String, request_id: RequestId) {
        let backend = Arc::clone(&self.backend);
        let settings = self.settings.clone();
        let events = self.events_tx.clone();
        let key = backend_id.clone();

        match mode {
            Mode::Search => self.tasks.spawn(key, TaskKind::SearchRetry, request_id, |cancel| {
                resolve::resolve_search(backend, backend_id, request_id, settings, events, cancel)
            }),
            Mode::Research => self.tasks.spawn(key, TaskKind::ResearchPoll, request_id, |cancel| {
                resolve::poll_research(backend, backend_id, request_id, settings, events, cancel)
            }),
        }
    }

    fn apply(&mut self, event: SessionEvent) -> Transition {
        let request_id = event.request_id();
        let terminal = event.is_terminal();
        let transition = self.state.apply(event);

        if transition == Transition::Ignored {
            tracing::debug!(request_id = ?request_id, "Ignoring stale session event");
        }
        if terminal {
            if let Some(request_id) = request_id {
                self.tasks.finish(request_id);
            }
        }
        transition
    }

    /// Wait for the next resolver event and apply it
    ///
    /// Returns `None` once nothing is pending and no task can produce more
    /// events.
    pub async fn next_update(&mut self) -> Option<Transition> {
        if let Ok(event) = self.events_rx.try_recv() {
            return Some(self.apply(event));
        }

        self.tasks.prune_finished();
        if self.tasks.is_empty() {
            // Tasks may have sent their last event just before finishing.
            return self.events_rx.try_recv().ok().map(|event| self.apply(event));
        }

        let event = self.events_rx.recv().await?;
        Some(self.apply(event))
    }

    /// Apply events until the pending reply (if any) is resolved
    pub async fn wait_idle(&mut self) {
        while self.state.is_loading() {
            if self.next_update().await.is_none() {
                break;
            }
        }
    }

    /// Replace the conversation with a historical backend thread
    ///
    /// Returns the number of turns loaded.
    pub async fn restore_thread(&mut self, thread_id: &str) -> Result<usize> {
        if self.state.is_loading() {
            return Err(Error::Busy);
        }

        let thread = self.backend.thread(thread_id).await?;
        let turns = thread.to_turns();
        let count = turns.len();
        tracing::info!(thread_id = %thread_id, turns = count, "Thread restored");

        self.apply(SessionEvent::HistoryLoaded {
            thread_id: thread_id.to_string(),
            turns,
        });
        Ok(count)
    }

    /// Cancel every resolver task
    ///
    /// A reply still pending stays loading; nothing will resolve it.
    pub fn shutdown(&mut self) {
        if !self.tasks.is_empty() {
            tracing::info!(tasks = self.tasks.len(), "Cancelling resolver tasks");
        }
        self.tasks.cancel_all();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
