//! Session state and its reducer
//!
//! [`SessionState::apply`] is the only way the conversation changes. Every
//! resolution event carries the [`RequestId`] of the message it answers and is
//! ignored unless that request still owns the pending placeholder, so late,
//! duplicate, or cancelled events can never touch a finalized turn.

use chrono::Utc;

use crate::report;
use crate::types::{Mode, RequestId, ResearchSummary, ToolCall, Turn};

pub const SEARCH_PLACEHOLDER: &str = "Thinking...";
pub const RESEARCH_PLACEHOLDER: &str = "Researching your query...";
pub const RESEARCH_ACKNOWLEDGEMENT: &str =
    "I'm researching that for you. This may take a minute...";

pub const SEARCH_TIMEOUT_MESSAGE: &str =
    "Sorry, the response is taking longer than expected. Please try again.";
pub const RESEARCH_FAILED_MESSAGE: &str =
    "Sorry, there was an error processing your research request.";
pub const MISSING_REPORT_MESSAGE: &str = "Research completed but encountered an issue generating the report. Please try again with a more specific query.";
pub const RESEARCH_TIMEOUT_MESSAGE: &str =
    "Sorry, the research is taking longer than expected. Please try again.";

/// Progress text shown in the research placeholder
pub fn research_progress(progress: u32, total: u32) -> String {
    format!("Researching... ({}/{})", progress, total)
}

/// The assistant slot currently waiting on the backend
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReply {
    pub request_id: RequestId,
    pub turn_index: usize,
    pub mode: Mode,
    /// Thread id (search) or job id (research), known once dispatched
    pub backend_id: Option<String>,
    /// Text the user submitted
    pub query: String,
}

/// Answer found in a search thread
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Terminal result of a research job
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchOutcome {
    Completed {
        report: String,
        summary: ResearchSummary,
    },
    Failed,
    MissingReport,
    TimedOut,
}

/// Everything that can happen to a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// User text accepted; appends the user turn and the placeholder
    UserSubmitted {
        request_id: RequestId,
        content: String,
        mode: Mode,
    },
    /// Backend accepted the request
    Dispatched {
        request_id: RequestId,
        backend_id: String,
        acknowledgement: Option<String>,
    },
    /// Backend rejected the request or could not be reached
    DispatchFailed { request_id: RequestId, reason: String },
    /// Search thread now holds an answer
    ThreadUpdate { request_id: RequestId, reply: Reply },
    /// Search attempts ran out; `last_failure` is set when the final attempt errored
    RetryExhausted {
        request_id: RequestId,
        last_failure: Option<String>,
    },
    /// Research job still running
    PollTick {
        request_id: RequestId,
        progress: u32,
        total: u32,
    },
    /// Research job reached a terminal state
    PollTerminal {
        request_id: RequestId,
        outcome: ResearchOutcome,
    },
    /// A historical thread replaced the conversation
    HistoryLoaded { thread_id: String, turns: Vec<Turn> },
}

impl SessionEvent {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            SessionEvent::UserSubmitted { request_id, .. }
            | SessionEvent::Dispatched { request_id, .. }
            | SessionEvent::DispatchFailed { request_id, .. }
            | SessionEvent::ThreadUpdate { request_id, .. }
            | SessionEvent::RetryExhausted { request_id, .. }
            | SessionEvent::PollTick { request_id, .. }
            | SessionEvent::PollTerminal { request_id, .. } => Some(*request_id),
            SessionEvent::HistoryLoaded { .. } => None,
        }
    }

    /// True for events that end a pending reply
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::DispatchFailed { .. }
                | SessionEvent::ThreadUpdate { .. }
                | SessionEvent::RetryExhausted { .. }
                | SessionEvent::PollTerminal { .. }
        )
    }
}

/// Whether an event changed the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored,
}

/// Conversation plus the bookkeeping around the pending reply
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    conversation: Vec<Turn>,
    thread_id: Option<String>,
    is_loading: bool,
    last_error: Option<String>,
    pending: Option<PendingReply>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &[Turn] {
        &self.conversation
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pending(&self) -> Option<&PendingReply> {
        self.pending.as_ref()
    }

    /// The placeholder turn, while a reply is pending
    pub fn pending_turn(&self) -> Option<&Turn> {
        self.pending
            .as_ref()
            .and_then(|p| self.conversation.get(p.turn_index))
    }

    /// Number of turns still marked loading (never more than one)
    pub fn loading_turns(&self) -> usize {
        self.conversation.iter().filter(|t| t.is_loading).count()
    }

    /// Apply one event
    pub fn apply(&mut self, event: SessionEvent) -> Transition {
        match event {
            SessionEvent::UserSubmitted {
                request_id,
                content,
                mode,
            } => self.submit(request_id, content, mode),
            SessionEvent::Dispatched {
                request_id,
                backend_id,
                acknowledgement,
            } => self.dispatched(request_id, backend_id, acknowledgement),
            SessionEvent::DispatchFailed { request_id, reason } => self.fail(
                request_id,
                format!("Sorry, an error occurred: {}", reason),
                reason,
            ),
            SessionEvent::ThreadUpdate { request_id, reply } => {
                self.resolve(request_id, |turn, _| {
                    turn.content = reply.content;
                    turn.tool_calls = reply.tool_calls;
                    turn.mode = Some(Mode::Search);
                })
            }
            SessionEvent::RetryExhausted {
                request_id,
                last_failure,
            } => match last_failure {
                Some(reason) => self.fail(
                    request_id,
                    format!("Error fetching response: {}", reason),
                    reason,
                ),
                None => self.fail(
                    request_id,
                    SEARCH_TIMEOUT_MESSAGE.to_string(),
                    "Response timeout".to_string(),
                ),
            },
            SessionEvent::PollTick {
                request_id,
                progress,
                total,
            } => self.progress(request_id, progress, total),
            SessionEvent::PollTerminal {
                request_id,
                outcome,
            } => self.research_finished(request_id, outcome),
            SessionEvent::HistoryLoaded { thread_id, turns } => {
                if self.pending.is_some() {
                    return Transition::Ignored;
                }
                self.conversation = turns;
                self.thread_id = Some(thread_id);
                self.last_error = None;
                Transition::Applied
            }
        }
    }

    fn submit(&mut self, request_id: RequestId, content: String, mode: Mode) -> Transition {
        if self.pending.is_some() {
            return Transition::Ignored;
        }

        // Search turns always start a fresh backend thread.
        if mode == Mode::Search {
            self.thread_id = None;
        }

        let placeholder = match mode {
            Mode::Search => SEARCH_PLACEHOLDER,
            Mode::Research => RESEARCH_PLACEHOLDER,
        };

        self.conversation.push(Turn::user(content.clone()));
        self.conversation.push(Turn::placeholder(mode, placeholder));
        self.pending = Some(PendingReply {
            request_id,
            turn_index: self.conversation.len() - 1,
            mode,
            backend_id: None,
            query: content,
        });
        self.is_loading = true;
        self.last_error = None;
        Transition::Applied
    }

    fn dispatched(
        &mut self,
        request_id: RequestId,
        backend_id: String,
        acknowledgement: Option<String>,
    ) -> Transition {
        let Some(pending) = self.pending.as_mut().filter(|p| p.request_id == request_id) else {
            return Transition::Ignored;
        };
        pending.backend_id = Some(backend_id.clone());
        let turn_index = pending.turn_index;
        self.thread_id = Some(backend_id);

        if let Some(text) = acknowledgement {
            if let Some(turn) = self.conversation.get_mut(turn_index) {
                turn.content = text;
            }
        }
        Transition::Applied
    }

    fn progress(&mut self, request_id: RequestId, progress: u32, total: u32) -> Transition {
        let Some(pending) = self
            .pending
            .as_ref()
            .filter(|p| p.request_id == request_id && p.mode == Mode::Research)
        else {
            return Transition::Ignored;
        };
        match self.conversation.get_mut(pending.turn_index) {
            Some(turn) => {
                turn.content = research_progress(progress, total);
                Transition::Applied
            }
            None => Transition::Ignored,
        }
    }

    fn research_finished(&mut self, request_id: RequestId, outcome: ResearchOutcome) -> Transition {
        match outcome {
            ResearchOutcome::Completed { report, summary } => {
                self.resolve(request_id, |turn, pending| {
                    let job_id = pending.backend_id.clone().unwrap_or_default();
                    let query = summary
                        .query
                        .clone()
                        .unwrap_or_else(|| pending.query.clone());
                    turn.content = report::present_report(&report, Some(&summary));
                    turn.tool_calls = vec![ToolCall::deep_research(&job_id, &query)];
                    turn.mode = Some(Mode::Research);
                    turn.research_data = Some(summary);
                })
            }
            ResearchOutcome::Failed => self.fail(
                request_id,
                RESEARCH_FAILED_MESSAGE.to_string(),
                "Research failed".to_string(),
            ),
            ResearchOutcome::MissingReport => self.fail(
                request_id,
                MISSING_REPORT_MESSAGE.to_string(),
                "Research completed but no report was generated".to_string(),
            ),
            ResearchOutcome::TimedOut => self.fail(
                request_id,
                RESEARCH_TIMEOUT_MESSAGE.to_string(),
                "Research timeout".to_string(),
            ),
        }
    }

    fn fail(&mut self, request_id: RequestId, message: String, reason: String) -> Transition {
        let transition = self.resolve(request_id, |turn, _| {
            turn.content = message;
            turn.is_error = true;
        });
        if transition == Transition::Applied {
            self.last_error = Some(reason);
        }
        transition
    }

    /// Finalize the placeholder owned by `request_id`, exactly once
    fn resolve<F>(&mut self, request_id: RequestId, finalize: F) -> Transition
    where
        F: FnOnce(&mut Turn, &PendingReply),
    {
        if self.pending.as_ref().map(|p| p.request_id) != Some(request_id) {
            return Transition::Ignored;
        }
        let Some(pending) = self.pending.take() else {
            return Transition::Ignored;
        };

        self.is_loading = false;
        match self.conversation.get_mut(pending.turn_index) {
            Some(turn) => {
                turn.is_loading = false;
                turn.created_at = Utc::now();
                finalize(turn, &pending);
                Transition::Applied
            }
            None => Transition::Ignored,
        }
    }
}
