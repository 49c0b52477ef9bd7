//! Request and response bodies exchanged with the research backend
//!
//! The backend labels assistant messages `ai`; [`normalize_role`] rewrites that
//! to `assistant` and every [`Backend`](super::Backend) implementation applies
//! it before handing messages out.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{Contexts, ResearchSummary, Role, ToolCall, Turn};

/// Iteration total assumed when the status payload omits it
pub const DEFAULT_TOTAL_ITERATIONS: u32 = 3;

/// Accept `null` wherever a default value would do
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Map backend role labels onto the client's canonical ones
pub fn normalize_role(role: &str) -> &str {
    match role {
        "ai" => "assistant",
        "human" => "user",
        other => other,
    }
}

/// Request body for the query endpoint
#[derive(Debug, Serialize)]
pub struct QueryRequest<'a> {
    pub content: &'a str,
    pub thread_id: Option<&'a str>,
}

/// Request body for the research-start endpoint
#[derive(Debug, Serialize)]
pub struct ResearchRequest<'a> {
    pub query: &'a str,
    pub iteration_limit: u32,
}

/// A message inside a thread or query response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendMessage {
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
}

impl BackendMessage {
    pub fn is_assistant(&self) -> bool {
        normalize_role(&self.role) == "assistant"
    }

    /// Convert into a finalized turn; `None` for roles the conversation does
    /// not display (tool output and the like)
    pub fn to_turn(&self) -> Option<Turn> {
        let role: Role = normalize_role(&self.role).parse().ok()?;
        let mut turn = match role {
            Role::User => Turn::user(self.content.clone()),
            Role::Assistant => Turn::assistant(self.content.clone()),
            Role::System => Turn::system(self.content.clone()),
        };
        turn.tool_calls = self.tool_calls.clone();
        Some(turn)
    }
}

/// Response of the query endpoint and the thread endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<BackendMessage>,
}

impl ThreadResponse {
    /// Rewrite legacy role labels in place
    pub fn normalize_roles(&mut self) {
        for msg in &mut self.messages {
            let role = normalize_role(&msg.role);
            if role != msg.role {
                msg.role = role.to_string();
            }
        }
    }

    /// The reply that answers a search turn, if the thread holds one yet
    ///
    /// A thread counts as answered once it has more than one message and at
    /// least one assistant message; the latest assistant message wins.
    pub fn latest_reply(&self) -> Option<&BackendMessage> {
        if self.messages.len() <= 1 {
            return None;
        }
        self.messages.iter().rev().find(|m| m.is_assistant())
    }

    /// Displayable turns for a historical thread
    pub fn to_turns(&self) -> Vec<Turn> {
        self.messages.iter().filter_map(BackendMessage::to_turn).collect()
    }
}

/// Response of the research-start endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchStarted {
    pub research_id: String,
}

/// Research job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Response of the research-status endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchStatus {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub total_iterations: Option<u32>,
}

impl ResearchStatus {
    pub fn progress(&self) -> u32 {
        self.progress.unwrap_or(0)
    }

    pub fn total_iterations(&self) -> u32 {
        self.total_iterations
            .filter(|total| *total > 0)
            .unwrap_or(DEFAULT_TOTAL_ITERATIONS)
    }
}

/// Response of the research-result endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResearchResult {
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub search_queries: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub iterations: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contexts: Contexts,
}

impl ResearchResult {
    /// The report text, `None` when missing or blank
    pub fn report(&self) -> Option<&str> {
        self.report.as_deref().filter(|r| !r.trim().is_empty())
    }

    pub fn summary(&self) -> ResearchSummary {
        ResearchSummary {
            query: self.query.clone(),
            search_queries: self.search_queries.clone(),
            iterations: self.iterations,
            contexts: self.contexts.clone(),
        }
    }
}
