//! Core domain types for delve
//!
//! These types describe the conversation as the client sees it. Backend wire
//! shapes live in [`crate::backend::wire`] and are converted into these once
//! roles have been normalized.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Turn** | One entry in the visible conversation |
//! | **Conversation** | Turns in chronological (insertion) order |
//! | **Placeholder** | The assistant turn created on dispatch, marked loading, resolved in place |
//! | **Thread** | Backend conversation id used by search mode |
//! | **Research job** | Backend multi-iteration query identified by a job id |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-side id correlating resolution events with the placeholder they resolve
pub type RequestId = Uuid;

// ============================================
// Roles and modes
// ============================================

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// How a user message is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Search-augmented chat on a fresh backend thread
    #[default]
    Search,
    /// Multi-iteration deep research job
    Research,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Search => "search",
            Mode::Research => "research",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Mode::Search),
            "research" => Ok(Mode::Research),
            _ => Err(format!("unknown mode: {}", s)),
        }
    }
}

// ============================================
// Tool calls and research metadata
// ============================================

/// A tool invocation reported by the backend alongside a message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// The synthetic tool call attached to research answers
    pub fn deep_research(job_id: &str, query: &str) -> Self {
        let mut args = serde_json::Map::new();
        args.insert(
            "query".to_string(),
            serde_json::Value::String(query.to_string()),
        );
        Self {
            id: job_id.to_string(),
            kind: default_tool_type(),
            name: "deep_research".to_string(),
            args,
        }
    }
}

/// Research contexts as reported by the backend: either a bare count or the
/// snippets themselves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Contexts {
    Count(u64),
    Snippets(Vec<String>),
}

impl Default for Contexts {
    fn default() -> Self {
        Contexts::Snippets(Vec::new())
    }
}

impl Contexts {
    /// Number of contexts, regardless of representation
    pub fn len(&self) -> usize {
        match self {
            Contexts::Count(n) => *n as usize,
            Contexts::Snippets(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snippet texts, empty when only a count is known
    pub fn snippets(&self) -> &[String] {
        match self {
            Contexts::Count(_) => &[],
            Contexts::Snippets(s) => s,
        }
    }
}

/// Descriptive metadata attached to a completed research turn
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResearchSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub contexts: Contexts,
}

// ============================================
// Turns
// ============================================

/// One entry in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_data: Option<ResearchSummary>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub is_loading: bool,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            tool_calls: Vec::new(),
            mode: None,
            research_data: None,
            is_error: false,
            is_loading: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Loading assistant turn shown while a reply is pending
    pub fn placeholder(mode: Mode, content: impl Into<String>) -> Self {
        Self {
            mode: Some(mode),
            is_loading: true,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// True for the assistant slot still waiting on the backend
    pub fn is_pending(&self) -> bool {
        self.role == Role::Assistant && self.is_loading
    }

    /// True if any tool call used web retrieval
    pub fn used_web_search(&self) -> bool {
        self.tool_calls
            .iter()
            .any(|call| call.name == "retrieve_web_content")
    }
}
