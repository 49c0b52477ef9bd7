//! Research backend gateway
//!
//! The backend is an opaque HTTP service exposing query submission, thread
//! retrieval, and research job status/result endpoints. [`Backend`] is the
//! seam the session and the proxy talk through; [`BackendClient`] is the
//! reqwest implementation.
//!
//! ## Usage
//!
//! Point delve at a backend in `~/.config/delve/config.toml`:
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8000"
//! timeout_secs = 30
//! ```

mod client;
pub mod wire;

use async_trait::async_trait;

use crate::error::Result;

pub use client::BackendClient;
pub use wire::{
    BackendMessage, JobStatus, ResearchResult, ResearchStarted, ResearchStatus, ThreadResponse,
};

/// Operations the research backend offers
///
/// Implementations return messages with roles already normalized
/// (see [`wire::normalize_role`]).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Submit a search-mode message; `None` starts a fresh thread
    async fn query(&self, content: &str, thread_id: Option<&str>) -> Result<ThreadResponse>;

    /// Start a deep research job and return its id
    async fn start_research(&self, query: &str, iteration_limit: u32) -> Result<ResearchStarted>;

    /// Current state of a research job
    async fn research_status(&self, job_id: &str) -> Result<ResearchStatus>;

    /// Final report and metadata of a completed research job
    async fn research_result(&self, job_id: &str) -> Result<ResearchResult>;

    /// All messages of a thread
    async fn thread(&self, thread_id: &str) -> Result<ThreadResponse>;
}
