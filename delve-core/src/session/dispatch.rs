//! Mode dispatcher: turns user text into the outbound backend request

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::Mode;

use super::state::RESEARCH_ACKNOWLEDGEMENT;

/// The request a submitted message produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Search: query on a fresh thread, answered by thread retries
    Query { content: String },
    /// Research: start a job, answered by status polling
    StartResearch {
        query: String,
        iteration_limit: u32,
    },
}

/// What the backend handed back when it accepted a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Thread id (search) or job id (research)
    pub backend_id: String,
    /// Text to show in the placeholder until the answer arrives
    pub acknowledgement: Option<String>,
}

/// Choose the outbound request for `content` in `mode`
///
/// Neither request carries the session's thread: search turns always start a
/// fresh thread and the research start endpoint takes no thread at all.
pub fn plan(mode: Mode, content: &str, iteration_limit: u32) -> Outbound {
    match mode {
        Mode::Search => Outbound::Query {
            content: content.to_string(),
        },
        Mode::Research => Outbound::StartResearch {
            query: content.to_string(),
            iteration_limit,
        },
    }
}

impl Outbound {
    /// Issue the request
    pub async fn send(&self, backend: &dyn Backend) -> Result<Accepted> {
        match self {
            Outbound::Query { content } => {
                let response = backend.query(content, None).await?;
                let thread_id = response
                    .thread_id
                    .filter(|id| !id.is_empty())
                    .ok_or(Error::MissingField("thread_id"))?;
                Ok(Accepted {
                    backend_id: thread_id,
                    acknowledgement: None,
                })
            }
            Outbound::StartResearch {
                query,
                iteration_limit,
            } => {
                let started = backend.start_research(query, *iteration_limit).await?;
                if started.research_id.is_empty() {
                    return Err(Error::MissingField("research_id"));
                }
                Ok(Accepted {
                    backend_id: started.research_id,
                    acknowledgement: Some(RESEARCH_ACKNOWLEDGEMENT.to_string()),
                })
            }
        }
    }
}
