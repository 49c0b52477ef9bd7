//! Scripted in-memory backend shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use delve_core::backend::{
    Backend, BackendMessage, JobStatus, ResearchResult, ResearchStarted, ResearchStatus,
    ThreadResponse,
};
use delve_core::{Contexts, Error, Result};

/// One scripted response
#[derive(Debug, Clone)]
pub enum Step<T> {
    Ok(T),
    Fail(u16, &'static str),
}

/// Responses for one endpoint, consumed in order; the last one repeats
#[derive(Debug)]
struct Script<T> {
    steps: VecDeque<Step<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            steps: VecDeque::new(),
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self, endpoint: &str) -> Result<T> {
        let step = if self.steps.len() > 1 {
            self.steps.pop_front()
        } else {
            self.steps.front().cloned()
        };
        match step {
            Some(Step::Ok(value)) => Ok(value),
            Some(Step::Fail(status, body)) => Err(Error::Api {
                status,
                body: body.to_string(),
            }),
            None => Err(Error::Api {
                status: 404,
                body: format!("nothing scripted for {}", endpoint),
            }),
        }
    }
}

/// A backend call as the fake observed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Query {
        content: String,
        thread_id: Option<String>,
    },
    StartResearch {
        query: String,
        iteration_limit: u32,
    },
    Status(String),
    Result(String),
    Thread(String),
}

#[derive(Default)]
struct Scripts {
    query: Script<ThreadResponse>,
    start: Script<ResearchStarted>,
    status: Script<ResearchStatus>,
    result: Script<ResearchResult>,
    thread: Script<ThreadResponse>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeBackend {
    scripts: Mutex<Scripts>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(self, step: Step<ThreadResponse>) -> Self {
        self.with(|s| s.query.steps.push_back(step))
    }

    pub fn on_start(self, step: Step<ResearchStarted>) -> Self {
        self.with(|s| s.start.steps.push_back(step))
    }

    pub fn on_status(self, step: Step<ResearchStatus>) -> Self {
        self.with(|s| s.status.steps.push_back(step))
    }

    pub fn on_result(self, step: Step<ResearchResult>) -> Self {
        self.with(|s| s.result.steps.push_back(step))
    }

    pub fn on_thread(self, step: Step<ThreadResponse>) -> Self {
        self.with(|s| s.thread.steps.push_back(step))
    }

    /// Script `count` identical thread responses
    pub fn on_thread_times(mut self, step: Step<ThreadResponse>, count: usize) -> Self {
        for _ in 0..count {
            self = self.on_thread(step.clone());
        }
        self
    }

    fn with(self, f: impl FnOnce(&mut Scripts)) -> Self {
        f(&mut self.scripts.lock().unwrap());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.scripts.lock().unwrap().calls.clone()
    }

    pub fn thread_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Thread(_)))
    }

    pub fn status_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Status(_)))
    }

    pub fn result_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Result(_)))
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.scripts
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| pred(c))
            .count()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn query(&self, content: &str, thread_id: Option<&str>) -> Result<ThreadResponse> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.calls.push(Call::Query {
            content: content.to_string(),
            thread_id: thread_id.map(str::to_string),
        });
        let mut response = scripts.query.next("query")?;
        response.normalize_roles();
        Ok(response)
    }

    async fn start_research(&self, query: &str, iteration_limit: u32) -> Result<ResearchStarted> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.calls.push(Call::StartResearch {
            query: query.to_string(),
            iteration_limit,
        });
        scripts.start.next("research start")
    }

    async fn research_status(&self, job_id: &str) -> Result<ResearchStatus> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.calls.push(Call::Status(job_id.to_string()));
        scripts.status.next("research status")
    }

    async fn research_result(&self, job_id: &str) -> Result<ResearchResult> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.calls.push(Call::Result(job_id.to_string()));
        scripts.result.next("research result")
    }

    async fn thread(&self, thread_id: &str) -> Result<ThreadResponse> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.calls.push(Call::Thread(thread_id.to_string()));
        let mut response = scripts.thread.next("thread")?;
        response.normalize_roles();
        Ok(response)
    }
}

// ============================================
// Payload builders
// ============================================

/// Thread `id` holding `(role, content)` messages with raw backend roles
pub fn thread(id: &str, messages: &[(&str, &str)]) -> ThreadResponse {
    ThreadResponse {
        thread_id: Some(id.to_string()),
        messages: messages
            .iter()
            .map(|(role, content)| BackendMessage {
                role: role.to_string(),
                content: content.to_string(),
                tool_calls: Vec::new(),
            })
            .collect(),
    }
}

pub fn started(id: &str) -> ResearchStarted {
    ResearchStarted {
        research_id: id.to_string(),
    }
}

pub fn status(status: JobStatus, progress: u32, total: u32) -> ResearchStatus {
    ResearchStatus {
        status,
        progress: Some(progress),
        total_iterations: Some(total),
    }
}

pub fn result(report: Option<&str>) -> ResearchResult {
    ResearchResult {
        report: report.map(str::to_string),
        query: Some("history of the printing press".to_string()),
        search_queries: vec![
            "printing press invention".to_string(),
            "Gutenberg Bible".to_string(),
        ],
        iterations: 2,
        contexts: Contexts::Snippets(vec![
            "Johannes Gutenberg introduced movable type printing to Europe around 1440 in Mainz."
                .to_string(),
            "[About] short".to_string(),
        ]),
    }
}
