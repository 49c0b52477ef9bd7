//! # delve-core
//!
//! Core library for delve - a chat client for a search and deep-research
//! backend.
//!
//! This library provides:
//! - Domain types for turns, tool calls, and research metadata
//! - A session reducer that reconciles polled backend state into a linear
//!   conversation
//! - Resolver tasks for search (thread retries) and research (status polling)
//! - An HTTP client for the backend and an optional HTTP proxy in front of it
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use delve_core::{ChatSession, Config, Mode};
//!
//! # async fn run() -> delve_core::Result<()> {
//! let config = Config::load()?;
//! let mut session = ChatSession::from_config(&config)?;
//!
//! session.send_message("What is new in Rust 2024?", Mode::Research).await?;
//! session.wait_idle().await;
//!
//! for turn in session.state().conversation() {
//!     println!("{}: {}", turn.role.as_str(), turn.content);
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use backend::{Backend, BackendClient};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{ChatSession, ResolverSettings, SessionEvent, SessionState, Transition};
pub use types::*;

// Public modules
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod report;
pub mod session;
pub mod types;
