//! Plain-text rendering of conversation turns for the terminal.

use std::time::Duration;

use chrono::Local;
use delve_core::{Mode, Role, Turn};
use indicatif::{ProgressBar, ProgressStyle};

/// Prefix shown before each turn.
pub fn role_prefix(role: Role) -> &'static str {
    match role {
        Role::User => "[you]",
        Role::Assistant => "[assistant]",
        Role::System => "[system]",
    }
}

/// Short note on how an assistant answer was produced.
pub fn mode_indicator(turn: &Turn) -> Option<String> {
    if turn.role != Role::Assistant || turn.is_loading || turn.is_error {
        return None;
    }

    match turn.mode {
        Some(Mode::Research) => Some(match &turn.research_data {
            Some(data) => format!(
                "Deep Research ({} iterations, {} queries)",
                data.iterations,
                data.search_queries.len()
            ),
            None => "Deep Research".to_string(),
        }),
        _ if turn.used_web_search() => Some("Web Search".to_string()),
        _ => None,
    }
}

/// Header line for a turn: time, role, and mode indicator.
pub fn turn_header(turn: &Turn) -> String {
    let time = turn.created_at.with_timezone(&Local).format("%H:%M");
    let mut header = format!("{} {}", time, role_prefix(turn.role));
    if turn.is_error {
        header.push_str(" (error)");
    }
    if let Some(indicator) = mode_indicator(turn) {
        header.push_str(" · ");
        header.push_str(&indicator);
    }
    header
}

/// Full rendering of a turn.
pub fn format_turn(turn: &Turn) -> String {
    format!("{}\n{}\n", turn_header(turn), turn.content.trim_end())
}

/// Spinner shown while a reply is pending.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
