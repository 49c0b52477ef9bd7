//! delve - terminal chat client for a search and deep-research backend
//!
//! Subcommands:
//! - `chat`: interactive conversation (the default)
//! - `ask`: one question, one answer, then exit
//! - `thread`: print a stored backend thread
//! - `serve`: run the `/api/chat` HTTP proxy
//! - `config`: show the effective configuration
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/delve/config.toml (~/.config/delve/config.toml)
//! - Logs: $XDG_STATE_HOME/delve/delve.log (~/.local/state/delve/delve.log)

mod render;

use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use delve_core::logging::Output;
use delve_core::{ChatSession, Config, Mode};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Chat with a search and deep-research backend")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive conversation
    Chat {
        /// Mode for new messages: search or research
        #[arg(short, long, default_value = "search")]
        mode: Mode,
    },

    /// Ask a single question and print the answer
    Ask {
        /// Mode for the question: search or research
        #[arg(short, long, default_value = "search")]
        mode: Mode,

        /// Print the answer turn as JSON
        #[arg(long)]
        json: bool,

        /// Question text
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Print the messages of a stored thread
    Thread {
        /// Thread id
        thread_id: String,
    },

    /// Run the HTTP proxy in front of the backend
    Serve {
        /// Address to listen on (default: from config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show configuration
    Config,
}

/// How waiting on a reply ended
#[derive(Debug, PartialEq, Eq)]
enum Wait {
    Settled,
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Logs go to a file so they never mix with conversation output; the
    // proxy also mirrors them to stderr
    let output = match args.command {
        Some(Command::Serve { .. }) => Output::FileAndStderr,
        _ => Output::File,
    };
    let _log_guard = delve_core::logging::init(&config.logging, output)
        .context("failed to initialize logging")?;

    tracing::info!(backend = %config.backend.base_url, "delve starting up");

    match args.command.unwrap_or(Command::Chat { mode: Mode::Search }) {
        Command::Chat { mode } => cmd_chat(&config, mode).await,
        Command::Ask {
            mode,
            json,
            message,
        } => cmd_ask(&config, mode, json, &message.join(" ")).await,
        Command::Thread { thread_id } => cmd_thread(&config, &thread_id).await,
        Command::Serve { bind } => cmd_serve(config, bind).await,
        Command::Config => cmd_config(&config),
    }
}

/// Apply session events until the pending reply settles, with a spinner
async fn wait_for_reply(session: &mut ChatSession) -> Wait {
    let initial = session
        .state()
        .pending_turn()
        .map(|turn| turn.content.clone())
        .unwrap_or_default();
    let pb = render::spinner(&initial);

    while session.is_loading() {
        let update = tokio::select! {
            update = session.next_update() => Some(update),
            _ = tokio::signal::ctrl_c() => None,
        };

        match update {
            None => {
                pb.finish_and_clear();
                tracing::info!("Interrupted while waiting for a reply");
                session.shutdown();
                return Wait::Interrupted;
            }
            Some(None) => break,
            Some(Some(_)) => {
                if let Some(turn) = session.state().pending_turn() {
                    pb.set_message(turn.content.clone());
                }
            }
        }
    }

    pb.finish_and_clear();
    Wait::Settled
}

async fn cmd_ask(config: &Config, mode: Mode, json: bool, message: &str) -> Result<()> {
    let mut session = ChatSession::from_config(config).context("failed to create session")?;

    session
        .send_message(message, mode)
        .await
        .context("failed to send message")?;

    if wait_for_reply(&mut session).await == Wait::Interrupted {
        bail!("interrupted");
    }

    let Some(turn) = session.state().conversation().last() else {
        bail!("no reply received");
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(turn).context("failed to serialize reply")?
        );
    } else {
        print!("{}", render::format_turn(turn));
    }

    if turn.is_error {
        bail!(
            "{}",
            session.state().last_error().unwrap_or("request failed")
        );
    }
    Ok(())
}

async fn cmd_thread(config: &Config, thread_id: &str) -> Result<()> {
    let mut session = ChatSession::from_config(config).context("failed to create session")?;

    let count = session
        .restore_thread(thread_id)
        .await
        .with_context(|| format!("failed to fetch thread {}", thread_id))?;

    if count == 0 {
        println!("Thread {} has no messages.", thread_id);
        return Ok(());
    }

    for turn in session.state().conversation() {
        println!("{}", render::format_turn(turn));
    }
    Ok(())
}

async fn cmd_serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    println!(
        "Proxy listening on http://{} (backend: {})",
        config.server.bind, config.backend.base_url
    );
    println!("Press Ctrl-C to stop.");

    delve_core::proxy::serve(&config)
        .await
        .context("proxy server failed")?;
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  /mode search|research   switch mode for new messages");
    println!("  /thread <id>            load a stored thread");
    println!("  /new                    start a new conversation");
    println!("  /help                   show this help");
    println!("  /quit                   exit");
}

async fn cmd_chat(config: &Config, mut mode: Mode) -> Result<()> {
    let mut session = ChatSession::from_config(config).context("failed to create session")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "delve {} · {} mode · /help for commands",
        env!("CARGO_PKG_VERSION"),
        mode
    );

    loop {
        print!("{}> ", mode);
        std::io::stdout().flush().context("failed to flush stdout")?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("quit" | "exit"), _) => break,
                (Some("help"), _) => print_help(),
                (Some("mode"), Some(name)) => match name.parse::<Mode>() {
                    Ok(new_mode) => {
                        mode = new_mode;
                        println!("Switched to {} mode.", mode);
                    }
                    Err(e) => println!("{}", e),
                },
                (Some("mode"), None) => println!("Current mode: {}", mode),
                (Some("new"), _) => {
                    session = ChatSession::from_config(config)
                        .context("failed to create session")?;
                    println!("Started a new conversation.");
                }
                (Some("thread"), Some(thread_id)) => {
                    match session.restore_thread(thread_id).await {
                        Ok(_) => {
                            for turn in session.state().conversation() {
                                println!("{}", render::format_turn(turn));
                            }
                        }
                        Err(e) => println!("Could not load thread {}: {}", thread_id, e),
                    }
                }
                _ => println!("Unknown command: /{}. Type /help for commands.", command),
            }
            continue;
        }

        if let Err(e) = session.send_message(line, mode).await {
            println!("{}", e);
            continue;
        }

        if wait_for_reply(&mut session).await == Wait::Interrupted {
            println!();
            break;
        }

        if let Some(turn) = session.state().conversation().last() {
            println!("{}", render::format_turn(turn));
        }
    }

    session.shutdown();
    tracing::info!(
        turns = session.state().conversation().len(),
        "Chat session ended"
    );
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("delve Configuration");
    println!("===================");
    println!();

    let config_path = Config::config_path();
    let source = if config_path.exists() {
        "loaded"
    } else {
        "not found, using defaults"
    };
    println!("Config file:     {} ({})", config_path.display(), source);
    println!("Log file:        {}", delve_core::logging::log_file_path().display());
    println!();

    println!("Backend URL:     {}", config.backend.base_url);
    println!("Timeout:         {}s", config.backend.timeout_secs);
    println!();

    println!("Search");
    println!("  Attempts:      {}", config.search.max_attempts);
    println!("  Interval:      {}ms", config.search.retry_interval_ms);
    println!();

    println!("Research");
    println!("  Poll interval: {}ms", config.research.poll_interval_ms);
    println!("  Iterations:    {}", config.research.iteration_limit);
    match config.research.max_poll() {
        Some(limit) => println!("  Give up after: {}s", limit.as_secs()),
        None => println!("  Give up after: never"),
    }
    println!();

    println!("Proxy bind:      {}", config.server.bind);
    Ok(())
}
