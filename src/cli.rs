//! Command surface: subcommand tree, dispatch, and output formatting.
//!
//! Each command maps to exactly one client operation and waits for it to
//! complete before returning; chat mode loops sequentially, one exchange
//! at a time.

use std::io::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::Event;

/// Command line client for an agent-serving API server.
#[derive(Debug, Parser)]
#[command(name = "agentctl", version, about)]
pub struct Cli {
    /// Base URL of the API server.
    #[arg(
        long,
        global = true,
        env = "AGENTCTL_BASE_URL",
        default_value = "http://localhost:8000"
    )]
    pub base_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// App management commands.
    #[command(subcommand)]
    App(AppCommand),
    /// Session management commands.
    #[command(subcommand)]
    Session(SessionCommand),
    /// Agent interaction commands.
    #[command(subcommand)]
    Agent(AgentCommand),
    /// Artifact management commands.
    #[command(subcommand)]
    Artifact(ArtifactCommand),
    /// Evaluation management commands.
    #[command(subcommand)]
    Eval(EvalCommand),
}

#[derive(Debug, Subcommand)]
pub enum AppCommand {
    /// List all available apps.
    List,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Create a new session.
    Create {
        app_name: String,
        user_id: String,
        /// Specific session ID to create.
        #[arg(long)]
        session_id: Option<String>,
        /// JSON file containing initial state.
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
    /// Get session details.
    Get {
        app_name: String,
        user_id: String,
        session_id: String,
    },
    /// List all sessions for a user.
    List { app_name: String, user_id: String },
    /// Delete a session.
    Delete {
        app_name: String,
        user_id: String,
        session_id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    /// Run the agent with a message.
    Run {
        app_name: String,
        user_id: String,
        session_id: String,
        message: String,
        /// Use streaming response.
        #[arg(long)]
        streaming: bool,
    },
    /// Start an interactive chat with the agent.
    Chat {
        app_name: String,
        user_id: String,
        session_id: String,
        /// Use streaming response.
        #[arg(long)]
        streaming: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ArtifactCommand {
    /// List artifacts for a session.
    List {
        app_name: String,
        user_id: String,
        session_id: String,
    },
    /// Get an artifact.
    Get {
        app_name: String,
        user_id: String,
        session_id: String,
        artifact_name: String,
        /// Specific version to retrieve.
        #[arg(long)]
        version: Option<u32>,
        /// Output file path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Upload an artifact.
    Upload {
        app_name: String,
        user_id: String,
        session_id: String,
        file_path: PathBuf,
        /// Custom artifact name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete an artifact.
    Delete {
        app_name: String,
        user_id: String,
        session_id: String,
        artifact_name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum EvalCommand {
    /// List evaluation sets.
    ListSets { app_name: String },
    /// Create an evaluation set.
    CreateSet {
        app_name: String,
        eval_set_id: String,
    },
    /// List evaluations in a set.
    ListEvals {
        app_name: String,
        eval_set_id: String,
    },
}

/// Execute one parsed command to completion.
pub async fn run(cli: Cli) -> Result<()> {
    let client = ApiClient::new(&cli.base_url)?;
    match cli.command {
        Commands::App(cmd) => run_app(&client, cmd).await,
        Commands::Session(cmd) => run_session(&client, cmd).await,
        Commands::Agent(cmd) => run_agent(&client, cmd).await,
        Commands::Artifact(cmd) => run_artifact(&client, cmd).await,
        Commands::Eval(cmd) => run_eval(&client, cmd).await,
    }
}

async fn run_app(client: &ApiClient, cmd: AppCommand) -> Result<()> {
    match cmd {
        AppCommand::List => {
            let apps = client.list_apps().await?;
            print_listing("Available apps:", "No apps found.", &apps);
        }
    }
    Ok(())
}

async fn run_session(client: &ApiClient, cmd: SessionCommand) -> Result<()> {
    match cmd {
        SessionCommand::Create {
            app_name,
            user_id,
            session_id,
            state_file,
        } => {
            let state = match state_file {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)?;
                    Some(serde_json::from_str::<Value>(&raw)?)
                }
                None => None,
            };
            let session = client
                .create_session(&app_name, &user_id, session_id.as_deref(), state)
                .await?;
            println!("Created session: {}", session.id);
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionCommand::Get {
            app_name,
            user_id,
            session_id,
        } => {
            let session = client.get_session(&app_name, &user_id, &session_id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionCommand::List { app_name, user_id } => {
            let sessions = client.list_sessions(&app_name, &user_id).await?;
            if sessions.is_empty() {
                println!("No sessions found.");
            } else {
                println!("Sessions for {user_id} in {app_name}:");
                for session in &sessions {
                    println!(
                        "  - {} (created: {})",
                        session.id,
                        session.created_at().unwrap_or("unknown")
                    );
                }
            }
        }
        SessionCommand::Delete {
            app_name,
            user_id,
            session_id,
        } => {
            client
                .delete_session(&app_name, &user_id, &session_id)
                .await?;
            println!("Deleted session: {session_id}");
        }
    }
    Ok(())
}

async fn run_agent(client: &ApiClient, cmd: AgentCommand) -> Result<()> {
    match cmd {
        AgentCommand::Run {
            app_name,
            user_id,
            session_id,
            message,
            streaming,
        } => {
            println!("[{user_id}]: {message}");
            exchange(client, &app_name, &user_id, &session_id, &message, streaming).await?;
        }
        AgentCommand::Chat {
            app_name,
            user_id,
            session_id,
            streaming,
        } => {
            chat(client, &app_name, &user_id, &session_id, streaming).await?;
        }
    }
    Ok(())
}

async fn run_artifact(client: &ApiClient, cmd: ArtifactCommand) -> Result<()> {
    match cmd {
        ArtifactCommand::List {
            app_name,
            user_id,
            session_id,
        } => {
            let artifacts = client.list_artifacts(&app_name, &user_id, &session_id).await?;
            print_listing(
                &format!("Artifacts in session {session_id}:"),
                "No artifacts found.",
                &artifacts,
            );
        }
        ArtifactCommand::Get {
            app_name,
            user_id,
            session_id,
            artifact_name,
            version,
            output,
        } => {
            let artifact = client
                .get_artifact(&app_name, &user_id, &session_id, &artifact_name, version)
                .await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_string_pretty(&artifact)?)?;
                    println!("Artifact saved to: {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&artifact)?),
            }
        }
        ArtifactCommand::Upload {
            app_name,
            user_id,
            session_id,
            file_path,
            name,
        } => {
            let result = client
                .upload_artifact(&app_name, &user_id, &session_id, &file_path, name.as_deref())
                .await?;
            println!("Uploaded artifact: {}", result.filename);
            println!("Size: {} bytes", result.size);
        }
        ArtifactCommand::Delete {
            app_name,
            user_id,
            session_id,
            artifact_name,
        } => {
            client
                .delete_artifact(&app_name, &user_id, &session_id, &artifact_name)
                .await?;
            println!("Deleted artifact: {artifact_name}");
        }
    }
    Ok(())
}

async fn run_eval(client: &ApiClient, cmd: EvalCommand) -> Result<()> {
    match cmd {
        EvalCommand::ListSets { app_name } => {
            let sets = client.list_eval_sets(&app_name).await?;
            print_listing(
                &format!("Evaluation sets for {app_name}:"),
                "No evaluation sets found.",
                &sets,
            );
        }
        EvalCommand::CreateSet {
            app_name,
            eval_set_id,
        } => {
            client.create_eval_set(&app_name, &eval_set_id).await?;
            println!("Created evaluation set: {eval_set_id}");
        }
        EvalCommand::ListEvals {
            app_name,
            eval_set_id,
        } => {
            let evals = client.list_evals_in_set(&app_name, &eval_set_id).await?;
            print_listing(
                &format!("Evaluations in set {eval_set_id}:"),
                "No evaluations found in set.",
                &evals,
            );
        }
    }
    Ok(())
}

/// One request/response exchange with the agent, streaming or not.
async fn exchange(
    client: &ApiClient,
    app_name: &str,
    user_id: &str,
    session_id: &str,
    message: &str,
    streaming: bool,
) -> Result<()> {
    if streaming {
        print!("[agent]: ");
        std::io::stdout().flush()?;
        let mut stdout = tokio::io::stdout();
        client
            .run_agent_streaming(app_name, user_id, session_id, message, &mut stdout)
            .await?;
        println!();
    } else {
        let events = client
            .run_agent(app_name, user_id, session_id, message, false)
            .await?;
        for line in format_events(&events) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Outcome of racing an in-flight exchange against the interrupt signal.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// The exchange ran to completion.
    Completed(Result<()>),
    /// The interrupt fired first; the exchange was abandoned.
    Interrupted,
}

/// Await an in-flight exchange while keeping the interrupt signal armed,
/// so a Ctrl-C arriving mid-exchange is observed instead of delivered to
/// nobody.
pub async fn await_exchange<E, I>(exchange: E, interrupt: I) -> ExchangeOutcome
where
    E: Future<Output = Result<()>>,
    I: Future<Output = std::io::Result<()>> + Unpin,
{
    tokio::select! {
        result = exchange => ExchangeOutcome::Completed(result),
        _ = interrupt => ExchangeOutcome::Interrupted,
    }
}

/// Interactive sequential read-eval loop. One outstanding exchange at a
/// time; Ctrl-C or `exit` terminates cleanly.
async fn chat(
    client: &ApiClient,
    app_name: &str,
    user_id: &str,
    session_id: &str,
    streaming: bool,
) -> Result<()> {
    println!("Starting chat with {app_name} (session: {session_id})");
    println!("Type 'exit' to quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // One interrupt future for the whole loop: the first select installs
    // the process SIGINT handler, so the future must stay alive during an
    // in-flight exchange, not just at the prompt.
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        print!("[{user_id}]: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupt.as_mut() => {
                println!("\nExiting chat...");
                break;
            }
        };
        let Some(line) = line else {
            // stdin closed
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") {
            break;
        }

        // A failed exchange aborts the message, not the chat; an
        // interrupt abandons the exchange and ends the loop.
        let outcome = await_exchange(
            exchange(client, app_name, user_id, session_id, message, streaming),
            interrupt.as_mut(),
        )
        .await;
        match outcome {
            ExchangeOutcome::Interrupted => {
                println!("\nExiting chat...");
                break;
            }
            ExchangeOutcome::Completed(Err(err)) => eprintln!("Error: {err}"),
            ExchangeOutcome::Completed(Ok(())) => {}
        }
        println!();
    }
    Ok(())
}

/// Render a non-streaming event sequence: one attributed line per event
/// that carries text, in event order.
fn format_events(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| {
            event
                .joined_text()
                .map(|text| format!("[{}]: {}", event.author_label(), text))
        })
        .collect()
}

fn print_listing(header: &str, empty: &str, items: &[String]) {
    if items.is_empty() {
        println!("{empty}");
    } else {
        println!("{header}");
        for item in items {
            println!("  - {item}");
        }
    }
}
