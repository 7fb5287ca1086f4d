use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loqa_coach::{
    create_router, AppState, CoachingSession, Config, NewSession, SessionEvent, SessionServices,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Voice-driven coaching sessions over a language model
#[derive(Parser)]
#[command(name = "loqa-coach", version, about)]
struct Cli {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/loqa-coach")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Run a single session in the terminal, printing its events
    Session {
        /// What the session is about
        #[arg(short, long)]
        topic: String,

        /// Coaching option name
        #[arg(short = 'o', long, default_value = "Lecture on Topic")]
        option: String,

        /// Expert persona
        #[arg(short, long, default_value = "Joanna")]
        expert: String,

        /// Charge model replies against this user's credits
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Coach v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Language model: {} via {}", cfg.llm.model, cfg.llm.base_url);

    let services = Arc::new(SessionServices::from_config(&cfg).await?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cfg, services).await,
        Command::Session {
            topic,
            option,
            expert,
            user,
        } => {
            let params = NewSession {
                topic,
                coaching_option: option,
                expert_name: expert,
                user_id: user,
            };
            run_session(services, params).await
        }
    }
}

async fn serve(cfg: &Config, services: Arc<SessionServices>) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let app = create_router(AppState::new(services));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down...");
            }
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn run_session(services: Arc<SessionServices>, params: NewSession) -> Result<()> {
    let session = CoachingSession::create(services, params).await?;
    let mut events = session.subscribe();
    println!("Session {} created", session.id());

    session.connect().await?;
    println!("\nListening. Press Ctrl+C to end the session.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, ending session...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event);
                    if matches!(event, SessionEvent::Ended { .. }) {
                        return Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} session events", skipped),
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }

    let report = session.disconnect().await?;
    println!(
        "\nSession ended: {} messages, saved={}",
        report.message_count, report.flushed
    );
    if let Some(text) = report.feedback.as_ref().and_then(|f| f.text()) {
        println!("\nFeedback:\n{}", text);
    }
    if let Some(recording) = &report.recording {
        println!(
            "\nRecording: {} ({:.1}s)",
            recording.file_path.display(),
            recording.duration_secs()
        );
    }

    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged { from, to } => println!("[state] {} -> {}", from, to),
        SessionEvent::Partial { segment } => println!("[partial] {}", segment.text),
        SessionEvent::Final { segment } => println!("[you] {}", segment.text),
        SessionEvent::MessageAppended { message, .. } => {
            println!("[{}] {}", message.role, message.content)
        }
        SessionEvent::Error { message } => println!("[error] {}", message),
        other => match serde_json::to_string(other) {
            Ok(json) => println!("[event] {}", json),
            Err(e) => warn!("Failed to render event: {}", e),
        },
    }
}
