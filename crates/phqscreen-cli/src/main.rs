mod config;

use clap::{Parser, Subcommand};
use config::ScreenConfig;
use phqscreen_core::SessionId;
use phqscreen_gateway::{AuthConfig, GatewayServer};
use phqscreen_scoring::{render_markdown, HttpClassifier};
use phqscreen_session::{
    FileSummaryStore, FileUtteranceStore, FixedResponder, IntentResponder, Responder,
    ScreeningService, SummaryStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "phqscreen", about = "PHQ-9 conversational screening backend")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "phqscreen.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect stored session summaries
    Summaries {
        #[command(subcommand)]
        action: SummariesAction,
    },
    /// Print the Markdown report of a closed session
    Report {
        /// Session id
        id: String,
    },
}

#[derive(Subcommand)]
enum SummariesAction {
    /// List stored summaries, newest first
    List,
    /// Print one summary as JSON
    Show {
        /// Session id
        id: String,
    },
}

async fn build_responder(
    config: &ScreenConfig,
    config_dir: &Path,
) -> anyhow::Result<Arc<dyn Responder>> {
    match &config.responder.intents_path {
        Some(path) => {
            let path = config_dir.join(path);
            let responder = IntentResponder::load(&path).await?;
            info!(
                intents = responder.intent_count(),
                path = %path.display(),
                "Intents loaded"
            );
            Ok(Arc::new(responder))
        }
        None => Ok(Arc::new(FixedResponder(
            config.responder.default_reply.clone(),
        ))),
    }
}

async fn fetch_summary(
    config: &ScreenConfig,
    raw_id: &str,
) -> anyhow::Result<phqscreen_core::SessionSummary> {
    let id = SessionId::parse(raw_id)?;
    let store = FileSummaryStore::new(config.summaries_dir()).await?;
    store
        .get(&id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No summary stored for session {id}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = ScreenConfig::load(&cli.config).await?;

    // Relative intents paths resolve against the config file's directory
    let config_dir = cli
        .config
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let classifier_config = config.classifier.clone().ok_or_else(|| {
                anyhow::anyhow!("[classifier] endpoint must be configured to serve")
            })?;
            let classifier = Arc::new(HttpClassifier::new(classifier_config)?);

            let utterances = Arc::new(FileUtteranceStore::new(config.messages_dir()).await?);
            let summaries = Arc::new(FileSummaryStore::new(config.summaries_dir()).await?);
            let responder = build_responder(&config, &config_dir).await?;

            let auth_config = AuthConfig::new(config.security.api_keys.clone());
            if auth_config.is_enabled() {
                info!(keys = config.security.api_keys.len(), "API key auth enabled");
            }

            let service = Arc::new(ScreeningService::new(
                utterances, summaries, classifier, responder,
            ));
            let app = GatewayServer::build_with_auth(service, auth_config);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(data_dir = %config.data_dir.display(), "phqscreen listening on {addr}");
            axum::serve(listener, app).await?;
        }
        Commands::Summaries { action } => match action {
            SummariesAction::List => {
                let store = FileSummaryStore::new(config.summaries_dir()).await?;
                let listings = store.list().await?;
                if listings.is_empty() {
                    println!("No session summaries stored.");
                } else {
                    for l in &listings {
                        println!(
                            "{}  {}  score={:<2} {:<17} messages={}",
                            l.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            l.session_id,
                            l.total_score,
                            l.severity_band.label(),
                            l.message_count
                        );
                    }
                    println!("\nTotal: {} session(s)", listings.len());
                }
            }
            SummariesAction::Show { id } => {
                let summary = fetch_summary(&config, &id).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        },
        Commands::Report { id } => {
            let summary = fetch_summary(&config, &id).await?;
            print!("{}", render_markdown(&summary));
        }
    }

    Ok(())
}
