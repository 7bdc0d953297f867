use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use advisor::config::load_secret;
use advisor::{chat, constants, web_server, Category, CompletionClient, Config};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Model identifier sent to the completion service.
    #[arg(long, global = true, env = "ADVISOR_MODEL")]
    model: Option<String>,
    /// Base URL of the completion service.
    #[arg(long, global = true, env = "ADVISOR_API_BASE")]
    api_base: Option<String>,
    /// Secrets file holding GEMINI_API_KEY.
    #[arg(long, global = true, env = "ADVISOR_SECRETS")]
    secrets: Option<PathBuf>,
    /// Do not ask the model for the dashboard JSON block.
    #[arg(long, global = true)]
    no_dashboard: bool,
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the advisor web page.
    Serve {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
    },
    /// Chat with the advisor in the terminal.
    Chat {
        #[arg(long, default_value = "strategy", help = "strategy, idea-gen or competition.")]
        mode: String,
    },
    /// Ask a single question and print the reply.
    Ask {
        /// strategy, idea-gen or competition.
        mode: String,
        query: String,
    },
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(api_base) = &self.api_base {
            config.api_base = api_base.clone();
        }
        if let Some(secrets) = &self.secrets {
            config.secrets_path = secrets.clone();
        }
        config.dashboard = !self.no_dashboard;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-secret settings only)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,advisor=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Advisor starting with command: {:?}", cli.command);

    let config = cli.config();
    let credential = load_secret(&config.secrets_path).context("Failed to read secret store")?;
    let client = CompletionClient::from_config(&config, credential).context("Failed to build completion client")?;

    match cli.command {
        Commands::Serve { port } => {
            info!("Starting advisor web server on port {}...", port);
            let state = web_server::AppState::new(config, client).context("Failed to initialize web state")?;

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, state).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat { mode } => {
            let mode: Category = mode.parse()?;
            chat::run_chat(&config, client, mode)
                .await
                .context("Chat session failed")?;
        }
        Commands::Ask { mode, query } => {
            let mode: Category = mode.parse()?;
            let reply = client.generate_response(mode, &query).await;
            let split = advisor::split_reply(&reply);
            println!("{}", split.prose);
            if let Some(record) = split.record {
                print!("{}", advisor::Dashboard::from_record(&record).to_text());
            }
        }
    }

    Ok(())
}
