use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info};

use finance_coach::{chat, constants, web_server, CompletionClient, GeminiClient};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the web UI.
    Start {
        #[arg(long, env = "COACH_HOST", default_value = "127.0.0.1", help = "Address to bind the web server to.")]
        host: IpAddr,
        #[arg(long, env = "COACH_PORT", default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
    },
    /// Chat with the coach in the terminal.
    Chat,
    /// List the quick topics.
    Topics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for API_KEY)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,finance_coach=debug).
    // Logs go to stderr so they don't interleave with the terminal chat.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Finance coach starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Start { host, port } => {
            let client: Arc<dyn CompletionClient> = Arc::new(GeminiClient::from_env());
            if constants::API_KEY.is_none() {
                info!("API_KEY is not set; requests will fail until it is provided");
            }
            info!(model = client.model(), "Starting web UI on port {}...", port);

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(host, port, client).await {
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
        Commands::Chat => {
            let client = GeminiClient::from_env();
            chat::run_terminal_chat(&client)
                .await
                .context("Chat session failed")?;
            info!("Chat session finished.");
        }
        Commands::Topics => {
            for (i, topic) in constants::TOPICS.iter().enumerate() {
                println!("{:>2}. {}", i + 1, topic);
            }
        }
    }

    Ok(())
}
