use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use integration_gateway::webhooks::compute_signature;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the integration gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key. Falls back to GATEWAY_ADMIN_KEY.
    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List integrations with status and circuit state
    Integrations,
    /// Show one integration, its circuit and quota
    Integration { id: String },
    /// Force an integration's circuit breaker closed
    ResetCircuit { id: String },
    /// Compute a webhook signature for a payload file
    Sign {
        /// File holding the exact request body
        body: PathBuf,
        /// Shared webhook secret. Falls back to GATEWAY_WEBHOOK_SECRET.
        #[arg(short, long, env = "GATEWAY_WEBHOOK_SECRET")]
        secret: String,
        /// Timestamp to bind into the signature
        #[arg(short, long)]
        timestamp: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let request = match &cli.command {
        Commands::Sign { body, secret, timestamp } => {
            let body = std::fs::read(body)?;
            println!("sha256={}", compute_signature(secret.as_bytes(), timestamp.as_deref(), &body));
            return Ok(());
        }
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Integrations => client.get(format!("{}/admin/integrations", cli.url)),
        Commands::Integration { id } => client.get(format!("{}/admin/integrations/{}", cli.url, id)),
        Commands::ResetCircuit { id } => {
            client.post(format!("{}/admin/integrations/{}/circuit/reset", cli.url, id))
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
