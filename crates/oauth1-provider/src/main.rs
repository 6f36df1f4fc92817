//! OAuth 1.0 Token Provider - Demo Entry Point
//!
//! Runs one three-legged handshake against the in-memory backends and prints the
//! resulting access token.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use oauth1_provider::models::{OAuthPermission, RequestTokenRegistration, ResourceOwner};
use oauth1_provider::registry::{
    ClientRegistration, InMemoryClientRegistry, InMemoryPermissionCatalog,
};
use oauth1_provider::store::InMemoryTokenStore;
use oauth1_provider::{Config, TokenLifecycle};

#[derive(Parser, Debug)]
#[command(name = "oauth1-provider")]
#[command(about = "Walk through a three-legged OAuth 1.0 handshake")]
#[command(version)]
struct Cli {
    /// Permissions the demo client requests (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "read")]
    permissions: Vec<String>,

    /// Resource owner who approves the request
    #[arg(long, default_value = "alice")]
    resource_owner: String,

    /// Request token lifetime in seconds (overrides OAUTH_REQUEST_TOKEN_LIFETIME_SECS)
    #[arg(long)]
    request_token_lifetime: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = Config::from_env()?;
    if let Some(secs) = cli.request_token_lifetime {
        anyhow::ensure!(secs > 0, "--request-token-lifetime must be positive");
        config.request_token_lifetime = chrono::Duration::seconds(secs);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?config, "Starting OAuth provider demo");

    let registry = InMemoryClientRegistry::new();
    let client = registry
        .register(
            ClientRegistration::new(["read", "write"])
                .with_name("Demo Printer")
                .with_callback("https://printer.example.com/ready"),
        )
        .await?;
    let catalog = InMemoryPermissionCatalog::new([
        OAuthPermission::new("read", "Read data").default_granted(),
        OAuthPermission::new("write", "Upload photos on your behalf"),
    ]);

    let provider = Arc::new(TokenLifecycle::new(
        Arc::new(registry),
        Arc::new(catalog),
        Arc::new(InMemoryTokenStore::new()),
        config,
    ));
    let cleanup = Arc::clone(&provider).start_cleanup_task();

    let registration = RequestTokenRegistration::new(&client.client_id)
        .with_permissions(cli.permissions);
    let request = provider.create_request_token(registration).await?;
    let verifier = provider
        .set_request_token_verifier(&request, ResourceOwner::new(cli.resource_owner))
        .await?;
    let access = provider.create_access_token(&request, &verifier).await?;

    match provider.create_access_token(&request, &verifier).await {
        Ok(_) => anyhow::bail!("request token was exchanged twice"),
        Err(e) => tracing::info!(
            kind = ?e.kind(),
            oauth_problem = ?e.oauth_problem(),
            "Replay rejected as expected"
        ),
    }

    println!("{}", serde_json::to_string_pretty(&access)?);

    cleanup.abort();
    Ok(())
}
