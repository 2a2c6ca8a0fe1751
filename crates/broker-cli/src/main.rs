use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use broker_core::Broker;
use broker_store::PublishRequest;

/// Event store and webhook broker.
#[derive(Debug, Parser)]
#[command(name = "broker", version, about = "Event store and webhook broker")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Seed the control plane (idempotent) and exit.
    Bootstrap,
    /// Bootstrap, then idle so dispatchers keep delivering until Ctrl-C.
    Serve,
    /// Publish a single event to a topic.
    Publish {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        topic: String,
        #[arg(long = "type")]
        event_type: String,
        /// JSON payload, e.g. '{"amount": 10}'
        #[arg(long)]
        payload: String,
    },
    /// Exchange an admin email and password for a session id.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = broker_config::load().context("failed to load configuration")?;

    match cli.cmd {
        Commands::Bootstrap => {
            let broker = Broker::bootstrap(&config).await?;
            info!(tenant_id = %broker.system_tenant_id, "bootstrap complete");
            broker.dispatcher.shutdown().await;
        }
        Commands::Serve => {
            let broker = Broker::bootstrap(&config).await?;
            info!(tenant_id = %broker.system_tenant_id, "broker running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            broker.dispatcher.shutdown().await;
        }
        Commands::Publish { tenant, namespace, topic, event_type, payload } => {
            let broker = Broker::bootstrap(&config).await?;
            let payload: serde_json::Value = serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let request = PublishRequest { tenant: tenant.clone(), namespace: namespace.clone(), topic: topic.clone(), event_type, payload };
            let ids = broker.publish_pipeline.publish(&tenant, &namespace, &topic, &[request]).await?;
            for id in ids {
                println!("{id}");
            }
            broker.dispatcher.shutdown().await;
        }
        Commands::Login { email, password } => {
            let broker = Broker::bootstrap(&config).await?;
            let (user_id, password_hash) = {
                let state = broker.projections.read().await;
                let user = state.projections.user_by_email(&email).context("no such user")?;
                (user.id, user.password_hash.clone())
            };
            let session_id = broker.auth.login(user_id, &password, &password_hash).await?;
            println!("{session_id}");
            broker.dispatcher.shutdown().await;
        }
    }

    Ok(())
}
