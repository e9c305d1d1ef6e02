// Vigil CLI - live security-alert feed and subscription management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use vigil_core::{FeedClient, FeedConfig, FeedEvent, SecurityAlert, Severity, SubscriptionClient};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Live GitHub security-alert feed client", long_about = None)]
#[command(version)]
struct Cli {
    /// Backend API base URL (overrides VIGIL_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live alerts to the terminal until Ctrl-C
    Watch {
        /// WebSocket endpoint (overrides VIGIL_WS_URL)
        #[arg(long)]
        url: Option<String>,

        /// Keep at most this many alerts in memory
        #[arg(long)]
        max_feed: Option<usize>,
    },

    /// List a user's public GitHub repositories via the backend
    Repos {
        /// GitHub username
        username: String,
    },

    /// List repositories currently subscribed for alerts
    Subscribed,

    /// Subscribe repositories for security alerts
    Subscribe {
        /// GitHub username owning the repositories
        username: String,

        /// Repository names (without the owner prefix)
        #[arg(required = true)]
        repositories: Vec<String>,
    },

    /// Remove a repository subscription
    Unsubscribe {
        /// GitHub username owning the repository
        username: String,

        /// Repository name
        repository: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigil=info".parse().unwrap())
                .add_directive("vigil_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = FeedConfig::load().context("failed to load configuration")?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }

    match cli.command {
        Commands::Watch { url, max_feed } => {
            if let Some(url) = url {
                config.ws_url = url;
            }
            if let Some(max) = max_feed {
                config.max_feed_len = Some(max);
            }
            watch(&config).await
        }
        Commands::Repos { username } => {
            let client = SubscriptionClient::new(&config.api_url);
            let list = client.github_repositories(&username).await?;
            println!("{} public repositories for {}:", list.total_count, username);
            for repo in list.repositories {
                let language = repo.language.as_deref().unwrap_or("-");
                println!(
                    "  {:<40} ⭐ {:<6} {}",
                    repo.full_name, repo.stargazers_count, language
                );
            }
            Ok(())
        }
        Commands::Subscribed => {
            let client = SubscriptionClient::new(&config.api_url);
            let subscriptions = client.subscribed().await?;
            if subscriptions.is_empty() {
                println!("No repositories subscribed");
            } else {
                println!("{} subscribed repositories:", subscriptions.len());
                for sub in subscriptions {
                    println!("  {}", sub.full_name);
                }
            }
            Ok(())
        }
        Commands::Subscribe {
            username,
            repositories,
        } => {
            let client = SubscriptionClient::new(&config.api_url);
            let response = client.subscribe(&username, &repositories).await?;
            println!("✅ {}", response.message);
            for sub in response.repositories {
                println!("  + {}", sub.full_name);
            }
            Ok(())
        }
        Commands::Unsubscribe {
            username,
            repository,
        } => {
            let client = SubscriptionClient::new(&config.api_url);
            let response = client.unsubscribe(&username, &repository).await?;
            println!("✅ {}", response.message);
            Ok(())
        }
    }
}

async fn watch(config: &FeedConfig) -> Result<()> {
    let mut client = FeedClient::new(config);
    let mut events = client
        .events()
        .context("event channel already taken")?;
    client.start()?;

    info!("watching {}", config.ws_url);
    println!("📡 Watching {} (Ctrl-C to stop)", config.ws_url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(FeedEvent::Alert(alert)) => print_alert(&alert),
                Some(FeedEvent::StateChanged(state)) => println!("-- connection {}", state),
                None => break,
            }
        }
    }

    client.stop().await;

    let metrics = client.metrics().await;
    println!(
        "session totals: {} alerts, {} critical, {} in the last hour",
        metrics.total, metrics.critical, metrics.recent
    );
    Ok(())
}

fn print_alert(alert: &SecurityAlert) {
    let icon = match alert.severity {
        Severity::Critical => "🚨",
        Severity::High => "⚠️",
        Severity::Medium => "🟡",
        Severity::Low => "🟢",
        Severity::Unknown => "⚪",
    };

    let package = if alert.package_name.is_empty() {
        String::new()
    } else if alert.package_version.is_empty() {
        format!(" {}", alert.package_name)
    } else {
        format!(" {}@{}", alert.package_name, alert.package_version)
    };

    let summary = if alert.summary.is_empty() {
        alert.action.clone()
    } else {
        alert.summary.clone()
    };

    println!(
        "{} [{}] {}{} {}",
        icon, alert.severity, alert.repository, package, summary
    );
}
