use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tackle::gate::{AuthGate, SeedAdmin};
use tackle::metrics::Metrics;
use tackle::store::SqliteStore;
use tackle::{api, cli, config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tackle=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Token { command }) => {
            let store = connect(&cfg).await?;
            handle_token_command(&store, command).await
        }
        Some(cli::Commands::Admin { command }) => {
            let store = connect(&cfg).await?;
            handle_admin_command(&store, &cfg, command).await
        }
        None => run_server(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn connect(cfg: &config::Config) -> anyhow::Result<SqliteStore> {
    let store = SqliteStore::connect(&cfg.database_url).await?;
    store.migrate().await?;
    Ok(store)
}

fn seed_admin(cfg: &config::Config) -> Option<SeedAdmin> {
    cfg.bootstrap_admin_token.as_ref().map(|token| SeedAdmin {
        token: token.clone(),
        description: cfg.bootstrap_admin_desc.clone(),
    })
}

async fn run_server(cfg: config::Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(cfg.port);

    tracing::info!("Connecting to database...");
    let store = connect(&cfg).await?;

    let state = Arc::new(AppState {
        gate: AuthGate::new(store, seed_admin(&cfg)),
        metrics: Metrics::new(),
        config: cfg,
    });

    let app = api::app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("tackle listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_token_command(store: &SqliteStore, cmd: cli::TokenCommands) -> anyhow::Result<()> {
    match cmd {
        cli::TokenCommands::Add {
            token,
            desc,
            limit,
            relative,
        } => {
            store
                .upsert_token(&token, desc.as_deref(), limit, relative)
                .await?;
            println!("Token stored: {}", token);
        }
        cli::TokenCommands::Remove { token } => {
            if store.remove_token(&token).await? {
                println!("Token removed.");
            } else {
                println!("Token not found.");
            }
        }
        cli::TokenCommands::Show { token } => match store.get_token(&token).await? {
            Some(details) => {
                println!("Token:      {}", token);
                println!("Desc:       {}", details.description.as_deref().unwrap_or("-"));
                println!("Call count: {}", details.call_count);
                match details.call_count_limit {
                    Some(limit) => println!("Limit:      {}", limit),
                    None => println!("Limit:      unlimited"),
                }
                if !details.call_count_breakdown.is_empty() {
                    println!("Breakdown:");
                    for (endpoint, count) in &details.call_count_breakdown {
                        println!("  {:<40} {}", endpoint, count);
                    }
                }
            }
            None => println!("Token not found."),
        },
        cli::TokenCommands::List => {
            let tokens = store.list_tokens().await?;
            if tokens.is_empty() {
                println!("No tokens found.");
            } else {
                for token in tokens {
                    println!("{}", token);
                }
            }
        }
    }
    Ok(())
}

async fn handle_admin_command(
    store: &SqliteStore,
    cfg: &config::Config,
    cmd: cli::AdminCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::AdminCommands::Add { token, desc } => {
            store.upsert_admin_token(&token, &desc).await?;
            println!("Admin token stored: {}", token);
        }
        cli::AdminCommands::Remove { token } => {
            if store.remove_admin_token(&token).await? {
                println!("Admin token removed.");
            } else {
                println!("Admin token not found.");
            }
        }
        cli::AdminCommands::Check { token } => {
            let gate = AuthGate::new(store.clone(), seed_admin(cfg));
            if gate.is_admin_valid(&token).await? {
                println!("Valid.");
            } else {
                println!("Invalid.");
            }
        }
        cli::AdminCommands::List => {
            let tokens = store.list_admin_tokens().await?;
            if tokens.is_empty() {
                println!("No admin tokens found.");
            } else {
                for token in tokens {
                    println!("{}", token);
                }
            }
        }
    }
    Ok(())
}
