use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use advisory_backend::config::AppConfig;

mod commands;

use commands::{handle_migrate, handle_serve};

#[derive(Parser)]
#[command(name = "advisory-backend")]
#[command(about = "Intake, billing and notification backend for the advisory site")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending migrations, then serve the HTTP API
    Serve {
        #[arg(long, env = "INTERFACE", default_value = "0.0.0.0")]
        interface: String,
        #[arg(long, env = "PORT", default_value_t = 5000)]
        port: u16,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

fn init_sentry(app_env: &str) -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|v| !v.is_empty())?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: Some(env!("CARGO_PKG_VERSION").into()),
            environment: Some(app_env.to_string().into()),
            attach_stacktrace: true,
            ..Default::default()
        },
    )))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,advisory_backend=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
    let _sentry = init_sentry(&app_env);
    init_tracing();

    info!("Starting advisory-backend v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { interface, port } => {
            let config = AppConfig::from_env().context("Failed to load configuration")?;
            info!(app_env = %config.app_env, "Configuration loaded");
            handle_serve(config, interface, port).await
        }
        Commands::Migrate => {
            let database_url =
                std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
            handle_migrate(database_url).await
        }
    }
}
