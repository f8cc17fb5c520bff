use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tollgate::issuer::TokenIssuer;
use tollgate::settings::{Logging, Settings};
use tollgate::web;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "tollgate",
    version,
    about = "Token service for container registry bearer authentication"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;

    // logging
    init_logging(&settings.logging)?;
    tracing::info!(?settings, "Loaded configuration");

    // keys and authorizer chain
    let issuer = Arc::new(TokenIssuer::from_settings(&settings)?);

    // start web server
    web::serve(settings, issuer).await?;
    Ok(())
}

fn init_logging(cfg: &Logging) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .into_diagnostic()?;
            fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => fmt().with_env_filter(env_filter).init(),
    }
    Ok(())
}
