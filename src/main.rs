use std::sync::Arc;

mod config;
mod db;
mod engine;
mod error;
mod models;
mod push;
mod server;

use config::Config;
use db::Repository;
use engine::dispatch::run_dispatch;
use error::Result;
use push::PushSender;
use server::{start_server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Check for --run flag (one headless dispatch run, no server)
    let headless_run = args.len() >= 2 && args[1] == "--run";
    if args.len() >= 2 && !headless_run {
        return Err(anyhow::anyhow!("Unknown argument: {}", args[1]).into());
    }

    let config = Config::load()?;
    let repo = Repository::new(&config.db_path).await?;
    let sender = PushSender::new(&config)?;

    let state = Arc::new(AppState {
        config,
        repo,
        sender,
    });

    if headless_run {
        let report = run_dispatch(&state.repo, &state.sender).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    start_server(state).await
}
