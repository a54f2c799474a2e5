// src/main.rs

mod cli;

use anyhow::{bail, Context};
use cli::{position_to_index, Cli, Commands, KeyCommands};
use gemini_key_pool::config::{load_api_keys_from_env, load_config};
use gemini_key_pool::{
    build_pool, AppConfig, AppError, GeminiClient, GenerateRequest, KeyPool, RemoteCall,
};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn init_tracing(cli: &Cli) {
    let env_filter =
        EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

/// Cancels `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!(signal = "Ctrl+C", "Received signal. Cancelling pending retry...");
            token.cancel();
        }
    });
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn checked_index(position: usize) -> anyhow::Result<usize> {
    match position_to_index(position) {
        Some(index) => Ok(index),
        None => bail!("Key positions start at 1"),
    }
}

async fn list_keys(pool: &KeyPool, json: bool) -> anyhow::Result<()> {
    let snapshot = pool.snapshot().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    if snapshot.is_empty() {
        println!("No API keys configured.");
        return Ok(());
    }

    println!(
        "{:<4} {:<14} {:<11} {:>8} {:>6}  {:<20}  LAST ERROR",
        "#", "KEY", "STATUS", "FAILURES", "CALLS", "LAST USED"
    );
    for status in snapshot {
        let marker = if status.is_preferred { "*" } else { " " };
        let last_used = status
            .health
            .last_used_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<4} {:<14} {:<11} {:>8} {:>6}  {:<20}  {}",
            format!("{}{}", status.index + 1, marker),
            status.preview,
            status.status.label(),
            status.health.consecutive_failures,
            status.health.total_calls,
            last_used,
            status.health.last_error.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn import_env_keys(pool: &KeyPool) -> anyhow::Result<()> {
    let keys = load_api_keys_from_env();
    if keys.is_empty() {
        bail!("No keys found in GEMINI_API_KEY_n, GEMINI_API_KEY or GEMINI_API_KEYS");
    }

    let mut added = 0usize;
    for key in &keys {
        match pool.add_credential(key).await {
            Ok(()) => added += 1,
            Err(AppError::InvalidCredential(reason)) => {
                warn!(api_key.preview = %gemini_key_pool::credential::preview_key(key), reason = %reason, "Skipping key");
            }
            Err(e) => return Err(e.into()),
        }
    }
    println!("Imported {added} of {} keys.", keys.len());
    Ok(())
}

async fn run_keys(action: KeyCommands, config: &AppConfig) -> anyhow::Result<()> {
    let pool = build_pool(config).await.context("Failed to open key pool")?;
    match action {
        KeyCommands::List { json } => list_keys(&pool, json).await?,
        KeyCommands::Add { key } => {
            pool.add_credential(&key).await?;
            println!(
                "Added {} as key #{}.",
                gemini_key_pool::credential::preview_key(&key),
                pool.len().await
            );
        }
        KeyCommands::Remove { position } => {
            let removed = pool.remove_credential(checked_index(position)?).await?;
            println!("Removed key #{position} ({}).", removed.preview());
        }
        KeyCommands::Reset { position } => {
            pool.reset_health_at(checked_index(position)?).await?;
            println!("Health of key #{position} reset.");
        }
        KeyCommands::ImportEnv => import_env_keys(&pool).await?,
    }
    Ok(())
}

async fn run_generate(
    prompt: String,
    model: Option<String>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let pool = build_pool(config).await.context("Failed to open key pool")?;
    let client = GeminiClient::new(&config.gemini)?;

    let mut request = GenerateRequest::new(prompt);
    if let Some(model) = model {
        request = request.with_model(model);
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let outcome = pool
        .invoke_with_cancel(&cancel, |credential| {
            let client = &client;
            let request = &request;
            async move { client.call(&credential, request).await }
        })
        .await;

    match outcome {
        Ok(response) => {
            println!("{}", response.text);
            Ok(())
        }
        Err(e) => {
            let pool_size = pool.len().await;
            bail!(e.user_message(pool_size))
        }
    }
}

fn run_config_validate(path: &Path, verbose: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    println!("Configuration at {} is valid.", path.display());
    if verbose {
        println!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    let path = config_path(&cli);
    match cli.command {
        Commands::Config { file, verbose } => {
            let target = file.unwrap_or(path);
            run_config_validate(&target, verbose)
        }
        Commands::Keys { action } => {
            let config = load_config(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            run_keys(action, &config).await
        }
        Commands::Generate { prompt, model } => {
            let config = load_config(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            run_generate(prompt, model, &config).await
        }
    }
}
