use std::io::Read;
use std::path::Path;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use hookline::application::messaging::{Context, HandlerResult};
use hookline::{
    after_fn, before_fn, handler_fn, open_store, BotError, Config, Dispatch, HandlerRegistry, MessageDispatcher,
};

#[derive(Parser)]
#[command(name = "hookline")]
#[command(about = "Webhook event dispatcher with per-conversation state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch one webhook payload (file path, or - for stdin)
    Dispatch { payload: String },
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dispatch { payload } => {
            if let Err(e) = dispatch(&cli.config, &payload).await {
                tracing::error!("Dispatch failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("hookline v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config(&cli.config);
        }
    }
}

fn load_config(path: &str) -> Result<Config, BotError> {
    if Path::new(path).exists() {
        let mut config = Config::load(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    } else {
        Ok(Config::load_env()?)
    }
}

fn read_payload(source: &str) -> Result<Value, BotError> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| BotError::Parse(format!("Failed to read stdin: {}", e)))?;
        buf
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| BotError::Parse(format!("Failed to read {}: {}", source, e)))?
    };
    serde_json::from_str(&text).map_err(|e| BotError::Parse(format!("Invalid payload JSON: {}", e)))
}

async fn dispatch(config_path: &str, source: &str) -> Result<(), BotError> {
    let config = load_config(config_path)?;
    tracing::info!("Starting {} ({} storage)", config.bot.name, config.storage.adapter);

    let payload = read_payload(source)?;
    let store = open_store(&config.storage).await?;
    let dispatcher = MessageDispatcher::new(demo_registry(), store);

    match dispatcher.dispatch(&payload).await? {
        Dispatch::NoEvent => println!("no actionable event"),
        Dispatch::Unrouted { sender_id } => println!("[{}] no handler", sender_id),
        Dispatch::Handled { kind, key, outcome } => {
            let reply = outcome.reply().unwrap_or("(skipped by before hook)");
            println!("{} {} -> {}", kind, key, reply);
        }
    }
    Ok(())
}

/// Built-in handlers used when replaying payloads from the command line
fn demo_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .with_command("/", handler_fn(echo))
        .with_command("/lang", handler_fn(set_lang))
        .with_command("/ask_name", handler_fn(ask_name))
        .with_action("ask_name", handler_fn(remember_name))
        .with_event("read", handler_fn(receipt))
        .with_event("delivery", handler_fn(receipt))
        .with_before(before_fn(|ctx: Context| async move {
            tracing::debug!("[{}] before {}", ctx.sender_id, ctx.command);
            Ok(true)
        }))
        .with_after(after_fn(|ctx: Context, outcome| async move {
            tracing::debug!("[{}] after {:?}", ctx.sender_id, outcome);
            Ok(())
        }))
}

async fn echo(ctx: Context) -> HandlerResult {
    match ctx.command.attachments() {
        [] => Ok(format!("You said: {}", ctx.command)),
        urls => Ok(format!("Received {} attachment(s)", urls.len())),
    }
}

async fn set_lang(ctx: Context) -> HandlerResult {
    let lang = ctx
        .param("code")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| ctx.payload.name.split_whitespace().nth(1).map(str::to_string));

    match lang {
        Some(lang) => {
            ctx.store.set_lang(&ctx.sender_id, Some(&lang)).await?;
            Ok(format!("Language set to {}", lang))
        }
        None => Ok(format!("Current language: {}", ctx.lang.as_deref().unwrap_or("none"))),
    }
}

async fn ask_name(ctx: Context) -> HandlerResult {
    ctx.store.set_action(&ctx.sender_id, Some("ask_name")).await?;
    Ok("What's your name?".to_string())
}

async fn remember_name(ctx: Context) -> HandlerResult {
    let name = ctx.command.body().trim().to_string();
    ctx.store.set_attr(&ctx.sender_id, "name", json!(name)).await?;
    Ok(format!("Nice to meet you, {}", name))
}

async fn receipt(ctx: Context) -> HandlerResult {
    Ok(format!("{} up to {}", ctx.command.source().map(|s| s.as_str()).unwrap_or("event"), ctx.command))
}

fn init_config(path: &str) {
    if Path::new(path).exists() {
        eprintln!("{} already exists", path);
        std::process::exit(1);
    }
    let yaml = match Config::default_yaml() {
        Ok(yaml) => yaml,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    match std::fs::write(path, yaml) {
        Ok(()) => println!("Wrote default config to {}", path),
        Err(e) => {
            eprintln!("Failed to write {}: {}", path, e);
            std::process::exit(1);
        }
    }
}
