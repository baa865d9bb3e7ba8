//! `cardlog` - CLI for the RFID scan recorder
//!
//! Runs the scan loop and web UI, and offers one-shot commands for scanning,
//! listing, renaming and exporting records.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use cardlog::cli::{
    Cli, Command, ConfigCommand, ExportCommand, ListCommand, RenameCommand, RunCommand,
    ScanCommand,
};
use cardlog::clock::{sync_policy, wait_for_sync};
use cardlog::pipeline::record_scan;
use cardlog::reader::parse_uid_line;
use cardlog::record::profiles_from_document;
use cardlog::{init_logging, server, AppContext, CardId, Config, LineReader, ScanOutcome};
use cardlog::{ScanPipeline, StopHandle};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // One control loop: the scan pipeline and the web server share a thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Command::Run(cmd) => runtime.block_on(handle_run(config, cmd)),
        Command::Scan(cmd) => runtime.block_on(handle_scan(&config, &cmd)),
        Command::List(cmd) => runtime.block_on(handle_list(&config, &cmd)),
        Command::Rename(cmd) => runtime.block_on(handle_rename(&config, &cmd)),
        Command::Export(cmd) => runtime.block_on(handle_export(&config, &cmd)),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_run(mut config: Config, cmd: RunCommand) -> anyhow::Result<()> {
    if let Some(device) = cmd.device {
        config.reader.device = Some(device);
    }
    if let Some(bind) = cmd.bind {
        config.server.bind_addr = bind;
    }

    let context = Arc::new(AppContext::from_config(&config)?);

    wait_for_sync(context.clock(), &sync_policy(&config.clock)).await;

    if let Err(e) = context.gateway().connect(&config.auth_policy()).await {
        warn!("Continuing without a store session: {e}");
    }

    let reader = LineReader::open(config.reader.device.as_deref()).await?;
    info!("Reading cards from {}", reader.source());

    let listener = if config.server.enabled && !cmd.no_server {
        let listener = TcpListener::bind(&config.server.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
        Some(listener)
    } else {
        info!("Web server disabled");
        None
    };

    let stop = StopHandle::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                signal_stop.stop();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    let router = server::app_router(context.clone());
    let server_stop = stop.clone();
    let serve = async move {
        match listener {
            Some(listener) => server::serve(listener, router, server_stop).await,
            None => Ok(()),
        }
    };

    let mut pipeline = ScanPipeline::new(reader, context);
    let (_stats, served) = tokio::join!(pipeline.run(config.poll_interval(), &stop), serve);
    served.context("web server failed")?;
    Ok(())
}

async fn handle_scan(config: &Config, cmd: &ScanCommand) -> anyhow::Result<()> {
    let uid = parse_uid_line(&cmd.uid)?;
    let context = AppContext::from_config(config)?;

    match record_scan(&context, &uid).await {
        ScanOutcome::Stored(record) => {
            println!("{}  {}", record.identifier, record.timestamp);
            Ok(())
        }
        ScanOutcome::Rejected(reason) => anyhow::bail!("card rejected: {reason}"),
        ScanOutcome::Failed(reason) => anyhow::bail!("scan not recorded: {reason}"),
        ScanOutcome::NoCard => Ok(()),
    }
}

async fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let context = AppContext::from_config(config)?;
    let document = context.read_all().await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    let profiles = profiles_from_document(&document);
    if profiles.is_empty() {
        println!("No cards recorded.");
        return Ok(());
    }
    println!("{:<22} {:<24} LAST SCANNED", "UID", "NAME");
    for profile in profiles {
        println!(
            "{:<22} {:<24} {}",
            profile.uid,
            profile.name.as_deref().unwrap_or("-"),
            profile.last_scanned.as_deref().unwrap_or("never"),
        );
    }
    Ok(())
}

async fn handle_rename(config: &Config, cmd: &RenameCommand) -> anyhow::Result<()> {
    let id = CardId::parse(&cmd.uid)?;
    let context = AppContext::from_config(config)?;
    context.rename(&id, &cmd.name).await?;
    println!("{id} is now {:?}", cmd.name);
    Ok(())
}

async fn handle_export(config: &Config, cmd: &ExportCommand) -> anyhow::Result<()> {
    let context = AppContext::from_config(config)?;
    let document = context.read_all().await?;
    let json = serde_json::to_string_pretty(&document)?;

    match &cmd.output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Exported records to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                let mut value = serde_json::to_value(config)?;
                if let Some(key) = value.pointer_mut("/store/api_key") {
                    if !key.is_null() {
                        *key = serde_json::Value::from("[REDACTED]");
                    }
                }
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Enabled:            {}", config.server.enabled);
                println!("  Bind address:       {}", config.server.bind_addr);
                println!();
                println!("[Store]");
                println!("  Backend:            {}", config.store.backend);
                println!("  Collection:         {}", config.store.collection);
                println!(
                    "  Database URL:       {}",
                    config.store.database_url.as_deref().unwrap_or("(none)")
                );
                println!(
                    "  API key:            {}",
                    if config.store.api_key.is_some() {
                        "[REDACTED]"
                    } else {
                        "(none)"
                    }
                );
                println!("  SQLite path:        {}", config.sqlite_path().display());
                println!();
                println!("[Clock]");
                match config.clock.utc_offset_secs {
                    Some(offset) => println!("  UTC offset (s):     {offset}"),
                    None => println!("  UTC offset (s):     system time zone"),
                }
                println!(
                    "  Daylight offset (s): {}",
                    config.clock.daylight_offset_secs
                );
                println!("  Sync attempts:      {}", config.clock.sync_max_attempts);
                println!();
                println!("[Reader]");
                match &config.reader.device {
                    Some(device) => println!("  Device:             {}", device.display()),
                    None => println!("  Device:             stdin"),
                }
                println!("  Poll interval (ms): {}", config.reader.poll_interval_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
