//! hotlog: YAML-configured logger with hot-reloaded log level
//!
//! Loads `config.yaml` from the working directory, logs to the console and a
//! size-rotated file, and re-applies `log.level` whenever the file changes.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use hotlog::config::{self, ConfigService, DEFAULT_CONFIG};
use hotlog::{field, AppContext, AppOptions, Encoding, Logger, LoggerOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Run { development } => run(&cli, development).await?,
        Commands::Init { ref path } => {
            let config_path = path.clone().unwrap_or_else(ConfigService::default_path);
            ConfigService::generate_at(&config_path)?;
            if !cli.quiet {
                eprintln!("Configuration file created at: {}", config_path.display());
            }
        }
        Commands::Check => check(&cli)?,
        Commands::Version => {
            println!("hotlog {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn run(cli: &Cli, development: bool) -> Result<()> {
    let options = AppOptions {
        config_path: cli.config.clone(),
        auto_create_default: !cli.no_auto_create,
        logger: LoggerOptions {
            encoding: encoding(cli),
            name: Some("hotlog".to_string()),
            development,
            ..Default::default()
        },
        ..Default::default()
    };

    let app = AppContext::init(options)?;
    app.logger().install_global()?;

    let logger = app.logger().clone();
    logger.info(
        "hotlog started",
        &[
            field("config", app.config().path().display().to_string()),
            field("level", logger.level().to_string()),
        ],
    );
    log_each_level(&logger);

    let quiet = cli.quiet;
    app.start_reloading_with(move |event| {
        if !quiet {
            println!("Config file changed: {}", event.path.display());
        }
        log_each_level(&logger);
    })?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    app.shutdown().await;
    Ok(())
}

fn check(cli: &Cli) -> Result<()> {
    let path = ConfigService::resolve(cli.config.as_deref(), Path::new("."));
    let created = !cli.no_auto_create && !path.exists();
    let snapshot = ConfigService::load_or_create(&path, !cli.no_auto_create).with_context(|| {
        format!("Fatal error config file: {}\nFile content include:\n{DEFAULT_CONFIG}", path.display())
    })?;

    let warnings = config::validate(&snapshot)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        let policy = snapshot.rotation_policy();
        println!("config: {}", path.display());
        println!("level: {}", snapshot.log_level());
        println!("logrotate.filename: {}", policy.filename.display());
        println!("logrotate.maxsize: {} MB", policy.max_size_mb);
        println!("logrotate.maxbackups: {}", policy.max_backups);
        println!("logrotate.maxage: {} days", policy.max_age_days);
        println!("logrotate.compress: {}", policy.compress);
    }

    if !cli.quiet {
        if created {
            eprintln!("Configuration file created at: {}", path.display());
        }
        for warning in &warnings {
            eprintln!("warning: {warning}");
        }
        eprintln!("Configuration is valid.");
    }
    Ok(())
}

fn encoding(cli: &Cli) -> Encoding {
    if cli.json {
        Encoding::Json
    } else {
        Encoding::Console
    }
}

fn log_each_level(logger: &Logger) {
    logger.info("Info", &[]);
    logger.debug("Debug", &[]);
    logger.warn("Warn", &[]);
    logger.error("Error", &[]);
}
