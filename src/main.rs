use std::path::Path;

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use courier::{
    config::{
        EngineConfig, EngineConfigValidator, STARTER_CONFIG, assembly, loader::load_config,
    },
    tracing_setup,
    utils::ShutdownSignal,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "routes.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate a route configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "routes.yaml")]
        config: String,
    },
    /// Write a starter configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "routes.yaml")]
        config: String,
    },
    /// Start the engine and run routes until interrupted (default)
    Run {
        /// Configuration file to use
        #[clap(short, long, default_value = "routes.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Run { config }) => run(&config).await,
        None => run(&args.config).await,
    }
}

async fn run(config_path: &str) -> Result<()> {
    let config: EngineConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing_with_config(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    EngineConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;

    tracing::info!("Loaded configuration from {config_path}");
    let ctx = assembly::assemble(&config).await?;

    let shutdown = ShutdownSignal::new();
    if let Err(e) = ctx.start().await {
        tracing::error!(error = %e, "Failed to start context, unwinding");
        if let Err(stop_err) = ctx.stop().await {
            tracing::error!(error = %stop_err, "Failed to stop partially started context");
        }
        return Err(e).context("Failed to start routes");
    }
    tracing::info!(
        context = %ctx.name(),
        routes = ctx.started_route_count(),
        "Courier is running"
    );

    let reason = shutdown.wait().await?;
    tracing::info!(?reason, "Shutting down");

    ctx.stop().await.context("Failed to stop routes cleanly")?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match EngineConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Name: {}", config.name);
            println!("   • Components: {}", config.enabled_schemes().join(", "));
            println!("   • Routes: {}", config.routes.len());
            for route in &config.routes {
                println!(
                    "     - {} <- {} ({} steps)",
                    route.id,
                    route.from,
                    route.steps.len()
                );
            }
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Give every route a unique, non-empty id");
            println!("   • Write URIs as '<scheme>:<rest>', e.g. 'mem:orders'");
            println!("   • Enable the component for every scheme you use");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, STARTER_CONFIG)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'courier run --config {config_path}' to start the engine");
    Ok(())
}
