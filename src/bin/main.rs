use anyhow::Result;
use clap::{Parser, Subcommand};
use server_init::{
    ConfigStores, InitOrchestrator, ServerInitOptions, load_options, run_server_init,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "server-init")]
#[command(about = "Run server initialization scripts before the server starts")]
struct Cli {
    /// Path to a JSON document with a `serverInit` section
    #[arg(long, global = true, env = "SERVER_INIT_CONFIG")]
    config: Option<PathBuf>,
    /// Project root that script names are resolved against
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Script to run; repeat to run several in order (overrides the config file)
    #[arg(long = "script", global = true)]
    scripts: Vec<String>,
    /// Only report warnings and errors
    #[arg(long, global = true, default_value_t = false)]
    silent: bool,
    /// Program used to evaluate JavaScript modules
    #[arg(long, global = true)]
    node: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every script and print the merged configuration stores as JSON
    Run {
        /// Initial stores as JSON: {"runtimeConfig": {...}, "appConfig": {...}}
        #[arg(long)]
        initial: Option<String>,
        /// Print the run report instead of the stores
        #[arg(long, default_value_t = false)]
        report: bool,
    },
    /// Resolve the configured scripts and list them without running anything
    Resolve,
}

#[derive(serde::Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct InitialStores {
    #[serde(default)]
    runtime_config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    app_config: serde_json::Map<String, serde_json::Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.silent { "server_init=warn" } else { "server_init=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let options = build_options(&cli)?;

    match cli.command {
        Commands::Run { initial, report } => {
            let mut stores = match initial {
                Some(raw) => {
                    let initial: InitialStores = serde_json::from_str(&raw)?;
                    ConfigStores::new(initial.runtime_config, initial.app_config)
                }
                None => ConfigStores::default(),
            };

            let run = run_server_init(options, &mut stores)
                .await
                .inspect_err(|e| tracing::error!("Server initialization halted: {}", e))?;

            info!(
                "Server initialization complete: {} passed, {} failed but continued",
                run.passed(),
                run.failed()
            );

            if report {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&stores)?);
            }
        }
        Commands::Resolve => {
            let orchestrator = InitOrchestrator::from_options(options)?;
            let scripts = orchestrator.resolve_scripts().await?;

            if scripts.is_empty() {
                println!("No server initialization scripts to run.");
                return Ok(());
            }

            println!("{:<4} {:<24} {}", "#", "NAME", "PATH");
            println!("{}", "-".repeat(80));
            for (idx, script) in scripts.iter().enumerate() {
                println!(
                    "{:<4} {:<24} {}",
                    idx + 1,
                    script.name,
                    script.path.display()
                );
            }
        }
    }

    Ok(())
}

/// Config file first, then command-line overrides.
fn build_options(cli: &Cli) -> Result<ServerInitOptions> {
    let mut options = match &cli.config {
        Some(path) => ServerInitOptions::load(path)?,
        None => load_options()?,
    };

    if !cli.scripts.is_empty() {
        options = options.with_scripts(cli.scripts.iter().cloned());
    }
    if let Some(root) = &cli.root {
        options = options.with_root_dir(root.clone());
    }
    if cli.silent {
        options = options.with_silent(true);
    }
    if let Some(node) = &cli.node {
        options.node_command = vec![node.clone()];
    }

    Ok(options)
}
