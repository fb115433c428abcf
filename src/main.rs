use anyhow::{anyhow, Context, Result};
use apkdock::config::ServiceConfig;
use apkdock::logging::{init_tracing, init_tracing_json};
use apkdock::orchestrator::{JobOrchestrator, Upload};
use apkdock::registry::ToolRegistry;
use apkdock::runtime::DockerRuntime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "apkdock", version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run containerized APK scanners and normalize their findings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the upload API
    Serve {
        /// Listen port (overrides PORT and the config file)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Analyze one APK from the command line and print the report
    Run {
        /// Tool id, e.g. secureapk
        #[arg(short, long)]
        tool: String,
        /// Path to the APK
        apk: PathBuf,
    },
    /// Parse a saved result file with a tool's dialect
    Parse {
        /// Tool id whose output format the file uses
        #[arg(short, long)]
        tool: String,
        /// Path to the result file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        init_tracing_json();
    } else {
        init_tracing();
    }

    let mut config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let orchestrator = Arc::new(build_orchestrator(&config));
            orchestrator.prepare().await.context("preparing staging directories")?;
            orchestrator
                .sweep_stale()
                .await
                .context("sweeping stale job directories")?;
            for id in orchestrator.registry().ids() {
                tracing::info!("Created endpoint: /api/{}", id);
            }
            apkdock::server::serve(&config, orchestrator).await?;
        }
        Commands::Run { tool, apk } => {
            // No sweep here: a running server may share the staging root.
            let orchestrator = build_orchestrator(&config);
            orchestrator.prepare().await?;
            let upload = Upload::from_path(&apk)
                .await
                .with_context(|| format!("reading {}", apk.display()))?;
            let report = orchestrator.analyze(&tool, upload).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Parse { tool, file } => {
            let registry = ToolRegistry::builtin();
            let descriptor = registry
                .get(&tool)
                .ok_or_else(|| anyhow!("unknown tool '{}', expected one of {:?}", tool, registry.ids()))?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let findings = apkdock::parse(&raw, descriptor.dialect);
            println!("{}", serde_json::to_string_pretty(&findings)?);
        }
    }
    Ok(())
}

fn build_orchestrator(config: &ServiceConfig) -> JobOrchestrator {
    let runtime = Arc::new(DockerRuntime::new(config.docker.binary.clone()));
    JobOrchestrator::new(config, runtime)
}
