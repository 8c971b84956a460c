use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use snowfakery_mcp::config::Config;
use snowfakery_mcp::engine::{RecipeEngine, SnowfakeryCli};
use snowfakery_mcp::mcp::McpServer;
use snowfakery_mcp::sandbox::{SecretScrubber, WorkspacePaths};
use snowfakery_mcp::tools::{ToolContext, ToolExecutor};

fn setup_logging(default_level: &str) -> Result<()> {
    // stdout carries JSON-RPC, so logs go to a file
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snowfakery-mcp")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("snowfakery-mcp.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();
    builder.parse_filters(default_level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_context(config: Config) -> Result<ToolContext> {
    let root = config.workspace_root()?;
    let paths = WorkspacePaths::new(&root).context(format!("Invalid workspace root {}", root.display()))?;
    let engine: Arc<dyn RecipeEngine> = Arc::new(SnowfakeryCli::new(&config.engine));
    let ctx = ToolContext::new(Arc::new(config), paths, engine, SecretScrubber::from_env())
        .context("Failed to load bundled content")?;
    Ok(ctx)
}

fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        eprintln!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None | Some(Commands::Serve) => serve(config),
        Some(Commands::Call { tool, args }) => call_tool(config, tool, args.as_deref()),
        Some(Commands::Tools) => list_tools(),
        Some(Commands::Config) => show_config(&config),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start tokio runtime")
}

fn serve(config: Config) -> Result<()> {
    let ctx = build_context(config)?;
    info!("Serving MCP on stdio from {}", ctx.paths.root().display());
    let server = Arc::new(McpServer::new(ctx, ToolExecutor::standard()));
    runtime()?.block_on(async move {
        server
            .serve(tokio::io::stdin(), tokio::io::stdout())
            .await
            .context("MCP server failed")
    })
}

fn call_tool(config: Config, tool: &str, args: Option<&str>) -> Result<()> {
    let input: serde_json::Value = match args {
        Some(text) => serde_json::from_str(text).context("--args must be a JSON object")?,
        None => serde_json::json!({}),
    };
    let ctx = build_context(config)?;
    let executor = ToolExecutor::standard();

    let result = runtime()?
        .block_on(executor.call(tool, input, &ctx))
        .ok_or_else(|| eyre!("Unknown tool: {} (see `snowfakery-mcp tools`)", tool))?;

    println!("{}", serde_json::to_string_pretty(&result.structured)?);
    if result.is_error {
        return Err(eyre!("{} reported an error", tool));
    }
    eprintln!("{} {}", "ok:".green(), tool);
    Ok(())
}

fn list_tools() -> Result<()> {
    for def in ToolExecutor::standard().definitions() {
        println!("{}\n    {}", def.name.cyan(), def.description);
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let root = config.workspace_root()?;
    println!("{} {}", "Workspace root:".green(), root.display());
    print!("{}", serde_yaml::to_string(config).context("Failed to serialise config")?);
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration, then environment and flag overrides
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.apply_env().context("Invalid environment override")?;
    if let Some(root) = &cli.workspace_root {
        config.workspace_root = Some(root.clone());
    }

    setup_logging(config.log_level.as_deref().unwrap_or("info")).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, config).context("Application failed")?;

    Ok(())
}
