use anyhow::{Context, Result};
use chaincore::{ApiKeys, ExecutionEvent, NodeEvent, NodeParams, NodeParamsMap};
use chainnodes::standard_registry;
use chainruntime::{ChainRuntime, RuntimeConfig, SoftFailurePolicy, WorkflowRequest};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chain")]
#[command(about = "Node chain CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a request file
    Run {
        /// Path to request JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Replace the file's user query
        #[arg(short, long)]
        query: Option<String>,

        /// What to do when a node records an error without failing
        #[arg(long, default_value = "continue")]
        soft_failure: SoftFailurePolicy,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check a request file without running it
    Validate {
        /// Path to request JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Write an example request file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "request.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn load_request(file: &Path) -> Result<WorkflowRequest> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    serde_json::from_str(&json).with_context(|| format!("{} is not a valid request", file.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            query,
            soft_failure,
            verbose,
        } => {
            init_logging(verbose);
            run_request(file, query, soft_failure).await?;
        }

        Commands::Validate { file } => {
            validate_request(file)?;
        }

        Commands::Nodes => {
            list_nodes()?;
        }

        Commands::Init { output } => {
            create_example_request(output)?;
        }
    }

    Ok(())
}

async fn run_request(file: PathBuf, query: Option<String>, soft_failure: SoftFailurePolicy) -> Result<()> {
    println!("🚀 Loading request from: {}", file.display());

    let mut request = load_request(&file)?;
    if let Some(query) = query {
        request.user_query = query;
    }

    println!("📋 Chain: {}", request.node_ids.join(" → "));
    println!();

    let runtime = ChainRuntime::with_registry(
        Arc::new(standard_registry()?),
        RuntimeConfig {
            soft_failure,
            ..RuntimeConfig::default()
        },
    );

    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::PipelineStarted { .. } => {
                    println!("▶️  Chain started");
                }
                ExecutionEvent::NodeStarted { node_id, position, .. } => {
                    println!("  ⚡ Starting node {}: {}", position, node_id);
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                },
                ExecutionEvent::PipelineCompleted { success, duration_ms, .. } => {
                    if success {
                        println!("✨ Chain completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Chain failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let result = runtime.run_request(request).await;

    // Let queued events print before the summary
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let output = result?;
    println!();
    println!("📤 Result:");
    println!("{}", serde_json::to_string_pretty(&output.to_json())?);

    Ok(())
}

fn validate_request(file: PathBuf) -> Result<()> {
    println!("🔍 Validating request: {}", file.display());

    let request = load_request(&file)?;
    let registry = standard_registry()?;
    let runtime = ChainRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());

    let pipeline = runtime.build(&request.node_ids, request.node_params.as_ref())?;

    println!("✅ Request is valid:");
    println!("   Nodes: {}", pipeline.node_sequence().join(" → "));
    let providers: Vec<&str> = request.api_keys.providers().collect();
    if !providers.is_empty() {
        println!("   Credentials for: {}", providers.join(", "));
    }

    Ok(())
}

fn list_nodes() -> Result<()> {
    println!("📦 Available Node Types:");
    println!();

    let registry = standard_registry()?;

    for node_type in registry.list_node_types() {
        let Some(metadata) = registry.get_metadata(&node_type) else {
            println!("  • {}", node_type);
            continue;
        };
        println!("  • {} ({})", node_type, metadata.category);
        println!("    {}", metadata.description);
        for param in &metadata.params {
            let marker = if param.required { "*" } else { " " };
            println!("      {}{}: {}", marker, param.name, param.description);
        }
    }

    Ok(())
}

fn create_example_request(output: PathBuf) -> Result<()> {
    let mut node_params = NodeParamsMap::new();
    node_params.insert(
        "openai/advanced".to_string(),
        NodeParams::new()
            .with("model", "gpt-4.1-mini")
            .with("temperature", 0.3)
            .with("system_instruction", "Answer in three short paragraphs."),
    );
    node_params.insert(
        "text".to_string(),
        NodeParams::new()
            .with("filename", "answer.md")
            .with("format", "markdown"),
    );

    let request = WorkflowRequest {
        node_ids: vec!["openai/advanced".to_string(), "text".to_string()],
        user_query: "Explain how a linear node chain passes state between steps.".to_string(),
        api_keys: ApiKeys::new().with("openai", "sk-your-key"),
        node_params: Some(node_params),
        workflow_id: None,
    };

    let json = serde_json::to_string_pretty(&request)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example request: {}", output.display());
    println!();
    println!("Fill in your API key, then run it with:");
    println!("  chain run --file {}", output.display());

    Ok(())
}
