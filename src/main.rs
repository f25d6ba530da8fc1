use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use modrun::command::{CommandDescriptor, CommandService};
use modrun::config::RuntimeConfig;
use modrun::events::EventBus;
use modrun::interceptors::builtin;
use modrun::plugins::{PluginService, StaticDiscovery};
use modrun::services::ServiceRegistry;
use modrun::utils::logging::{self, LogFormat};

#[derive(Parser)]
#[command(name = "modrun")]
#[command(about = "Run registered commands through the module pipeline", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/modrun/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log format: pretty or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered commands
    List,
    /// Show a command's inputs, outputs and presets
    Describe {
        /// Command identity, short type name, or title
        identity: String,
    },
    /// Run a command and print its outputs
    Run {
        /// Command identity, short type name, or title
        identity: String,
        /// Input as name=value; value is parsed as JSON, else taken as text
        #[arg(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = RuntimeConfig::load_or_default(cli.config.as_deref())?;
    logging::init(cli.log_format.unwrap_or(config.log_format));

    let mut discovered = modrun::commands::builtin();
    discovered.extend(builtin::interceptors());
    let plugins = Arc::new(PluginService::new(
        Arc::new(StaticDiscovery::new(discovered)),
        config.plugins.clone(),
        Arc::new(EventBus::new(config.event_capacity)),
    ));
    let service = CommandService::new(plugins, Arc::new(ServiceRegistry::new()), &config);

    match cli.command {
        Some(Commands::Version) | None => {
            println!("modrun {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::List) => {
            for command in service.list_commands() {
                let state = if command.is_valid() { "ok" } else { "invalid" };
                println!("{:<32} {:<10} {}", command.identity(), state, command.title());
            }
        }
        Some(Commands::Describe { identity }) => {
            let command = lookup(&service, &identity)?;
            println!("{}", serde_json::to_string_pretty(&command.summary())?);
        }
        Some(Commands::Run { identity, inputs }) => {
            let command = lookup(&service, &identity)?;
            let pairs = inputs
                .iter()
                .map(|raw| parse_input(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let handle = service.run(&command, pairs)?;
            let module = handle.join().await?;

            let outputs: serde_json::Map<String, Value> = module
                .outputs()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect();
            let report = json!({
                "command": module.identity(),
                "status": module.status(),
                "cancel_reason": module.cancel_reason(),
                "outputs": outputs,
                "diagnostics": module.diagnostics(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Exact identity first, then the unqualified type name, then the title.
fn lookup(service: &CommandService, name: &str) -> anyhow::Result<Arc<CommandDescriptor>> {
    if let Some(command) = service.find_command(name) {
        return Ok(command);
    }
    service
        .list_commands()
        .into_iter()
        .find(|c| {
            c.identity().rsplit("::").next() == Some(name) || c.title().eq_ignore_ascii_case(name)
        })
        .ok_or_else(|| anyhow!("No command named '{}'", name))
}

fn parse_input(raw: &str) -> anyhow::Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Input '{}' is not NAME=VALUE", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.trim().to_string(), value))
}
