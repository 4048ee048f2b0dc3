//! Arc Macro - Command Line Runner
//!
//! `parse` strips modifiers from one command line and prints the result as
//! JSON. `run` executes a Lua macro file against a host that only logs what
//! the script asks for; Ctrl-C cancels at the next wait.

use arc_macro::capabilities::actions::TracingActionHost;
use arc_macro::capabilities::{ActionsModule, ModuleRegistry};
use arc_macro::core::config::{self, BridgeConfig};
use arc_macro::core::error::Result;
use arc_macro::runtime::{InMemoryMacroStore, MacroRunner, RunOutcome, ScriptRuntimeBridge};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "arc-macro")]
#[command(about = "Preprocess macro command lines and run Lua macros")]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Strip modifiers from a command line and print them as JSON
    Parse {
        /// The command line, e.g. "/ac Sprint <wait.2>"
        line: String,
    },
    /// Run a Lua macro file
    Run {
        file: PathBuf,

        /// Directory of additional `.lua` macros available to `require`
        #[arg(long)]
        macros: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arc_macro=debug".into()),
        )
        .init();

    let args = Args::parse();

    if let Some(path) = &args.config {
        if config::set_config(BridgeConfig::load(path)?).is_err() {
            tracing::warn!("Configuration already set, ignoring {}", path.display());
        }
    }
    let config = config::config();

    match args.command {
        Command::Parse { line } => {
            let bridge = build_bridge(config, None)?;
            let parsed = bridge.preprocess_line(&line)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            Ok(())
        }
        Command::Run { file, macros } => run_macro(config, &file, macros.as_deref()),
    }
}

fn build_bridge(
    config: &BridgeConfig,
    macro_dir: Option<&std::path::Path>,
) -> Result<ScriptRuntimeBridge> {
    let mut modules = ModuleRegistry::new();
    modules.register(&ActionsModule::new(Arc::new(TracingActionHost)))?;

    let store = InMemoryMacroStore::new();
    if let Some(dir) = macro_dir {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lua") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                store.insert(name, std::fs::read_to_string(&path)?);
            }
        }
        tracing::info!("Loaded {} stored macro(s) from {}", store.len(), dir.display());
    }

    Ok(ScriptRuntimeBridge::new(
        Arc::new(modules),
        Arc::new(store),
        config,
    ))
}

fn run_macro(
    config: &BridgeConfig,
    file: &std::path::Path,
    macro_dir: Option<&std::path::Path>,
) -> Result<()> {
    let script = std::fs::read_to_string(file)?;
    let name = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("macro")
        .to_string();

    let bridge = build_bridge(config, macro_dir)?;
    let rt = Runtime::new()?;

    let outcome = rt.block_on(async {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling macro");
                let _ = cancel_tx.send(true);
            }
        });

        let mut session = bridge.create_session(&name);
        MacroRunner::new().run(&mut session, &script, cancel_rx).await
    })?;

    match outcome {
        RunOutcome::Completed => println!("{}: completed", name),
        RunOutcome::Cancelled => println!("{}: cancelled", name),
        RunOutcome::Failed(message) => {
            println!("{}: failed: {}", name, message);
            std::process::exit(1);
        }
    }
    Ok(())
}
