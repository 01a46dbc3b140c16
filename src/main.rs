use anyhow::{Context, Result};
use clap::Parser;
use fusedvm::cli::{Cli, OutputFormat};
use fusedvm::config::ExperimentConfig;
use fusedvm::engine::FusedEngine;
use fusedvm::error::FusedError;
use fusedvm::event::TraceEvent;
use fusedvm::json_output::JsonStateDump;
use fusedvm::store::{MemoryHistory, Quark, StateStore};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Feed every event of a JSON-lines file to the engine, returning the last
/// timestamp seen
fn replay(engine: &mut FusedEngine, path: &Path) -> Result<Option<u64>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open events file: {}", path.display()))?;
    let mut last_ts = None;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: TraceEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event at {}:{}", path.display(), index + 1))?;
        last_ts = Some(event.timestamp);

        match engine.handle_event(&event) {
            Ok(()) | Err(FusedError::TraceAborted { .. }) => {}
            Err(e) => eprintln!("Warning: {}", e),
        }
    }
    Ok(last_ts)
}

/// Print the attribute tree below `quark`, one attribute per line
fn print_tree(ss: &MemoryHistory, quark: Quark, depth: usize) {
    for child in ss.sub_attributes(quark) {
        let value = ss.query_ongoing(child);
        let name = ss.attribute_name(child);
        if value.is_null() {
            println!("{:indent$}{}", "", name, indent = depth * 2);
        } else {
            println!("{:indent$}{} = {}", "", name, value, indent = depth * 2);
        }
        print_tree(ss, child, depth + 1);
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = ExperimentConfig::from_toml(&args.config)?;
    let mut engine = FusedEngine::new(config).context("Failed to create analysis engine")?;

    let last_ts = replay(&mut engine, &args.events)?;
    if !engine.roles_found() {
        eprintln!("Warning: machine roles were not all identified, state is partial");
    }

    let mut store = engine.into_store();
    if let Some(ts) = last_ts {
        store.close(ts);
    }

    match args.format {
        OutputFormat::Text => print_tree(&store, Quark::ROOT, 0),
        OutputFormat::Json => {
            let version = FusedEngine::<MemoryHistory>::VERSION;
            let dump = JsonStateDump::from_history(&store, version, args.history);
            println!("{}", dump.to_json().context("Failed to serialize state")?);
        }
    }

    Ok(())
}
