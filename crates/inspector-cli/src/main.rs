//! inspector - run a coding agent and inspect its event stream

mod config;
mod render;
mod replay;
mod utils;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use inspector_agent::{
    ConversationMessage, DisplayItem, ProcessTransport, Reconciler, RunHandle, RunRequest,
    build_items,
};
use inspector_stream::{MessageMetadata, StreamFrame};
use parking_lot::Mutex;

/// Default log filter when `--verbose` is passed without `INSPECTOR_LOG`
const VERBOSE_FILTER: &str = "inspector=debug,inspector_agent=debug,inspector_stream=debug";

/// inspector - run a coding agent and inspect its event stream
#[derive(Parser, Debug)]
#[command(name = "inspector")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose output (logs to stderr)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent once and print its output
    Run {
        /// Prompt passed to the agent
        prompt: Option<String>,

        /// Working directory for the agent
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Model (replaces the --model argument)
        #[arg(short, long)]
        model: Option<String>,

        /// Agent binary
        #[arg(long)]
        program: Option<String>,

        /// Extra environment for the agent (KEY=VALUE, repeatable)
        #[arg(short, long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = RunFormat::Frames)]
        format: RunFormat,
    },
    /// Fold a recorded frame log (or raw agent output) into items
    Replay {
        /// Recording to read; stdin when absent
        file: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ItemFormat::Items)]
        format: ItemFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RunFormat {
    /// Each frame as a JSON line, as it arrives
    Frames,
    /// Final item list as JSON
    Items,
    /// One line per item
    Text,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ItemFormat {
    Items,
    Text,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn init_tracing(verbose: bool) {
    let filter = match std::env::var("INSPECTOR_LOG") {
        Ok(filter) if !filter.is_empty() => filter,
        _ if verbose => VERBOSE_FILTER.to_string(),
        _ => return,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let Some(command) = args.command else {
        eprintln!("No command given. Try `inspector run \"<prompt>\"` or `inspector --help`.");
        std::process::exit(2);
    };

    match command {
        Command::Run {
            prompt,
            cwd,
            model,
            program,
            env,
            format,
        } => {
            let cfg = config::Config::load();
            let transport = ProcessTransport::new(cfg.process_config(program, model));

            let mut overlay: HashMap<String, String> = cfg.env.clone().into_iter().collect();
            overlay.extend(env);
            let mut request = RunRequest::new(prompt.map(ConversationMessage::user).into_iter().collect());
            request.env = overlay;
            request.cwd = cwd;

            let metadata = run_agent(&transport, request, format).await?;
            match metadata.exit_code {
                Some(0) | None => Ok(()),
                Some(code) => std::process::exit(code),
            }
        }
        Command::Replay { file, format } => {
            let events = match file {
                Some(path) => replay::read_events(BufReader::new(File::open(&path)?))?,
                None => replay::read_events(io::stdin().lock())?,
            };
            tracing::debug!(events = events.len(), "replaying recording");
            print_items(&build_items(&events), format)
        }
    }
}

/// Run one invocation, printing as requested; returns the finish metadata
async fn run_agent(
    transport: &ProcessTransport,
    request: RunRequest,
    format: RunFormat,
) -> anyhow::Result<MessageMetadata> {
    let handle = RunHandle::new();
    let reconciler = Arc::new(Mutex::new(Reconciler::new()));

    // Ctrl-C cancels the run; the stream still ends with a finish frame
    let interrupt = {
        let handle = handle.clone();
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let open = reconciler
                    .lock()
                    .items()
                    .iter()
                    .filter(|item| item.is_open())
                    .count();
                eprintln!("\nCancelling run ({} items still open)...", open);
                handle.cancel();
            }
        })
    };

    tracing::info!(run = %handle.id(), program = %transport.config().program, "starting run");
    let mut frames = transport.stream(request, handle.clone());
    let mut finish = None;
    let mut printer = render::TextPrinter::new();

    while let Some(frame) = frames.next().await {
        if format == RunFormat::Frames {
            println!("{}", serde_json::to_string(&frame)?);
        }
        if let Some(event) = frame.event() {
            reconciler.lock().apply(event);
        }
        if format == RunFormat::Text {
            for line in printer.pending(reconciler.lock().items(), false) {
                println!("{}", line);
            }
        }
        if let StreamFrame::Finish { message_metadata } = frame {
            finish = Some(message_metadata);
        }
    }
    interrupt.abort();

    let items = reconciler.lock().items().to_vec();
    match format {
        RunFormat::Frames => {}
        RunFormat::Items => print_items(&items, ItemFormat::Items)?,
        RunFormat::Text => {
            for line in printer.pending(&items, true) {
                println!("{}", line);
            }
        }
    }

    let metadata = finish.unwrap_or_default();
    if metadata.cancelled {
        eprintln!("Run cancelled");
    }
    tracing::info!(
        run = %handle.id(),
        exit_code = ?metadata.exit_code,
        items = items.len(),
        "run finished"
    );
    Ok(metadata)
}

fn print_items(items: &[DisplayItem], format: ItemFormat) -> anyhow::Result<()> {
    match format {
        ItemFormat::Items => println!("{}", serde_json::to_string_pretty(items)?),
        ItemFormat::Text => {
            for item in items {
                println!("{}", render::render_item(item));
            }
        }
    }
    Ok(())
}
