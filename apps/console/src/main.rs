use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use engine_client::{
    load_settings, Backend, CommandChannel, DispatchError, DispatchQueue, ErrorPolicy,
    ProcessBackend, RenderScheduler, SharedGeometry, UiHooks,
};
use futures::{future::BoxFuture, stream::FuturesOrdered, FutureExt, StreamExt};
use serde_json::Value;
use shared::wire;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, trace};
use tracing_subscriber::EnvFilter;

mod directive;

use directive::Directive;

/// Drives the engine from stdin through the dispatch queue.
#[derive(Parser, Debug)]
struct Args {
    /// Engine executable, run in batch mode.
    #[arg(long)]
    engine: Option<PathBuf>,
    /// Settings file; defaults to ./engine.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Return engine errors to the caller instead of presenting them.
    #[arg(long)]
    propagate_errors: bool,
}

/// Engine callbacks on a terminal: dialogs go to stderr.
struct ConsoleHooks;

impl UiHooks for ConsoleHooks {
    fn message_box(&self, message: &str, buttons: &[String]) -> usize {
        eprintln!("engine: {message} [{}]", buttons.join("/"));
        0
    }

    fn busy_cursor(&self, busy: bool) {
        trace!(busy, "busy cursor");
    }

    fn present_error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

type Outcome = BoxFuture<'static, (String, Result<Value, DispatchError>)>;

struct Console {
    queue: DispatchQueue,
    geometry: SharedGeometry,
}

impl Console {
    fn handle(&self, line: &str) -> Option<Outcome> {
        let directive = match directive::parse(line) {
            Ok(Some(directive)) => directive,
            Ok(None) => return None,
            Err(err) => {
                error!("{err:#}");
                return None;
            }
        };
        let label = line.trim().to_string();
        match directive {
            Directive::Submit(request) => {
                Some(self.queue.submit(request).map(|result| (label, result)).boxed())
            }
            Directive::Target(target) => match self.queue.set_active_target(target) {
                Some(ticket) => Some(ticket.map(|result| (label, result)).boxed()),
                None => {
                    info!("{label}: already the active target");
                    None
                }
            },
            Directive::Geometry(geometry) => {
                self.geometry.set(geometry);
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(engine) = args.engine {
        settings.engine_program = Some(engine);
    }
    if args.propagate_errors {
        settings.error_policy = ErrorPolicy::Propagate;
    }

    let startup = settings
        .engine_program
        .as_ref()
        .ok_or_else(|| anyhow!("no engine program configured"))
        .and_then(|program| {
            let backend: Arc<dyn Backend> =
                Arc::new(ProcessBackend::spawn(program, &settings.engine_args)?);
            Ok(backend)
        });
    let channel = CommandChannel::from_startup(
        startup,
        Arc::new(ConsoleHooks),
        settings.channel_options(),
    );
    if let Some(expected) = &settings.expected_engine_version {
        if let Err(err) = channel.check_version(expected).await {
            error!("engine version check failed: {err}");
        }
    }

    let geometry = SharedGeometry::new();
    let render = RenderScheduler::new(
        settings.initial_target()?,
        Arc::new(geometry.clone()),
        settings.frontend_driven_rendering,
    );
    let console = Console {
        queue: DispatchQueue::new(Arc::new(channel), Arc::new(render)),
        geometry,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut results = FuturesOrdered::new();
    let mut input_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        if let Some(outcome) = console.handle(&line) {
                            results.push_back(outcome);
                        }
                    }
                    None => input_open = false,
                }
            }
            Some((label, result)) = results.next(), if !results.is_empty() => {
                match result {
                    Ok(value) => println!("{label} => {}", wire::encode(&value)),
                    Err(err) => println!("{label} !! {err}"),
                }
            }
            else => break,
        }
    }
    Ok(())
}
