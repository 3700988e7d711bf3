//! zrun binary entry point.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, info, warn};
use zrun::cli::{self, Args, EXIT_USAGE};
use zrun::config::Config;
use zrun::{logging, ExecEvent, ExecutionEngine, ExecutionResult, Invocation, OutputChunk, Outcome};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run 'zrun --help' for usage.");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    // Ignore double-init (only possible when embedded)
    let _ = logging::init_with_filter(config.log_filter());
    debug!(?config, "configuration loaded");

    if args.command.is_empty() {
        eprintln!("error: no command given");
        eprintln!("Run 'zrun --help' for usage.");
        return ExitCode::from(EXIT_USAGE);
    }

    let engine = Arc::new(ExecutionEngine::with_config(config.engine_config()));
    let invocation = config.invocation(args.command_line());

    match run(&engine, invocation, &args).await {
        Ok(result) => {
            report(&result, &args);
            ExitCode::from(cli::exit_status_for(&result))
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Run the invocation, relaying output live when asked and cancelling it on
/// Ctrl-C.
async fn run(
    engine: &Arc<ExecutionEngine>,
    invocation: Invocation,
    args: &Args,
) -> zrun::Result<ExecutionResult> {
    let relay = args.stream && !args.json;
    let mut running = engine.execute_async(invocation)?;
    let id = running.id;
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = running.next_event() => match event {
                Some(ExecEvent::Output(chunk)) => {
                    if relay {
                        write_chunk(&chunk);
                    }
                }
                Some(ExecEvent::Finished(result)) => return Ok(result),
                None => return Err(zrun::ZrunError::ChannelClosed),
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                info!(%id, "interrupted, terminating command");
                let engine = Arc::clone(engine);
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = engine.cancel(id) {
                        // Already finished on its own
                        debug!(%id, error = %e, "cancel skipped");
                    }
                });
            }
        }
    }
}

fn write_chunk(chunk: &OutputChunk) {
    let result = if chunk.is_error() {
        let mut err = std::io::stderr().lock();
        err.write_all(chunk.text.as_bytes()).and_then(|_| err.flush())
    } else {
        let mut out = std::io::stdout().lock();
        out.write_all(chunk.text.as_bytes()).and_then(|_| out.flush())
    };
    if let Err(e) = result {
        warn!(error = %e, "failed to relay output");
    }
}

fn report(result: &ExecutionResult, args: &Args) {
    if args.json {
        match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("error: {}", e),
        }
        return;
    }

    if !args.stream {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        let _ = std::io::stdout().flush();
    }

    match result.outcome {
        Outcome::Completed => {}
        Outcome::TimedOut => {
            eprintln!("zrun: timed out after {} ms", result.elapsed_ms());
        }
        Outcome::Cancelled => eprintln!("zrun: terminated"),
        Outcome::LaunchFailed => {
            if args.stream {
                eprintln!("zrun: {}", result.stderr);
            }
        }
    }
}
