use anyhow::{Context, Result};
use clap::Parser;
use tandem_ipc::ErrorEnvelope;
use tandem_js::{serve, WorkerError, WorkerOptions};
use tracing::{debug, warn};

mod cli;
use cli::Cli;

/// Write `envelope` as the last stderr line, where the host looks for it
fn report(envelope: &ErrorEnvelope) {
    eprintln!("{}", envelope.to_envelope());
}

/// Panics leave the worker the same way fatal errors do
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = match info.payload().downcast_ref::<&str>() {
            Some(message) => (*message).to_string(),
            None => match info.payload().downcast_ref::<String>() {
                Some(message) => message.clone(),
                None => "The worker panicked".to_string(),
            },
        };
        let stack = info.location().map(|location| format!("at {}", location));
        report(&ErrorEnvelope::new(message, stack));
    }));
}

async fn run(cli: Cli) -> Result<(), WorkerError> {
    let mut options = WorkerOptions::from_json(cli.options.as_deref())?;
    if cli.inspect {
        warn!("Inspection was requested, the worker has no debugger and runs in debug mode instead");
        options.debug = true;
    }

    debug!(delegate = %cli.delegate.display(), "Starting worker");
    serve(&cli.delegate, options).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tandem_logging::init_worker_tracing(cli.log_level.as_deref())
        .context("Failed to initialize logging")?;
    install_panic_hook();

    if let Err(error) = run(cli).await {
        report(&error.to_envelope());
        std::process::exit(1);
    }

    Ok(())
}
