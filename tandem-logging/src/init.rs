use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn env_filter(log_level: Option<&str>, fallback: &str) -> EnvFilter {
    log_level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    let env_filter = env_filter(Some(log_level), "info");

    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::fmt().with_env_filter(env_filter).try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize tracing for a worker process.
///
/// Workers write to stderr: stdout carries the port announcement. Stderr is
/// also where fatal error envelopes go, so the default level is `warn`.
pub fn init_worker_tracing(log_level: Option<&str>) -> Result<()> {
    let env_filter = env_filter(log_level, "warn");

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize worker tracing: {}", e))?;

    tracing::debug!("Worker tracing initialized");
    Ok(())
}
