//! Lifecycle of one worker process

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tandem_config::SupervisorOptions;
use tandem_ipc::ErrorEnvelope;
use tandem_logging::{LogEvent, LogLevel, StructuredLogger};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SupervisorError;

/// Logger injected by the caller, if any
pub type Logger = Option<Arc<dyn StructuredLogger>>;

/// How long a worker that closed its channel gets to finish exiting
const EXIT_SETTLE: Duration = Duration::from_millis(500);

/// How long to wait for the capture tasks to read the last output
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

/// Interval between exit checks of a blocking stop
const STOP_POLL: Duration = Duration::from_millis(20);

/// Send `message` to the injected logger
pub(crate) fn log(logger: &Logger, level: LogLevel, pid: Option<u32>, message: String) {
    let Some(logger) = logger else {
        return;
    };

    let event = LogEvent::new(level, message).with_source("tandem::supervisor");
    let event = match pid {
        Some(pid) => event.with_field("pid", pid),
        None => event,
    };
    logger.log(event);
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }

    fn level(self) -> LogLevel {
        match self {
            Stream::Stdout => LogLevel::Info,
            Stream::Stderr => LogLevel::Error,
        }
    }
}

/// Output captured from one stream of the worker
#[derive(Clone)]
struct Capture {
    buffer: Arc<Mutex<String>>,
    stream: Stream,
    pid: u32,
    logger: Logger,
}

impl Capture {
    fn new(stream: Stream, pid: u32, logger: Logger) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(String::new())),
            stream,
            pid,
            logger,
        }
    }

    fn record(&self, line: &str) {
        {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            buffer.push_str(line);
            buffer.push('\n');
        }

        log(
            &self.logger,
            self.stream.level(),
            Some(self.pid),
            format!("[PID {}] [{}] {}", self.pid, self.stream.name(), line),
        );
    }

    fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record every line until the stream closes
    fn spawn<R>(self, mut lines: Lines<BufReader<R>>) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => self.record(&line),
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Stopped capturing {}: {}", self.stream.name(), e);
                        break;
                    }
                }
            }
        })
    }
}

/// Whether the worker is still there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessHealth {
    Running,
    /// Exited with a code, `None` when killed by a signal
    Exited(Option<i32>),
}

/// Explain why a worker is gone, from what it left behind.
///
/// Returns `None` while the worker runs.
pub fn classify_failure(
    health: ProcessHealth,
    stdout: &str,
    stderr: &str,
    idle_timeout: Option<Duration>,
    debug: bool,
) -> Option<SupervisorError> {
    let ProcessHealth::Exited(code) = health else {
        return None;
    };

    if let Some(envelope) = ErrorEnvelope::find_in_output(stderr) {
        if envelope.is_idle_timeout() {
            return Some(SupervisorError::IdleTimeout {
                seconds: idle_timeout.map_or(0.0, |idle| idle.as_secs_f64()),
            });
        }

        return Some(SupervisorError::FatalWorker {
            message: envelope.describe(debug),
        });
    }

    match code {
        Some(code) if code != 0 => Some(SupervisorError::ProcessFailed {
            code: Some(code),
            stdout: stdout.trim_end().to_string(),
            stderr: stderr.trim_end().to_string(),
        }),
        _ => Some(SupervisorError::ProcessTerminated),
    }
}

/// A spawned worker and what it printed
pub struct WorkerProcess {
    child: Child,
    pid: u32,
    port: u16,
    stdout: Capture,
    stderr: Capture,
    tasks: Vec<JoinHandle<()>>,
    logger: Logger,
    idle_timeout: Option<Duration>,
    debug: bool,
}

impl WorkerProcess {
    /// Launch the worker and wait for the port line
    pub async fn spawn(
        delegate_path: &Path,
        options: &SupervisorOptions,
        worker_options: &str,
        logger: Logger,
    ) -> Result<Self, SupervisorError> {
        let executable = options.executable();
        log(&logger, LogLevel::Info, None, "Starting process...".to_string());

        let mut command = Command::new(&executable);
        if options.debug {
            command.arg("--inspect");
        }
        command
            .arg(delegate_path)
            .arg(worker_options)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_error = |message: String| SupervisorError::Spawn {
            executable: executable.clone(),
            message,
        };

        let mut child = command.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let pid = child.id().unwrap_or_default();
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout is not captured".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error("stderr is not captured".to_string()))?;

        log(&logger, LogLevel::Info, Some(pid), format!("[PID {}] Process started", pid));

        let stdout = Capture::new(Stream::Stdout, pid, logger.clone());
        let stderr = Capture::new(Stream::Stderr, pid, logger.clone());
        let stderr_task = stderr.clone().spawn(BufReader::new(stderr_pipe).lines());

        let mut process = Self {
            child,
            pid,
            port: 0,
            stdout,
            stderr,
            tasks: vec![stderr_task],
            logger,
            idle_timeout: options.idle_timeout,
            debug: options.debug,
        };

        let mut lines = BufReader::new(stdout_pipe).lines();
        let discovered = match options.read_timeout {
            Some(bound) => tokio::time::timeout(bound, process.read_port(&mut lines))
                .await
                .map_err(|_| {
                    spawn_error(format!("no port reported within {} seconds", bound.as_secs_f64()))
                }),
            None => Ok(process.read_port(&mut lines).await),
        };

        match discovered {
            Ok(Some(port)) => {
                log(
                    &process.logger,
                    LogLevel::Info,
                    Some(pid),
                    format!("[PID {}] Listening on port {}", pid, port),
                );
                process.port = port;
                let stdout_task = process.stdout.clone().spawn(lines);
                process.tasks.push(stdout_task);
                Ok(process)
            }
            Ok(None) => {
                process.settle().await;
                Err(process
                    .failure()
                    .await
                    .unwrap_or(SupervisorError::ProcessTerminated))
            }
            Err(error) => {
                // Never reaped otherwise, nothing else holds the child
                let _ = process.child.start_kill();
                Err(error)
            }
        }
    }

    /// Read stdout until the port line, `None` if stdout closes first
    async fn read_port(&self, lines: &mut Lines<BufReader<ChildStdout>>) -> Option<u16> {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match line.trim().parse::<u16>() {
                    Ok(port) => return Some(port),
                    Err(_) => self.stdout.record(&line),
                },
                Ok(None) => return None,
                Err(e) => {
                    warn!("Failed to read the worker's stdout: {}", e);
                    return None;
                }
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn health(&mut self) -> ProcessHealth {
        match self.child.try_wait() {
            Ok(Some(status)) => ProcessHealth::Exited(status.code()),
            Ok(None) => ProcessHealth::Running,
            Err(e) => {
                warn!("Cannot query the state of process {}: {}", self.pid, e);
                ProcessHealth::Running
            }
        }
    }

    /// Give a worker that closed its channel a moment to exit
    pub async fn settle(&mut self) {
        let _ = tokio::time::timeout(EXIT_SETTLE, self.child.wait()).await;
    }

    /// Why the worker is gone, `None` while it runs
    pub async fn failure(&mut self) -> Option<SupervisorError> {
        let health = self.health();
        if health == ProcessHealth::Running {
            return None;
        }

        for task in self.tasks.drain(..) {
            let _ = tokio::time::timeout(OUTPUT_DRAIN, task).await;
        }
        classify_failure(
            health,
            &self.stdout.contents(),
            &self.stderr.contents(),
            self.idle_timeout,
            self.debug,
        )
    }

    /// Fail with the classified error when the worker is gone
    pub async fn check(&mut self) -> Result<(), SupervisorError> {
        match self.failure().await {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Log and send SIGTERM, `false` when there is nothing to stop
    fn begin_stop(&mut self) -> bool {
        if !matches!(self.health(), ProcessHealth::Running) {
            return false;
        }
        log(
            &self.logger,
            LogLevel::Info,
            Some(self.pid),
            format!("[PID {}] Stopping process...", self.pid),
        );

        if !self.terminate() {
            let _ = self.child.start_kill();
        }
        true
    }

    fn finish_stop(&mut self) {
        if matches!(self.health(), ProcessHealth::Running) {
            debug!(pid = self.pid, "Worker ignored SIGTERM, killing it");
            let _ = self.child.start_kill();
        }
        log(
            &self.logger,
            LogLevel::Info,
            Some(self.pid),
            format!("[PID {}] Stopped process", self.pid),
        );
    }

    /// SIGTERM, then a forced kill after `stop_timeout`
    pub async fn stop(&mut self, stop_timeout: Duration) {
        if !self.begin_stop() {
            return;
        }
        let _ = tokio::time::timeout(stop_timeout, self.child.wait()).await;
        self.finish_stop();
    }

    /// Same as [`stop`](Self::stop) for callers that cannot await.
    ///
    /// Blocks the calling thread while the worker shuts down.
    pub fn stop_blocking(&mut self, stop_timeout: Duration) {
        if !self.begin_stop() {
            return;
        }
        let deadline = Instant::now() + stop_timeout;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(None) => std::thread::sleep(STOP_POLL),
                _ => break,
            }
        }
        self.finish_stop();
    }

    #[cfg(unix)]
    fn terminate(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match i32::try_from(self.pid) {
            Ok(pid) if pid > 0 => kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Option<Duration> = Some(Duration::from_millis(500));

    #[test]
    fn test_running_process_has_no_failure() {
        assert!(classify_failure(ProcessHealth::Running, "", "", IDLE, false).is_none());
    }

    #[test]
    fn test_idle_envelope_comes_first() {
        let stderr = format!("noise\n{}\n", ErrorEnvelope::idle_timeout().to_envelope());
        let error = classify_failure(ProcessHealth::Exited(Some(1)), "", &stderr, IDLE, false);

        assert!(matches!(error, Some(SupervisorError::IdleTimeout { seconds }) if seconds == 0.5));
    }

    #[test]
    fn test_fatal_envelope_appends_stack_in_debug() {
        let envelope = ErrorEnvelope::new(
            "Object.nope is not a function",
            Some("TypeError: Object.nope is not a function\n    at <anonymous>".into()),
        );
        let stderr = envelope.to_envelope().to_string();

        let plain = classify_failure(ProcessHealth::Exited(Some(1)), "", &stderr, IDLE, false);
        assert_eq!(plain.unwrap().to_string(), "Object.nope is not a function");

        let verbose = classify_failure(ProcessHealth::Exited(Some(1)), "", &stderr, IDLE, true);
        assert_eq!(
            verbose.unwrap().to_string(),
            "Object.nope is not a function\n\nTypeError: Object.nope is not a function\n    at <anonymous>"
        );
    }

    #[test]
    fn test_non_zero_exit_keeps_output() {
        let error = classify_failure(ProcessHealth::Exited(Some(3)), "out\n", "panic\n", IDLE, false);
        match error {
            Some(SupervisorError::ProcessFailed { code, stdout, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stdout, "out");
                assert_eq!(stderr, "panic");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_signal_or_clean_exit_is_termination() {
        assert!(matches!(
            classify_failure(ProcessHealth::Exited(None), "", "", IDLE, false),
            Some(SupervisorError::ProcessTerminated)
        ));
        assert!(matches!(
            classify_failure(ProcessHealth::Exited(Some(0)), "", "", IDLE, false),
            Some(SupervisorError::ProcessTerminated)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_ignoring_sigterm_is_killed() {
        let script = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            script.path(),
            "#!/bin/sh\ntrap '' TERM\necho 4242\nwhile true; do sleep 1; done\n",
        )
        .unwrap();
        let mut permissions = std::fs::metadata(script.path()).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut permissions, 0o755);
        std::fs::set_permissions(script.path(), permissions).unwrap();
        let script = script.into_temp_path();

        let options = SupervisorOptions {
            executable_path: Some(script.to_path_buf()),
            ..SupervisorOptions::default()
        };
        let mut process = WorkerProcess::spawn(Path::new("delegate.js"), &options, "{}", None)
            .await
            .unwrap();
        assert_eq!(process.port(), 4242);

        process.stop(Duration::from_millis(200)).await;
        process.settle().await;
        assert!(matches!(process.health(), ProcessHealth::Exited(_)));
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_spawn_error() {
        let options = SupervisorOptions {
            executable_path: Some("/definitely/not/a/worker".into()),
            ..SupervisorOptions::default()
        };

        let result = WorkerProcess::spawn(Path::new("delegate.js"), &options, "{}", None).await;
        assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
    }
}
