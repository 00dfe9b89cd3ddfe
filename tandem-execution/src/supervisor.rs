//! Supervision of one worker process and its connection

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_config::SupervisorOptions;
use tandem_ipc::{Instruction, IpcTransport, Reply, SocketTransport};
use tandem_logging::LogLevel;
use tokio::net::TcpStream;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::delegate::{resource_kind, ProcessDelegate};
use crate::error::SupervisorError;
use crate::process::{log, Logger, WorkerProcess};
use crate::proxy::{CommunicatesWithSupervisor, ResourceProxy};
use crate::serializer::unserialize;
use crate::value::Value;

/// Options meaningful to the host only, never sent to the worker
const HOST_ONLY_OPTIONS: &[&str] = &["executable_path"];

struct SupervisorState {
    process: WorkerProcess,
    transport: Option<SocketTransport<TcpStream>>,
}

impl SupervisorState {
    /// The connection, opened on first use and after a dropped one
    async fn transport(&mut self) -> Result<&mut SocketTransport<TcpStream>, SupervisorError> {
        if self.transport.is_none() {
            let port = self.process.port();
            debug!(port, "Connecting to the worker");
            self.transport = Some(SocketTransport::connect(port).await?);
        }

        self.transport
            .as_mut()
            .ok_or_else(|| SupervisorError::Protocol("no connection to the worker".to_string()))
    }

    /// The classified failure if the worker died, `fallback` otherwise
    async fn failure_or(&mut self, fallback: SupervisorError) -> SupervisorError {
        self.transport = None;
        self.process.settle().await;
        self.process.failure().await.unwrap_or(fallback)
    }
}

/// Owns a worker process and runs instructions on it, one at a time
pub struct ProcessSupervisor {
    state: Mutex<SupervisorState>,
    options: SupervisorOptions,
    process_delegate: Option<Arc<dyn ProcessDelegate>>,
    logger: Logger,
    pid: u32,
    port: u16,
    kept_alive: AtomicBool,
}

impl ProcessSupervisor {
    /// Spawn the worker for `delegate_path` and wait until it listens
    pub async fn start(
        delegate_path: &Path,
        options: SupervisorOptions,
        process_delegate: Option<Arc<dyn ProcessDelegate>>,
        logger: Logger,
    ) -> Result<Arc<Self>, SupervisorError> {
        let mut worker_options = options.to_map()?;
        for key in HOST_ONLY_OPTIONS {
            worker_options.remove(*key);
        }
        let worker_options = serde_json::to_string(&worker_options)?;

        let process =
            WorkerProcess::spawn(delegate_path, &options, &worker_options, logger.clone()).await?;
        let pid = process.pid();
        let port = process.port();

        Ok(Arc::new(Self {
            state: Mutex::new(SupervisorState {
                process,
                transport: None,
            }),
            options,
            process_delegate,
            logger,
            pid,
            port,
            kept_alive: AtomicBool::new(false),
        }))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Host resource kind for objects of the worker class `class_name`
    pub fn resource_kind(&self, class_name: &str) -> String {
        resource_kind(self.process_delegate.as_deref(), class_name)
    }

    /// Proxy for the delegate's default target
    pub fn root_proxy(self: &Arc<Self>) -> Result<ResourceProxy, SupervisorError> {
        let proxy = ResourceProxy::new();
        proxy.set_supervisor(Arc::clone(self))?;
        Ok(proxy)
    }

    /// Leave the worker running when the supervisor goes away
    pub fn keep_alive(&self) -> u32 {
        self.kept_alive.store(true, Ordering::SeqCst);
        self.pid
    }

    /// Stop the worker now rather than when the last handle is dropped.
    ///
    /// Prefer this on a current-thread runtime, where teardown on drop blocks
    /// the only thread for up to `stop_timeout`.
    pub async fn stop(&self) {
        let stop_timeout = self.options.stop_timeout;
        self.state.lock().await.process.stop(stop_timeout).await;
    }

    /// Fail with the classified error when the worker is gone
    pub async fn check_health(&self) -> Result<(), SupervisorError> {
        self.state.lock().await.process.check().await
    }

    fn log(&self, level: LogLevel, message: String) {
        log(&self.logger, level, Some(self.pid), message);
    }

    /// Send `instruction` and decode the reply
    pub async fn execute_instruction(
        self: &Arc<Self>,
        instruction: Instruction,
    ) -> Result<Value, SupervisorError> {
        let mut state = self.state.lock().await;
        state.process.check().await?;

        let payload = serde_json::to_string(&instruction)?;
        self.log(
            LogLevel::Debug,
            format!("[PORT {}] [sending] {}", self.port, payload),
        );

        let sent = match state.transport().await {
            Ok(transport) => transport.send(&payload).await,
            Err(error) => return Err(state.failure_or(error).await),
        };
        if let Err(error) = sent {
            return Err(state.failure_or(error.into()).await);
        }

        let received = {
            let transport = state.transport().await?;
            match self.options.read_timeout {
                Some(bound) => match tokio::time::timeout(bound, transport.receive()).await {
                    Ok(received) => received,
                    Err(_) => {
                        warn!(pid = self.pid, "No reply within the read timeout");
                        // The late reply must not be taken for the next one
                        state.transport = None;
                        return Err(SupervisorError::ReadTimeout {
                            seconds: bound.as_secs_f64(),
                        });
                    }
                },
                None => transport.receive().await,
            }
        };

        let reply = match received {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                let closed = SupervisorError::Protocol(
                    "The worker closed the connection without replying".to_string(),
                );
                return Err(state.failure_or(closed).await);
            }
            Err(error) => return Err(state.failure_or(error.into()).await),
        };

        self.log(
            LogLevel::Debug,
            format!("[PORT {}] [receiving] {}", self.port, reply),
        );
        let reply: Reply = serde_json::from_str(&reply)?;

        for entry in &reply.logs {
            self.log(
                LogLevel::from_console_method(&entry.level),
                format!("[PID {}] [console] {}", self.pid, entry.message),
            );
        }

        if reply.value.is_null() {
            // A worker that died right after answering must not look healthy
            if let Some(error) = state.process.failure().await {
                return Err(error);
            }
        }
        drop(state);

        unserialize(reply.value, self)
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.kept_alive.load(Ordering::SeqCst) {
            debug!(pid = self.pid, "Leaving the worker running");
            return;
        }

        let stop_timeout = self.options.stop_timeout;
        let process = &mut self.state.get_mut().process;
        match Handle::try_current() {
            // Other tasks keep running on the remaining worker threads
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| process.stop_blocking(stop_timeout));
            }
            _ => process.stop_blocking(stop_timeout),
        }
    }
}
