//! Socket server of the worker process

use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tandem_ipc::{codec, ErrorEnvelope, Instruction, IpcError, IpcTransport, Reply, SocketTransport};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::delegate::{ConnectionDelegate, ScriptDelegate};
use crate::engine::Engine;
use crate::error::WorkerError;
use crate::handlers::InstructionHandlers;
use crate::options::WorkerOptions;

/// Answer one instruction payload with a reply payload.
///
/// A reply too large for the transport is a failure of the instruction: it
/// is answered with an error envelope when the instruction catches errors,
/// and stops the worker otherwise.
pub fn handle_payload(
    payload: &str,
    engine: &mut Engine,
    delegate: &dyn ConnectionDelegate,
) -> Result<String, WorkerError> {
    let instruction: Instruction = serde_json::from_str(payload)
        .map_err(|e| WorkerError::InvalidInstruction(e.to_string()))?;

    let prepared = delegate.prepare_instruction(instruction, engine)?;
    let catch_errors = prepared.should_catch_errors();
    let mut handlers = InstructionHandlers::new();
    delegate.handle_instruction(prepared, engine, &mut handlers)?;

    let reply = Reply::new(handlers.into_reply()).with_logs(engine.drain_console()?);
    let reply = serde_json::to_string(&reply)?;

    match codec::check_size(&reply) {
        Ok(()) => Ok(reply),
        Err(error) => {
            warn!("Reply of {} bytes cannot be sent: {}", reply.len(), error);
            let envelope = ErrorEnvelope::new(format!("The reply cannot be sent. {}", error), None);
            if !catch_errors {
                return Err(WorkerError::Uncaught(envelope));
            }
            Ok(serde_json::to_string(&Reply::new(envelope.to_envelope()))?)
        }
    }
}

/// Loopback listener serving one host connection at a time
pub struct Server {
    listener: TcpListener,
    idle_timeout: Option<Duration>,
}

impl Server {
    /// Bind an ephemeral port on 127.0.0.1
    pub async fn bind(idle_timeout: Option<Duration>) -> Result<Self, WorkerError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        Ok(Self {
            listener,
            idle_timeout,
        })
    }

    pub fn port(&self) -> Result<u16, WorkerError> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Print the port line the host waits for
    pub fn announce(&self) -> Result<(), WorkerError> {
        let port = self.port()?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", port)?;
        stdout.flush()?;

        info!("Listening on 127.0.0.1:{}", port);
        Ok(())
    }

    async fn accept(&self) -> Result<SocketTransport<tokio::net::TcpStream>, WorkerError> {
        let (stream, peer) = match self.idle_timeout {
            Some(idle) => tokio::time::timeout(idle, self.listener.accept())
                .await
                .map_err(|_| WorkerError::IdleTimeout)??,
            None => self.listener.accept().await?,
        };
        stream.set_nodelay(true)?;
        debug!(%peer, "Accepted connection");

        Ok(SocketTransport::new(stream).with_idle_timeout(self.idle_timeout))
    }

    /// Serve until the idle timeout expires or an instruction fails fatally
    pub async fn run(
        &self,
        engine: &mut Engine,
        delegate: &dyn ConnectionDelegate,
    ) -> Result<(), WorkerError> {
        loop {
            let mut transport = self.accept().await?;

            loop {
                let payload = match transport.receive().await {
                    Ok(Some(payload)) => payload,
                    Ok(None) => {
                        debug!("Host closed the connection");
                        break;
                    }
                    Err(IpcError::Timeout) => return Err(WorkerError::IdleTimeout),
                    Err(e) => {
                        warn!("Dropping connection after a read error: {}", e);
                        break;
                    }
                };

                let reply = handle_payload(&payload, engine, delegate)?;
                if let Err(e) = transport.send(&reply).await {
                    // The host gave up waiting, the next instruction comes on a new connection
                    warn!("Failed to send reply: {}", e);
                    break;
                }
            }
        }
    }
}

/// Resolves when the process is asked to terminate
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Load the delegate, announce the port and serve until told to stop
pub async fn serve(delegate_path: &Path, options: WorkerOptions) -> Result<(), WorkerError> {
    let idle_timeout = options.idle_timeout;
    let mut engine = Engine::new(options)?;
    let delegate = ScriptDelegate::load(delegate_path, &mut engine)?;

    let server = Server::bind(idle_timeout).await?;
    server.announce()?;

    tokio::select! {
        result = server.run(&mut engine, &delegate) => result,
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down");
            Ok(())
        }
    }
}
