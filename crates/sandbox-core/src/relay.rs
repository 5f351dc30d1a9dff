//! Terminal relay: copies instance output into the event bus.
//!
//! One relay task runs per attached instance. It reads the attach channel
//! until end-of-stream, a read error, or an explicit close through the
//! [`ConnectionRegistry`], and deregisters its own entry when it stops.

use std::sync::Arc;

use sandbox_common::{EngineError, Event, EventBus};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::engine::{BoxedReader, ContainerEngine, TerminalChannel};
use crate::registry::ConnectionRegistry;
use crate::sanitize::Utf8Sanitizer;

/// Why a relay task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayExit {
    /// The instance side closed the channel.
    EndOfStream,
    /// The connection was closed through the registry.
    Closed,
    /// Reading failed.
    Failed(String),
}

/// Handle to a running relay task.
#[derive(Debug)]
pub struct RelayHandle {
    session_id: String,
    instance_name: String,
    task: JoinHandle<RelayExit>,
}

impl RelayHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the relay to stop.
    pub async fn wait(self) -> RelayExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => RelayExit::Failed(format!("relay task aborted: {e}")),
        }
    }
}

/// Sanitizing writer that turns terminal bytes into output events.
struct TerminalSink {
    events: Arc<EventBus>,
    session_id: String,
    instance_name: String,
    sanitizer: Utf8Sanitizer,
}

impl TerminalSink {
    async fn write(&mut self, bytes: &[u8]) {
        let text = self.sanitizer.push(bytes);
        self.emit(text).await;
    }

    async fn finish(&mut self) {
        let text = self.sanitizer.finish();
        self.emit(text).await;
    }

    /// Waits until every subscriber has room for the event.
    async fn emit(&self, data: String) {
        if data.is_empty() {
            return;
        }
        self.events
            .publish(Event::InstanceTerminalOut {
                session_id: self.session_id.clone(),
                instance_name: self.instance_name.clone(),
                data,
            })
            .await;
    }
}

/// Attaches instance terminals and runs their relay tasks.
pub struct TerminalRelay {
    registry: Arc<ConnectionRegistry>,
    engine: Arc<dyn ContainerEngine>,
    events: Arc<EventBus>,
    read_chunk: usize,
    tracker: TaskTracker,
    /// Parent of every connection's close token; cancelled on shutdown.
    stopping: CancellationToken,
}

impl TerminalRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        engine: Arc<dyn ContainerEngine>,
        events: Arc<EventBus>,
        read_chunk: usize,
    ) -> Self {
        Self {
            registry,
            engine,
            events,
            read_chunk: read_chunk.max(1),
            tracker: TaskTracker::new(),
            stopping: CancellationToken::new(),
        }
    }

    /// Attach the instance terminal and start relaying its output.
    ///
    /// Returns `Ok(None)` without contacting the engine when the instance is
    /// already attached (or being attached), and also when the instance was
    /// detached while the engine call was in flight.
    pub async fn attach(
        &self,
        session_id: &str,
        instance_name: &str,
    ) -> Result<Option<RelayHandle>, EngineError> {
        if self.stopping.is_cancelled() {
            return Ok(None);
        }
        let Some(reservation) = self.registry.reserve(session_id, instance_name).await else {
            tracing::debug!(session = %session_id, instance = %instance_name, "terminal already attached");
            return Ok(None);
        };

        let TerminalChannel { reader, writer } = match self.engine.attach(instance_name).await {
            Ok(channel) => channel,
            Err(e) => {
                self.registry.release(&reservation).await;
                return Err(e);
            }
        };

        let Some(conn) = self
            .registry
            .activate(&reservation, writer, self.stopping.child_token())
            .await
        else {
            tracing::debug!(
                session = %session_id,
                instance = %instance_name,
                "instance detached while attaching, dropping channel"
            );
            return Ok(None);
        };

        let sink = TerminalSink {
            events: Arc::clone(&self.events),
            session_id: session_id.to_string(),
            instance_name: instance_name.to_string(),
            sanitizer: Utf8Sanitizer::new(),
        };
        let task = self.tracker.spawn(run_relay(
            Arc::clone(&self.registry),
            sink,
            reader,
            conn.closed_token(),
            conn.generation(),
            self.read_chunk,
        ));

        tracing::info!(session = %session_id, instance = %instance_name, "terminal attached");
        Ok(Some(RelayHandle {
            session_id: session_id.to_string(),
            instance_name: instance_name.to_string(),
            task,
        }))
    }

    /// Attach in the background. Failures are logged.
    pub fn spawn_attach(self: &Arc<Self>, session_id: String, instance_name: String) {
        let relay = Arc::clone(self);
        self.tracker.spawn(async move {
            if let Err(e) = relay.attach(&session_id, &instance_name).await {
                tracing::warn!(
                    session = %session_id,
                    instance = %instance_name,
                    error = %e,
                    "failed to attach terminal"
                );
            }
        });
    }

    /// Close every connection and wait for all relay tasks to stop.
    /// Attach requests after this point are ignored.
    pub async fn shutdown(&self) {
        self.stopping.cancel();
        let closed = self.registry.close_all().await;
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!(closed, "terminal relays stopped");
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.is_cancelled()
    }
}

async fn run_relay(
    registry: Arc<ConnectionRegistry>,
    mut sink: TerminalSink,
    mut reader: BoxedReader,
    closed: CancellationToken,
    generation: u64,
    read_chunk: usize,
) -> RelayExit {
    let mut buf = vec![0u8; read_chunk];
    let exit = loop {
        let read = tokio::select! {
            biased;
            _ = closed.cancelled() => break RelayExit::Closed,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break RelayExit::EndOfStream,
                Ok(n) => n,
                Err(e) => break RelayExit::Failed(e.to_string()),
            },
        };
        // A slow subscriber stalls the read loop until the close signal.
        tokio::select! {
            biased;
            _ = closed.cancelled() => break RelayExit::Closed,
            _ = sink.write(&buf[..read]) => {}
        }
    };
    // Bytes of a split sequence are dropped when the connection was closed.
    if exit != RelayExit::Closed {
        sink.finish().await;
    }

    if registry
        .remove_generation(&sink.session_id, &sink.instance_name, generation)
        .await
    {
        tracing::debug!(
            session = %sink.session_id,
            instance = %sink.instance_name,
            "deregistered terminal connection"
        );
    }
    tracing::info!(
        session = %sink.session_id,
        instance = %sink.instance_name,
        exit = ?exit,
        "terminal relay stopped"
    );
    exit
}
