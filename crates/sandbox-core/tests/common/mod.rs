//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sandbox_common::{EngineError, Event, SessionId, StorageError};
use sandbox_config::SandboxConfig;
use sandbox_core::{
    BoxedReader, ContainerEngine, CreateContainerOpts, GaugeSnapshot, Gauges,
    Instance, MemoryStorage, Sandbox, Session, Storage, TerminalChannel, TlsMaterial,
};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

/// Per-subscriber event queue used by the harness.
pub const EVENT_CAPACITY: usize = 64;

pub const SESSION_ID: &str = "a1b2c3d4-0000-4000-8000-000000000001";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteBehavior {
    #[default]
    Remove,
    NotFound,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CopiedFile {
    pub container: String,
    pub dest: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Default)]
pub struct EngineState {
    pub created: Vec<CreateContainerOpts>,
    pub deleted: Vec<String>,
    pub attached: Vec<String>,
    pub resized: Vec<(String, u16, u16)>,
    pub executed: Vec<(String, Vec<String>)>,
    pub copied: Vec<CopiedFile>,
    /// Container side of the most recent attach channel per container.
    pub terminals: HashMap<String, DuplexStream>,
    pub delete_behavior: DeleteBehavior,
    pub fail_create: bool,
    pub fail_attach: bool,
    pub exec_output: String,
    pub exec_code: i64,
}

/// In-process container engine. Terminals are `tokio::io::duplex` pipes.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    pub fn take_terminal(&self, name: &str) -> Option<DuplexStream> {
        self.state().terminals.remove(name)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn create(&self, opts: &CreateContainerOpts) -> Result<String, EngineError> {
        let mut state = self.state();
        if state.fail_create {
            return Err(EngineError::Failed("image not found".into()));
        }
        state.created.push(opts.clone());
        Ok(format!("10.0.0.{}", state.created.len()))
    }

    async fn delete(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.deleted.push(name.to_string());
        match state.delete_behavior {
            DeleteBehavior::Remove => {
                state.terminals.remove(name);
                Ok(())
            }
            DeleteBehavior::NotFound => Err(EngineError::NotFound(name.to_string())),
            DeleteBehavior::Fail => Err(EngineError::Failed("daemon unreachable".into())),
        }
    }

    async fn attach(&self, name: &str) -> Result<TerminalChannel, EngineError> {
        let mut state = self.state();
        state.attached.push(name.to_string());
        if state.fail_attach {
            return Err(EngineError::Failed("attach refused".into()));
        }
        let (ours, theirs) = tokio::io::duplex(4096);
        state.terminals.insert(name.to_string(), theirs);
        Ok(TerminalChannel::from_stream(ours))
    }

    async fn resize(&self, name: &str, rows: u16, cols: u16) -> Result<(), EngineError> {
        self.state().resized.push((name.to_string(), rows, cols));
        Ok(())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<i64, EngineError> {
        let mut state = self.state();
        state.executed.push((name.to_string(), cmd.to_vec()));
        Ok(state.exec_code)
    }

    async fn exec_capture(&self, name: &str, cmd: &[String], output: &mut Vec<u8>) -> Result<i64, EngineError> {
        let mut state = self.state();
        state.executed.push((name.to_string(), cmd.to_vec()));
        output.extend_from_slice(state.exec_output.as_bytes());
        Ok(state.exec_code)
    }

    async fn copy_into(
        &self,
        name: &str,
        dest: &str,
        file_name: &str,
        mut content: BoxedReader,
    ) -> Result<(), EngineError> {
        let mut buf = Vec::new();
        content.read_to_end(&mut buf).await?;
        self.state().copied.push(CopiedFile {
            container: name.to_string(),
            dest: dest.to_string(),
            file_name: file_name.to_string(),
            content: buf,
        });
        Ok(())
    }
}

/// Memory storage whose creates can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_creates: AtomicBool,
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn create_instance(&self, session_id: &SessionId, instance: &Instance) -> Result<(), StorageError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("write timed out".into()));
        }
        self.inner.create_instance(session_id, instance).await
    }

    async fn delete_instance(&self, session_id: &SessionId, instance_name: &str) -> Result<(), StorageError> {
        self.inner.delete_instance(session_id, instance_name).await
    }

    async fn find_instance_by_ip(&self, ip: &str) -> Result<Instance, StorageError> {
        self.inner.find_instance_by_ip(ip).await
    }

    async fn find_instance_by_alias(&self, session_prefix: &str, alias: &str) -> Result<Instance, StorageError> {
        self.inner.find_instance_by_alias(session_prefix, alias).await
    }

    async fn find_instance_by_ip_and_session(&self, session_prefix: &str, ip: &str) -> Result<Instance, StorageError> {
        self.inner.find_instance_by_ip_and_session(session_prefix, ip).await
    }
}

#[derive(Default)]
pub struct RecordingGauges {
    pub snapshots: Mutex<Vec<GaugeSnapshot>>,
}

impl Gauges for RecordingGauges {
    fn record(&self, snapshot: &GaugeSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

pub struct Harness {
    pub sandbox: Sandbox,
    pub engine: Arc<FakeEngine>,
    pub storage: Arc<FlakyStorage>,
    pub gauges: Arc<RecordingGauges>,
    pub session: Session,
}

pub fn harness() -> Harness {
    let engine = Arc::new(FakeEngine::default());
    let storage = Arc::new(FlakyStorage::default());
    let gauges = Arc::new(RecordingGauges::default());
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let mut config = SandboxConfig::default();
    config.events.capacity = EVENT_CAPACITY;
    let sandbox = Sandbox::from_config(config, engine.clone(), storage.clone())
        .unwrap()
        .with_gauges(gauges.clone())
        .with_http_client(http);

    Harness {
        sandbox,
        engine,
        storage,
        gauges,
        session: Session::new(SESSION_ID, "192.168.0.10"),
    }
}

/// An instance known to the session without going through create, so no
/// background attach is started.
pub async fn restored_instance(session: &Session, hostname: &str) -> Arc<Instance> {
    session
        .restore(Instance {
            name: session.container_name(hostname),
            image: "franela/dind".into(),
            ip: "10.0.9.9".into(),
            hostname: hostname.into(),
            alias: None,
            tls: TlsMaterial::default(),
            session_id: session.id().clone(),
            is_docker_host: true,
        })
        .await
}

/// Wait until the registry holds a live connection for the instance.
pub async fn wait_for_terminal(sandbox: &Sandbox, session_id: &str, name: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while sandbox.registry().get(session_id, name).await.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("terminal was never attached");
}

/// Collect terminal output for `name` until it equals `expected`.
pub async fn expect_output(rx: &mut mpsc::Receiver<Event>, name: &str, expected: &str) {
    let mut seen = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen != expected {
            if let Event::InstanceTerminalOut { instance_name, data, .. } = rx.recv().await.unwrap() {
                if instance_name == name {
                    seen.push_str(&data);
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected output {expected:?}, got {seen:?}"));
}
