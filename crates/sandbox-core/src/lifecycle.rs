//! Instance lifecycle: create, delete, lookups and terminal routing.

use std::sync::Arc;
use std::time::Duration;

use sandbox_common::{EngineError, Event, EventBus, Result, SandboxError};
use sandbox_config::SandboxConfig;

use crate::engine::{ContainerEngine, CreateContainerOpts};
use crate::metrics::{ActionTimer, GaugeSnapshot, Gauges, NoopGauges};
use crate::registry::ConnectionRegistry;
use crate::relay::{RelayHandle, TerminalRelay};
use crate::storage::Storage;
use crate::types::{Instance, InstanceConfig, InstanceMap, Session};

/// Owns the collaborators and implements every instance operation.
pub struct Sandbox {
    pub(crate) config: SandboxConfig,
    pub(crate) engine: Arc<dyn ContainerEngine>,
    storage: Arc<dyn Storage>,
    events: Arc<EventBus>,
    gauges: Arc<dyn Gauges>,
    registry: Arc<ConnectionRegistry>,
    relay: Arc<TerminalRelay>,
    pub(crate) http: reqwest::Client,
}

impl Sandbox {
    pub fn new(
        config: SandboxConfig,
        engine: Arc<dyn ContainerEngine>,
        storage: Arc<dyn Storage>,
        events: Arc<EventBus>,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.transfer.download_timeout_secs))
            .build()
            .map_err(|e| SandboxError::HttpClient(e.to_string()))?;
        let relay = Arc::new(TerminalRelay::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
            Arc::clone(&events),
            config.terminal.read_chunk,
        ));
        Ok(Self {
            config,
            engine,
            storage,
            events,
            gauges: Arc::new(NoopGauges),
            registry,
            relay,
            http,
        })
    }

    /// Build a sandbox with a fresh event bus and connection registry sized
    /// from `config`.
    pub fn from_config(
        config: SandboxConfig,
        engine: Arc<dyn ContainerEngine>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let events = Arc::new(EventBus::new(config.events.capacity));
        Self::new(config, engine, storage, events, Arc::new(ConnectionRegistry::new()))
    }

    pub fn with_gauges(mut self, gauges: Arc<dyn Gauges>) -> Self {
        self.gauges = gauges;
        self
    }

    /// Replace the client used for remote downloads.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    // =========================================================================
    // CREATE / DELETE
    // =========================================================================

    /// Create an instance in `session`.
    ///
    /// Holds the session lock for the whole call. The terminal is attached
    /// in the background once the lock is released.
    pub async fn create_instance(&self, session: &Session, conf: InstanceConfig) -> Result<Arc<Instance>> {
        let _timer = ActionTimer::start("create_instance");

        let instance = {
            let mut instances = session.lock().await;

            let image = conf
                .image_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| self.config.images.base_image.clone());
            tracing::info!(session = %session.id(), image = %image, "creating instance");

            let hostname = match conf.hostname.filter(|h| !h.is_empty()) {
                Some(hostname) => {
                    if instances.contains_key(&session.container_name(&hostname)) {
                        return Err(SandboxError::HostnameTaken(hostname));
                    }
                    hostname
                }
                None => next_hostname(session, &instances),
            };
            let container_name = session.container_name(&hostname);

            let opts = CreateContainerOpts {
                privileged: self.is_privileged_image(&image),
                image,
                session_id: session.id().to_string(),
                pwd_ip_address: session.pwd_ip_address().to_string(),
                container_name,
                hostname,
                server_cert: conf.tls.server_cert.clone(),
                server_key: conf.tls.server_key.clone(),
                ca_cert: conf.tls.ca_cert.clone(),
                host_fqdn: conf.host,
            };
            let ip = self.engine.create(&opts).await?;

            let instance = Arc::new(Instance {
                name: opts.container_name,
                image: opts.image,
                ip,
                hostname: opts.hostname,
                alias: conf.alias,
                tls: conf.tls,
                session_id: session.id().clone(),
                is_docker_host: opts.privileged,
            });
            instances.insert(instance.name.clone(), Arc::clone(&instance));

            if let Err(e) = self.storage.create_instance(session.id(), &instance).await {
                instances.remove(&instance.name);
                self.rollback_container(&instance).await;
                return Err(e.into());
            }

            self.events.publish(Event::InstanceNew {
                session_id: session.id().to_string(),
                instance_name: instance.name.clone(),
                ip: instance.ip.clone(),
                hostname: instance.hostname.clone(),
            })
            .await;
            self.record_gauges(session, &instances).await;
            instance
        };

        self.relay
            .spawn_attach(instance.session_id.to_string(), instance.name.clone());
        Ok(instance)
    }

    /// Delete `instance` from `session`.
    ///
    /// A container the engine no longer knows counts as deleted. Any other
    /// engine error aborts before the event and the storage removal.
    pub async fn delete_instance(&self, session: &Session, instance: &Instance) -> Result<()> {
        let _timer = ActionTimer::start("delete_instance");
        if instance.session_id != *session.id() {
            return Err(SandboxError::SessionMismatch {
                session: session.id().to_string(),
                instance: instance.name.clone(),
            });
        }

        let mut instances = session.lock().await;

        if self.registry.close(session.id().as_str(), &instance.name).await {
            tracing::debug!(session = %session.id(), instance = %instance.name, "closed terminal connection");
        }

        match self.engine.delete(&instance.name).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => {
                tracing::debug!(instance = %instance.name, "container already removed");
            }
            Err(e) => {
                tracing::error!(instance = %instance.name, error = %e, "failed to delete container");
                return Err(e.into());
            }
        }
        instances.remove(&instance.name);

        self.events.publish(Event::InstanceDelete {
            session_id: session.id().to_string(),
            instance_name: instance.name.clone(),
        })
        .await;

        self.storage.delete_instance(session.id(), &instance.name).await?;

        self.record_gauges(session, &instances).await;
        tracing::info!(session = %session.id(), instance = %instance.name, "instance deleted");
        Ok(())
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    pub async fn get_instance(&self, session: &Session, name: &str) -> Option<Arc<Instance>> {
        let _timer = ActionTimer::start("get_instance");
        session.instance(name).await
    }

    pub async fn find_instance_by_ip(&self, ip: &str) -> Option<Instance> {
        let _timer = ActionTimer::start("find_instance_by_ip");
        self.storage
            .find_instance_by_ip(ip)
            .await
            .map_err(|e| tracing::debug!(ip, error = %e, "instance lookup failed"))
            .ok()
    }

    pub async fn find_instance_by_ip_and_session(&self, session_prefix: &str, ip: &str) -> Option<Instance> {
        let _timer = ActionTimer::start("find_instance_by_ip_and_session");
        self.storage
            .find_instance_by_ip_and_session(session_prefix, ip)
            .await
            .map_err(|e| tracing::debug!(session_prefix, ip, error = %e, "instance lookup failed"))
            .ok()
    }

    pub async fn find_instance_by_alias(&self, session_prefix: &str, alias: &str) -> Option<Instance> {
        let _timer = ActionTimer::start("find_instance_by_alias");
        self.storage
            .find_instance_by_alias(session_prefix, alias)
            .await
            .map_err(|e| tracing::debug!(session_prefix, alias, error = %e, "instance lookup failed"))
            .ok()
    }

    /// Images that run with elevated capability.
    pub fn allowed_images(&self) -> Vec<String> {
        self.config.images.allowed()
    }

    // =========================================================================
    // TERMINAL
    // =========================================================================

    /// Attach the instance terminal. `Ok(None)` when it is already attached.
    pub async fn attach_terminal(&self, instance: &Instance) -> Result<Option<RelayHandle>> {
        let _timer = ActionTimer::start("attach_terminal");
        Ok(self
            .relay
            .attach(instance.session_id.as_str(), &instance.name)
            .await?)
    }

    /// Send input to an instance terminal.
    ///
    /// Input for an instance without a live connection is dropped.
    pub async fn write_terminal(&self, session_id: &str, instance_name: &str, data: &[u8]) -> Result<()> {
        let _timer = ActionTimer::start("write_terminal");
        if data.is_empty() {
            return Ok(());
        }
        let Some(conn) = self.registry.get(session_id, instance_name).await else {
            tracing::trace!(session = %session_id, instance = %instance_name, "dropping input for detached terminal");
            return Ok(());
        };
        conn.write(data).await?;
        Ok(())
    }

    pub async fn resize_terminal(&self, instance: &Instance, rows: u16, cols: u16) -> Result<()> {
        let _timer = ActionTimer::start("resize_terminal");
        Ok(self.engine.resize(&instance.name, rows, cols).await?)
    }

    /// Run a one-shot command in the instance. Returns its exit code.
    pub async fn exec(&self, instance: &Instance, cmd: &[String]) -> Result<i64> {
        let _timer = ActionTimer::start("exec");
        Ok(self.engine.exec(&instance.name, cmd).await?)
    }

    /// Close every terminal connection and wait for the relays to stop.
    pub async fn shutdown(&self) {
        self.relay.shutdown().await;
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn is_privileged_image(&self, image: &str) -> bool {
        self.config.images.allowed().iter().any(|allowed| allowed == image)
    }

    async fn rollback_container(&self, instance: &Instance) {
        tracing::warn!(instance = %instance.name, "persisting instance failed, removing container");
        match self.engine.delete(&instance.name).await {
            Ok(()) | Err(EngineError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(instance = %instance.name, error = %e, "rollback could not remove container");
            }
        }
    }

    async fn record_gauges(&self, session: &Session, instances: &InstanceMap) {
        self.gauges.record(&GaugeSnapshot {
            session_id: session.id().to_string(),
            instances: instances.len(),
            terminals: self.registry.len().await,
        });
    }
}

/// Lowest `node{N}` (N >= 1) whose container name is free in the session.
fn next_hostname(session: &Session, instances: &InstanceMap) -> String {
    (1..)
        .map(|n| format!("node{n}"))
        .find(|hostname| !instances.contains_key(&session.container_name(hostname)))
        .unwrap_or_default()
}
