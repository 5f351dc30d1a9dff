//! Session and instance data model.

use std::collections::HashMap;
use std::sync::Arc;

use sandbox_common::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// Instances of one session, keyed by container name.
pub type InstanceMap = HashMap<String, Arc<Instance>>;

// =============================================================================
// INSTANCE
// =============================================================================

/// TLS material handed to the container. Opaque to this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    pub server_cert: Vec<u8>,
    pub server_key: Vec<u8>,
    pub ca_cert: Vec<u8>,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

/// One container-backed node of a session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Container name, `{session prefix}_{hostname}`.
    pub name: String,
    pub image: String,
    pub ip: String,
    pub hostname: String,
    pub alias: Option<String>,
    pub tls: TlsMaterial,
    /// Owning session.
    pub session_id: SessionId,
    /// Whether the container runs with elevated capability.
    pub is_docker_host: bool,
}

/// Parameters of a create request.
#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    /// Image reference; `None` selects the configured base image.
    pub image_name: Option<String>,
    /// Hostname; `None` allocates the lowest free `node{N}`.
    pub hostname: Option<String>,
    pub alias: Option<String>,
    pub tls: TlsMaterial,
    /// Host FQDN passed through to the container engine.
    pub host: String,
}

// =============================================================================
// SESSION
// =============================================================================

/// A collaborative workspace grouping instances under one lock.
///
/// The instance map sits behind the session lock: holding the guard
/// returned by [`Session::lock`] serializes create, delete and hostname
/// allocation for this session.
pub struct Session {
    id: SessionId,
    pwd_ip_address: String,
    instances: Mutex<InstanceMap>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, pwd_ip_address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pwd_ip_address: pwd_ip_address.into(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Externally visible address of the session.
    pub fn pwd_ip_address(&self) -> &str {
        &self.pwd_ip_address
    }

    /// Container name for `hostname` inside this session.
    pub fn container_name(&self, hostname: &str) -> String {
        format!("{}_{}", self.id.prefix(), hostname)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, InstanceMap> {
        self.instances.lock().await
    }

    pub async fn instance(&self, name: &str) -> Option<Arc<Instance>> {
        self.instances.lock().await.get(name).cloned()
    }

    pub async fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }

    /// Re-insert an instance loaded from persistence, e.g. after a restart.
    /// No container is created.
    pub async fn restore(&self, instance: Instance) -> Arc<Instance> {
        let instance = Arc::new(instance);
        self.instances
            .lock()
            .await
            .insert(instance.name.clone(), Arc::clone(&instance));
        instance
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("pwd_ip_address", &self.pwd_ip_address)
            .finish_non_exhaustive()
    }
}
