//! Persistence contract and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sandbox_common::{SessionId, StorageError};
use tokio::sync::RwLock;

use crate::types::Instance;

/// Durable record of instance metadata.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_instance(&self, session_id: &SessionId, instance: &Instance) -> Result<(), StorageError>;

    /// Remove a record. Removing an absent record is not an error.
    async fn delete_instance(&self, session_id: &SessionId, instance_name: &str) -> Result<(), StorageError>;

    async fn find_instance_by_ip(&self, ip: &str) -> Result<Instance, StorageError>;

    async fn find_instance_by_alias(&self, session_prefix: &str, alias: &str) -> Result<Instance, StorageError>;

    async fn find_instance_by_ip_and_session(&self, session_prefix: &str, ip: &str) -> Result<Instance, StorageError>;
}

/// Process-local storage keyed by session, then instance name.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    sessions: Arc<RwLock<HashMap<String, HashMap<String, Instance>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances across all sessions.
    pub async fn instance_count(&self) -> usize {
        self.sessions.read().await.values().map(HashMap::len).sum()
    }

    pub async fn get(&self, session_id: &SessionId, instance_name: &str) -> Option<Instance> {
        let map = self.sessions.read().await;
        map.get(session_id.as_str())?.get(instance_name).cloned()
    }

    async fn find(&self, what: String, pred: impl Fn(&str, &Instance) -> bool) -> Result<Instance, StorageError> {
        let map = self.sessions.read().await;
        map.iter()
            .flat_map(|(session_id, instances)| instances.values().map(move |i| (session_id, i)))
            .find(|(session_id, instance)| pred(session_id, instance))
            .map(|(_, instance)| instance.clone())
            .ok_or(StorageError::NotFound(what))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_instance(&self, session_id: &SessionId, instance: &Instance) -> Result<(), StorageError> {
        let mut map = self.sessions.write().await;
        map.entry(session_id.to_string())
            .or_default()
            .insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    async fn delete_instance(&self, session_id: &SessionId, instance_name: &str) -> Result<(), StorageError> {
        let mut map = self.sessions.write().await;
        if let Some(instances) = map.get_mut(session_id.as_str()) {
            instances.remove(instance_name);
            if instances.is_empty() {
                map.remove(session_id.as_str());
            }
        }
        Ok(())
    }

    async fn find_instance_by_ip(&self, ip: &str) -> Result<Instance, StorageError> {
        self.find(format!("instance with ip {ip}"), |_, i| i.ip == ip).await
    }

    async fn find_instance_by_alias(&self, session_prefix: &str, alias: &str) -> Result<Instance, StorageError> {
        self.find(format!("instance with alias {alias}"), |session_id, i| {
            session_id.starts_with(session_prefix) && i.alias.as_deref() == Some(alias)
        })
        .await
    }

    async fn find_instance_by_ip_and_session(&self, session_prefix: &str, ip: &str) -> Result<Instance, StorageError> {
        self.find(format!("instance with ip {ip}"), |session_id, i| {
            session_id.starts_with(session_prefix) && i.ip == ip
        })
        .await
    }
}
