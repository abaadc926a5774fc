//! Set of running pipelines, keyed by endpoint id

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::manager::{spawn_pipeline, ConnectionConfig, PipelineHandle};
use super::state::ConnectionSnapshot;
use super::transport::Connector;

struct PipelineEntry {
    handle: PipelineHandle,
    task: JoinHandle<()>,
}

/// Pipelines share nothing with each other; the registry only hands out handles.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: DashMap<String, PipelineEntry>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a pipeline for `endpoint_id`
    pub fn spawn(
        &self,
        endpoint_id: &str,
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
    ) -> Result<PipelineHandle, RegistryError> {
        use dashmap::mapref::entry::Entry;

        match self.pipelines.entry(endpoint_id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(endpoint_id.to_string())),
            Entry::Vacant(slot) => {
                let (handle, task) = spawn_pipeline(endpoint_id, connector, config);
                slot.insert(PipelineEntry {
                    handle: handle.clone(),
                    task,
                });
                tracing::debug!(endpoint_id = %endpoint_id, "Registered pipeline");
                Ok(handle)
            }
        }
    }

    pub fn get(&self, endpoint_id: &str) -> Option<PipelineHandle> {
        self.pipelines.get(endpoint_id).map(|e| e.handle.clone())
    }

    /// Endpoint ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pipelines.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn handles(&self) -> Vec<PipelineHandle> {
        let mut handles: Vec<PipelineHandle> =
            self.pipelines.iter().map(|e| e.handle.clone()).collect();
        handles.sort_by(|a, b| a.endpoint_id().cmp(b.endpoint_id()));
        handles
    }

    /// Connection snapshot of every pipeline, sorted by endpoint id
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.handles().iter().map(|h| h.connection()).collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Stop one pipeline and wait for its task
    pub async fn remove(&self, endpoint_id: &str) -> bool {
        let Some((_, entry)) = self.pipelines.remove(endpoint_id) else {
            return false;
        };
        Self::stop(entry).await;
        true
    }

    /// Stop every pipeline and wait for all tasks
    pub async fn shutdown_all(&self) {
        for id in self.ids() {
            if let Some((_, entry)) = self.pipelines.remove(&id) {
                Self::stop(entry).await;
            }
        }
    }

    async fn stop(entry: PipelineEntry) {
        let id = entry.handle.endpoint_id().to_string();
        if entry.handle.shutdown().await.is_err() {
            tracing::debug!(endpoint_id = %id, "Pipeline already stopped");
        }
        if let Err(e) = entry.task.await {
            tracing::error!(endpoint_id = %id, error = %e, "Pipeline task failed");
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Pipeline '{0}' already exists")]
    Duplicate(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::transport::{ConnectionError, TransportLink};
    use crate::ingest::ConnectionStatus;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        fn target(&self) -> &str {
            "mock://unreachable"
        }

        async fn open(&self) -> Result<TransportLink, ConnectionError> {
            Err(ConnectionError::Transport("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_spawn_get_and_list() {
        let registry = PipelineRegistry::new();
        registry
            .spawn("payments", Arc::new(Unreachable), ConnectionConfig::default())
            .unwrap();
        registry
            .spawn("catalog", Arc::new(Unreachable), ConnectionConfig::default())
            .unwrap();

        assert_eq!(registry.ids(), vec!["catalog", "payments"]);
        assert_eq!(registry.len(), 2);

        let handle = registry.get("payments").unwrap();
        assert_eq!(handle.endpoint_id(), "payments");
        assert!(registry.get("missing").is_none());

        let snapshots = registry.snapshots();
        assert_eq!(snapshots[0].endpoint_id, "catalog");
        assert_eq!(snapshots[1].status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let registry = PipelineRegistry::new();
        registry
            .spawn("payments", Arc::new(Unreachable), ConnectionConfig::default())
            .unwrap();
        let err = registry
            .spawn("payments", Arc::new(Unreachable), ConnectionConfig::default())
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("payments".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_all_stops_tasks() {
        let registry = PipelineRegistry::new();
        let handle = registry
            .spawn("payments", Arc::new(Unreachable), ConnectionConfig::default())
            .unwrap();

        registry.shutdown_all().await;
        assert!(registry.is_empty());
        assert!(handle.is_stopped());
        assert!(!registry.remove("payments").await);
    }
}
