//! Live agent connections

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One live agent connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentClient {
    /// Connection id issued by the agent transport
    pub id: u64,
    /// Host process the agent is attached to
    pub pid: u32,
    /// When the connect event was registered
    pub connected_at: DateTime<Local>,
}

/// Registry of connected agents, the single source of truth for liveness
#[derive(Debug, Default)]
pub struct AgentRegistry {
    clients: RwLock<Vec<AgentClient>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connect event; an existing entry with the same id is replaced
    pub async fn on_connect(&self, id: u64, pid: u32) -> AgentClient {
        let client = AgentClient {
            id,
            pid,
            connected_at: Local::now(),
        };

        let mut clients = self.clients.write().await;
        clients.retain(|existing| existing.id != id);
        clients.push(client.clone());

        info!("Agent {} connected (pid {})", id, pid);
        client
    }

    /// Drop every entry with this id; returns how many were removed
    pub async fn on_disconnect(&self, id: u64) -> usize {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|client| client.id != id);
        let removed = before - clients.len();

        if removed > 0 {
            info!("Agent {} disconnected", id);
        } else {
            debug!("Disconnect for unknown agent {}", id);
        }
        removed
    }

    /// Snapshot of live agents in connection order
    pub async fn list(&self) -> Vec<AgentClient> {
        self.clients.read().await.clone()
    }

    /// Look up one agent
    pub async fn get(&self, id: u64) -> Option<AgentClient> {
        self.clients.read().await.iter().find(|client| client.id == id).cloned()
    }

    /// Number of live agents
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// True when no agent is connected
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
