//! Point-in-time view of registered connections

use chrono::{DateTime, Utc};
use framerelay_core::{ConnectionId, ConnectionRegistry, ConnectionState};
use serde::{Deserialize, Serialize};

/// State of one registered connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Connection id
    pub id: ConnectionId,
    /// Current state
    pub state: ConnectionState,
    /// When the connection was created
    pub created_at: DateTime<Utc>,
    /// Seconds since creation
    pub age_secs: i64,
}

/// Counts of connections per state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    /// Registered connections
    pub total: usize,
    /// Connections in the connected state
    pub connected: usize,
    /// Connections still negotiating
    pub pending: usize,
    /// Connections that lost connectivity
    pub disconnected: usize,
}

/// Snapshot every connection in `registry`, oldest first
pub fn analyze(registry: &ConnectionRegistry) -> Vec<ConnectionInfo> {
    let now = Utc::now();
    let mut infos: Vec<ConnectionInfo> = registry
        .handles()
        .iter()
        .map(|handle| ConnectionInfo {
            id: handle.id(),
            state: handle.state(),
            created_at: handle.created_at(),
            age_secs: (now - handle.created_at()).num_seconds(),
        })
        .collect();
    infos.sort_by_key(|info| info.created_at);
    infos
}

/// Summarize connection states
pub fn summarize(infos: &[ConnectionInfo]) -> ConnectionSummary {
    let mut summary = ConnectionSummary {
        total: infos.len(),
        ..Default::default()
    };
    for info in infos {
        match info.state {
            ConnectionState::Connected => summary.connected += 1,
            ConnectionState::New | ConnectionState::Connecting => summary.pending += 1,
            ConnectionState::Disconnected => summary.disconnected += 1,
            ConnectionState::Failed | ConnectionState::Closed => {}
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use framerelay_core::{EngineConfig, PeerConnectionHandle};

    #[tokio::test]
    async fn test_analyze_registry() {
        let registry = ConnectionRegistry::new();
        assert!(analyze(&registry).is_empty());

        let config = EngineConfig::local_only();
        let a = PeerConnectionHandle::new(&config).await.unwrap();
        let b = PeerConnectionHandle::new(&config).await.unwrap();
        registry.insert(a.clone());
        registry.insert(b.clone());

        let infos = analyze(&registry);
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.state == ConnectionState::New));
        assert!(infos[0].created_at <= infos[1].created_at);

        let summary = summarize(&infos);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.connected, 0);

        let json = serde_json::to_string(&infos[0]).unwrap();
        assert!(json.contains("\"state\":\"new\""));

        registry.close_all().await;
    }
}
