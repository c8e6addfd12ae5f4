// flowgate-http/src/sweeper.rs
// ============================================================================
// Module: TTL Deletion Alarm
// Description: Periodic background sweep evicting expired sessions from the
//              Flow State Store.
// Purpose: Reclaim a session whose TTL elapses but is never read again;
//          lazy, access-triggered expiry alone would leak it for the life of
//          the process.
// Dependencies: tokio::{spawn,time}, flowgate_core::runtime::store, crate::clock
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use flowgate_core::runtime::store::ShardedStateStore;

use crate::clock;

/// Spawns a background task that calls [`ShardedStateStore::sweep_expired`]
/// against `store` every `interval`, reading the wall clock itself via
/// [`clock::now`]. The returned handle may be dropped to leave the sweep
/// running for the life of the process, or aborted to stop it early.
pub fn spawn_ttl_sweeper(store: Arc<ShardedStateStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let _ = store.sweep_expired(clock::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_core::core::identifiers::ClientId;
    use flowgate_core::core::identifiers::FlowType;
    use flowgate_core::core::identifiers::NodeId;
    use flowgate_core::core::identifiers::SessionId;
    use flowgate_core::core::identifiers::TenantId;
    use flowgate_core::core::time::Timestamp;
    use flowgate_core::runtime::store::InitParams;
    use serde_json::Map;

    #[tokio::test]
    async fn spawned_sweeper_evicts_an_already_expired_session() {
        let store = Arc::new(ShardedStateStore::new(1));
        store
            .init(InitParams {
                session_id: SessionId::from("flow_1"),
                flow_type: FlowType::from("login"),
                tenant_id: TenantId::from("tenant-a"),
                client_id: ClientId::from("client-a"),
                entry_node_id: NodeId::from("identify"),
                oauth_params: Map::new(),
                created_at: Timestamp::from_millis(0),
                ttl_ms: 0,
            })
            .await
            .unwrap();

        let handle = spawn_ttl_sweeper(Arc::clone(&store), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        let err = store.state(&SessionId::from("flow_1"), Timestamp::from_millis(0)).await.unwrap_err();
        assert!(matches!(err, flowgate_core::StoreError::SessionNotFound));
    }
}
