//! Integration tests for the stop-tunnel flow and concurrent rate limiting
//!
//! A simulated edge node holds a presence marker and listens on the control
//! channel. The control side resolves the tunnel's identifier, broadcasts a
//! kill and observes the marker disappear.

use std::sync::Arc;
use std::time::Duration;
use switchboard_control::{
    presence_key, resolve, ControlChannel, ControlMessage, OperationClass, PresenceRegistry,
    SlidingWindowLimiter, TunnelProtocol,
};
use switchboard_store::{CoordinationStore, MemoryStore};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Spawn an edge node that owns `identifier` and drops its marker on kill
async fn spawn_edge_node(
    store: Arc<MemoryStore>,
    identifier: &str,
) -> mpsc::UnboundedReceiver<ControlMessage> {
    store.set_with_ttl(presence_key(identifier), Some(Duration::from_secs(60)));

    let channel = ControlChannel::new(store.clone());
    let mut subscriber = channel.subscribe().await.unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let identifier = identifier.to_string();

    tokio::spawn(async move {
        while let Some(message) = subscriber.next_message().await {
            let ControlMessage::Kill(target) = &message;
            if *target == identifier {
                store.remove(&presence_key(&identifier));
            }
            let _ = seen_tx.send(message);
        }
    });

    seen_rx
}

async fn wait_until_offline(registry: &PresenceRegistry, identifier: &str) {
    timeout(Duration::from_secs(2), async {
        while registry.is_online(identifier).await.unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("tunnel should go offline after kill");
}

#[tokio::test]
async fn test_kill_tears_down_tcp_tunnel() {
    let store = Arc::new(MemoryStore::new());
    let mut seen = spawn_edge_node(store.clone(), "pretty-cake").await;

    let registry = PresenceRegistry::new(store.clone());
    let channel = ControlChannel::new(store.clone());

    let identifier = resolve("tcp://pretty-cake.example.app:20001", TunnelProtocol::Tcp);
    assert!(registry.is_online(identifier.as_str()).await.unwrap());

    channel.broadcast_kill(identifier.as_str()).await.unwrap();

    wait_until_offline(&registry, identifier.as_str()).await;
    assert_eq!(
        seen.recv().await,
        Some(ControlMessage::Kill("pretty-cake".to_string()))
    );
}

#[tokio::test]
async fn test_kill_only_affects_matching_tunnel() {
    let store = Arc::new(MemoryStore::new());
    let _victim = spawn_edge_node(store.clone(), "victim.example.app").await;
    let mut bystander = spawn_edge_node(store.clone(), "bystander.example.app").await;

    let registry = PresenceRegistry::new(store.clone());
    let channel = ControlChannel::new(store.clone());

    let identifier = resolve("https://victim.example.app", TunnelProtocol::Http);
    channel.broadcast_kill(identifier.as_str()).await.unwrap();

    wait_until_offline(&registry, "victim.example.app").await;

    // The bystander saw the instruction but kept its session
    assert!(bystander.recv().await.is_some());
    assert!(registry.is_online("bystander.example.app").await.unwrap());
    assert_eq!(registry.count_online().await.unwrap(), 1);
}

#[tokio::test]
async fn test_repeated_kill_is_harmless() {
    let store = Arc::new(MemoryStore::new());
    let mut seen = spawn_edge_node(store.clone(), "pretty-cake.example.app").await;

    let registry = PresenceRegistry::new(store.clone());
    let channel = ControlChannel::new(store.clone());

    channel.broadcast_kill("pretty-cake.example.app").await.unwrap();
    channel.broadcast_kill("pretty-cake.example.app").await.unwrap();

    wait_until_offline(&registry, "pretty-cake.example.app").await;
    assert!(seen.recv().await.is_some());
    assert!(seen.recv().await.is_some());
    assert_eq!(registry.count_online().await.unwrap(), 0);
}

#[tokio::test]
async fn test_kill_for_unknown_tunnel_still_dispatches() {
    let store = Arc::new(MemoryStore::new());
    let channel = ControlChannel::new(store.clone());

    let result = channel.broadcast_kill("nobody-home.example.app").await;

    assert!(result.is_ok());
    assert!(store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_exceed_limit() {
    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
    let limiter = SlidingWindowLimiter::new(store);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .check(OperationClass::SessionCreation, "203.0.113.7")
                .await
                .unwrap()
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().allowed {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 10);
}
