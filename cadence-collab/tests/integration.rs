//! Integration tests for end-to-end workspace event streaming.
//!
//! These tests start a real hub and connect real stream clients over
//! loopback WebSockets, verifying subscription, fan-out, invalidation
//! bridging, and reconnection.

use std::sync::Arc;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use cadence_collab::hub::{EventHub, HubConfig};
use cadence_collab::protocol::{now_ms, WorkspaceEvent};
use cadence_collab::store::{MemoryStore, SnapshotStore};
use cadence_collab::stream::{ConnectionState, StreamConfig, StreamEvent, WorkspaceStream};
use cadence_core::model::{ActivityEvent, BillingTier, Board, Workspace};
use cadence_core::mutation::{apply_at, BoardMutation};

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a hub on a free port, bridged to the given store. Returns the port.
async fn start_test_hub(store: &Arc<MemoryStore>) -> u16 {
    let port = free_port().await;
    let config = HubConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        broadcast_capacity: 64,
        ..HubConfig::default()
    };
    let hub = EventHub::new(config);
    hub.attach_store_updates(store.subscribe_updates()).await;
    tokio::spawn(async move {
        hub.run().await.unwrap();
    });
    // Give the hub time to bind.
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

/// Seed a workspace with one board; return (workspace_id, board_id).
async fn seed_workspace(store: &Arc<MemoryStore>) -> (Uuid, Uuid) {
    let mut ws = Workspace::new("Atelier", BillingTier::Studio);
    let mut board = Board::new(ws.id, "Launch");
    board.last_updated = 100;
    let (ws_id, board_id) = (ws.id, board.id);
    ws.boards.push(board);
    store.insert_workspace(ws).await;
    (ws_id, board_id)
}

/// Connect a stream and drain events until `Connected` arrives.
async fn connect_stream(
    workspace_id: Uuid,
    name: &str,
    url: &str,
) -> (WorkspaceStream, tokio::sync::mpsc::Receiver<StreamEvent>) {
    let mut stream = WorkspaceStream::new(workspace_id, Uuid::new_v4(), name, url);
    let mut events = stream.take_event_rx().unwrap();
    stream.start();

    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(StreamEvent::Connected) => break,
                Some(_) => continue,
                None => panic!("event channel closed before Connected"),
            }
        }
    })
    .await
    .expect("stream should connect");

    (stream, events)
}

/// Wait for the next workspace event matching the predicate.
async fn expect_event<F>(
    events: &mut tokio::sync::mpsc::Receiver<StreamEvent>,
    mut pred: F,
) -> WorkspaceEvent
where
    F: FnMut(&WorkspaceEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(StreamEvent::Workspace(ev)) if pred(&ev) => return ev,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event within timeout")
}

#[tokio::test]
async fn test_hub_accepts_connections() {
    let store = MemoryStore::new();
    let port = start_test_hub(&store).await;
    let url = format!("ws://127.0.0.1:{port}");

    let result = tokio_tungstenite::connect_async(&url).await;
    assert!(result.is_ok(), "should connect to hub");
}

#[tokio::test]
async fn test_stream_connects_and_receives_presence_snapshot() {
    let store = MemoryStore::new();
    let port = start_test_hub(&store).await;
    let (ws_id, _) = seed_workspace(&store).await;
    let url = format!("ws://127.0.0.1:{port}");

    let (stream, mut events) = connect_stream(ws_id, "Alice", &url).await;
    assert_eq!(stream.state().await, ConnectionState::Connected);

    // The hub hands every new subscriber a full presence snapshot.
    let ev = expect_event(&mut events, |e| matches!(e, WorkspaceEvent::Presence { .. })).await;
    match ev {
        WorkspaceEvent::Presence { users } => assert!(users.is_empty()),
        other => panic!("expected presence snapshot, got {other:?}"),
    }
    stream.shutdown();
}

#[tokio::test]
async fn test_published_activity_reaches_other_viewer() {
    let store = MemoryStore::new();
    let port = start_test_hub(&store).await;
    let (ws_id, board_id) = seed_workspace(&store).await;
    let url = format!("ws://127.0.0.1:{port}");

    let (alice, mut alice_events) = connect_stream(ws_id, "Alice", &url).await;
    let (bob, mut bob_events) = connect_stream(ws_id, "Bob", &url).await;

    let mut activity = ActivityEvent::new("alice", "renamed a column", now_ms());
    activity.board_id = Some(board_id);
    alice
        .publish(WorkspaceEvent::Activity(activity.clone()))
        .await
        .unwrap();

    let ev = expect_event(&mut bob_events, |e| matches!(e, WorkspaceEvent::Activity(_))).await;
    match ev {
        WorkspaceEvent::Activity(got) => {
            assert_eq!(got.actor, "alice");
            assert_eq!(got.board_id, Some(board_id));
        }
        other => panic!("expected activity, got {other:?}"),
    }

    // The publisher hears its own event too; the feed is shared.
    let ev = expect_event(&mut alice_events, |e| {
        matches!(e, WorkspaceEvent::Activity(_))
    })
    .await;
    assert!(matches!(ev, WorkspaceEvent::Activity(_)));

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn test_accepted_replace_pushes_invalidation() {
    let store = MemoryStore::new();
    let port = start_test_hub(&store).await;
    let (ws_id, board_id) = seed_workspace(&store).await;
    let url = format!("ws://127.0.0.1:{port}");

    let (stream, mut events) = connect_stream(ws_id, "Alice", &url).await;

    // A replace accepted by the store reaches every viewer as a
    // board-updated invalidation carrying only id + stamp.
    let board = store.fetch_board(board_id).await.unwrap();
    let next = apply_at(
        &board,
        &BoardMutation::SetProjectName {
            name: "Relaunch".into(),
        },
        now_ms(),
    );
    store
        .replace_board(next.clone(), board.last_updated)
        .await
        .unwrap();

    let ev = expect_event(&mut events, |e| {
        matches!(e, WorkspaceEvent::BoardUpdated { .. })
    })
    .await;
    match ev {
        WorkspaceEvent::BoardUpdated {
            board_id: id,
            last_updated,
        } => {
            assert_eq!(id, board_id);
            assert_eq!(last_updated, next.last_updated);
        }
        other => panic!("expected board-updated, got {other:?}"),
    }
    stream.shutdown();
}

#[tokio::test]
async fn test_workspaces_are_isolated() {
    let store = MemoryStore::new();
    let port = start_test_hub(&store).await;
    let (ws_a, _) = seed_workspace(&store).await;
    let (ws_b, _) = seed_workspace(&store).await;
    let url = format!("ws://127.0.0.1:{port}");

    let (alice, mut alice_events) = connect_stream(ws_a, "Alice", &url).await;
    let (bob, mut bob_events) = connect_stream(ws_b, "Bob", &url).await;

    alice
        .publish(WorkspaceEvent::Activity(ActivityEvent::new(
            "alice",
            "only for workspace A",
            now_ms(),
        )))
        .await
        .unwrap();

    // Alice's own workspace sees it.
    expect_event(&mut alice_events, |e| {
        matches!(e, WorkspaceEvent::Activity(_))
    })
    .await;

    // Bob's workspace never does.
    let leaked = timeout(Duration::from_millis(300), async {
        loop {
            match bob_events.recv().await {
                Some(StreamEvent::Workspace(WorkspaceEvent::Activity(_))) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await;
    assert!(leaked.is_err(), "activity leaked across workspaces");

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn test_stream_reconnects_when_hub_appears() {
    let store = MemoryStore::new();
    let (ws_id, _) = seed_workspace(&store).await;
    let port = free_port().await;
    let url = format!("ws://127.0.0.1:{port}");

    // Start the client first: nothing is listening yet, so it cycles
    // through backoff.
    let mut stream = WorkspaceStream::with_config(
        ws_id,
        Uuid::new_v4(),
        "Alice",
        &url,
        StreamConfig {
            backoff_base: Duration::from_millis(50),
            backoff_cap: Duration::from_millis(200),
            degraded_after: 100,
        },
    );
    let mut events = stream.take_event_rx().unwrap();
    stream.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_ne!(stream.state().await, ConnectionState::Connected);

    // Bring the hub up on the same port; the client finds it by itself.
    let config = HubConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        ..HubConfig::default()
    };
    let hub = EventHub::new(config);
    hub.attach_store_updates(store.subscribe_updates()).await;
    tokio::spawn(async move {
        hub.run().await.unwrap();
    });

    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(StreamEvent::Connected) => break,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("stream should reconnect once the hub is up");
    assert_eq!(stream.state().await, ConnectionState::Connected);
    stream.shutdown();
}
