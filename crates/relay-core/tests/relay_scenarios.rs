//! End-to-end scenarios for the relay core over in-memory connections.
//!
//! Each connected client is a real spawned task running
//! [`Relay::serve_session`], exactly as the WebSocket transport does it; the
//! test plays the remote peers through [`MockClient`] handles.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_core::connection::mock::{mock_connection, MockClient, MockSink};
use relay_core::lifecycle::WELCOME_NOTICE;
use relay_core::timestamp::strip_stamp;
use relay_core::{CloseCause, MemoryLogSink, Relay, RelaySettings, SessionSummary};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(2);

fn make_relay() -> (Arc<Relay>, Arc<MemoryLogSink>) {
    let log = Arc::new(MemoryLogSink::new());
    let settings = RelaySettings {
        write_timeout: Duration::from_millis(250),
        close_timeout: Duration::from_millis(250),
    };
    (Arc::new(Relay::new(log.clone(), settings)), log)
}

/// Spawns a session task for a new in-memory connection from `peer`.
fn connect(relay: &Arc<Relay>, peer: &str) -> (MockClient, JoinHandle<SessionSummary>) {
    let (client, sink, source) = mock_connection();
    let relay = Arc::clone(relay);
    let peer: IpAddr = peer.parse().unwrap();
    let task = tokio::spawn(async move {
        relay
            .serve_session(peer, sink, source)
            .await
            .expect("fresh session ids never collide")
    });
    (client, task)
}

async fn wait_for_count(relay: &Relay, expected: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while relay.registry().count().await != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "registry never reached {expected} sessions"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_alice_bob_chat_mute_and_shutdown() {
    let (relay, log) = make_relay();

    // Alice joins alone.
    let (alice, alice_task) = connect(&relay, "10.0.0.1");
    alice.send("Alice");
    assert!(alice.wait_for_message("Alice connected.", WAIT).await);
    assert_eq!(relay.registry().count().await, 1);
    assert_eq!(relay.list_users(false).await, "Connected users (1): Alice");

    // Bob joins; Alice hears about it.
    let (bob, bob_task) = connect(&relay, "10.0.0.2");
    bob.send("Bob");
    assert!(alice.wait_for_message("Bob connected.", WAIT).await);
    assert_eq!(relay.registry().count().await, 2);

    // Alice talks.
    alice.send("hi");
    assert!(bob.wait_for_message("Alice says: hi", WAIT).await);

    // The operator mutes Alice; her next line only earns her a notice.
    relay
        .mute_address("10.0.0.1".parse().unwrap(), true)
        .await
        .unwrap();
    let bob_before = bob.messages().len();
    let alice_before = alice.messages().len();
    alice.send("hello");
    let deadline = tokio::time::Instant::now() + WAIT;
    while alice.messages().len() < alice_before + 1 {
        assert!(tokio::time::Instant::now() < deadline, "no reply to muted sender");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(alice.messages().last().map(String::as_str), Some("(SERVER) Muted."));
    assert_eq!(bob.messages().len(), bob_before);
    assert!(!log.lines().iter().any(|l| l.contains("says: hello")));

    // Shutdown: one notice each, then the connections close, nobody "left".
    assert!(relay.initiate_shutdown("admin command").await);
    let alice_summary = tokio::time::timeout(WAIT, alice_task).await.unwrap().unwrap();
    let bob_summary = tokio::time::timeout(WAIT, bob_task).await.unwrap().unwrap();

    for client in [&alice, &bob] {
        let msgs = client.messages();
        assert_eq!(
            msgs.last().map(String::as_str),
            Some("(SERVER) Shutdown by admin command.")
        );
        assert_eq!(
            msgs.iter()
                .filter(|m| m.as_str() == "(SERVER) Shutdown by admin command.")
                .count(),
            1
        );
        assert!(!msgs.iter().any(|m| m.ends_with(" left.")));
        assert!(client.sink().is_closed());
    }
    assert_eq!(alice_summary.cause, CloseCause::CloseRequested);
    assert_eq!(alice_summary.message_count, 3);
    assert_eq!(bob_summary.name.as_deref(), Some("Bob"));
    assert_eq!(relay.registry().count().await, 0);
    assert!(relay.shutdown().in_shutdown());
}

#[tokio::test]
async fn test_disconnect_outside_shutdown_announces_leave() {
    let (relay, log) = make_relay();
    let (alice, alice_task) = connect(&relay, "10.0.0.1");
    let (bob, _bob_task) = connect(&relay, "10.0.0.2");
    alice.send("Alice");
    bob.send("Bob");
    wait_for_count(&relay, 2).await;
    assert!(alice.wait_for_message("Bob connected.", WAIT).await);

    alice.break_connection("socket reset");
    let summary = tokio::time::timeout(WAIT, alice_task).await.unwrap().unwrap();

    assert!(matches!(summary.cause, CloseCause::ReadFailed(_)));
    assert!(bob.wait_for_message("Alice left.", WAIT).await);
    assert!(log.lines().contains(&"Alice left.".to_string()));
    assert_eq!(relay.list_users(false).await, "Connected users (1): Bob");
}

#[tokio::test]
async fn test_broken_recipient_is_evicted_and_others_keep_receiving() {
    let (relay, _) = make_relay();
    let (alice, _a) = connect(&relay, "10.0.0.1");
    let (broken, broken_task) = connect(&relay, "10.0.0.2");
    let (carol, _c) = connect(&relay, "10.0.0.3");
    alice.send("Alice");
    broken.send("Broken");
    carol.send("Carol");
    assert!(alice.wait_for_message("Carol connected.", WAIT).await);
    assert!(broken.wait_for_message("Carol connected.", WAIT).await);

    broken.sink().set_stall_writes(true);
    alice.send("anyone there?");

    assert!(carol.wait_for_message("Alice says: anyone there?", WAIT).await);
    let summary = tokio::time::timeout(WAIT, broken_task).await.unwrap().unwrap();
    assert_eq!(summary.cause, CloseCause::CloseRequested);
    assert!(carol.wait_for_message("Broken left.", WAIT).await);
    wait_for_count(&relay, 2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_sessions_leave_exact_membership() {
    let (relay, _) = make_relay();
    let mut stayers = Vec::new();
    let mut leavers = Vec::new();

    for i in 0..60u32 {
        let (client, task) = connect(&relay, &format!("10.1.0.{}", i + 1));
        client.send(&format!("user{i}"));
        if i % 3 == 0 {
            leavers.push((client, task));
        } else {
            stayers.push((client, task));
        }
    }
    wait_for_count(&relay, 60).await;

    let mut left_names = HashSet::new();
    for (client, task) in leavers {
        drop(client);
        let summary = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        left_names.insert(summary.name.unwrap());
    }
    wait_for_count(&relay, 40).await;

    let listed = relay.list_users(false).await;
    assert!(listed.starts_with("Connected users (40): "));
    for name in &left_names {
        let as_entry = listed
            .trim_start_matches("Connected users (40): ")
            .split(", ")
            .any(|n| n == name);
        assert!(!as_entry, "{name} should have left");
    }
    assert_eq!(stayers.len(), 40);
}

/// Messages seen after the first occurrence of `notice`, or `None` if it
/// never arrived.
fn after_notice<'a>(messages: &'a [String], notice: &str) -> Option<&'a [String]> {
    let pos = messages.iter().position(|m| m == notice)?;
    Some(&messages[pos + 1..])
}

fn sink_messages(sink: &MockSink) -> Vec<String> {
    sink.frames().iter().map(|f| strip_stamp(f).to_owned()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disconnects_racing_shutdown_never_follow_the_notice() {
    const NOTICE: &str = "(SERVER) Shutdown by x.";
    let (relay, log) = make_relay();

    // Arrange: 40 named sessions
    let mut clients = Vec::new();
    for i in 0..40u32 {
        let (client, task) = connect(&relay, &format!("10.2.0.{}", i + 1));
        client.send(&format!("user{i}"));
        clients.push((client, task));
    }
    for (client, _) in &clients {
        assert!(client.wait_for_message(WELCOME_NOTICE, WAIT).await);
    }

    // Act: half of them disconnect while the shutdown runs
    let mut stayers = Vec::new();
    let mut leavers = Vec::new();
    let mut departures = Vec::new();
    for (i, (client, task)) in clients.into_iter().enumerate() {
        if i % 2 == 1 {
            stayers.push((client, task));
            continue;
        }
        leavers.push((Arc::clone(client.sink()), task));
        departures.push(tokio::spawn(async move {
            if i % 4 == 0 {
                client.break_connection("socket reset");
            } else {
                drop(client);
            }
        }));
        if i == 10 {
            let shutdown_relay = Arc::clone(&relay);
            departures.push(tokio::spawn(async move {
                assert!(shutdown_relay.initiate_shutdown("x").await);
            }));
        }
    }
    for departure in departures {
        tokio::time::timeout(WAIT, departure).await.unwrap().unwrap();
    }

    // Assert
    for (client, task) in stayers {
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        let msgs = client.messages();
        assert_eq!(msgs.iter().filter(|m| m.as_str() == NOTICE).count(), 1);
        let tail = after_notice(&msgs, NOTICE).unwrap();
        assert!(!tail.iter().any(|m| m.ends_with(" left.")), "{tail:?}");
    }
    for (sink, task) in leavers {
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        let msgs = sink_messages(&sink);
        assert!(msgs.iter().filter(|m| m.as_str() == NOTICE).count() <= 1);
        if let Some(tail) = after_notice(&msgs, NOTICE) {
            assert!(!tail.iter().any(|m| m.ends_with(" left.")), "{tail:?}");
        }
    }
    let lines = log.lines();
    let tail = after_notice(&lines, NOTICE).unwrap();
    assert!(!tail.iter().any(|l| l.ends_with(" left.")), "{tail:?}");
    wait_for_count(&relay, 0).await;
}
