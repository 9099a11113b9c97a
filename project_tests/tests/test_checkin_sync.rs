use lib_checkin::protocol::commands;
use lib_checkin::{
    CheckinSyncClient, ChildStatus, ConnectionState, NotificationType, SyncConfig,
};
use project_tests::{child_status_body, service_status_body, MockStompServer, WAIT};
use tokio::sync::broadcast;

fn fast_config(base_url: &str) -> SyncConfig {
    SyncConfig {
        reconnect_base_delay_ms: 20,
        ..SyncConfig::new(base_url).with_auth_token("test-token")
    }
}

async fn recv<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    match tokio::time::timeout(WAIT, rx.recv()).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => panic!("stream failed: {}", e),
        Err(_) => panic!("no event within {:?}", WAIT),
    }
}

/// Waits for `wanted`, returning every state seen on the way (inclusive).
async fn wait_for_state(
    rx: &mut broadcast::Receiver<ConnectionState>,
    wanted: impl Fn(&ConnectionState) -> bool,
) -> Vec<ConnectionState> {
    let mut seen = Vec::new();
    loop {
        let state = recv(rx).await;
        let done = wanted(&state);
        seen.push(state);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_connect_sends_connect_frame_with_bearer_token() {
    let mut server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();
    let mut states = client.subscribe_connection_state();

    client.connect("u1").await.unwrap();

    let connect = server.wait_for(commands::CONNECT).await.frame;
    assert_eq!(connect.get_header("accept-version"), Some("1.2"));
    assert_eq!(connect.get_header("heart-beat"), Some("10000,10000"));
    assert_eq!(connect.get_header("Authorization"), Some("Bearer test-token"));

    let seen = wait_for_state(&mut states, ConnectionState::is_connected).await;
    assert_eq!(seen.first(), Some(&ConnectionState::Connecting));
    assert!(client.is_connected());

    client.close().await;
}

#[tokio::test]
async fn test_subscriptions_made_offline_are_replayed_before_messages() {
    let mut server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();
    let mut states = client.subscribe_connection_state();
    let mut children = client.child_status_updates();

    client.subscribe_to_child("c1").unwrap();
    client.subscribe_to_service("s1").unwrap();
    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;

    let first = server.next_frame().await.frame;
    let second = server.next_frame().await.frame;
    let third = server.next_frame().await.frame;
    assert!(first.is(commands::CONNECT));
    assert!(second.is(commands::SUBSCRIBE));
    assert!(third.is(commands::SUBSCRIBE));
    assert_eq!(second.get_header("subject-type"), Some("child"));
    assert_eq!(second.get_header("subject-id"), Some("c1"));
    assert_eq!(third.get_header("subject-type"), Some("service"));
    assert_eq!(third.get_header("subject-id"), Some("s1"));
    assert_eq!(
        second.get_header("destination"),
        Some("/user/u1/queue/checkin-status")
    );

    server.send_message("u1", &child_status_body("c1", "CHECKED_OUT", "CHECKED_IN", "s1"));

    let update = recv(&mut children).await;
    assert_eq!(update.child_id, "c1");
    assert_eq!(update.new_status, ChildStatus::CheckedIn);

    client.close().await;
}

#[tokio::test]
async fn test_subscribing_twice_while_connected_sends_one_frame() {
    let mut server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();
    let mut states = client.subscribe_connection_state();
    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;
    server.wait_for(commands::CONNECT).await;

    client.subscribe_to_child("c1").unwrap();
    client.subscribe_to_child("c1").unwrap();
    // Marker: the frame after c1's SUBSCRIBE must be this one, not a repeat
    client.subscribe_to_service("s9").unwrap();

    let first = server.next_frame().await.frame;
    let second = server.next_frame().await.frame;
    assert_eq!(first.get_header("subject-id"), Some("c1"));
    assert_eq!(second.get_header("subject-id"), Some("s9"));
    assert_eq!(client.subscriptions().len(), 2);

    client.close().await;
}

#[tokio::test]
async fn test_server_close_triggers_reconnect_and_replay() {
    let mut server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();
    let mut states = client.subscribe_connection_state();

    client.subscribe_to_child("c1").unwrap();
    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;
    let original = server.wait_for(commands::SUBSCRIBE).await;
    assert_eq!(original.connection, 0);

    server.close_client();

    let seen = wait_for_state(&mut states, ConnectionState::is_connected).await;
    assert!(matches!(seen.first(), Some(ConnectionState::Error { .. })));
    assert!(seen.contains(&ConnectionState::Reconnecting {
        attempt: 1,
        max_attempts: 5
    }));

    let replayed = server.wait_for(commands::SUBSCRIBE).await;
    assert_eq!(replayed.connection, 1);
    assert_eq!(replayed.frame.get_header("subject-id"), Some("c1"));
    assert_eq!(
        replayed.frame.get_header("id"),
        original.frame.get_header("id")
    );
    assert_eq!(server.connections(), 2);

    client.close().await;
}

#[tokio::test]
async fn test_unreachable_server_exhausts_attempts_and_stays_in_error() {
    // Grab a free port, then release it so nothing listens there
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = SyncConfig {
        max_reconnect_attempts: 2,
        reconnect_base_delay_ms: 10,
        ..SyncConfig::new(format!("http://127.0.0.1:{}", port))
    };
    let client = CheckinSyncClient::new(config).unwrap();
    let mut states = client.subscribe_connection_state();

    client.connect("u1").await.unwrap();

    let seen = wait_for_state(&mut states, |s| {
        matches!(s, ConnectionState::Error { message } if message.starts_with("reconnect attempts exhausted"))
    })
    .await;
    let attempts: Vec<u32> = seen
        .iter()
        .filter_map(|s| match s {
            ConnectionState::Reconnecting { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);
    assert!(!seen.contains(&ConnectionState::Connected));

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(matches!(client.connection_state(), ConnectionState::Error { .. }));

    client.close().await;
}

#[tokio::test]
async fn test_silent_server_hits_handshake_timeout() {
    let server = MockStompServer::start_silent().await;
    let config = SyncConfig {
        max_reconnect_attempts: 0,
        connect_timeout_ms: 200,
        ..SyncConfig::new(server.base_url())
    };
    let client = CheckinSyncClient::new(config).unwrap();
    let mut states = client.subscribe_connection_state();

    client.connect("u1").await.unwrap();

    let seen = wait_for_state(&mut states, |s| {
        matches!(s, ConnectionState::Error { message } if message.starts_with("reconnect attempts exhausted"))
    })
    .await;
    assert!(seen.iter().any(|s| matches!(
        s,
        ConnectionState::Error { message } if message.contains("timed out")
    )));

    client.close().await;
}

#[tokio::test]
async fn test_capacity_crossing_over_the_wire_notifies_once() {
    let server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();
    let mut states = client.subscribe_connection_state();
    let mut services = client.service_status_updates();
    let mut notifications = client.notifications();

    client.subscribe_to_service("s1").unwrap();
    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;

    server.send_message("u1", &service_status_body("s1", 7, 8, 10));
    server.send_message("u1", &service_status_body("s1", 9, 10, 10));

    assert_eq!(recv(&mut services).await.new_capacity, 8);
    assert_eq!(recv(&mut services).await.new_capacity, 10);
    let notification = recv(&mut notifications).await;
    assert_eq!(notification.kind, NotificationType::ServiceFull);
    assert_eq!(notification.subject_id, "s1");
    assert!(notifications.try_recv().is_err());

    client.close().await;
}

#[tokio::test]
async fn test_garbage_frames_do_not_break_the_connection() {
    let server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();
    let mut states = client.subscribe_connection_state();
    let mut children = client.child_status_updates();
    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;

    server.send_text("MESSAGE\ndestination:/x no separator here");
    server.send_text("\n");
    server.send_message("u1", &serde_json::json!({ "type": "EVENT_CREATED", "payload": {} }));
    server.send_message("u1", &child_status_body("c2", "REGISTERED", "CHECKED_IN", "s1"));

    assert_eq!(recv(&mut children).await.child_id, "c2");
    assert!(client.is_connected());

    client.close().await;
}

#[tokio::test]
async fn test_disconnect_says_goodbye_and_keeps_subscriptions() {
    let mut server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();
    let mut states = client.subscribe_connection_state();
    client.subscribe_to_child("c1").unwrap();
    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;

    client.disconnect().await;

    server.wait_for(commands::DISCONNECT).await;
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.subscriptions().len(), 1);

    // A later connect() resumes with the same subscriptions
    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;
    let replayed = server.wait_for(commands::SUBSCRIBE).await;
    assert_eq!(replayed.connection, 1);

    client.close().await;
}

#[tokio::test]
async fn test_inbound_silence_trips_watchdog_and_reconnects() {
    // The mock never sends heartbeats, so a connected session goes quiet
    let mut server = MockStompServer::start().await;
    let config = SyncConfig {
        heartbeat_timeout_ms: 200,
        ..fast_config(&server.base_url())
    };
    let client = CheckinSyncClient::new(config).unwrap();
    let mut states = client.subscribe_connection_state();
    client.subscribe_to_child("c1").unwrap();

    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;

    let seen = wait_for_state(&mut states, ConnectionState::is_connected).await;
    assert_eq!(
        seen.first(),
        Some(&ConnectionState::Error {
            message: "no inbound traffic for 200ms".to_string()
        })
    );
    assert!(seen.contains(&ConnectionState::Reconnecting {
        attempt: 1,
        max_attempts: 5
    }));
    assert_eq!(server.wait_for(commands::SUBSCRIBE).await.connection, 0);
    assert_eq!(server.wait_for(commands::SUBSCRIBE).await.connection, 1);

    client.close().await;
}

#[tokio::test]
async fn test_connected_client_sends_eol_heartbeats() {
    let server = MockStompServer::start().await;
    let config = SyncConfig {
        heartbeat_outgoing_ms: 50,
        ..fast_config(&server.base_url())
    };
    let client = CheckinSyncClient::new(config).unwrap();
    let mut states = client.subscribe_connection_state();

    client.connect("u1").await.unwrap();
    wait_for_state(&mut states, ConnectionState::is_connected).await;

    server.wait_for_heartbeats(3).await;
    assert!(client.is_connected());

    client.close().await;
}

#[tokio::test]
async fn test_refreshed_token_is_used_by_next_handshake() {
    let mut server = MockStompServer::start().await;
    let client = CheckinSyncClient::new(fast_config(&server.base_url())).unwrap();

    client.set_auth_token(Some("new".to_string()));
    client.connect("u1").await.unwrap();

    let connect = server.wait_for(commands::CONNECT).await.frame;
    assert_eq!(connect.get_header("Authorization"), Some("Bearer new"));

    client.close().await;
}
