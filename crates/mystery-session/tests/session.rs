//! Session and liveness monitor working together over an in-memory link.

use std::time::Duration;

use mystery_protocol::{ChatFields, Kind, Tag};
use mystery_session::{
    DisconnectCause, HealthState, LivenessConfig, LivenessMonitor, Session, SessionConfig,
    SessionError, SessionEvents,
};
use mystery_transport::{MemoryConnector, MemoryHandle, MemoryTransport, Outbound, TransportEvent};
use tokio::time::{self, Instant};

struct NoEvents;

impl SessionEvents for NoEvents {}

fn config() -> SessionConfig {
    SessionConfig {
        server: "irc.test".into(),
        port: 6667,
        channel: "#mo".into(),
        username: "ace".into(),
    }
}

async fn joined_session() -> (Session<MemoryTransport>, MemoryHandle) {
    let connector = MemoryConnector::new();
    let mut session = Session::connect(&connector, config()).await.unwrap();
    let handle = connector.handle().unwrap();
    handle.push_event(TransportEvent::Welcome);
    handle.push_event(TransportEvent::Join {
        nick: "ace".into(),
        channel: "#mo".into(),
    });
    session.process(&mut NoEvents).unwrap();
    handle.take_sent();
    (session, handle)
}

#[tokio::test]
async fn test_connect_unreachable_server_is_fatal() {
    let result = Session::connect(&MemoryConnector::refusing(), config()).await;
    assert!(matches!(result, Err(SessionError::ServerConnection(_))));
}

#[tokio::test]
async fn test_connect_then_welcome_joins_room() {
    let (session, _handle) = joined_session().await;
    assert!(session.is_connected());
    assert_eq!(session.username(), "ace");
}

#[test]
fn test_session_config_deserializes_with_defaults() {
    let config: SessionConfig = serde_json::from_str(r##"{"channel": "#other"}"##).unwrap();
    assert_eq!(config.channel, "#other");
    assert_eq!(config.port, 6667);
    assert_eq!(config.server, "localhost");
}

#[tokio::test]
async fn test_inbound_and_local_messages_share_one_fifo() {
    let (mut session, handle) = joined_session().await;
    let fields = ChatFields {
        location: "Hakuryou".into(),
        sublocation: "Main".into(),
        character: "Ace".into(),
        sprite_id: "1".into(),
        position: "center".into(),
        color_id: "0".into(),
        sprite_option: "0".into(),
    };

    handle.push_event(TransportEvent::RoomMessage {
        sender: "bob".into(),
        channel: "#mo".into(),
        text: "OOC#first".into(),
    });
    session.process(&mut NoEvents).unwrap();
    session.send_public(&fields, "second").unwrap();
    session.send_tagged(Tag::Roll, "1d20: 7").unwrap();

    let kinds: Vec<Kind> = std::iter::from_fn(|| session.next_message())
        .map(|env| env.kind())
        .collect();
    assert_eq!(kinds, vec![Kind::Ooc, Kind::Chat, Kind::Roll]);
}

#[tokio::test]
async fn test_private_message_of_500_chars() {
    let (mut session, handle) = joined_session().await;
    let text: String = "abcde".repeat(100);

    session.send_private("bob", "ace", &text).unwrap();

    let wire = handle.lines_to("bob");
    assert_eq!(wire[0].chars().count(), 482);
    assert!(wire[0].ends_with(".."));
    assert_eq!(&wire[0][..480], &text[..480]);
    assert_eq!(session.next_private_message().unwrap().body, text);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_ping_answered_by_pong() {
    let (mut session, handle) = joined_session().await;
    let mut monitor = LivenessMonitor::new(&LivenessConfig::default());
    monitor.start(Instant::now());

    time::advance(Duration::from_secs(15)).await;
    assert_eq!(monitor.poll(&mut session, Instant::now()), None);
    assert_eq!(handle.take_sent(), vec![Outbound::Ping("irc.test".into())]);
    assert_eq!(monitor.state(), HealthState::AwaitingPong);

    handle.push_event(TransportEvent::Pong {
        server: "irc.test".into(),
    });
    let report = session.process(&mut NoEvents).unwrap();
    if report.pong_received {
        monitor.on_pong();
    }
    assert_eq!(monitor.state(), HealthState::Connected);

    time::advance(Duration::from_secs(10)).await;
    assert_eq!(monitor.poll(&mut session, Instant::now()), None);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_silent_server_disconnects_once() {
    let (mut session, _handle) = joined_session().await;
    let mut monitor = LivenessMonitor::new(&LivenessConfig::default());
    monitor.start(Instant::now());

    time::advance(Duration::from_secs(15)).await;
    assert_eq!(monitor.poll(&mut session, Instant::now()), None);

    time::advance(Duration::from_secs(10)).await;
    let lost = monitor.poll(&mut session, Instant::now());
    assert_eq!(lost.map(|d| d.cause), Some(DisconnectCause::PongTimeout));

    time::advance(Duration::from_secs(60)).await;
    assert_eq!(monitor.poll(&mut session, Instant::now()), None);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_on_dropped_link_disconnects() {
    let (mut session, handle) = joined_session().await;
    let mut monitor = LivenessMonitor::new(&LivenessConfig::default());
    monitor.start(Instant::now());
    handle.set_open(false);
    assert!(!session.is_connected());

    time::advance(Duration::from_secs(15)).await;
    let lost = monitor.poll(&mut session, Instant::now());

    assert_eq!(lost.map(|d| d.cause), Some(DisconnectCause::SendFailed));
    assert!(handle.sent().is_empty());
}
