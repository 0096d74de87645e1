//! The chat session: one transport connection and the two message queues.
//!
//! A [`Session`] translates transport events into queue state or handler
//! calls, and turns outbound messages into wire lines. It never blocks:
//! [`Session::process`] handles whatever the transport has buffered and
//! returns.

use mystery_protocol::{
    ChatFields, DEFAULT_SENDER, Envelope, PrivateEnvelope, Roster, Tag, normalize_line_breaks,
    truncate_private,
};
use mystery_transport::{ChatTransport, Connector, TransportEvent, is_channel};
use serde::{Deserialize, Serialize};

use crate::{KeepaliveLink, MessageQueue, PrivateMessageQueue, SessionError};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Where to connect and who to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chat server host name.
    pub server: String,
    /// Chat server port.
    pub port: u16,
    /// The room every public message goes to. Must be a channel name.
    pub channel: String,
    /// Nickname to register with.
    pub username: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 6667,
            channel: "#mystery-online".to_string(),
            username: "Guest".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionEvents
// ---------------------------------------------------------------------------

/// Callbacks for transport events that are not queued messages.
///
/// Passed to [`Session::process`] on every call rather than stored, so the
/// session holds no reference into the layer above it.
pub trait SessionEvents {
    /// Another user joined the room.
    fn on_join(&mut self, _username: &str) {}

    /// A user left the network.
    fn on_quit(&mut self, _username: &str) {}

    /// The server listed the room's members (the local user excluded).
    fn on_roster(&mut self, _roster: Roster) {}

    /// `nickname` is taken. Return an alternative to retry with it, or
    /// `None` to give up with [`SessionError::NicknameConflict`].
    fn on_nickname_conflict(&mut self, _nickname: &str) -> Option<String> {
        None
    }

    /// The server answered a keepalive ping.
    fn on_pong(&mut self) {}
}

/// What a call to [`Session::process`] observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Transport events handled.
    pub events: usize,
    /// Room and private messages queued.
    pub queued: usize,
    /// At least one pong arrived.
    pub pong_received: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connection to the chat server plus the message queues it feeds.
pub struct Session<T: ChatTransport> {
    transport: T,
    config: SessionConfig,
    messages: MessageQueue,
    private_messages: PrivateMessageQueue,
    joined: bool,
}

impl<T: ChatTransport> Session<T> {
    /// Connects through `connector` and creates the session.
    ///
    /// # Errors
    /// [`SessionError::ServerConnection`] if the server is unreachable.
    pub async fn connect<C>(connector: &C, config: SessionConfig) -> Result<Self, SessionError>
    where
        C: Connector<Transport = T>,
    {
        let transport = connector
            .connect(&config.server, config.port, &config.username)
            .await
            .map_err(|e| {
                tracing::warn!(server = %config.server, error = %e, "could not connect to server");
                SessionError::ServerConnection(e)
            })?;
        Ok(Self::new(transport, config))
    }

    /// Creates a session over an already connected transport.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            messages: MessageQueue::new(),
            private_messages: PrivateMessageQueue::new(),
            joined: false,
        }
    }

    // -- Inbound ----------------------------------------------------------

    /// Handles every event the transport currently has buffered.
    ///
    /// Draining stops at the first error. Events handled before it have
    /// already reached `events`, so callers that need to see pongs or joins
    /// from a failed batch should record them there rather than rely on the
    /// returned [`ProcessReport`].
    ///
    /// # Errors
    /// - [`SessionError::ChannelConnection`] if the configured room is not
    ///   a channel (fatal).
    /// - [`SessionError::NicknameConflict`] if the nickname is taken and
    ///   `events` offered no alternative.
    /// - [`SessionError::NotConnected`] if a reply could not be sent.
    pub fn process<E>(&mut self, events: &mut E) -> Result<ProcessReport, SessionError>
    where
        E: SessionEvents + ?Sized,
    {
        let mut report = ProcessReport::default();
        while let Some(event) = self.transport.poll_event() {
            report.events += 1;
            match event {
                TransportEvent::Welcome => self.join_room()?,
                TransportEvent::Join { nick, channel } => {
                    if nick == self.transport.nickname() {
                        tracing::info!(%channel, "joined room");
                        self.joined = true;
                    } else {
                        tracing::debug!(%nick, %channel, "user joined");
                        events.on_join(&nick);
                    }
                }
                TransportEvent::Quit { nick, reason } => {
                    tracing::debug!(%nick, %reason, "user quit");
                    events.on_quit(&nick);
                }
                TransportEvent::RoomMessage { sender, text, .. } => {
                    tracing::trace!(%sender, %text, "room message");
                    self.messages.enqueue(text, sender);
                    report.queued += 1;
                }
                TransportEvent::PrivateMessage { sender, text } => {
                    tracing::trace!(%sender, "private message");
                    let receiver = self.transport.nickname().to_string();
                    self.private_messages.enqueue(text, sender, receiver);
                    report.queued += 1;
                }
                TransportEvent::Roster { members, .. } => {
                    let roster = Roster::parse(&members, self.transport.nickname());
                    events.on_roster(roster);
                }
                TransportEvent::Notice { sender, text } => {
                    tracing::info!(%sender, "notice: {text}");
                }
                TransportEvent::NicknameInUse { nick } => {
                    tracing::warn!(%nick, "nickname in use");
                    match events.on_nickname_conflict(&nick) {
                        Some(alternative) => self.change_username(&alternative)?,
                        None => return Err(SessionError::NicknameConflict(nick)),
                    }
                }
                TransportEvent::Pong { .. } => {
                    report.pong_received = true;
                    events.on_pong();
                }
            }
        }
        Ok(report)
    }

    fn join_room(&mut self) -> Result<(), SessionError> {
        if !is_channel(&self.config.channel) {
            tracing::error!(channel = %self.config.channel, "configured room is not a channel");
            return Err(SessionError::ChannelConnection(self.config.channel.clone()));
        }
        self.transport.join_channel(&self.config.channel)?;
        Ok(())
    }

    /// Registers under a different nickname.
    pub fn change_username(&mut self, username: &str) -> Result<(), SessionError> {
        self.transport.change_nick(username)?;
        tracing::info!(%username, "retrying with new nickname");
        self.config.username = username.to_string();
        Ok(())
    }

    /// Removes the oldest room message.
    pub fn next_message(&mut self) -> Option<Envelope> {
        self.messages.dequeue()
    }

    /// Returns a message so it is the next one [`next_message`](Self::next_message) yields.
    pub fn put_back_message(&mut self, envelope: Envelope) {
        self.messages.put_back(envelope);
    }

    /// Removes the oldest direct message.
    pub fn next_private_message(&mut self) -> Option<PrivateEnvelope> {
        self.private_messages.dequeue()
    }

    /// Room messages waiting for dispatch.
    pub fn pending_messages(&self) -> usize {
        self.messages.len()
    }

    /// Direct messages waiting for dispatch.
    pub fn pending_private_messages(&self) -> usize {
        self.private_messages.len()
    }

    // -- Outbound ---------------------------------------------------------

    /// Sends a chat line to the room.
    ///
    /// A copy attributed to [`DEFAULT_SENDER`] is queued first so the local
    /// user sees their message exactly like a remote one.
    pub fn send_public(&mut self, fields: &ChatFields, text: &str) -> Result<(), SessionError> {
        let envelope = Envelope::chat(fields, text, DEFAULT_SENDER);
        let line = envelope.body().to_string();
        self.messages.push(envelope);
        self.transport.send_line(&self.config.channel, &line)?;
        Ok(())
    }

    /// Queues a chat line attributed to `username` without sending it.
    pub fn send_local(&mut self, username: &str, fields: &ChatFields, text: &str) {
        self.messages.push(Envelope::chat(fields, text, username));
    }

    /// Sends a direct message.
    ///
    /// The queued copy keeps the full text; the transmitted copy is cut
    /// to the private line limit.
    pub fn send_private(
        &mut self,
        receiver: &str,
        sender: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        self.private_messages.enqueue(text, sender, receiver);
        let line = normalize_line_breaks(text);
        let line = truncate_private(&line);
        self.transport.send_line(receiver, &line)?;
        Ok(())
    }

    /// Sends a tagged line to the room, mirroring it into the local queue
    /// for the tags that need it (see [`Tag::mirrors_locally`]).
    pub fn send_tagged(&mut self, tag: Tag, payload: &str) -> Result<(), SessionError> {
        let envelope = Envelope::tagged(tag, payload, DEFAULT_SENDER);
        self.transport.send_line(&self.config.channel, envelope.body())?;
        if tag.mirrors_locally() {
            self.messages.push(envelope);
        }
        Ok(())
    }

    /// Sets a mode on a channel or user.
    pub fn send_mode(&mut self, target: &str, mode: &str) -> Result<(), SessionError> {
        self.transport.set_mode(target, mode)?;
        Ok(())
    }

    /// Pings the configured server.
    pub fn send_ping(&mut self) -> Result<(), SessionError> {
        self.transport.ping(&self.config.server)?;
        Ok(())
    }

    /// Leaves the network. The session is unusable afterwards.
    pub fn close(&mut self, reason: &str) {
        if let Err(e) = self.transport.quit(reason) {
            tracing::debug!(error = %e, "quit failed; link already down");
        }
        self.joined = false;
    }

    /// Waits until lines already handed to the transport are on the wire.
    pub async fn flush(&mut self) {
        self.transport.flush().await;
    }

    // -- Accessors --------------------------------------------------------

    /// `true` once our own join was seen and while the link is up.
    pub fn is_connected(&self) -> bool {
        self.joined && self.transport.is_open()
    }

    /// The nickname currently in use.
    pub fn username(&self) -> &str {
        self.transport.nickname()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: ChatTransport> KeepaliveLink for Session<T> {
    fn send_ping(&mut self) -> Result<(), SessionError> {
        Session::send_ping(self)
    }
}

#[cfg(test)]
mod tests {
    use mystery_protocol::Kind;
    use mystery_transport::{MemoryHandle, MemoryTransport, Outbound};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        joins: Vec<String>,
        quits: Vec<String>,
        rosters: Vec<Roster>,
        alternative: Option<String>,
        pongs: usize,
    }

    impl SessionEvents for Recorder {
        fn on_join(&mut self, username: &str) {
            self.joins.push(username.to_string());
        }
        fn on_quit(&mut self, username: &str) {
            self.quits.push(username.to_string());
        }
        fn on_roster(&mut self, roster: Roster) {
            self.rosters.push(roster);
        }
        fn on_nickname_conflict(&mut self, _nickname: &str) -> Option<String> {
            self.alternative.take()
        }
        fn on_pong(&mut self) {
            self.pongs += 1;
        }
    }

    fn session() -> (Session<MemoryTransport>, MemoryHandle) {
        let (transport, handle) = MemoryTransport::new("me");
        let config = SessionConfig {
            server: "srv".into(),
            channel: "#mo".into(),
            username: "me".into(),
            ..SessionConfig::default()
        };
        (Session::new(transport, config), handle)
    }

    fn fields() -> ChatFields {
        ChatFields {
            location: "Hakuryou".into(),
            sublocation: "Main".into(),
            character: "Ace".into(),
            sprite_id: "1".into(),
            position: "center".into(),
            color_id: "0".into(),
            sprite_option: "0".into(),
        }
    }

    // =====================================================================
    // process()
    // =====================================================================

    #[test]
    fn test_process_welcome_joins_configured_channel() {
        let (mut session, handle) = session();
        handle.push_event(TransportEvent::Welcome);

        session.process(&mut Recorder::default()).unwrap();

        assert_eq!(handle.sent(), vec![Outbound::Join("#mo".into())]);
        assert!(!session.is_connected(), "not connected until our join echoes");
    }

    #[test]
    fn test_process_welcome_with_non_channel_is_fatal() {
        let (transport, handle) = MemoryTransport::new("me");
        let config = SessionConfig {
            channel: "mo".into(),
            ..SessionConfig::default()
        };
        let mut session = Session::new(transport, config);
        handle.push_event(TransportEvent::Welcome);

        let err = session.process(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, SessionError::ChannelConnection(c) if c == "mo"));
    }

    #[test]
    fn test_process_own_join_marks_connected_without_handler() {
        let (mut session, handle) = session();
        let mut events = Recorder::default();
        handle.push_event(TransportEvent::Join {
            nick: "me".into(),
            channel: "#mo".into(),
        });

        session.process(&mut events).unwrap();

        assert!(session.is_connected());
        assert!(events.joins.is_empty());
    }

    #[test]
    fn test_process_other_join_and_quit_invoke_handlers() {
        let (mut session, handle) = session();
        let mut events = Recorder::default();
        handle.push_event(TransportEvent::Join {
            nick: "ann".into(),
            channel: "#mo".into(),
        });
        handle.push_event(TransportEvent::Quit {
            nick: "ann".into(),
            reason: "bye".into(),
        });

        let report = session.process(&mut events).unwrap();

        assert_eq!(report.events, 2);
        assert_eq!(events.joins, vec!["ann"]);
        assert_eq!(events.quits, vec!["ann"]);
    }

    #[test]
    fn test_process_room_message_is_queued_with_sender() {
        let (mut session, handle) = session();
        handle.push_event(TransportEvent::RoomMessage {
            sender: "ann".into(),
            channel: "#mo".into(),
            text: "r#1d20: 20".into(),
        });

        let report = session.process(&mut Recorder::default()).unwrap();

        assert_eq!(report.queued, 1);
        let env = session.next_message().unwrap();
        assert_eq!(env.sender(), "ann");
        assert_eq!(env.kind(), Kind::Roll);
        assert_eq!(session.next_message(), None);
    }

    #[test]
    fn test_process_private_message_is_queued_privately() {
        let (mut session, handle) = session();
        handle.push_event(TransportEvent::PrivateMessage {
            sender: "ann".into(),
            text: "psst".into(),
        });

        session.process(&mut Recorder::default()).unwrap();

        assert_eq!(session.pending_messages(), 0);
        let pm = session.next_private_message().unwrap();
        assert_eq!(pm, PrivateEnvelope::new("psst", "ann", "me"));
    }

    #[test]
    fn test_process_roster_excludes_self() {
        let (mut session, handle) = session();
        let mut events = Recorder::default();
        handle.push_event(TransportEvent::Roster {
            channel: "#mo".into(),
            members: "@me ann bob".into(),
        });

        session.process(&mut events).unwrap();

        assert_eq!(events.rosters[0].members, vec!["ann", "bob"]);
    }

    #[test]
    fn test_process_nickname_conflict_retries_with_alternative() {
        let (mut session, handle) = session();
        let mut events = Recorder {
            alternative: Some("me_".into()),
            ..Recorder::default()
        };
        handle.push_event(TransportEvent::NicknameInUse { nick: "me".into() });

        session.process(&mut events).unwrap();

        assert_eq!(handle.sent(), vec![Outbound::Nick("me_".into())]);
        assert_eq!(session.username(), "me_");
        assert_eq!(session.config().username, "me_");
    }

    #[test]
    fn test_process_nickname_conflict_without_alternative_errors() {
        let (mut session, handle) = session();
        handle.push_event(TransportEvent::NicknameInUse { nick: "me".into() });

        let err = session.process(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, SessionError::NicknameConflict(n) if n == "me"));
    }

    #[test]
    fn test_process_pong_before_error_still_reaches_handler() {
        let (mut session, handle) = session();
        let mut events = Recorder::default();
        handle.push_event(TransportEvent::Pong { server: "srv".into() });
        handle.push_event(TransportEvent::NicknameInUse { nick: "me".into() });
        handle.push_event(TransportEvent::Pong { server: "srv".into() });

        let err = session.process(&mut events).unwrap_err();

        assert!(matches!(err, SessionError::NicknameConflict(_)));
        assert_eq!(events.pongs, 1, "draining stops at the error");
    }

    #[test]
    fn test_process_pong_and_notice() {
        let (mut session, handle) = session();
        handle.push_event(TransportEvent::Notice {
            sender: "srv".into(),
            text: "Looking up your hostname".into(),
        });
        handle.push_event(TransportEvent::Pong { server: "srv".into() });

        let report = session.process(&mut Recorder::default()).unwrap();

        assert!(report.pong_received);
        assert_eq!(report.queued, 0);
    }

    #[test]
    fn test_process_with_nothing_buffered_is_empty_report() {
        let (mut session, _handle) = session();
        let report = session.process(&mut Recorder::default()).unwrap();
        assert_eq!(report, ProcessReport::default());
    }

    // =====================================================================
    // sends
    // =====================================================================

    #[test]
    fn test_send_public_queues_local_copy_and_transmits() {
        let (mut session, handle) = session();

        session.send_public(&fields(), "Hello#World").unwrap();

        assert_eq!(
            handle.lines_to("#mo"),
            vec!["Hakuryou#Main#Ace#1#center#0#0#Hello#World"]
        );
        let env = session.next_message().unwrap();
        assert!(env.is_local());
        assert_eq!(env.body(), "Hakuryou#Main#Ace#1#center#0#0#Hello#World");
    }

    #[test]
    fn test_send_public_link_down_still_queues_locally() {
        let (mut session, handle) = session();
        handle.set_open(false);

        let err = session.send_public(&fields(), "hi").unwrap_err();

        assert!(err.is_link_down());
        assert_eq!(session.pending_messages(), 1);
    }

    #[test]
    fn test_send_local_never_transmits() {
        let (mut session, handle) = session();

        session.send_local("System", &fields(), "Welcome!");

        assert!(handle.sent().is_empty());
        let env = session.next_message().unwrap();
        assert_eq!(env.sender(), "System");
        assert_eq!(env.decode_chat().unwrap().text, "Welcome!");
    }

    #[test]
    fn test_send_private_truncates_wire_copy_only() {
        let (mut session, handle) = session();
        let text = "x".repeat(500);

        session.send_private("ann", "me", &text).unwrap();

        let sent = handle.lines_to("ann");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], format!("{}..", "x".repeat(480)));
        let queued = session.next_private_message().unwrap();
        assert_eq!(queued.body.len(), 500);
        assert_eq!(queued.receiver, "ann");
        assert_eq!(queued.sender, "me");
    }

    #[test]
    fn test_send_private_strips_line_breaks_on_wire() {
        let (mut session, handle) = session();
        session.send_private("ann", "me", "a\nb").unwrap();
        assert_eq!(handle.lines_to("ann"), vec!["a b"]);
    }

    #[test]
    fn test_send_tagged_mirrors_log_kinds() {
        let (mut session, handle) = session();

        session.send_tagged(Tag::Roll, "3d6: 14").unwrap();
        session.send_tagged(Tag::Ooc, "brb").unwrap();
        session.send_tagged(Tag::Item, "Key#key#Opens#key.png").unwrap();
        session.send_tagged(Tag::Clear, "").unwrap();

        assert_eq!(
            handle.lines_to("#mo"),
            vec!["r#3d6: 14", "OOC#brb", "i#Key#key#Opens#key.png", "cl#"]
        );
        assert_eq!(session.pending_messages(), 4);
        let first = session.next_message().unwrap();
        assert!(first.is_local());
        assert_eq!(first.kind(), Kind::Roll);
    }

    #[test]
    fn test_send_tagged_does_not_mirror_state_kinds() {
        let (mut session, handle) = session();

        session.send_tagged(Tag::Char, "Ace").unwrap();
        session.send_tagged(Tag::Loc, "Hakuryou").unwrap();
        session.send_tagged(Tag::Music, "stop").unwrap();

        assert_eq!(handle.lines_to("#mo"), vec!["c#Ace", "l#Hakuryou", "m#stop"]);
        assert_eq!(session.pending_messages(), 0);
    }

    #[test]
    fn test_send_tagged_failure_does_not_mirror() {
        let (mut session, handle) = session();
        handle.set_open(false);

        assert!(session.send_tagged(Tag::Roll, "1d6: 3").is_err());
        assert_eq!(session.pending_messages(), 0);
    }

    #[test]
    fn test_send_mode_and_ping() {
        let (mut session, handle) = session();

        session.send_mode("me", "+i").unwrap();
        session.send_ping().unwrap();

        assert_eq!(
            handle.sent(),
            vec![
                Outbound::Mode {
                    target: "me".into(),
                    mode: "+i".into()
                },
                Outbound::Ping("srv".into()),
            ]
        );
    }

    #[test]
    fn test_close_quits_and_disconnects() {
        let (mut session, handle) = session();
        handle.push_event(TransportEvent::Join {
            nick: "me".into(),
            channel: "#mo".into(),
        });
        session.process(&mut Recorder::default()).unwrap();
        assert!(session.is_connected());

        session.close("bye");

        assert!(!session.is_connected());
        assert_eq!(handle.sent().last(), Some(&Outbound::Quit("bye".into())));
    }

    #[test]
    fn test_put_back_message_is_next() {
        let (mut session, _handle) = session();
        session.send_local("a", &fields(), "one");
        session.send_local("b", &fields(), "two");

        let first = session.next_message().unwrap();
        session.put_back_message(first);

        assert_eq!(session.next_message().unwrap().sender(), "a");
        assert_eq!(session.next_message().unwrap().sender(), "b");
    }
}
