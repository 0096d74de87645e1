//! `Client` builder and tick loop.
//!
//! The client ties the layers together: transport → session → liveness
//! monitor → dispatch router → presenter. It is single-owner and driven
//! from one task; only the transport's socket I/O runs elsewhere.

use mystery_protocol::{ChatFields, ItemPayload, MusicCommand, Roster, Tag};
use mystery_session::{
    HealthState, LivenessConfig, LivenessMonitor, Session, SessionConfig, SessionError,
    SessionEvents,
};
use mystery_tick::{TickConfig, TickScheduler};
#[cfg(feature = "irc")]
use mystery_transport::{IrcConnector, IrcTransport};
use mystery_transport::{ChatTransport, Connector};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::router::{DispatchRouter, Presenter, RouterStats};
use crate::MysteryError;

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Everything needed to start a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub session: SessionConfig,
    pub liveness: LivenessConfig,
    pub tick: TickConfig,
}

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and connecting a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use mystery::prelude::*;
///
/// let mut client = ClientBuilder::new()
///     .server("irc.example.net")
///     .channel("#mystery-online")
///     .username("Ace")
///     .connect(my_presenter)
///     .await?;
/// client.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn server(mut self, server: &str) -> Self {
        self.config.session.server = server.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.session.port = port;
        self
    }

    /// Sets the room to join. Must be a channel name such as `#mo`.
    pub fn channel(mut self, channel: &str) -> Self {
        self.config.session.channel = channel.to_string();
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.config.session.username = username.to_string();
        self
    }

    pub fn liveness(mut self, liveness: LivenessConfig) -> Self {
        self.config.liveness = liveness;
        self
    }

    pub fn tick(mut self, tick: TickConfig) -> Self {
        self.config.tick = tick;
        self
    }

    /// Connects over IRC.
    ///
    /// # Errors
    /// Fails if the server cannot be reached.
    #[cfg(feature = "irc")]
    pub async fn connect<P: Presenter>(
        self,
        presenter: P,
    ) -> Result<Client<IrcTransport, P>, MysteryError> {
        self.connect_with(&IrcConnector, presenter).await
    }

    /// Connects through any [`Connector`].
    pub async fn connect_with<C, P>(
        self,
        connector: &C,
        presenter: P,
    ) -> Result<Client<C::Transport, P>, MysteryError>
    where
        C: Connector,
        P: Presenter,
    {
        let session = Session::connect(connector, self.config.session).await?;
        Ok(Client::new(
            session,
            &self.config.liveness,
            self.config.tick,
            presenter,
        ))
    }

    /// Builds a client over an already connected transport.
    pub fn with_transport<T, P>(self, transport: T, presenter: P) -> Client<T, P>
    where
        T: ChatTransport,
        P: Presenter,
    {
        let session = Session::new(transport, self.config.session);
        Client::new(session, &self.config.liveness, self.config.tick, presenter)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A connected chat client.
///
/// Call [`pump`](Self::pump) once per tick, or [`run`](Self::run) to let
/// the client drive itself at the configured tick rate.
pub struct Client<T: ChatTransport, P: Presenter> {
    session: Session<T>,
    monitor: LivenessMonitor,
    router: DispatchRouter,
    presenter: P,
    tick: TickConfig,
    /// The `now` of the latest pump. Outbound activity is stamped with it.
    last_tick: Instant,
}

impl<T: ChatTransport, P: Presenter> Client<T, P> {
    fn new(
        session: Session<T>,
        liveness: &LivenessConfig,
        tick: TickConfig,
        presenter: P,
    ) -> Self {
        let started = Instant::now();
        let mut monitor = LivenessMonitor::new(liveness);
        monitor.start(started);
        tracing::info!(
            username = %session.username(),
            channel = %session.config().channel,
            "client started"
        );
        Self {
            session,
            monitor,
            router: DispatchRouter::new(),
            presenter,
            tick,
            last_tick: started,
        }
    }

    /// Runs one high-frequency tick at `now`: handles buffered transport
    /// events, advances the liveness monitor and dispatches queued
    /// messages.
    ///
    /// Does nothing once the client is disconnected.
    ///
    /// # Errors
    /// Returns fatal session errors: the configured room is not a channel,
    /// or the nickname is taken and the presenter offered no alternative.
    pub fn pump(&mut self, now: Instant) -> Result<(), MysteryError> {
        self.last_tick = now;
        if self.is_disconnected() {
            return Ok(());
        }

        let mut events = EventTap {
            presenter: &mut self.presenter,
            joined: false,
            pong: false,
        };
        let processed = self.session.process(&mut events);
        let EventTap { joined, pong, .. } = events;

        // Applied even when the batch ended in an error.
        if pong {
            self.monitor.on_pong();
        }
        if joined {
            self.announce_current_presence();
        }
        match processed {
            Ok(_) => {}
            Err(e) if e.is_link_down() => {
                self.link_lost();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(lost) = self.monitor.poll(&mut self.session, now) {
            self.presenter.on_connection_lost(lost.cause);
            return Ok(());
        }

        self.router
            .tick(&mut self.session, &mut self.monitor, &mut self.presenter, now);
        Ok(())
    }

    /// Pumps the client at the configured tick rate until it disconnects.
    ///
    /// # Errors
    /// Returns the first fatal error from [`pump`](Self::pump).
    pub async fn run(&mut self) -> Result<(), MysteryError> {
        let mut scheduler = TickScheduler::new(self.tick.clone());
        while !self.is_disconnected() {
            let tick = scheduler.wait_for_tick().await;
            self.pump(tick.now)?;
            scheduler.record_tick_end();
        }
        tracing::info!(ticks = scheduler.tick_count(), "client loop stopped");
        Ok(())
    }

    /// Stops the keepalive timers, then leaves the network. The presenter
    /// is not told about a lost connection.
    pub fn shutdown(&mut self, reason: &str) {
        self.monitor.shutdown();
        self.session.close(reason);
        tracing::info!(%reason, "client shut down");
    }

    /// Like [`shutdown`](Self::shutdown), then waits for the goodbye to
    /// reach the network. Use this before dropping the client.
    pub async fn disconnect(&mut self, reason: &str) {
        if !self.is_disconnected() {
            self.shutdown(reason);
        }
        self.session.flush().await;
    }

    // -- Outbound ---------------------------------------------------------

    /// Says something in character. Restarts the keepalive interval from
    /// the latest tick.
    pub fn send_chat(&mut self, fields: &ChatFields, text: &str) {
        let result = self.session.send_public(fields, text);
        self.check_send(result);
        self.monitor.reschedule(self.last_tick);
    }

    /// Shows a chat line locally without sending it.
    pub fn send_local(&mut self, username: &str, fields: &ChatFields, text: &str) {
        self.session.send_local(username, fields, text);
    }

    pub fn send_ooc(&mut self, text: &str) {
        self.send_tagged(Tag::Ooc, text);
    }

    pub fn send_char(&mut self, character: &str) {
        self.send_tagged(Tag::Char, character);
    }

    pub fn send_loc(&mut self, location: &str) {
        self.send_tagged(Tag::Loc, location);
    }

    /// Tells the room to play the track at `url`.
    pub fn send_music(&mut self, url: &str) {
        let command = MusicCommand::Play(url.to_string());
        self.send_tagged(Tag::Music, command.to_payload());
    }

    pub fn send_music_stop(&mut self) {
        self.send_tagged(Tag::Music, MusicCommand::Stop.to_payload());
    }

    pub fn send_roll(&mut self, result: &str) {
        self.send_tagged(Tag::Roll, result);
    }

    pub fn send_item(&mut self, item: &ItemPayload) {
        self.send_tagged(Tag::Item, &item.to_payload());
    }

    pub fn send_clear(&mut self) {
        self.send_tagged(Tag::Clear, "");
    }

    /// Sends a direct message from the local user.
    pub fn send_private(&mut self, receiver: &str, text: &str) {
        let sender = self.session.username().to_string();
        let result = self.session.send_private(receiver, &sender, text);
        self.check_send(result);
    }

    pub fn send_mode(&mut self, target: &str, mode: &str) {
        let result = self.session.send_mode(target, mode);
        self.check_send(result);
    }

    /// Broadcasts our location and, if set, our character.
    pub fn announce_presence(&mut self, location: &str, character: Option<&str>) {
        self.send_loc(location);
        if let Some(character) = character {
            self.send_char(character);
        }
    }

    // -- Accessors --------------------------------------------------------

    /// `true` once the link was lost or the client was shut down.
    pub fn is_disconnected(&self) -> bool {
        self.monitor.state() == HealthState::Disconnected
    }

    pub fn health(&self) -> HealthState {
        self.monitor.state()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    // -- Internals --------------------------------------------------------

    fn send_tagged(&mut self, tag: Tag, payload: &str) {
        let result = self.session.send_tagged(tag, payload);
        self.check_send(result);
    }

    fn check_send(&mut self, result: Result<(), SessionError>) {
        if let Err(e) = result {
            tracing::debug!(error = %e, "send failed");
            self.link_lost();
        }
    }

    fn link_lost(&mut self) {
        if let Some(lost) = self.monitor.on_send_failure() {
            self.presenter.on_connection_lost(lost.cause);
        }
    }

    fn announce_current_presence(&mut self) {
        if let Some(presence) = self.presenter.current_presence() {
            self.announce_presence(&presence.location, presence.character.as_deref());
        }
    }
}

/// Forwards session events to the presenter and remembers joins and pongs,
/// so the client can act on them after the batch, even a failed one.
struct EventTap<'a, P: ?Sized> {
    presenter: &'a mut P,
    joined: bool,
    pong: bool,
}

impl<P: Presenter + ?Sized> SessionEvents for EventTap<'_, P> {
    fn on_join(&mut self, username: &str) {
        self.joined = true;
        self.presenter.on_join(username);
    }

    fn on_quit(&mut self, username: &str) {
        self.presenter.on_quit(username);
    }

    fn on_roster(&mut self, roster: Roster) {
        self.presenter.on_roster(roster);
    }

    fn on_nickname_conflict(&mut self, nickname: &str) -> Option<String> {
        self.presenter.on_nickname_conflict(nickname)
    }

    fn on_pong(&mut self) {
        self.pong = true;
        self.presenter.on_pong();
    }
}
