//! Message dispatch: from the session's queues to the presentation layer.
//!
//! On every tick the [`DispatchRouter`] takes at most one room message and
//! at most one direct message, works out what kind of message it is, and
//! calls exactly one [`Presenter`] method for it. Chat lines are held back
//! while the presenter is still displaying the previous one.

use mystery_protocol::{
    ChatMessage, Envelope, ItemPayload, Kind, MusicCommand, PrivateEnvelope, ProtocolError, Tag,
    TaggedMessage,
};
use mystery_session::{DisconnectCause, LivenessMonitor, Session, SessionEvents};
use mystery_transport::ChatTransport;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

/// Where the local user is and who they are playing, re-announced to the
/// room whenever someone joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub location: String,
    pub character: Option<String>,
}

/// The presentation layer: everything the client shows to the user.
///
/// Handlers receive decoded messages; the router never interprets them
/// beyond their kind. The [`SessionEvents`] supertrait covers joins,
/// quits, rosters and nickname conflicts.
pub trait Presenter: SessionEvents {
    /// `true` while a chat line is still being displayed. Further chat
    /// lines wait in the queue until this returns `false`.
    fn is_busy_displaying(&self) -> bool {
        false
    }

    /// A chat line. `message.is_local()` tells our own lines apart.
    fn on_chat(&mut self, message: ChatMessage);

    /// `sender` switched to `character`.
    fn on_char(&mut self, character: &str, sender: &str);

    /// `sender` moved to `location`.
    fn on_loc(&mut self, location: &str, sender: &str);

    fn on_ooc(&mut self, text: &str, sender: &str);

    fn on_music(&mut self, command: MusicCommand, sender: &str);

    fn on_roll(&mut self, result: &str, sender: &str);

    fn on_item(&mut self, item: ItemPayload, sender: &str);

    /// Clear the text box.
    fn on_clear(&mut self);

    fn on_private_message(&mut self, message: PrivateEnvelope);

    /// The link is gone. Called at most once per client.
    fn on_connection_lost(&mut self, _cause: DisconnectCause) {}

    /// Our presence, if it should be re-announced when users join.
    fn current_presence(&self) -> Option<Presence> {
        None
    }
}

// ---------------------------------------------------------------------------
// DispatchRouter
// ---------------------------------------------------------------------------

/// Running totals of what the router did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Room messages handed to the presenter.
    pub dispatched: u64,
    /// Direct messages handed to the presenter.
    pub private_dispatched: u64,
    /// Chat lines put back because the presenter was busy.
    pub deferred: u64,
    /// Lines of no known kind.
    pub dropped_unknown: u64,
    /// Lines whose payload could not be decoded.
    pub dropped_malformed: u64,
}

/// Moves messages from a [`Session`] to a [`Presenter`], one per tick.
#[derive(Debug, Default)]
pub struct DispatchRouter {
    stats: RouterStats,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one dispatch step and returns how many presenter handlers
    /// were called (0, 1 or 2).
    ///
    /// A chat line from a remote sender restarts the keepalive interval
    /// on `monitor`, since it proves the link is alive.
    pub fn tick<T, P>(
        &mut self,
        session: &mut Session<T>,
        monitor: &mut LivenessMonitor,
        presenter: &mut P,
        now: Instant,
    ) -> usize
    where
        T: ChatTransport,
        P: Presenter + ?Sized,
    {
        let mut handled = 0;

        if let Some(envelope) = session.next_message() {
            if envelope.kind() == Kind::Chat && presenter.is_busy_displaying() {
                tracing::trace!("presenter busy; chat line deferred");
                self.stats.deferred += 1;
                session.put_back_message(envelope);
            } else if self.dispatch(envelope, monitor, presenter, now) {
                self.stats.dispatched += 1;
                handled += 1;
            }
        }

        if let Some(message) = session.next_private_message() {
            tracing::trace!(sender = %message.sender, "direct message dispatched");
            presenter.on_private_message(message);
            self.stats.private_dispatched += 1;
            handled += 1;
        }

        handled
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    fn dispatch<P>(
        &mut self,
        envelope: Envelope,
        monitor: &mut LivenessMonitor,
        presenter: &mut P,
        now: Instant,
    ) -> bool
    where
        P: Presenter + ?Sized,
    {
        let kind = envelope.kind();
        if kind == Kind::Chat {
            return match envelope.decode_chat() {
                Ok(message) => {
                    if !message.is_local() {
                        monitor.reschedule(now);
                    }
                    presenter.on_chat(message);
                    true
                }
                Err(e) => self.drop_malformed(&envelope, &e),
            };
        }

        let Some(tag) = kind.tag() else {
            tracing::trace!(sender = %envelope.sender(), "dropping line of unknown kind");
            self.stats.dropped_unknown += 1;
            return false;
        };

        let TaggedMessage { payload, sender } = match envelope.decode_tagged() {
            Ok(message) => message,
            Err(e) => return self.drop_malformed(&envelope, &e),
        };

        match tag {
            Tag::Char => presenter.on_char(&payload, &sender),
            Tag::Loc => presenter.on_loc(&payload, &sender),
            Tag::Ooc => presenter.on_ooc(&payload, &sender),
            Tag::Music => presenter.on_music(MusicCommand::from_payload(&payload), &sender),
            Tag::Roll => presenter.on_roll(&payload, &sender),
            Tag::Item => match ItemPayload::parse(&payload) {
                Ok(item) => presenter.on_item(item, &sender),
                Err(e) => return self.drop_malformed(&envelope, &e),
            },
            Tag::Clear => presenter.on_clear(),
        }
        true
    }

    fn drop_malformed(&mut self, envelope: &Envelope, error: &ProtocolError) -> bool {
        tracing::warn!(sender = %envelope.sender(), %error, "dropping malformed line");
        self.stats.dropped_malformed += 1;
        false
    }
}
