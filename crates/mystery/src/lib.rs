//! # Mystery Online
//!
//! Protocol and session core of a real-time roleplay chat client.
//!
//! One public channel carries in-character chat and tagged announcements
//! (character, location, music, dice rolls, items, out-of-character talk,
//! text-box clears); direct messages travel alongside. The presentation
//! layer implements a single [`Presenter`] trait and the client handles
//! transport, queuing, keepalive and dispatch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mystery::prelude::*;
//!
//! // Implement Presenter for your screen, then:
//! // let mut client = ClientBuilder::new()
//! //     .server("irc.example.net")
//! //     .channel("#mystery-online")
//! //     .username("Ace")
//! //     .connect(my_screen)
//! //     .await?;
//! // client.run().await
//! ```

mod client;
mod error;
mod router;

pub use client::{Client, ClientBuilder, ClientConfig};
pub use error::MysteryError;
pub use router::{DispatchRouter, Presence, Presenter, RouterStats};

pub use mystery_protocol as protocol;
pub use mystery_session as session;
pub use mystery_tick as tick;
pub use mystery_transport as transport;

/// Installs a `tracing` subscriber that prints to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (for example
/// `"mystery=info"`) is used. Calling it twice is harmless: the second
/// call leaves the first subscriber in place.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    if fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, MysteryError, Presence, Presenter, RouterStats,
    };
    pub use mystery_protocol::{
        ChatFields, ChatMessage, ItemPayload, Kind, MusicCommand, PrivateEnvelope, Roster, Tag,
    };
    pub use mystery_session::{
        DisconnectCause, HealthState, LivenessConfig, SessionConfig, SessionEvents,
    };
    pub use mystery_tick::TickConfig;
    pub use mystery_transport::{ChatTransport, Connector, TransportEvent};
    #[cfg(feature = "irc")]
    pub use mystery_transport::{IrcConnector, IrcTransport};
}
