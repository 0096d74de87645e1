//! In-process transport for local play and tests.
//!
//! A [`MemoryTransport`] has no socket. Inbound events are pushed through a
//! [`MemoryHandle`], and everything the client sends is recorded as
//! [`Outbound`] values the handle can inspect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{ChatTransport, Connector, TransportError, TransportEvent};

/// A command the client issued on a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Join(String),
    Line { target: String, text: String },
    Ping(String),
    Mode { target: String, mode: String },
    Nick(String),
    Quit(String),
}

#[derive(Debug)]
struct MemoryState {
    inbound: VecDeque<TransportEvent>,
    sent: Vec<Outbound>,
    open: bool,
}

type Shared = Arc<Mutex<MemoryState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, MemoryState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    nickname: String,
    shared: Shared,
}

/// Test/driver side of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    shared: Shared,
}

impl MemoryTransport {
    /// Creates an open transport registered as `nickname`.
    pub fn new(nickname: &str) -> (Self, MemoryHandle) {
        let shared = Arc::new(Mutex::new(MemoryState {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            open: true,
        }));
        let transport = Self {
            nickname: nickname.to_string(),
            shared: Arc::clone(&shared),
        };
        (transport, MemoryHandle { shared })
    }

    fn record(&mut self, outbound: Outbound) -> Result<(), TransportError> {
        let mut state = lock(&self.shared);
        if !state.open {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(outbound);
        Ok(())
    }
}

impl ChatTransport for MemoryTransport {
    fn join_channel(&mut self, channel: &str) -> Result<(), TransportError> {
        self.record(Outbound::Join(channel.to_string()))
    }

    fn send_line(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        self.record(Outbound::Line {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    fn ping(&mut self, server: &str) -> Result<(), TransportError> {
        self.record(Outbound::Ping(server.to_string()))
    }

    fn set_mode(&mut self, target: &str, mode: &str) -> Result<(), TransportError> {
        self.record(Outbound::Mode {
            target: target.to_string(),
            mode: mode.to_string(),
        })
    }

    fn change_nick(&mut self, nick: &str) -> Result<(), TransportError> {
        self.record(Outbound::Nick(nick.to_string()))?;
        self.nickname = nick.to_string();
        Ok(())
    }

    fn quit(&mut self, reason: &str) -> Result<(), TransportError> {
        let result = self.record(Outbound::Quit(reason.to_string()));
        lock(&self.shared).open = false;
        result
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        lock(&self.shared).inbound.pop_front()
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn is_open(&self) -> bool {
        lock(&self.shared).open
    }
}

impl MemoryHandle {
    /// Queues an event for the transport to deliver.
    pub fn push_event(&self, event: TransportEvent) {
        lock(&self.shared).inbound.push_back(event);
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<Outbound> {
        lock(&self.shared).sent.clone()
    }

    /// Drains the record of sent commands.
    pub fn take_sent(&self) -> Vec<Outbound> {
        std::mem::take(&mut lock(&self.shared).sent)
    }

    /// Only the text lines sent to `target`.
    pub fn lines_to(&self, target: &str) -> Vec<String> {
        lock(&self.shared)
            .sent
            .iter()
            .filter_map(|out| match out {
                Outbound::Line { target: t, text } if t == target => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Simulates the link going up or down.
    pub fn set_open(&self, open: bool) {
        lock(&self.shared).open = open;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).open
    }
}

/// Hands out [`MemoryTransport`]s; can be told to refuse connections.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    refuse: bool,
    handle: Arc<Mutex<Option<MemoryHandle>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose `connect` always fails.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Handle of the most recent connection.
    pub fn handle(&self) -> Option<MemoryHandle> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(
        &self,
        server: &str,
        port: u16,
        identity: &str,
    ) -> Result<MemoryTransport, TransportError> {
        if self.refuse {
            return Err(TransportError::ServerConnection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{server}:{port} refused the connection"),
            )));
        }
        let (transport, handle) = MemoryTransport::new(identity);
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(transport)
    }
}
