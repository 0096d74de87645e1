//! IRC transport implementation using `irc-proto` over `tokio` TCP.
//!
//! The socket is owned by two background tasks: a reader that turns framed
//! [`Message`]s into [`TransportEvent`]s and a writer that drains an
//! outbound message queue. The [`IrcTransport`] handle only talks to those
//! tasks through unbounded channels, so every method on it returns
//! immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use irc_proto::error::ProtocolError;
use irc_proto::{Command, IrcCodec, Message, Response};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};

use crate::{ChatTransport, Connector, TransportError, TransportEvent, is_channel};

/// Wire encoding. Undecodable bytes are replaced, never fatal.
const ENCODING: &str = "utf-8";

/// How long [`ChatTransport::flush`] waits for the writer after a quit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// CTCP requests travel inside `PRIVMSG` wrapped in `\x01`.
const CTCP_MARKER: char = '\u{1}';

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

fn irc_codec() -> Result<IrcCodec, TransportError> {
    IrcCodec::new(ENCODING).map_err(|e| TransportError::Codec(e.to_string()))
}

/// Inbound framing: [`IrcCodec`], except that a line which does not parse
/// is logged and skipped instead of ending the stream.
struct InboundCodec {
    inner: IrcCodec,
}

impl Decoder for InboundCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            match self.inner.decode(src) {
                Err(ProtocolError::InvalidMessage { string, cause }) => {
                    tracing::debug!(line = %string.trim_end(), error = %cause, "skipping unparsable irc line");
                }
                other => return other,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event translation
// ---------------------------------------------------------------------------

fn arg(args: &[String], index: usize) -> String {
    args.get(index).cloned().unwrap_or_default()
}

/// Translates a message into a transport event, if it is one the chat
/// layer cares about.
fn to_event(message: &Message) -> Option<TransportEvent> {
    let source = || message.source_nickname().unwrap_or_default().to_string();
    let event = match &message.command {
        Command::Response(Response::RPL_WELCOME, _) => TransportEvent::Welcome,
        Command::JOIN(channel, _, _) => TransportEvent::Join {
            nick: source(),
            channel: channel.clone(),
        },
        Command::QUIT(reason) => TransportEvent::Quit {
            nick: source(),
            reason: reason.clone().unwrap_or_default(),
        },
        Command::PRIVMSG(_, text) if text.starts_with(CTCP_MARKER) => {
            tracing::trace!(sender = %source(), "ignoring ctcp request");
            return None;
        }
        Command::PRIVMSG(target, text) if is_channel(target) => TransportEvent::RoomMessage {
            sender: source(),
            channel: target.clone(),
            text: text.clone(),
        },
        Command::PRIVMSG(_, text) => TransportEvent::PrivateMessage {
            sender: source(),
            text: text.clone(),
        },
        // ERR_NICKNAMEINUSE: <me> <nick> :<reason>
        Command::Response(Response::ERR_NICKNAMEINUSE, args) => TransportEvent::NicknameInUse {
            nick: arg(args, 1),
        },
        // RPL_NAMREPLY: <me> <visibility> <channel> :<names>
        Command::Response(Response::RPL_NAMREPLY, args) => TransportEvent::Roster {
            channel: arg(args, 2),
            members: arg(args, 3),
        },
        Command::NOTICE(_, text) => TransportEvent::Notice {
            sender: source(),
            text: text.clone(),
        },
        Command::PONG(server, _) => TransportEvent::Pong {
            server: server.clone(),
        },
        _ => return None,
    };
    Some(event)
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens [`IrcTransport`] connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct IrcConnector;

impl Connector for IrcConnector {
    type Transport = IrcTransport;

    async fn connect(
        &self,
        server: &str,
        port: u16,
        identity: &str,
    ) -> Result<IrcTransport, TransportError> {
        let stream = TcpStream::connect((server, port)).await.map_err(|e| {
            tracing::warn!(server, port, error = %e, "could not connect to IRC server");
            TransportError::ServerConnection(e)
        })?;
        tracing::info!(server, port, nick = identity, "connected to IRC server");
        IrcTransport::from_stream(stream, identity)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A single IRC connection.
///
/// Dropping the transport aborts its background tasks and closes the socket.
/// Call [`flush`](ChatTransport::flush) after [`quit`](ChatTransport::quit)
/// to make sure the `QUIT` is written first.
pub struct IrcTransport {
    nickname: String,
    /// `None` after quit, which lets the writer drain and finish.
    outbound: Option<mpsc::UnboundedSender<Message>>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl IrcTransport {
    /// Wraps an already connected stream and sends the registration
    /// messages.
    pub fn from_stream(stream: TcpStream, nickname: &str) -> Result<Self, TransportError> {
        let (read_half, write_half) = stream.into_split();
        let frames = FramedRead::new(read_half, InboundCodec { inner: irc_codec()? });
        let sink = FramedWrite::new(write_half, irc_codec()?);

        let open = Arc::new(AtomicBool::new(true));
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(sink, out_rx, Arc::clone(&open)));
        let reader = tokio::spawn(read_loop(frames, in_tx, out_tx.clone(), Arc::clone(&open)));

        let mut transport = Self {
            nickname: nickname.to_string(),
            outbound: Some(out_tx),
            inbound: in_rx,
            open,
            reader,
            writer: Some(writer),
        };
        transport.send(Command::NICK(nickname.to_string()))?;
        transport.send(Command::USER(
            nickname.to_string(),
            "0".to_string(),
            nickname.to_string(),
        ))?;
        Ok(transport)
    }

    fn send(&mut self, command: Command) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        tracing::trace!(?command, "irc >>");
        outbound
            .send(Message::from(command))
            .map_err(|_| TransportError::NotConnected)
    }
}

impl ChatTransport for IrcTransport {
    fn join_channel(&mut self, channel: &str) -> Result<(), TransportError> {
        self.send(Command::JOIN(channel.to_string(), None, None))
    }

    fn send_line(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        self.send(Command::PRIVMSG(target.to_string(), text.to_string()))
    }

    fn ping(&mut self, server: &str) -> Result<(), TransportError> {
        self.send(Command::PING(server.to_string(), None))
    }

    fn set_mode(&mut self, target: &str, mode: &str) -> Result<(), TransportError> {
        // Sent as given; the server validates the mode string.
        self.send(Command::Raw(
            "MODE".to_string(),
            vec![target.to_string(), mode.to_string()],
        ))
    }

    fn change_nick(&mut self, nick: &str) -> Result<(), TransportError> {
        self.send(Command::NICK(nick.to_string()))?;
        self.nickname = nick.to_string();
        Ok(())
    }

    fn quit(&mut self, reason: &str) -> Result<(), TransportError> {
        let result = self.send(Command::QUIT(Some(reason.to_string())));
        self.open.store(false, Ordering::Release);
        // With every sender gone the writer drains what is queued and exits.
        self.outbound = None;
        self.reader.abort();
        result
    }

    async fn flush(&mut self) {
        if self.outbound.is_some() {
            return;
        }
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
            tracing::debug!("irc writer did not finish in time");
            writer.abort();
        }
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.inbound.try_recv().ok()
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for IrcTransport {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, IrcCodec>,
    mut messages: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
) {
    while let Some(message) = messages.recv().await {
        if let Err(e) = sink.send(message).await {
            tracing::debug!(error = %e, "irc write failed");
            break;
        }
    }
    open.store(false, Ordering::Release);
    let _ = sink.close().await;
}

async fn read_loop(
    mut frames: FramedRead<OwnedReadHalf, InboundCodec>,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
) {
    loop {
        let message = match frames.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "irc read failed");
                break;
            }
            None => {
                tracing::info!("irc server closed the connection");
                break;
            }
        };
        tracing::trace!(command = ?message.command, "irc <<");

        // Servers drop clients that leave their pings unanswered.
        if let Command::PING(token, _) = &message.command {
            let pong = Message::from(Command::PONG(token.clone(), None));
            if outbound.send(pong).is_err() {
                break;
            }
            continue;
        }

        match to_event(&message) {
            Some(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            None => tracing::trace!(command = ?message.command, "ignoring irc command"),
        }
    }
    open.store(false, Ordering::Release);
}
