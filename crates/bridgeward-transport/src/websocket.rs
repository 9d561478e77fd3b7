//! WebSocket transport implementation using `tokio-tungstenite`.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::{Connection, ConnectionId, TlsMode, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Either a plain TCP stream or a TLS stream on top of one.
trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type WsStream = WebSocketStream<Box<dyn Io>>;

/// Binds a TCP listener and hands out incoming sockets.
pub struct WebSocketTransport {
    listener: TcpListener,
    tls: TlsMode,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(
        addr: &str,
        tls: TlsMode,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, tls = tls.is_enabled(), "WebSocket transport listening");
        Ok(Self { listener, tls })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// No handshake happens here. Call [`Incoming::upgrade`] (usually
    /// from a spawned task) to finish opening the WebSocket.
    pub async fn accept(&self) -> Result<Incoming, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::trace!(%addr, "tcp connection accepted");
        Ok(Incoming {
            stream,
            addr,
            tls: self.tls.clone(),
        })
    }
}

/// An accepted TCP socket that hasn't finished its handshakes yet.
pub struct Incoming {
    stream: TcpStream,
    addr: SocketAddr,
    tls: TlsMode,
}

impl Incoming {
    /// The remote socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the TLS handshake (when enabled) and then the WebSocket
    /// opening handshake.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let io: Box<dyn Io> = match &self.tls {
            TlsMode::Disabled => Box::new(self.stream),
            TlsMode::Enabled(acceptor) => {
                let tls = acceptor
                    .accept(self.stream)
                    .await
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
                Box::new(tls)
            }
        };

        let ws = tokio_tungstenite::accept_async(io)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, addr = %self.addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            addr: self.addr,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split into its write and read halves, each behind its
/// own lock, so outbound sends never wait on a pending receive.
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(send_error)
    }
}

/// Maps a tungstenite write error to a transport error.
///
/// Writing to a socket the peer already closed is reported as
/// [`TransportError::ConnectionClosed`] so callers can tell it apart
/// from a real I/O failure.
fn send_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            TransportError::ConnectionClosed(e.to_string())
        }
        WsError::Io(io) if io.kind() == io::ErrorKind::BrokenPipe => {
            TransportError::ConnectionClosed(io.to_string())
        }
        WsError::Io(io) => TransportError::SendFailed(io),
        other => TransportError::SendFailed(io::Error::other(other)),
    }
}

impl Connection for WebSocketConnection {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.send_message(Message::Text(text.to_owned().into())).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        io::Error::new(io::ErrorKind::ConnectionReset, e),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.send_message(Message::Close(None)).await
    }

    async fn close_with(
        &self,
        code: u16,
        reason: &str,
    ) -> Result<(), TransportError> {
        tracing::debug!(id = %self.id, code, reason, "closing connection");
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.send_message(Message::Close(Some(frame))).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}
