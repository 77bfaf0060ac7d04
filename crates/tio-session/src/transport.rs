//! Transport glue: bridges a session's bounded queues to the actual bytes on
//! the wire (TCP, UDP, serial) or, for routed children, to their parent's
//! virtual transport (§4.1, §6, §11.5).
//!
//! Mirrors the shape of a QUIC client transport that bridges `mpsc` channels
//! to a spawned I/O task: protocol logic never touches a socket directly, it
//! only sends/receives [`RawPacket`]s over channels. Generalized here from
//! one transport flavor to four.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tio_proto::{PacketHeader, RawPacket, header::HEADER_SIZE, slip};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    sync::mpsc,
    task::AbortHandle,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::warn;

use crate::{config::SerialConfig, error::SessionError, url::ConnectTarget};

const CHANNEL_CAPACITY: usize = 64;
/// Large enough for the largest legal frame (4 + 512 + 8) with headroom.
const DATAGRAM_BUFFER_SIZE: usize = 2048;

/// A live connection to the transport a session is bound to.
///
/// Wraps whatever background task(s) bridge the channels to real I/O;
/// [`Connection::from_channels`] builds one with no task at all, for a
/// router's virtual child transport.
pub struct Connection {
    /// Send a packet out over this transport.
    pub to_transport: mpsc::Sender<RawPacket>,
    /// Receive a packet that arrived on this transport.
    pub from_transport: mpsc::Receiver<RawPacket>,
    tasks: Vec<AbortHandle>,
}

impl Connection {
    /// Build a connection directly from a pair of channels, with no backing
    /// I/O task — the shape a router hands to a child session, whose `send`
    /// is the parent's writer and whose `recv` is a queue the parent fills
    /// (§4.5, §11.5).
    #[must_use]
    pub fn from_channels(
        to_transport: mpsc::Sender<RawPacket>,
        from_transport: mpsc::Receiver<RawPacket>,
    ) -> Self {
        Self { to_transport, from_transport, tasks: Vec::new() }
    }

    /// Stop any background I/O tasks bridging this connection. A no-op for
    /// a [`Connection::from_channels`] connection — the parent owns that
    /// lifecycle.
    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Break this connection into its parts: the sender a session's writer
    /// publishes through, the receiver its reader drains, and the abort
    /// handles for whatever I/O tasks back them (kept alive for the
    /// session's own `Drop` to stop, since dropping a [`Connection`] here
    /// would otherwise abort them immediately).
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Sender<RawPacket>, mpsc::Receiver<RawPacket>, Vec<AbortHandle>) {
        (self.to_transport, self.from_transport, self.tasks)
    }

    /// Open a real transport for `target` (anything but
    /// [`ConnectTarget::Router`], which has no real I/O to open).
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] if the underlying connect/open call
    /// fails; [`SessionError::InvalidUrl`] if asked to open a `Router`
    /// target, which must instead be built via
    /// [`Connection::from_channels`].
    pub async fn open(target: &ConnectTarget, serial: &SerialConfig) -> Result<Self, SessionError> {
        match target {
            ConnectTarget::Tcp { host, port, .. } => Self::open_tcp(host, *port).await,
            ConnectTarget::Udp { host, port, .. } => Self::open_udp(host, *port).await,
            ConnectTarget::Serial { device, .. } => Self::open_serial(device, serial).await,
            ConnectTarget::Router { .. } => Err(SessionError::InvalidUrl {
                url: "router://interthread/".to_string(),
                reason: "router targets attach via Connection::from_channels, not open()",
            }),
        }
    }

    async fn open_tcp(host: &str, port: u16) -> Result<Self, SessionError> {
        let stream = TcpStream::connect((host, port)).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::spawn_length_prefixed(read_half, write_half))
    }

    async fn open_udp(host: &str, port: u16) -> Result<Self, SessionError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;
        Ok(Self::spawn_datagram(socket))
    }

    async fn open_serial(device: &str, config: &SerialConfig) -> Result<Self, SessionError> {
        let port = tokio_serial::new(device, config.baud_rate)
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|err| {
                SessionError::Transport(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
            })?;
        let (read_half, write_half) = tokio::io::split(port);
        Ok(Self::spawn_slip(read_half, write_half))
    }

    /// TCP framing: header declares the total frame length, so the reader
    /// reads exactly that many bytes per packet (§4.1 "no framing layer").
    fn spawn_length_prefixed(
        mut read_half: tokio::net::tcp::OwnedReadHalf,
        mut write_half: tokio::net::tcp::OwnedWriteHalf,
    ) -> Self {
        let (out_tx, mut out_rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);

        let read_task = tokio::spawn(async move {
            let mut header_buf = [0u8; HEADER_SIZE];
            loop {
                if read_half.read_exact(&mut header_buf).await.is_err() {
                    break;
                }
                let header = match PacketHeader::parse(&header_buf) {
                    Ok(header) => header,
                    Err(err) => {
                        warn!(error = %err, "rejecting TCP frame header");
                        break;
                    },
                };
                let mut rest = vec![0u8; header.frame_len() - HEADER_SIZE];
                if read_half.read_exact(&mut rest).await.is_err() {
                    break;
                }
                let mut full = BytesMut::with_capacity(header.frame_len());
                full.put_slice(&header_buf);
                full.put_slice(&rest);
                match RawPacket::decode(&full) {
                    Ok((packet, _)) => {
                        if in_tx.send(packet).await.is_err() {
                            break;
                        }
                    },
                    Err(err) => warn!(error = %err, "dropping malformed TCP frame"),
                }
            }
        });

        let write_task = tokio::spawn(async move {
            while let Some(packet) = out_rx.recv().await {
                if write_half.write_all(&packet.encode()).await.is_err() {
                    break;
                }
            }
        });

        Self {
            to_transport: out_tx,
            from_transport: in_rx,
            tasks: vec![read_task.abort_handle(), write_task.abort_handle()],
        }
    }

    /// UDP framing: one packet per datagram (§6).
    fn spawn_datagram(socket: UdpSocket) -> Self {
        let socket = Arc::new(socket);
        let (out_tx, mut out_rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);

        let read_socket = Arc::clone(&socket);
        let read_task = tokio::spawn(async move {
            let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];
            loop {
                let n = match read_socket.recv(&mut buf).await {
                    Ok(n) => n,
                    Err(_) => break,
                };
                match RawPacket::decode(&buf[..n]) {
                    Ok((packet, _)) => {
                        if in_tx.send(packet).await.is_err() {
                            break;
                        }
                    },
                    Err(err) => warn!(error = %err, "dropping malformed UDP datagram"),
                }
            }
        });

        let write_task = tokio::spawn(async move {
            while let Some(packet) = out_rx.recv().await {
                if socket.send(&packet.encode()).await.is_err() {
                    break;
                }
            }
        });

        Self {
            to_transport: out_tx,
            from_transport: in_rx,
            tasks: vec![read_task.abort_handle(), write_task.abort_handle()],
        }
    }

    /// Serial framing: SLIP byte-stuffing over a byte stream with no
    /// inherent packet boundaries, so the reader accumulates bytes and pulls
    /// complete frames out with [`slip::next_frame`] as they appear (§4.1).
    fn spawn_slip<R, W>(mut read_half: R, mut write_half: W) -> Self
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, mut out_rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);

        let read_task = tokio::spawn(async move {
            let mut buf = BytesMut::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = match read_half.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                while let Some((frame, consumed)) = slip::next_frame(&buf) {
                    let frame = frame.to_vec();
                    match slip::decode(&frame)
                        .and_then(|body| RawPacket::decode(&body).map(|(packet, _)| packet))
                    {
                        Ok(packet) => {
                            if in_tx.send(packet).await.is_err() {
                                return;
                            }
                        },
                        Err(err) => warn!(error = %err, "dropping malformed serial frame"),
                    }
                    buf.advance(consumed);
                }
            }
        });

        let write_task = tokio::spawn(async move {
            while let Some(packet) = out_rx.recv().await {
                let stuffed = slip::encode(&packet.to_slip_payload());
                if write_half.write_all(&stuffed).await.is_err() {
                    break;
                }
            }
        });

        Self {
            to_transport: out_tx,
            from_transport: in_rx,
            tasks: vec![read_task.abort_handle(), write_task.abort_handle()],
        }
    }
}
