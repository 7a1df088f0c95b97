use std::{
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use bytes::BytesMut;
use mio::Interest;

use super::tcp_cnx::{deadline_after, TcpCnx, Wait};
use crate::{
    codec::{encode_payload, ChunkDecoder},
    config::GatewayConfig,
    errors::{GatewayError, Result},
};

/// Whether a timed operation saw readiness before its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T> {
    Ready(T),
    TimedOut,
}

impl<T> Readiness<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Readiness::TimedOut)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Readiness::Ready(v) => Some(v),
            Readiness::TimedOut => None,
        }
    }
}

/// Text collected by one drain of the socket.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub text: String,
    /// The gateway closed its side while the socket was being drained.
    pub peer_closed: bool,
}

/// Non-blocking client for a single gateway connection.
///
/// Every operation registers one interest on the poll, blocks the calling thread up
/// to a deadline and returns. Nothing runs in the background.
pub struct GatewayClient {
    remote: SocketAddr,
    config: GatewayConfig,
    cnx: Option<TcpCnx>,
    send_buf: BytesMut,
    recv_buf: BytesMut,
    authenticated: bool,
}

impl GatewayClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        Self::with_config(host, port, GatewayConfig::default())
    }

    /// Resolves the gateway address once. No I/O happens until [`connect`](Self::connect).
    pub fn with_config(host: &str, port: u16, config: GatewayConfig) -> Result<Self> {
        let target = format!("{host}:{port}");
        let remote = (host, port)
            .to_socket_addrs()
            .map_err(|source| GatewayError::Resolve {
                target: target.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| GatewayError::Resolve {
                target,
                source: ErrorKind::AddrNotAvailable.into(),
            })?;

        Ok(Self::from_addr(remote, config))
    }

    pub fn from_addr(remote: SocketAddr, mut config: GatewayConfig) -> Self {
        config.buffer_capacity = config.buffer_capacity.max(1);
        GatewayClient {
            remote,
            config,
            cnx: None,
            send_buf: BytesMut::with_capacity(config.buffer_capacity),
            recv_buf: BytesMut::with_capacity(config.buffer_capacity),
            authenticated: false,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Connects to the gateway, waiting at most the configured connect timeout.
    ///
    /// Returns `Ok(false)` when the gateway did not confirm the connection in time
    /// (or refused it). Local socket and poll failures are returned as errors.
    /// An existing connection is closed first.
    pub fn connect(&mut self) -> Result<bool> {
        self.close();

        let deadline = deadline_after(self.config.connect_timeout);
        match TcpCnx::open(self.remote, deadline) {
            Ok(Some(cnx)) => {
                tracing::info!(remote = %self.remote, "connected to gateway");
                self.cnx = Some(cnx);
                Ok(true)
            }
            Ok(None) => {
                tracing::warn!(
                    remote = %self.remote,
                    timeout_ms = self.config.connect_timeout.as_millis() as u64,
                    "gateway connection failed"
                );
                Ok(false)
            }
            Err(e) => Err(GatewayError::io("connect", e)),
        }
    }

    /// Writes `payload` once the socket is writable. A timeout is swallowed; use
    /// [`try_write`](Self::try_write) to observe it.
    pub fn write(&mut self, payload: &str, timeout: Duration) -> Result<()> {
        if self.try_write(payload, timeout)?.is_timed_out() {
            tracing::debug!(timeout_ms = timeout.as_millis() as u64, "gateway write timed out");
        }
        Ok(())
    }

    /// Writes the whole encoded `payload` before the deadline, returning the number of
    /// bytes sent.
    ///
    /// If the socket stays unwritable for the whole window nothing is sent and the
    /// result is [`Readiness::TimedOut`]. If it stalls after part of the payload went
    /// out, the message is already torn, so the connection is closed and
    /// [`GatewayError::PartialWrite`] is returned.
    pub fn try_write(&mut self, payload: &str, timeout: Duration) -> Result<Readiness<usize>> {
        let deadline = deadline_after(timeout);
        let GatewayConfig {
            encoding,
            buffer_capacity: capacity,
            ..
        } = self.config;

        let Self { cnx, send_buf, .. } = &mut *self;
        let Some(link) = cnx.as_mut() else {
            return Err(GatewayError::NotConnected);
        };

        let encoded = encode_payload(encoding, payload)?;
        if encoded.len() > capacity {
            return Err(GatewayError::PayloadTooLarge {
                len: encoded.len(),
                capacity,
            });
        }

        send_buf.clear();
        send_buf.extend_from_slice(&encoded);

        let total = send_buf.len();
        let mut written = 0;
        let outcome = 'send: loop {
            match link.wait_for(Interest::WRITABLE, deadline) {
                Ok(Wait::Ready) => {}
                Ok(Wait::Expired) if written == 0 => break 'send Ok(Readiness::TimedOut),
                Ok(Wait::Expired) => break 'send Err(GatewayError::PartialWrite { written, total }),
                Err(e) => break 'send Err(GatewayError::io("write", e)),
            }

            while written < total {
                match link.stream.write(&send_buf[written..]) {
                    Ok(0) => {
                        break 'send Err(GatewayError::io("write", ErrorKind::WriteZero.into()))
                    }
                    Ok(n) => written += n,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => continue 'send,
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => break 'send Err(GatewayError::io("write", e)),
                }
            }
            break 'send Ok(Readiness::Ready(total));
        };

        link.clear_events();
        tracing::debug!(written, total, "gateway write");
        self.settle(outcome)
    }

    /// Reads whatever the gateway has sent. Returns empty text on timeout; use
    /// [`try_read`](Self::try_read) to tell a timeout apart from an empty drain.
    pub fn read(&mut self, timeout: Duration) -> Result<String> {
        Ok(match self.try_read(timeout)? {
            Readiness::Ready(reply) => reply.text,
            Readiness::TimedOut => {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "gateway read timed out");
                String::new()
            }
        })
    }

    /// Waits for the socket to become readable, then drains it.
    ///
    /// The drain stops as soon as the socket has nothing more to give right now, it
    /// does not look for message boundaries.
    pub fn try_read(&mut self, timeout: Duration) -> Result<Readiness<Reply>> {
        let deadline = deadline_after(timeout);
        let GatewayConfig {
            encoding,
            buffer_capacity: capacity,
            ..
        } = self.config;

        let Self { cnx, recv_buf, .. } = &mut *self;
        let Some(link) = cnx.as_mut() else {
            return Err(GatewayError::NotConnected);
        };

        let outcome = match link.wait_for(Interest::READABLE, deadline) {
            Ok(Wait::Expired) => Ok(Readiness::TimedOut),
            Ok(Wait::Ready) => drain(&mut link.stream, recv_buf, capacity, encoding).map(Readiness::Ready),
            Err(e) => Err(GatewayError::io("read", e)),
        };

        link.clear_events();
        self.settle(outcome)
    }

    pub fn is_open(&self) -> bool {
        self.cnx.is_some()
    }

    /// Closes the poll and then the stream. Errors are logged, never returned.
    pub fn close(&mut self) {
        if let Some(cnx) = self.cnx.take() {
            cnx.close();
            tracing::info!(remote = %self.remote, "gateway connection closed");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    /// Tears the connection down when an operation failed fatally.
    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            if e.is_fatal() {
                tracing::warn!(error = %e, "closing gateway connection after fatal error");
                self.close();
            }
        }
        outcome
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn drain(
    stream: &mut mio::net::TcpStream,
    buf: &mut BytesMut,
    capacity: usize,
    encoding: &'static encoding_rs::Encoding,
) -> Result<Reply> {
    let mut decoder = ChunkDecoder::new(encoding);
    let mut peer_closed = false;
    let mut total = 0;

    // NOTE: resize stays within the buffer's fixed capacity, so this never reallocates
    buf.clear();
    buf.resize(capacity, 0);

    loop {
        match stream.read(&mut buf[..]) {
            Ok(0) => {
                peer_closed = true;
                break;
            }
            Ok(n) => {
                decoder.push(&buf[..n]);
                total += n;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(GatewayError::io("read", e)),
        }
    }
    buf.clear();

    tracing::debug!(bytes = total, peer_closed, "gateway read");
    Ok(Reply {
        text: decoder.finish(),
        peer_closed,
    })
}
