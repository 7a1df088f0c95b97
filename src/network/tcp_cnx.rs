use std::{
    io::{self, ErrorKind},
    net::{Shutdown, SocketAddr},
    time::{Duration, Instant},
};

use mio::{net::TcpStream, Events, Interest, Poll, Token};

const GATEWAY: Token = Token(0);

/// Outcome of waiting on the poll for a single interest.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Wait {
    Ready,
    Expired,
}

/// Deadline for an operation starting now. `None` means the timeout is too large to
/// represent, so the wait never expires.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// A connected stream paired with the poll that watches it.
///
/// Both are created together and dropped together, so a poll never outlives its
/// stream. Exactly one interest is registered at a time.
pub(crate) struct TcpCnx {
    pub stream: TcpStream,
    poll: Poll,
    events: Events,
}

impl TcpCnx {
    /// Starts a non-blocking connect and waits until the handshake completes or the
    /// deadline passes. `Ok(None)` means the gateway did not confirm the connection.
    pub fn open(remote: SocketAddr, deadline: Option<Instant>) -> io::Result<Option<Self>> {
        let poll = Poll::new()?;
        let mut stream = match TcpStream::connect(remote) {
            Ok(stream) => stream,
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                tracing::debug!(%remote, "connect refused immediately");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // NOTE: mio reports connect completion as writability
        poll.registry()
            .register(&mut stream, GATEWAY, Interest::WRITABLE)?;

        let mut cnx = TcpCnx {
            stream,
            poll,
            events: Events::with_capacity(4),
        };

        let mut polled = false;
        loop {
            if cnx.wait_once(deadline, &mut polled)? == Wait::Expired {
                return Ok(None);
            }
            if !cnx.has_event(|e| e.is_writable() || e.is_error() || e.is_write_closed()) {
                continue;
            }

            if let Some(err) = cnx.stream.take_error()? {
                tracing::debug!(%remote, error = %err, "connect handshake failed");
                return Ok(None);
            }
            match cnx.stream.peer_addr() {
                Ok(_) => {
                    cnx.events.clear();
                    return Ok(Some(cnx));
                }
                Err(e) if e.kind() == ErrorKind::NotConnected => continue,
                Err(e) => {
                    tracing::debug!(%remote, error = %e, "connect not confirmed");
                    return Ok(None);
                }
            }
        }
    }

    /// Switches the registered interest and blocks until it fires or the deadline passes.
    ///
    /// The poll is always consulted at least once, so an already-passed deadline still
    /// reports readiness that is present right now.
    pub fn wait_for(&mut self, interest: Interest, deadline: Option<Instant>) -> io::Result<Wait> {
        self.poll
            .registry()
            .reregister(&mut self.stream, GATEWAY, interest)?;

        let fired = |e: &mio::event::Event| {
            if interest.is_readable() {
                e.is_readable() || e.is_read_closed() || e.is_error()
            } else {
                e.is_writable() || e.is_write_closed() || e.is_error()
            }
        };

        let mut polled = false;
        loop {
            if self.wait_once(deadline, &mut polled)? == Wait::Expired {
                return Ok(Wait::Expired);
            }
            if self.has_event(fired) {
                return Ok(Wait::Ready);
            }
        }
    }

    /// Drops whatever readiness the last poll reported.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Deregisters from the poll, then shuts the stream down. Never fails, only logs.
    pub fn close(mut self) {
        if let Err(e) = self.poll.registry().deregister(&mut self.stream) {
            tracing::warn!(error = %e, "failed to deregister gateway stream");
        }
        drop(self.poll);

        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            // Peer already gone
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(e) => tracing::warn!(error = %e, "failed to shut down gateway stream"),
        }
    }

    fn wait_once(&mut self, deadline: Option<Instant>, polled: &mut bool) -> io::Result<Wait> {
        let timeout = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() && *polled {
                    return Ok(Wait::Expired);
                }
                Some(left)
            }
            None => None,
        };
        *polled = true;

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => Ok(Wait::Ready),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Wait::Ready),
            Err(e) => Err(e),
        }
    }

    fn has_event(&self, fired: impl Fn(&mio::event::Event) -> bool) -> bool {
        self.events
            .iter()
            .any(|e| e.token() == GATEWAY && fired(e))
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, time::Duration};

    use super::*;

    fn deadline(ms: u64) -> Option<Instant> {
        deadline_after(Duration::from_millis(ms))
    }

    #[test]
    fn open_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let cnx = TcpCnx::open(addr, deadline(1000)).unwrap();
        assert!(cnx.is_some());
        cnx.unwrap().close();
    }

    #[test]
    fn open_against_closed_port() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let cnx = TcpCnx::open(addr, deadline(1000)).unwrap();
        assert!(cnx.is_none());
    }

    #[test]
    fn write_interest_fires_on_fresh_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut cnx = TcpCnx::open(addr, deadline(1000)).unwrap().unwrap();
        assert_eq!(
            cnx.wait_for(Interest::WRITABLE, deadline(1000)).unwrap(),
            Wait::Ready
        );
        cnx.close();
    }

    #[test]
    fn read_interest_expires_when_peer_is_silent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut cnx = TcpCnx::open(addr, deadline(1000)).unwrap().unwrap();
        let _peer = listener.accept().unwrap();

        let start = Instant::now();
        assert_eq!(
            cnx.wait_for(Interest::READABLE, deadline(100)).unwrap(),
            Wait::Expired
        );
        assert!(start.elapsed() >= Duration::from_millis(100));
        cnx.close();
    }

    #[test]
    fn elapsed_deadline_still_polls_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut cnx = TcpCnx::open(addr, deadline(1000)).unwrap().unwrap();
        let past = Some(Instant::now());
        assert_eq!(cnx.wait_for(Interest::WRITABLE, past).unwrap(), Wait::Ready);
        cnx.close();
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        assert!(deadline_after(Duration::MAX).is_none());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut cnx = TcpCnx::open(addr, None).unwrap().unwrap();
        assert_eq!(cnx.wait_for(Interest::WRITABLE, None).unwrap(), Wait::Ready);
        cnx.close();
    }
}
