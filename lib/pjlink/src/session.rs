use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::codec::{self, Command};
use crate::{Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest reply line accepted, terminator included.
const MAX_LINE: usize = 1024;
const AUTH_GREETING: &str = "PJLINK 1";

/// Opens the byte stream a [`Session`] talks over.
#[async_trait]
pub trait Connector: fmt::Display + Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self) -> Result<Self::Stream>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Faulted,
}

struct Link<S> {
    state: ConnectionState,
    stream: Option<BufReader<S>>,
}

/// Strict send-then-receive exchange with a single projector.
///
/// The link is behind a mutex that is held for a whole exchange, reconnect
/// included, so concurrent callers never interleave on the stream. Transport
/// errors stay inside: callers only ever see a reply or `None`.
pub struct Session<C: Connector> {
    connector: C,
    timeout: Duration,
    link: Mutex<Link<C::Stream>>,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, timeout: Duration) -> Self {
        Self {
            connector,
            timeout,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                stream: None,
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn state(&self) -> ConnectionState {
        self.link.lock().await.state
    }

    /// Opens a fresh transport and consumes the greeting line. On failure the
    /// session is left `Faulted`.
    pub async fn connect(&self) -> bool {
        let mut link = self.link.lock().await;
        self.connect_link(&mut link).await
    }

    pub async fn send(&self, command: &Command) -> Option<String> {
        self.send_command(&command.encode()).await
    }

    /// Writes `line` and reads exactly one reply.
    ///
    /// On an I/O error the session faults, tries to reconnect once and returns
    /// `None`. The command is never resent: set commands are not idempotent.
    pub async fn send_command(&self, line: &[u8]) -> Option<String> {
        let mut link = self.link.lock().await;

        if link.state != ConnectionState::Connected && !self.connect_link(&mut link).await {
            debug!("{}: not connected, dropping command", self.connector);
            return None;
        }

        let result = match link.stream.as_mut() {
            Some(stream) => self.exchange(stream, line).await,
            None => Err(Error::NotConnected),
        };

        match result {
            Ok(reply) if reply.is_empty() => {
                debug!("{}: empty reply", self.connector);
                None
            }
            Ok(reply) => Some(reply),
            Err(err) => {
                warn!(
                    "{}: command {} failed: {err}",
                    self.connector,
                    codec::decode(line)
                );

                link.state = ConnectionState::Faulted;
                link.stream = None;

                self.connect_link(&mut link).await;

                None
            }
        }
    }

    /// Releases the transport whatever the current state is.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;

        if let Some(mut stream) = link.stream.take() {
            let _ = timeout(self.timeout, stream.shutdown()).await;
            debug!("{}: disconnected", self.connector);
        }

        link.state = ConnectionState::Disconnected;
    }

    async fn connect_link(&self, link: &mut Link<C::Stream>) -> bool {
        link.stream = None;

        match self.open().await {
            Ok((stream, greeting)) => {
                info!("connected to {}: {greeting}", self.connector);

                if greeting.starts_with(AUTH_GREETING) {
                    warn!(
                        "{} requires authentication, commands will be rejected",
                        self.connector
                    );
                }

                link.stream = Some(stream);
                link.state = ConnectionState::Connected;

                true
            }
            Err(err) => {
                error!("failed to connect to {}: {err}", self.connector);
                link.state = ConnectionState::Faulted;

                false
            }
        }
    }

    async fn open(&self) -> Result<(BufReader<C::Stream>, String)> {
        let stream = timeout(self.timeout, self.connector.connect()).await??;
        let mut stream = BufReader::with_capacity(MAX_LINE, stream);
        let greeting = self.read_reply(&mut stream).await?;

        Ok((stream, greeting))
    }

    async fn exchange(&self, stream: &mut BufReader<C::Stream>, line: &[u8]) -> Result<String> {
        trace!("{} send {:?}", self.connector, String::from_utf8_lossy(line));
        timeout(self.timeout, stream.write_all(line)).await??;

        let reply = self.read_reply(stream).await?;
        trace!("{} recv {:?}", self.connector, reply);

        Ok(reply)
    }

    /// Reads up to and including the next `\r`, however many segments the
    /// line arrives in.
    async fn read_reply(&self, stream: &mut BufReader<C::Stream>) -> Result<String> {
        let mut line = Vec::with_capacity(MAX_LINE);
        let mut limited = stream.take(MAX_LINE as u64);

        let read = timeout(
            self.timeout,
            limited.read_until(codec::TERMINATOR as u8, &mut line),
        )
        .await??;

        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        if line.last() != Some(&(codec::TERMINATOR as u8)) {
            return Err(Error::UnterminatedReply(line.len()));
        }

        Ok(codec::decode(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use std::net::Ipv4Addr;

    use tokio::net::{TcpListener, TcpStream};

    use crate::codec::Verb;
    use crate::stub::{closed_address, MockProjector};
    use crate::Address;

    const TIMEOUT: Duration = Duration::from_millis(300);

    struct Counting {
        addr: Address,
        attempts: AtomicUsize,
    }

    impl Counting {
        fn new(addr: Address) -> Self {
            Self {
                addr,
                attempts: AtomicUsize::new(0),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl fmt::Display for Counting {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Display::fmt(&self.addr, f)
        }
    }

    #[async_trait]
    impl Connector for Counting {
        type Stream = TcpStream;

        async fn connect(&self) -> Result<TcpStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.addr.connect().await
        }
    }

    #[tokio::test]
    async fn test_connect_consumes_greeting() {
        let projector = MockProjector::start().await.unwrap();
        let session = Session::new(projector.address(), TIMEOUT);

        assert!(session.connect().await);
        assert_eq!(session.state().await, ConnectionState::Connected);

        let reply = session.send(&Command::query(Verb::Powr)).await;
        assert_eq!(reply.as_deref(), Some("%1POWR=0"));
    }

    #[tokio::test]
    async fn test_connects_lazily() {
        let projector = MockProjector::start().await.unwrap();
        let session = Session::new(Counting::new(projector.address()), TIMEOUT);

        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert_eq!(session.connector().attempts(), 0);

        let reply = session.send_command(b"%1AVMT ?\r").await;
        assert_eq!(reply.as_deref(), Some("%1AVMT=30"));

        let reply = session.send_command(b"%2FREZ ?\r").await;
        assert_eq!(reply.as_deref(), Some("%2FREZ=0"));

        assert_eq!(session.connector().attempts(), 1);
        assert_eq!(projector.connections(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_faulted() {
        let addr = closed_address().await.unwrap();
        let session = Session::new(Counting::new(addr), TIMEOUT);

        assert!(!session.connect().await);
        assert_eq!(session.state().await, ConnectionState::Faulted);
        assert_eq!(session.connector().attempts(), 1);

        let reply = session.send(&Command::query(Verb::Powr)).await;
        assert_eq!(reply, None);
        assert_eq!(session.connector().attempts(), 2);
        assert_eq!(session.state().await, ConnectionState::Faulted);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let projector = MockProjector::start().await.unwrap();
        let session = Session::new(projector.address(), TIMEOUT);

        session.disconnect().await;
        assert_eq!(session.state().await, ConnectionState::Disconnected);

        assert!(session.connect().await);

        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_after_fault() {
        let addr = closed_address().await.unwrap();
        let session = Session::new(addr, TIMEOUT);

        assert!(!session.connect().await);
        session.disconnect().await;

        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_timeout_reconnects_once_without_resending() {
        let projector = MockProjector::start().await.unwrap();
        projector.ignore("%1POWR 1").await;

        let session = Session::new(Counting::new(projector.address()), TIMEOUT);

        let reply = session.send(&Command::set(Verb::Powr, "1")).await;
        assert_eq!(reply, None);
        assert_eq!(session.state().await, ConnectionState::Connected);
        assert_eq!(session.connector().attempts(), 2);
        assert_eq!(projector.received("%1POWR 1").await, 1);

        let reply = session.send(&Command::query(Verb::Powr)).await;
        assert_eq!(reply.as_deref(), Some("%1POWR=0"));
        assert_eq!(session.connector().attempts(), 2);
    }

    #[tokio::test]
    async fn test_closed_by_peer_faults() {
        let projector = MockProjector::start().await.unwrap();
        let session = Session::new(projector.address(), TIMEOUT);

        assert!(session.connect().await);
        projector.shutdown().await;

        let reply = session.send(&Command::query(Verb::Powr)).await;
        assert_eq!(reply, None);
        assert_ne!(session.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_empty_reply_is_none() {
        let projector = MockProjector::start().await.unwrap();
        projector.respond("%1INPT ?", "").await;

        let session = Session::new(projector.address(), TIMEOUT);

        assert_eq!(session.send(&Command::query(Verb::Inpt)).await, None);
        assert_eq!(session.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_concurrent_exchanges_keep_pairing() {
        let projector = MockProjector::start().await.unwrap();
        projector
            .update(|state| state.power = crate::PowerState::Warming)
            .await;

        let session = Session::new(projector.address(), TIMEOUT);

        let power = Command::query(Verb::Powr);
        let mute = Command::query(Verb::Avmt);
        let freeze = Command::query(Verb::Frez);

        let (power, mute, freeze) = tokio::join!(
            session.send(&power),
            session.send(&mute),
            session.send(&freeze)
        );

        assert_eq!(power.as_deref(), Some("%1POWR=3"));
        assert_eq!(mute.as_deref(), Some("%1AVMT=30"));
        assert_eq!(freeze.as_deref(), Some("%2FREZ=0"));
        assert_eq!(projector.connections(), 1);
    }

    /// A peer that writes each scripted reply as the given chunks, pausing
    /// between them, after reading one command per reply.
    async fn chunked_peer(replies: Vec<Vec<&'static str>>) -> Address {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"PJLINK 0\r").await.unwrap();

            let mut buffer = [0u8; 64];
            for chunks in replies {
                if socket.read(&mut buffer).await.unwrap_or(0) == 0 {
                    return;
                }

                for chunk in chunks {
                    socket.write_all(chunk.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }

            let _ = socket.read(&mut buffer).await;
        });

        Address::new(addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_reply_split_across_segments() {
        let addr = chunked_peer(vec![
            vec!["%1POWR", "=1\r"],
            vec!["%1AVMT=31\r"],
            vec!["%2FR", "EZ=", "0\r"],
        ])
        .await;
        let session = Session::new(addr, TIMEOUT);

        let power = session.send(&Command::query(Verb::Powr)).await;
        let mute = session.send(&Command::query(Verb::Avmt)).await;
        let freeze = session.send(&Command::query(Verb::Frez)).await;

        assert_eq!(power.as_deref(), Some("%1POWR=1"));
        assert_eq!(mute.as_deref(), Some("%1AVMT=31"));
        assert_eq!(freeze.as_deref(), Some("%2FREZ=0"));
        assert_eq!(session.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_crlf_terminated_replies_stay_paired() {
        let addr = chunked_peer(vec![vec!["%1POWR=0\r\n"], vec!["%1AVMT=30\r\n"]]).await;
        let session = Session::new(addr, TIMEOUT);

        let power = session.send(&Command::query(Verb::Powr)).await;
        let mute = session.send(&Command::query(Verb::Avmt)).await;

        assert_eq!(power.as_deref(), Some("%1POWR=0"));
        assert_eq!(mute.as_deref(), Some("%1AVMT=30"));
    }

    #[tokio::test]
    async fn test_unterminated_reply_faults() {
        let addr = chunked_peer(vec![vec!["%1POWR=1"]]).await;
        let session = Session::new(Counting::new(addr), TIMEOUT);

        let reply = session.send(&Command::query(Verb::Powr)).await;

        assert_eq!(reply, None);
        assert_eq!(session.connector().attempts(), 2);
        assert_eq!(session.state().await, ConnectionState::Faulted);
    }
}
