use crate::framing::{encode_request, Response, DEFAULT_MAX_FRAME_SIZE};
use crate::kinds::{
    ping_matches, PlayerProfile, PlayerRegistration, ProtocolRegistry, Reply, ServerPort,
    KIND_PING, KIND_PLAYER_PING, KIND_PLAYER_PROFILES_LIST, KIND_PROTOCOLS, KIND_SERVER_PORT,
};
use crate::transport::FrameTransport;
use crate::{Result, ScaffoldingError};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 13448;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_frame_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where a request currently is inside a connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Sending,
    AwaitingStatus,
    AwaitingLength,
    AwaitingBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected(RequestPhase),
    /// A request failed mid-frame; the stream position is unknown.
    Broken,
    Closed,
}

/// A byte stream a session can own.
pub trait SessionStream: Read + Write {
    fn close_stream(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SessionStream for TcpStream {
    fn close_stream(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// One connection to a Scaffolding service, carrying one request at a time.
///
/// The socket is closed when the session is dropped.
pub struct ClientSession<S: SessionStream = TcpStream> {
    config: SessionConfig,
    transport: Option<FrameTransport<S>>,
    state: SessionState,
    registry: ProtocolRegistry,
}

impl ClientSession<TcpStream> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
            state: SessionState::Disconnected,
            registry: ProtocolRegistry::default(),
        }
    }

    /// Creates a session and connects it
    pub fn open(config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.connect()?;
        Ok(session)
    }

    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => {}
            SessionState::Connected(_) => {
                debug!("Session to {} already connected", self.config.addr());
                return Ok(());
            }
            SessionState::Closed => return Err(ScaffoldingError::NotConnected),
            SessionState::Broken => return Err(ScaffoldingError::SessionUnusable),
        }

        let addr = self.config.addr();
        info!("Connecting to {}...", addr);

        let stream = connect_any(&addr, self.config.connect_timeout)?;
        stream.set_read_timeout(non_zero(self.config.read_timeout))?;
        stream.set_write_timeout(non_zero(self.config.write_timeout))?;
        stream.set_nodelay(true)?;

        info!("Connected to {}", addr);

        self.transport = Some(FrameTransport::new(
            stream,
            self.config.read_timeout,
            self.config.max_frame_size,
        ));
        self.state = SessionState::Connected(RequestPhase::Idle);
        Ok(())
    }
}

fn connect_any(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let mut last_err = None;

    for socket_addr in addr.to_socket_addrs()? {
        let attempt = if timeout.is_zero() {
            TcpStream::connect(socket_addr)
        } else {
            TcpStream::connect_timeout(&socket_addr, timeout)
        };

        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connect to {} failed: {}", socket_addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(ScaffoldingError::Connection(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{} resolved to no addresses", addr),
        )
    })))
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

impl<S: SessionStream> ClientSession<S> {
    /// Wraps an already connected stream. The stream's own timeouts must
    /// match `config.read_timeout`.
    pub fn from_stream(stream: S, config: SessionConfig) -> Self {
        let transport = FrameTransport::new(stream, config.read_timeout, config.max_frame_size);
        Self {
            config,
            transport: Some(transport),
            state: SessionState::Connected(RequestPhase::Idle),
            registry: ProtocolRegistry::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_usable(&self) -> bool {
        self.state == SessionState::Connected(RequestPhase::Idle)
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    pub fn stream(&self) -> Option<&S> {
        self.transport.as_ref().map(FrameTransport::get_ref)
    }

    /// Sends one request and reads its response frame.
    ///
    /// A terminal failure (see [`ScaffoldingError::is_terminal`]) leaves the
    /// session `Broken`.
    pub fn request(&mut self, kind: &str, body: &[u8]) -> Result<Response> {
        match self.state {
            SessionState::Connected(RequestPhase::Idle) => {}
            SessionState::Broken => return Err(ScaffoldingError::SessionUnusable),
            _ => return Err(ScaffoldingError::NotConnected),
        }

        let frame = encode_request(kind, body)?;
        self.registry.validate_body(kind, body)?;

        debug!("Sending request {} ({} byte body)", kind, body.len());

        match self.exchange(&frame) {
            Ok(response) => {
                self.state = SessionState::Connected(RequestPhase::Idle);
                debug!(
                    "Request {} answered with status {} ({} bytes)",
                    kind,
                    response.status,
                    response.data.len()
                );
                Ok(response)
            }
            Err(e) => {
                warn!("Request {} failed in {:?}: {}", kind, self.state, e);
                self.state = if e.is_terminal() {
                    SessionState::Broken
                } else {
                    SessionState::Connected(RequestPhase::Idle)
                };
                Err(e)
            }
        }
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Response> {
        let transport = self.transport.as_mut().ok_or(ScaffoldingError::NotConnected)?;

        self.state = SessionState::Connected(RequestPhase::Sending);
        transport.send_all(frame)?;

        self.state = SessionState::Connected(RequestPhase::AwaitingStatus);
        let status = transport.recv_status()?;

        self.state = SessionState::Connected(RequestPhase::AwaitingLength);
        let length = transport.recv_length(status)?;

        self.state = SessionState::Connected(RequestPhase::AwaitingBody);
        let data = transport.recv_data(length)?;

        Ok(Response::new(status, data))
    }

    /// Sends a request and decodes the payload for its kind
    pub fn call(&mut self, kind: &str, body: &[u8]) -> Result<Reply> {
        let response = self.request(kind, body)?;
        self.registry.decode(kind, &response)
    }

    /// Checks that the service echoes `fingerprint`
    pub fn ping(&mut self, fingerprint: &[u8]) -> Result<()> {
        match self.call(KIND_PING, fingerprint)? {
            Reply::Ping(data) if ping_matches(fingerprint, &data) => Ok(()),
            Reply::Ping(data) => Err(ScaffoldingError::FingerprintMismatch {
                sent: hex::encode(fingerprint),
                received: hex::encode(&data),
            }),
            other => Err(unexpected(KIND_PING, &other)),
        }
    }

    pub fn protocols(&mut self) -> Result<Vec<String>> {
        match self.call(KIND_PROTOCOLS, &[])? {
            Reply::Protocols(kinds) => Ok(kinds),
            other => Err(unexpected(KIND_PROTOCOLS, &other)),
        }
    }

    pub fn server_port(&mut self) -> Result<ServerPort> {
        match self.call(KIND_SERVER_PORT, &[])? {
            Reply::ServerPort(port) => Ok(port),
            other => Err(unexpected(KIND_SERVER_PORT, &other)),
        }
    }

    pub fn player_ping(&mut self, player: &PlayerRegistration) -> Result<()> {
        let body = player.to_body()?;
        match self.call(KIND_PLAYER_PING, &body)? {
            Reply::PlayerPing => Ok(()),
            other => Err(unexpected(KIND_PLAYER_PING, &other)),
        }
    }

    pub fn player_profiles_list(&mut self) -> Result<Vec<PlayerProfile>> {
        match self.call(KIND_PLAYER_PROFILES_LIST, &[])? {
            Reply::PlayerProfiles(profiles) => Ok(profiles),
            other => Err(unexpected(KIND_PLAYER_PROFILES_LIST, &other)),
        }
    }

    /// Releases the stream. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.get_mut().close_stream() {
                debug!("Ignoring error while closing stream: {}", e);
            }
            info!("Session to {} closed", self.config.addr());
        }
        self.state = SessionState::Closed;
    }
}

impl<S: SessionStream> Drop for ClientSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn unexpected(kind: &str, reply: &Reply) -> ScaffoldingError {
    ScaffoldingError::Protocol(format!("unexpected reply for {}: {:?}", kind, reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{encode_response, FrameField, STATUS_NOT_READY};
    use crate::kinds::PING_FINGERPRINT;
    use crate::testing::ScriptedStream;

    fn session(reads: &[u8], chunk: usize) -> ClientSession<ScriptedStream> {
        ClientSession::from_stream(ScriptedStream::chunked(reads, chunk), SessionConfig::default())
    }

    #[test]
    fn test_request_writes_frame_and_reads_response() {
        let response = encode_response(0, b"pong").unwrap();
        let mut session = session(&response, 2);

        let result = session.request("c:ping", b"pong").unwrap();

        assert_eq!(result, Response::new(0, &b"pong"[..]));
        assert_eq!(
            session.stream().unwrap().written(),
            &encode_request("c:ping", b"pong").unwrap()[..]
        );
        assert!(session.is_usable());
    }

    #[test]
    fn test_sequential_requests_on_one_session() {
        let mut reads = encode_response(0, &PING_FINGERPRINT).unwrap().to_vec();
        reads.extend_from_slice(&encode_response(STATUS_NOT_READY, b"").unwrap());
        let mut session = session(&reads, 3);

        session.ping(&PING_FINGERPRINT).unwrap();
        assert_eq!(session.server_port().unwrap(), ServerPort::NotReady);
    }

    #[test]
    fn test_close_after_status_breaks_session() {
        let mut session = session(&[0], 1);

        let result = session.request("c:protocols", b"");
        assert!(matches!(
            result,
            Err(ScaffoldingError::ConnectionClosed {
                field: FrameField::Length,
                ..
            })
        ));
        assert_eq!(session.state(), SessionState::Broken);

        assert!(matches!(
            session.request("c:protocols", b""),
            Err(ScaffoldingError::SessionUnusable)
        ));
    }

    #[test]
    fn test_oversized_length_breaks_session() {
        let config = SessionConfig {
            max_frame_size: 16,
            ..SessionConfig::default()
        };
        let response = encode_response(0, &[0u8; 32]).unwrap();
        let stream = ScriptedStream::chunked(&response, response.len());
        let mut session = ClientSession::from_stream(stream, config);

        let result = session.request("c:protocols", b"");
        assert!(matches!(
            result,
            Err(ScaffoldingError::FrameTooLarge { length: 32, max: 16 })
        ));
        assert_eq!(session.state(), SessionState::Broken);
        assert!(matches!(
            session.request("c:protocols", b""),
            Err(ScaffoldingError::SessionUnusable)
        ));
    }

    #[test]
    fn test_timeout_breaks_session() {
        let stream = ScriptedStream::from_reads(vec![Err(io::ErrorKind::TimedOut)]);
        let mut session = ClientSession::from_stream(stream, SessionConfig::default());

        let result = session.request("c:server_port", b"");
        assert!(matches!(
            result,
            Err(ScaffoldingError::Timeout {
                field: FrameField::Status,
                after,
            }) if after == DEFAULT_TIMEOUT
        ));
        assert!(!session.is_usable());
    }

    #[test]
    fn test_encoding_error_sends_nothing() {
        let mut session = session(&[], 1);
        let kind = "k".repeat(300);

        assert!(matches!(
            session.request(&kind, b""),
            Err(ScaffoldingError::Encoding(_))
        ));
        assert!(session.stream().unwrap().written().is_empty());
        assert!(session.is_usable());
    }

    #[test]
    fn test_invalid_player_ping_body_not_sent() {
        let mut session = session(&[], 1);

        assert!(matches!(
            session.request(KIND_PLAYER_PING, b"not json"),
            Err(ScaffoldingError::Encoding(_))
        ));
        assert!(session.stream().unwrap().written().is_empty());
    }

    #[test]
    fn test_ping_mismatch() {
        let response = encode_response(0, b"something else").unwrap();
        let mut session = session(&response, 64);

        assert!(matches!(
            session.ping(&PING_FINGERPRINT),
            Err(ScaffoldingError::FingerprintMismatch { .. })
        ));
        // The frame itself was read completely
        assert!(session.is_usable());
    }

    #[test]
    fn test_player_ping_and_list() {
        let profiles = br#"[{"name":"TestPlayer","machine_id":"0123456789abcdef0123456789abcdef","vendor":"Test","kind":{"Value":"GUEST"}}]"#;
        let mut reads = encode_response(0, b"").unwrap().to_vec();
        reads.extend_from_slice(&encode_response(0, profiles).unwrap());
        let mut session = session(&reads, 5);

        let player = PlayerRegistration::new("TestPlayer", "0123456789abcdef0123456789abcdef", "Test");
        session.player_ping(&player).unwrap();

        let listed = session.player_profiles_list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "TestPlayer");
        assert_eq!(listed[0].kind, crate::kinds::ProfileKind::Guest);
    }

    #[test]
    fn test_unknown_kind_status_255() {
        let response = encode_response(255, b"Unknown protocol").unwrap();
        let mut session = session(&response, 4);

        let raw = session.request("c:invalid_protocol", b"").unwrap();
        assert_eq!(raw.status, 255);
        assert_eq!(raw.text_lossy(), "Unknown protocol");
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = session(&[], 1);

        session.close();
        session.close();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.stream().is_none());
        assert!(matches!(
            session.request("c:ping", b""),
            Err(ScaffoldingError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let config = SessionConfig {
            port,
            ..SessionConfig::default()
        };

        assert!(matches!(
            ClientSession::open(config),
            Err(ScaffoldingError::Connection(_))
        ));
    }
}
