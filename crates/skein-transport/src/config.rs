use std::net::SocketAddr;
use std::time::Duration;

/// Default PBKDF2 iteration count.
pub const DEFAULT_KEY_ITERATIONS: u32 = 1024;

/// Default derived key length in bytes.
pub const DEFAULT_KEY_LEN: usize = 32;

/// Configuration for QUIC sessions, shared by listener and connector.
///
/// Both ends must agree on password, salt, iteration count and key length,
/// otherwise the handshake fails. Use the builder pattern:
///
/// ```rust
/// use skein_transport::TransportConfig;
///
/// let config = TransportConfig::new("127.0.0.1:7145".parse().unwrap())
///     .password(b"test password")
///     .salt(b"test salt")
///     .key_iterations(4096);
/// ```
#[derive(Clone)]
pub struct TransportConfig {
    /// Address to bind (server) or dial (client).
    pub(crate) addr: SocketAddr,
    pub(crate) password: Vec<u8>,
    pub(crate) salt: Vec<u8>,
    pub(crate) key_iterations: u32,
    pub(crate) key_len: usize,
    /// TLS server name carried in the pinned certificate.
    pub(crate) server_name: String,
    /// QUIC idle timeout. `None` keeps quinn's default.
    pub(crate) max_idle_timeout: Option<Duration>,
    /// QUIC keep-alive interval. `None` disables keep-alives.
    pub(crate) keep_alive: Option<Duration>,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("addr", &self.addr)
            .field("key_iterations", &self.key_iterations)
            .field("key_len", &self.key_len)
            .field("server_name", &self.server_name)
            .field("max_idle_timeout", &self.max_idle_timeout)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

impl TransportConfig {
    /// Create a new config with defaults.
    ///
    /// If the `SKEIN_PASSWORD` / `SKEIN_SALT` environment variables are set
    /// they are used as password and salt. Both can be overridden with
    /// [`.password()`](Self::password) and [`.salt()`](Self::salt).
    pub fn new(addr: SocketAddr) -> Self {
        let password = std::env::var("SKEIN_PASSWORD").unwrap_or_default();
        let salt = std::env::var("SKEIN_SALT").unwrap_or_default();

        Self {
            addr,
            password: password.into_bytes(),
            salt: salt.into_bytes(),
            key_iterations: DEFAULT_KEY_ITERATIONS,
            key_len: DEFAULT_KEY_LEN,
            server_name: "skein.local".to_string(),
            max_idle_timeout: None,
            keep_alive: Some(Duration::from_secs(5)),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn password(mut self, password: &[u8]) -> Self {
        self.password = password.to_vec();
        self
    }

    pub fn salt(mut self, salt: &[u8]) -> Self {
        self.salt = salt.to_vec();
        self
    }

    /// Set the PBKDF2 iteration count (default: 1024).
    pub fn key_iterations(mut self, iterations: u32) -> Self {
        self.key_iterations = iterations;
        self
    }

    /// Set the derived key length (default: 32, minimum: 32).
    pub fn key_len(mut self, len: usize) -> Self {
        self.key_len = len;
        self
    }

    /// Set the TLS server name embedded in the pinned certificate.
    pub fn server_name(mut self, name: &str) -> Self {
        self.server_name = name.to_string();
        self
    }

    /// Close the QUIC connection after this much silence.
    pub fn max_idle_timeout(mut self, timeout: Duration) -> Self {
        self.max_idle_timeout = Some(timeout);
        self
    }

    /// Send QUIC keep-alives at this interval, or never with `None`.
    pub fn keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }
}
